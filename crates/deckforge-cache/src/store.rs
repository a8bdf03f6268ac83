//! Fingerprint-keyed response store with upsert semantics.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use deckforge_utils::atomic_write::write_file_atomic;
use deckforge_utils::error::CacheError;

/// Prompt previews stored alongside responses are clipped to this many chars.
pub const PROMPT_PREVIEW_MAX_CHARS: usize = 200;

/// One cached response, keyed uniquely by fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub fingerprint: String,
    pub provider_name: String,
    pub model_name: String,
    pub prompt_preview: String,
    pub response_payload: String,
    pub hit_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counters for `stats()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_hits: u64,
}

/// Shared fingerprint → response store.
///
/// The in-memory map is the source of truth within a process; when a cache
/// directory is configured, every record is mirrored as one JSON file so
/// fingerprints survive restarts. All mutation happens under one mutex, so
/// concurrent upserts to the same fingerprint serialize and hit-count
/// increments are never lost.
#[derive(Debug)]
pub struct CacheStore {
    dir: Option<PathBuf>,
    inner: Mutex<HashMap<String, CacheRecord>>,
}

impl CacheStore {
    /// Purely in-memory store; nothing survives the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Open a store backed by `dir`, loading any persisted records.
    ///
    /// Corrupted record files are removed rather than failing the open.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        fs::create_dir_all(dir)?;

        let mut map = HashMap::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.extension().map_or(false, |ext| ext == "json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(CacheError::from)
                .and_then(|text| serde_json::from_str::<CacheRecord>(&text).map_err(CacheError::from))
            {
                Ok(record) => {
                    map.insert(record.fingerprint.clone(), record);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Removing corrupted cache record");
                    let _ = fs::remove_file(&path);
                }
            }
        }

        debug!(entries = map.len(), dir = %dir.display(), "Opened cache store");
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            inner: Mutex::new(map),
        })
    }

    fn record_path(&self, fingerprint: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{fingerprint}.json")))
    }

    fn persist(&self, record: &CacheRecord) {
        let Some(path) = self.record_path(&record.fingerprint) else {
            return;
        };
        match serde_json::to_string_pretty(record) {
            Ok(text) => {
                if let Err(e) = write_file_atomic(&path, &text) {
                    warn!(fingerprint = %record.fingerprint, error = %e, "Cache record write failed");
                }
            }
            Err(e) => {
                warn!(fingerprint = %record.fingerprint, error = %e, "Cache record serialization failed");
            }
        }
    }

    /// Look up a response. A hit increments the record's `hit_count`
    /// atomically with respect to concurrent readers.
    pub fn get(&self, fingerprint: &str) -> Option<String> {
        let mut map = self.inner.lock().expect("cache mutex poisoned");
        let record = map.get_mut(fingerprint)?;
        record.hit_count += 1;
        record.updated_at = Utc::now();
        let response = record.response_payload.clone();
        let snapshot = record.clone();
        drop(map);

        debug!(fingerprint = %&fingerprint[..8.min(fingerprint.len())], hits = snapshot.hit_count, "Cache hit");
        self.persist(&snapshot);
        Some(response)
    }

    /// Upsert a response. An existing fingerprint keeps its `hit_count` and
    /// `created_at`; payload and metadata are overwritten. New entries start
    /// at `hit_count = 0`.
    pub fn put(
        &self,
        fingerprint: &str,
        provider_name: &str,
        model_name: &str,
        prompt_preview: &str,
        response_payload: &str,
    ) {
        let now = Utc::now();
        let preview = truncate_chars(prompt_preview, PROMPT_PREVIEW_MAX_CHARS);

        let mut map = self.inner.lock().expect("cache mutex poisoned");
        let record = map
            .entry(fingerprint.to_string())
            .and_modify(|existing| {
                existing.provider_name = provider_name.to_string();
                existing.model_name = model_name.to_string();
                existing.prompt_preview = preview.clone();
                existing.response_payload = response_payload.to_string();
                existing.updated_at = now;
            })
            .or_insert_with(|| CacheRecord {
                fingerprint: fingerprint.to_string(),
                provider_name: provider_name.to_string(),
                model_name: model_name.to_string(),
                prompt_preview: preview.clone(),
                response_payload: response_payload.to_string(),
                hit_count: 0,
                created_at: now,
                updated_at: now,
            });
        let snapshot = record.clone();
        drop(map);

        self.persist(&snapshot);
    }

    /// Remove everything; returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let mut map = self.inner.lock().expect("cache mutex poisoned");
        let removed = map.len();
        let fingerprints: Vec<String> = map.keys().cloned().collect();
        map.clear();
        drop(map);

        for fp in fingerprints {
            if let Some(path) = self.record_path(&fp) {
                let _ = fs::remove_file(path);
            }
        }
        removed
    }

    /// Entry and cumulative-hit counts.
    pub fn stats(&self) -> CacheStats {
        let map = self.inner.lock().expect("cache mutex poisoned");
        CacheStats {
            total_entries: map.len(),
            total_hits: map.values().map(|r| r.hit_count).sum(),
        }
    }

    /// Full record snapshot, for inspection and tests.
    pub fn record(&self, fingerprint: &str) -> Option<CacheRecord> {
        self.inner
            .lock()
            .expect("cache mutex poisoned")
            .get(fingerprint)
            .cloned()
    }
}

/// Clip to `max` chars on a char boundary.
fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
