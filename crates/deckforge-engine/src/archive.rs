//! Durable artifact archive: one JSON file per combined artifact.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use deckforge_utils::atomic_write::write_file_atomic;
use deckforge_utils::types::CombinedArtifact;

pub struct ArtifactArchive {
    dir: PathBuf,
}

impl ArtifactArchive {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write the artifact under a timestamped, topic-derived filename.
    /// Returns the path written.
    pub fn save(&self, artifact: &CombinedArtifact, topic: &str) -> io::Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let path = self
            .dir
            .join(format!("{timestamp}-{}.json", sanitize_topic(topic)));

        let json = serde_json::to_string_pretty(artifact)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_file_atomic(&path, &json)?;
        debug!(path = %path.display(), cards = artifact.cards.len(), "Archived artifact");
        Ok(path)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Lowercased slug, filesystem-safe, capped in length.
fn sanitize_topic(topic: &str) -> String {
    let mut slug: String = topic
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.chars().take(60).collect()
    }
}
