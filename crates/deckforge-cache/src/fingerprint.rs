//! Deterministic request fingerprinting.
//!
//! Every field that can change the remote output must participate in the
//! fingerprint; adding a new knob to `GenerationRequest` without including
//! it here is a correctness bug, so the version tag exists to invalidate
//! old entries when the scheme changes.

use serde_json::{json, Map, Value};

use deckforge_utils::error::CacheError;
use deckforge_utils::types::GenerationRequest;

/// Bumped whenever the normalization scheme changes shape.
pub const FINGERPRINT_VERSION: &str = "v1";

/// Round to two decimals so equivalent float spellings normalize to one
/// canonical number (0.7 vs 0.70).
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute the 64-char lowercase hex fingerprint of a request.
///
/// Normalization: provider and model lowercased, temperature and `top_p`
/// rounded to two decimals, optional fields included only when present,
/// extra params filtered to non-null (their map is already key-sorted).
/// The normalized form is serialized canonically (RFC 8785: sorted keys,
/// compact separators, shortest number form) and hashed with BLAKE3.
pub fn fingerprint(request: &GenerationRequest) -> Result<String, CacheError> {
    let mut root = Map::new();
    root.insert("version".to_string(), json!(FINGERPRINT_VERSION));
    root.insert(
        "provider".to_string(),
        json!(request.provider_id.to_lowercase()),
    );
    root.insert("model".to_string(), json!(request.model_id.to_lowercase()));
    root.insert(
        "messages".to_string(),
        serde_json::to_value(&request.messages)
            .map_err(|e| CacheError::Fingerprint(e.to_string()))?,
    );
    root.insert("temperature".to_string(), json!(round2(request.temperature)));

    if let Some(max_tokens) = request.max_tokens {
        root.insert("max_tokens".to_string(), json!(max_tokens));
    }
    if let Some(top_p) = request.top_p {
        root.insert("top_p".to_string(), json!(round2(top_p)));
    }
    if let Some(schema) = &request.json_schema {
        root.insert("json_schema".to_string(), schema.clone());
    }

    let extra: Map<String, Value> = request
        .extra_params
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !extra.is_empty() {
        root.insert("extra".to_string(), Value::Object(extra));
    }

    let canonical = serde_json_canonicalizer::to_string(&Value::Object(root))
        .map_err(|e| CacheError::Fingerprint(e.to_string()))?;

    Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
}
