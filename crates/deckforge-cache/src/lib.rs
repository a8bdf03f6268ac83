//! Content-addressed cache for generation responses.
//!
//! Requests are normalized and canonically serialized, then hashed with
//! BLAKE3 to a 64-char hex fingerprint. The store maps fingerprints to
//! response records with upsert semantics and hit counting.

mod fingerprint;
mod store;

pub use fingerprint::{fingerprint, FINGERPRINT_VERSION};
pub use store::{CacheRecord, CacheStats, CacheStore, PROMPT_PREVIEW_MAX_CHARS};
