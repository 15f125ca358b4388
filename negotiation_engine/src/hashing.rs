/// Negotiation Engine — Canonical Hashing
///
/// Deterministic canonical serialization + SHA-256 hashing of a match.
///
/// Rules:
///   - engine_version is the first field
///   - nodes in id order (BTreeMap), edges sorted at construction
///   - obligations keyed by role (BTreeMap)
///   - UTF-8 JSON, no whitespace, no float

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::state::MatchState;
use crate::ENGINE_VERSION;

/// Canonical serialization of a match to UTF-8 JSON bytes.
pub fn canonical_serialize(state: &MatchState) -> Result<Vec<u8>> {
    let mut root = Map::new();
    root.insert(
        "engine_version".to_string(),
        Value::Number(ENGINE_VERSION.into()),
    );
    root.insert("match".to_string(), serde_json::to_value(state)?);
    Ok(serde_json::to_vec(&Value::Object(root))?)
}

/// SHA-256 of `bytes`. Lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// SHA-256 of the canonical serialization. Lowercase hex.
pub fn canonical_hash(state: &MatchState) -> Result<String> {
    Ok(sha256_hex(&canonical_serialize(state)?))
}
