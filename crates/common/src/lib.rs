//! bridge_common
//!
//! Canonical JSON serialization + SHA-256 hashing utilities, shared across
//! every crate in this workspace that crosses a trust boundary:
//! - audit event hashing
//! - envelope signature canonicalization
//! - attachment ref hashing
//!
//! IMPORTANT: Do not "pretty print". Hashes must be computed over canonical bytes.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Capability tier bound to an actor for rate-limiting and persona
/// selection. Wire form is `READ_ONLY|WRITE_LOCAL|FULL_ACCESS|PUBLIC_SOCIAL`;
/// the legacy alias `WRITE_SAFE` is accepted inbound and normalized here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    ReadOnly,
    #[serde(alias = "WRITE_SAFE")]
    WriteLocal,
    FullAccess,
    PublicSocial,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::ReadOnly => "READ_ONLY",
            Tier::WriteLocal => "WRITE_LOCAL",
            Tier::FullAccess => "FULL_ACCESS",
            Tier::PublicSocial => "PUBLIC_SOCIAL",
        }
    }
}

#[derive(Debug, Error)]
pub enum CanonError {
    #[error("failed to serialize json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize to canonical JSON bytes:
/// - stable key ordering (we enforce sorting via Value roundtrip)
/// - no whitespace
/// - UTF-8
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonError> {
    let v = serde_json::to_value(value)?;
    let sorted = sort_json_value(v);
    Ok(serde_json::to_vec(&sorted)?)
}

/// Return "sha256:<hex>" of canonical JSON bytes.
pub fn sha256_canonical_json<T: Serialize>(value: &T) -> Result<String, CanonError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(sha256_bytes(&bytes))
}

/// Return "sha256:<hex>" of raw bytes.
pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    format!("sha256:{}", hex::encode(digest))
}

/// Encode bytes as unpadded base64url, used for nonces, signatures, and tokens.
pub fn b64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded base64url. Rejects any input containing padding.
pub fn b64url_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(s)
}

/// Constant-time byte equality, for signature and token comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn sort_json_value(v: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k, sort_json_value(v));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_json_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Obj {
        b: u32,
        a: u32,
    }

    #[test]
    fn canonical_hash_is_stable() {
        let x = Obj { b: 2, a: 1 };
        let y = Obj { a: 1, b: 2 };
        let hx = sha256_canonical_json(&x).unwrap();
        let hy = sha256_canonical_json(&y).unwrap();
        assert_eq!(hx, hy);
    }

    #[test]
    fn b64url_roundtrip_has_no_padding() {
        let bytes = [0u8, 1, 2, 3, 4, 5, 6, 7];
        let s = b64url_encode(&bytes);
        assert!(!s.contains('='));
        assert_eq!(b64url_decode(&s).unwrap(), bytes);
    }

    #[test]
    fn constant_time_eq_detects_mismatch() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn tier_serializes_to_screaming_snake_case() {
        let json = serde_json::to_string(&Tier::WriteLocal).unwrap();
        assert_eq!(json, "\"WRITE_LOCAL\"");
    }

    #[test]
    fn tier_accepts_legacy_write_safe_alias() {
        let tier: Tier = serde_json::from_str("\"WRITE_SAFE\"").unwrap();
        assert_eq!(tier, Tier::WriteLocal);
    }
}