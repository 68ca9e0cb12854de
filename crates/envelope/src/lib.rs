//! bridge_envelope
//!
//! Component B — scoped request signer/verifier. Produces and checks the
//! signed envelope headers that let a server learn, with integrity, which
//! scope a caller belongs to. See spec §4.B.
//!
//! The canonical string covered by the signature is:
//!   method\npath\ntimestamp\nnonce\nscope\nSHA256(body)
//!
//! `scope` is part of the signed material, so a caller cannot present a
//! valid signature for one scope under a different scope header: the
//! canonical string (and therefore the signature) would not match.

use bridge_crypto::{SigningKeyMaterial, VerifyingKeyMaterial};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const HEADER_TIMESTAMP: &str = "X-Internal-Timestamp";
pub const HEADER_NONCE: &str = "X-Internal-Nonce";
pub const HEADER_SCOPE: &str = "X-Internal-Scope";
pub const HEADER_ALGORITHM: &str = "X-Internal-Algorithm";
pub const HEADER_SIGNATURE: &str = "X-Internal-Signature";

pub const SKEW_TOLERANCE_MS: u64 = 5 * 60 * 1000;
/// Nonces are remembered for twice the skew window, per spec §3.
pub const NONCE_RETENTION_MS: u64 = 2 * SKEW_TOLERANCE_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Direct,
    Public,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Direct => "direct",
            Scope::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Scope> {
        match s {
            "direct" => Some(Scope::Direct),
            "public" => Some(Scope::Public),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorical rejection reasons, per spec §4.B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("missing")]
    Missing,
    #[error("stale")]
    Stale,
    #[error("replay")]
    Replay,
    #[error("bad-sig")]
    BadSignature,
    #[error("unknown-scope")]
    UnknownScope,
}

impl VerifyError {
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::Missing => "missing",
            VerifyError::Stale => "stale",
            VerifyError::Replay => "replay",
            VerifyError::BadSignature => "bad-sig",
            VerifyError::UnknownScope => "unknown-scope",
        }
    }
}

/// The five header values of a signed envelope, already extracted from
/// whatever HTTP header map the caller is using.
#[derive(Debug, Clone)]
pub struct EnvelopeHeaders {
    pub timestamp: String,
    pub nonce: String,
    pub scope: String,
    pub algorithm: String,
    pub signature: String,
}

impl EnvelopeHeaders {
    /// Build from a closure that looks up a header by name, so this crate
    /// never needs to depend on a specific HTTP header-map type.
    pub fn from_getter(mut get: impl FnMut(&'static str) -> Option<String>) -> Option<Self> {
        Some(EnvelopeHeaders {
            timestamp: get(HEADER_TIMESTAMP)?,
            nonce: get(HEADER_NONCE)?,
            scope: get(HEADER_SCOPE)?,
            algorithm: get(HEADER_ALGORITHM)?,
            signature: get(HEADER_SIGNATURE)?,
        })
    }
}

fn sha256_hex(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

fn canonical_string(method: &str, path: &str, timestamp: &str, nonce: &str, scope: &str, body: &[u8]) -> String {
    format!("{method}\n{path}\n{timestamp}\n{nonce}\n{scope}\n{}", sha256_hex(body))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

/// Sign a request for `scope`, returning the header values to attach.
pub fn sign(key: &SigningKeyMaterial, method: &str, path: &str, body: &[u8], scope: Scope) -> EnvelopeHeaders {
    let timestamp = now_ms().to_string();
    let nonce = bridge_common::b64url_encode(&bridge_crypto::random_bytes(16));
    let canonical = canonical_string(method, path, &timestamp, &nonce, scope.as_str(), body);
    let sig = key.sign(canonical.as_bytes());
    EnvelopeHeaders {
        timestamp,
        nonce,
        scope: scope.as_str().to_string(),
        algorithm: key.algorithm().to_string(),
        signature: bridge_common::b64url_encode(&sig),
    }
}

/// Resolves the verifying key for a scope. Returns `None` if this server
/// does not hold key material for that scope.
pub trait ScopeKeyResolver {
    fn resolve(&self, scope: Scope) -> Option<VerifyingKeyMaterial>;
}

/// Bounded in-memory nonce ledger, purged lazily on access.
pub struct NonceStore {
    seen: Mutex<HashMap<String, u64>>,
}

impl Default for NonceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceStore {
    pub fn new() -> Self {
        Self { seen: Mutex::new(HashMap::new()) }
    }

    /// Returns `true` if the nonce was already present (and not expired).
    /// Otherwise records it with a fresh expiry and returns `false`.
    fn check_and_record(&self, nonce: &str, now: u64) -> bool {
        let mut guard = self.seen.lock().expect("nonce store mutex poisoned");
        guard.retain(|_, expiry| *expiry > now);
        if let Some(expiry) = guard.get(nonce) {
            if *expiry > now {
                return true;
            }
        }
        guard.insert(nonce.to_string(), now + NONCE_RETENTION_MS);
        false
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

pub struct EnvelopeVerifier<'a> {
    pub nonces: &'a NonceStore,
    pub skew_ms: u64,
}

impl<'a> EnvelopeVerifier<'a> {
    pub fn new(nonces: &'a NonceStore) -> Self {
        Self { nonces, skew_ms: SKEW_TOLERANCE_MS }
    }

    /// Verify a parsed envelope, resolving the verifying key for the
    /// claimed scope through `resolver`. On success, returns the
    /// authenticated `Scope`.
    pub fn verify(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        headers: &EnvelopeHeaders,
        resolver: &dyn ScopeKeyResolver,
    ) -> Result<Scope, VerifyError> {
        if headers.algorithm != "ed25519" && headers.algorithm != "hmac-sha256" {
            return Err(VerifyError::Missing);
        }

        let ts: u64 = headers.timestamp.parse().map_err(|_| VerifyError::Missing)?;
        let now = now_ms();
        let skew = now.abs_diff(ts);
        if skew > self.skew_ms {
            return Err(VerifyError::Stale);
        }

        if self.nonces.check_and_record(&headers.nonce, now) {
            return Err(VerifyError::Replay);
        }

        let scope = Scope::parse(&headers.scope).ok_or(VerifyError::UnknownScope)?;
        let verifying_key = resolver.resolve(scope).ok_or(VerifyError::UnknownScope)?;

        let canonical = canonical_string(method, path, &headers.timestamp, &headers.nonce, headers.scope.as_str(), body);
        let sig_bytes = bridge_common::b64url_decode(&headers.signature).map_err(|_| VerifyError::BadSignature)?;
        verifying_key
            .verify(canonical.as_bytes(), &sig_bytes)
            .map_err(|_| VerifyError::BadSignature)?;

        Ok(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_crypto::generate_ed25519_keypair;

    struct SingleScopeResolver {
        scope: Scope,
        key: VerifyingKeyMaterial,
    }

    impl ScopeKeyResolver for SingleScopeResolver {
        fn resolve(&self, scope: Scope) -> Option<VerifyingKeyMaterial> {
            if scope == self.scope {
                Some(self.key.clone())
            } else {
                None
            }
        }
    }

    fn headers_to_getter(h: &EnvelopeHeaders) -> impl Fn(&'static str) -> Option<String> + '_ {
        move |name| match name {
            HEADER_TIMESTAMP => Some(h.timestamp.clone()),
            HEADER_NONCE => Some(h.nonce.clone()),
            HEADER_SCOPE => Some(h.scope.clone()),
            HEADER_ALGORITHM => Some(h.algorithm.clone()),
            HEADER_SIGNATURE => Some(h.signature.clone()),
            _ => None,
        }
    }

    #[test]
    fn verify_sign_round_trip_succeeds() {
        let (sk, vk) = generate_ed25519_keypair();
        let headers = sign(&sk, "POST", "/v1/memory.propose", b"{}", Scope::Direct);
        let nonces = NonceStore::new();
        let verifier = EnvelopeVerifier::new(&nonces);
        let resolver = SingleScopeResolver { scope: Scope::Direct, key: vk };
        let scope = verifier
            .verify("POST", "/v1/memory.propose", b"{}", &headers, &resolver)
            .unwrap();
        assert_eq!(scope, Scope::Direct);
    }

    #[test]
    fn mutating_body_breaks_verification() {
        let (sk, vk) = generate_ed25519_keypair();
        let headers = sign(&sk, "POST", "/p", b"original", Scope::Direct);
        let nonces = NonceStore::new();
        let verifier = EnvelopeVerifier::new(&nonces);
        let resolver = SingleScopeResolver { scope: Scope::Direct, key: vk };
        let err = verifier
            .verify("POST", "/p", b"tampered", &headers, &resolver)
            .unwrap_err();
        assert_eq!(err, VerifyError::BadSignature);
    }

    #[test]
    fn scope_downgrade_attempt_fails_as_bad_signature() {
        // Agent signs with the public key but the caller flips the scope
        // header to "direct" to try to escalate privilege.
        let (sk, vk_public) = generate_ed25519_keypair();
        let mut headers = sign(&sk, "POST", "/p", b"{}", Scope::Public);
        headers.scope = "direct".to_string();

        let nonces = NonceStore::new();
        let verifier = EnvelopeVerifier::new(&nonces);
        // Relay still only knows the direct-scope key is the one bound to "direct".
        let resolver = SingleScopeResolver { scope: Scope::Direct, key: vk_public };
        let err = verifier.verify("POST", "/p", b"{}", &headers, &resolver).unwrap_err();
        assert_eq!(err, VerifyError::BadSignature);
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let (sk, vk) = generate_ed25519_keypair();
        let mut headers = sign(&sk, "POST", "/p", b"{}", Scope::Direct);
        let ancient = now_ms() - SKEW_TOLERANCE_MS - 1000;
        headers.timestamp = ancient.to_string();
        // Re-sign isn't done here on purpose: verification must fail on
        // staleness before it even gets to recomputing the signature, and
        // in any case mutating the timestamp also breaks the signature.
        let nonces = NonceStore::new();
        let verifier = EnvelopeVerifier::new(&nonces);
        let resolver = SingleScopeResolver { scope: Scope::Direct, key: vk };
        let err = verifier.verify("POST", "/p", b"{}", &headers, &resolver).unwrap_err();
        assert_eq!(err, VerifyError::Stale);
    }

    #[test]
    fn repeated_nonce_is_rejected() {
        let (sk, vk) = generate_ed25519_keypair();
        let headers = sign(&sk, "POST", "/p", b"{}", Scope::Direct);
        let nonces = NonceStore::new();
        let verifier = EnvelopeVerifier::new(&nonces);
        let resolver = SingleScopeResolver { scope: Scope::Direct, key: vk };

        verifier.verify("POST", "/p", b"{}", &headers, &resolver).unwrap();
        let err = verifier.verify("POST", "/p", b"{}", &headers, &resolver).unwrap_err();
        assert_eq!(err, VerifyError::Replay);
        assert_eq!(nonces.len(), 1);
    }

    #[test]
    fn from_getter_reports_missing_headers() {
        let mut present = HashMap::new();
        present.insert(HEADER_TIMESTAMP, "123".to_string());
        let headers = EnvelopeHeaders::from_getter(|name| present.get(name).cloned());
        assert!(headers.is_none());
    }

    #[test]
    fn headers_getter_round_trips() {
        let (sk, _vk) = generate_ed25519_keypair();
        let h = sign(&sk, "GET", "/x", b"", Scope::Public);
        let getter = headers_to_getter(&h);
        let parsed = EnvelopeHeaders::from_getter(getter).unwrap();
        assert_eq!(parsed.scope, "public");
    }
}
