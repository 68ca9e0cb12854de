//! bridge_session
//!
//! Component C — session token issuer. Mints short-lived, scope-scoped
//! bearer tokens on a verified signing envelope, per spec §4.C.
//!
//! Tokens are bearer-only: a holder may call capabilities in the bound
//! scope without signing, but cannot mint further tokens (minting always
//! requires a fresh verified envelope upstream of this crate).

use bridge_envelope::Scope;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Session tokens live at most one hour, per spec §3.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("expired")]
    Expired,
    #[error("unknown-token")]
    UnknownToken,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenBinding {
    pub scope: Scope,
    pub expires_at: SystemTime,
}

pub struct SessionTokenIssuer {
    tokens: Mutex<HashMap<String, TokenBinding>>,
    ttl: Duration,
}

impl Default for SessionTokenIssuer {
    fn default() -> Self {
        Self::new(MAX_TOKEN_TTL)
    }
}

impl SessionTokenIssuer {
    /// `ttl` must not exceed `MAX_TOKEN_TTL`; values above it are clamped.
    pub fn new(ttl: Duration) -> Self {
        Self { tokens: Mutex::new(HashMap::new()), ttl: ttl.min(MAX_TOKEN_TTL) }
    }

    /// Mint a token for `scope`. Callers must have already verified a
    /// signing envelope in that scope before calling this.
    pub fn issue(&self, scope: Scope) -> (String, SystemTime) {
        let token = bridge_common::b64url_encode(&bridge_crypto::random_bytes(32));
        let expires_at = SystemTime::now() + self.ttl;
        self.tokens
            .lock()
            .expect("session token mutex poisoned")
            .insert(token.clone(), TokenBinding { scope, expires_at });
        (token, expires_at)
    }

    /// Resolve a bearer token to its scope binding, evicting it if expired.
    pub fn resolve(&self, token: &str) -> Result<TokenBinding, ResolveError> {
        let mut guard = self.tokens.lock().expect("session token mutex poisoned");
        match guard.get(token).copied() {
            None => Err(ResolveError::UnknownToken),
            Some(binding) => {
                if binding.expires_at <= SystemTime::now() {
                    guard.remove(token);
                    Err(ResolveError::Expired)
                } else {
                    Ok(binding)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_resolves_to_same_scope() {
        let issuer = SessionTokenIssuer::default();
        let (token, _exp) = issuer.issue(Scope::Direct);
        let binding = issuer.resolve(&token).unwrap();
        assert_eq!(binding.scope, Scope::Direct);
    }

    #[test]
    fn unknown_token_fails() {
        let issuer = SessionTokenIssuer::default();
        let err = issuer.resolve("nope").unwrap_err();
        assert_eq!(err, ResolveError::UnknownToken);
    }

    #[test]
    fn expired_token_is_evicted_on_access() {
        let issuer = SessionTokenIssuer::new(Duration::from_millis(1));
        let (token, _exp) = issuer.issue(Scope::Public);
        std::thread::sleep(Duration::from_millis(5));
        let err = issuer.resolve(&token).unwrap_err();
        assert_eq!(err, ResolveError::Expired);
        // Second resolve still reports unknown, proving eviction happened.
        let err2 = issuer.resolve(&token).unwrap_err();
        assert_eq!(err2, ResolveError::UnknownToken);
    }

    #[test]
    fn ttl_is_clamped_to_one_hour() {
        let issuer = SessionTokenIssuer::new(Duration::from_secs(10 * 60 * 60));
        let (_token, exp) = issuer.issue(Scope::Direct);
        let delta = exp.duration_since(SystemTime::now()).unwrap();
        assert!(delta <= MAX_TOKEN_TTL + Duration::from_secs(1));
    }
}
