use crate::error::RelayError;
use crate::state::AppState;
use axum::http::HeaderMap;
use bridge_common::Tier;
use bridge_envelope::{EnvelopeHeaders, EnvelopeVerifier, Scope, VerifyError};

/// Every capability path requires a verified signed envelope OR a valid
/// session token bearer, and is then subject to a scope gate (spec §4.G).
pub fn authenticate(state: &AppState, method: &str, path: &str, headers: &HeaderMap, body: &[u8]) -> Result<Scope, RelayError> {
    if let Some(token) = bearer_token(headers) {
        return state
            .sessions
            .resolve(&token)
            .map(|binding| binding.scope)
            .map_err(|e| RelayError::EnvelopeRejected(resolve_error_code(e)));
    }

    let envelope_headers = EnvelopeHeaders::from_getter(|name| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string))
        .ok_or(RelayError::EnvelopeRejected("missing"))?;

    let verifier = EnvelopeVerifier::new(&state.nonces);
    verifier
        .verify(method, path, body, &envelope_headers, &state.keys)
        .map_err(|e: VerifyError| RelayError::EnvelopeRejected(e.code()))
}

fn resolve_error_code(e: bridge_session::ResolveError) -> &'static str {
    match e {
        bridge_session::ResolveError::Expired => "expired",
        bridge_session::ResolveError::UnknownToken => "unknown-token",
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Maps an authenticated scope to its rate-limiting tier (spec §4.F lists
/// tier as an orthogonal dimension; this pipeline ties the two together
/// at the point where a capability call is first authenticated).
pub fn tier_for_scope(scope: Scope) -> Tier {
    match scope {
        Scope::Direct => Tier::FullAccess,
        Scope::Public => Tier::PublicSocial,
    }
}

pub fn scope_gate(allowed: &[Scope], scope: Scope) -> Result<(), RelayError> {
    if allowed.contains(&scope) {
        Ok(())
    } else {
        Err(RelayError::ScopeGateDenied)
    }
}
