use crate::auth::{authenticate, scope_gate, tier_for_scope};
use crate::error::RelayError;
use crate::state::AppState;
use crate::time::now_ms;
use axum::http::HeaderMap;
use bridge_audit_spec::{AuditEvent, EnvelopeRejected, EnvelopeVerified, RateLimitExceeded, ScopeGateDenied};
use bridge_envelope::Scope;
use bridge_ratelimit::RateLimiter;

/// The full admission pipeline every capability path runs before its
/// business logic: envelope/session auth, then scope gate, then rate
/// limiting — in that order, so invalid credentials never consume rate
/// budget and valid credentials never escape the limiter (spec §4.F).
pub fn admit(state: &AppState, method: &str, path: &str, headers: &HeaderMap, body: &[u8], allowed: &[Scope]) -> Result<Scope, RelayError> {
    let scope = match authenticate(state, method, path, headers, body) {
        Ok(scope) => scope,
        Err(RelayError::EnvelopeRejected(reason)) => {
            audit(state, AuditEvent::EnvelopeRejected(EnvelopeRejected {
                schema_version: 1,
                ts: now_ms() as f64,
                method: method.to_string(),
                path: path.to_string(),
                reason: reason.to_string(),
            }));
            return Err(RelayError::EnvelopeRejected(reason));
        }
        Err(other) => return Err(other),
    };

    audit(state, AuditEvent::EnvelopeVerified(EnvelopeVerified {
        schema_version: 1,
        ts: now_ms() as f64,
        scope: scope.as_str().to_string(),
        method: method.to_string(),
        path: path.to_string(),
        algorithm: "ed25519".to_string(),
    }));

    if let Err(e) = scope_gate(allowed, scope) {
        audit(state, AuditEvent::ScopeGateDenied(ScopeGateDenied {
            schema_version: 1,
            ts: now_ms() as f64,
            scope: scope.as_str().to_string(),
            path: path.to_string(),
            required_scopes: allowed.iter().map(|s| s.as_str().to_string()).collect(),
        }));
        return Err(e);
    }

    let limiter = RateLimiter::new(&state.store, state.rate_caps.clone(), state.multimedia_caps.clone());
    let actor = scope.as_str();
    if limiter.check_and_increment(actor, tier_for_scope(scope), now_ms()).is_err() {
        audit(state, AuditEvent::RateLimitExceeded(RateLimitExceeded {
            schema_version: 1,
            ts: now_ms() as f64,
            actor: actor.to_string(),
            dimension: "actor_tier".to_string(),
        }));
        return Err(RelayError::RateLimited);
    }

    Ok(scope)
}

fn audit(state: &AppState, event: AuditEvent) {
    if let Err(e) = state.audit.lock().expect("audit log mutex poisoned").append(event) {
        tracing::error!(error = %e, "failed to append audit event");
    }
}
