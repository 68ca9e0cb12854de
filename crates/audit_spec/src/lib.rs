//! bridge_audit_spec
//!
//! Strongly-typed audit events for the security-relevant decisions this
//! system makes: envelope verification, scope-gate denials, rate-limit
//! exhaustion, egress-guard blocks, secret-filter redactions, and
//! provider dispatch. `schema_version` increments per-event, not
//! globally.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TickId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub r#type: String, // "artifact_ref"
    pub hash: String,   // sha256:...
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    Executor,
    Critic,
    Summarizer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    Read,
    Write,
    Exec,
    Network,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub subsystem: String, // "relay" | "agent"
    pub backend: String,   // provider name, when applicable
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityPre {
    pub request_pre_hash: String, // sha256:...
    pub request_pre_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityRedacted {
    pub request_pre_hash: String,
    pub request_post_hash: String,
    pub request_post_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyMeta {
    pub decision_id: String,
    pub risk_class: RiskClass,
    pub requires_approval: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCallMeta {
    pub call_id: CallId,
    pub role: AgentRole,
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCallPrepared {
    pub schema_version: u8,
    pub run_id: RunId,
    pub tick_id: TickId,
    pub ts: f64,
    pub actor: Actor,
    pub model_call: ModelCallMeta,
    pub integrity: IntegrityPre,
    pub policy: PolicyMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionMeta {
    pub profile: String,
    pub transform_count: u64,
    pub transform_log_hash: String,
    pub summary_budget_chars: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequestRedacted {
    pub schema_version: u8,
    pub run_id: RunId,
    pub tick_id: TickId,
    pub ts: f64,
    pub model_call: CallId,
    pub redaction: RedactionMeta,
    pub integrity: IntegrityRedacted,
    pub artifacts: RedactionArtifacts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionArtifacts {
    pub pre_request_artifact: ArtifactRef,
    pub post_request_artifact: ArtifactRef,
    pub transform_log_artifact: ArtifactRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCallDispatched {
    pub schema_version: u8,
    pub run_id: RunId,
    pub tick_id: TickId,
    pub ts: f64,
    pub model_call: CallId,
    pub provider: String,
    pub model: String,
    pub endpoint_fingerprint: String,
    pub request_post_hash: String,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ok,
    Error,
    Timeout,
    RateLimited,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCallResult {
    pub status: CallStatus,
    pub latency_ms: u64,
    pub provider_request_id_hash: String,
    pub response_hash: String,
    pub response_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCallCompleted {
    pub schema_version: u8,
    pub run_id: RunId,
    pub tick_id: TickId,
    pub ts: f64,
    pub model_call: CallId,
    pub result: ModelCallResult,
    pub artifacts: CompletionArtifacts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionArtifacts {
    pub response_artifact: ArtifactRef,
    pub normalized_reply_artifact: ArtifactRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeVerified {
    pub schema_version: u8,
    pub ts: f64,
    pub scope: String,
    pub method: String,
    pub path: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeRejected {
    pub schema_version: u8,
    pub ts: f64,
    pub method: String,
    pub path: String,
    pub reason: String, // "missing" | "stale" | "replay" | "bad-sig" | "unknown-scope" | "expired" | "unknown-token"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeGateDenied {
    pub schema_version: u8,
    pub ts: f64,
    pub scope: String,
    pub path: String,
    pub required_scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitExceeded {
    pub schema_version: u8,
    pub ts: f64,
    pub actor: String,
    pub dimension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgressBlocked {
    pub schema_version: u8,
    pub ts: f64,
    pub actor: String,
    pub url: String,
    pub reason: String, // egress error code, e.g. "metadata-blocked"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRedacted {
    pub schema_version: u8,
    pub ts: f64,
    pub boundary: String, // "chat-reply" | "tool-result" | "error-message" | "inbound-prompt"
    pub pattern_ids: Vec<String>,
    pub blocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokenIssued {
    pub schema_version: u8,
    pub ts: f64,
    pub scope: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum AuditEvent {
    ModelCallPrepared(ModelCallPrepared),
    ModelRequestRedacted(ModelRequestRedacted),
    ModelCallDispatched(ModelCallDispatched),
    ModelCallCompleted(ModelCallCompleted),
    EnvelopeVerified(EnvelopeVerified),
    EnvelopeRejected(EnvelopeRejected),
    ScopeGateDenied(ScopeGateDenied),
    RateLimitExceeded(RateLimitExceeded),
    EgressBlocked(EgressBlocked),
    SecretRedacted(SecretRedacted),
    SessionTokenIssued(SessionTokenIssued),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tag_round_trips_through_json() {
        let event = AuditEvent::EgressBlocked(EgressBlocked {
            schema_version: 1,
            ts: 1.0,
            actor: "agent".into(),
            url: "http://metadata.google.internal/".into(),
            reason: "metadata-blocked".into(),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"EgressBlocked\""));
        let round: AuditEvent = serde_json::from_str(&json).unwrap();
        match round {
            AuditEvent::EgressBlocked(e) => assert_eq!(e.reason, "metadata-blocked"),
            _ => panic!("wrong variant"),
        }
    }
}
