use bridge_common::Tier;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MAX_BODY_BYTES: usize = 256 * 1024;
pub const MAX_PROMPT_CHARS: usize = 100_000;
const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 10 * 60 * 1_000;
const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Env var name a `QueryRunner` should set on the *subprocess* it spawns
/// for this query's duration (`Command::env`), never on the server's own
/// process environment — concurrent requests share that environment, so
/// mutating it races (spec §4.H).
pub const SESSION_TOKEN_ENV_VAR: &str = "BRIDGE_SUBPROCESS_SESSION_TOKEN";

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub prompt: String,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub pool_key: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub enable_skills: Option<bool>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub resume_session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub system_prompt_append: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl QueryRequest {
    /// Validates the request and applies the public-scope coercion rules
    /// (force tier to public-social, prefix userId) before execution.
    pub fn validate_and_coerce(mut self, scope: bridge_envelope::Scope) -> Result<Self, &'static str> {
        if self.prompt.is_empty() {
            return Err("prompt must not be empty");
        }
        if let Some(ms) = self.timeout_ms {
            if ms == 0 {
                return Err("timeoutMs must be positive");
            }
        }

        if scope == bridge_envelope::Scope::Public {
            self.tier = Some(Tier::PublicSocial);
            self.user_id = Some(match self.user_id {
                Some(id) if id.starts_with("public:") => id,
                Some(id) => format!("public:{id}"),
                None => "public:anonymous".to_string(),
            });
        }

        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        let ms = self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS).clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryEvent {
    Text { content: String },
    ToolUse { name: String, input: serde_json::Value },
    Done { result: QueryResult },
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub response: String,
    pub success: bool,
    #[serde(rename = "costUsd")]
    pub cost_usd: f64,
    #[serde(rename = "numTurns")]
    pub num_turns: u64,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Executes one query, yielding NDJSON events as they're produced. The
/// real tool-using LLM runtime is an external collaborator (out of
/// scope); this crate owns the envelope/persona/timeout/abort plumbing
/// around whatever implementation is plugged in.
#[async_trait::async_trait]
pub trait QueryRunner: Send + Sync {
    /// `session_token`, when present, must be injected into the
    /// *subprocess* this runner spawns (under `SESSION_TOKEN_ENV_VAR`),
    /// scoped to that child's lifetime — never into this process's own
    /// environment.
    async fn run(
        &self,
        request: &QueryRequest,
        system_prompt: &str,
        session_token: Option<&str>,
        tx: tokio::sync::mpsc::Sender<QueryEvent>,
    );
}

/// Default runner used until a real LLM/tool-execution backend is wired
/// in. Echoes the prompt back as a single text chunk, so the rest of the
/// server (persona injection, streaming, timeout, secret filtering) is
/// exercisable end to end without that external dependency.
pub struct EchoRunner;

#[async_trait::async_trait]
impl QueryRunner for EchoRunner {
    async fn run(
        &self,
        request: &QueryRequest,
        _system_prompt: &str,
        _session_token: Option<&str>,
        tx: tokio::sync::mpsc::Sender<QueryEvent>,
    ) {
        let _ = tx.send(QueryEvent::Text { content: request.prompt.clone() }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_envelope::Scope;

    fn request(prompt: &str) -> QueryRequest {
        QueryRequest {
            prompt: prompt.to_string(),
            tier: None,
            pool_key: None,
            cwd: None,
            enable_skills: None,
            timeout_ms: None,
            resume_session_id: None,
            user_id: None,
            system_prompt_append: None,
            session_token: None,
        }
    }

    #[test]
    fn empty_prompt_is_rejected() {
        assert!(request("").validate_and_coerce(Scope::Direct).is_err());
    }

    #[test]
    fn oversize_prompt_is_not_rejected_here() {
        // The 413 oversize check runs in the handler, before
        // `validate_and_coerce`'s 400-path checks, so an oversize prompt
        // reaches this method as a non-error — see `handlers::query`.
        let huge = "x".repeat(MAX_PROMPT_CHARS + 1);
        assert!(request(&huge).validate_and_coerce(Scope::Direct).is_ok());
    }

    #[test]
    fn public_scope_forces_tier_and_prefixes_user_id() {
        let req = request("hi").validate_and_coerce(Scope::Public).unwrap();
        assert_eq!(req.tier, Some(Tier::PublicSocial));
        assert_eq!(req.user_id.as_deref(), Some("public:anonymous"));
    }

    #[test]
    fn public_scope_does_not_double_prefix_user_id() {
        let mut req = request("hi");
        req.user_id = Some("public:alice".to_string());
        let req = req.validate_and_coerce(Scope::Public).unwrap();
        assert_eq!(req.user_id.as_deref(), Some("public:alice"));
    }

    #[test]
    fn direct_scope_leaves_caller_tier_untouched() {
        let mut req = request("hi");
        req.tier = Some(Tier::ReadOnly);
        let req = req.validate_and_coerce(Scope::Direct).unwrap();
        assert_eq!(req.tier, Some(Tier::ReadOnly));
    }

    #[test]
    fn timeout_clamps_into_bounds() {
        let mut req = request("hi");
        req.timeout_ms = Some(1);
        assert!(req.timeout().as_millis() as u64 >= MIN_TIMEOUT_MS);

        let mut req = request("hi");
        req.timeout_ms = Some(MAX_TIMEOUT_MS * 10);
        assert!(req.timeout().as_millis() as u64 <= MAX_TIMEOUT_MS);
    }
}
