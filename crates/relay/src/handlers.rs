use crate::error::RelayError;
use crate::pipeline::admit;
use crate::state::AppState;
use crate::time::{now_ms, now_sec};
use crate::validation::{check_field_size, reject_unsafe_content};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bridge_audit_spec::{AuditEvent, EgressBlocked, SecretRedacted, SessionTokenIssued};
use bridge_envelope::Scope;
use bridge_memory::{Category, MemoryStore, NewEntry, ReadFilters, Source, Trust};
use bridge_providers::{OpenAICompatProvider, Provider, ProviderRequest};
use bridge_ratelimit::MultimediaFeature;
use bridge_secret_filter::SecretFilter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

const MAX_PROPOSE_ENTRIES: usize = 5;

fn audit(state: &AppState, event: AuditEvent) {
    if let Err(e) = state.audit.lock().expect("audit log mutex poisoned").append(event) {
        tracing::error!(error = %e, "failed to append audit event");
    }
}

fn scope_to_source(scope: Scope) -> Source {
    match scope {
        Scope::Direct => Source::Direct,
        Scope::Public => Source::Public,
    }
}

// ---------------------------------------------------------------------
// /v1/memory.propose
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProposeEntry {
    id: String,
    category: Category,
    content: String,
    #[serde(rename = "chatId")]
    chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProposeRequest {
    entries: Vec<ProposeEntry>,
}

pub async fn memory_propose(State(state): State<Arc<AppState>>, method: Method, uri: axum::http::Uri, headers: HeaderMap, body: axum::body::Bytes) -> Result<impl IntoResponse, RelayError> {
    let scope = admit(&state, method.as_str(), uri.path(), &headers, &body, &[Scope::Direct, Scope::Public])?;
    let req: ProposeRequest = serde_json::from_slice(&body).map_err(|e| RelayError::BadRequest(e.to_string()))?;

    if req.entries.len() > MAX_PROPOSE_ENTRIES {
        return Err(RelayError::BadRequest(format!("at most {MAX_PROPOSE_ENTRIES} entries per call")));
    }

    let mut entries = Vec::with_capacity(req.entries.len());
    for e in &req.entries {
        check_field_size(&e.id, 128, "id")?;
        check_field_size(&e.content, 500, "content")?;
        if let Some(chat_id) = &e.chat_id {
            check_field_size(chat_id, 64, "chatId")?;
        }
        reject_unsafe_content(&e.content)?;
        entries.push(NewEntry { id: e.id.clone(), category: e.category, content: e.content.clone(), chat_id: e.chat_id.clone() });
    }

    let memory = MemoryStore::new(&state.store);
    let created = memory.create_entries(&entries, scope_to_source(scope), now_ms())?;
    Ok(Json(json!({ "entries": created })))
}

// ---------------------------------------------------------------------
// /v1/memory.snapshot
// ---------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct SnapshotRequest {
    categories: Option<Vec<Category>>,
    trust: Option<Vec<Trust>>,
    sources: Option<Vec<Source>>,
    limit: Option<i64>,
    #[serde(rename = "chatId")]
    chat_id: Option<String>,
}

pub async fn memory_snapshot(State(state): State<Arc<AppState>>, method: Method, uri: axum::http::Uri, headers: HeaderMap, body: axum::body::Bytes) -> Result<impl IntoResponse, RelayError> {
    let scope = admit(&state, method.as_str(), uri.path(), &headers, &body, &[Scope::Direct, Scope::Public])?;
    let req: SnapshotRequest = if body.is_empty() { SnapshotRequest::default() } else { serde_json::from_slice(&body).map_err(|e| RelayError::BadRequest(e.to_string()))? };

    if let Some(limit) = req.limit {
        if !(1..=500).contains(&limit) {
            return Err(RelayError::BadRequest("limit must be within [1, 500]".into()));
        }
    }

    let filters = ReadFilters { categories: req.categories, trust: req.trust, sources: req.sources, limit: req.limit, chat_id: req.chat_id };
    let memory = MemoryStore::new(&state.store);
    // `public`-scope callers are restricted to source=public even if they
    // asked for more, per spec §4.G; `restrict_to_public` enforces this
    // defensively inside the store as well.
    let entries = memory.read_entries(&filters, scope == Scope::Public)?;
    Ok(Json(json!({ "entries": entries })))
}

// ---------------------------------------------------------------------
// /v1/memory.quarantine
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QuarantineRequest {
    id: String,
    content: String,
    #[serde(rename = "chatId")]
    chat_id: Option<String>,
}

pub async fn memory_quarantine(State(state): State<Arc<AppState>>, method: Method, uri: axum::http::Uri, headers: HeaderMap, body: axum::body::Bytes) -> Result<impl IntoResponse, RelayError> {
    admit(&state, method.as_str(), uri.path(), &headers, &body, &[Scope::Direct])?;
    let req: QuarantineRequest = serde_json::from_slice(&body).map_err(|e| RelayError::BadRequest(e.to_string()))?;
    check_field_size(&req.id, 128, "id")?;
    check_field_size(&req.content, 500, "content")?;
    reject_unsafe_content(&req.content)?;

    let memory = MemoryStore::new(&state.store);
    let entry = memory.create_quarantined_entry(
        NewEntry { id: req.id, category: Category::Posts, content: req.content, chat_id: req.chat_id },
        now_ms(),
    )?;
    Ok(Json(json!({ "entry": entry })))
}

// ---------------------------------------------------------------------
// /v1/memory.promote
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PromoteRequest {
    id: String,
    actor: String,
}

pub async fn memory_promote(State(state): State<Arc<AppState>>, method: Method, uri: axum::http::Uri, headers: HeaderMap, body: axum::body::Bytes) -> Result<impl IntoResponse, RelayError> {
    admit(&state, method.as_str(), uri.path(), &headers, &body, &[Scope::Direct])?;
    let req: PromoteRequest = serde_json::from_slice(&body).map_err(|e| RelayError::BadRequest(e.to_string()))?;

    let memory = MemoryStore::new(&state.store);
    let entry = memory.promote_entry_trust(&req.id, &req.actor, now_ms())?;
    Ok(Json(json!({ "entry": entry })))
}

// ---------------------------------------------------------------------
// /v1/tts, /v1/image.generate, /v1/transcribe
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MultimediaRequest {
    provider: String,
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
    model: String,
    prompt: String,
}

async fn multimedia_dispatch(state: &Arc<AppState>, feature: MultimediaFeature, actor: &str, req: MultimediaRequest) -> Result<Value, RelayError> {
    use bridge_ratelimit::RateLimiter;
    let limiter = RateLimiter::new(&state.store, state.rate_caps.clone(), state.multimedia_caps.clone());
    if limiter.check_and_increment_multimedia(feature, actor, now_ms()).is_err() {
        return Err(RelayError::RateLimited);
    }

    let provider_req = ProviderRequest {
        provider: req.provider.clone(),
        base_url: req.base_url,
        api_key: req.api_key,
        model: req.model,
        messages: vec![bridge_providers::ChatMsg { role: "user".to_string(), content: req.prompt }],
        max_tokens: 2048,
        temperature: 0.0,
        top_p: 1.0,
        stop: vec![],
    };

    let provider = OpenAICompatProvider::new();
    let response = match provider.dispatch(&provider_req, &state.egress_config, tokio_util::sync::CancellationToken::new()).await {
        Ok(r) => r,
        Err(bridge_providers::ProviderError::Egress(e)) => {
            audit(state, AuditEvent::EgressBlocked(EgressBlocked {
                schema_version: 1,
                ts: now_ms() as f64,
                actor: actor.to_string(),
                url: provider_req.base_url.clone(),
                reason: e.code().to_string(),
            }));
            return Err(RelayError::Egress(e));
        }
        Err(other) => return Err(RelayError::Provider(other)),
    };

    let attachments = state.attachments();
    let redacted = bridge_providers::strip_inline_binary_content(&response.normalized.content, &attachments, &state.blob_dir, actor, &req.provider, now_sec())?;
    Ok(json!({ "content": redacted, "finishReason": response.normalized.finish_reason }))
}

pub async fn tts(State(state): State<Arc<AppState>>, method: Method, uri: axum::http::Uri, headers: HeaderMap, body: axum::body::Bytes) -> Result<impl IntoResponse, RelayError> {
    let scope = admit(&state, method.as_str(), uri.path(), &headers, &body, &[Scope::Direct, Scope::Public])?;
    let req: MultimediaRequest = serde_json::from_slice(&body).map_err(|e| RelayError::BadRequest(e.to_string()))?;
    let result = multimedia_dispatch(&state, MultimediaFeature::Tts, scope.as_str(), req).await?;
    Ok(Json(result))
}

pub async fn image_generate(State(state): State<Arc<AppState>>, method: Method, uri: axum::http::Uri, headers: HeaderMap, body: axum::body::Bytes) -> Result<impl IntoResponse, RelayError> {
    let scope = admit(&state, method.as_str(), uri.path(), &headers, &body, &[Scope::Direct, Scope::Public])?;
    let req: MultimediaRequest = serde_json::from_slice(&body).map_err(|e| RelayError::BadRequest(e.to_string()))?;
    let result = multimedia_dispatch(&state, MultimediaFeature::ImageGen, scope.as_str(), req).await?;
    Ok(Json(result))
}

pub async fn transcribe(State(state): State<Arc<AppState>>, method: Method, uri: axum::http::Uri, headers: HeaderMap, body: axum::body::Bytes) -> Result<impl IntoResponse, RelayError> {
    let scope = admit(&state, method.as_str(), uri.path(), &headers, &body, &[Scope::Direct, Scope::Public])?;
    let req: MultimediaRequest = serde_json::from_slice(&body).map_err(|e| RelayError::BadRequest(e.to_string()))?;
    let result = multimedia_dispatch(&state, MultimediaFeature::Transcription, scope.as_str(), req).await?;
    Ok(Json(result))
}

// ---------------------------------------------------------------------
// /v1/provider.proxy
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProviderProxyRequest {
    provider: String,
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
    model: String,
    messages: Vec<bridge_providers::ChatMsg>,
    #[serde(rename = "maxTokens", default = "default_max_tokens")]
    max_tokens: u64,
    #[serde(default)]
    temperature: f64,
    #[serde(rename = "topP", default = "default_top_p")]
    top_p: f64,
}

fn default_max_tokens() -> u64 {
    2048
}

fn default_top_p() -> f64 {
    1.0
}

pub async fn provider_proxy(State(state): State<Arc<AppState>>, method: Method, uri: axum::http::Uri, headers: HeaderMap, body: axum::body::Bytes) -> Result<impl IntoResponse, RelayError> {
    let scope = admit(&state, method.as_str(), uri.path(), &headers, &body, &[Scope::Direct, Scope::Public])?;
    let req: ProviderProxyRequest = serde_json::from_slice(&body).map_err(|e| RelayError::BadRequest(e.to_string()))?;

    let provider_req = ProviderRequest {
        provider: req.provider.clone(),
        base_url: req.base_url.clone(),
        api_key: req.api_key,
        model: req.model,
        messages: req.messages,
        max_tokens: req.max_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        stop: vec![],
    };

    let provider = OpenAICompatProvider::new();
    let response = match provider.dispatch(&provider_req, &state.egress_config, tokio_util::sync::CancellationToken::new()).await {
        Ok(r) => r,
        Err(bridge_providers::ProviderError::Egress(e)) => {
            audit(&state, AuditEvent::EgressBlocked(EgressBlocked {
                schema_version: 1,
                ts: now_ms() as f64,
                actor: scope.as_str().to_string(),
                url: req.base_url.clone(),
                reason: e.code().to_string(),
            }));
            return Err(RelayError::Egress(e));
        }
        Err(other) => return Err(RelayError::Provider(other)),
    };

    let filter = SecretFilter::outbound();
    let outcome = filter.scan(&response.normalized.content);
    if !outcome.matches.is_empty() {
        audit(&state, AuditEvent::SecretRedacted(SecretRedacted {
            schema_version: 1,
            ts: now_ms() as f64,
            boundary: "tool-result".to_string(),
            pattern_ids: outcome.matches.iter().map(|m| m.pattern_id.clone()).collect(),
            blocked: outcome.blocked,
        }));
    }
    if outcome.blocked {
        return Err(RelayError::BadRequest("response withheld: critical secret detected".into()));
    }

    let attachments = state.attachments();
    let stripped = bridge_providers::strip_inline_binary_content(&outcome.redacted_text, &attachments, &state.blob_dir, scope.as_str(), &req.provider, now_sec())?;

    Ok(Json(json!({
        "content": stripped,
        "finishReason": response.normalized.finish_reason,
        "usage": response.normalized.usage,
    })))
}

// ---------------------------------------------------------------------
// /v1/deliver-local-file
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DeliverLocalFileRequest {
    path: String,
    filename: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

pub async fn deliver_local_file(State(state): State<Arc<AppState>>, method: Method, uri: axum::http::Uri, headers: HeaderMap, body: axum::body::Bytes) -> Result<impl IntoResponse, RelayError> {
    let scope = admit(&state, method.as_str(), uri.path(), &headers, &body, &[Scope::Direct, Scope::Public])?;
    let req: DeliverLocalFileRequest = serde_json::from_slice(&body).map_err(|e| RelayError::BadRequest(e.to_string()))?;

    let bytes = std::fs::read(&req.path).map_err(|_| RelayError::NotFound)?;
    let hash = bridge_common::sha256_bytes(&bytes);
    let attachments = state.attachments();
    let token = attachments.mint(&hash, scope.as_str(), "local", &req.path, &req.filename, &req.mime_type, now_sec(), bridge_attachments::DEFAULT_TTL_SECS)?;
    Ok(Json(json!({ "attachmentRef": token })))
}

// ---------------------------------------------------------------------
// Session token minting — used by operators/tests, not in spec.md's
// table but necessary plumbing for the session-token half of spec §4.C.
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SessionTokenResponse {
    token: String,
    #[serde(rename = "expiresAt")]
    expires_at: i64,
}

pub async fn mint_session_token(State(state): State<Arc<AppState>>, method: Method, uri: axum::http::Uri, headers: HeaderMap, body: axum::body::Bytes) -> Result<impl IntoResponse, RelayError> {
    let scope = admit(&state, method.as_str(), uri.path(), &headers, &body, &[Scope::Direct, Scope::Public])?;
    let (token, expires_at) = state.sessions.issue(scope);
    let expires_at_sec = expires_at.duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    audit(&state, AuditEvent::SessionTokenIssued(SessionTokenIssued {
        schema_version: 1,
        ts: now_ms() as f64,
        scope: scope.as_str().to_string(),
        expires_at: expires_at_sec,
    }));
    Ok(Json(SessionTokenResponse { token, expires_at: expires_at_sec }))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "ok": true, "service": "bridge-relay" })))
}
