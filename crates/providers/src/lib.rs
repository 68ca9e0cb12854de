//! bridge_providers
//!
//! Provider transport + normalization ONLY. No policy, no rate limiting,
//! no audit — those live in the Relay's capability router. Every
//! outbound call crosses `bridge_egress::fetch` rather than a bare
//! `reqwest::Client`: unlike the control plane this crate was lifted
//! from, the Agent here has no direct egress, so even provider calls
//! made on its behalf must pass through the egress guard (spec §4.K).

use async_trait::async_trait;
use bridge_attachments::{AttachmentError, AttachmentStore};
use bridge_common::sha256_bytes;
use bridge_egress::{fetch, EgressConfig, EgressError};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("egress error: {0}")]
    Egress(#[from] EgressError),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("attachment error: {0}")]
    Attachment(#[from] AttachmentError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMsg {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReply {
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Usage,
    /// Raw provider request id if present (control plane hashes it for audit)
    pub provider_request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub raw_json: Value,
    pub normalized: ProviderReply,
}

/// Outbound chat-completion request. Replaces the control plane's
/// internal `ModelRequest`/`SanitizedModelRequest` split: the Relay
/// already applies the secret filter and field-size caps (spec §4.G)
/// before a request reaches this crate, so there is nothing left for
/// this crate to sanitize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub provider: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub messages: Vec<ChatMsg>,
    pub max_tokens: u64,
    pub temperature: f64,
    pub top_p: f64,
    #[serde(default)]
    pub stop: Vec<String>,
}

#[async_trait]
pub trait Provider: Send + Sync {
    async fn dispatch(
        &self,
        req: &ProviderRequest,
        egress_config: &EgressConfig,
        cancel: CancellationToken,
    ) -> Result<ProviderResponse, ProviderError>;
}

pub struct OpenAICompatProvider;

impl OpenAICompatProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OpenAICompatProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
struct OpenAICompatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMsg],
    max_tokens: u64,
    temperature: f64,
    top_p: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[async_trait]
impl Provider for OpenAICompatProvider {
    async fn dispatch(
        &self,
        req: &ProviderRequest,
        egress_config: &EgressConfig,
        cancel: CancellationToken,
    ) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/v1/chat/completions", req.base_url.trim_end_matches('/'));
        let body = OpenAICompatRequest {
            model: &req.model,
            messages: &req.messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            stop: req.stop.clone(),
        };
        let body_bytes = serde_json::to_vec(&body)?;

        let outcome = fetch(Method::POST, &url, Some(body_bytes), egress_config, cancel).await?;
        let bytes = outcome.response.bytes().await?;
        let raw: Value = serde_json::from_slice(&bytes)?;

        let content = raw
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c0| c0.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::InvalidResponse("missing choices[0].message.content".into()))?
            .to_string();

        let finish_reason = raw
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c0| c0.get("finish_reason"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let input_tokens = raw.get("usage").and_then(|u| u.get("prompt_tokens")).and_then(|v| v.as_u64());
        let output_tokens = raw.get("usage").and_then(|u| u.get("completion_tokens")).and_then(|v| v.as_u64());
        let provider_request_id = raw.get("id").and_then(|v| v.as_str()).map(|s| s.to_string());

        Ok(ProviderResponse {
            raw_json: raw.clone(),
            normalized: ProviderReply {
                content,
                finish_reason,
                usage: Usage { input_tokens, output_tokens },
                provider_request_id,
            },
        })
    }
}

// Placeholder: Anthropic/XAI can be added as separate providers later.
// Both speak an OpenAI-compatible chat shape behind most gateways, so
// OpenAICompatProvider covers them today.

const INLINE_BINARY_THRESHOLD_BYTES: usize = 8 * 1024;

/// Finds `data:<mime>;base64,<payload>` URIs in `content` at or above
/// `INLINE_BINARY_THRESHOLD_BYTES` decoded size, writes the decoded
/// bytes under `blob_dir`, mints an attachment ref for each, and
/// replaces the data URI with `attachment:<token>` (spec §4.G /
/// §4.K: provider-proxy responses strip inline binary content above a
/// size threshold rather than returning it inline).
pub fn strip_inline_binary_content(
    content: &str,
    attachments: &AttachmentStore<'_>,
    blob_dir: &Path,
    actor: &str,
    provider: &str,
    now_sec: i64,
) -> Result<String, ProviderError> {
    std::fs::create_dir_all(blob_dir)?;
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("data:") {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let Some(comma) = candidate.find(',') else {
            out.push_str(candidate);
            rest = "";
            break;
        };
        let header = &candidate[..comma];
        let Some(mime_type) = header.strip_prefix("data:").and_then(|h| h.split(';').next()) else {
            out.push_str(&candidate[..comma + 1]);
            rest = &candidate[comma + 1..];
            continue;
        };
        let is_base64 = header.contains(";base64");

        let payload_end = candidate[comma + 1..]
            .find(|c: char| c.is_whitespace() || c == '"')
            .map(|i| comma + 1 + i)
            .unwrap_or(candidate.len());
        let payload = &candidate[comma + 1..payload_end];

        if !is_base64 || payload.len() < INLINE_BINARY_THRESHOLD_BYTES {
            out.push_str(&candidate[..payload_end]);
            rest = &candidate[payload_end..];
            continue;
        }

        let decoded = match base64::Engine::decode(&base64::engine::general_purpose::STANDARD, payload) {
            Ok(d) => d,
            Err(_) => {
                out.push_str(&candidate[..payload_end]);
                rest = &candidate[payload_end..];
                continue;
            }
        };

        let hash = sha256_bytes(&decoded);
        let filename = format!("{}.bin", hash.trim_start_matches("sha256:"));
        let filepath = blob_dir.join(&filename);
        std::fs::write(&filepath, &decoded)?;

        let token = attachments.mint(
            &hash,
            actor,
            provider,
            filepath.to_string_lossy().as_ref(),
            &filename,
            mime_type,
            now_sec,
            bridge_attachments::DEFAULT_TTL_SECS,
        )?;

        out.push_str("attachment:");
        out.push_str(&token);
        rest = &candidate[payload_end..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_crypto::{random_bytes, SigningKeyMaterial};
    use bridge_store::Store;

    fn setup_attachments() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("bridge.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn small_inline_payload_is_left_alone() {
        let (dir, store) = setup_attachments();
        let key = SigningKeyMaterial::Hmac(random_bytes(32));
        let attachments = AttachmentStore::new(&store, key);
        let content = "here: data:image/png;base64,aGVsbG8= done";
        let out = strip_inline_binary_content(content, &attachments, dir.path(), "alice", "openai", 0).unwrap();
        assert_eq!(out, content);
    }

    #[test]
    fn large_inline_payload_is_replaced_with_attachment_ref() {
        let (dir, store) = setup_attachments();
        let key = SigningKeyMaterial::Hmac(random_bytes(32));
        let attachments = AttachmentStore::new(&store, key);

        let big_payload = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, vec![7u8; 16 * 1024]);
        let content = format!("img: data:image/png;base64,{big_payload} ok");

        let out = strip_inline_binary_content(&content, &attachments, dir.path(), "alice", "openai", 0).unwrap();
        assert!(out.contains("attachment:att_"));
        assert!(!out.contains(&big_payload));
        assert!(out.ends_with(" ok"));
    }

    #[test]
    fn chat_msg_round_trips_through_json() {
        let msg = ChatMsg { role: "user".into(), content: "hi".into() };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "hi");
    }
}
