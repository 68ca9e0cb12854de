//! bridge-relay
//!
//! The externally-facing half of the bridge (spec §1): the capability
//! RPC router (component G). Exposes the Agent-facing HTTP surface for
//! memory, media generation, provider proxying, and attachment
//! delivery, gated by signed-envelope/session-token auth, scope checks,
//! and rate limiting.

mod auth;
mod error;
mod handlers;
mod pipeline;
mod state;
mod time;
mod validation;

use axum::routing::{get, post};
use axum::Router;
use bridge_audit_log::AuditAppender;
use bridge_crypto::SigningKeyMaterial;
use bridge_egress::EgressConfig;
use bridge_envelope::NonceStore;
use bridge_ratelimit::{MultimediaCaps, RateLimitCaps};
use bridge_session::SessionTokenIssuer;
use bridge_store::Store;
use state::{AppState, RelayKeyResolver};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::trace::TraceLayer;

fn verifying_key_from_env(var: &str) -> SigningKeyMaterialEnvelope {
    match std::env::var(var) {
        Ok(raw) => {
            let bytes = bridge_common::b64url_decode(&raw).expect("key env var must be base64url");
            if bytes.len() == 32 {
                SigningKeyMaterialEnvelope::Ed25519(bytes)
            } else {
                SigningKeyMaterialEnvelope::Hmac(bytes)
            }
        }
        Err(_) => {
            tracing::warn!(var, "no key configured, generating an ephemeral HMAC secret for this process");
            SigningKeyMaterialEnvelope::Hmac(bridge_crypto::random_bytes(32))
        }
    }
}

enum SigningKeyMaterialEnvelope {
    Ed25519(Vec<u8>),
    Hmac(Vec<u8>),
}

impl SigningKeyMaterialEnvelope {
    fn into_verifying(self) -> bridge_crypto::VerifyingKeyMaterial {
        match self {
            SigningKeyMaterialEnvelope::Ed25519(bytes) => {
                bridge_crypto::ed25519_verifying_key_from_bytes(&bytes).expect("invalid ed25519 verifying key bytes")
            }
            SigningKeyMaterialEnvelope::Hmac(bytes) => bridge_crypto::VerifyingKeyMaterial::Hmac(bytes),
        }
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let data_dir = std::env::var("BRIDGE_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    std::fs::create_dir_all(&data_dir).expect("failed to create data directory");

    let store = Store::open(PathBuf::from(&data_dir).join("bridge.db")).expect("failed to open store");
    let audit = AuditAppender::open(PathBuf::from(&data_dir).join("audit.jsonl")).expect("failed to open audit log");

    let keys = RelayKeyResolver {
        direct: verifying_key_from_env("BRIDGE_DIRECT_VERIFYING_KEY").into_verifying(),
        public: verifying_key_from_env("BRIDGE_PUBLIC_VERIFYING_KEY").into_verifying(),
    };

    let attachment_signing_key = match std::env::var("BRIDGE_ATTACHMENT_SIGNING_KEY") {
        Ok(raw) => SigningKeyMaterial::Hmac(bridge_common::b64url_decode(&raw).expect("invalid attachment signing key")),
        Err(_) => SigningKeyMaterial::Hmac(bridge_crypto::random_bytes(32)),
    };

    let state = Arc::new(AppState {
        store,
        keys,
        nonces: NonceStore::new(),
        sessions: SessionTokenIssuer::default(),
        rate_caps: RateLimitCaps::default(),
        multimedia_caps: MultimediaCaps::default(),
        egress_config: EgressConfig::default(),
        attachment_signing_key,
        blob_dir: PathBuf::from(&data_dir).join("blobs"),
        audit: Mutex::new(audit),
    });

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/memory.propose", post(handlers::memory_propose))
        .route("/v1/memory.snapshot", post(handlers::memory_snapshot))
        .route("/v1/memory.quarantine", post(handlers::memory_quarantine))
        .route("/v1/memory.promote", post(handlers::memory_promote))
        .route("/v1/tts", post(handlers::tts))
        .route("/v1/image.generate", post(handlers::image_generate))
        .route("/v1/transcribe", post(handlers::transcribe))
        .route("/v1/provider.proxy", post(handlers::provider_proxy))
        .route("/v1/deliver-local-file", post(handlers::deliver_local_file))
        .route("/v1/session.mint", post(handlers::mint_session_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = std::env::var("BRIDGE_RELAY_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind relay listener");
    tracing::info!(%addr, "bridge-relay listening");
    axum::serve(listener, app).await.expect("relay server error");
}
