//! bridge-agent
//!
//! The sandboxed half of the bridge (spec §1): hosts the LLM/tool-
//! execution runtime inside a network-firewalled container. Exposes
//! `GET /health` and the streaming `POST /v1/query` entry point, and
//! calls back out to the Relay's capability router for memory, media,
//! and provider access.

mod error;
mod handlers;
mod persona;
mod query;
mod state;

use axum::routing::{get, post};
use axum::Router;
use bridge_envelope::NonceStore;
use state::{AgentKeyResolver, AppState, Persona};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

fn verifying_key_from_env(var: &str) -> bridge_crypto::VerifyingKeyMaterial {
    match std::env::var(var) {
        Ok(raw) => {
            let bytes = bridge_common::b64url_decode(&raw).expect("key env var must be base64url");
            if bytes.len() == 32 {
                bridge_crypto::ed25519_verifying_key_from_bytes(&bytes).expect("invalid ed25519 verifying key bytes")
            } else {
                bridge_crypto::VerifyingKeyMaterial::Hmac(bytes)
            }
        }
        Err(_) => {
            tracing::warn!(var, "no key configured, generating an ephemeral HMAC secret for this process");
            bridge_crypto::VerifyingKeyMaterial::Hmac(bridge_crypto::random_bytes(32))
        }
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    // Distinct trust domain from the Relay's capability-router keys: here
    // the Relay is the signer (it calls /v1/query) and the Agent is the
    // verifier, the opposite direction of a capability call.
    let keys = AgentKeyResolver {
        direct: verifying_key_from_env("BRIDGE_AGENT_DIRECT_VERIFYING_KEY"),
        public: verifying_key_from_env("BRIDGE_AGENT_PUBLIC_VERIFYING_KEY"),
    };

    let persona = Persona {
        private_description: std::env::var("BRIDGE_PERSONA_PRIVATE").unwrap_or_else(|_| "You are the private assistant persona.".to_string()),
        public_description: std::env::var("BRIDGE_PERSONA_PUBLIC").unwrap_or_else(|_| "You are the public social persona.".to_string()),
        provider_summary: std::env::var("BRIDGE_PROVIDER_SUMMARY").ok(),
    };

    let state = Arc::new(AppState {
        keys,
        nonces: NonceStore::new(),
        persona,
        started_at: chrono::Utc::now(),
        start_instant: std::time::Instant::now(),
        revision: std::env::var("BRIDGE_AGENT_REVISION").unwrap_or_else(|_| "unknown".to_string()),
    });

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/query", post(handlers::query))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = std::env::var("BRIDGE_AGENT_ADDR").unwrap_or_else(|_| "0.0.0.0:8081".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind agent listener");
    tracing::info!(%addr, "bridge-agent listening");
    axum::serve(listener, app).await.expect("agent server error");
}
