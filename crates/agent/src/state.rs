use bridge_envelope::{NonceStore, Scope, ScopeKeyResolver};
use std::time::Instant;

/// Verifies envelopes the Relay signs when it calls `/v1/query`. This is a
/// distinct trust domain from the Relay's own capability-router key
/// material: the Relay is the signer here, the Agent is the verifier,
/// which is the opposite direction of a capability call.
pub struct AgentKeyResolver {
    pub direct: bridge_crypto::VerifyingKeyMaterial,
    pub public: bridge_crypto::VerifyingKeyMaterial,
}

impl ScopeKeyResolver for AgentKeyResolver {
    fn resolve(&self, scope: Scope) -> Option<bridge_crypto::VerifyingKeyMaterial> {
        Some(match scope {
            Scope::Direct => self.direct.clone(),
            Scope::Public => self.public.clone(),
        })
    }
}

pub struct Persona {
    pub private_description: String,
    pub public_description: String,
    pub provider_summary: Option<String>,
}

pub struct AppState {
    pub keys: AgentKeyResolver,
    pub nonces: NonceStore,
    pub persona: Persona,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub start_instant: Instant,
    pub revision: String,
}

impl AppState {
    pub fn uptime_seconds(&self) -> u64 {
        self.start_instant.elapsed().as_secs()
    }
}
