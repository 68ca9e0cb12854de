use bridge_attachments::AttachmentStore;
use bridge_audit_log::AuditAppender;
use bridge_crypto::{SigningKeyMaterial, VerifyingKeyMaterial};
use bridge_egress::EgressConfig;
use bridge_envelope::{NonceStore, Scope, ScopeKeyResolver};
use bridge_ratelimit::{MultimediaCaps, RateLimitCaps};
use bridge_session::SessionTokenIssuer;
use bridge_store::Store;
use std::path::PathBuf;
use std::sync::Mutex;

/// Holds the Relay's verifying keys for each scope — the other half of
/// the Agent's per-scope signing keys (spec §3 "Key material").
pub struct RelayKeyResolver {
    pub direct: VerifyingKeyMaterial,
    pub public: VerifyingKeyMaterial,
}

impl ScopeKeyResolver for RelayKeyResolver {
    fn resolve(&self, scope: Scope) -> Option<VerifyingKeyMaterial> {
        match scope {
            Scope::Direct => Some(self.direct.clone()),
            Scope::Public => Some(self.public.clone()),
        }
    }
}

pub struct AppState {
    pub store: Store,
    pub keys: RelayKeyResolver,
    pub nonces: NonceStore,
    pub sessions: SessionTokenIssuer,
    pub rate_caps: RateLimitCaps,
    pub multimedia_caps: MultimediaCaps,
    pub egress_config: EgressConfig,
    pub attachment_signing_key: SigningKeyMaterial,
    pub blob_dir: PathBuf,
    pub audit: Mutex<AuditAppender>,
}

impl AppState {
    pub fn attachments(&self) -> AttachmentStore<'_> {
        AttachmentStore::new(&self.store, self.attachment_signing_key.clone())
    }
}
