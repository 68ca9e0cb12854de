//! bridge_attachments
//!
//! Opaque, signed, TTL'd handles to stored artifacts (spec §3
//! "Attachment ref"). A token is `att_<hash>.<expiresAtSec>.<sig16>`
//! where `sig16` is the first 16 hex characters of an HMAC over
//! `(prefix, actor, provider, filepath, filename, mimeType)`. Binds the
//! bearer to exactly one artifact under one actor.

use bridge_common::constant_time_eq;
use bridge_crypto::SigningKeyMaterial;
use bridge_store::{Store, StoreError};
use rusqlite::{params, OptionalExtension};
use thiserror::Error;

pub const DEFAULT_TTL_SECS: i64 = 900;
const TOKEN_PREFIX: &str = "att";

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("malformed attachment token")]
    Malformed,
    #[error("attachment token expired")]
    Expired,
    #[error("attachment token signature mismatch")]
    BadSignature,
    #[error("no attachment registered for this hash")]
    NotFound,
    #[error("token's bound actor does not match the caller")]
    ActorMismatch,
}

#[derive(Debug, Clone)]
pub struct AttachmentMeta {
    pub hash: String,
    pub actor: String,
    pub provider: String,
    pub filepath: String,
    pub filename: String,
    pub mime_type: String,
    pub created_at: i64,
    pub expires_at: i64,
}

pub struct AttachmentStore<'a> {
    store: &'a Store,
    signing_key: SigningKeyMaterial,
}

impl<'a> AttachmentStore<'a> {
    pub fn new(store: &'a Store, signing_key: SigningKeyMaterial) -> Self {
        Self { store, signing_key }
    }

    /// Registers an artifact's metadata and mints a bearer token for it.
    /// `hash` is the caller-computed content hash of the stored artifact
    /// (see `bridge_common::sha256_bytes`); this crate does not hash the
    /// artifact bytes itself, since the blob may already be on disk.
    pub fn mint(
        &self,
        hash: &str,
        actor: &str,
        provider: &str,
        filepath: &str,
        filename: &str,
        mime_type: &str,
        now_sec: i64,
        ttl_secs: i64,
    ) -> Result<String, AttachmentError> {
        let expires_at = now_sec + ttl_secs;
        let conn = self.store.checkout()?;
        conn.execute(
            "INSERT INTO attachment_refs (hash, actor, provider, filepath, filename, mime_type, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(hash) DO UPDATE SET actor = excluded.actor, expires_at = excluded.expires_at",
            params![hash, actor, provider, filepath, filename, mime_type, now_sec, expires_at],
        )
        .map_err(StoreError::from)?;

        let sig16 = self.sign16(actor, provider, filepath, filename, mime_type);
        Ok(format!("{TOKEN_PREFIX}_{hash}.{expires_at}.{sig16}"))
    }

    fn sign16(&self, actor: &str, provider: &str, filepath: &str, filename: &str, mime_type: &str) -> String {
        let message = format!("{TOKEN_PREFIX}\n{actor}\n{provider}\n{filepath}\n{filename}\n{mime_type}");
        let sig = self.signing_key.sign(message.as_bytes());
        hex::encode(&sig)[..16].to_string()
    }

    /// Verifies `token` was minted for `actor` and is still live, then
    /// returns the artifact metadata it is bound to.
    pub fn verify(&self, token: &str, actor: &str, now_sec: i64) -> Result<AttachmentMeta, AttachmentError> {
        let rest = token.strip_prefix("att_").ok_or(AttachmentError::Malformed)?;
        let mut parts = rest.splitn(3, '.');
        let hash = parts.next().ok_or(AttachmentError::Malformed)?;
        let expires_at: i64 = parts.next().ok_or(AttachmentError::Malformed)?.parse().map_err(|_| AttachmentError::Malformed)?;
        let sig16 = parts.next().ok_or(AttachmentError::Malformed)?;
        if parts.next().is_some() {
            return Err(AttachmentError::Malformed);
        }

        let conn = self.store.checkout()?;
        let row = conn
            .query_row(
                "SELECT hash, actor, provider, filepath, filename, mime_type, created_at, expires_at
                 FROM attachment_refs WHERE hash = ?1",
                params![hash],
                |r| {
                    Ok(AttachmentMeta {
                        hash: r.get(0)?,
                        actor: r.get(1)?,
                        provider: r.get(2)?,
                        filepath: r.get(3)?,
                        filename: r.get(4)?,
                        mime_type: r.get(5)?,
                        created_at: r.get(6)?,
                        expires_at: r.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)?
            .ok_or(AttachmentError::NotFound)?;

        if row.actor != actor {
            return Err(AttachmentError::ActorMismatch);
        }
        if now_sec > expires_at || now_sec > row.expires_at {
            return Err(AttachmentError::Expired);
        }

        let expected_sig16 = self.sign16(&row.actor, &row.provider, &row.filepath, &row.filename, &row.mime_type);
        if !constant_time_eq(expected_sig16.as_bytes(), sig16.as_bytes()) {
            return Err(AttachmentError::BadSignature);
        }

        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_crypto::random_bytes;

    fn setup() -> (Store, SigningKeyMaterial) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("bridge.db")).unwrap();
        (store, SigningKeyMaterial::Hmac(random_bytes(32)))
    }

    #[test]
    fn mint_then_verify_round_trips() {
        let (store, key) = setup();
        let attachments = AttachmentStore::new(&store, key);
        let token = attachments
            .mint("sha256:deadbeef", "alice", "openai", "/tmp/x.png", "x.png", "image/png", 0, DEFAULT_TTL_SECS)
            .unwrap();
        let meta = attachments.verify(&token, "alice", 10).unwrap();
        assert_eq!(meta.filename, "x.png");
    }

    #[test]
    fn verify_rejects_wrong_actor() {
        let (store, key) = setup();
        let attachments = AttachmentStore::new(&store, key);
        let token = attachments
            .mint("sha256:deadbeef", "alice", "openai", "/tmp/x.png", "x.png", "image/png", 0, DEFAULT_TTL_SECS)
            .unwrap();
        let err = attachments.verify(&token, "mallory", 10).unwrap_err();
        assert!(matches!(err, AttachmentError::ActorMismatch));
    }

    #[test]
    fn verify_rejects_expired_token() {
        let (store, key) = setup();
        let attachments = AttachmentStore::new(&store, key);
        let token = attachments
            .mint("sha256:deadbeef", "alice", "openai", "/tmp/x.png", "x.png", "image/png", 0, 900)
            .unwrap();
        let err = attachments.verify(&token, "alice", 901).unwrap_err();
        assert!(matches!(err, AttachmentError::Expired));
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let (store, key) = setup();
        let attachments = AttachmentStore::new(&store, key);
        let token = attachments
            .mint("sha256:deadbeef", "alice", "openai", "/tmp/x.png", "x.png", "image/png", 0, DEFAULT_TTL_SECS)
            .unwrap();
        let tampered = token.replace(token.split('.').last().unwrap(), "0000000000000000");
        let err = attachments.verify(&tampered, "alice", 10).unwrap_err();
        assert!(matches!(err, AttachmentError::BadSignature));
    }
}
