//! bridge_crypto
//!
//! Component A — crypto primitives shared by the envelope signer/verifier,
//! the session token issuer, and attachment ref signing:
//! - Ed25519 sign/verify
//! - HMAC-SHA256 sign/verify
//! - constant-time compare (re-exported from bridge_common)
//! - random byte generation for nonces and tokens
//!
//! No scope/policy decisions live here. This crate only does bytes in,
//! bytes out.

use bridge_common::constant_time_eq;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("invalid signature encoding")]
    InvalidSignature,
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Per-scope signing key material. The Agent holds the private half
/// (`Ed25519 { signing }` or `Hmac`); the Relay holds the verifying half
/// (`Ed25519 { verifying }` or the same shared `Hmac` secret).
#[derive(Clone)]
pub enum SigningKeyMaterial {
    Ed25519(Box<SigningKey>),
    Hmac(Vec<u8>),
}

#[derive(Clone)]
pub enum VerifyingKeyMaterial {
    Ed25519(Box<VerifyingKey>),
    Hmac(Vec<u8>),
}

impl SigningKeyMaterial {
    pub fn algorithm(&self) -> &'static str {
        match self {
            SigningKeyMaterial::Ed25519(_) => "ed25519",
            SigningKeyMaterial::Hmac(_) => "hmac-sha256",
        }
    }

    /// Raw key bytes, for operator tooling (`bridge-ctl keygen`) that
    /// needs to persist or print the key material.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            SigningKeyMaterial::Ed25519(sk) => sk.to_bytes().to_vec(),
            SigningKeyMaterial::Hmac(secret) => secret.clone(),
        }
    }

    /// Sign `message` and return the raw signature bytes.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            SigningKeyMaterial::Ed25519(sk) => sk.sign(message).to_bytes().to_vec(),
            SigningKeyMaterial::Hmac(secret) => {
                let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
                mac.update(message);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }
}

impl VerifyingKeyMaterial {
    pub fn algorithm(&self) -> &'static str {
        match self {
            VerifyingKeyMaterial::Ed25519(_) => "ed25519",
            VerifyingKeyMaterial::Hmac(_) => "hmac-sha256",
        }
    }

    /// Raw key bytes, for operator tooling (`bridge-ctl keygen`) that
    /// needs to persist or print the key material.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            VerifyingKeyMaterial::Ed25519(vk) => vk.to_bytes().to_vec(),
            VerifyingKeyMaterial::Hmac(secret) => secret.clone(),
        }
    }

    /// Verify `signature` over `message`. Constant-time for the HMAC path;
    /// Ed25519 verification is constant-time internally in ed25519-dalek.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        match self {
            VerifyingKeyMaterial::Ed25519(vk) => {
                let sig = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
                vk.verify(message, &sig)
                    .map_err(|_| CryptoError::VerificationFailed)
            }
            VerifyingKeyMaterial::Hmac(secret) => {
                let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
                mac.update(message);
                let expected = mac.finalize().into_bytes();
                if constant_time_eq(&expected, signature) {
                    Ok(())
                } else {
                    Err(CryptoError::VerificationFailed)
                }
            }
        }
    }
}

/// Generate a fresh Ed25519 keypair (signing half stays with the caller,
/// verifying half is distributed to the counterparty). Used by
/// `bridge-ctl keygen` and by tests.
pub fn generate_ed25519_keypair() -> (SigningKeyMaterial, VerifyingKeyMaterial) {
    let mut csprng = rand::rngs::OsRng;
    let signing = SigningKey::generate(&mut csprng);
    let verifying = signing.verifying_key();
    (
        SigningKeyMaterial::Ed25519(Box::new(signing)),
        VerifyingKeyMaterial::Ed25519(Box::new(verifying)),
    )
}

pub fn ed25519_signing_key_from_bytes(bytes: &[u8]) -> Result<SigningKeyMaterial, CryptoError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength { expected: 32, got: bytes.len() })?;
    Ok(SigningKeyMaterial::Ed25519(Box::new(SigningKey::from_bytes(&arr))))
}

pub fn ed25519_verifying_key_from_bytes(bytes: &[u8]) -> Result<VerifyingKeyMaterial, CryptoError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength { expected: 32, got: bytes.len() })?;
    let vk = VerifyingKey::from_bytes(&arr).map_err(|_| CryptoError::InvalidSignature)?;
    Ok(VerifyingKeyMaterial::Ed25519(Box::new(vk)))
}

/// `n` cryptographically random bytes, for nonces and session tokens.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_round_trip_verifies() {
        let (sk, vk) = generate_ed25519_keypair();
        let msg = b"method\npath\nts\nnonce\nscope\nbodyhash";
        let sig = sk.sign(msg);
        vk.verify(msg, &sig).unwrap();
    }

    #[test]
    fn ed25519_tampered_message_fails() {
        let (sk, vk) = generate_ed25519_keypair();
        let sig = sk.sign(b"hello");
        assert!(vk.verify(b"hellp", &sig).is_err());
    }

    #[test]
    fn hmac_round_trip_verifies() {
        let secret = random_bytes(32);
        let sk = SigningKeyMaterial::Hmac(secret.clone());
        let vk = VerifyingKeyMaterial::Hmac(secret);
        let sig = sk.sign(b"payload");
        vk.verify(b"payload", &sig).unwrap();
    }

    #[test]
    fn hmac_wrong_secret_fails() {
        let sk = SigningKeyMaterial::Hmac(random_bytes(32));
        let vk = VerifyingKeyMaterial::Hmac(random_bytes(32));
        let sig = sk.sign(b"payload");
        assert!(vk.verify(b"payload", &sig).is_err());
    }

    #[test]
    fn ed25519_to_bytes_round_trips_through_from_bytes() {
        let (sk, vk) = generate_ed25519_keypair();
        let sk2 = ed25519_signing_key_from_bytes(&sk.to_bytes()).unwrap();
        let vk2 = ed25519_verifying_key_from_bytes(&vk.to_bytes()).unwrap();
        let sig = sk2.sign(b"payload");
        vk2.verify(b"payload", &sig).unwrap();
    }

    #[test]
    fn random_bytes_are_distinct() {
        let a = random_bytes(16);
        let b = random_bytes(16);
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
    }
}
