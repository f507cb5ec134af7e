//! The envelope token: `ENC:v1:<salt_b64>:<iv_b64>:<ciphertext||tag_b64>`.

use base64::Engine;

use crate::aead;
use crate::error::{EnvelopeError, InvalidEnvelope};
use crate::kdf::derive_dek;
use crate::kek::{Dek, Kek};
use crate::metadata::EncryptionMetadata;

const PREFIX: &str = "ENC:v1:";
const SALT_LEN: usize = 32;
const IV_LEN: usize = 12;

/// Stateless facade over seal/open. Holds no key material itself — every
/// call takes the [`Kek`] explicitly.
#[derive(Debug, Default)]
pub struct Envelope;

impl Envelope {
    pub fn new() -> Self {
        Self
    }

    /// `v` starts with the envelope prefix. Does not otherwise validate.
    pub fn is_encrypted(v: &str) -> bool {
        v.starts_with(PREFIX)
    }

    /// Encrypt `plaintext`, binding `metadata` as AAD. Non-deterministic:
    /// every call draws a fresh salt and IV.
    pub fn encrypt(&self, kek: &Kek, metadata: &EncryptionMetadata, plaintext: &[u8]) -> Result<String, EnvelopeError> {
        let salt = aead::random_salt()?;
        let iv = aead::random_iv()?;
        let dek = Dek(derive_dek(kek.bytes(), &salt)?);

        let aad = metadata.to_aad_bytes();
        let ct_and_tag = aead::seal(&dek.0, &iv, plaintext, &aad)?;

        let b64 = base64::engine::general_purpose::STANDARD;
        Ok(format!(
            "{PREFIX}{}:{}:{}",
            b64.encode(salt),
            b64.encode(iv),
            b64.encode(ct_and_tag),
        ))
    }

    /// Parse `token`, re-derive the DEK, and verify+decrypt with `metadata`
    /// as AAD. Any tamper of salt, IV, ciphertext, or a metadata mismatch
    /// fails with [`EnvelopeError::DecryptionIntegrityError`].
    pub fn decrypt(&self, kek: &Kek, metadata: &EncryptionMetadata, token: &str) -> Result<Vec<u8>, EnvelopeError> {
        let (salt, iv, ct_and_tag) = parse(token)?;
        let dek = Dek(derive_dek(kek.bytes(), &salt)?);
        let aad = metadata.to_aad_bytes();
        aead::open(&dek.0, &iv, &ct_and_tag, &aad).map_err(Into::into)
    }
}

fn parse(token: &str) -> Result<([u8; 32], [u8; 12], Vec<u8>), InvalidEnvelope> {
    let rest = token
        .strip_prefix(PREFIX)
        .ok_or_else(|| InvalidEnvelope("missing ENC:v1: prefix".into()))?;

    let mut parts = rest.splitn(3, ':');
    let salt_b64 = parts.next().ok_or_else(|| InvalidEnvelope("missing salt".into()))?;
    let iv_b64 = parts.next().ok_or_else(|| InvalidEnvelope("missing iv".into()))?;
    let ct_b64 = parts.next().ok_or_else(|| InvalidEnvelope("missing ciphertext".into()))?;

    let b64 = base64::engine::general_purpose::STANDARD;
    let salt_bytes = b64
        .decode(salt_b64)
        .map_err(|e| InvalidEnvelope(format!("salt base64: {e}")))?;
    let iv_bytes = b64
        .decode(iv_b64)
        .map_err(|e| InvalidEnvelope(format!("iv base64: {e}")))?;
    let ct_and_tag = b64
        .decode(ct_b64)
        .map_err(|e| InvalidEnvelope(format!("ciphertext base64: {e}")))?;

    let salt: [u8; SALT_LEN] = salt_bytes
        .try_into()
        .map_err(|_| InvalidEnvelope(format!("salt must be {SALT_LEN} bytes")))?;
    let iv: [u8; IV_LEN] = iv_bytes
        .try_into()
        .map_err(|_| InvalidEnvelope(format!("iv must be {IV_LEN} bytes")))?;

    Ok((salt, iv, ct_and_tag))
}
