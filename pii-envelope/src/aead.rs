//! AEAD primitive: AES-256-GCM.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use getrandom::getrandom;

use crate::error::{DecryptionIntegrityError, KeyUnavailable};

/// Generate a random 96-bit IV. Used on the encrypt path only.
pub fn random_iv() -> Result<[u8; 12], KeyUnavailable> {
    let mut iv = [0u8; 12];
    getrandom(&mut iv).map_err(|_| KeyUnavailable)?;
    Ok(iv)
}

/// Generate a random 256-bit salt. Used on the encrypt path only.
pub fn random_salt() -> Result<[u8; 32], KeyUnavailable> {
    let mut salt = [0u8; 32];
    getrandom(&mut salt).map_err(|_| KeyUnavailable)?;
    Ok(salt)
}

pub fn seal(key: &[u8; 32], iv: &[u8; 12], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, KeyUnavailable> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| KeyUnavailable)?;
    let nonce = Nonce::from_slice(iv);
    cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| KeyUnavailable)
}

pub fn open(key: &[u8; 32], iv: &[u8; 12], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, DecryptionIntegrityError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| DecryptionIntegrityError)?;
    let nonce = Nonce::from_slice(iv);
    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| DecryptionIntegrityError)
}
