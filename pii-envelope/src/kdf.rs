//! Per-value DEK derivation.
//!
//! `DEK = HKDF-SHA256(ikm = KEK, salt = salt, info = "pii-dek")`, 32 bytes
//! out. A fresh random salt per `encrypt` call means every DEK is used
//! exactly once.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::KeyUnavailable;

const DEK_INFO: &[u8] = b"pii-dek";

pub fn derive_dek(kek: &[u8; 32], salt: &[u8; 32]) -> Result<[u8; 32], KeyUnavailable> {
    let hk = Hkdf::<Sha256>::new(Some(salt), kek);
    let mut out = [0u8; 32];
    hk.expand(DEK_INFO, &mut out).map_err(|_| KeyUnavailable)?;
    Ok(out)
}
