//! The process-wide Key-Encryption-Key.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::InvalidEnvelope;

/// 32 bytes, read-only after startup, zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct Kek([u8; 32]);

impl Kek {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Load from the base64 form the `kek` environment option carries.
    pub fn from_base64(encoded: &str) -> Result<Self, InvalidEnvelope> {
        use base64::Engine;
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| InvalidEnvelope(format!("kek base64: {e}")))?;
        let arr: [u8; 32] = raw
            .try_into()
            .map_err(|_| InvalidEnvelope("kek must be exactly 32 bytes".into()))?;
        Ok(Self(arr))
    }

    pub(crate) fn bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Kek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Kek(..)")
    }
}

/// Guard that zeroizes a derived DEK as soon as it leaves scope.
pub(crate) struct Dek(pub [u8; 32]);

impl Drop for Dek {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}
