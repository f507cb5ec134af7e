//! Error types for envelope sealing/opening.
//!
//! Hand-rolled rather than derived: callers match on variants and the
//! messages never carry plaintext or key material.

use core::fmt;

/// The process-wide KEK was never loaded or has been cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUnavailable;

impl fmt::Display for KeyUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("key-encryption key is unavailable")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for KeyUnavailable {}

/// An envelope token does not parse: wrong prefix, bad base64, wrong part
/// count, or a part of the wrong length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEnvelope(pub String);

impl fmt::Display for InvalidEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid envelope: {}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidEnvelope {}

/// AEAD tag verification failed: tampered ciphertext, salt, IV, or AAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptionIntegrityError;

impl fmt::Display for DecryptionIntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("decryption integrity check failed")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecryptionIntegrityError {}

/// Union of everything `encrypt`/`decrypt` can fail with.
///
/// Logged as the variant name only — never the associated plaintext or key
/// material, per the encryption engine's contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    KeyUnavailable,
    InvalidEnvelope(String),
    DecryptionIntegrityError,
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyUnavailable => f.write_str("KeyUnavailable"),
            Self::InvalidEnvelope(_) => f.write_str("InvalidEnvelope"),
            Self::DecryptionIntegrityError => f.write_str("DecryptionIntegrityError"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EnvelopeError {}

impl From<KeyUnavailable> for EnvelopeError {
    fn from(_: KeyUnavailable) -> Self {
        Self::KeyUnavailable
    }
}

impl From<InvalidEnvelope> for EnvelopeError {
    fn from(e: InvalidEnvelope) -> Self {
        Self::InvalidEnvelope(e.0)
    }
}

impl From<DecryptionIntegrityError> for EnvelopeError {
    fn from(_: DecryptionIntegrityError) -> Self {
        Self::DecryptionIntegrityError
    }
}
