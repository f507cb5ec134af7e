//! Envelope encryption for masked PII values.
//!
//! One process-wide [`Kek`] (Key-Encryption-Key) is loaded at startup.
//! Every [`Envelope::encrypt`] call derives a fresh, single-use
//! Data-Encryption-Key from the KEK via HKDF-SHA256, seals the plaintext
//! with AES-256-GCM, and binds the call's [`EncryptionMetadata`] as
//! additional authenticated data. The result is a self-describing,
//! version-prefixed token: `ENC:v1:<salt_b64>:<iv_b64>:<ct||tag_b64>`.

mod aead;
mod envelope;
pub mod error;
mod kdf;
mod kek;
mod metadata;

pub use envelope::Envelope;
pub use error::EnvelopeError;
pub use kek::Kek;
pub use metadata::EncryptionMetadata;
