//! Additional authenticated data bound to every envelope.
//!
//! `(piiType, startPosition, endPosition)` serialized as the UTF-8 string
//! `"piiType|start|end"`. Any change to the PII type or offsets after
//! encryption makes the AAD mismatch and decryption fails.

/// The `(piiType, start, end)` triple an [`crate::Envelope`] is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncryptionMetadata {
    pub pii_type: String,
    pub start: usize,
    pub end: usize,
}

impl EncryptionMetadata {
    pub fn new(pii_type: impl Into<String>, start: usize, end: usize) -> Self {
        Self { pii_type: pii_type.into(), start, end }
    }

    pub fn to_aad_bytes(&self) -> Vec<u8> {
        format!("{}|{}|{}", self.pii_type, self.start, self.end).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aad_bytes_are_pipe_delimited() {
        let m = EncryptionMetadata::new("EMAIL", 9, 26);
        assert_eq!(m.to_aad_bytes(), b"EMAIL|9|26".to_vec());
    }
}
