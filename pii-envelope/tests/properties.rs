use pii_envelope::{EncryptionMetadata, Envelope, Kek};
use proptest::prelude::*;

fn kek() -> Kek {
    Kek::from_bytes([9u8; 32])
}

proptest! {
    #[test]
    fn round_trip_holds_for_any_plaintext_and_metadata(
        plaintext in proptest::collection::vec(any::<u8>(), 0..512),
        pii_type in "[A-Z]{2,12}",
        start in 0usize..1000,
        len in 0usize..1000,
    ) {
        let env = Envelope::new();
        let k = kek();
        let meta = EncryptionMetadata::new(pii_type, start, start + len);
        let token = env.encrypt(&k, &meta, &plaintext).unwrap();
        let decrypted = env.decrypt(&k, &meta, &token).unwrap();
        prop_assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn encryptions_of_the_same_plaintext_differ(plaintext in proptest::collection::vec(any::<u8>(), 1..64)) {
        let env = Envelope::new();
        let k = kek();
        let meta = EncryptionMetadata::new("TEXT", 0, plaintext.len());
        let a = env.encrypt(&k, &meta, &plaintext).unwrap();
        let b = env.encrypt(&k, &meta, &plaintext).unwrap();
        prop_assert_ne!(a, b);
    }

    #[test]
    fn a_mismatched_metadata_never_decrypts(
        plaintext in proptest::collection::vec(any::<u8>(), 0..64),
        start in 0usize..50,
        end in 50usize..100,
        other_end in 100usize..150,
    ) {
        let env = Envelope::new();
        let k = kek();
        let meta = EncryptionMetadata::new("EMAIL", start, end);
        let other = EncryptionMetadata::new("EMAIL", start, other_end);
        let token = env.encrypt(&k, &meta, &plaintext).unwrap();
        prop_assert!(env.decrypt(&k, &other, &token).is_err());
    }
}
