//! Integration tests for key selection and message processing
//!
//! These tests verify the complete path from a secret key ring to verified
//! plaintext: choosing and unlocking the decryption key, decrypting,
//! unpacking and checking the one-pass signature and integrity tag.

mod common;

use common::*;
use pgporacle::config::OracleConfig;
use pgporacle::decrypt::{decrypt, extract_decryption_key, MessageDecryptor};
use pgporacle::engine::{Password, PrivateKey, ReferenceEngine};
use pgporacle::keycheck::{self, KeyStatus, VerifiedKeyRing};
use pgporacle::keyring::{PublicKeyRing, SecretKeyRing};
use pgporacle::OracleError;

fn decryption_key(identity: &Identity, passphrase: Option<&str>) -> PrivateKey {
    let ring = SecretKeyRing::from_bytes(&identity.secret_ring(passphrase)).unwrap();
    let password = Password::from(passphrase.unwrap_or(""));
    extract_decryption_key(&ring, &password, &ReferenceEngine)
        .unwrap()
        .expect("ring has an encryption key")
}

fn verified(identity: &Identity) -> VerifiedKeyRing {
    let ring = PublicKeyRing::from_bytes(&identity.public_ring()).unwrap();
    let verified = keycheck::validate(&ring, &ReferenceEngine).unwrap();
    assert_eq!(verified.status(), KeyStatus::Ok);
    verified
}

/// Test decrypting and verifying a signed, integrity-protected message
#[test]
fn test_signed_protected_message() {
    let alice = Identity::new("Alice <alice@example.org>", 1);
    let bob = Identity::new("Bob <bob@example.org>", 3);

    let content = signed_literal(&alice.primary, "test.txt", b"hello");
    let message = encrypt_to(&bob.subkey, &content, true);

    let key = decryption_key(&bob, None);
    assert_eq!(key.key_id(), bob.subkey.key_id());

    let result = decrypt(message.as_slice(), &key, Some(&verified(&alice)), &ReferenceEngine)
        .unwrap();
    assert_eq!(result.plaintext(), b"hello");
    assert_eq!(result.filename(), "test.txt");
}

/// Test that a passphrase-protected secret key unlocks and decrypts
#[test]
fn test_protected_secret_key() {
    let bob = Identity::new("Bob", 5);
    let message = encrypt_to(&bob.subkey, &literal("note.txt", b"secret"), true);

    let key = decryption_key(&bob, Some("correct horse"));
    let result = decrypt(message.as_slice(), &key, None, &ReferenceEngine).unwrap();
    assert_eq!(result.into_plaintext(), b"secret".to_vec());
}

/// Test that a wrong passphrase fails to unlock the key
#[test]
fn test_wrong_passphrase() {
    let bob = Identity::new("Bob", 7);
    let ring = SecretKeyRing::from_bytes(&bob.secret_ring(Some("right"))).unwrap();
    let result = extract_decryption_key(&ring, &Password::from("wrong"), &ReferenceEngine);
    assert!(matches!(result, Err(OracleError::Decryption(_))));
}

/// Test that tampering with the protected content is detected
#[test]
fn test_modification_detected() {
    let alice = Identity::new("Alice", 9);
    let bob = Identity::new("Bob", 11);
    let content = signed_literal(&alice.primary, "test.txt", b"hello");
    let mut message = encrypt_to(&bob.subkey, &content, true);
    let last = message.len() - 1;
    message[last] ^= 0x01;

    let key = decryption_key(&bob, None);
    let result = decrypt(message.as_slice(), &key, Some(&verified(&alice)), &ReferenceEngine);
    assert!(matches!(result, Err(OracleError::Integrity(_))));
}

/// Test that tampering inside the literal data is reported as an integrity failure
#[test]
fn test_modified_plaintext_reports_integrity() {
    let alice = Identity::new("Alice", 13);
    let bob = Identity::new("Bob", 15);
    let content = signed_literal(&alice.primary, "test.txt", b"hello world");
    let mut message = encrypt_to(&bob.subkey, &content, true);
    // Last plaintext byte sits just before the 32-byte tag.
    let position = message.len() - 33;
    message[position] ^= 0x20;

    let key = decryption_key(&bob, None);
    let result = decrypt(message.as_slice(), &key, Some(&verified(&alice)), &ReferenceEngine);
    assert!(matches!(result, Err(OracleError::Integrity(_))));
}

/// Test that a verifying ring demands a signed message
#[test]
fn test_unsigned_message() {
    let alice = Identity::new("Alice", 17);
    let bob = Identity::new("Bob", 19);
    let message = encrypt_to(&bob.subkey, &literal("plain.txt", b"no signature"), true);
    let key = decryption_key(&bob, None);

    let result = decrypt(message.as_slice(), &key, Some(&verified(&alice)), &ReferenceEngine);
    assert!(matches!(result, Err(OracleError::UnsignedMessage)));
    assert_eq!(
        result.unwrap_err().to_string(),
        "Message is unsigned".to_string()
    );

    let result = decrypt(message.as_slice(), &key, None, &ReferenceEngine).unwrap();
    assert_eq!(result.plaintext(), b"no signature");
    assert_eq!(result.filename(), "plain.txt");
}

/// Test that a signature by a key outside the verifying ring is rejected
#[test]
fn test_signer_not_in_ring() {
    let alice = Identity::new("Alice", 21);
    let bob = Identity::new("Bob", 23);
    let carol = Identity::new("Carol", 25);
    let content = signed_literal(&carol.primary, "test.txt", b"hello");
    let message = encrypt_to(&bob.subkey, &content, true);

    let key = decryption_key(&bob, None);
    let result = decrypt(message.as_slice(), &key, Some(&verified(&alice)), &ReferenceEngine);
    assert!(matches!(result, Err(OracleError::NoMatch(_))));
}

/// Test that a message for another recipient is not found
#[test]
fn test_no_session_key_for_recipient() {
    let bob = Identity::new("Bob", 27);
    let carol = Identity::new("Carol", 29);
    let message = encrypt_to(&carol.subkey, &literal("x", b"for carol"), true);

    let key = decryption_key(&bob, None);
    let result = decrypt(message.as_slice(), &key, None, &ReferenceEngine);
    assert!(matches!(result, Err(OracleError::NotFound(_))));
}

/// Test that a signature over different content fails verification
#[test]
fn test_bad_signature() {
    let alice = Identity::new("Alice", 31);
    let bob = Identity::new("Bob", 33);
    let mut content = one_pass(alice.primary.key_id(), 1, true);
    content.extend(literal("test.txt", b"hello"));
    content.extend(data_signature(&alice.primary, b"goodbye", now() - 60));
    let message = encrypt_to(&bob.subkey, &content, true);

    let key = decryption_key(&bob, None);
    let result = decrypt(message.as_slice(), &key, Some(&verified(&alice)), &ReferenceEngine);
    assert!(matches!(result, Err(OracleError::BadSignature(_))));
}

/// Test that a missing trailing signature fails verification
#[test]
fn test_missing_trailing_signature() {
    let alice = Identity::new("Alice", 35);
    let bob = Identity::new("Bob", 37);
    let mut content = one_pass(alice.primary.key_id(), 1, true);
    content.extend(literal("test.txt", b"hello"));
    let message = encrypt_to(&bob.subkey, &content, true);

    let key = decryption_key(&bob, None);
    let result = decrypt(message.as_slice(), &key, Some(&verified(&alice)), &ReferenceEngine);
    assert!(matches!(result, Err(OracleError::BadSignature(_))));
}

/// Test that nested one-pass signatures pair with trailers in reverse order
#[test]
fn test_nested_one_pass_signatures() {
    let alice = Identity::new("Alice", 39);
    let bob = Identity::new("Bob", 41);
    let carol = Identity::new("Carol", 43);
    let data = b"countersigned";

    let mut content = one_pass(carol.primary.key_id(), 1, false);
    content.extend(one_pass(alice.primary.key_id(), 1, true));
    content.extend(literal("both.txt", data));
    content.extend(data_signature(&alice.primary, data, now() - 60));
    content.extend(data_signature(&carol.primary, data, now() - 60));
    let message = encrypt_to(&bob.subkey, &content, true);

    let key = decryption_key(&bob, None);
    let result =
        decrypt(message.as_slice(), &key, Some(&verified(&alice)), &ReferenceEngine).unwrap();
    assert_eq!(result.plaintext(), data);

    let result =
        decrypt(message.as_slice(), &key, Some(&verified(&carol)), &ReferenceEngine).unwrap();
    assert_eq!(result.filename(), "both.txt");
}

/// Test that ASCII-armored messages are decoded first
#[test]
fn test_armored_message() {
    let alice = Identity::new("Alice", 45);
    let bob = Identity::new("Bob", 47);
    let content = signed_literal(&alice.primary, "test.txt", b"hello");
    let message = armor("MESSAGE", &encrypt_to(&bob.subkey, &content, true));

    let key = decryption_key(&bob, None);
    let result = decrypt(message.as_bytes(), &key, Some(&verified(&alice)), &ReferenceEngine)
        .unwrap();
    assert_eq!(result.plaintext(), b"hello");
}

/// Test content wrapped in a compressed data packet
#[test]
fn test_compressed_content() {
    let alice = Identity::new("Alice", 49);
    let bob = Identity::new("Bob", 51);
    let content = stored(&signed_literal(&alice.primary, "packed.txt", b"inside"));
    let message = encrypt_to(&bob.subkey, &content, true);

    let key = decryption_key(&bob, None);
    let result = decrypt(message.as_slice(), &key, Some(&verified(&alice)), &ReferenceEngine)
        .unwrap();
    assert_eq!(result.plaintext(), b"inside");
    assert_eq!(result.filename(), "packed.txt");
}

/// Test that unsupported compression algorithms are reported
#[test]
fn test_unsupported_compression() {
    let bob = Identity::new("Bob", 53);
    let mut body = vec![1u8];
    body.extend(literal("z", b"zipped"));
    let content = packet(pgporacle::packet::PacketType::CompressedData, body);
    let message = encrypt_to(&bob.subkey, &content, true);

    let key = decryption_key(&bob, None);
    let result = decrypt(message.as_slice(), &key, None, &ReferenceEngine);
    assert!(matches!(result, Err(OracleError::Unsupported(_))));
}

/// Test decrypting a legacy container without integrity protection
#[test]
fn test_legacy_container() {
    let alice = Identity::new("Alice", 55);
    let bob = Identity::new("Bob", 57);
    let content = signed_literal(&alice.primary, "old.txt", b"legacy");
    let message = encrypt_to(&bob.subkey, &content, false);

    let key = decryption_key(&bob, None);
    let result = decrypt(message.as_slice(), &key, Some(&verified(&alice)), &ReferenceEngine)
        .unwrap();
    assert_eq!(result.plaintext(), b"legacy");
}

/// Test that large content streams across many chunks
#[test]
fn test_large_content_small_chunks() {
    let alice = Identity::new("Alice", 59);
    let bob = Identity::new("Bob", 61);
    let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    let content = signed_literal(&alice.primary, "big.bin", &data);
    let message = encrypt_to(&bob.subkey, &content, true);

    let config = OracleConfig {
        chunk_size: 1000,
        ..OracleConfig::default()
    };
    let key = decryption_key(&bob, None);
    let result = MessageDecryptor::new(&ReferenceEngine)
        .with_config(config)
        .decrypt(message.as_slice(), &key, Some(&verified(&alice)))
        .unwrap();
    assert_eq!(result.plaintext(), data.as_slice());
}

/// Test that the selector prefers a subkey flagged for encryption
#[test]
fn test_selector_prefers_flagged_key() {
    let bob = Identity::new("Bob", 63);
    let ring = SecretKeyRing::from_bytes(&bob.secret_ring(None)).unwrap();
    let key = extract_decryption_key(&ring, &Password::from(""), &ReferenceEngine)
        .unwrap()
        .unwrap();
    assert_eq!(key.key_id(), bob.subkey.key_id());
    assert_eq!(key.public_key().fingerprint(), bob.subkey.public.fingerprint());
}

/// Test that an empty input is rejected
#[test]
fn test_empty_message() {
    let bob = Identity::new("Bob", 65);
    let key = decryption_key(&bob, None);
    let result = decrypt(&b""[..], &key, None, &ReferenceEngine);
    assert!(matches!(result, Err(OracleError::Packet(_))));
}
