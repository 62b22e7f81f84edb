//! Property-based tests over randomized inputs
//!
//! These tests verify that the message processor and key validator keep
//! their guarantees across randomly mutated messages, random chunk sizes
//! and random plaintexts.

mod common;

use common::*;
use pgporacle::config::OracleConfig;
use pgporacle::decrypt::{decrypt, extract_decryption_key, MessageDecryptor};
use pgporacle::engine::{Password, ReferenceEngine};
use pgporacle::keycheck::{self, KeyStatus, KeyValidator};
use pgporacle::keyring::{PublicKeyRing, SecretKeyRing};
use rand::{rngs::OsRng, Rng};
use std::panic::AssertUnwindSafe;

/// Property: a mutated message either fails or yields the original plaintext
#[test]
fn property_mutated_message_never_yields_other_plaintext() {
    let mut rng = OsRng;
    let alice = Identity::new("Alice", 1);
    let bob = Identity::new("Bob", 3);
    let original = b"property plaintext".to_vec();
    let message = encrypt_to(
        &bob.subkey,
        &signed_literal(&alice.primary, "p.txt", &original),
        true,
    );

    let secret = SecretKeyRing::from_bytes(&bob.secret_ring(None)).unwrap();
    let key = extract_decryption_key(&secret, &Password::from(""), &ReferenceEngine)
        .unwrap()
        .unwrap();
    let public = PublicKeyRing::from_bytes(&alice.public_ring()).unwrap();
    let verify = keycheck::validate(&public, &ReferenceEngine).unwrap();

    for _ in 0..200 {
        let mut mutated = message.clone();
        let position = rng.gen_range(0..mutated.len());
        let flip: u8 = rng.gen_range(1..=255);
        mutated[position] ^= flip;

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            decrypt(mutated.as_slice(), &key, Some(&verify), &ReferenceEngine)
        }));
        let result = result.expect("decryption must not panic");
        if let Ok(decrypted) = result {
            assert_eq!(
                decrypted.plaintext(),
                original.as_slice(),
                "Mutation at byte {} produced different plaintext",
                position
            );
        }
    }
}

/// Property: the chunk size never changes the plaintext or the verdict
#[test]
fn property_chunk_size_is_transparent() {
    let mut rng = OsRng;
    let alice = Identity::new("Alice", 5);
    let bob = Identity::new("Bob", 7);
    let secret = SecretKeyRing::from_bytes(&bob.secret_ring(None)).unwrap();
    let key = extract_decryption_key(&secret, &Password::from(""), &ReferenceEngine)
        .unwrap()
        .unwrap();
    let public = PublicKeyRing::from_bytes(&alice.public_ring()).unwrap();
    let verify = keycheck::validate(&public, &ReferenceEngine).unwrap();

    for _ in 0..25 {
        let size = rng.gen_range(0..30_000);
        let mut data = vec![0u8; size];
        rng.fill(&mut data[..]);
        let message = encrypt_to(
            &bob.subkey,
            &signed_literal(&alice.primary, "r.bin", &data),
            true,
        );

        let config = OracleConfig {
            chunk_size: rng.gen_range(1..=20_000),
            ..OracleConfig::default()
        };
        let result = MessageDecryptor::new(&ReferenceEngine)
            .with_config(config)
            .decrypt(message.as_slice(), &key, Some(&verify))
            .unwrap();
        assert_eq!(result.plaintext(), data.as_slice());
    }
}

/// Property: tampering with any byte of a self-signature drops what it attested
#[test]
fn property_tampered_certification_is_rejected() {
    let mut rng = OsRng;
    let now = now();
    let primary = TestKey::rsa(now - 30 * DAY, 9);
    let uid_packet = packet(pgporacle::packet::PacketType::UserId, b"Alice".to_vec());
    let signature = SigBuilder::new(0x13)
        .created(now - DAY)
        .flags(0x03)
        .sign(
            &primary,
            pgporacle::engine::CertificationTarget::UserId {
                primary: &primary.public,
                user_id: b"Alice",
            },
        );

    for _ in 0..100 {
        let mut tampered = signature.clone();
        // Leave the version byte alone; everything after the hashed area
        // length is either hashed or the signature value itself.
        let position = rng.gen_range(6..tampered.len());
        tampered[position] ^= rng.gen_range(1..=255u8);

        let mut ring = packet(pgporacle::packet::PacketType::PublicKey, primary.public_body());
        ring.extend(&uid_packet);
        ring.extend(packet(pgporacle::packet::PacketType::Signature, tampered));

        let parsed = match PublicKeyRing::from_bytes(&ring) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        let verified = KeyValidator::new(&ReferenceEngine)
            .at_time(now as i64)
            .validate(&parsed)
            .unwrap();
        if verified.status() == KeyStatus::Ok {
            // Only the unhashed area may change without breaking the signature.
            let unsigned = verified.user_ids()[0].signature();
            assert_eq!(unsigned.signed_creation_time(), Some(now - DAY));
        }
    }
}

/// Property: random bytes never make the parsers panic
#[test]
fn property_random_input_is_rejected_safely() {
    let mut rng = OsRng;
    let bob = Identity::new("Bob", 11);
    let secret = SecretKeyRing::from_bytes(&bob.secret_ring(None)).unwrap();
    let key = extract_decryption_key(&secret, &Password::from(""), &ReferenceEngine)
        .unwrap()
        .unwrap();

    for _ in 0..300 {
        let size = rng.gen_range(0..2000);
        let mut data = vec![0u8; size];
        rng.fill(&mut data[..]);

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = PublicKeyRing::from_bytes(&data);
            let _ = SecretKeyRing::from_bytes(&data);
            let _ = pgporacle::packet::SignaturePacket::from_bytes(&data);
            let _ = decrypt(data.as_slice(), &key, None, &ReferenceEngine);
        }));
        assert!(result.is_ok(), "Parser panicked on random input");
    }
}
