//! Shared fixture builders for integration tests and benchmarks.
//!
//! Keys, signatures and messages are produced with the reference engine's
//! producing helpers, then framed as real OpenPGP packets. The files under
//! `tests/data` were made with GnuPG and are checked with the rPGP engine.

#![allow(dead_code)]

use pgporacle::engine::reference::{NONCE_SIZE, SALT_SIZE, SESSION_KEY_SIZE};
use pgporacle::engine::{CertificationTarget, Password, ReferenceEngine};
use pgporacle::packet::{KeyId, Packet, PacketType, PublicKeyPacket, SignaturePacket};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DAY: u32 = 24 * 60 * 60;

/// GnuPG fixtures: RSA-2048 primaries with RSA-2048 encryption subkeys
pub const ALICE_FINGERPRINT: &str = "927d71effb0bdb48da2f9449294fcd6f19818c1b";
pub const ALICE_SUBKEY_FINGERPRINT: &str = "8f9a284779a1d5b86035c3488bda987420f3b29a";
pub const ALICE_UID: &str = "Alice <alice@example.org>";
pub const BOB_SUBKEY_ID: &str = "4D8ED65A7822A6EB";
pub const BOB_PASSPHRASE: &str = "correct horse";

/// Path of a file under `tests/data`
pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Contents of a file under `tests/data`
pub fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture_path(name)).expect("fixture file")
}

/// Current Unix time
pub fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before 1970")
        .as_secs() as u32
}

/// Frame a packet body
pub fn packet(packet_type: PacketType, body: Vec<u8>) -> Vec<u8> {
    Packet::new(packet_type, body)
        .to_bytes()
        .expect("fixed-length packet")
}

/// A key with its reference-engine private material
#[derive(Debug, Clone)]
pub struct TestKey {
    pub public: PublicKeyPacket,
    pub material: Vec<u8>,
}

impl TestKey {
    /// Key of the given algorithm; `seed` keeps key IDs distinct
    pub fn new(created: u32, algorithm: u8, seed: u8) -> Self {
        let mut body = vec![4];
        body.extend_from_slice(&created.to_be_bytes());
        body.push(algorithm);
        let mpis = match algorithm {
            16 | 20 => 3,
            17 => 4,
            _ => 2,
        };
        for i in 0..mpis {
            body.extend_from_slice(&[0x00, 0x10, 0x80 | seed, i]);
        }
        Self {
            public: PublicKeyPacket::from_bytes(&body).expect("valid key body"),
            material: format!("private material {}", seed).into_bytes(),
        }
    }

    /// RSA encrypt-or-sign key
    pub fn rsa(created: u32, seed: u8) -> Self {
        Self::new(created, 1, seed)
    }

    pub fn key_id(&self) -> KeyId {
        self.public.key_id()
    }

    pub fn fingerprint_hex(&self) -> String {
        self.public.fingerprint().to_hex()
    }

    /// Public key packet body
    pub fn public_body(&self) -> Vec<u8> {
        self.public.as_bytes().to_vec()
    }

    /// Secret key packet body, protected when a passphrase is given
    pub fn secret_body(&self, passphrase: Option<&str>) -> Vec<u8> {
        let mut body = self.public_body();
        match passphrase {
            Some(passphrase) => {
                body.push(254);
                body.extend(
                    ReferenceEngine::protect_secret(
                        &self.public,
                        &self.material,
                        &Password::from(passphrase),
                        [0x5A; SALT_SIZE],
                        [0xA5; NONCE_SIZE],
                    )
                    .expect("protect secret"),
                );
            }
            None => {
                body.push(0);
                body.extend_from_slice(&self.material);
                body.extend_from_slice(
                    &ReferenceEngine::secret_checksum(&self.material).to_be_bytes(),
                );
            }
        }
        body
    }
}

fn subpacket(tag: u8, data: &[u8]) -> Vec<u8> {
    let len = data.len() + 1;
    let mut out = if len < 192 {
        vec![len as u8]
    } else {
        let adjusted = len - 192;
        vec![((adjusted >> 8) + 192) as u8, (adjusted & 0xFF) as u8]
    };
    out.push(tag);
    out.extend_from_slice(data);
    out
}

/// Builder for version 4 signature bodies
#[derive(Debug, Clone)]
pub struct SigBuilder {
    sig_type: u8,
    algorithm: Option<u8>,
    hashed: Vec<u8>,
    unhashed: Vec<u8>,
}

impl SigBuilder {
    pub fn new(sig_type: u8) -> Self {
        Self {
            sig_type,
            algorithm: None,
            hashed: Vec::new(),
            unhashed: Vec::new(),
        }
    }

    /// Hashed creation time
    pub fn created(mut self, time: u32) -> Self {
        self.hashed.extend(subpacket(2, &time.to_be_bytes()));
        self
    }

    /// Creation time in the unhashed area only
    pub fn unhashed_created(mut self, time: u32) -> Self {
        self.unhashed.extend(subpacket(2, &time.to_be_bytes()));
        self
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.hashed.extend(subpacket(27, &[flags]));
        self
    }

    pub fn signature_expiration(mut self, seconds: u32) -> Self {
        self.hashed.extend(subpacket(3, &seconds.to_be_bytes()));
        self
    }

    pub fn key_expiration(mut self, seconds: u32) -> Self {
        self.hashed.extend(subpacket(9, &seconds.to_be_bytes()));
        self
    }

    pub fn issuer(mut self, key_id: KeyId) -> Self {
        self.unhashed.extend(subpacket(16, &key_id.to_bytes()));
        self
    }

    /// Embedded signature in the hashed area
    pub fn embedded(mut self, body: &[u8]) -> Self {
        self.hashed.extend(subpacket(32, body));
        self
    }

    /// Embedded signature in the unhashed area
    pub fn unhashed_embedded(mut self, body: &[u8]) -> Self {
        self.unhashed.extend(subpacket(32, body));
        self
    }

    /// Claim a different public key algorithm than the signer's
    pub fn algorithm(mut self, algorithm: u8) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    fn head(&self, signer: &PublicKeyPacket) -> Vec<u8> {
        let algorithm = self.algorithm.unwrap_or(signer.algorithm.to_byte());
        let mut head = vec![4, self.sig_type, algorithm, 8];
        head.extend_from_slice(&(self.hashed.len() as u16).to_be_bytes());
        head.extend_from_slice(&self.hashed);
        head.extend_from_slice(&(self.unhashed.len() as u16).to_be_bytes());
        head.extend_from_slice(&self.unhashed);
        head
    }

    fn finish(&self, signer: &PublicKeyPacket, signed_data: impl FnOnce(&SignaturePacket) -> Vec<u8>) -> Vec<u8> {
        let mut body = self.head(signer);
        let mut unsigned = body.clone();
        unsigned.extend_from_slice(&[0, 0]);
        let unsigned = SignaturePacket::from_bytes(&unsigned).expect("valid signature head");
        let material = ReferenceEngine::sign(signer, &signed_data(&unsigned));
        body.extend_from_slice(&material[..2]);
        body.extend_from_slice(&material);
        body
    }

    /// Signature body over a key target
    pub fn sign(&self, signer: &TestKey, target: CertificationTarget<'_>) -> Vec<u8> {
        self.finish(&signer.public, |sig| target.hash_input(sig))
    }

    /// Signature body over document data
    pub fn sign_data(&self, signer: &TestKey, data: &[u8]) -> Vec<u8> {
        self.finish(&signer.public, |sig| {
            let mut input = data.to_vec();
            input.extend(sig.hash_trailer());
            input
        })
    }
}

/// User ID packet followed by its self-certification
pub fn certified_user_id(primary: &TestKey, uid: &str, sig: SigBuilder) -> Vec<u8> {
    let mut out = packet(PacketType::UserId, uid.as_bytes().to_vec());
    out.extend(user_id_signature(primary, uid, sig));
    out
}

/// Signature packet over a User ID on `primary`
pub fn user_id_signature(primary: &TestKey, uid: &str, sig: SigBuilder) -> Vec<u8> {
    let target = CertificationTarget::UserId {
        primary: &primary.public,
        user_id: uid.as_bytes(),
    };
    packet(PacketType::Signature, sig.sign(primary, target))
}

/// Signature packet over `subkey` by `primary`
pub fn subkey_signature(primary: &TestKey, subkey: &TestKey, sig: SigBuilder) -> Vec<u8> {
    let target = CertificationTarget::Subkey {
        primary: &primary.public,
        subkey: &subkey.public,
    };
    packet(PacketType::Signature, sig.sign(primary, target))
}

/// Primary-key-binding signature body made by `subkey`
pub fn back_signature(primary: &TestKey, subkey: &TestKey, created: u32) -> Vec<u8> {
    let target = CertificationTarget::Subkey {
        primary: &primary.public,
        subkey: &subkey.public,
    };
    SigBuilder::new(0x19).created(created).sign(subkey, target)
}

/// Key revocation packet on `primary`
pub fn key_revocation(primary: &TestKey, created: u32) -> Vec<u8> {
    let target = CertificationTarget::Key(&primary.public);
    packet(
        PacketType::Signature,
        SigBuilder::new(0x20).created(created).sign(primary, target),
    )
}

/// A primary signing key with one User ID and an encryption subkey, the
/// User ID and the binding signed a day before `now`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub primary: TestKey,
    pub subkey: TestKey,
    pub uid: String,
    pub signed_at: u32,
}

impl Identity {
    pub fn new(uid: &str, seed: u8) -> Self {
        let now = now();
        Self {
            primary: TestKey::rsa(now - 30 * DAY, seed),
            subkey: TestKey::rsa(now - 30 * DAY, seed.wrapping_add(1)),
            uid: uid.to_string(),
            signed_at: now - DAY,
        }
    }

    fn user_id_part(&self) -> Vec<u8> {
        certified_user_id(
            &self.primary,
            &self.uid,
            SigBuilder::new(0x13)
                .created(self.signed_at)
                .flags(0x03)
                .issuer(self.primary.key_id()),
        )
    }

    fn binding(&self) -> Vec<u8> {
        subkey_signature(
            &self.primary,
            &self.subkey,
            SigBuilder::new(0x18)
                .created(self.signed_at)
                .flags(0x0C)
                .issuer(self.primary.key_id()),
        )
    }

    /// Transferable public key
    pub fn public_ring(&self) -> Vec<u8> {
        let mut out = packet(PacketType::PublicKey, self.primary.public_body());
        out.extend(self.user_id_part());
        out.extend(packet(PacketType::PublicSubkey, self.subkey.public_body()));
        out.extend(self.binding());
        out
    }

    /// Transferable secret key
    pub fn secret_ring(&self, passphrase: Option<&str>) -> Vec<u8> {
        let mut out = packet(PacketType::SecretKey, self.primary.secret_body(passphrase));
        out.extend(self.user_id_part());
        out.extend(packet(
            PacketType::SecretSubkey,
            self.subkey.secret_body(passphrase),
        ));
        out.extend(self.binding());
        out
    }
}

/// Literal data packet in binary mode
pub fn literal(filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = vec![b'b', filename.len() as u8];
    body.extend_from_slice(filename.as_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(data);
    packet(PacketType::LiteralData, body)
}

/// One-pass signature packet announcing a binary signature
pub fn one_pass(key_id: KeyId, algorithm: u8, last: bool) -> Vec<u8> {
    let mut body = vec![3, 0x00, 8, algorithm];
    body.extend_from_slice(&key_id.to_bytes());
    body.push(last as u8);
    packet(PacketType::OnePassSignature, body)
}

/// Binary document signature packet over `data`
pub fn data_signature(signer: &TestKey, data: &[u8], created: u32) -> Vec<u8> {
    packet(
        PacketType::Signature,
        SigBuilder::new(0x00)
            .created(created)
            .issuer(signer.key_id())
            .sign_data(signer, data),
    )
}

/// One-pass signed literal data
pub fn signed_literal(signer: &TestKey, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut out = one_pass(signer.key_id(), signer.public.algorithm.to_byte(), true);
    out.extend(literal(filename, data));
    out.extend(data_signature(signer, data, now() - 60));
    out
}

/// Compressed data packet with the uncompressed algorithm
pub fn stored(inner: &[u8]) -> Vec<u8> {
    let mut body = vec![0];
    body.extend_from_slice(inner);
    packet(PacketType::CompressedData, body)
}

/// Session key packet for `recipient`
pub fn session_packet(recipient: &TestKey, session_key: &[u8; SESSION_KEY_SIZE]) -> Vec<u8> {
    let mut body = vec![3];
    body.extend_from_slice(&recipient.key_id().to_bytes());
    body.push(recipient.public.algorithm.to_byte());
    body.extend(
        ReferenceEngine::seal_session_key(&recipient.public, &recipient.material, session_key)
            .expect("seal session key"),
    );
    packet(PacketType::PublicKeyEncryptedSessionKey, body)
}

/// Encrypt `inner` packets to `recipient`
pub fn encrypt_to(recipient: &TestKey, inner: &[u8], integrity_protected: bool) -> Vec<u8> {
    let session_key = [0x42u8; SESSION_KEY_SIZE];
    let mut out = session_packet(recipient, &session_key);
    let packet_type = if integrity_protected {
        PacketType::SymEncryptedIntegrityProtectedData
    } else {
        PacketType::SymmetricallyEncryptedData
    };
    out.extend(packet(
        packet_type,
        ReferenceEngine::seal_payload(&session_key, inner, integrity_protected),
    ));
    out
}

/// ASCII armor around binary data
pub fn armor(kind: &str, data: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let crc = pgporacle::armor::crc24(data);
    let encoded = STANDARD.encode(data);
    let mut out = format!("-----BEGIN PGP {}-----\nVersion: test\n\n", kind);
    for line in encoded.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(line).expect("base64 is ascii"));
        out.push('\n');
    }
    let crc_bytes = [(crc >> 16) as u8, (crc >> 8) as u8, crc as u8];
    out.push_str(&format!("={}\n", STANDARD.encode(crc_bytes)));
    out.push_str(&format!("-----END PGP {}-----\n", kind));
    out
}
