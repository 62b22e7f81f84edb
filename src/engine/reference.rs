//! Deterministic reference engine.
//!
//! The reference scheme keeps the OpenPGP packet structure intact but swaps
//! the public-key mathematics for keyed SHA3 constructions, so every
//! protocol decision of the validator and the message processor can be
//! exercised without an RSA or ECC stack:
//!
//! - signature material is `SHA3-256(domain || signer key || hashed data || trailer)`
//!   and the hash prefix is its first two bytes;
//! - an encrypted session key is the 32-byte session key XORed with an
//!   HKDF-SHA3-256 mask derived from the recipient's private material;
//! - payloads are XORed with a SHAKE256 keystream of the session key, and
//!   integrity-protected payloads end in a SHA3-256 tag over the plaintext;
//! - protected secret keys are `salt || nonce || AES-256-GCM(material)` under
//!   an Argon2id key, unprotected ones carry the usual two-byte checksum.
//!
//! The scheme is symmetric: whoever holds a public key can produce its
//! signatures. It exists to test protocol logic, never to protect data.
//! The `sign`, `seal_*` and `protect_secret` helpers are the producing side
//! used to build test vectors.

use super::{
    CertificationTarget, CryptoEngine, DecryptedData, Password, PrivateKey, SignatureVerifier,
};
use crate::error::{OracleError, Result};
use crate::packet::{
    truncation_to_packet_error, CompressionAlgorithm, OnePassSignaturePacket,
    PublicKeyEncryptedSessionKey, PublicKeyPacket, SecretKeyPacket, SignaturePacket,
};
use crate::validation::MAX_PACKET_SIZE;
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use argon2::Argon2;
use hkdf::Hkdf;
use sha3::{Digest, Sha3_256};
use std::io::{self, Cursor, Read};
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroizing;

const SIGNATURE_DOMAIN: &[u8] = b"pgporacle-reference-signature-v1";
const SESSION_KEY_INFO: &[u8] = b"pgporacle-reference-session-key-v1";
const KEYSTREAM_DOMAIN: &[u8] = b"pgporacle-reference-keystream-v1";
const INTEGRITY_DOMAIN: &[u8] = b"pgporacle-reference-integrity-v1";

/// Session key length in bytes
pub const SESSION_KEY_SIZE: usize = 32;

/// Integrity tag length in bytes
pub const TAG_SIZE: usize = 32;

/// Salt size for Argon2 (128 bits)
pub const SALT_SIZE: usize = 16;

/// AES-GCM nonce size
pub const NONCE_SIZE: usize = 12;

/// Version octet of an integrity-protected data packet
const SEIPD_VERSION: u8 = 1;

/// Parameters for Argon2id passphrase hashing
const ARGON2_PARAMS: argon2::Params = match argon2::Params::new(
    8 * 1024, // 8 MiB memory cost
    1,        // 1 iteration
    1,        // 1 thread
    Some(32), // 32-byte output length
) {
    Ok(params) => params,
    Err(_) => panic!("Invalid Argon2 parameters"),
};

/// The deterministic reference engine
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceEngine;

impl ReferenceEngine {
    /// Create the engine
    pub fn new() -> Self {
        Self
    }

    /// Produce signature material for `hash_input` (trailer included)
    pub fn sign(signer: &PublicKeyPacket, hash_input: &[u8]) -> [u8; 32] {
        let mut digest = signer_digest(signer);
        digest.update(hash_input);
        digest.finalize().into()
    }

    /// Encrypt a session key to the holder of `recipient_material`
    pub fn seal_session_key(
        recipient: &PublicKeyPacket,
        recipient_material: &[u8],
        session_key: &[u8; SESSION_KEY_SIZE],
    ) -> Result<Vec<u8>> {
        let mask = session_mask(recipient, recipient_material)?;
        Ok(xor(session_key, &mask[..]))
    }

    /// Encrypt a payload under `session_key`, appending the integrity tag
    /// and version octet when `integrity_protected` is set. The result is a
    /// complete encrypted data packet body.
    pub fn seal_payload(
        session_key: &[u8; SESSION_KEY_SIZE],
        plaintext: &[u8],
        integrity_protected: bool,
    ) -> Vec<u8> {
        let mut content = plaintext.to_vec();
        if integrity_protected {
            content.extend_from_slice(&integrity_tag(session_key, plaintext));
        }
        apply_keystream(session_key, &mut content);
        if integrity_protected {
            content.insert(0, SEIPD_VERSION);
        }
        content
    }

    /// Protect secret material with a passphrase, producing the bytes that
    /// follow the string-to-key usage octet 254 in a secret key packet.
    pub fn protect_secret(
        public: &PublicKeyPacket,
        material: &[u8],
        passphrase: &Password,
        salt: [u8; SALT_SIZE],
        nonce: [u8; NONCE_SIZE],
    ) -> Result<Vec<u8>> {
        let key = derive_key_from_password(passphrase, &salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
        let fingerprint = public.fingerprint();
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: material,
                    aad: &fingerprint.0,
                },
            )
            .map_err(|e| OracleError::crypto(format!("Failed to protect secret key: {}", e)))?;

        let mut out = salt.to_vec();
        out.extend_from_slice(&nonce);
        out.extend(ciphertext);
        Ok(out)
    }

    /// Two-octet checksum that follows unprotected secret material
    pub fn secret_checksum(material: &[u8]) -> u16 {
        material
            .iter()
            .fold(0u16, |sum, b| sum.wrapping_add(*b as u16))
    }
}

fn signer_digest(signer: &PublicKeyPacket) -> Sha3_256 {
    let mut digest = Sha3_256::new();
    digest.update(SIGNATURE_DOMAIN);
    digest.update(signer.hashable());
    digest
}

fn signature_matches(signature: &SignaturePacket, expected: &[u8; 32]) -> bool {
    let prefix_ok = signature.hash_prefix[..].ct_eq(&expected[..2]);
    let material_ok = signature.signature_material.as_slice().ct_eq(expected.as_slice());
    bool::from(prefix_ok & material_ok)
}

fn session_mask(
    recipient: &PublicKeyPacket,
    material: &[u8],
) -> Result<Zeroizing<[u8; SESSION_KEY_SIZE]>> {
    let fingerprint = recipient.fingerprint();
    let hk = Hkdf::<Sha3_256>::new(Some(fingerprint.0.as_slice()), material);
    let mut okm = Zeroizing::new([0u8; SESSION_KEY_SIZE]);
    hk.expand(SESSION_KEY_INFO, &mut okm[..])
        .map_err(|_| OracleError::crypto("HKDF expansion failed"))?;
    Ok(okm)
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}

fn apply_keystream(session_key: &[u8], data: &mut [u8]) {
    use sha3::digest::{ExtendableOutput, Update, XofReader};

    let mut shake = sha3::Shake256::default();
    Update::update(&mut shake, KEYSTREAM_DOMAIN);
    Update::update(&mut shake, session_key);
    let mut reader = shake.finalize_xof();

    let mut block = [0u8; 1024];
    for chunk in data.chunks_mut(block.len()) {
        let stream = &mut block[..chunk.len()];
        XofReader::read(&mut reader, stream);
        for (byte, key) in chunk.iter_mut().zip(stream.iter()) {
            *byte ^= key;
        }
    }
}

fn integrity_tag(session_key: &[u8], plaintext: &[u8]) -> [u8; TAG_SIZE] {
    let mut digest = Sha3_256::new();
    digest.update(INTEGRITY_DOMAIN);
    digest.update(session_key);
    digest.update(plaintext);
    digest.finalize().into()
}

/// Derive a 256-bit key from a passphrase using Argon2id
fn derive_key_from_password(
    password: &Password,
    salt: &[u8; SALT_SIZE],
) -> Result<Zeroizing<[u8; 32]>> {
    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ARGON2_PARAMS,
    );
    let mut out = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut out[..])
        .map_err(|e| OracleError::crypto(format!("Passphrase hashing failed: {}", e)))?;
    Ok(out)
}

struct ReferenceVerifier {
    digest: Sha3_256,
    signer: PublicKeyPacket,
}

impl SignatureVerifier for ReferenceVerifier {
    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn finish(self: Box<Self>, signature: &SignaturePacket) -> Result<bool> {
        if signature.public_key_algorithm != self.signer.algorithm {
            return Ok(false);
        }
        let mut digest = self.digest;
        digest.update(signature.hash_trailer());
        let expected: [u8; 32] = digest.finalize().into();
        Ok(signature_matches(signature, &expected))
    }
}

struct ReferenceDecrypted {
    content: Cursor<Zeroizing<Vec<u8>>>,
    integrity_ok: bool,
}

impl Read for ReferenceDecrypted {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.content.read(buf)
    }
}

impl DecryptedData for ReferenceDecrypted {
    fn verify_integrity(&mut self) -> Result<bool> {
        Ok(self.integrity_ok)
    }
}

impl CryptoEngine for ReferenceEngine {
    fn verify_certification(
        &self,
        signature: &SignaturePacket,
        signer: &PublicKeyPacket,
        target: &CertificationTarget<'_>,
    ) -> Result<bool> {
        if signature.public_key_algorithm != signer.algorithm {
            return Ok(false);
        }
        let expected = Self::sign(signer, &target.hash_input(signature));
        Ok(signature_matches(signature, &expected))
    }

    fn start_verification(
        &self,
        _one_pass: &OnePassSignaturePacket,
        signer: &PublicKeyPacket,
    ) -> Result<Box<dyn SignatureVerifier>> {
        Ok(Box::new(ReferenceVerifier {
            digest: signer_digest(signer),
            signer: signer.clone(),
        }))
    }

    fn unlock(&self, secret: &SecretKeyPacket, passphrase: &Password) -> Result<PrivateKey> {
        let data = secret.secret_data.as_slice();
        let material = match secret.s2k_usage {
            0 => {
                if data.len() < 2 {
                    return Err(OracleError::decryption("Secret key material is truncated"));
                }
                let (material, checksum) = data.split_at(data.len() - 2);
                let expected = u16::from_be_bytes([checksum[0], checksum[1]]);
                if Self::secret_checksum(material) != expected {
                    return Err(OracleError::decryption("Secret key checksum mismatch"));
                }
                Zeroizing::new(material.to_vec())
            }
            254 | 255 => {
                if data.len() < SALT_SIZE + NONCE_SIZE {
                    return Err(OracleError::decryption("Protected secret key is truncated"));
                }
                let mut salt = [0u8; SALT_SIZE];
                salt.copy_from_slice(&data[..SALT_SIZE]);
                let nonce = &data[SALT_SIZE..SALT_SIZE + NONCE_SIZE];
                let ciphertext = &data[SALT_SIZE + NONCE_SIZE..];

                let key = derive_key_from_password(passphrase, &salt)?;
                let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
                let fingerprint = secret.public.fingerprint();
                let plaintext = cipher
                    .decrypt(
                        Nonce::from_slice(nonce),
                        Payload {
                            msg: ciphertext,
                            aad: &fingerprint.0,
                        },
                    )
                    .map_err(|_| {
                        OracleError::decryption(format!(
                            "Failed to unlock key {} (wrong passphrase?)",
                            secret.key_id()
                        ))
                    })?;
                Zeroizing::new(plaintext)
            }
            other => {
                return Err(OracleError::decryption(format!(
                    "Unsupported string-to-key usage {}",
                    other
                )))
            }
        };

        debug!("Unlocked secret key {}", secret.key_id());
        Ok(PrivateKey::new(&secret.public, material))
    }

    fn decrypt<'a>(
        &self,
        session: &PublicKeyEncryptedSessionKey,
        key: &PrivateKey,
        mut ciphertext: Box<dyn Read + 'a>,
        integrity_protected: bool,
    ) -> Result<Box<dyn DecryptedData + 'a>> {
        if session.encrypted_key.len() != SESSION_KEY_SIZE {
            return Err(OracleError::decryption(format!(
                "Encrypted session key must be {} bytes, got {}",
                SESSION_KEY_SIZE,
                session.encrypted_key.len()
            )));
        }
        let mask = session_mask(key.public_key(), key.material())?;
        let session_key = Zeroizing::new(xor(&session.encrypted_key, &mask[..]));

        let mut content = Zeroizing::new(Vec::new());
        (&mut ciphertext)
            .take(MAX_PACKET_SIZE as u64)
            .read_to_end(&mut content)
            .map_err(truncation_to_packet_error)?;

        if integrity_protected {
            match content.first().copied() {
                Some(SEIPD_VERSION) => {
                    content.remove(0);
                }
                Some(version) => {
                    return Err(OracleError::unsupported(format!(
                        "integrity-protected data version {}",
                        version
                    )))
                }
                None => return Err(OracleError::packet("Empty encrypted data packet")),
            }
        }

        apply_keystream(&session_key, &mut content);

        let integrity_ok = if integrity_protected {
            if content.len() < TAG_SIZE {
                return Err(OracleError::integrity(
                    "Encrypted content is shorter than its integrity tag",
                ));
            }
            let split = content.len() - TAG_SIZE;
            let expected = integrity_tag(&session_key, &content[..split]);
            let ok = bool::from(content[split..].ct_eq(&expected));
            content.truncate(split);
            ok
        } else {
            true
        };

        Ok(Box::new(ReferenceDecrypted {
            content: Cursor::new(content),
            integrity_ok,
        }))
    }

    fn decompress<'a>(
        &self,
        algorithm: CompressionAlgorithm,
        data: Box<dyn Read + 'a>,
    ) -> Result<Box<dyn Read + 'a>> {
        match algorithm {
            CompressionAlgorithm::Uncompressed => Ok(data),
            other => Err(OracleError::unsupported(format!(
                "compression algorithm {}",
                other.to_byte()
            ))),
        }
    }
}
