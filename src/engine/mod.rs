//! The cryptographic engine seam.
//!
//! Key validation and message processing decide *which* signatures to check
//! and *which* keys to use; the mathematics of checking and decrypting is
//! delegated to a [`CryptoEngine`]. [`PgpEngine`] implements the OpenPGP
//! algorithms and is what the CLI and the harness run on. The deterministic
//! [`ReferenceEngine`] is a test fixture: it keeps the packet structure but
//! replaces the public-key mathematics, so vectors can be built in code.

use crate::error::Result;
use crate::packet::{
    CompressionAlgorithm, KeyId, OnePassSignaturePacket, PublicKeyAlgorithm,
    PublicKeyEncryptedSessionKey, PublicKeyPacket, SecretKeyPacket, SignaturePacket,
};
use std::fmt;
use std::io::Read;
use zeroize::{Zeroize, Zeroizing};

pub mod reference;
pub mod rpgp;

pub use reference::ReferenceEngine;
pub use rpgp::PgpEngine;

/// What a key signature certifies
#[derive(Debug, Clone, Copy)]
pub enum CertificationTarget<'a> {
    /// The primary key alone (key revocations, direct-key signatures)
    Key(&'a PublicKeyPacket),
    /// A User ID on the primary key
    UserId {
        /// Primary key
        primary: &'a PublicKeyPacket,
        /// Raw User ID packet body
        user_id: &'a [u8],
    },
    /// A subkey bound to the primary (bindings, revocations, back-signatures)
    Subkey {
        /// Primary key
        primary: &'a PublicKeyPacket,
        /// The subkey
        subkey: &'a PublicKeyPacket,
    },
}

impl CertificationTarget<'_> {
    /// The complete byte string hashed by `signature` over this target,
    /// trailer included.
    pub fn hash_input(&self, signature: &SignaturePacket) -> Vec<u8> {
        let mut input = Vec::new();
        match self {
            CertificationTarget::Key(key) => input.extend(key.hashable()),
            CertificationTarget::UserId { primary, user_id } => {
                input.extend(primary.hashable());
                if signature.version == 4 {
                    input.push(0xB4);
                    input.extend_from_slice(&(user_id.len() as u32).to_be_bytes());
                }
                input.extend_from_slice(user_id);
            }
            CertificationTarget::Subkey { primary, subkey } => {
                input.extend(primary.hashable());
                input.extend(subkey.hashable());
            }
        }
        input.extend(signature.hash_trailer());
        input
    }
}

/// Running digest over signed data, started from a one-pass signature
pub trait SignatureVerifier {
    /// Feed signed content
    fn update(&mut self, data: &[u8]);

    /// Check the trailing signature against everything fed so far
    fn finish(self: Box<Self>, signature: &SignaturePacket) -> Result<bool>;
}

/// Decrypted content of an encrypted data packet
pub trait DecryptedData: Read {
    /// Check the integrity tag. Only meaningful once the content has been
    /// read to the end; returns `Ok(true)` for containers without a tag.
    fn verify_integrity(&mut self) -> Result<bool>;
}

/// Unlocked private key material
pub struct PrivateKey {
    key_id: KeyId,
    algorithm: PublicKeyAlgorithm,
    material: Zeroizing<Vec<u8>>,
    public: PublicKeyPacket,
}

impl PrivateKey {
    /// Wrap unlocked material for the given public key
    pub fn new(public: &PublicKeyPacket, material: Zeroizing<Vec<u8>>) -> Self {
        Self {
            key_id: public.key_id(),
            algorithm: public.algorithm,
            material,
            public: public.clone(),
        }
    }

    /// 64-bit key ID
    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    /// Public key algorithm
    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    /// The matching public key
    pub fn public_key(&self) -> &PublicKeyPacket {
        &self.public
    }

    /// Secret key material
    pub fn material(&self) -> &[u8] {
        &self.material
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// Passphrase for unlocking secret keys
#[derive(Clone)]
pub struct Password(String);

impl Password {
    /// Create a new password from a string
    pub fn new(password: String) -> Self {
        Self(password)
    }

    /// Get password as bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Check if password is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

impl Drop for Password {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Signature verification, decryption, decompression and key unlocking
pub trait CryptoEngine {
    /// Verify a key signature made by `signer` over `target`
    fn verify_certification(
        &self,
        signature: &SignaturePacket,
        signer: &PublicKeyPacket,
        target: &CertificationTarget<'_>,
    ) -> Result<bool>;

    /// Start a running digest for the data signature announced by `one_pass`
    fn start_verification(
        &self,
        one_pass: &OnePassSignaturePacket,
        signer: &PublicKeyPacket,
    ) -> Result<Box<dyn SignatureVerifier>>;

    /// Unlock secret key material with a passphrase
    fn unlock(&self, secret: &SecretKeyPacket, passphrase: &Password) -> Result<PrivateKey>;

    /// Decrypt the body of an encrypted data packet using the session key
    /// addressed to `key`
    fn decrypt<'a>(
        &self,
        session: &PublicKeyEncryptedSessionKey,
        key: &PrivateKey,
        ciphertext: Box<dyn Read + 'a>,
        integrity_protected: bool,
    ) -> Result<Box<dyn DecryptedData + 'a>>;

    /// Wrap the body of a compressed data packet in a decompressing reader
    fn decompress<'a>(
        &self,
        algorithm: CompressionAlgorithm,
        data: Box<dyn Read + 'a>,
    ) -> Result<Box<dyn Read + 'a>>;
}
