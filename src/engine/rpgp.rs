//! OpenPGP engine backed by rPGP.
//!
//! Packets parsed by this crate are handed to rPGP in their wire form. Key
//! signatures are hashed over [`CertificationTarget::hash_input`] and the
//! digest is checked with the signer's public parameters; session keys are
//! recovered with rPGP's public-key decryption and the content is run
//! through its CFB stream decryptors and decompressors.
//!
//! An unlocked [`PrivateKey`] carries the serialized, unprotected secret key
//! packet body, so only keys unlocked by this engine can be used with it.

use super::{
    CertificationTarget, CryptoEngine, DecryptedData, Password, PrivateKey, SignatureVerifier,
};
use crate::error::{OracleError, Result};
use crate::packet::{
    truncation_to_packet_error, CompressionAlgorithm, OnePassSignaturePacket, PublicKeyAlgorithm,
    PublicKeyEncryptedSessionKey, PublicKeyPacket, SecretKeyPacket, SignaturePacket,
};
use digest::DynDigest;
use pgp::composed::PlainSessionKey;
use pgp::crypto::hash::HashAlgorithm;
use pgp::crypto::sym::{StreamDecryptor, SymmetricKeyAlgorithm};
use pgp::packet::{
    Decompressor, PacketHeader, PublicKey, PublicKeyEncryptedSessionKey as SessionKeyPacket,
    SecretKey,
};
use pgp::ser::Serialize;
use pgp::types::{
    DecryptionKey, EskType, Mpi, Password as KeyPassword, Seipdv1ReadMode, SignatureBytes, Tag,
    VerifyingKey,
};
use std::io::{self, BufReader, Read};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Version octet of an integrity-protected data packet
const SEIPD_VERSION: u8 = 1;

/// Native Ed25519 and Ed448 signature algorithms
const NATIVE_SIGNATURE_ALGORITHMS: [u8; 2] = [27, 28];

/// Engine implementing the OpenPGP public-key and symmetric algorithms
#[derive(Debug, Clone, Copy, Default)]
pub struct PgpEngine;

impl PgpEngine {
    /// Create the engine
    pub fn new() -> Self {
        Self
    }
}

type Hasher = Box<dyn DynDigest + Send>;

fn hasher_for(id: u8) -> Result<(HashAlgorithm, Hasher)> {
    let algorithm = HashAlgorithm::from(id);
    let hasher = algorithm
        .new_hasher()
        .map_err(|e| OracleError::unsupported(format!("hash algorithm {}: {}", id, e)))?;
    Ok((algorithm, hasher))
}

/// Load one of our key bodies as an rPGP key. Primary keys and subkeys
/// share a body layout.
fn public_key(key: &PublicKeyPacket) -> Result<PublicKey> {
    let body = key.as_bytes();
    let header = PacketHeader::new_fixed(Tag::PublicKey, body.len() as u32);
    PublicKey::try_from_reader(header, body)
        .map_err(|e| OracleError::crypto(format!("Cannot load key {}: {}", key.key_id(), e)))
}

fn secret_key(body: &[u8]) -> pgp::errors::Result<SecretKey> {
    let header = PacketHeader::new_fixed(Tag::SecretKey, body.len() as u32);
    SecretKey::try_from_reader(header, body)
}

fn signature_bytes(signature: &SignaturePacket) -> Result<SignatureBytes> {
    let material = signature.signature_material.as_slice();
    if let PublicKeyAlgorithm::Unknown(id) = signature.public_key_algorithm {
        if NATIVE_SIGNATURE_ALGORITHMS.contains(&id) {
            return Ok(SignatureBytes::Native(material.to_vec().into()));
        }
    }

    let mut mpis = Vec::new();
    let mut rest = material;
    while !rest.is_empty() {
        let mpi = Mpi::try_from_reader(&mut rest)
            .map_err(|e| OracleError::packet(format!("Malformed signature material: {}", e)))?;
        mpis.push(mpi);
    }
    Ok(SignatureBytes::Mpis(mpis))
}

/// Check a finished digest against `signature`. A mismatch of any kind is
/// `Ok(false)`; only keys or material rPGP cannot load are errors.
fn check_digest(
    signature: &SignaturePacket,
    signer: &PublicKeyPacket,
    algorithm: HashAlgorithm,
    digest: &[u8],
) -> Result<bool> {
    let prefix = digest.get(..2).unwrap_or_default();
    if !bool::from(signature.hash_prefix[..].ct_eq(prefix)) {
        debug!("Hash prefix mismatch for {}", signature);
        return Ok(false);
    }

    let key = public_key(signer)?;
    let material = signature_bytes(signature)?;
    match key.verify(algorithm, digest, &material) {
        Ok(()) => Ok(true),
        Err(e) => {
            debug!("{} rejected by {}: {}", signature, signer.key_id(), e);
            Ok(false)
        }
    }
}

struct PgpVerifier {
    algorithm: HashAlgorithm,
    hasher: Hasher,
    signer: PublicKeyPacket,
}

impl SignatureVerifier for PgpVerifier {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finish(self: Box<Self>, signature: &SignaturePacket) -> Result<bool> {
        let PgpVerifier {
            algorithm,
            mut hasher,
            signer,
        } = *self;
        if signature.public_key_algorithm != signer.algorithm
            || HashAlgorithm::from(signature.hash_algorithm) != algorithm
        {
            return Ok(false);
        }
        hasher.update(&signature.hash_trailer());
        let digest = hasher.finalize();
        check_digest(signature, &signer, algorithm, &digest)
    }
}

/// Decrypted content. A modification detection code mismatch ends the
/// stream and is reported by [`DecryptedData::verify_integrity`].
struct PgpDecrypted<'a> {
    stream: StreamDecryptor<BufReader<Box<dyn Read + 'a>>>,
    modified: bool,
}

impl Read for PgpDecrypted<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.modified {
            return Ok(0);
        }
        match self.stream.read(buf) {
            Err(e) if is_mdc_error(&e) => {
                warn!("Modification detection code mismatch");
                self.modified = true;
                Ok(0)
            }
            other => other,
        }
    }
}

impl DecryptedData for PgpDecrypted<'_> {
    fn verify_integrity(&mut self) -> Result<bool> {
        Ok(!self.modified)
    }
}

fn is_mdc_error(error: &io::Error) -> bool {
    error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<pgp::errors::Error>())
        .is_some_and(|inner| matches!(inner, pgp::errors::Error::MdcError))
}

impl PgpEngine {
    /// Recover the symmetric algorithm and session key addressed to `key`
    fn session_key(
        &self,
        session: &PublicKeyEncryptedSessionKey,
        key: &PrivateKey,
    ) -> Result<(SymmetricKeyAlgorithm, Zeroizing<Vec<u8>>)> {
        let mut body = vec![3];
        body.extend_from_slice(&session.recipient.to_bytes());
        body.push(session.algorithm.to_byte());
        body.extend_from_slice(&session.encrypted_key);
        let header =
            PacketHeader::new_fixed(Tag::PublicKeyEncryptedSessionKey, body.len() as u32);
        let packet = SessionKeyPacket::try_from_reader(header, body.as_slice())
            .map_err(|e| {
                OracleError::decryption(format!(
                    "Malformed session key for {}: {}",
                    session.recipient, e
                ))
            })?;
        let values = packet
            .values()
            .map_err(|e| OracleError::decryption(e.to_string()))?;

        let secret = secret_key(key.material()).map_err(|e| {
            OracleError::decryption(format!(
                "Key {} was not unlocked by this engine: {}",
                key.key_id(),
                e
            ))
        })?;
        let plain = secret
            .decrypt(&KeyPassword::empty(), values, EskType::V3_4)
            .and_then(|inner| inner)
            .map_err(|e| {
                OracleError::decryption(format!(
                    "Cannot decrypt session key with {}: {}",
                    key.key_id(),
                    e
                ))
            })?;

        match &plain {
            PlainSessionKey::V3_4 { sym_alg, key } => {
                Ok((*sym_alg, Zeroizing::new(key.as_ref().to_vec())))
            }
            _ => Err(OracleError::unsupported("session keys other than version 3")),
        }
    }
}

impl CryptoEngine for PgpEngine {
    fn verify_certification(
        &self,
        signature: &SignaturePacket,
        signer: &PublicKeyPacket,
        target: &CertificationTarget<'_>,
    ) -> Result<bool> {
        if signature.public_key_algorithm != signer.algorithm {
            return Ok(false);
        }
        let (algorithm, mut hasher) = hasher_for(signature.hash_algorithm)?;
        hasher.update(&target.hash_input(signature));
        let digest = hasher.finalize();
        check_digest(signature, signer, algorithm, &digest)
    }

    fn start_verification(
        &self,
        one_pass: &OnePassSignaturePacket,
        signer: &PublicKeyPacket,
    ) -> Result<Box<dyn SignatureVerifier>> {
        let (algorithm, hasher) = hasher_for(one_pass.hash_algorithm)?;
        Ok(Box::new(PgpVerifier {
            algorithm,
            hasher,
            signer: signer.clone(),
        }))
    }

    fn unlock(&self, secret: &SecretKeyPacket, passphrase: &Password) -> Result<PrivateKey> {
        let mut body = Zeroizing::new(secret.public.as_bytes().to_vec());
        body.push(secret.s2k_usage);
        body.extend_from_slice(&secret.secret_data);

        let mut key = secret_key(&body).map_err(|e| {
            OracleError::decryption(format!(
                "Cannot load secret key {}: {}",
                secret.key_id(),
                e
            ))
        })?;
        key.remove_password(&KeyPassword::from(passphrase.as_bytes()))
            .map_err(|e| {
                OracleError::decryption(format!(
                    "Failed to unlock key {} (wrong passphrase?): {}",
                    secret.key_id(),
                    e
                ))
            })?;
        let material = key
            .to_bytes()
            .map_err(|e| OracleError::crypto(format!("Cannot serialize unlocked key: {}", e)))?;

        debug!("Unlocked secret key {}", secret.key_id());
        Ok(PrivateKey::new(&secret.public, Zeroizing::new(material)))
    }

    fn decrypt<'a>(
        &self,
        session: &PublicKeyEncryptedSessionKey,
        key: &PrivateKey,
        mut ciphertext: Box<dyn Read + 'a>,
        integrity_protected: bool,
    ) -> Result<Box<dyn DecryptedData + 'a>> {
        let (algorithm, session_key) = self.session_key(session, key)?;

        if integrity_protected {
            let mut version = [0u8; 1];
            ciphertext
                .read_exact(&mut version)
                .map_err(truncation_to_packet_error)?;
            if version[0] != SEIPD_VERSION {
                return Err(OracleError::unsupported(format!(
                    "integrity-protected data version {}",
                    version[0]
                )));
            }
        }

        let source = BufReader::new(ciphertext);
        let stream = if integrity_protected {
            algorithm.stream_decryptor_protected(Seipdv1ReadMode::Streaming, &session_key, source)
        } else {
            algorithm.stream_decryptor_unprotected(&session_key, source)
        }
        .map_err(|e| OracleError::decryption(format!("Cannot decrypt with {:?}: {}", algorithm, e)))?;

        debug!("Decrypting content with {:?}", algorithm);
        Ok(Box::new(PgpDecrypted {
            stream,
            modified: false,
        }))
    }

    fn decompress<'a>(
        &self,
        algorithm: CompressionAlgorithm,
        data: Box<dyn Read + 'a>,
    ) -> Result<Box<dyn Read + 'a>> {
        let id = algorithm.to_byte();
        let decompressor = Decompressor::from_algorithm(
            pgp::types::CompressionAlgorithm::from(id),
            BufReader::new(data),
        )
        .map_err(|e| OracleError::unsupported(format!("compression algorithm {}: {}", id, e)))?;
        Ok(Box::new(decompressor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PublicKeyPacket {
        let body = [4, 0, 0, 0, 1, 1, 0x00, 0x08, 0xC3, 0x00, 0x02, 0x03];
        PublicKeyPacket::from_bytes(&body).unwrap()
    }

    #[test]
    fn test_unknown_hash_algorithm() {
        let signature = SignaturePacket::from_bytes(&[4, 0x1F, 1, 99, 0, 0, 0, 0, 0, 0]).unwrap();
        let primary = key();
        assert!(matches!(
            PgpEngine.verify_certification(&signature, &primary, &CertificationTarget::Key(&primary)),
            Err(OracleError::Unsupported(_))
        ));
    }

    #[test]
    fn test_algorithm_mismatch_is_false() {
        let signature = SignaturePacket::from_bytes(&[4, 0x1F, 17, 8, 0, 0, 0, 0, 0, 0]).unwrap();
        let primary = key();
        assert!(!PgpEngine
            .verify_certification(&signature, &primary, &CertificationTarget::Key(&primary))
            .unwrap());
    }

    #[test]
    fn test_signature_material_mpis() {
        let signature =
            SignaturePacket::from_bytes(&[4, 0x00, 1, 8, 0, 0, 0, 0, 0xAB, 0xCD, 0x00, 0x09, 0x01, 0xFF])
                .unwrap();
        match signature_bytes(&signature).unwrap() {
            SignatureBytes::Mpis(mpis) => assert_eq!(mpis.len(), 1),
            other => panic!("unexpected {:?}", other),
        }

        let truncated =
            SignaturePacket::from_bytes(&[4, 0x00, 1, 8, 0, 0, 0, 0, 0xAB, 0xCD, 0x00, 0x10, 0x01])
                .unwrap();
        assert!(signature_bytes(&truncated).is_err());
    }

    #[test]
    fn test_mdc_error_detection() {
        let mdc = io::Error::other(pgp::errors::Error::MdcError);
        assert!(is_mdc_error(&mdc));
        assert!(!is_mdc_error(&io::Error::new(io::ErrorKind::UnexpectedEof, "short")));
    }

    #[test]
    fn test_decompress() {
        let data: &[u8] = b"abc";
        let mut out = Vec::new();
        PgpEngine
            .decompress(CompressionAlgorithm::Uncompressed, Box::new(data))
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"abc");

        assert!(matches!(
            PgpEngine.decompress(CompressionAlgorithm::from_byte(99), Box::new(data)),
            Err(OracleError::Unsupported(_))
        ));
    }

    #[test]
    fn test_private_key_from_other_engine_rejected() {
        let public = key();
        let private = PrivateKey::new(&public, Zeroizing::new(b"not a packet".to_vec()));
        let session = PublicKeyEncryptedSessionKey {
            recipient: public.key_id(),
            algorithm: public.algorithm,
            encrypted_key: vec![0x00, 0x08, 0x01],
        };
        assert!(matches!(
            PgpEngine.decrypt(&session, &private, Box::new(&b""[..]), true),
            Err(OracleError::Decryption(_))
        ));
    }
}
