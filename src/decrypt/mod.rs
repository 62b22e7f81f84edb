//! Message decryption and one-pass signature verification.
//!
//! [`MessageDecryptor`] takes an encrypted message, finds the session key
//! addressed to the supplied private key, decrypts the content through the
//! [`CryptoEngine`], unwraps compression, and streams the literal data out
//! while feeding the signature digest selected through a
//! [`VerifiedKeyRing`].
//!
//! When the encrypted container is integrity protected, the integrity tag
//! is checked before any other content error is reported: a tampered
//! message always fails with [`OracleError::Integrity`].

mod selector;

pub use selector::extract_decryption_key;

use crate::armor::{self, ArmorType};
use crate::config::OracleConfig;
use crate::engine::{CryptoEngine, PrivateKey, SignatureVerifier};
use crate::error::{OracleError, Result};
use crate::keycheck::VerifiedKeyRing;
use crate::packet::{
    truncation_to_packet_error, CompressionAlgorithm, LiteralDataHeader, OnePassSignaturePacket,
    PacketHeader, PacketReader, PacketType, PublicKeyEncryptedSessionKey, SignaturePacket,
};
use crate::validation::{Validator, MAX_PACKET_SIZE};
use std::io::{self, BufRead, BufReader, Read};
use tracing::{debug, info, warn};

/// Plaintext and file name recovered from a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionResult {
    plaintext: Vec<u8>,
    filename: String,
}

impl DecryptionResult {
    /// The decrypted literal data
    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    /// File name declared by the literal data packet
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Take the plaintext
    pub fn into_plaintext(self) -> Vec<u8> {
        self.plaintext
    }
}

/// Decrypts messages against a crypto engine
pub struct MessageDecryptor<'e, E: ?Sized> {
    engine: &'e E,
    config: OracleConfig,
}

impl<'e, E: CryptoEngine + ?Sized> MessageDecryptor<'e, E> {
    /// Decryptor with default settings
    pub fn new(engine: &'e E) -> Self {
        Self {
            engine,
            config: OracleConfig::default(),
        }
    }

    /// Use the given settings
    pub fn with_config(mut self, config: OracleConfig) -> Self {
        self.config = config;
        self
    }

    /// Decrypt a binary or ASCII-armored message with `key`.
    ///
    /// With `verify`, the message must carry a one-pass signature made by a
    /// signing key of that ring, and the signature must verify.
    pub fn decrypt<R: Read>(
        &self,
        input: R,
        key: &PrivateKey,
        verify: Option<&VerifiedKeyRing>,
    ) -> Result<DecryptionResult> {
        let mut input = BufReader::new(input);
        let binary = match input.fill_buf()?.first() {
            Some(first) => first & 0x80 != 0,
            None => return Err(OracleError::packet("No encrypted content")),
        };
        if binary {
            return self.decrypt_packets(input, key, verify);
        }

        let mut text = Vec::new();
        input
            .take(MAX_PACKET_SIZE as u64 + 1)
            .read_to_end(&mut text)?;
        Validator::validate_packet_size(text.len())?;
        let data = armor::dearmor(&text, ArmorType::Message)?;
        debug!("Decoded armored message of {} bytes", data.len());
        self.decrypt_packets(&data[..], key, verify)
    }

    fn decrypt_packets<R: Read>(
        &self,
        input: R,
        key: &PrivateKey,
        verify: Option<&VerifiedKeyRing>,
    ) -> Result<DecryptionResult> {
        let mut packets = PacketReader::new(input);
        let mut sessions = Vec::new();

        let (header, integrity_protected) = loop {
            let header = packets
                .next_header()?
                .ok_or_else(|| OracleError::packet("No encrypted content"))?;
            match header.packet_type() {
                Some(PacketType::PublicKeyEncryptedSessionKey) => {
                    let body = packets.read_body(&header)?;
                    match PublicKeyEncryptedSessionKey::from_bytes(&body) {
                        Ok(session) => sessions.push(session),
                        Err(OracleError::Unsupported(what)) => {
                            debug!("Skipping session key packet: unsupported {}", what)
                        }
                        Err(e) => return Err(e),
                    }
                }
                Some(PacketType::SymmetricKeyEncryptedSessionKey) | Some(PacketType::Marker) => {
                    packets.skip_body(&header)?;
                }
                Some(PacketType::SymEncryptedIntegrityProtectedData) => break (header, true),
                Some(PacketType::SymmetricallyEncryptedData) => break (header, false),
                other => {
                    return Err(OracleError::packet(format!(
                        "Unexpected {} before encrypted content",
                        describe(&header, other)
                    )))
                }
            }
        };

        let session = sessions
            .iter()
            .find(|session| session.recipient == key.key_id())
            .ok_or_else(|| {
                OracleError::not_found(format!(
                    "No session key for key {} among {} recipients",
                    key.key_id(),
                    sessions.len()
                ))
            })?;
        debug!(
            "Decrypting {} content for key {}",
            if integrity_protected {
                "integrity-protected"
            } else {
                "legacy"
            },
            key.key_id()
        );

        let mut clear = self.engine.decrypt(
            session,
            key,
            Box::new(packets.body(&header)),
            integrity_protected,
        )?;
        let outcome = self.read_content(&mut clear, verify, 0);

        if integrity_protected {
            match io::copy(&mut clear, &mut io::sink()) {
                Ok(_) => {
                    if !clear.verify_integrity()? {
                        warn!("Integrity tag mismatch for key {}", key.key_id());
                        return Err(OracleError::integrity("modification detected"));
                    }
                }
                Err(e) => {
                    outcome?;
                    return Err(truncation_to_packet_error(e));
                }
            }
        }

        let result = outcome?;
        info!(
            "Decrypted {} bytes ({}) for key {}",
            result.plaintext.len(),
            result.filename,
            key.key_id()
        );
        Ok(result)
    }

    /// Parse decrypted content: optional compression, the one-pass
    /// signature list, the literal data and the trailing signatures.
    fn read_content(
        &self,
        input: &mut dyn Read,
        verify: Option<&VerifiedKeyRing>,
        depth: usize,
    ) -> Result<DecryptionResult> {
        let mut packets = PacketReader::new(input);
        let mut one_pass = Vec::new();

        let literal = loop {
            let header = packets
                .next_header()?
                .ok_or_else(|| OracleError::packet("Decrypted content holds no literal data"))?;
            match header.packet_type() {
                Some(PacketType::CompressedData) if one_pass.is_empty() => {
                    Validator::validate_nesting_depth(depth + 1, self.config.max_nesting_depth)?;
                    let mut body = packets.body(&header);
                    let mut algorithm = [0u8; 1];
                    body.read_exact(&mut algorithm)
                        .map_err(truncation_to_packet_error)?;
                    let algorithm = CompressionAlgorithm::from_byte(algorithm[0]);
                    debug!("Decompressing content ({:?})", algorithm);
                    let mut inner = self.engine.decompress(algorithm, Box::new(body))?;
                    return self.read_content(&mut inner, verify, depth + 1);
                }
                Some(PacketType::OnePassSignature) => {
                    let body = packets.read_body(&header)?;
                    one_pass.push(OnePassSignaturePacket::from_bytes(&body)?);
                }
                Some(PacketType::Marker) => packets.skip_body(&header)?,
                Some(PacketType::LiteralData) => break header,
                other => {
                    return Err(OracleError::packet(format!(
                        "Unexpected {} in decrypted content",
                        describe(&header, other)
                    )))
                }
            }
        };

        let selected = match verify {
            Some(ring) => {
                if one_pass.is_empty() {
                    return Err(OracleError::UnsignedMessage);
                }
                Some(select_signature(ring, &one_pass, self.engine)?)
            }
            None => None,
        };

        let (header, plaintext, verifier) = {
            let mut body = packets.body(&literal);
            let header = LiteralDataHeader::read_from(&mut body)?;
            let (plaintext, verifier) =
                stream_literal(&mut body, self.config.chunk_size, selected)?;
            (header, plaintext, verifier)
        };

        if let Some((index, verifier)) = verifier {
            let trailers = read_signatures(&mut packets)?;
            let signature = trailers
                .len()
                .checked_sub(index + 1)
                .and_then(|position| trailers.get(position))
                .ok_or_else(|| {
                    OracleError::bad_signature(format!(
                        "No trailing signature for one-pass entry {} of {}",
                        index,
                        trailers.len()
                    ))
                })?;
            if !verifier.finish(signature)? {
                return Err(OracleError::bad_signature(format!(
                    "Invalid {} in message",
                    signature
                )));
            }
            debug!("Verified {}", signature);
        }

        Ok(DecryptionResult {
            plaintext,
            filename: header.filename_lossy(),
        })
    }
}

/// Decrypt `input` with default settings
pub fn decrypt<R: Read, E: CryptoEngine + ?Sized>(
    input: R,
    key: &PrivateKey,
    verify: Option<&VerifiedKeyRing>,
    engine: &E,
) -> Result<DecryptionResult> {
    MessageDecryptor::new(engine).decrypt(input, key, verify)
}

type Selected = (usize, Box<dyn SignatureVerifier>);

/// The first one-pass entry, in header order, whose claimed issuer is a
/// signing key of `ring`.
fn select_signature<E: CryptoEngine + ?Sized>(
    ring: &VerifiedKeyRing,
    one_pass: &[OnePassSignaturePacket],
    engine: &E,
) -> Result<Selected> {
    for (index, entry) in one_pass.iter().enumerate() {
        if let Some(signer) = ring.signing_keys_for(entry.key_id) {
            debug!(
                "One-pass entry {} resolved to signing key {}",
                index,
                signer.key_id()
            );
            return Ok((index, engine.start_verification(entry, signer)?));
        }
    }
    Err(OracleError::no_match(format!(
        "None of {} one-pass signatures is from key {}",
        one_pass.len(),
        ring.fingerprint()
    )))
}

/// Copy literal content out in `chunk_size` pieces, feeding the verifier
fn stream_literal<R: Read>(
    body: &mut R,
    chunk_size: usize,
    mut selected: Option<Selected>,
) -> Result<(Vec<u8>, Option<Selected>)> {
    let mut plaintext = Vec::new();
    let mut chunk = vec![0u8; chunk_size];
    loop {
        let n = match body.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(truncation_to_packet_error(e)),
        };
        plaintext.extend_from_slice(&chunk[..n]);
        Validator::validate_packet_size(plaintext.len())?;
        if let Some((_, verifier)) = selected.as_mut() {
            verifier.update(&chunk[..n]);
        }
    }
    Ok((plaintext, selected))
}

/// Consecutive signature packets following the literal data
fn read_signatures<R: Read>(packets: &mut PacketReader<R>) -> Result<Vec<SignaturePacket>> {
    let mut signatures = Vec::new();
    while let Some(header) = packets.next_header()? {
        if header.packet_type() != Some(PacketType::Signature) {
            debug!("Stopping at {} after signatures", describe(&header, header.packet_type()));
            break;
        }
        let body = packets.read_body(&header)?;
        signatures.push(SignaturePacket::from_bytes(&body)?);
    }
    Ok(signatures)
}

fn describe(header: &PacketHeader, packet_type: Option<PacketType>) -> String {
    match packet_type {
        Some(packet_type) => format!("{:?} packet", packet_type),
        None => format!("packet with tag {}", header.tag),
    }
}
