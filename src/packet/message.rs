//! Packets that make up an encrypted or signed message.

use super::key::{KeyId, PublicKeyAlgorithm};
use super::signature::SignatureType;
use crate::error::{OracleError, Result};
use crate::validation::Validator;
use std::io::Read;

/// Public-key encrypted session key packet (tag 1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyEncryptedSessionKey {
    /// Key ID of the intended recipient
    pub recipient: KeyId,
    /// Public key algorithm of the recipient key
    pub algorithm: PublicKeyAlgorithm,
    /// Algorithm-specific encrypted session key
    pub encrypted_key: Vec<u8>,
}

impl PublicKeyEncryptedSessionKey {
    /// Parse from packet body bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let version = Validator::validate_u8_from_bytes(data, 0)?;
        if version != 3 {
            return Err(OracleError::unsupported(format!(
                "version {} session key packets",
                version
            )));
        }
        let mut recipient = [0u8; 8];
        recipient.copy_from_slice(Validator::validate_slice_extraction(data, 1, 8)?);
        let algorithm = PublicKeyAlgorithm::from_byte(Validator::validate_u8_from_bytes(data, 9)?);

        Ok(Self {
            recipient: KeyId::from_bytes(recipient),
            algorithm,
            encrypted_key: data[10..].to_vec(),
        })
    }
}

/// One-pass signature packet (tag 4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnePassSignaturePacket {
    /// Type of the signature that follows the data
    pub signature_type: SignatureType,
    /// Hash algorithm identifier
    pub hash_algorithm: u8,
    /// Public key algorithm of the signer
    pub public_key_algorithm: PublicKeyAlgorithm,
    /// Key ID of the claimed signer
    pub key_id: KeyId,
    /// False if another one-pass signature follows for the same data
    pub last: bool,
}

impl OnePassSignaturePacket {
    /// Parse from packet body bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != 13 {
            return Err(OracleError::packet(format!(
                "One-pass signature packet must be 13 bytes, got {}",
                data.len()
            )));
        }
        if data[0] != 3 {
            return Err(OracleError::unsupported(format!(
                "version {} one-pass signature packets",
                data[0]
            )));
        }
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&data[4..12]);

        Ok(Self {
            signature_type: SignatureType::from_byte(data[1]),
            hash_algorithm: data[2],
            public_key_algorithm: PublicKeyAlgorithm::from_byte(data[3]),
            key_id: KeyId::from_bytes(key_id),
            last: data[12] != 0,
        })
    }
}

/// Compression algorithm identifiers (RFC 4880 section 9.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionAlgorithm {
    /// Uncompressed
    Uncompressed,
    /// ZIP (RFC 1951)
    Zip,
    /// ZLIB (RFC 1950)
    Zlib,
    /// BZip2
    Bzip2,
    /// Any other identifier
    Unknown(u8),
}

impl CompressionAlgorithm {
    /// Convert byte value to algorithm
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Uncompressed,
            1 => Self::Zip,
            2 => Self::Zlib,
            3 => Self::Bzip2,
            other => Self::Unknown(other),
        }
    }

    /// Convert algorithm to byte value
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Uncompressed => 0,
            Self::Zip => 1,
            Self::Zlib => 2,
            Self::Bzip2 => 3,
            Self::Unknown(other) => other,
        }
    }
}

/// Header fields of a literal data packet (tag 11); the content follows
/// in the same body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralDataHeader {
    /// Data format octet (`b`, `t`, `u`, ...)
    pub format: u8,
    /// Declared file name
    pub filename: Vec<u8>,
    /// Declared modification date (Unix timestamp)
    pub date: u32,
}

impl LiteralDataHeader {
    /// Read the header fields from the start of a literal body stream,
    /// leaving the stream positioned at the content.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut head = [0u8; 2];
        read_field(reader, &mut head)?;
        let mut filename = vec![0u8; head[1] as usize];
        read_field(reader, &mut filename)?;
        let mut date = [0u8; 4];
        read_field(reader, &mut date)?;

        Ok(Self {
            format: head[0],
            filename,
            date: u32::from_be_bytes(date),
        })
    }

    /// The file name as text, replacing invalid UTF-8
    pub fn filename_lossy(&self) -> String {
        String::from_utf8_lossy(&self.filename).into_owned()
    }
}

fn read_field<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader
        .read_exact(buf)
        .map_err(|e| OracleError::packet(format!("Truncated literal data header: {}", e)))
}
