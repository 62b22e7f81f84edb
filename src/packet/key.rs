//! Public and secret key packets, key IDs and fingerprints.

use super::read_mpi;
use crate::error::{OracleError, Result};
use crate::validation::Validator;
use sha1::{Digest, Sha1};
use std::fmt;
use zeroize::Zeroizing;

/// Public key algorithm identifiers (RFC 4880 section 9.1, RFC 6637)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublicKeyAlgorithm {
    /// RSA (Encrypt or Sign)
    RsaEncryptSign,
    /// RSA Encrypt-Only
    RsaEncryptOnly,
    /// RSA Sign-Only
    RsaSignOnly,
    /// Elgamal (Encrypt-Only)
    Elgamal,
    /// DSA
    Dsa,
    /// ECDH
    Ecdh,
    /// ECDSA
    Ecdsa,
    /// Elgamal (Encrypt or Sign), deprecated
    ElgamalEncryptSign,
    /// EdDSA
    EdDsa,
    /// Any other identifier
    Unknown(u8),
}

impl PublicKeyAlgorithm {
    /// Convert byte value to algorithm
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::RsaEncryptSign,
            2 => Self::RsaEncryptOnly,
            3 => Self::RsaSignOnly,
            16 => Self::Elgamal,
            17 => Self::Dsa,
            18 => Self::Ecdh,
            19 => Self::Ecdsa,
            20 => Self::ElgamalEncryptSign,
            22 => Self::EdDsa,
            other => Self::Unknown(other),
        }
    }

    /// Convert algorithm to byte value
    pub fn to_byte(self) -> u8 {
        match self {
            Self::RsaEncryptSign => 1,
            Self::RsaEncryptOnly => 2,
            Self::RsaSignOnly => 3,
            Self::Elgamal => 16,
            Self::Dsa => 17,
            Self::Ecdh => 18,
            Self::Ecdsa => 19,
            Self::ElgamalEncryptSign => 20,
            Self::EdDsa => 22,
            Self::Unknown(other) => other,
        }
    }

    /// Whether the algorithm is inherently capable of producing signatures.
    ///
    /// This is the fallback used when no usage flags mark a key for signing,
    /// so it deliberately covers only the RSA, DSA and ECDSA families.
    pub fn can_sign(self) -> bool {
        matches!(
            self,
            Self::RsaEncryptSign | Self::RsaSignOnly | Self::Dsa | Self::Ecdsa
        )
    }

    /// Whether the algorithm is inherently capable of encryption
    pub fn can_encrypt(self) -> bool {
        matches!(
            self,
            Self::RsaEncryptSign
                | Self::RsaEncryptOnly
                | Self::Elgamal
                | Self::Ecdh
                | Self::ElgamalEncryptSign
        )
    }

    /// Length of the algorithm-specific public material at the start of
    /// `data`, if the layout of this algorithm is known.
    fn public_material_len(self, data: &[u8]) -> Result<Option<usize>> {
        let mpis = |count: usize, mut offset: usize| -> Result<usize> {
            for _ in 0..count {
                offset = read_mpi(data, offset)?.1;
            }
            Ok(offset)
        };
        let oid = |offset: usize| -> Result<usize> {
            let len = Validator::validate_u8_from_bytes(data, offset)? as usize;
            if len == 0 || len == 0xFF {
                return Err(OracleError::packet("Reserved curve OID length"));
            }
            Validator::validate_slice_extraction(data, offset + 1, len)?;
            Ok(offset + 1 + len)
        };

        let len = match self {
            Self::RsaEncryptSign | Self::RsaEncryptOnly | Self::RsaSignOnly => mpis(2, 0)?,
            Self::Elgamal | Self::ElgamalEncryptSign => mpis(3, 0)?,
            Self::Dsa => mpis(4, 0)?,
            Self::Ecdsa | Self::EdDsa => mpis(1, oid(0)?)?,
            Self::Ecdh => {
                let offset = mpis(1, oid(0)?)?;
                let kdf_len = Validator::validate_u8_from_bytes(data, offset)? as usize;
                Validator::validate_slice_extraction(data, offset + 1, kdf_len)?;
                offset + 1 + kdf_len
            }
            Self::Unknown(_) => return Ok(None),
        };
        Ok(Some(len))
    }
}

impl fmt::Display for PublicKeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RsaEncryptSign => write!(f, "RSA"),
            Self::RsaEncryptOnly => write!(f, "RSA (encrypt-only)"),
            Self::RsaSignOnly => write!(f, "RSA (sign-only)"),
            Self::Elgamal => write!(f, "Elgamal"),
            Self::Dsa => write!(f, "DSA"),
            Self::Ecdh => write!(f, "ECDH"),
            Self::Ecdsa => write!(f, "ECDSA"),
            Self::ElgamalEncryptSign => write!(f, "Elgamal (encrypt or sign)"),
            Self::EdDsa => write!(f, "EdDSA"),
            Self::Unknown(id) => write!(f, "algorithm {}", id),
        }
    }
}

/// 64-bit OpenPGP key ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub u64);

impl KeyId {
    /// Key ID from its eight big-endian bytes
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// Big-endian byte representation
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// Version 4 key fingerprint (SHA-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 20]);

impl Fingerprint {
    /// Lowercase hexadecimal rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The key ID, i.e. the low 64 bits of the fingerprint
    pub fn key_id(&self) -> KeyId {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[12..]);
        KeyId::from_bytes(bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Version 4 public key or public subkey packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyPacket {
    /// Key creation time (Unix timestamp)
    pub created: u32,
    /// Public key algorithm
    pub algorithm: PublicKeyAlgorithm,
    /// Algorithm-specific public key material, MPI encoded
    pub key_material: Vec<u8>,
    raw: Vec<u8>,
    fingerprint: Fingerprint,
}

impl PublicKeyPacket {
    /// Parse a complete public key packet body
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (packet, consumed) = Self::parse_prefix(data, false)?;
        debug_assert_eq!(consumed, data.len());
        Ok(packet)
    }

    /// Parse the public part at the start of `data`, returning the packet and
    /// how many bytes it occupied. With `exact_length` the algorithm-specific
    /// material must be delimited by its own encoding; otherwise unknown
    /// algorithms take the remainder of `data`.
    pub(crate) fn parse_prefix(data: &[u8], exact_length: bool) -> Result<(Self, usize)> {
        Validator::validate_key_size(data)?;

        let version = Validator::validate_u8_from_bytes(data, 0)?;
        if version != 4 {
            return Err(OracleError::unsupported(format!(
                "version {} key packets",
                version
            )));
        }

        let created = Validator::validate_u32_from_bytes(data, 1)?;
        let algorithm = PublicKeyAlgorithm::from_byte(Validator::validate_u8_from_bytes(data, 5)?);
        let rest = &data[6..];

        let material_len = match algorithm.public_material_len(rest)? {
            Some(len) if exact_length => len,
            Some(_) => rest.len(),
            None if exact_length => {
                return Err(OracleError::unsupported(format!(
                    "secret keys using {}",
                    algorithm
                )))
            }
            None => rest.len(),
        };

        let consumed = 6 + material_len;
        let raw = data[..consumed].to_vec();
        let fingerprint = Fingerprint(Sha1::digest(hashable_form(&raw)).into());

        Ok((
            Self {
                created,
                algorithm,
                key_material: rest[..material_len].to_vec(),
                raw,
                fingerprint,
            },
            consumed,
        ))
    }

    /// Packet version
    pub fn version(&self) -> u8 {
        4
    }

    /// Raw packet body
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The key as it enters signature hashes: `0x99 || u16 length || body`
    pub fn hashable(&self) -> Vec<u8> {
        hashable_form(&self.raw)
    }

    /// SHA-1 fingerprint
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// 64-bit key ID
    pub fn key_id(&self) -> KeyId {
        self.fingerprint.key_id()
    }
}

fn hashable_form(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 3);
    out.push(0x99);
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Secret key or secret subkey packet
#[derive(Clone)]
pub struct SecretKeyPacket {
    /// The public part of the key
    pub public: PublicKeyPacket,
    /// String-to-key usage octet (0 = unprotected)
    pub s2k_usage: u8,
    /// Everything after the usage octet: S2K specifier, IV and the possibly
    /// encrypted secret material with its checksum.
    pub secret_data: Zeroizing<Vec<u8>>,
}

impl SecretKeyPacket {
    /// Parse from packet body bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (public, consumed) = PublicKeyPacket::parse_prefix(data, true)?;
        let s2k_usage = Validator::validate_u8_from_bytes(data, consumed).map_err(|_| {
            OracleError::packet("Secret key packet is missing its string-to-key usage octet")
        })?;
        Ok(Self {
            public,
            s2k_usage,
            secret_data: Zeroizing::new(data[consumed + 1..].to_vec()),
        })
    }

    /// 64-bit key ID
    pub fn key_id(&self) -> KeyId {
        self.public.key_id()
    }

    /// Whether the secret material is protected by a passphrase
    pub fn is_protected(&self) -> bool {
        self.s2k_usage != 0
    }
}

impl fmt::Debug for SecretKeyPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyPacket")
            .field("key_id", &self.key_id())
            .field("algorithm", &self.public.algorithm)
            .field("s2k_usage", &self.s2k_usage)
            .field("secret_data", &"[REDACTED]")
            .finish()
    }
}
