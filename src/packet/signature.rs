//! Signature packets and their subpackets (RFC 4880 section 5.2).

use super::key::{KeyId, PublicKeyAlgorithm};
use crate::error::{OracleError, Result};
use crate::validation::{Validator, MAX_SUBPACKETS};
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Key usage flags carried in the key flags subpacket
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeyFlags: u8 {
        /// This key may be used to certify other keys
        const CERTIFY = 0x01;
        /// This key may be used to sign data
        const SIGN = 0x02;
        /// This key may be used to encrypt communications
        const ENCRYPT_COMMS = 0x04;
        /// This key may be used to encrypt storage
        const ENCRYPT_STORAGE = 0x08;
        /// The private component may have been split
        const SPLIT = 0x10;
        /// This key may be used for authentication
        const AUTHENTICATE = 0x20;
        /// The private component may be held by more than one person
        const SHARED = 0x80;
    }
}

impl KeyFlags {
    /// Either encryption purpose
    pub const ENCRYPT: KeyFlags = KeyFlags::ENCRYPT_COMMS.union(KeyFlags::ENCRYPT_STORAGE);
}

/// Signature types (RFC 4880 section 5.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureType {
    /// Signature of a binary document
    Binary,
    /// Signature of a canonical text document
    Text,
    /// Standalone signature
    Standalone,
    /// Generic certification of a User ID and public key
    GenericCertification,
    /// Persona certification
    PersonaCertification,
    /// Casual certification
    CasualCertification,
    /// Positive certification
    PositiveCertification,
    /// Subkey binding signature
    SubkeyBinding,
    /// Primary key binding signature (back-signature)
    PrimaryKeyBinding,
    /// Signature directly on a key
    DirectKey,
    /// Key revocation signature
    KeyRevocation,
    /// Subkey revocation signature
    SubkeyRevocation,
    /// Certification revocation signature
    CertificationRevocation,
    /// Timestamp signature
    Timestamp,
    /// Third-party confirmation signature
    ThirdPartyConfirmation,
    /// Any other type octet
    Unknown(u8),
}

impl SignatureType {
    /// Convert byte value to signature type
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Binary,
            0x01 => Self::Text,
            0x02 => Self::Standalone,
            0x10 => Self::GenericCertification,
            0x11 => Self::PersonaCertification,
            0x12 => Self::CasualCertification,
            0x13 => Self::PositiveCertification,
            0x18 => Self::SubkeyBinding,
            0x19 => Self::PrimaryKeyBinding,
            0x1F => Self::DirectKey,
            0x20 => Self::KeyRevocation,
            0x28 => Self::SubkeyRevocation,
            0x30 => Self::CertificationRevocation,
            0x40 => Self::Timestamp,
            0x50 => Self::ThirdPartyConfirmation,
            other => Self::Unknown(other),
        }
    }

    /// Convert signature type to byte value
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Binary => 0x00,
            Self::Text => 0x01,
            Self::Standalone => 0x02,
            Self::GenericCertification => 0x10,
            Self::PersonaCertification => 0x11,
            Self::CasualCertification => 0x12,
            Self::PositiveCertification => 0x13,
            Self::SubkeyBinding => 0x18,
            Self::PrimaryKeyBinding => 0x19,
            Self::DirectKey => 0x1F,
            Self::KeyRevocation => 0x20,
            Self::SubkeyRevocation => 0x28,
            Self::CertificationRevocation => 0x30,
            Self::Timestamp => 0x40,
            Self::ThirdPartyConfirmation => 0x50,
            Self::Unknown(other) => other,
        }
    }

    /// One of the four User ID certification types
    pub fn is_certification(self) -> bool {
        matches!(
            self,
            Self::GenericCertification
                | Self::PersonaCertification
                | Self::CasualCertification
                | Self::PositiveCertification
        )
    }

    /// Signature types that may be bound to a User ID
    pub fn is_user_id_signature(self) -> bool {
        self.is_certification() || self == Self::CertificationRevocation
    }

    /// Signature types that may be bound to a subkey
    pub fn is_subkey_signature(self) -> bool {
        matches!(self, Self::SubkeyBinding | Self::SubkeyRevocation)
    }
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Binary => "binary",
            Self::Text => "text",
            Self::Standalone => "standalone",
            Self::GenericCertification => "generic-certification",
            Self::PersonaCertification => "persona-certification",
            Self::CasualCertification => "casual-certification",
            Self::PositiveCertification => "positive-certification",
            Self::SubkeyBinding => "subkey-binding",
            Self::PrimaryKeyBinding => "primary-key-binding",
            Self::DirectKey => "direct-key",
            Self::KeyRevocation => "key-revocation",
            Self::SubkeyRevocation => "subkey-revocation",
            Self::CertificationRevocation => "certification-revocation",
            Self::Timestamp => "timestamp",
            Self::ThirdPartyConfirmation => "third-party-confirmation",
            Self::Unknown(other) => return write!(f, "type-{:#04x}", other),
        };
        f.write_str(name)
    }
}

/// Subpacket types this crate interprets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubpacketType {
    /// Signature creation time
    SignatureCreationTime,
    /// Signature expiration time
    SignatureExpirationTime,
    /// Key expiration time
    KeyExpirationTime,
    /// Issuer key ID
    Issuer,
    /// Primary User ID
    PrimaryUserId,
    /// Key flags
    KeyFlags,
    /// Embedded signature
    EmbeddedSignature,
    /// Issuer fingerprint
    IssuerFingerprint,
    /// Any other subpacket
    Other(u8),
}

impl SubpacketType {
    /// Convert byte value (critical bit cleared) to subpacket type
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            2 => Self::SignatureCreationTime,
            3 => Self::SignatureExpirationTime,
            9 => Self::KeyExpirationTime,
            16 => Self::Issuer,
            25 => Self::PrimaryUserId,
            27 => Self::KeyFlags,
            32 => Self::EmbeddedSignature,
            33 => Self::IssuerFingerprint,
            other => Self::Other(other),
        }
    }

    /// Convert subpacket type to byte value
    pub fn to_byte(self) -> u8 {
        match self {
            Self::SignatureCreationTime => 2,
            Self::SignatureExpirationTime => 3,
            Self::KeyExpirationTime => 9,
            Self::Issuer => 16,
            Self::PrimaryUserId => 25,
            Self::KeyFlags => 27,
            Self::EmbeddedSignature => 32,
            Self::IssuerFingerprint => 33,
            Self::Other(other) => other,
        }
    }
}

/// A single signature subpacket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subpacket {
    /// Whether the critical bit was set
    pub critical: bool,
    /// Subpacket type
    pub kind: SubpacketType,
    /// Subpacket body
    pub data: Vec<u8>,
}

impl Subpacket {
    fn as_u32(&self) -> Option<u32> {
        match self.data.as_slice() {
            [a, b, c, d] => Some(u32::from_be_bytes([*a, *b, *c, *d])),
            _ => None,
        }
    }
}

/// Parse a subpacket area
fn parse_subpackets(area: &[u8]) -> Result<Vec<Subpacket>> {
    let mut subpackets = Vec::new();
    let mut offset = 0;

    while offset < area.len() {
        if subpackets.len() >= MAX_SUBPACKETS {
            return Err(OracleError::validation("Too many signature subpackets"));
        }

        let first = area[offset] as usize;
        let (length, length_bytes) = if first < 192 {
            (first, 1)
        } else if first < 255 {
            let second = Validator::validate_u8_from_bytes(area, offset + 1)? as usize;
            (((first - 192) << 8) + second + 192, 2)
        } else {
            (
                Validator::validate_u32_from_bytes(area, offset + 1)? as usize,
                5,
            )
        };
        offset += length_bytes;

        if length == 0 {
            return Err(OracleError::packet("Empty signature subpacket"));
        }
        let body = Validator::validate_slice_extraction(area, offset, length)?;
        subpackets.push(Subpacket {
            critical: body[0] & 0x80 != 0,
            kind: SubpacketType::from_byte(body[0] & 0x7F),
            data: body[1..].to_vec(),
        });
        offset += length;
    }

    Ok(subpackets)
}

/// Version 3 or version 4 signature packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePacket {
    /// Packet version (3 or 4)
    pub version: u8,
    /// Signature type
    pub signature_type: SignatureType,
    /// Public key algorithm used for signature
    pub public_key_algorithm: PublicKeyAlgorithm,
    /// Hash algorithm identifier
    pub hash_algorithm: u8,
    /// Hashed subpackets
    pub hashed_subpackets: Vec<Subpacket>,
    /// Unhashed subpackets
    pub unhashed_subpackets: Vec<Subpacket>,
    /// Hash prefix (first 2 bytes of hash)
    pub hash_prefix: [u8; 2],
    /// Algorithm-specific signature material
    pub signature_material: Vec<u8>,
    hashed_area: Vec<u8>,
    v3_created: Option<u32>,
    v3_issuer: Option<KeyId>,
}

impl SignaturePacket {
    /// Parse from packet body bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Validator::validate_key_size(data)?;
        match Validator::validate_u8_from_bytes(data, 0)? {
            2 | 3 => Self::parse_v3(data),
            4 => Self::parse_v4(data),
            version => Err(OracleError::unsupported(format!(
                "version {} signatures",
                version
            ))),
        }
    }

    fn parse_v3(data: &[u8]) -> Result<Self> {
        let hashed_len = Validator::validate_u8_from_bytes(data, 1)?;
        if hashed_len != 5 {
            return Err(OracleError::packet(format!(
                "Invalid v3 hashed material length {}",
                hashed_len
            )));
        }
        let signature_type = SignatureType::from_byte(Validator::validate_u8_from_bytes(data, 2)?);
        let created = Validator::validate_u32_from_bytes(data, 3)?;
        let mut issuer = [0u8; 8];
        issuer.copy_from_slice(Validator::validate_slice_extraction(data, 7, 8)?);
        let public_key_algorithm =
            PublicKeyAlgorithm::from_byte(Validator::validate_u8_from_bytes(data, 15)?);
        let hash_algorithm = Validator::validate_u8_from_bytes(data, 16)?;
        let prefix = Validator::validate_slice_extraction(data, 17, 2)?;

        Ok(Self {
            version: 3,
            signature_type,
            public_key_algorithm,
            hash_algorithm,
            hashed_subpackets: Vec::new(),
            unhashed_subpackets: Vec::new(),
            hash_prefix: [prefix[0], prefix[1]],
            signature_material: data[19..].to_vec(),
            hashed_area: Vec::new(),
            v3_created: Some(created),
            v3_issuer: Some(KeyId::from_bytes(issuer)),
        })
    }

    fn parse_v4(data: &[u8]) -> Result<Self> {
        let signature_type = SignatureType::from_byte(Validator::validate_u8_from_bytes(data, 1)?);
        let public_key_algorithm =
            PublicKeyAlgorithm::from_byte(Validator::validate_u8_from_bytes(data, 2)?);
        let hash_algorithm = Validator::validate_u8_from_bytes(data, 3)?;

        let hashed_len = Validator::validate_u16_from_bytes(data, 4)? as usize;
        let hashed_area = Validator::validate_slice_extraction(data, 6, hashed_len)?.to_vec();
        let mut offset = 6 + hashed_len;

        let unhashed_len = Validator::validate_u16_from_bytes(data, offset)? as usize;
        let unhashed_area = Validator::validate_slice_extraction(data, offset + 2, unhashed_len)?;
        offset += 2 + unhashed_len;

        let prefix = Validator::validate_slice_extraction(data, offset, 2)?;
        let hash_prefix = [prefix[0], prefix[1]];
        offset += 2;

        Ok(Self {
            version: 4,
            signature_type,
            public_key_algorithm,
            hash_algorithm,
            hashed_subpackets: parse_subpackets(&hashed_area)?,
            unhashed_subpackets: parse_subpackets(unhashed_area)?,
            hash_prefix,
            signature_material: data[offset..].to_vec(),
            hashed_area,
            v3_created: None,
            v3_issuer: None,
        })
    }

    fn hashed(&self, kind: SubpacketType) -> Option<&Subpacket> {
        self.hashed_subpackets.iter().find(|sp| sp.kind == kind)
    }

    fn unhashed(&self, kind: SubpacketType) -> Option<&Subpacket> {
        self.unhashed_subpackets.iter().find(|sp| sp.kind == kind)
    }

    fn any_area(&self, kind: SubpacketType) -> Option<&Subpacket> {
        self.hashed(kind).or_else(|| self.unhashed(kind))
    }

    /// Key ID of the issuer, from the v3 header, an issuer subpacket or an
    /// issuer fingerprint subpacket, in that order.
    pub fn issuer(&self) -> Option<KeyId> {
        if let Some(issuer) = self.v3_issuer {
            return Some(issuer);
        }
        if let Some(sp) = self.any_area(SubpacketType::Issuer) {
            if let Ok(bytes) = <[u8; 8]>::try_from(sp.data.as_slice()) {
                return Some(KeyId::from_bytes(bytes));
            }
        }
        self.any_area(SubpacketType::IssuerFingerprint)
            .filter(|sp| sp.data.len() == 21)
            .map(|sp| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&sp.data[13..21]);
                KeyId::from_bytes(bytes)
            })
    }

    /// Creation time from wherever the packet carries it, hashed or not
    pub fn creation_time(&self) -> Option<u32> {
        self.v3_created.or_else(|| {
            self.any_area(SubpacketType::SignatureCreationTime)
                .and_then(Subpacket::as_u32)
        })
    }

    /// Creation time covered by the signature itself: the v3 header field,
    /// or the hashed creation time subpacket of a v4 signature.
    pub fn signed_creation_time(&self) -> Option<u32> {
        match self.version {
            4 => self
                .hashed(SubpacketType::SignatureCreationTime)
                .and_then(Subpacket::as_u32),
            _ => self.v3_created,
        }
    }

    /// Hashed signature expiration interval in seconds
    pub fn signature_expiration(&self) -> Option<u32> {
        self.hashed(SubpacketType::SignatureExpirationTime)
            .and_then(Subpacket::as_u32)
    }

    /// Hashed key expiration interval in seconds
    pub fn key_expiration(&self) -> Option<u32> {
        self.hashed(SubpacketType::KeyExpirationTime)
            .and_then(Subpacket::as_u32)
    }

    /// Hashed key usage flags, if present
    pub fn key_flags(&self) -> Option<KeyFlags> {
        self.hashed(SubpacketType::KeyFlags)
            .map(|sp| KeyFlags::from_bits_retain(sp.data.first().copied().unwrap_or(0)))
    }

    /// Whether the hashed key flags assert any of `flags`
    pub fn has_key_flag(&self, flags: KeyFlags) -> bool {
        self.key_flags().is_some_and(|f| f.intersects(flags))
    }

    /// Whether the hashed area marks this User ID as primary
    pub fn is_primary_user_id(&self) -> bool {
        self.hashed(SubpacketType::PrimaryUserId)
            .is_some_and(|sp| sp.data.first().is_some_and(|b| *b != 0))
    }

    /// Raw body of the embedded signature, preferring the hashed area
    pub fn embedded_signature(&self) -> Option<&[u8]> {
        self.any_area(SubpacketType::EmbeddedSignature)
            .map(|sp| sp.data.as_slice())
    }

    /// The bytes appended to the signed data before hashing.
    ///
    /// Version 4 appends the hashed part of the packet followed by
    /// `0x04 0xFF` and its big-endian length; version 3 appends the type
    /// octet and creation time.
    pub fn hash_trailer(&self) -> Vec<u8> {
        match self.v3_created {
            Some(created) => {
                let mut trailer = vec![self.signature_type.to_byte()];
                trailer.extend_from_slice(&created.to_be_bytes());
                trailer
            }
            None => {
                let mut trailer = vec![
                    self.version,
                    self.signature_type.to_byte(),
                    self.public_key_algorithm.to_byte(),
                    self.hash_algorithm,
                ];
                trailer.extend_from_slice(&(self.hashed_area.len() as u16).to_be_bytes());
                trailer.extend_from_slice(&self.hashed_area);
                let hashed_len = trailer.len() as u32;
                trailer.extend_from_slice(&[0x04, 0xFF]);
                trailer.extend_from_slice(&hashed_len.to_be_bytes());
                trailer
            }
        }
    }
}

impl fmt::Display for SignaturePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} signature", self.signature_type)?;
        if let Some(issuer) = self.issuer() {
            write!(f, " by {}", issuer)?;
        }
        if let Some(created) = self.creation_time() {
            write!(f, " created {}", created)?;
        }
        Ok(())
    }
}
