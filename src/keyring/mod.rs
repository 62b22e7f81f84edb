//! Transferable key rings.
//!
//! A key ring is the ordered sequence of key packets found in one
//! transferable public or secret key, each with the signatures that follow
//! it, plus the User IDs declared on the primary key with their own
//! signatures. Parsing keeps the input order and does not judge the shape:
//! whether the first key is really a primary, or whether a second primary
//! appears, is decided by the key validator.

use crate::armor::{self, ArmorType};
use crate::error::{OracleError, Result};
use crate::packet::{
    KeyId, PacketReader, PacketType, PublicKeyPacket, SecretKeyPacket, SignaturePacket,
    UserIdPacket,
};
use crate::validation::Validator;
use std::io::Read;
use tracing::{debug, warn};

/// Packet kinds that can head a key in a ring
pub trait KeyPacket: Sized {
    /// Tag of the primary key packet
    const PRIMARY: PacketType;
    /// Tag of the subkey packet
    const SUBKEY: PacketType;
    /// Armor block the ring is exported in
    const ARMOR: ArmorType;

    /// Parse the packet body
    fn parse(body: &[u8]) -> Result<Self>;

    /// The public part of the key
    fn public_key(&self) -> &PublicKeyPacket;
}

impl KeyPacket for PublicKeyPacket {
    const PRIMARY: PacketType = PacketType::PublicKey;
    const SUBKEY: PacketType = PacketType::PublicSubkey;
    const ARMOR: ArmorType = ArmorType::PublicKey;

    fn parse(body: &[u8]) -> Result<Self> {
        PublicKeyPacket::from_bytes(body)
    }

    fn public_key(&self) -> &PublicKeyPacket {
        self
    }
}

impl KeyPacket for SecretKeyPacket {
    const PRIMARY: PacketType = PacketType::SecretKey;
    const SUBKEY: PacketType = PacketType::SecretSubkey;
    const ARMOR: ArmorType = ArmorType::PrivateKey;

    fn parse(body: &[u8]) -> Result<Self> {
        SecretKeyPacket::from_bytes(body)
    }

    fn public_key(&self) -> &PublicKeyPacket {
        &self.public
    }
}

/// One key of a ring with the signatures that directly follow it
#[derive(Debug, Clone)]
pub struct RingKey<K> {
    /// The key packet
    pub key: K,
    /// Whether the packet was a primary key packet
    pub is_primary: bool,
    /// Signatures over the key itself (revocations, direct-key, bindings)
    pub signatures: Vec<SignaturePacket>,
}

impl<K: KeyPacket> RingKey<K> {
    /// The public part of the key
    pub fn public_key(&self) -> &PublicKeyPacket {
        self.key.public_key()
    }

    /// 64-bit key ID
    pub fn key_id(&self) -> KeyId {
        self.public_key().key_id()
    }
}

/// A User ID declared on the primary key with its signatures
#[derive(Debug, Clone)]
pub struct UserIdBinding {
    /// The User ID packet
    pub user_id: UserIdPacket,
    /// Signatures that follow the User ID
    pub signatures: Vec<SignaturePacket>,
}

/// Ordered key ring
#[derive(Debug, Clone)]
pub struct KeyRing<K> {
    keys: Vec<RingKey<K>>,
    user_ids: Vec<UserIdBinding>,
}

/// Key ring of public keys
pub type PublicKeyRing = KeyRing<PublicKeyPacket>;

/// Key ring of secret keys
pub type SecretKeyRing = KeyRing<SecretKeyPacket>;

/// Where a signature packet attaches while parsing
enum Attach {
    Key,
    UserId,
    UserAttribute,
}

impl<K: KeyPacket> KeyRing<K> {
    /// Parse a key ring from binary or ASCII-armored bytes
    pub fn from_bytes(input: &[u8]) -> Result<Self> {
        let data = armor::dearmor(input, K::ARMOR)?;
        Self::from_reader(&data[..])
    }

    /// Parse a key ring from a binary packet stream
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut packets = PacketReader::new(reader);
        let mut keys: Vec<RingKey<K>> = Vec::new();
        let mut user_ids: Vec<UserIdBinding> = Vec::new();
        let mut attach = Attach::Key;

        while let Some(header) = packets.next_header()? {
            let body = packets.read_body(&header)?;
            let packet_type = match header.packet_type() {
                Some(packet_type) => packet_type,
                None => {
                    debug!("Skipping unknown packet tag {} in key ring", header.tag);
                    continue;
                }
            };

            match packet_type {
                t if t == K::PRIMARY || t == K::SUBKEY => {
                    keys.push(RingKey {
                        key: K::parse(&body)?,
                        is_primary: t == K::PRIMARY,
                        signatures: Vec::new(),
                    });
                    Validator::validate_keyring_size(keys.len())?;
                    attach = Attach::Key;
                }
                PacketType::UserId => {
                    if keys.is_empty() {
                        return Err(OracleError::structural(
                            "User ID packet before any key packet",
                        ));
                    }
                    user_ids.push(UserIdBinding {
                        user_id: UserIdPacket::from_bytes(&body)?,
                        signatures: Vec::new(),
                    });
                    attach = Attach::UserId;
                }
                PacketType::UserAttribute => {
                    attach = Attach::UserAttribute;
                }
                PacketType::Signature => {
                    let signature = match SignaturePacket::from_bytes(&body) {
                        Ok(signature) => signature,
                        Err(OracleError::Unsupported(what)) => {
                            warn!("Skipping signature packet: unsupported {}", what);
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    match attach {
                        Attach::Key => match keys.last_mut() {
                            Some(key) => key.signatures.push(signature),
                            None => {
                                return Err(OracleError::structural(
                                    "Signature packet before any key packet",
                                ))
                            }
                        },
                        Attach::UserId => {
                            if let Some(binding) = user_ids.last_mut() {
                                binding.signatures.push(signature);
                            }
                        }
                        Attach::UserAttribute => {}
                    }
                }
                PacketType::Trust | PacketType::Marker => {}
                PacketType::PublicKey
                | PacketType::PublicSubkey
                | PacketType::SecretKey
                | PacketType::SecretSubkey => {
                    return Err(OracleError::packet(format!(
                        "Unexpected {:?} packet in this kind of key ring",
                        packet_type
                    )));
                }
                other => {
                    return Err(OracleError::packet(format!(
                        "Unexpected {:?} packet in key ring",
                        other
                    )));
                }
            }
        }

        debug!(
            "Parsed key ring with {} keys and {} user IDs",
            keys.len(),
            user_ids.len()
        );
        Ok(Self { keys, user_ids })
    }

    /// Keys in input order
    pub fn keys(&self) -> &[RingKey<K>] {
        &self.keys
    }

    /// The first key, expected to be the primary
    pub fn primary(&self) -> Option<&RingKey<K>> {
        self.keys.first()
    }

    /// User IDs declared on the primary key, in declaration order
    pub fn user_ids(&self) -> &[UserIdBinding] {
        &self.user_ids
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the ring holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Find a key by key ID
    pub fn find(&self, key_id: KeyId) -> Option<&RingKey<K>> {
        self.keys.iter().find(|key| key.key_id() == key_id)
    }
}
