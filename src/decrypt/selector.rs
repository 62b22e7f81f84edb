//! Choosing and unlocking the decryption key of a secret key ring.

use crate::engine::{CryptoEngine, Password, PrivateKey};
use crate::error::Result;
use crate::keyring::{RingKey, SecretKeyRing};
use crate::packet::{KeyFlags, SecretKeyPacket, SignaturePacket};
use tracing::{debug, info};

/// Pick the key of `ring` meant for decryption and unlock it.
///
/// The last key whose signatures flag it for encryption wins. Without any
/// such flags, the last key whose algorithm can encrypt is used, which
/// favours subkeys over the primary. Signatures are not verified here.
///
/// Returns `Ok(None)` when no key qualifies and a decryption error when
/// the passphrase does not unlock the chosen key.
pub fn extract_decryption_key<E: CryptoEngine + ?Sized>(
    ring: &SecretKeyRing,
    passphrase: &Password,
    engine: &E,
) -> Result<Option<PrivateKey>> {
    let selected = match select_key(ring) {
        Some(key) => key,
        None => {
            debug!("No key in the secret ring is usable for decryption");
            return Ok(None);
        }
    };

    let private = engine.unlock(&selected.key, passphrase)?;
    info!("Selected decryption key {}", private.key_id());
    Ok(Some(private))
}

fn select_key(ring: &SecretKeyRing) -> Option<&RingKey<SecretKeyPacket>> {
    let flagged = ring
        .keys()
        .iter()
        .filter(|key| signatures_of(ring, key).any(|sig| sig.has_key_flag(KeyFlags::ENCRYPT)))
        .last();
    if flagged.is_some() {
        return flagged;
    }

    ring.keys()
        .iter()
        .filter(|key| key.public_key().algorithm.can_encrypt())
        .last()
}

/// Every signature over a key: its own, plus the User ID certifications
/// when it is the primary.
fn signatures_of<'r>(
    ring: &'r SecretKeyRing,
    key: &'r RingKey<SecretKeyPacket>,
) -> impl Iterator<Item = &'r SignaturePacket> {
    let user_id_signatures = ring
        .user_ids()
        .iter()
        .filter(move |_| key.is_primary)
        .flat_map(|binding| binding.signatures.iter());
    key.signatures.iter().chain(user_id_signatures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ReferenceEngine;
    use crate::packet::{Packet, PacketType};

    fn secret_body(created: u32, algorithm: u8) -> Vec<u8> {
        let material = b"material".to_vec();
        let mut body = vec![4];
        body.extend_from_slice(&created.to_be_bytes());
        body.push(algorithm);
        let mpi = [0x00, 0x08, 0xC3];
        match algorithm {
            16 => (0..3).for_each(|_| body.extend_from_slice(&mpi)),
            17 => (0..4).for_each(|_| body.extend_from_slice(&mpi)),
            22 => {
                body.extend_from_slice(&[3, 0x2B, 0x06, 0x01]);
                body.extend_from_slice(&mpi);
            }
            _ => (0..2).for_each(|_| body.extend_from_slice(&mpi)),
        }
        body.push(0);
        body.extend_from_slice(&material);
        body.extend_from_slice(&ReferenceEngine::secret_checksum(&material).to_be_bytes());
        body
    }

    fn flagged_sig(sig_type: u8, flags: u8) -> Vec<u8> {
        vec![
            4, sig_type, 1, 8, 0, 3, 2, 27, flags, 0, 0, 0xAB, 0xCD, 0x00, 0x01, 0x01,
        ]
    }

    fn packet(packet_type: PacketType, body: Vec<u8>) -> Vec<u8> {
        Packet::new(packet_type, body).to_bytes().unwrap()
    }

    #[test]
    fn test_last_flagged_key_wins() {
        let mut data = packet(PacketType::SecretKey, secret_body(1, 1));
        data.extend(packet(PacketType::UserId, b"alice".to_vec()));
        data.extend(packet(PacketType::Signature, flagged_sig(0x13, 0x03)));
        data.extend(packet(PacketType::SecretSubkey, secret_body(2, 1)));
        data.extend(packet(PacketType::Signature, flagged_sig(0x18, 0x0C)));
        data.extend(packet(PacketType::SecretSubkey, secret_body(3, 1)));
        data.extend(packet(PacketType::Signature, flagged_sig(0x18, 0x04)));
        data.extend(packet(PacketType::SecretSubkey, secret_body(4, 1)));
        data.extend(packet(PacketType::Signature, flagged_sig(0x18, 0x02)));

        let ring = SecretKeyRing::from_bytes(&data).unwrap();
        let selected = select_key(&ring).unwrap();
        assert_eq!(selected.key_id(), ring.keys()[2].key_id());
    }

    #[test]
    fn test_primary_user_id_flags_count() {
        let mut data = packet(PacketType::SecretKey, secret_body(1, 1));
        data.extend(packet(PacketType::UserId, b"alice".to_vec()));
        data.extend(packet(PacketType::Signature, flagged_sig(0x13, 0x0F)));
        data.extend(packet(PacketType::SecretSubkey, secret_body(2, 1)));
        data.extend(packet(PacketType::Signature, flagged_sig(0x18, 0x02)));

        let ring = SecretKeyRing::from_bytes(&data).unwrap();
        assert_eq!(
            select_key(&ring).unwrap().key_id(),
            ring.keys()[0].key_id()
        );
    }

    #[test]
    fn test_algorithm_fallback() {
        let mut data = packet(PacketType::SecretKey, secret_body(1, 17));
        data.extend(packet(PacketType::SecretSubkey, secret_body(2, 16)));
        data.extend(packet(PacketType::SecretSubkey, secret_body(3, 22)));

        let ring = SecretKeyRing::from_bytes(&data).unwrap();
        assert_eq!(
            select_key(&ring).unwrap().key_id(),
            ring.keys()[1].key_id()
        );

        let private = extract_decryption_key(&ring, &Password::from(""), &ReferenceEngine)
            .unwrap()
            .unwrap();
        assert_eq!(private.key_id(), ring.keys()[1].key_id());
        assert_eq!(private.material(), b"material");
    }

    #[test]
    fn test_nothing_selected() {
        let data = packet(PacketType::SecretKey, secret_body(1, 3));
        let ring = SecretKeyRing::from_bytes(&data).unwrap();
        assert!(extract_decryption_key(&ring, &Password::from(""), &ReferenceEngine)
            .unwrap()
            .is_none());
    }
}
