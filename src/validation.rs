//! Input validation and resource limits for untrusted OpenPGP data.
//!
//! Every length read from the wire passes through these helpers before it is
//! used to slice or allocate, so malformed input surfaces as a
//! [`OracleError::Validation`] rather than a panic.

use crate::error::{OracleError, Result};

/// Maximum size of a single packet body (64MB)
pub const MAX_PACKET_SIZE: usize = 64 * 1024 * 1024;

/// Maximum size of key material or a signature body (64KB)
pub const MAX_KEY_SIZE: usize = 64 * 1024;

/// Maximum allowed User ID length (8KB)
pub const MAX_USER_ID_LENGTH: usize = 8 * 1024;

/// Maximum number of packets accepted in one key ring or message
pub const MAX_PACKETS_PER_MESSAGE: usize = 10_000;

/// Maximum allowed number of keys in a key ring
pub const MAX_KEYS_PER_KEYRING: usize = 1_000;

/// Maximum allowed nesting depth for compressed or signed containers
pub const MAX_PACKET_NESTING_DEPTH: usize = 10;

/// Maximum number of subpackets in one signature subpacket area
pub const MAX_SUBPACKETS: usize = 512;

/// Validation functions for input data
pub struct Validator;

impl Validator {
    /// Validate packet size
    pub fn validate_packet_size(size: usize) -> Result<()> {
        if size > MAX_PACKET_SIZE {
            return Err(OracleError::validation(format!(
                "Packet too large: {} bytes exceeds maximum of {} bytes",
                size, MAX_PACKET_SIZE
            )));
        }
        Ok(())
    }

    /// Validate key material size
    pub fn validate_key_size(data: &[u8]) -> Result<()> {
        if data.len() > MAX_KEY_SIZE {
            return Err(OracleError::validation(format!(
                "Key material too large: {} bytes exceeds maximum of {} bytes",
                data.len(),
                MAX_KEY_SIZE
            )));
        }
        Ok(())
    }

    /// Validate a raw User ID packet body.
    ///
    /// OpenPGP places no character restrictions on User IDs, so only the
    /// length is bounded here.
    pub fn validate_user_id(user_id: &[u8]) -> Result<()> {
        if user_id.len() > MAX_USER_ID_LENGTH {
            return Err(OracleError::validation(format!(
                "User ID too long: {} bytes exceeds maximum of {} bytes",
                user_id.len(),
                MAX_USER_ID_LENGTH
            )));
        }
        Ok(())
    }

    /// Validate packet count in a message or key ring
    pub fn validate_packet_count(count: usize) -> Result<()> {
        if count > MAX_PACKETS_PER_MESSAGE {
            return Err(OracleError::validation(format!(
                "Too many packets: {} exceeds maximum of {}",
                count, MAX_PACKETS_PER_MESSAGE
            )));
        }
        Ok(())
    }

    /// Validate keyring size
    pub fn validate_keyring_size(count: usize) -> Result<()> {
        if count > MAX_KEYS_PER_KEYRING {
            return Err(OracleError::validation(format!(
                "Too many keys in keyring: {} exceeds maximum of {}",
                count, MAX_KEYS_PER_KEYRING
            )));
        }
        Ok(())
    }

    /// Validate container nesting depth
    pub fn validate_nesting_depth(depth: usize, max_depth: usize) -> Result<()> {
        if depth > max_depth {
            return Err(OracleError::validation(format!(
                "Packets nested too deeply: depth {} exceeds maximum of {}",
                depth, max_depth
            )));
        }
        Ok(())
    }

    /// Validate integer parsing with bounds checking
    pub fn validate_u32_from_bytes(data: &[u8], offset: usize) -> Result<u32> {
        let bytes = Self::validate_slice_extraction(data, offset, 4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Validate integer parsing with bounds checking
    pub fn validate_u16_from_bytes(data: &[u8], offset: usize) -> Result<u16> {
        let bytes = Self::validate_slice_extraction(data, offset, 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Validate a single byte read with bounds checking
    pub fn validate_u8_from_bytes(data: &[u8], offset: usize) -> Result<u8> {
        data.get(offset).copied().ok_or_else(|| {
            OracleError::validation(format!(
                "Insufficient data for u8: need {} bytes, have {} bytes",
                offset + 1,
                data.len()
            ))
        })
    }

    /// Validate slice extraction with bounds checking
    pub fn validate_slice_extraction(data: &[u8], offset: usize, length: usize) -> Result<&[u8]> {
        let end = offset.checked_add(length).ok_or_else(|| {
            OracleError::validation(format!(
                "Slice bounds overflow: offset {} length {}",
                offset, length
            ))
        })?;
        if data.len() < end {
            return Err(OracleError::validation(format!(
                "Slice out of bounds: trying to extract {} bytes at offset {} from {} byte array",
                length,
                offset,
                data.len()
            )));
        }

        Ok(&data[offset..end])
    }
}
