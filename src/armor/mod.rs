//! ASCII armor decoding for PGP messages and keys.
//!
//! This module implements the reading half of the ASCII armor format defined
//! in RFC 4880 section 6, so that key rings and messages can be supplied
//! either as binary packets or as armored text.

use crate::error::{OracleError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::borrow::Cow;
use std::collections::HashMap;

/// CRC-24 polynomial used for PGP armor checksums
const CRC24_POLY: u32 = 0x1864CFB;
const CRC24_INIT: u32 = 0xB704CE;

const BEGIN_PREFIX: &str = "-----BEGIN ";
const END_PREFIX: &str = "-----END ";
const DASHES: &str = "-----";

/// ASCII armor block types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmorType {
    /// PGP message (encrypted or signed data)
    Message,
    /// Public key block
    PublicKey,
    /// Private key block
    PrivateKey,
    /// Any other label
    Custom(String),
}

impl ArmorType {
    /// Get the armor header string for this type
    pub fn header_string(&self) -> String {
        match self {
            ArmorType::Message => "PGP MESSAGE".to_string(),
            ArmorType::PublicKey => "PGP PUBLIC KEY BLOCK".to_string(),
            ArmorType::PrivateKey => "PGP PRIVATE KEY BLOCK".to_string(),
            ArmorType::Custom(s) => s.clone(),
        }
    }

    /// Parse armor type from header string
    pub fn from_header_string(header: &str) -> Self {
        match header {
            "PGP MESSAGE" => ArmorType::Message,
            "PGP PUBLIC KEY BLOCK" => ArmorType::PublicKey,
            "PGP PRIVATE KEY BLOCK" => ArmorType::PrivateKey,
            s => ArmorType::Custom(s.to_string()),
        }
    }
}

/// Decoded ASCII armor block
#[derive(Debug, Clone)]
pub struct ArmoredData {
    /// The type of armored data
    pub armor_type: ArmorType,
    /// Armor headers (key-value pairs)
    pub headers: HashMap<String, String>,
    /// The decoded binary data
    pub data: Vec<u8>,
}

/// Calculate CRC-24 checksum used in PGP armor
pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;

    for &byte in data {
        crc ^= (byte as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if (crc & 0x1000000) != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }

    crc & 0xFFFFFF
}

/// Returns true if the input looks like ASCII armor rather than binary packets.
///
/// Binary OpenPGP data always starts with a byte that has the high bit set,
/// so any leading `-----BEGIN ` after optional whitespace is unambiguous.
pub fn is_armored(input: &[u8]) -> bool {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());
    input[start..].starts_with(BEGIN_PREFIX.as_bytes())
}

/// Returns the binary packet data for `input`, decoding armor when present.
///
/// Armored input must carry the `expected` block type, so a signature or a
/// public key block is not taken for a message.
pub fn dearmor(input: &[u8], expected: ArmorType) -> Result<Cow<'_, [u8]>> {
    if !is_armored(input) {
        return Ok(Cow::Borrowed(input));
    }
    let text = std::str::from_utf8(input)
        .map_err(|_| OracleError::armor("Armored input is not valid UTF-8"))?;
    let decoded = decode(text)?;
    if decoded.armor_type != expected {
        return Err(OracleError::armor(format!(
            "Expected {}, found {}",
            expected.header_string(),
            decoded.armor_type.header_string()
        )));
    }
    Ok(Cow::Owned(decoded.data))
}

/// Decode ASCII armored text to binary data
pub fn decode(armored_text: &str) -> Result<ArmoredData> {
    let mut lines = armored_text.lines().map(str::trim_end);

    let armor_type = loop {
        let line = lines
            .next()
            .ok_or_else(|| OracleError::armor("No armor header found"))?;
        if let Some(label) = line
            .trim_start()
            .strip_prefix(BEGIN_PREFIX)
            .and_then(|rest| rest.strip_suffix(DASHES))
        {
            break ArmorType::from_header_string(label);
        }
    };

    // Armor headers run until the first blank line. Some producers omit the
    // blank line when there are no headers, in which case the first line is
    // already base64.
    let mut headers = HashMap::new();
    let mut pending: Option<&str> = None;
    loop {
        let line = lines.next().ok_or_else(|| {
            OracleError::armor("Unexpected end of input while reading headers")
        })?;
        if line.trim().is_empty() {
            break;
        }
        match line.split_once(": ") {
            Some((key, value)) if !is_base64_line(line) => {
                headers.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => {
                pending = Some(line);
                break;
            }
        }
    }

    let mut body = String::new();
    let mut checksum: Option<&str> = None;
    let end_line = loop {
        let line = match pending.take() {
            Some(line) => line,
            None => lines.next().ok_or_else(|| {
                OracleError::armor("Unexpected end of input while reading data")
            })?,
        };
        let trimmed = line.trim();

        if trimmed.starts_with(END_PREFIX) {
            break trimmed;
        }
        if let Some(crc) = trimmed.strip_prefix('=') {
            checksum = Some(crc);
            let end = lines
                .next()
                .ok_or_else(|| OracleError::armor("Missing end header"))?;
            break end.trim();
        }
        if trimmed.is_empty() {
            continue;
        }
        if !is_base64_line(trimmed) {
            return Err(OracleError::armor(format!(
                "Invalid base64 data: {}",
                trimmed
            )));
        }
        body.push_str(trimmed);
    };

    let expected_end = format!("{}{}{}", END_PREFIX, armor_type.header_string(), DASHES);
    if end_line != expected_end {
        return Err(OracleError::armor(format!(
            "End header mismatch: expected '{}', got '{}'",
            expected_end, end_line
        )));
    }

    let data = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| OracleError::armor(format!("Invalid base64 payload: {}", e)))?;

    if let Some(crc) = checksum {
        verify_checksum(crc, &data)?;
    }

    Ok(ArmoredData {
        armor_type,
        headers,
        data,
    })
}

fn verify_checksum(encoded: &str, data: &[u8]) -> Result<()> {
    let bytes = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| OracleError::armor(format!("Invalid checksum encoding: {}", e)))?;
    if bytes.len() != 3 {
        return Err(OracleError::armor("Invalid checksum length"));
    }

    let expected = ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32);
    let actual = crc24(data);
    if actual != expected {
        return Err(OracleError::armor(format!(
            "Checksum mismatch: expected {:06X}, got {:06X}",
            expected, actual
        )));
    }
    Ok(())
}

/// Check if a line contains only base64 characters
fn is_base64_line(line: &str) -> bool {
    !line.is_empty()
        && line
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}
