//! JSON test vector format.
//!
//! Each vector is a `.json` file whose `type` field selects the test. The
//! armored input it refers to lives next to it as `<base>.asc`; other key
//! files are named relative to the vector's directory.

use crate::error::{OracleError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// A parsed test vector
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TestVector {
    /// Validate `<base>.asc` as a public key
    Import(ImportVector),
    /// Decrypt `<base>.asc`
    Decrypt(DecryptVector),
}

impl TestVector {
    /// Load a vector from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a vector from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            if e.is_data() {
                OracleError::harness(format!("Unexpected test vector: {}", e))
            } else {
                OracleError::Json(e)
            }
        })
    }

    /// Which kind of test this is
    pub fn kind(&self) -> VectorKind {
        match self {
            TestVector::Import(_) => VectorKind::Import,
            TestVector::Decrypt(_) => VectorKind::Decrypt,
        }
    }
}

/// Expected outcome of validating a public key
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportVector {
    /// Lowercase hex fingerprint of the primary key
    pub expected_fingerprint: String,
    /// Every User ID that must validate
    pub expected_uids: Vec<String>,
    /// Subkeys that must validate, when checked at all
    #[serde(default)]
    pub expected_subkeys: Option<Vec<ExpectedSubkey>>,
}

/// One expected subkey
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExpectedSubkey {
    /// Lowercase hex fingerprint of the subkey
    #[serde(default)]
    pub expected_fingerprint: Option<String>,
}

/// Inputs and expected outcome of decrypting a message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DecryptVector {
    /// Secret key file
    #[serde(rename = "decryptKey")]
    pub decrypt_key: String,
    /// Passphrase of the secret key
    pub passphrase: String,
    /// Public key file whose signature the message must carry
    #[serde(rename = "verifyKey", default)]
    pub verify_key: Option<String>,
    /// Expected literal file name
    #[serde(default)]
    pub filename: Option<String>,
    /// Expected plaintext as UTF-8
    #[serde(default)]
    pub textcontent: Option<String>,
}

/// Test vector type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorKind {
    /// Public key import
    Import,
    /// Message decryption
    Decrypt,
}

impl fmt::Display for VectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VectorKind::Import => "IMPORT",
            VectorKind::Decrypt => "DECRYPT",
        })
    }
}
