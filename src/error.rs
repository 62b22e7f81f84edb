//! Error types for oracle operations.
//!
//! Policy rejections during key validation (bad signature, expired, revoked,
//! missing back-signature) are never errors: they are recorded as
//! diagnostics on the verified key ring. Everything here aborts the
//! operation that raised it.

use thiserror::Error;

/// Result type alias for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;

/// Main error type for oracle operations.
#[derive(Error, Debug)]
pub enum OracleError {
    /// Malformed key ring shape (empty ring, misplaced or duplicate primary)
    #[error("Structural error: {0}")]
    Structural(String),

    /// Wrong passphrase, malformed private key material or failed session decryption
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// No session key packet addresses the supplied private key
    #[error("Not found: {0}")]
    NotFound(String),

    /// A verifying key ring was supplied but the message carries no signature
    #[error("Message is unsigned")]
    UnsignedMessage,

    /// None of the one-pass signature entries resolved to a validated signer
    #[error("No matching signing key: {0}")]
    NoMatch(String),

    /// The trailing signature did not verify against the streamed content
    #[error("Bad signature: {0}")]
    BadSignature(String),

    /// The integrity tag of a protected container did not match
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Packet framing or body parsing errors
    #[error("Packet error: {0}")]
    Packet(String),

    /// Armor decoding errors
    #[error("Armor error: {0}")]
    Armor(String),

    /// Cryptographic engine errors
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Algorithms or features the engine does not handle
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Test vector loading and reporting errors
    #[error("Harness error: {0}")]
    Harness(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OracleError {
    /// Creates a new structural error.
    pub fn structural<T: ToString>(msg: T) -> Self {
        Self::Structural(msg.to_string())
    }

    /// Creates a new decryption error.
    pub fn decryption<T: ToString>(msg: T) -> Self {
        Self::Decryption(msg.to_string())
    }

    /// Creates a new not-found error.
    pub fn not_found<T: ToString>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Creates a new no-match error.
    pub fn no_match<T: ToString>(msg: T) -> Self {
        Self::NoMatch(msg.to_string())
    }

    /// Creates a new bad-signature error.
    pub fn bad_signature<T: ToString>(msg: T) -> Self {
        Self::BadSignature(msg.to_string())
    }

    /// Creates a new integrity error.
    pub fn integrity<T: ToString>(msg: T) -> Self {
        Self::Integrity(msg.to_string())
    }

    /// Creates a new packet error.
    pub fn packet<T: ToString>(msg: T) -> Self {
        Self::Packet(msg.to_string())
    }

    /// Creates a new armor error.
    pub fn armor<T: ToString>(msg: T) -> Self {
        Self::Armor(msg.to_string())
    }

    /// Creates a new cryptographic error.
    pub fn crypto<T: ToString>(msg: T) -> Self {
        Self::Crypto(msg.to_string())
    }

    /// Creates a new unsupported-feature error.
    pub fn unsupported<T: ToString>(msg: T) -> Self {
        Self::Unsupported(msg.to_string())
    }

    /// Creates a new validation error.
    pub fn validation<T: ToString>(msg: T) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Creates a new configuration error.
    pub fn config<T: ToString>(msg: T) -> Self {
        Self::Config(msg.to_string())
    }

    /// Creates a new harness error.
    pub fn harness<T: ToString>(msg: T) -> Self {
        Self::Harness(msg.to_string())
    }
}
