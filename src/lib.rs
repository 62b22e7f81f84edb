//! # pgporacle - OpenPGP interoperability oracle
//!
//! Validates OpenPGP public keys against the format's self-signature rules
//! and decrypts and verifies signed OpenPGP messages, so that independent
//! OpenPGP implementations can be checked against one another.
//!
//! ## Components
//!
//! - **Key validation** ([`keycheck`]): filters a key ring down to the User IDs
//!   and subkeys attested by current, unrevoked self-signatures, and finds
//!   the key that may verify a given signer's data signatures
//! - **Key selection** ([`decrypt::extract_decryption_key`]): picks and
//!   unlocks the decryption key of a secret key ring
//! - **Message processing** ([`decrypt`]): decrypts, decompresses and verifies
//!   one-pass signed messages, checking integrity protection
//! - **Compatibility harness** ([`harness`]): runs JSON test vectors
//!
//! The signature, decryption and key-unlocking mathematics sit behind the
//! [`engine::CryptoEngine`] trait. [`engine::PgpEngine`] implements it with
//! the OpenPGP algorithms; [`engine::ReferenceEngine`] is a deterministic
//! test fixture for exercising the protocol logic.
//!
//! ## Examples
//!
//! ### Key Validation
//!
//! ```rust,no_run
//! use pgporacle::engine::PgpEngine;
//! use pgporacle::keycheck::{self, KeyStatus};
//! use pgporacle::keyring::PublicKeyRing;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ring = PublicKeyRing::from_bytes(&std::fs::read("alice.asc")?)?;
//! let verified = keycheck::validate(&ring, &PgpEngine)?;
//! if verified.status() == KeyStatus::Ok {
//!     for uid in verified.user_ids() {
//!         println!("{}", uid.name());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Decryption
//!
//! ```rust,no_run
//! use pgporacle::decrypt::{decrypt, extract_decryption_key};
//! use pgporacle::engine::{Password, PgpEngine};
//! use pgporacle::keyring::SecretKeyRing;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = PgpEngine::new();
//! let secret = SecretKeyRing::from_bytes(&std::fs::read("bob-secret.asc")?)?;
//! let key = extract_decryption_key(&secret, &Password::from("passphrase"), &engine)?
//!     .ok_or("no decryption key")?;
//! let message = std::fs::read("message.asc")?;
//! let result = decrypt(message.as_slice(), &key, None, &engine)?;
//! println!("{}: {} bytes", result.filename(), result.plaintext().len());
//! # Ok(())
//! # }
//! ```

pub mod armor;
pub mod cli;
pub mod config;
pub mod decrypt;
pub mod engine;
pub mod error;
pub mod harness;
pub mod keycheck;
pub mod keyring;
pub mod packet;
pub mod validation;

pub use error::{OracleError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
