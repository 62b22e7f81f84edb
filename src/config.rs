//! Runtime configuration for validation and decryption.

use crate::error::{OracleError, Result};
use crate::validation::MAX_PACKET_NESTING_DEPTH;
use serde::{Deserialize, Serialize};

/// Clock skew accepted on signature creation and expiration times (seconds)
pub const DEFAULT_TIMESTAMP_TOLERANCE_SECS: u64 = 60;

/// Size of the chunks literal data is streamed in
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Largest chunk size accepted from configuration (1MB)
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Tunables shared by the key validator and the message processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Seconds of clock skew tolerated in either direction when judging
    /// signature freshness.
    pub timestamp_tolerance_secs: u64,
    /// Literal data is copied to the output (and into the signature
    /// digest) in chunks of this many bytes.
    pub chunk_size: usize,
    /// Maximum depth of compressed containers inside a message.
    pub max_nesting_depth: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance_secs: DEFAULT_TIMESTAMP_TOLERANCE_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_nesting_depth: MAX_PACKET_NESTING_DEPTH,
        }
    }
}

impl OracleConfig {
    /// Builds a configuration from `PGPORACLE_*` environment variables,
    /// falling back to defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timestamp_tolerance_secs: env_or("PGPORACLE_TIMESTAMP_TOLERANCE")
                .unwrap_or(defaults.timestamp_tolerance_secs),
            chunk_size: env_or("PGPORACLE_CHUNK_SIZE").unwrap_or(defaults.chunk_size),
            max_nesting_depth: env_or("PGPORACLE_MAX_NESTING")
                .unwrap_or(defaults.max_nesting_depth),
        }
    }

    /// Rejects settings the processor cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(OracleError::config(format!(
                "chunk size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.max_nesting_depth == 0 || self.max_nesting_depth > MAX_PACKET_NESTING_DEPTH {
            return Err(OracleError::config(format!(
                "nesting depth must be between 1 and {}, got {}",
                MAX_PACKET_NESTING_DEPTH, self.max_nesting_depth
            )));
        }
        if self.timestamp_tolerance_secs > i64::MAX as u64 {
            return Err(OracleError::config("timestamp tolerance out of range"));
        }
        Ok(())
    }

    /// Timestamp tolerance as a signed number of seconds.
    pub fn tolerance(&self) -> i64 {
        i64::try_from(self.timestamp_tolerance_secs).unwrap_or(i64::MAX)
    }
}

fn env_or<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
