//! Utility functions for CLI operations.

use crate::engine::Password;
use crate::error::{OracleError, Result};
use rpassword::prompt_password;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

/// Read file contents
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

/// Write file contents
pub fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)?;
    Ok(())
}

/// Format Unix timestamp as human-readable string
pub fn format_timestamp(timestamp: u32) -> String {
    let datetime = UNIX_EPOCH + Duration::from_secs(u64::from(timestamp));

    // Basic timestamp formatting for CLI display
    format!("{:?}", datetime)
}

/// Prompt for a passphrase securely (no echo to terminal). An empty answer
/// is allowed since unprotected keys take an empty passphrase.
pub fn prompt_for_password(prompt: &str) -> Result<Password> {
    let password_str = prompt_password(format!("{}: ", prompt))
        .map_err(|e| OracleError::config(format!("Failed to read passphrase: {}", e)))?;

    Ok(Password::new(password_str))
}
