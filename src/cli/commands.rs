//! Command implementations for the pgporacle CLI.
//!
//! Each command runs against the engine it is given; [`crate::cli::run`]
//! passes a [`crate::engine::PgpEngine`].

use crate::{
    cli::utils::{format_timestamp, prompt_for_password, read_file, write_file},
    config::OracleConfig,
    decrypt::{extract_decryption_key, MessageDecryptor},
    engine::{CryptoEngine, Password},
    error::OracleError,
    harness::Harness,
    keycheck::KeyValidator,
    keyring::{PublicKeyRing, SecretKeyRing},
    Result,
};
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// Execute the run command. Returns the number of failed vectors.
pub fn run_vectors<E: CryptoEngine + ?Sized>(
    dir: &Path,
    json: bool,
    config: &OracleConfig,
    engine: &E,
) -> Result<usize> {
    let report = Harness::new(engine)
        .with_config(config.clone())
        .run_directory(dir);

    if json {
        println!("{}", report.to_json()?);
    } else {
        for outcome in &report.outcomes {
            eprintln!("{}", outcome.summary());
            if let Some(error) = &outcome.error {
                eprintln!("  {}", error);
            }
        }
    }

    let failures = report.failures();
    if failures > 0 {
        println!("{} failures", failures);
    }
    Ok(failures)
}

/// Execute the check-key command
pub fn check_key<E: CryptoEngine + ?Sized>(
    file: &Path,
    config: &OracleConfig,
    engine: &E,
) -> Result<()> {
    let ring = PublicKeyRing::from_bytes(&read_file(file)?)?;
    let verified = KeyValidator::new(engine)
        .with_config(config.clone())
        .validate(&ring)?;

    let primary = verified.primary();
    println!("Key:         {}", verified.fingerprint());
    println!("Algorithm:   {}", primary.algorithm);
    println!("Created:     {}", format_timestamp(primary.created));
    println!("Status:      {}", verified.status());

    for uid in verified.user_ids() {
        if uid.signature().is_primary_user_id() {
            println!("User ID:     {} (primary)", uid.name());
        } else {
            println!("User ID:     {}", uid.name());
        }
    }
    for subkey in verified.subkeys() {
        let key = subkey.public_key();
        let flags = subkey
            .signature()
            .key_flags()
            .map(|flags| format!("{:?}", flags))
            .unwrap_or_else(|| "no flags".to_string());
        println!("Subkey:      {} ({}, {})", key.fingerprint(), key.algorithm, flags);
    }
    if !verified.diagnostics().is_empty() {
        println!();
        print!("{}", verified.error_report());
    }

    info!(
        fingerprint = %verified.fingerprint(),
        status = %verified.status(),
        user_ids = verified.user_ids().len(),
        subkeys = verified.subkeys().len(),
        "Checked key"
    );
    Ok(())
}

/// Execute the decrypt command
pub fn decrypt<E: CryptoEngine + ?Sized>(
    input_file: &Path,
    key_file: &Path,
    passphrase: Option<String>,
    verify_file: Option<&Path>,
    output_file: Option<&Path>,
    config: &OracleConfig,
    engine: &E,
) -> Result<()> {
    let verify = match verify_file {
        Some(file) => {
            let ring = PublicKeyRing::from_bytes(&read_file(file)?)?;
            Some(
                KeyValidator::new(engine)
                    .with_config(config.clone())
                    .validate(&ring)?,
            )
        }
        None => None,
    };

    let secret = SecretKeyRing::from_bytes(&read_file(key_file)?)?;
    let passphrase = match passphrase {
        Some(passphrase) => Password::new(passphrase),
        None if secret.keys().iter().any(|key| key.key.is_protected()) => {
            prompt_for_password("Enter passphrase for the secret key")?
        }
        None => Password::new(String::new()),
    };
    let key = extract_decryption_key(&secret, &passphrase, engine)?.ok_or_else(|| {
        OracleError::not_found(format!(
            "No decryption key in {}",
            key_file.display()
        ))
    })?;

    let message = read_file(input_file)?;
    let result = MessageDecryptor::new(engine)
        .with_config(config.clone())
        .decrypt(message.as_slice(), &key, verify.as_ref())?;

    info!(
        filename = result.filename(),
        bytes = result.plaintext().len(),
        verified = verify.is_some(),
        "Decrypted message"
    );

    match output_file {
        Some(path) => write_file(path, result.plaintext())?,
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(result.plaintext())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
