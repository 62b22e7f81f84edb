//! Command-line interface for pgporacle.
//!
//! This module provides the harness runner and the single-shot key check and
//! decrypt commands, all backed by [`PgpEngine`].

pub mod args;
pub mod commands;
pub mod utils;

use crate::config::OracleConfig;
use crate::engine::PgpEngine;
use crate::Result;
use std::process;

pub use args::Command;
pub use commands::*;
pub use utils::*;

/// Main entry point for the CLI application
pub fn run() -> Result<()> {
    // Parse command line arguments
    let command = match args::parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error parsing arguments: {}", e);
            args::print_usage();
            process::exit(1);
        }
    };

    let config = OracleConfig::from_env();
    config.validate()?;
    let engine = PgpEngine::new();

    // Execute command
    let result = match command {
        Command::Run { dir, json } => {
            commands::run_vectors(&dir, json, &config, &engine).map(|failures| {
                if failures > 0 {
                    process::exit(1);
                }
            })
        }
        Command::CheckKey { file } => commands::check_key(&file, &config, &engine),
        Command::Decrypt {
            input_file,
            key_file,
            passphrase,
            verify_file,
            output_file,
        } => commands::decrypt(
            &input_file,
            &key_file,
            passphrase,
            verify_file.as_deref(),
            output_file.as_deref(),
            &config,
            &engine,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    Ok(())
}
