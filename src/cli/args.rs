//! Command-line argument parsing for pgporacle.

use crate::error::{OracleError, Result};
use std::env;
use std::path::PathBuf;
use std::process;

/// Command-line interface commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run {
        dir: PathBuf,
        json: bool,
    },
    CheckKey {
        file: PathBuf,
    },
    Decrypt {
        input_file: PathBuf,
        key_file: PathBuf,
        passphrase: Option<String>,
        verify_file: Option<PathBuf>,
        output_file: Option<PathBuf>,
    },
}

/// Parse command line arguments into a Command
pub fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    parse(&args[1..])
}

/// Parse the arguments that follow the program name
pub fn parse(args: &[String]) -> Result<Command> {
    let (command, rest) = match args.split_first() {
        Some(split) => split,
        None => return Err(OracleError::config("missing command")),
    };

    match command.as_str() {
        "run" => {
            let dir = rest
                .iter()
                .find(|arg| !arg.starts_with("--"))
                .ok_or_else(|| OracleError::config("run requires a test vector directory"))?;
            Ok(Command::Run {
                dir: PathBuf::from(dir),
                json: rest.iter().any(|arg| arg == "--json"),
            })
        }

        "check-key" => {
            let file = rest
                .first()
                .ok_or_else(|| OracleError::config("check-key requires a public key file"))?;
            Ok(Command::CheckKey {
                file: PathBuf::from(file),
            })
        }

        "decrypt" => {
            let mut input_file = None;
            let mut key_file = None;
            let mut passphrase = None;
            let mut verify_file = None;
            let mut output_file = None;

            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                let mut value = |flag: &str| {
                    iter.next()
                        .cloned()
                        .ok_or_else(|| OracleError::config(format!("{} requires a value", flag)))
                };
                match arg.as_str() {
                    "--key" => key_file = Some(PathBuf::from(value("--key")?)),
                    "--passphrase" => passphrase = Some(value("--passphrase")?),
                    "--verify" => verify_file = Some(PathBuf::from(value("--verify")?)),
                    "--output" => output_file = Some(PathBuf::from(value("--output")?)),
                    flag if flag.starts_with("--") => {
                        return Err(OracleError::config(format!("unknown option '{}'", flag)))
                    }
                    file => input_file = Some(PathBuf::from(file)),
                }
            }

            Ok(Command::Decrypt {
                input_file: input_file
                    .ok_or_else(|| OracleError::config("decrypt requires a message file"))?,
                key_file: key_file
                    .ok_or_else(|| OracleError::config("decrypt requires --key <file>"))?,
                passphrase,
                verify_file,
                output_file,
            })
        }

        other => Err(OracleError::config(format!("unknown command '{}'", other))),
    }
}

/// Print usage information
pub fn print_usage() {
    println!("pgporacle - OpenPGP key validation and decryption oracle");
    println!("========================================================");
    println!();
    println!("Usage: pgporacle <command> [args...]");
    println!();
    println!("Commands:");
    println!("  run <dir> [--json]                     Run every JSON test vector under dir");
    println!("  check-key <file>                       Validate a public key and list what survives");
    println!("  decrypt <message> --key <file>         Decrypt a message with a secret key");
    println!("          [--passphrase <p>] [--verify <public key>] [--output <file>]");
    println!();
    println!("Environment:");
    println!("  PGPORACLE_TIMESTAMP_TOLERANCE  Accepted clock skew in seconds (default 60)");
    println!("  PGPORACLE_CHUNK_SIZE           Literal data chunk size (default 8192)");
    println!("  PGPORACLE_MAX_NESTING          Maximum compression nesting (default 10)");
    println!("  RUST_LOG                       Log filter (default pgporacle=info)");
    println!();
    println!("Examples:");
    println!("  pgporacle run testdata/");
    println!("  pgporacle check-key alice.asc");
    println!("  pgporacle decrypt message.asc --key bob-secret.asc --verify alice.asc");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_run() {
        assert_eq!(
            parse(&args(&["run", "--json", "vectors"])).unwrap(),
            Command::Run {
                dir: PathBuf::from("vectors"),
                json: true
            }
        );
        assert!(parse(&args(&["run"])).is_err());
    }

    #[test]
    fn test_parse_decrypt() {
        let command = parse(&args(&[
            "decrypt",
            "msg.asc",
            "--key",
            "secret.asc",
            "--verify",
            "alice.asc",
        ]))
        .unwrap();
        assert_eq!(
            command,
            Command::Decrypt {
                input_file: PathBuf::from("msg.asc"),
                key_file: PathBuf::from("secret.asc"),
                passphrase: None,
                verify_file: Some(PathBuf::from("alice.asc")),
                output_file: None,
            }
        );

        assert!(parse(&args(&["decrypt", "msg.asc"])).is_err());
        assert!(parse(&args(&["decrypt", "msg.asc", "--key"])).is_err());
        assert!(parse(&args(&["decrypt", "msg.asc", "--key", "k", "--bogus"])).is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            parse(&args(&["sign"])),
            Err(OracleError::Config(_))
        ));
    }
}
