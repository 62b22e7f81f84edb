//! Compatibility test runner.
//!
//! Walks a directory tree for JSON test vectors, runs each one against the
//! key validator and the message processor, and collects a
//! [`HarnessReport`]. Hidden entries are skipped. A vector fails when any
//! step errors or any expectation does not hold; the run itself never
//! aborts.

mod vector;

pub use vector::{DecryptVector, ExpectedSubkey, ImportVector, TestVector, VectorKind};

use crate::config::OracleConfig;
use crate::decrypt::{extract_decryption_key, MessageDecryptor};
use crate::engine::{CryptoEngine, Password, PgpEngine};
use crate::error::{OracleError, Result};
use crate::keycheck::{KeyStatus, KeyValidator, VerifiedKeyRing};
use crate::keyring::{PublicKeyRing, SecretKeyRing};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of one test vector
#[derive(Debug, Clone, Serialize)]
pub struct VectorOutcome {
    /// File name of the vector
    pub name: String,
    /// Full path of the vector
    pub path: PathBuf,
    /// Test type, if the vector could be parsed
    pub kind: Option<VectorKind>,
    /// Why the vector failed
    pub error: Option<String>,
}

impl VectorOutcome {
    /// Whether the vector passed
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }

    /// The line printed for this vector, e.g. `alice.json: IMPORT: OK`
    pub fn summary(&self) -> String {
        let mut line = format!("{}: ", self.name);
        if let Some(kind) = self.kind {
            line.push_str(&format!("{}: ", kind));
        }
        line.push_str(if self.passed() { "OK" } else { "FAILED" });
        line
    }
}

/// Outcome of a harness run
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarnessReport {
    /// Per-vector results in visiting order
    pub outcomes: Vec<VectorOutcome>,
}

impl HarnessReport {
    /// Number of vectors that passed
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    /// Number of vectors that failed
    pub fn failures(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    /// Whether every vector passed
    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    /// Render the report as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs test vectors against a crypto engine
pub struct Harness<'e, E: ?Sized> {
    engine: &'e E,
    config: OracleConfig,
}

impl<'e, E: CryptoEngine + ?Sized> Harness<'e, E> {
    /// Harness with default settings
    pub fn new(engine: &'e E) -> Self {
        Self {
            engine,
            config: OracleConfig::default(),
        }
    }

    /// Use the given settings for validation and decryption
    pub fn with_config(mut self, config: OracleConfig) -> Self {
        self.config = config;
        self
    }

    /// Run every vector below `root`
    pub fn run_directory(&self, root: &Path) -> HarnessReport {
        let mut report = HarnessReport::default();
        self.walk(root, &mut report);
        info!(
            "Ran {} vectors under {}: {} failures",
            report.outcomes.len(),
            root.display(),
            report.failures()
        );
        report
    }

    fn walk(&self, dir: &Path, report: &mut HarnessReport) {
        let mut children: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .collect(),
            Err(e) => {
                warn!("Cannot list {}: {}", dir.display(), e);
                return;
            }
        };
        children.sort();

        for child in children {
            let name = match child.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if name.starts_with('.') {
                continue;
            }
            if child.is_dir() {
                self.walk(&child, report);
            } else if name.ends_with(".json") {
                report.outcomes.push(self.run_file(&child, name));
            }
        }
    }

    /// Run a single vector file
    pub fn run_file(&self, path: &Path, name: String) -> VectorOutcome {
        let (kind, result) = match TestVector::load(path) {
            Ok(vector) => (Some(vector.kind()), self.run_vector(&vector, path)),
            Err(e) => (None, Err(e)),
        };
        let error = result.err().map(|e| e.to_string());
        match &error {
            Some(e) => warn!("{} failed: {}", name, e),
            None => debug!("{} passed", name),
        }
        VectorOutcome {
            name,
            path: path.to_path_buf(),
            kind,
            error,
        }
    }

    /// Run a parsed vector located at `path`
    pub fn run_vector(&self, vector: &TestVector, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let message = path.with_extension("asc");
        match vector {
            TestVector::Import(expected) => self.run_import(expected, &message),
            TestVector::Decrypt(expected) => self.run_decrypt(expected, dir, &message),
        }
    }

    fn run_import(&self, expected: &ImportVector, key_file: &Path) -> Result<()> {
        let verified = self.validate_file(key_file)?;

        let fingerprint = verified.fingerprint().to_hex();
        check(
            fingerprint.eq_ignore_ascii_case(&expected.expected_fingerprint),
            || {
                format!(
                    "mismatched fingerprint ({} != {})",
                    expected.expected_fingerprint, fingerprint
                )
            },
        )?;

        check(verified.user_ids().len() == expected.expected_uids.len(), || {
            format!(
                "Uids not correctly found ({} != {})",
                expected.expected_uids.len(),
                verified.user_ids().len()
            )
        })?;
        let names: HashSet<String> = verified.user_ids().iter().map(|uid| uid.name()).collect();
        for uid in &expected.expected_uids {
            check(names.contains(uid), || format!("missing uid '{}'", uid))?;
        }

        if let Some(subkeys) = &expected.expected_subkeys {
            check(verified.subkeys().len() == subkeys.len(), || {
                format!(
                    "Subkeys not found ({} != {})",
                    subkeys.len(),
                    verified.subkeys().len()
                )
            })?;
            let fingerprints: HashSet<String> = verified
                .subkeys()
                .iter()
                .map(|subkey| subkey.public_key().fingerprint().to_hex())
                .collect();
            for wanted in subkeys.iter().filter_map(|s| s.expected_fingerprint.as_ref()) {
                check(fingerprints.contains(&wanted.to_lowercase()), || {
                    format!("missing subkey fingerprint {}", wanted)
                })?;
            }
        }
        Ok(())
    }

    fn run_decrypt(&self, expected: &DecryptVector, dir: &Path, message: &Path) -> Result<()> {
        let verify = match &expected.verify_key {
            Some(file) => Some(self.validate_file(&dir.join(file))?),
            None => None,
        };

        let secret = SecretKeyRing::from_bytes(&fs::read(dir.join(&expected.decrypt_key))?)?;
        let passphrase = Password::new(expected.passphrase.clone());
        let key = extract_decryption_key(&secret, &passphrase, self.engine)?
            .ok_or_else(|| OracleError::harness("Could not decrypt secret key"))?;

        let input = BufReader::new(File::open(message)?);
        let result = MessageDecryptor::new(self.engine)
            .with_config(self.config.clone())
            .decrypt(input, &key, verify.as_ref())?;

        if let Some(filename) = &expected.filename {
            check(result.filename() == filename, || {
                format!("Mismatched filename ({} != {})", filename, result.filename())
            })?;
        }
        if let Some(text) = &expected.textcontent {
            check(
                String::from_utf8_lossy(result.plaintext()) == text.as_str(),
                || "Incorrect content".to_string(),
            )?;
        }
        Ok(())
    }

    /// Validate a public key file, requiring status OK
    fn validate_file(&self, path: &Path) -> Result<VerifiedKeyRing> {
        let ring = PublicKeyRing::from_bytes(&fs::read(path)?)?;
        let verified = KeyValidator::new(self.engine)
            .with_config(self.config.clone())
            .validate(&ring)?;
        check(verified.status() == KeyStatus::Ok, || {
            format!(
                "key status {}: {}",
                verified.status(),
                verified.error_report().trim_end()
            )
        })?;
        Ok(verified)
    }
}

/// Run every vector below `root` on [`PgpEngine`] with default settings
pub fn run_directory(root: &Path) -> HarnessReport {
    Harness::new(&PgpEngine::new()).run_directory(root)
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(OracleError::harness(message()))
    }
}
