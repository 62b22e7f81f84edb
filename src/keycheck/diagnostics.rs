//! Structured trail of everything the validator skipped or rejected.

use crate::packet::{KeyId, SignaturePacket, SignatureType};
use std::fmt;
use tracing::debug;

/// Why a signature, User ID or subkey was set aside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A valid key revocation was found on the primary key
    PrimaryRevoked,
    /// The signature did not verify
    BadSignature,
    /// The engine could not check the signature at all
    VerificationFailed,
    /// A version 4 signature lacks a hashed creation time
    MissingCreationTime,
    /// The creation time is too far in the future
    FutureTimestamp,
    /// The signature or key expired before the evaluation time
    Expired,
    /// A signature of a type that does not apply here
    IgnoredSignature,
    /// Nothing at all was signed over this User ID or subkey
    NoSignatures,
    /// No signature over this User ID or subkey passed
    NoValidSignature,
    /// The most recent valid User ID signature is a revocation
    UserIdRevoked,
    /// A valid subkey revocation was found
    SubkeyRevoked,
    /// A signing subkey binding carries no embedded back-signature
    MissingBackSignature,
    /// The embedded back-signature is unusable or invalid
    BadBackSignature,
}

impl DiagnosticKind {
    fn describe(self) -> &'static str {
        match self {
            Self::PrimaryRevoked => "primary key is revoked",
            Self::BadSignature => "signature is invalid",
            Self::VerificationFailed => "signature could not be checked",
            Self::MissingCreationTime => "signature is missing a creation timestamp",
            Self::FutureTimestamp => "signature is created in the future",
            Self::Expired => "signature has expired",
            Self::IgnoredSignature => "signature type ignored",
            Self::NoSignatures => "rejected because no self-signatures were found",
            Self::NoValidSignature => "rejected because no valid self-signatures were found",
            Self::UserIdRevoked => "rejected because it was revoked",
            Self::SubkeyRevoked => "rejected because it was revoked",
            Self::MissingBackSignature => "binding rejected: no cross-certification",
            Self::BadBackSignature => "binding rejected: unusable cross-certification",
        }
    }
}

/// What a diagnostic is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// The primary key
    PrimaryKey(KeyId),
    /// A User ID on the primary key
    UserId(String),
    /// A subkey
    Subkey(KeyId),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::PrimaryKey(id) => write!(f, "primary key 0x{}", id),
            Subject::UserId(name) => write!(f, "name '{}'", name),
            Subject::Subkey(id) => write!(f, "subkey 0x{}", id),
        }
    }
}

/// Identifies the signature a diagnostic refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureRef {
    /// Signature type
    pub signature_type: SignatureType,
    /// Claimed issuer
    pub issuer: Option<KeyId>,
    /// Creation time, hashed or not
    pub created: Option<u32>,
}

impl From<&SignaturePacket> for SignatureRef {
    fn from(signature: &SignaturePacket) -> Self {
        Self {
            signature_type: signature.signature_type,
            issuer: signature.issuer(),
            created: signature.creation_time(),
        }
    }
}

impl fmt::Display for SignatureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "signature (type=0x{:02x})",
            self.signature_type.to_byte()
        )?;
        if let Some(issuer) = self.issuer {
            write!(f, " issued by keyid 0x{}", issuer)?;
        }
        Ok(())
    }
}

/// One entry of the validation trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Reason code
    pub kind: DiagnosticKind,
    /// What was examined
    pub subject: Subject,
    /// The signature involved, if any
    pub signature: Option<SignatureRef>,
    /// Free-form detail
    pub detail: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.subject)?;
        if let Some(signature) = &self.signature {
            write!(f, "{}: ", signature)?;
        }
        f.write_str(self.kind.describe())?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

/// Append-only diagnostic collector
#[derive(Debug, Default)]
pub(crate) struct DiagnosticLog {
    entries: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub(crate) fn record(
        &mut self,
        kind: DiagnosticKind,
        subject: &Subject,
        signature: Option<&SignaturePacket>,
        detail: Option<String>,
    ) {
        let diagnostic = Diagnostic {
            kind,
            subject: subject.clone(),
            signature: signature.map(SignatureRef::from),
            detail,
        };
        debug!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    pub(crate) fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}
