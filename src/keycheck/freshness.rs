//! Timestamp validity of self-signatures.

use super::diagnostics::DiagnosticKind;
use crate::packet::SignaturePacket;

/// Why a signature failed the timestamp check
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Stale {
    pub(crate) kind: DiagnosticKind,
    pub(crate) detail: String,
}

impl Stale {
    fn new(kind: DiagnosticKind, detail: String) -> Self {
        Self { kind, detail }
    }
}

/// Check that `signature` is current at `now`, allowing `tolerance`
/// seconds of clock skew in both directions.
///
/// Version 4 signatures must carry their creation time in the hashed area;
/// version 3 signatures use the time in their header.
/// Both the signature and key expiration intervals are measured from the
/// signature creation time, and an interval of zero counts as already
/// expired.
pub(crate) fn check_current(
    signature: &SignaturePacket,
    now: i64,
    tolerance: i64,
) -> Result<(), Stale> {
    let created = match signature.signed_creation_time() {
        Some(created) => i64::from(created),
        None => {
            return Err(Stale::new(
                DiagnosticKind::MissingCreationTime,
                "no hashed creation time".to_string(),
            ))
        }
    };

    if created > now + tolerance {
        return Err(Stale::new(
            DiagnosticKind::FutureTimestamp,
            format!("created at {}, evaluated at {}", created, now),
        ));
    }

    let intervals = [
        ("signature", signature.signature_expiration()),
        ("key", signature.key_expiration()),
    ];
    for (what, interval) in intervals {
        if let Some(interval) = interval {
            let expiry = created + i64::from(interval);
            if interval == 0 || expiry < now - tolerance {
                return Err(Stale::new(
                    DiagnosticKind::Expired,
                    format!("{} expired at {}", what, expiry),
                ));
            }
        }
    }

    Ok(())
}
