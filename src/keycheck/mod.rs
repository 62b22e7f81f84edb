//! Key validation.
//!
//! [`KeyValidator`] examines a parsed public key ring and produces a
//! [`VerifiedKeyRing`]: a read-only view that exposes only the User IDs and
//! subkeys attested by a cryptographically valid, current and unrevoked
//! self-signature from the primary key. Everything set aside along the way
//! is kept as a [`Diagnostic`].
//!
//! Only direct self-signatures are considered; third-party certifications
//! play no part.

mod diagnostics;
mod freshness;

pub use diagnostics::{Diagnostic, DiagnosticKind, SignatureRef, Subject};

use crate::config::OracleConfig;
use crate::engine::{CertificationTarget, CryptoEngine};
use crate::error::{OracleError, Result};
use crate::keyring::PublicKeyRing;
use crate::packet::{
    Fingerprint, KeyFlags, KeyId, PublicKeyPacket, SignaturePacket, SignatureType, UserIdPacket,
};
use diagnostics::DiagnosticLog;
use freshness::check_current;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Overall outcome of validating a key ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyStatus {
    /// At least one User ID is attested and the key is not revoked
    Ok,
    /// The primary key carries a valid revocation
    Revoked,
    /// No User ID is attested
    Unusable,
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyStatus::Ok => "OK",
            KeyStatus::Revoked => "REVOKED",
            KeyStatus::Unusable => "UNUSABLE",
        })
    }
}

/// A User ID with the self-signature that attests it
#[derive(Debug, Clone)]
pub struct VerifiedUserId {
    user_id: UserIdPacket,
    signature: SignaturePacket,
}

impl VerifiedUserId {
    /// The User ID as text
    pub fn name(&self) -> String {
        self.user_id.user_id()
    }

    /// The User ID packet
    pub fn user_id(&self) -> &UserIdPacket {
        &self.user_id
    }

    /// The winning self-signature
    pub fn signature(&self) -> &SignaturePacket {
        &self.signature
    }
}

/// A subkey with the binding signature that attests it
#[derive(Debug, Clone)]
pub struct VerifiedSubkey {
    key: PublicKeyPacket,
    signature: SignaturePacket,
}

impl VerifiedSubkey {
    /// The subkey
    pub fn public_key(&self) -> &PublicKeyPacket {
        &self.key
    }

    /// The winning binding signature
    pub fn signature(&self) -> &SignaturePacket {
        &self.signature
    }
}

/// Filtered view of a key ring holding only attested material
#[derive(Debug, Clone)]
pub struct VerifiedKeyRing {
    status: KeyStatus,
    primary: PublicKeyPacket,
    user_ids: Vec<VerifiedUserId>,
    subkeys: Vec<VerifiedSubkey>,
    diagnostics: Vec<Diagnostic>,
}

impl VerifiedKeyRing {
    /// Validation outcome
    pub fn status(&self) -> KeyStatus {
        self.status
    }

    /// The primary key
    pub fn primary(&self) -> &PublicKeyPacket {
        &self.primary
    }

    /// Fingerprint of the primary key
    pub fn fingerprint(&self) -> Fingerprint {
        self.primary.fingerprint()
    }

    /// Attested User IDs in declaration order
    pub fn user_ids(&self) -> &[VerifiedUserId] {
        &self.user_ids
    }

    /// Attested subkeys in ring order
    pub fn subkeys(&self) -> &[VerifiedSubkey] {
        &self.subkeys
    }

    /// Everything set aside during validation
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The diagnostic trail as text, one entry per line
    pub fn error_report(&self) -> String {
        self.diagnostics
            .iter()
            .map(|d| format!("{}\n", d))
            .collect()
    }

    /// The key that may verify data signatures issued under `key_id`.
    ///
    /// A key whose attesting signature asserts the sign-data flag is
    /// preferred; failing that, a key whose algorithm can sign. Subkeys are
    /// consulted before the primary in the fallback. The status is not
    /// consulted: on a revoked or unusable ring, which keeps no User IDs or
    /// subkeys, only the primary fallback can match.
    pub fn signing_keys_for(&self, key_id: KeyId) -> Option<&PublicKeyPacket> {
        let primary_matches = self.primary.key_id() == key_id;

        if primary_matches
            && self
                .user_ids
                .iter()
                .any(|uid| uid.signature.has_key_flag(KeyFlags::SIGN))
        {
            return Some(&self.primary);
        }

        let mut matching = self
            .subkeys
            .iter()
            .filter(|subkey| subkey.key.key_id() == key_id);
        if let Some(subkey) = matching
            .clone()
            .find(|subkey| subkey.signature.has_key_flag(KeyFlags::SIGN))
        {
            return Some(&subkey.key);
        }
        if let Some(subkey) = matching.find(|subkey| subkey.key.algorithm.can_sign()) {
            return Some(&subkey.key);
        }

        if primary_matches && self.primary.algorithm.can_sign() {
            return Some(&self.primary);
        }
        None
    }
}

/// Validates key rings against a crypto engine
pub struct KeyValidator<'e, E: ?Sized> {
    engine: &'e E,
    config: OracleConfig,
    now: Option<i64>,
}

impl<'e, E: CryptoEngine + ?Sized> KeyValidator<'e, E> {
    /// Validator with default settings, evaluating at the wall clock
    pub fn new(engine: &'e E) -> Self {
        Self {
            engine,
            config: OracleConfig::default(),
            now: None,
        }
    }

    /// Use the given settings
    pub fn with_config(mut self, config: OracleConfig) -> Self {
        self.config = config;
        self
    }

    /// Evaluate signature freshness at a fixed Unix time
    pub fn at_time(mut self, now: i64) -> Self {
        self.now = Some(now);
        self
    }

    /// Validate `ring`.
    ///
    /// Fails only when the ring is structurally unusable: empty, not headed
    /// by a primary key, or holding a second primary key. Every other
    /// problem is a diagnostic on the result.
    pub fn validate(&self, ring: &PublicKeyRing) -> Result<VerifiedKeyRing> {
        let keys = ring.keys();
        let first = keys
            .first()
            .ok_or_else(|| OracleError::structural("Key ring is empty"))?;
        if !first.is_primary {
            return Err(OracleError::structural("First key is not a primary key"));
        }
        if let Some(extra) = keys[1..].iter().find(|key| key.is_primary) {
            warn!("Key ring holds a second primary key {}", extra.key_id());
            return Err(OracleError::structural(format!(
                "Unexpected primary key {} after the first",
                extra.key_id()
            )));
        }

        let primary = first.public_key();
        let mut pass = Pass {
            engine: self.engine,
            now: self.now.unwrap_or_else(wall_clock),
            tolerance: self.config.tolerance(),
            primary,
            log: DiagnosticLog::default(),
        };

        let subject = Subject::PrimaryKey(primary.key_id());
        let revoked = first
            .signatures
            .iter()
            .filter(|sig| sig.signature_type == SignatureType::KeyRevocation)
            .any(|sig| pass.is_good(sig, primary, &CertificationTarget::Key(primary), &subject));
        if revoked {
            pass.log
                .record(DiagnosticKind::PrimaryRevoked, &subject, None, None);
            return Ok(pass.finish(KeyStatus::Revoked, Vec::new(), Vec::new()));
        }

        let user_ids: Vec<VerifiedUserId> = ring
            .user_ids()
            .iter()
            .filter_map(|binding| pass.check_user_id(&binding.user_id, &binding.signatures))
            .collect();
        if user_ids.is_empty() {
            return Ok(pass.finish(KeyStatus::Unusable, user_ids, Vec::new()));
        }

        let subkeys: Vec<VerifiedSubkey> = keys[1..]
            .iter()
            .filter_map(|key| pass.check_subkey(key.public_key(), &key.signatures))
            .collect();

        Ok(pass.finish(KeyStatus::Ok, user_ids, subkeys))
    }
}

/// Validate `ring` at the current time with default settings
pub fn validate<E: CryptoEngine + ?Sized>(
    ring: &PublicKeyRing,
    engine: &E,
) -> Result<VerifiedKeyRing> {
    KeyValidator::new(engine).validate(ring)
}

fn wall_clock() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// State of one validation run
struct Pass<'a, E: ?Sized> {
    engine: &'a E,
    now: i64,
    tolerance: i64,
    primary: &'a PublicKeyPacket,
    log: DiagnosticLog,
}

impl<E: CryptoEngine + ?Sized> Pass<'_, E> {
    /// Cryptographically valid and current
    fn is_good(
        &mut self,
        signature: &SignaturePacket,
        signer: &PublicKeyPacket,
        target: &CertificationTarget<'_>,
        subject: &Subject,
    ) -> bool {
        match self.engine.verify_certification(signature, signer, target) {
            Ok(true) => {}
            Ok(false) => {
                self.log
                    .record(DiagnosticKind::BadSignature, subject, Some(signature), None);
                return false;
            }
            Err(e) => {
                self.log.record(
                    DiagnosticKind::VerificationFailed,
                    subject,
                    Some(signature),
                    Some(e.to_string()),
                );
                return false;
            }
        }

        match check_current(signature, self.now, self.tolerance) {
            Ok(()) => true,
            Err(stale) => {
                self.log
                    .record(stale.kind, subject, Some(signature), Some(stale.detail));
                false
            }
        }
    }

    fn check_user_id(
        &mut self,
        user_id: &UserIdPacket,
        signatures: &[SignaturePacket],
    ) -> Option<VerifiedUserId> {
        let subject = Subject::UserId(user_id.user_id());
        if signatures.is_empty() {
            self.log
                .record(DiagnosticKind::NoSignatures, &subject, None, None);
            return None;
        }

        let primary = self.primary;
        let target = CertificationTarget::UserId {
            primary,
            user_id: &user_id.raw,
        };
        let mut best = None;
        for signature in signatures
            .iter()
            .filter(|sig| sig.signature_type.is_user_id_signature())
        {
            if self.is_good(signature, primary, &target, &subject) {
                keep_latest(&mut best, signature);
            }
        }

        let (_, winner) = match best {
            Some(best) => best,
            None => {
                self.log
                    .record(DiagnosticKind::NoValidSignature, &subject, None, None);
                return None;
            }
        };
        if winner.signature_type == SignatureType::CertificationRevocation {
            self.log
                .record(DiagnosticKind::UserIdRevoked, &subject, Some(winner), None);
            return None;
        }

        Some(VerifiedUserId {
            user_id: user_id.clone(),
            signature: winner.clone(),
        })
    }

    fn check_subkey(
        &mut self,
        subkey: &PublicKeyPacket,
        signatures: &[SignaturePacket],
    ) -> Option<VerifiedSubkey> {
        let subject = Subject::Subkey(subkey.key_id());
        if signatures.is_empty() {
            self.log
                .record(DiagnosticKind::NoSignatures, &subject, None, None);
            return None;
        }

        let primary = self.primary;
        let target = CertificationTarget::Subkey { primary, subkey };
        let mut best = None;
        for signature in signatures {
            if !signature.signature_type.is_subkey_signature() {
                self.log.record(
                    DiagnosticKind::IgnoredSignature,
                    &subject,
                    Some(signature),
                    None,
                );
                continue;
            }
            if !self.is_good(signature, primary, &target, &subject) {
                continue;
            }
            if signature.signature_type == SignatureType::SubkeyRevocation {
                self.log.record(
                    DiagnosticKind::SubkeyRevoked,
                    &subject,
                    Some(signature),
                    None,
                );
                return None;
            }
            if signature.has_key_flag(KeyFlags::SIGN)
                && !self.has_good_back_signature(signature, subkey, &subject)
            {
                continue;
            }
            keep_latest(&mut best, signature);
        }

        match best {
            Some((_, winner)) => Some(VerifiedSubkey {
                key: subkey.clone(),
                signature: winner.clone(),
            }),
            None => {
                self.log
                    .record(DiagnosticKind::NoValidSignature, &subject, None, None);
                None
            }
        }
    }

    /// A signing subkey must certify the primary in turn, through a
    /// primary-key-binding signature embedded in its binding.
    fn has_good_back_signature(
        &mut self,
        binding: &SignaturePacket,
        subkey: &PublicKeyPacket,
        subject: &Subject,
    ) -> bool {
        let body = match binding.embedded_signature() {
            Some(body) => body,
            None => {
                self.log.record(
                    DiagnosticKind::MissingBackSignature,
                    subject,
                    Some(binding),
                    None,
                );
                return false;
            }
        };

        let back = match SignaturePacket::from_bytes(body) {
            Ok(back) => back,
            Err(e) => {
                self.log.record(
                    DiagnosticKind::BadBackSignature,
                    subject,
                    Some(binding),
                    Some(e.to_string()),
                );
                return false;
            }
        };
        if back.signature_type != SignatureType::PrimaryKeyBinding {
            self.log.record(
                DiagnosticKind::BadBackSignature,
                subject,
                Some(binding),
                Some(format!("embedded {} signature", back.signature_type)),
            );
            return false;
        }

        let primary = self.primary;
        self.is_good(
            &back,
            subkey,
            &CertificationTarget::Subkey { primary, subkey },
            subject,
        )
    }

    fn finish(
        self,
        status: KeyStatus,
        user_ids: Vec<VerifiedUserId>,
        subkeys: Vec<VerifiedSubkey>,
    ) -> VerifiedKeyRing {
        info!(
            "Key {} validated as {} with {} user IDs and {} subkeys",
            self.primary.fingerprint(),
            status,
            user_ids.len(),
            subkeys.len()
        );
        VerifiedKeyRing {
            status,
            primary: self.primary.clone(),
            user_ids,
            subkeys,
            diagnostics: self.log.into_entries(),
        }
    }
}

/// Replace the current best only with a strictly later signature
fn keep_latest<'s>(best: &mut Option<(u32, &'s SignaturePacket)>, signature: &'s SignaturePacket) {
    let created = signature.signed_creation_time().unwrap_or(0);
    if best.map_or(true, |(current, _)| created > current) {
        *best = Some((created, signature));
    }
}
