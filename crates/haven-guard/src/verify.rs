//! Secondary verification: PIN codes, backup codes, and the pluggable
//! biometric and one-time-password capabilities.
//!
//! Biometric matching and TOTP math live outside this crate; the traits
//! here are the seams a real matcher or OTP provider plugs into. The
//! digest-comparison [`HashTemplateVerifier`] stands in for a matcher
//! in deployments without one.

use chrono::{DateTime, Utc};
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

// ── PIN codes ─────────────────────────────────────────────────────

/// A hashed 6-digit PIN. The raw PIN is never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinCode {
    digest: String,
}

impl PinCode {
    /// Hash and store a PIN. Anything other than exactly six ASCII
    /// digits is a validation error.
    pub fn new(pin: &str) -> Result<Self> {
        if pin.len() != 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(GuardError::Validation("PIN must be 6 digits".to_string()));
        }
        Ok(Self {
            digest: blake3::hash(pin.as_bytes()).to_hex().to_string(),
        })
    }

    /// Check a candidate PIN against the stored digest.
    pub fn verify(&self, pin: &str) -> bool {
        blake3::hash(pin.as_bytes()).to_hex().to_string() == self.digest
    }
}

// ── Backup codes ──────────────────────────────────────────────────

/// Single-use recovery codes for two-factor fallback.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackupCodes {
    codes: Vec<String>,
}

impl BackupCodes {
    /// Generate ten fresh 8-digit codes, replacing any existing set.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let codes = (0..10)
            .map(|_| format!("{:08}", rng.gen_range(0..100_000_000u32)))
            .collect();
        Self { codes }
    }

    /// Redeem a code, consuming it. A code can only ever be used once.
    pub fn redeem(&mut self, code: &str) -> bool {
        match self.codes.iter().position(|c| c == code) {
            Some(idx) => {
                self.codes.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.codes.len()
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }
}

// ── Pluggable capabilities ────────────────────────────────────────

/// Biometric template matching capability.
pub trait TemplateVerifier: Send + Sync {
    /// Whether a captured template matches the enrolled digest.
    fn verify(&self, template: &str, enrolled_digest: &str) -> bool;
}

/// Digest of a template at enrollment time, for use with
/// [`HashTemplateVerifier`].
pub fn template_digest(template: &str) -> String {
    blake3::hash(template.as_bytes()).to_hex().to_string()
}

/// Stand-in matcher: exact digest comparison. A production deployment
/// substitutes a real matcher behind the same trait.
pub struct HashTemplateVerifier;

impl TemplateVerifier for HashTemplateVerifier {
    fn verify(&self, template: &str, enrolled_digest: &str) -> bool {
        template_digest(template) == enrolled_digest
    }
}

/// One-time-password verification capability. The code math (TOTP or
/// otherwise) is the provider's concern.
pub trait OtpVerifier: Send + Sync {
    fn verify(&self, secret: &str, code: &str, now: DateTime<Utc>) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn pin_requires_six_digits() {
        assert!(matches!(
            PinCode::new("12345").unwrap_err(),
            GuardError::Validation(_)
        ));
        assert!(matches!(
            PinCode::new("1234567").unwrap_err(),
            GuardError::Validation(_)
        ));
        assert!(matches!(
            PinCode::new("12a456").unwrap_err(),
            GuardError::Validation(_)
        ));
        assert!(PinCode::new("123456").is_ok());
    }

    #[test]
    fn pin_verify_matches_only_the_original() {
        let pin = PinCode::new("482913").unwrap();
        assert!(pin.verify("482913"));
        assert!(!pin.verify("482914"));
        assert!(!pin.verify(""));
    }

    #[test]
    fn backup_codes_are_single_use() {
        let mut codes = BackupCodes::generate(&mut OsRng);
        assert_eq!(codes.remaining(), 10);
        assert!(codes.codes().iter().all(|c| c.len() == 8));

        let code = codes.codes()[0].clone();
        assert!(codes.redeem(&code));
        assert_eq!(codes.remaining(), 9);
        assert!(!codes.redeem(&code));
    }

    #[test]
    fn hash_template_verifier_compares_digests() {
        let enrolled = template_digest("template-bytes-v1");
        let verifier = HashTemplateVerifier;
        assert!(verifier.verify("template-bytes-v1", &enrolled));
        assert!(!verifier.verify("different-template", &enrolled));
    }

    #[test]
    fn otp_capability_is_pluggable() {
        struct FixedCode;
        impl OtpVerifier for FixedCode {
            fn verify(&self, _secret: &str, code: &str, _now: DateTime<Utc>) -> bool {
                code == "000111"
            }
        }

        let otp: &dyn OtpVerifier = &FixedCode;
        assert!(otp.verify("secret", "000111", Utc::now()));
        assert!(!otp.verify("secret", "999999", Utc::now()));
    }
}
