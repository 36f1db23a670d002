//! Anomaly verdicts over encrypted vitals.
//!
//! Only the two threshold differences are ever decrypted; the encrypted
//! measurements themselves never are.

use serde::{Deserialize, Serialize};

use super::paillier::{CryptoError, EncryptedNumber, PrivateKey, PublicKey};
use super::threshold::threshold_diff;

/// Heart rate above this (bpm) is anomalous.
pub const HEART_RATE_THRESHOLD: i64 = 100;

/// Oxygen saturation below this (%) is anomalous.
pub const SPO2_THRESHOLD: i64 = 90;

/// Outcome of the anomaly check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Both vitals inside their bounds
    Normal,
    /// At least one vital outside its bound
    Anomaly,
}

impl Verdict {
    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Normal => "Vitals within thresholds",
            Self::Anomaly => "Vital sign outside threshold - review advised",
        }
    }

    #[must_use]
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Self::Anomaly)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Anomaly => write!(f, "ANOMALY"),
        }
    }
}

/// Threshold pair the classifier compares against.
///
/// Values are in the same integer units as the ciphertexts, so scaled
/// fields need `scaled()` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VitalThresholds {
    /// Upper bound for heart rate
    pub heart_rate_max: i64,
    /// Lower bound for oxygen saturation
    pub spo2_min: i64,
}

impl Default for VitalThresholds {
    fn default() -> Self {
        Self {
            heart_rate_max: HEART_RATE_THRESHOLD,
            spo2_min: SPO2_THRESHOLD,
        }
    }
}

impl VitalThresholds {
    /// Multiply each bound by the scale its ciphertext was stored with.
    ///
    /// # Errors
    /// Returns `CryptoError::PlaintextOutOfRange` on overflow.
    pub fn scaled(&self, heart_rate_scale: u64, spo2_scale: u64) -> Result<Self, CryptoError> {
        Ok(Self {
            heart_rate_max: scale_bound(self.heart_rate_max, heart_rate_scale)?,
            spo2_min: scale_bound(self.spo2_min, spo2_scale)?,
        })
    }
}

fn scale_bound(bound: i64, scale: u64) -> Result<i64, CryptoError> {
    i64::try_from(scale)
        .ok()
        .and_then(|s| bound.checked_mul(s))
        .ok_or_else(|| CryptoError::PlaintextOutOfRange(format!("{bound} * {scale}")))
}

/// Verdict plus which signal triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub verdict: Verdict,
    pub heart_rate_high: bool,
    pub spo2_low: bool,
}

impl Assessment {
    /// Apply the decision rule to decrypted differences.
    ///
    /// A difference of zero (exactly at threshold) is normal.
    #[must_use]
    pub fn from_differences(heart_rate_diff: i64, spo2_diff: i64) -> Self {
        let heart_rate_high = heart_rate_diff > 0;
        let spo2_low = spo2_diff < 0;
        let verdict = if heart_rate_high || spo2_low {
            Verdict::Anomaly
        } else {
            Verdict::Normal
        };

        Self {
            verdict,
            heart_rate_high,
            spo2_low,
        }
    }
}

/// Assess encrypted heart rate and SpO2 against `thresholds`.
///
/// # Errors
/// - `CryptoError::KeyMismatch` if the keys are not a pair or a vital was
///   encrypted under another key
/// - `CryptoError::PlaintextOutOfRange` / `Overflow` if a difference cannot
///   be represented
pub fn assess(
    heart_rate: &EncryptedNumber,
    spo2: &EncryptedNumber,
    thresholds: &VitalThresholds,
    public: &PublicKey,
    private: &PrivateKey,
) -> Result<Assessment, CryptoError> {
    private.ensure_matches(public)?;

    let heart_rate_diff = threshold_diff(heart_rate, thresholds.heart_rate_max, public)?;
    let spo2_diff = threshold_diff(spo2, thresholds.spo2_min, public)?;

    let assessment = Assessment::from_differences(
        private.decrypt(&heart_rate_diff)?,
        private.decrypt(&spo2_diff)?,
    );

    tracing::debug!(
        verdict = %assessment.verdict,
        heart_rate_high = assessment.heart_rate_high,
        spo2_low = assessment.spo2_low,
        "Encrypted vitals assessed"
    );

    Ok(assessment)
}

/// Classify encrypted heart rate and SpO2 with the fixed policy
/// (HR > 100 or SpO2 < 90 is an anomaly).
///
/// # Errors
/// See [`assess`].
pub fn classify(
    heart_rate: &EncryptedNumber,
    spo2: &EncryptedNumber,
    public: &PublicKey,
    private: &PrivateKey,
) -> Result<Verdict, CryptoError> {
    assess(heart_rate, spo2, &VitalThresholds::default(), public, private).map(|a| a.verdict)
}
