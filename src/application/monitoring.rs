//! Monitoring service: anomaly verdicts straight from encrypted records.

use crate::domain::{
    assess, Assessment, CryptoError, EncryptedRecord, EncryptedScalar, PrivateKey, PublicKey,
    VitalThresholds,
};

const HEART_RATE_FIELD: &str = "heart_rate";

/// Field names an SpO2 reading may be stored under.
pub const SPO2_FIELDS: [&str; 3] = ["spo2", "oxygen_saturation", "SpO2"];

#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("Record has no usable {0} reading")]
    MissingVital(&'static str),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Classifies records against a fixed threshold pair.
#[derive(Debug, Clone, Default)]
pub struct MonitoringService {
    thresholds: VitalThresholds,
}

impl MonitoringService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assess the heart rate and SpO2 fields of `record`.
    ///
    /// Thresholds are multiplied by each field's stored scale, so a heart
    /// rate of `1000` at scale 10 sits exactly on the bound. Sequence fields
    /// contribute their first element.
    ///
    /// # Errors
    /// - `MonitoringError::MissingVital` if a vital is absent or malformed
    /// - `MonitoringError::Crypto` on key mismatch or an invalid ciphertext
    pub fn classify_record(
        &self,
        record: &EncryptedRecord,
        public: &PublicKey,
        private: &PrivateKey,
    ) -> Result<Assessment, MonitoringError> {
        let heart_rate = vital(record, &[HEART_RATE_FIELD]).ok_or(MonitoringError::MissingVital(HEART_RATE_FIELD))?;
        let spo2 = vital(record, &SPO2_FIELDS).ok_or(MonitoringError::MissingVital("spo2"))?;

        let thresholds = self.thresholds.scaled(heart_rate.scale(), spo2.scale())?;

        let assessment = assess(
            &heart_rate.to_encrypted_number(public)?,
            &spo2.to_encrypted_number(public)?,
            &thresholds,
            public,
            private,
        )?;

        tracing::info!(
            verdict = %assessment.verdict,
            heart_rate_high = assessment.heart_rate_high,
            spo2_low = assessment.spo2_low,
            "Record classified"
        );
        Ok(assessment)
    }
}

fn vital<'a>(record: &'a EncryptedRecord, names: &[&str]) -> Option<&'a EncryptedScalar> {
    names
        .iter()
        .find_map(|name| record.field(name))
        .and_then(|field| field.first_scalar())
}
