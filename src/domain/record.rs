//! Encrypted record wire format and field decoder.
//!
//! A record blob is a JSON object:
//!
//! ```json
//! {
//!   "meta": {"patient_id": "P001", "timestamp": "2024-01-03 10:00:00", "device_id": "D7"},
//!   "encrypted": {
//!     "heart_rate": {"ct": "81726354...", "scale": 1},
//!     "temperature": {"ct": "11223344...", "scale": 10},
//!     "readings": [{"ct": "..."}, {"ct": "..."}]
//!   }
//! }
//! ```
//!
//! Parsing is permissive toward evolving schemas: shapes that are not a
//! recognised encrypted entry become `EncryptedField::Malformed` (or a `None`
//! slot inside a sequence) and decode to null instead of failing the record.

use std::collections::BTreeMap;
use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use super::paillier::{CryptoError, EncryptedNumber, PrivateKey, PublicKey};

/// Tag marking an object as an encrypted scalar.
pub const CIPHERTEXT_TAG: &str = "ct";
const SCALE_TAG: &str = "scale";

const META_KEY: &str = "meta";
const ENCRYPTED_KEY: &str = "encrypted";

/// Error type for record blobs that cannot be read at all.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record must be a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// One encrypted value with its fixed-point scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedScalar {
    ciphertext: BigUint,
    scale: u64,
}

impl EncryptedScalar {
    /// Create a scalar entry. `scale` must be at least 1.
    #[must_use]
    pub fn new(ciphertext: BigUint, scale: u64) -> Option<Self> {
        (scale >= 1).then_some(Self { ciphertext, scale })
    }

    /// Wrap an encrypted number for storage.
    #[must_use]
    pub fn from_number(number: &EncryptedNumber, scale: u64) -> Option<Self> {
        Self::new(number.ciphertext().clone(), scale)
    }

    #[must_use]
    pub fn ciphertext(&self) -> &BigUint {
        &self.ciphertext
    }

    #[must_use]
    pub fn scale(&self) -> u64 {
        self.scale
    }

    /// Rebuild the ciphertext under `public`.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidCiphertext` if the stored value is not a
    /// valid ciphertext for this key.
    pub fn to_encrypted_number(&self, public: &PublicKey) -> Result<EncryptedNumber, CryptoError> {
        EncryptedNumber::from_ciphertext(public, self.ciphertext.clone())
    }

    /// Wire form: `{"ct": "<decimal>", "scale": <int>}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({ CIPHERTEXT_TAG: self.ciphertext.to_string(), SCALE_TAG: self.scale })
    }

    fn parse(value: &Value) -> Option<Self> {
        let entry = value.as_object()?;

        let ciphertext = match entry.get(CIPHERTEXT_TAG)? {
            Value::String(digits) => digits.trim().parse::<BigUint>().ok()?,
            Value::Number(number) => BigUint::from(number.as_u64()?),
            _ => return None,
        };

        let scale = match entry.get(SCALE_TAG) {
            None | Some(Value::Null) => 1,
            Some(Value::Number(number)) => whole_number(number)?,
            Some(Value::String(digits)) => digits.trim().parse::<u64>().ok()?,
            Some(_) => return None,
        };

        Self::new(ciphertext, scale)
    }

    fn decode(&self, public: &PublicKey, private: &PrivateKey) -> Result<DecodedValue, CryptoError> {
        let raw = private.decrypt(&self.to_encrypted_number(public)?)?;
        if self.scale == 1 {
            Ok(DecodedValue::Integer(raw))
        } else {
            Ok(DecodedValue::Scaled(raw as f64 / self.scale as f64))
        }
    }
}

/// Integer value of `number`, accepting whole floats such as `10.0`.
fn whole_number(number: &serde_json::Number) -> Option<u64> {
    number.as_u64().or_else(|| {
        let float = number.as_f64()?;
        (float >= 0.0 && float.fract() == 0.0 && float < u64::MAX as f64).then_some(float as u64)
    })
}

/// A parsed entry of the record's `encrypted` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptedField {
    Scalar(EncryptedScalar),
    /// Ordered entries; `None` marks an element that was not a valid scalar.
    Sequence(Vec<Option<EncryptedScalar>>),
    Malformed,
}

impl EncryptedField {
    /// Classify a raw JSON entry into one of the recognised shapes.
    #[must_use]
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::Object(entry) if entry.contains_key(CIPHERTEXT_TAG) => {
                EncryptedScalar::parse(value).map_or(Self::Malformed, Self::Scalar)
            }
            Value::Array(items) => Self::Sequence(items.iter().map(EncryptedScalar::parse).collect()),
            _ => Self::Malformed,
        }
    }

    /// The scalar itself, or the first element of a sequence.
    #[must_use]
    pub fn first_scalar(&self) -> Option<&EncryptedScalar> {
        match self {
            Self::Scalar(scalar) => Some(scalar),
            Self::Sequence(items) => items.first().and_then(Option::as_ref),
            Self::Malformed => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Scalar(scalar) => scalar.to_json(),
            Self::Sequence(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.as_ref().map_or(Value::Null, EncryptedScalar::to_json))
                    .collect(),
            ),
            Self::Malformed => Value::Null,
        }
    }
}

impl From<EncryptedScalar> for EncryptedField {
    fn from(scalar: EncryptedScalar) -> Self {
        Self::Scalar(scalar)
    }
}

/// Record metadata. Unknown keys are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RecordMeta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patient_id.is_none()
            && self.timestamp.is_none()
            && self.device_id.is_none()
            && self.extra.is_empty()
    }
}

/// Accept ids exported as numbers as well as strings.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// An encrypted record blob after the parse step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncryptedRecord {
    pub meta: RecordMeta,
    pub encrypted: BTreeMap<String, EncryptedField>,
}

impl EncryptedRecord {
    /// Parse a record blob.
    ///
    /// # Errors
    /// Returns `RecordError` if the bytes are not a JSON object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RecordError> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Parse an already-decoded JSON document.
    ///
    /// Without an `encrypted` object, the remaining top-level keys are taken
    /// as the encrypted section.
    ///
    /// # Errors
    /// Returns `RecordError::NotAnObject` if `value` is not an object.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        let mut top = match value {
            Value::Object(top) => top,
            other => return Err(RecordError::NotAnObject(json_kind(&other))),
        };

        let meta = match top.remove(META_KEY) {
            Some(meta @ Value::Object(_)) => serde_json::from_value(meta).unwrap_or_else(|e| {
                tracing::debug!("Ignoring unreadable record meta: {e}");
                RecordMeta::default()
            }),
            _ => RecordMeta::default(),
        };

        let section = match top.remove(ENCRYPTED_KEY) {
            Some(Value::Object(section)) => section,
            Some(other) => {
                tracing::debug!(
                    "Encrypted section is a {}, not an object; no fields decoded",
                    json_kind(&other)
                );
                Map::new()
            }
            None => top,
        };

        let encrypted = section
            .iter()
            .map(|(name, raw)| (name.clone(), EncryptedField::parse(raw)))
            .collect();

        Ok(Self { meta, encrypted })
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&EncryptedField> {
        self.encrypted.get(name)
    }

    /// Builder-style field insertion.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, field: impl Into<EncryptedField>) -> Self {
        self.encrypted.insert(name.into(), field.into());
        self
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        let encrypted: Map<String, Value> = self
            .encrypted
            .iter()
            .map(|(name, field)| (name.clone(), field.to_json()))
            .collect();

        json!({
            META_KEY: serde_json::to_value(&self.meta).unwrap_or_default(),
            ENCRYPTED_KEY: encrypted,
        })
    }

    /// Serialize to the bytes that get content-addressed.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.to_json())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A decrypted value: an integer when unscaled, a float otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Integer(i64),
    Scaled(f64),
}

impl DecodedValue {
    /// Whole part, truncating toward zero.
    #[must_use]
    pub fn truncate(&self) -> i64 {
        match *self {
            Self::Integer(v) => v,
            Self::Scaled(v) => v.trunc() as i64,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Scaled(v) => write!(f, "{v}"),
        }
    }
}

/// Decoded form of an `EncryptedField`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Decoded {
    Value(DecodedValue),
    Sequence(Vec<Option<DecodedValue>>),
}

impl Decoded {
    /// Scalar as-is; first element of a sequence, `None` if it is empty.
    #[must_use]
    pub fn into_representative(self) -> Option<DecodedValue> {
        match self {
            Self::Value(value) => Some(value),
            Self::Sequence(items) => items.into_iter().next().flatten(),
        }
    }
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            Self::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match item {
                        Some(value) => write!(f, "{value}")?,
                        None => write!(f, "null")?,
                    }
                }
                write!(f, "]")
            }
        }
    }
}

/// Decode one field.
///
/// Rules, in order: absent → `None`; scalar → decrypt and rescale; sequence →
/// per-element, with undecodable elements as `None` in place; malformed →
/// `None`. Per-field cryptographic failures degrade to `None`.
///
/// # Errors
/// Returns `CryptoError::KeyMismatch` if `private` does not belong to `public`.
pub fn decode_field(
    entry: Option<&EncryptedField>,
    public: &PublicKey,
    private: &PrivateKey,
) -> Result<Option<Decoded>, CryptoError> {
    let Some(field) = entry else {
        return Ok(None);
    };
    private.ensure_matches(public)?;
    Ok(decode_with_checked_keys(field, public, private, &mut Tally::default()))
}

/// Counts of scalar decode attempts within one record.
#[derive(Debug, Default)]
struct Tally {
    attempted: usize,
    failed: usize,
}

fn decode_with_checked_keys(
    field: &EncryptedField,
    public: &PublicKey,
    private: &PrivateKey,
    tally: &mut Tally,
) -> Option<Decoded> {
    match field {
        EncryptedField::Scalar(scalar) => {
            decode_scalar(scalar, public, private, tally).map(Decoded::Value)
        }
        EncryptedField::Sequence(items) => Some(Decoded::Sequence(
            items
                .iter()
                .map(|item| item.as_ref().and_then(|s| decode_scalar(s, public, private, tally)))
                .collect(),
        )),
        EncryptedField::Malformed => None,
    }
}

fn decode_scalar(
    scalar: &EncryptedScalar,
    public: &PublicKey,
    private: &PrivateKey,
    tally: &mut Tally,
) -> Option<DecodedValue> {
    tally.attempted += 1;
    match scalar.decode(public, private) {
        Ok(value) => Some(value),
        Err(e) => {
            tally.failed += 1;
            tracing::debug!("Encrypted scalar did not decode, treating as absent: {e}");
            None
        }
    }
}

/// Plaintext vitals recovered from a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecodedRecord {
    pub meta: RecordMeta,
    pub heart_rate: Option<DecodedValue>,
    pub temperature: Option<DecodedValue>,
    pub systolic: Option<DecodedValue>,
    pub diastolic: Option<DecodedValue>,
    /// Every other encrypted field, decoded generically.
    pub extra: BTreeMap<String, Option<Decoded>>,
    /// Encrypted values that decrypted.
    #[serde(skip)]
    pub decrypted: usize,
    /// Well-formed encrypted values that failed to decrypt.
    #[serde(skip)]
    pub undecodable: usize,
}

impl DecodedRecord {
    /// Systolic/diastolic in whole mmHg, when both are present.
    #[must_use]
    pub fn blood_pressure(&self) -> Option<(i64, i64)> {
        Some((self.systolic?.truncate(), self.diastolic?.truncate()))
    }

    /// Whether values were present but none of them decrypted, which is what
    /// a record sealed under another key pair looks like.
    #[must_use]
    pub fn nothing_decrypted(&self) -> bool {
        self.decrypted == 0 && self.undecodable > 0
    }

    /// Human-readable report for `record_id`.
    #[must_use]
    pub fn report<'a>(&'a self, record_id: &'a str) -> RecordReport<'a> {
        RecordReport {
            record_id,
            record: self,
        }
    }
}

/// Decode every field of `record`.
///
/// # Errors
/// Returns `CryptoError::KeyMismatch` if `private` does not belong to `public`.
pub fn decode_record(
    record: &EncryptedRecord,
    public: &PublicKey,
    private: &PrivateKey,
) -> Result<DecodedRecord, CryptoError> {
    private.ensure_matches(public)?;

    let mut decoded = DecodedRecord {
        meta: record.meta.clone(),
        ..DecodedRecord::default()
    };

    let mut tally = Tally::default();
    for (name, field) in &record.encrypted {
        let value = decode_with_checked_keys(field, public, private, &mut tally);

        match name.as_str() {
            "heart_rate" => decoded.heart_rate = value.and_then(Decoded::into_representative),
            "temperature" => decoded.temperature = value.and_then(Decoded::into_representative),
            "systolic" => decoded.systolic = value.and_then(Decoded::into_representative),
            "diastolic" => decoded.diastolic = value.and_then(Decoded::into_representative),
            _ => {
                decoded.extra.insert(name.clone(), value);
            }
        }
    }

    decoded.decrypted = tally.attempted - tally.failed;
    decoded.undecodable = tally.failed;
    if decoded.nothing_decrypted() {
        tracing::warn!(
            values = tally.failed,
            fingerprint = public.fingerprint(),
            "No encrypted value in the record decrypted under this key pair"
        );
    }

    Ok(decoded)
}

/// `Display` adapter produced by [`DecodedRecord::report`].
pub struct RecordReport<'a> {
    record_id: &'a str,
    record: &'a DecodedRecord,
}

impl fmt::Display for RecordReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.record;
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| "<unknown>".to_string());

        writeln!(f, "===== Decrypted Patient Data =====")?;
        writeln!(f, "Record ID     : {}", self.record_id)?;
        if !record.meta.is_empty() {
            writeln!(f, "Patient ID    : {}", or_unknown(&record.meta.patient_id))?;
            writeln!(f, "Timestamp     : {}", or_unknown(&record.meta.timestamp))?;
            writeln!(f, "Device ID     : {}", or_unknown(&record.meta.device_id))?;
        }

        match record.heart_rate {
            Some(hr) => writeln!(f, "Heart Rate    : {hr} bpm")?,
            None => writeln!(f, "Heart Rate    : <not present>")?,
        }
        match record.temperature {
            Some(t) => writeln!(f, "Temperature   : {t} °C")?,
            None => writeln!(f, "Temperature   : <not present>")?,
        }
        match record.blood_pressure() {
            Some((sys, dia)) => writeln!(f, "Blood Pressure: {sys}/{dia} mmHg")?,
            None => writeln!(f, "Blood Pressure: <not present>")?,
        }

        if !record.extra.is_empty() {
            let names: Vec<&str> = record.extra.keys().map(String::as_str).collect();
            writeln!(f)?;
            writeln!(f, "Other encrypted fields present: {}", names.join(", "))?;
            for (name, value) in &record.extra {
                match value {
                    Some(v) => writeln!(f, "{name} => {v}")?,
                    None => writeln!(f, "{name} => null")?,
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::paillier::test_keys::{primary, secondary};

    fn scalar(public: &PublicKey, value: i64, scale: u64) -> EncryptedScalar {
        let enc = public.encrypt(value).expect("Should encrypt");
        EncryptedScalar::from_number(&enc, scale).expect("Valid scale")
    }

    #[test]
    fn test_scaled_value_roundtrip() {
        let private = primary();
        let public = private.public_key();
        let field = EncryptedField::Scalar(scalar(public, 725, 10));

        let decoded = decode_field(Some(&field), public, &private).expect("Keys match");
        assert_eq!(decoded, Some(Decoded::Value(DecodedValue::Scaled(72.5))));
    }

    #[test]
    fn test_unscaled_value_stays_integer() {
        let private = primary();
        let public = private.public_key();
        let field = EncryptedField::Scalar(scalar(public, 72, 1));

        let decoded = decode_field(Some(&field), public, &private).expect("Keys match");
        assert_eq!(decoded, Some(Decoded::Value(DecodedValue::Integer(72))));
    }

    #[test]
    fn test_sequence_with_malformed_element() {
        let private = primary();
        let public = private.public_key();
        let good = scalar(public, 98, 1);
        let raw = json!([good.to_json(), {"cipher": "12"}]);

        let field = EncryptedField::parse(&raw);
        let decoded = decode_field(Some(&field), public, &private).expect("Keys match");
        assert_eq!(
            decoded,
            Some(Decoded::Sequence(vec![Some(DecodedValue::Integer(98)), None]))
        );
    }

    #[test]
    fn test_missing_field_is_none() {
        let private = primary();
        assert_eq!(
            decode_field(None, private.public_key(), &private).expect("No work to do"),
            None
        );
        // Absent entries short-circuit before the key check.
        assert_eq!(
            decode_field(None, secondary().public_key(), &private).expect("No work to do"),
            None
        );
    }

    #[test]
    fn test_parse_shapes() {
        assert!(matches!(
            EncryptedField::parse(&json!({"ct": "12345"})),
            EncryptedField::Scalar(s) if s.scale() == 1
        ));
        assert!(matches!(
            EncryptedField::parse(&json!({"ct": "12345", "scale": "100"})),
            EncryptedField::Scalar(s) if s.scale() == 100
        ));
        assert_eq!(EncryptedField::parse(&json!({"ct": "12x45"})), EncryptedField::Malformed);
        assert_eq!(EncryptedField::parse(&json!({"ct": "1", "scale": 0})), EncryptedField::Malformed);
        assert_eq!(EncryptedField::parse(&json!({"ct": "1", "scale": -3})), EncryptedField::Malformed);
        assert_eq!(EncryptedField::parse(&json!("plaintext")), EncryptedField::Malformed);
        assert_eq!(EncryptedField::parse(&json!(72)), EncryptedField::Malformed);
        assert!(matches!(
            EncryptedField::parse(&json!({"ct": "12345", "scale": 10.0})),
            EncryptedField::Scalar(s) if s.scale() == 10
        ));
        assert_eq!(EncryptedField::parse(&json!({"ct": "1", "scale": 2.5})), EncryptedField::Malformed);
        assert_eq!(EncryptedField::parse(&json!({"ct": "1", "scale": 0.0})), EncryptedField::Malformed);
        assert_eq!(EncryptedField::parse(&json!([])), EncryptedField::Sequence(vec![]));
    }

    #[test]
    fn test_invalid_ciphertext_degrades_to_none() {
        let private = primary();
        let public = private.public_key();
        let field = EncryptedField::parse(&json!({"ct": "0"}));

        assert_eq!(decode_field(Some(&field), public, &private).expect("Keys match"), None);
    }

    #[test]
    fn test_decode_rejects_mismatched_keys() {
        let private = primary();
        let field = EncryptedField::Scalar(scalar(private.public_key(), 1, 1));

        assert!(matches!(
            decode_field(Some(&field), private.public_key(), &secondary()),
            Err(CryptoError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_record_known_and_extra_fields() {
        let private = primary();
        let public = private.public_key();

        let raw = json!({
            "meta": {"patient_id": 17, "timestamp": "2024-03-01 08:15:00", "device_id": "DEV-4", "ward": "B"},
            "encrypted": {
                "heart_rate": [scalar(public, 88, 1).to_json(), scalar(public, 91, 1).to_json()],
                "temperature": scalar(public, 366, 10).to_json(),
                "systolic": scalar(public, 121, 1).to_json(),
                "diastolic": scalar(public, 79, 1).to_json(),
                "spo2": scalar(public, 97, 1).to_json(),
                "notes": "free text"
            }
        });

        let record = EncryptedRecord::from_value(raw).expect("Object");
        let decoded = decode_record(&record, public, &private).expect("Keys match");

        assert_eq!(decoded.meta.patient_id.as_deref(), Some("17"));
        assert_eq!(decoded.meta.extra.get("ward"), Some(&json!("B")));
        assert_eq!(decoded.heart_rate, Some(DecodedValue::Integer(88)));
        assert_eq!(decoded.temperature, Some(DecodedValue::Scaled(36.6)));
        assert_eq!(decoded.blood_pressure(), Some((121, 79)));
        assert_eq!(
            decoded.extra.get("spo2"),
            Some(&Some(Decoded::Value(DecodedValue::Integer(97))))
        );
        assert_eq!(decoded.extra.get("notes"), Some(&None));
    }

    #[test]
    fn test_record_under_other_key_pair_flagged() {
        let sealed_with = primary();
        let public = sealed_with.public_key();
        let record = EncryptedRecord::default()
            .with_field("heart_rate", scalar(public, 72, 1))
            .with_field("temperature", scalar(public, 368, 10))
            .with_field("spo2", EncryptedField::Sequence(vec![Some(scalar(public, 97, 1)), None]));

        let other = secondary();
        let decoded = decode_record(&record, other.public_key(), &other).expect("Keys match");

        assert_eq!(decoded.heart_rate, None);
        assert_eq!(decoded.decrypted, 0);
        assert_eq!(decoded.undecodable, 3);
        assert!(decoded.nothing_decrypted());

        let own = decode_record(&record, public, &sealed_with).expect("Keys match");
        assert_eq!(own.decrypted, 3);
        assert!(!own.nothing_decrypted());
    }

    #[test]
    fn test_empty_sequence_for_known_field_is_none() {
        let private = primary();
        let record = EncryptedRecord::default().with_field("heart_rate", EncryptedField::Sequence(vec![]));

        let decoded = decode_record(&record, private.public_key(), &private).expect("Keys match");
        assert_eq!(decoded.heart_rate, None);
    }

    #[test]
    fn test_top_level_section_without_encrypted_key() {
        let private = primary();
        let public = private.public_key();
        let raw = json!({"heart_rate": scalar(public, 64, 1).to_json()});

        let record = EncryptedRecord::from_value(raw).expect("Object");
        assert!(record.meta.is_empty());
        let decoded = decode_record(&record, public, &private).expect("Keys match");
        assert_eq!(decoded.heart_rate, Some(DecodedValue::Integer(64)));
    }

    #[test]
    fn test_non_object_blob_rejected() {
        assert!(matches!(
            EncryptedRecord::from_slice(b"[1, 2]"),
            Err(RecordError::NotAnObject("array"))
        ));
        assert!(matches!(
            EncryptedRecord::from_slice(b"not json"),
            Err(RecordError::Json(_))
        ));
    }

    #[test]
    fn test_record_bytes_reparse() {
        let private = primary();
        let public = private.public_key();
        let record = EncryptedRecord::default()
            .with_field("heart_rate", scalar(public, 70, 1))
            .with_field("temperature", scalar(public, 371, 10));

        let bytes = record.to_vec().expect("Should serialize");
        assert_eq!(EncryptedRecord::from_slice(&bytes).expect("Should parse"), record);
    }

    #[test]
    fn test_report_lists_vitals_and_extras() {
        let record = DecodedRecord {
            heart_rate: Some(DecodedValue::Integer(72)),
            systolic: Some(DecodedValue::Integer(118)),
            extra: BTreeMap::from([("spo2".to_string(), None)]),
            ..DecodedRecord::default()
        };

        let text = record.report("enc_rec_000001.json").to_string();
        assert!(text.contains("Record ID     : enc_rec_000001.json"));
        assert!(text.contains("Heart Rate    : 72 bpm"));
        assert!(text.contains("Temperature   : <not present>"));
        assert!(text.contains("Blood Pressure: <not present>"));
        assert!(text.contains("spo2 => null"));
        assert!(!text.contains("Patient ID"));
    }
}
