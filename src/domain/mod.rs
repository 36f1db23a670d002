//! Domain layer: Paillier arithmetic, anomaly policy and the record format.
//!
//! Nothing here touches the filesystem or a database.

pub mod address;
pub mod anomaly;
pub mod kdf;
pub mod paillier;
pub mod record;
pub mod threshold;

pub use address::{compute_address, AddressError, ContentAddress};
pub use anomaly::{assess, classify, Assessment, Verdict, VitalThresholds};
pub use paillier::{CryptoError, EncryptedNumber, KeyPair, PrivateKey, PublicKey};
pub use record::{
    decode_field, decode_record, Decoded, DecodedRecord, DecodedValue, EncryptedField,
    EncryptedRecord, EncryptedScalar, RecordError, RecordMeta,
};
pub use threshold::threshold_diff;
