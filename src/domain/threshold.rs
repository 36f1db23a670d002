//! Encrypted threshold comparison.
//!
//! Only the additive homomorphism `E(x) (+) E(y) = E(x + y)` is used: the
//! negated threshold is encrypted and added to the encrypted measurement.

use super::paillier::{CryptoError, EncryptedNumber, PublicKey};

/// Compute `E(value - threshold)` without decrypting `value`.
///
/// # Errors
/// - `CryptoError::PlaintextOutOfRange` if `-threshold` is not representable
/// - `CryptoError::KeyMismatch` if `value` was encrypted under another key
pub fn threshold_diff(
    value: &EncryptedNumber,
    threshold: i64,
    public: &PublicKey,
) -> Result<EncryptedNumber, CryptoError> {
    let negated = threshold
        .checked_neg()
        .ok_or_else(|| CryptoError::PlaintextOutOfRange(threshold.to_string()))?;
    let encrypted_negated = public.encrypt(negated)?;
    value.add(&encrypted_negated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::paillier::test_keys::{primary, secondary};

    #[test]
    fn test_diff_decrypts_to_difference() {
        let private = primary();
        let public = private.public_key();

        for (v, t) in [(101, 100), (99, 100), (100, 100), (89, 90), (0, -5), (-40, 60)] {
            let enc = public.encrypt(v).expect("Should encrypt");
            let diff = threshold_diff(&enc, t, public).expect("Should compute");
            assert_eq!(private.decrypt(&diff).expect("Should decrypt"), v - t);
        }
    }

    #[test]
    fn test_diff_ciphertext_differs_from_input() {
        let private = primary();
        let public = private.public_key();
        let enc = public.encrypt(120).expect("Should encrypt");

        let diff = threshold_diff(&enc, 0, public).expect("Should compute");
        assert_ne!(diff.ciphertext(), enc.ciphertext());
        assert_eq!(private.decrypt(&diff).expect("Should decrypt"), 120);
    }

    #[test]
    fn test_unrepresentable_threshold_rejected() {
        let private = primary();
        let public = private.public_key();
        let enc = public.encrypt(1).expect("Should encrypt");

        assert!(matches!(
            threshold_diff(&enc, i64::MIN, public),
            Err(CryptoError::PlaintextOutOfRange(_))
        ));
    }

    #[test]
    fn test_threshold_under_foreign_key_is_key_mismatch() {
        let enc = primary().public_key().encrypt(80).expect("Should encrypt");
        let other = secondary();

        assert!(matches!(
            threshold_diff(&enc, 100, other.public_key()),
            Err(CryptoError::KeyMismatch { .. })
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// The decrypted difference is exactly `value - threshold`.
            #[test]
            fn prop_threshold_diff_decrypts_to_difference(
                (v, t) in (any::<i64>(), any::<i64>())
                    .prop_filter("difference fits i64", |(v, t)| {
                        *t != i64::MIN && v.checked_sub(*t).is_some()
                    })
            ) {
                let private = primary();
                let public = private.public_key();

                let enc = public.encrypt(v).expect("Should encrypt");
                let diff = threshold_diff(&enc, t, public).expect("Should compute");
                prop_assert_eq!(private.decrypt(&diff).expect("Should decrypt"), v - t);
            }
        }
    }
}
