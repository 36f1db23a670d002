//! Paillier key and ciphertext types for encrypted vital-sign arithmetic.
//!
//! Wraps the additively homomorphic primitives behind an `EncryptedNumber`
//! that remembers which public key produced it.
//!
//! # Key identity
//!
//! Every key carries a fingerprint (truncated SHA-256 of the modulus).
//! Adding or decrypting across fingerprints fails with
//! `CryptoError::KeyMismatch` instead of producing a meaningless value.
//!
//! # Plaintext domain
//!
//! Signed integers `v` with `|v| <= n/3 - 1`, encoded as `v mod n`. Residues
//! that fall between the positive and negative windows decode as
//! `CryptoError::Overflow`.

use std::fmt;
use std::sync::Arc;

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

/// Smallest modulus accepted, in bits. Below this the plaintext domain no
/// longer covers `i64`.
const MIN_MODULUS_BITS: u64 = 66;

/// Error type for homomorphic operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Key mismatch: expected key {expected}, found key {found}")]
    KeyMismatch { expected: String, found: String },

    #[error("Plaintext {0} is outside the representable range")]
    PlaintextOutOfRange(String),

    #[error("Decrypted value overflowed the plaintext domain")]
    Overflow,

    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

struct PublicParams {
    n: BigUint,
    n_squared: BigUint,
    max_int: BigUint,
    fingerprint: String,
}

/// Paillier public key (`g = n + 1`).
///
/// Cheap to clone; every `EncryptedNumber` holds one.
#[derive(Clone)]
pub struct PublicKey {
    inner: Arc<PublicParams>,
}

impl PublicKey {
    /// Build a public key from a modulus supplied by key management.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKey` if the modulus is even or too small.
    pub fn from_modulus(n: BigUint) -> Result<Self, CryptoError> {
        if n.bits() < MIN_MODULUS_BITS {
            return Err(CryptoError::InvalidKey(format!(
                "modulus has {} bits, need at least {MIN_MODULUS_BITS}",
                n.bits()
            )));
        }
        if n.is_even() {
            return Err(CryptoError::InvalidKey("modulus must be odd".into()));
        }

        let n_squared = &n * &n;
        let max_int = &n / 3u32 - 1u32;
        let fingerprint = compute_fingerprint(&n);

        Ok(Self {
            inner: Arc::new(PublicParams {
                n,
                n_squared,
                max_int,
                fingerprint,
            }),
        })
    }

    /// The modulus `n`.
    #[must_use]
    pub fn modulus(&self) -> &BigUint {
        &self.inner.n
    }

    /// Largest magnitude a plaintext may have.
    #[must_use]
    pub fn max_int(&self) -> &BigUint {
        &self.inner.max_int
    }

    /// Key fingerprint for identification (not secret).
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.inner.fingerprint
    }

    /// Encrypt a signed integer with fresh randomness from a CSPRNG.
    ///
    /// # Errors
    /// Returns `CryptoError::PlaintextOutOfRange` if `value` does not fit the
    /// plaintext domain of this key.
    pub fn encrypt(&self, value: i64) -> Result<EncryptedNumber, CryptoError> {
        let mut rng = ChaCha20Rng::from_entropy();
        self.encrypt_with_rng(value, &mut rng)
    }

    /// Encrypt using the supplied RNG for the obfuscation factor.
    ///
    /// # Errors
    /// Returns `CryptoError::PlaintextOutOfRange` if `value` does not fit.
    pub fn encrypt_with_rng<R>(&self, value: i64, rng: &mut R) -> Result<EncryptedNumber, CryptoError>
    where
        R: rand::Rng + ?Sized,
    {
        let encoded = self.encode(value)?;
        let r = self.random_unit(rng);
        let obfuscator = r.modpow(&self.inner.n, &self.inner.n_squared);
        let ciphertext = (self.shift_factor(&encoded) * obfuscator) % &self.inner.n_squared;

        Ok(EncryptedNumber {
            ciphertext,
            key: self.clone(),
        })
    }

    /// Fail with `KeyMismatch` unless `other` is the same key.
    ///
    /// # Errors
    /// Returns `CryptoError::KeyMismatch` when the keys differ.
    pub fn ensure_same(&self, other: &PublicKey) -> Result<(), CryptoError> {
        if Arc::ptr_eq(&self.inner, &other.inner) || self.inner.n == other.inner.n {
            Ok(())
        } else {
            Err(CryptoError::KeyMismatch {
                expected: self.inner.fingerprint.clone(),
                found: other.inner.fingerprint.clone(),
            })
        }
    }

    fn encode(&self, value: i64) -> Result<BigUint, CryptoError> {
        let magnitude = BigUint::from(value.unsigned_abs());
        if magnitude > self.inner.max_int {
            return Err(CryptoError::PlaintextOutOfRange(value.to_string()));
        }
        if value < 0 {
            Ok(&self.inner.n - magnitude)
        } else {
            Ok(magnitude)
        }
    }

    fn decode(&self, residue: &BigUint) -> Result<i64, CryptoError> {
        let n = &self.inner.n;
        let max_int = &self.inner.max_int;

        let signed = if residue <= max_int {
            BigInt::from(residue.clone())
        } else if residue >= &(n - max_int) {
            BigInt::from(residue.clone()) - BigInt::from(n.clone())
        } else {
            return Err(CryptoError::Overflow);
        };

        signed
            .to_i64()
            .ok_or_else(|| CryptoError::PlaintextOutOfRange(signed.to_string()))
    }

    /// `g^m mod n^2`, which for `g = n + 1` is `1 + m*n` (`m < n`).
    fn shift_factor(&self, encoded: &BigUint) -> BigUint {
        encoded * &self.inner.n + 1u32
    }

    fn random_unit<R>(&self, rng: &mut R) -> BigUint
    where
        R: rand::Rng + ?Sized,
    {
        let one = BigUint::one();
        loop {
            let r = rng.gen_biguint_range(&one, &self.inner.n);
            if r.gcd(&self.inner.n).is_one() {
                return r;
            }
        }
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.inner.n == other.inner.n
    }
}

impl Eq for PublicKey {}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("fingerprint", &self.inner.fingerprint)
            .field("bits", &self.inner.n.bits())
            .finish()
    }
}

/// Paillier private key.
///
/// # Security
///
/// `Debug` only shows the fingerprint of the matching public key.
#[derive(Clone)]
pub struct PrivateKey {
    public: PublicKey,
    lambda: BigUint,
    mu: BigUint,
}

impl PrivateKey {
    /// Build a private key from the two prime factors of the modulus.
    ///
    /// Primality is the caller's (key management's) responsibility.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKey` if the factors are degenerate or
    /// `lambda` has no inverse modulo `n`.
    pub fn from_primes(p: &BigUint, q: &BigUint) -> Result<Self, CryptoError> {
        let three = BigUint::from(3u32);
        if p == q {
            return Err(CryptoError::InvalidKey("prime factors must differ".into()));
        }
        if p < &three || q < &three {
            return Err(CryptoError::InvalidKey("prime factors must be odd primes".into()));
        }

        let public = PublicKey::from_modulus(p * q)?;
        let one = BigUint::one();
        let lambda = (p - &one).lcm(&(q - &one));
        let mu = (&lambda % public.modulus())
            .modinv(public.modulus())
            .ok_or_else(|| CryptoError::InvalidKey("lambda is not invertible modulo n".into()))?;

        Ok(Self { public, lambda, mu })
    }

    /// The public key this private key decrypts for.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Whether `public` is the key this private key belongs to.
    #[must_use]
    pub fn matches(&self, public: &PublicKey) -> bool {
        self.public == *public
    }

    /// Fail with `KeyMismatch` unless `public` belongs to this private key.
    ///
    /// # Errors
    /// Returns `CryptoError::KeyMismatch` when the keys are not a pair.
    pub fn ensure_matches(&self, public: &PublicKey) -> Result<(), CryptoError> {
        self.public.ensure_same(public)
    }

    /// Decrypt a ciphertext produced under the matching public key.
    ///
    /// # Errors
    /// - `CryptoError::KeyMismatch` if the ciphertext belongs to another key
    /// - `CryptoError::Overflow` if the residue is outside the signed windows
    /// - `CryptoError::PlaintextOutOfRange` if the value does not fit `i64`
    pub fn decrypt(&self, number: &EncryptedNumber) -> Result<i64, CryptoError> {
        self.public.ensure_same(&number.key)?;

        let n = self.public.modulus();
        let x = number.ciphertext.modpow(&self.lambda, &self.public.inner.n_squared);
        let l = (x - 1u32) / n;
        let residue = (l * &self.mu) % n;

        self.public.decode(&residue)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("fingerprint", &self.public.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Matching public and private keys, as supplied by key management.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl KeyPair {
    /// Pair a private key with its own public key.
    #[must_use]
    pub fn new(private: PrivateKey) -> Self {
        Self {
            public: private.public_key().clone(),
            private,
        }
    }
}

/// A ciphertext bound to the public key that produced it.
#[derive(Clone)]
pub struct EncryptedNumber {
    ciphertext: BigUint,
    key: PublicKey,
}

impl EncryptedNumber {
    /// Rebuild an encrypted number from a stored ciphertext.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidCiphertext` unless `0 < c < n^2` and `c`
    /// is a unit modulo `n`.
    pub fn from_ciphertext(key: &PublicKey, ciphertext: BigUint) -> Result<Self, CryptoError> {
        if ciphertext.is_zero() {
            return Err(CryptoError::InvalidCiphertext("ciphertext is zero".into()));
        }
        if ciphertext >= key.inner.n_squared {
            return Err(CryptoError::InvalidCiphertext(
                "ciphertext is not below n^2".into(),
            ));
        }
        if !ciphertext.gcd(&key.inner.n).is_one() {
            return Err(CryptoError::InvalidCiphertext(
                "ciphertext shares a factor with n".into(),
            ));
        }

        Ok(Self {
            ciphertext,
            key: key.clone(),
        })
    }

    /// The raw ciphertext.
    #[must_use]
    pub fn ciphertext(&self) -> &BigUint {
        &self.ciphertext
    }

    /// The key this number was encrypted under.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }

    /// Homomorphic addition: `E(a) (+) E(b) = E(a + b)`.
    ///
    /// # Errors
    /// Returns `CryptoError::KeyMismatch` if `other` uses a different key.
    pub fn add(&self, other: &EncryptedNumber) -> Result<EncryptedNumber, CryptoError> {
        self.key.ensure_same(&other.key)?;
        let ciphertext = (&self.ciphertext * &other.ciphertext) % &self.key.inner.n_squared;
        Ok(Self {
            ciphertext,
            key: self.key.clone(),
        })
    }

    /// Add a plaintext constant: `E(a) (+) k = E(a + k)`.
    ///
    /// # Errors
    /// Returns `CryptoError::PlaintextOutOfRange` if `constant` does not fit.
    pub fn add_constant(&self, constant: i64) -> Result<EncryptedNumber, CryptoError> {
        let encoded = self.key.encode(constant)?;
        let ciphertext =
            (&self.ciphertext * self.key.shift_factor(&encoded)) % &self.key.inner.n_squared;
        Ok(Self {
            ciphertext,
            key: self.key.clone(),
        })
    }
}

impl fmt::Debug for EncryptedNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedNumber")
            .field("key_fingerprint", &self.key.fingerprint())
            .field("bits", &self.ciphertext.bits())
            .finish()
    }
}

/// Truncated SHA-256 of the modulus, hex encoded (16 chars).
fn compute_fingerprint(n: &BigUint) -> String {
    let digest = Sha256::digest(n.to_bytes_be());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Deterministic keys built from Mersenne primes, for tests across the crate.
#[cfg(test)]
pub(crate) mod test_keys {
    use super::*;

    fn mersenne(exponent: usize) -> BigUint {
        (BigUint::one() << exponent) - BigUint::one()
    }

    /// n = M61 * M89 (150 bits).
    pub(crate) fn primary() -> PrivateKey {
        PrivateKey::from_primes(&mersenne(61), &mersenne(89)).expect("valid test primes")
    }

    /// n = M89 * M127, unrelated to `primary`.
    pub(crate) fn secondary() -> PrivateKey {
        PrivateKey::from_primes(&mersenne(89), &mersenne(127)).expect("valid test primes")
    }
}

#[cfg(test)]
mod tests {
    use super::test_keys::{primary, secondary};
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let private = primary();
        let public = private.public_key();

        for v in [0i64, 1, -1, 72, -90, 1_000_000, i64::MAX, i64::MIN + 1] {
            let enc = public.encrypt(v).expect("Should encrypt");
            assert_eq!(private.decrypt(&enc).expect("Should decrypt"), v);
        }
    }

    #[test]
    fn test_encryption_is_randomized() {
        let private = primary();
        let a = private.public_key().encrypt(42).expect("Should encrypt");
        let b = private.public_key().encrypt(42).expect("Should encrypt");
        assert_ne!(a.ciphertext(), b.ciphertext());
    }

    #[test]
    fn test_homomorphic_add() {
        let private = primary();
        let public = private.public_key();

        let a = public.encrypt(120).expect("Should encrypt");
        let b = public.encrypt(-35).expect("Should encrypt");
        let sum = a.add(&b).expect("Same key");
        assert_eq!(private.decrypt(&sum).expect("Should decrypt"), 85);
    }

    #[test]
    fn test_add_constant() {
        let private = primary();
        let enc = private.public_key().encrypt(98).expect("Should encrypt");

        let shifted = enc.add_constant(-90).expect("In range");
        assert_eq!(private.decrypt(&shifted).expect("Should decrypt"), 8);

        let shifted = enc.add_constant(-200).expect("In range");
        assert_eq!(private.decrypt(&shifted).expect("Should decrypt"), -102);
    }

    #[test]
    fn test_add_across_keys_is_key_mismatch() {
        let a = primary().public_key().encrypt(1).expect("Should encrypt");
        let b = secondary().public_key().encrypt(1).expect("Should encrypt");
        assert!(matches!(a.add(&b), Err(CryptoError::KeyMismatch { .. })));
    }

    #[test]
    fn test_decrypt_with_wrong_key_is_key_mismatch() {
        let enc = primary().public_key().encrypt(7).expect("Should encrypt");
        assert!(matches!(
            secondary().decrypt(&enc),
            Err(CryptoError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn test_from_ciphertext_roundtrip() {
        let private = primary();
        let public = private.public_key();
        let enc = public.encrypt(-17).expect("Should encrypt");

        let rebuilt =
            EncryptedNumber::from_ciphertext(public, enc.ciphertext().clone()).expect("Valid");
        assert_eq!(private.decrypt(&rebuilt).expect("Should decrypt"), -17);
    }

    #[test]
    fn test_from_ciphertext_rejects_invalid_values() {
        let private = primary();
        let public = private.public_key();
        let n = public.modulus().clone();

        assert!(EncryptedNumber::from_ciphertext(public, BigUint::zero()).is_err());
        assert!(EncryptedNumber::from_ciphertext(public, &n * &n).is_err());
        // Multiple of n is not a unit.
        assert!(EncryptedNumber::from_ciphertext(public, n * 2u32).is_err());
    }

    #[test]
    fn test_overflow_is_detected() {
        let private = primary();
        let public = private.public_key();
        let max = public.max_int().clone();

        // Residue sitting between the positive and negative windows.
        let gap = &max + BigUint::from(1u32);
        let forged = (gap * public.modulus() + 1u32) % (public.modulus() * public.modulus());
        let enc = EncryptedNumber::from_ciphertext(public, forged).expect("Unit ciphertext");
        assert_eq!(private.decrypt(&enc), Err(CryptoError::Overflow));
    }

    #[test]
    fn test_small_modulus_rejected() {
        assert!(matches!(
            PublicKey::from_modulus(BigUint::from(3233u32)),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(PrivateKey::from_primes(&BigUint::from(61u32), &BigUint::from(61u32)).is_err());
    }

    #[test]
    fn test_key_pair_matches() {
        let private = primary();
        let pair = KeyPair::new(private.clone());
        assert!(pair.private.matches(&pair.public));
        assert!(!pair.private.matches(secondary().public_key()));
    }

    #[test]
    fn test_debug_does_not_leak_key_material() {
        let private = primary();
        let debug_output = format!("{private:?}");
        assert!(debug_output.contains("fingerprint"));
        assert!(!debug_output.contains(&private.lambda.to_string()));
        assert_eq!(private.public_key().fingerprint().len(), 16);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn summable() -> impl Strategy<Value = (i64, i64)> {
            (any::<i64>(), any::<i64>())
                .prop_filter("sum fits i64", |(a, b)| a.checked_add(*b).is_some())
        }

        proptest! {
            #[test]
            fn prop_add_decrypts_to_sum((a, b) in summable()) {
                let private = primary();
                let public = private.public_key();

                let enc_a = public.encrypt(a).expect("Should encrypt");
                let enc_b = public.encrypt(b).expect("Should encrypt");
                let sum = enc_a.add(&enc_b).expect("Same key");
                prop_assert_eq!(private.decrypt(&sum).expect("Should decrypt"), a + b);
            }

            #[test]
            fn prop_add_constant_shifts_plaintext((a, k) in summable()) {
                let private = primary();

                let enc = private.public_key().encrypt(a).expect("Should encrypt");
                let shifted = enc.add_constant(k).expect("In range");
                prop_assert_eq!(private.decrypt(&shifted).expect("Should decrypt"), a + k);
            }
        }
    }
}
