//! Key file adapter: loads Paillier keys supplied by key management.
//!
//! File format (JSON):
//!
//! ```json
//! {"version": 1, "modulus": "<decimal n>", "sealed_private": "<base64>"}
//! ```
//!
//! `sealed_private` is `{"p": "...", "q": "..."}` sealed with
//! [`crate::domain::kdf::seal`]. The modulus is stored in the clear so the
//! public key can be checked against the unsealed factors.
//!
//! # Password sources
//!
//! Precedence (highest first):
//! - `VITALGUARD_KEY_PASSWORD_FD` (read from an already-open FD, then close it)
//! - `VITALGUARD_KEY_PASSWORD_FILE` (read from a file path)
//! - `/run/secrets/vitalguard_key_password` (Docker/Compose secret default)
//! - `VITALGUARD_KEY_PASSWORD`, debug builds only

use std::path::Path;
#[cfg(unix)]
use std::{io::Read, os::unix::io::FromRawFd};

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::domain::kdf::{self, KdfError, SealedSecret};
use crate::domain::{CryptoError, KeyPair, PrivateKey, PublicKey};

const KEY_PASSWORD_FD_ENV: &str = "VITALGUARD_KEY_PASSWORD_FD";
const KEY_PASSWORD_FILE_ENV: &str = "VITALGUARD_KEY_PASSWORD_FILE";
const KEY_PASSWORD_DOCKER_SECRET_PATH: &str = "/run/secrets/vitalguard_key_password";
const KEY_PASSWORD_ENV_DEV: &str = "VITALGUARD_KEY_PASSWORD";

pub const KEY_FILE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum KeyFileError {
    #[error("Key file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key file format error: {0}")]
    Format(String),

    #[error("Unsupported key file version {0}")]
    UnsupportedVersion(u32),

    #[error("Key unsealing failed: {0}")]
    Kdf(#[from] KdfError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(
        "Missing key password: provide {KEY_PASSWORD_FD_ENV} or {KEY_PASSWORD_FILE_ENV} (or mount {KEY_PASSWORD_DOCKER_SECRET_PATH})"
    )]
    MissingPassword,
}

impl From<serde_json::Error> for KeyFileError {
    fn from(e: serde_json::Error) -> Self {
        Self::Format(e.to_string())
    }
}

/// The two prime factors, as decimal strings. Wiped on drop.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct PrimeFactors {
    p: String,
    q: String,
}

impl PrimeFactors {
    #[must_use]
    pub fn new(p: &BigUint, q: &BigUint) -> Self {
        Self {
            p: p.to_string(),
            q: q.to_string(),
        }
    }

    /// Build the private key these factors describe.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKey` for non-numeric or degenerate factors.
    pub fn to_private_key(&self) -> Result<PrivateKey, CryptoError> {
        let parse = |digits: &str| {
            digits
                .trim()
                .parse::<BigUint>()
                .map_err(|_| CryptoError::InvalidKey("prime factor is not a decimal integer".into()))
        };
        PrivateKey::from_primes(&parse(&self.p)?, &parse(&self.q)?)
    }

    /// Parse a plaintext `{"p": ..., "q": ...}` document.
    ///
    /// # Errors
    /// Returns `KeyFileError::Format` if the JSON does not have that shape.
    pub fn from_json(bytes: &[u8]) -> Result<Self, KeyFileError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl std::fmt::Debug for PrimeFactors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrimeFactors([REDACTED])")
    }
}

/// On-disk key file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFile {
    pub version: u32,
    pub modulus: String,
    pub sealed_private: String,
}

impl KeyFile {
    /// # Errors
    /// Returns error if the file is unreadable or not a key file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, KeyFileError> {
        let bytes = std::fs::read(path)?;
        let file: Self = serde_json::from_slice(&bytes)?;
        if file.version != KEY_FILE_VERSION {
            return Err(KeyFileError::UnsupportedVersion(file.version));
        }
        Ok(file)
    }

    /// Public key from the stored modulus, without unsealing anything.
    ///
    /// # Errors
    /// Returns error if the modulus is not a valid Paillier modulus.
    pub fn public_key(&self) -> Result<PublicKey, KeyFileError> {
        let n = self
            .modulus
            .trim()
            .parse::<BigUint>()
            .map_err(|_| KeyFileError::Format("modulus is not a decimal integer".into()))?;
        Ok(PublicKey::from_modulus(n)?)
    }

    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, KeyFileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Seal `factors` into a key file under `password`.
///
/// # Errors
/// Returns error if the factors do not form a valid key or sealing fails.
pub fn seal_keypair(factors: &PrimeFactors, password: &str) -> Result<KeyFile, KeyFileError> {
    let private = factors.to_private_key()?;
    let plaintext = Zeroizing::new(serde_json::to_vec(factors)?);
    let sealed = kdf::seal(&plaintext, password)?;

    Ok(KeyFile {
        version: KEY_FILE_VERSION,
        modulus: private.public_key().modulus().to_string(),
        sealed_private: sealed.to_base64(),
    })
}

/// Load a key pair, taking the password from the configured secret source.
///
/// # Errors
/// Returns error if no password is available or the file cannot be unsealed.
pub fn load_keypair<P: AsRef<Path>>(path: P) -> Result<KeyPair, KeyFileError> {
    let password = key_password()?;
    load_keypair_with_password(path, password.as_str())
}

/// Load a key pair with an explicit password.
///
/// # Errors
/// - `KeyFileError::Kdf` on a wrong password or tampered file
/// - `KeyFileError::Crypto(KeyMismatch)` if the factors do not match the
///   stored modulus
pub fn load_keypair_with_password<P: AsRef<Path>>(
    path: P,
    password: &str,
) -> Result<KeyPair, KeyFileError> {
    let file = KeyFile::read(path.as_ref())?;
    let public = file.public_key()?;

    let sealed = SealedSecret::from_base64(&file.sealed_private)?;
    let plaintext = kdf::unseal(&sealed, password)?;
    let factors = PrimeFactors::from_json(&plaintext)?;
    let private = factors.to_private_key()?;

    private.ensure_matches(&public)?;

    tracing::info!(fingerprint = public.fingerprint(), "Loaded Paillier key pair");
    Ok(KeyPair::new(private))
}

fn secret_from(content: &str) -> Result<Zeroizing<String>, KeyFileError> {
    let secret = Zeroizing::new(content.trim_end_matches(['\n', '\r']).to_string());
    if secret.is_empty() {
        return Err(KeyFileError::MissingPassword);
    }
    Ok(secret)
}

/// Read the key password from the first available secure source.
///
/// In release builds, environment variables are not accepted for secrets.
///
/// # Errors
/// Returns `KeyFileError::MissingPassword` if no source yields a non-empty
/// password.
pub fn key_password() -> Result<Zeroizing<String>, KeyFileError> {
    #[cfg(unix)]
    if let Ok(fd_str) = std::env::var(KEY_PASSWORD_FD_ENV) {
        let fd: i32 = fd_str.trim().parse().map_err(|_| KeyFileError::MissingPassword)?;
        if fd <= 2 {
            return Err(KeyFileError::MissingPassword);
        }

        // SAFETY: the FD is handed to this process for a one-time secret read;
        // taking ownership closes it afterwards.
        let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
        let mut buf = Zeroizing::new(String::new());
        file.read_to_string(&mut buf)?;
        return secret_from(&buf);
    }

    if let Ok(path) = std::env::var(KEY_PASSWORD_FILE_ENV) {
        let content = Zeroizing::new(std::fs::read_to_string(path.trim())?);
        return secret_from(&content);
    }

    if Path::new(KEY_PASSWORD_DOCKER_SECRET_PATH).exists() {
        let content = Zeroizing::new(std::fs::read_to_string(KEY_PASSWORD_DOCKER_SECRET_PATH)?);
        return secret_from(&content);
    }

    if cfg!(debug_assertions) {
        if let Ok(v) = std::env::var(KEY_PASSWORD_ENV_DEV) {
            return secret_from(&v);
        }
    }

    Err(KeyFileError::MissingPassword)
}
