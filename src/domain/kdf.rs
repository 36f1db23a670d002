//! Password sealing for private key material at rest.
//!
//! Argon2id stretches the password into an AES-256-GCM key; salt and nonce
//! are fresh for every seal, so sealing the same secret twice never yields
//! the same blob.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{password_hash::SaltString, Algorithm, Argon2, Params, PasswordHasher, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Argon2id memory cost in KiB.
const ARGON2_MEMORY_KIB: u32 = 47104;

#[derive(Debug, Error)]
pub enum KdfError {
    #[error("Key derivation failed: {0}")]
    Derivation(String),

    #[error("Sealing failed: {0}")]
    Seal(String),

    #[error("Unsealing failed: wrong password or tampered data")]
    Unseal,

    #[error("Invalid sealed secret format")]
    InvalidFormat,
}

/// Secret bytes sealed under a password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    pub ciphertext: Vec<u8>,
    /// Argon2 salt in its B64 string form
    pub salt: String,
    pub nonce: [u8; NONCE_LEN],
}

impl SealedSecret {
    /// Layout: `salt_len (u32 LE) | salt | nonce | ciphertext`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let salt = self.salt.as_bytes();
        let mut out = Vec::with_capacity(4 + salt.len() + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&(salt.len() as u32).to_le_bytes());
        out.extend_from_slice(salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// # Errors
    /// Returns `KdfError::InvalidFormat` if the layout is truncated or the
    /// salt is not UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KdfError> {
        let (len_bytes, rest) = bytes.split_first_chunk::<4>().ok_or(KdfError::InvalidFormat)?;
        let salt_len = u32::from_le_bytes(*len_bytes) as usize;

        if rest.len() < salt_len + NONCE_LEN {
            return Err(KdfError::InvalidFormat);
        }
        let (salt, rest) = rest.split_at(salt_len);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let salt = std::str::from_utf8(salt)
            .map_err(|_| KdfError::InvalidFormat)?
            .to_string();
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);

        Ok(Self {
            ciphertext: ciphertext.to_vec(),
            salt,
            nonce,
        })
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// # Errors
    /// Returns `KdfError::InvalidFormat` for bad base64 or a bad layout.
    pub fn from_base64(encoded: &str) -> Result<Self, KdfError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| KdfError::InvalidFormat)?;
        Self::from_bytes(&bytes)
    }
}

fn derive_key(password: &str, salt: &SaltString) -> Result<Zeroizing<[u8; KEY_LEN]>, KdfError> {
    let params = Params::new(ARGON2_MEMORY_KIB, 1, 1, Some(KEY_LEN))
        .map_err(|e| KdfError::Derivation(format!("Invalid Argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), salt)
        .map_err(|e| KdfError::Derivation(e.to_string()))?;
    let output = hash
        .hash
        .ok_or_else(|| KdfError::Derivation("Hash output missing".to_string()))?;

    let bytes = output.as_bytes();
    if bytes.len() < KEY_LEN {
        return Err(KdfError::Derivation("Hash too short".to_string()));
    }

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&bytes[..KEY_LEN]);
    Ok(key)
}

/// Seal `plaintext` under `password`.
///
/// # Errors
/// Returns error if key derivation or encryption fails.
pub fn seal(plaintext: &[u8], password: &str) -> Result<SealedSecret, KdfError> {
    let salt = SaltString::generate(&mut OsRng);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|e| KdfError::Seal(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| KdfError::Seal(e.to_string()))?;

    Ok(SealedSecret {
        ciphertext,
        salt: salt.to_string(),
        nonce,
    })
}

/// Recover the plaintext of a sealed secret.
///
/// # Errors
/// Returns `KdfError::Unseal` if the password is wrong or the data was altered.
pub fn unseal(sealed: &SealedSecret, password: &str) -> Result<Zeroizing<Vec<u8>>, KdfError> {
    let salt = SaltString::from_b64(&sealed.salt).map_err(|_| KdfError::InvalidFormat)?;

    let key = derive_key(password, &salt)?;
    let cipher =
        Aes256Gcm::new_from_slice(&key[..]).map_err(|e| KdfError::Derivation(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_ref())
        .map(Zeroizing::new)
        .map_err(|_| KdfError::Unseal)
}
