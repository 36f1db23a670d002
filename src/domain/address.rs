//! Content addresses for stored record blobs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SHA256_HEX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Content address is empty")]
    Empty,

    #[error("Content address contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Opaque identifier of a blob's content.
///
/// Addresses come either from the primary store or from a local SHA-256
/// digest; both are plain ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentAddress(String);

impl ContentAddress {
    /// Validate and wrap an address string. SHA-256 hex digests are stored
    /// in lowercase.
    ///
    /// # Errors
    /// Returns `AddressError` for empty input or non-alphanumeric characters.
    pub fn parse(raw: impl Into<String>) -> Result<Self, AddressError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }
        if let Some(bad) = raw.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(AddressError::InvalidCharacter(bad));
        }
        let mut address = Self(raw);
        if address.is_sha256() {
            address.0.make_ascii_lowercase();
        }
        Ok(address)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this looks like a locally computed SHA-256 address.
    #[must_use]
    pub fn is_sha256(&self) -> bool {
        self.0.len() == SHA256_HEX_LEN && self.0.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Check `bytes` against a SHA-256 address.
    ///
    /// Addresses in any other form cannot be verified locally and always match.
    #[must_use]
    pub fn matches(&self, bytes: &[u8]) -> bool {
        !self.is_sha256() || self.0 == compute_address(bytes).0
    }
}

/// SHA-256 of `bytes` as lowercase hex.
#[must_use]
pub fn compute_address(bytes: &[u8]) -> ContentAddress {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    ContentAddress(hex)
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ContentAddress> for String {
    fn from(address: ContentAddress) -> Self {
        address.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_address_known_digest() {
        let address = compute_address(b"abc");
        assert_eq!(
            address.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(address.is_sha256());
        assert!(address.matches(b"abc"));
        assert!(!address.matches(b"abd"));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(ContentAddress::parse(""), Err(AddressError::Empty));
        assert_eq!(
            ContentAddress::parse("../etc/passwd"),
            Err(AddressError::InvalidCharacter('.'))
        );
        assert!(ContentAddress::parse("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").is_ok());
    }

    #[test]
    fn test_sha256_address_lowercased() {
        let digest = compute_address(b"abc");
        let upper = ContentAddress::parse(digest.as_str().to_ascii_uppercase()).expect("Valid address");
        assert_eq!(upper, digest);
        assert!(upper.matches(b"abc"));

        let opaque = ContentAddress::parse("QmMixedCase").expect("Valid address");
        assert_eq!(opaque.as_str(), "QmMixedCase");
    }

    #[test]
    fn test_opaque_address_always_matches() {
        let address: ContentAddress = "bafybeigdyrzt5".parse().expect("Valid address");
        assert!(!address.is_sha256());
        assert!(address.matches(b"anything"));
    }

    #[test]
    fn test_serde_validates() {
        let ok: ContentAddress = serde_json::from_str("\"abc123\"").expect("Valid address");
        assert_eq!(ok.to_string(), "abc123");
        assert!(serde_json::from_str::<ContentAddress>("\"a/b\"").is_err());
    }
}
