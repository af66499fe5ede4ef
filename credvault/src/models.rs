//! Data types shared across the vault layers.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A username/password pair.
///
/// Transient: the vault only ever persists the encrypted fields. Both
/// strings are wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the password
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Key-protection tier requested from, or granted by, a platform keystore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTier {
    /// Dedicated secure element (StrongBox-class isolation).
    Isolated,
    /// Ordinary hardware-backed (TEE) or OS-protected key storage.
    Standard,
}

impl std::fmt::Display for KeyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Isolated => write!(f, "isolated"),
            Self::Standard => write!(f, "standard"),
        }
    }
}

/// Wire format of a stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatVersion {
    /// `base64(ciphertext || tag)` encrypted under an all-zero nonce.
    Legacy,
    /// `base64(nonce || ciphertext || tag)` with a fresh random nonce.
    Current,
}

/// Outcome of an authentication capability probe.
///
/// `Unavailable` means the vault must not be used at all. `FallbackOnly`
/// means authentication is possible through the device credential
/// (PIN/pattern/password) although the device has no biometric sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CapabilityResult {
    Unavailable,
    FallbackOnly,
    Fingerprint,
    Face,
    Iris,
    Multiple,
}

impl CapabilityResult {
    /// Whether authentication can proceed at all.
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }

    /// Integer encoding used by older callers.
    pub fn code(&self) -> i32 {
        match self {
            Self::Unavailable => -1,
            Self::FallbackOnly => 0,
            Self::Fingerprint => 3,
            Self::Face => 4,
            Self::Iris => 5,
            Self::Multiple => 6,
        }
    }
}
