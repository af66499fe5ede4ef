//! Error types for credential vault operations.
//!
//! The variants follow the failure taxonomy of the vault layers:
//! keystore faults, AEAD authentication failures, malformed stored data
//! and missing credential fields. Messages never carry plaintext or key
//! material.

use thiserror::Error;

/// Errors that can occur during vault operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// No usable key-protection tier, or no biometric hardware.
    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// Key creation, lookup or deletion failed for a reason other than
    /// tier unavailability.
    #[error("Keystore fault: {0}")]
    KeyStoreFault(String),

    /// AEAD tag mismatch: tampered or corrupted data, or the wrong key.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Stored data is not valid base64 or is too short to hold a tag.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Requested credential fields are not present.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// An I/O error occurred in a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for vault operations.
pub type VaultResult<T> = std::result::Result<T, VaultError>;

impl VaultError {
    /// Stable error code for programmatic handling by embedding layers.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::HardwareUnavailable(_) => "HARDWARE_UNAVAILABLE",
            VaultError::KeyStoreFault(_) => "KEYSTORE_FAULT",
            VaultError::AuthenticationFailed => "AUTHENTICATION_FAILED",
            VaultError::MalformedInput(_) => "MALFORMED_INPUT",
            VaultError::MissingData(_) => "MISSING_DATA",
            VaultError::Io(_) => "IO_ERROR",
            VaultError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

// ============================================================================
// Serialization for embedding layers (IPC, FFI)
// ============================================================================

impl serde::Serialize for VaultError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("VaultError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_error_serialization() {
        let err = VaultError::AuthenticationFailed;
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("AUTHENTICATION_FAILED"));
        assert!(json.contains("Authentication failed"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: VaultError = io.into();
        assert_eq!(err.code(), "IO_ERROR");
    }
}
