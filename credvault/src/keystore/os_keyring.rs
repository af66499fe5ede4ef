//! Desktop keystore using the OS keyring.
//!
//! The AES key is stored as a keyring secret under the vault alias:
//! - **macOS**: Keychain Access
//! - **Windows**: Credential Manager
//! - **Linux**: Secret Service API (GNOME Keyring, KWallet)
//!
//! OS keyrings have no secure-element tier, so isolated requests always
//! fail with [`GenerateError::TierUnavailable`].
//!
//! The secret is a small JSON record carrying the key and the policy it
//! was generated under. Bare base64 secrets from older releases are still
//! read, with the full policy.

use base64::Engine;
use keyring::Entry;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{GenerateError, KeyGenSpec, KeyHandle, PlatformKeyStore, KEY_SIZE};
use crate::error::{VaultError, VaultResult};
use crate::models::KeyTier;

/// Service name used for keyring entries.
pub const DEFAULT_SERVICE_NAME: &str = "com.credvault.keystore";

/// Account probed by `load()` to check that the keyring answers.
const PROBE_ACCOUNT: &str = "keystore-probe";

/// Keyring secret layout.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredKey {
    key: String,
    unlocked_device_required: bool,
}

fn encode_secret(key: &[u8], unlocked_device_required: bool) -> VaultResult<Zeroizing<String>> {
    let record = StoredKey {
        key: base64::engine::general_purpose::STANDARD.encode(key),
        unlocked_device_required,
    };
    Ok(Zeroizing::new(serde_json::to_string(&record)?))
}

/// Key bytes and policy from a keyring secret.
fn decode_secret(secret: &str) -> VaultResult<(Zeroizing<Vec<u8>>, bool)> {
    let (encoded, unlocked_device_required) = match serde_json::from_str::<StoredKey>(secret) {
        Ok(record) => (
            Zeroizing::new(record.key.clone()),
            record.unlocked_device_required,
        ),
        Err(_) => (Zeroizing::new(secret.trim().to_string()), true),
    };
    let key = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map(Zeroizing::new)
        .map_err(|e| VaultError::KeyStoreFault(format!("Failed to decode key: {}", e)))?;
    Ok((key, unlocked_device_required))
}

/// [`PlatformKeyStore`] backed by the OS keyring.
pub struct KeyringKeyStore {
    service: String,
}

impl KeyringKeyStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, alias: &str) -> VaultResult<Entry> {
        Entry::new(&self.service, alias).map_err(|e| {
            error!("Failed to create keyring entry: {}", e);
            map_keyring_error(e)
        })
    }
}

impl Default for KeyringKeyStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

impl PlatformKeyStore for KeyringKeyStore {
    fn load(&mut self) -> VaultResult<()> {
        debug!("Checking keyring availability for service: {}", self.service);
        match self.entry(PROBE_ACCOUNT)?.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                warn!("Keyring not accessible: {:?}", e);
                Err(map_keyring_error(e))
            }
        }
    }

    fn get_key(&self, alias: &str) -> VaultResult<Option<KeyHandle>> {
        let secret = match self.entry(alias)?.get_password() {
            Ok(secret) => Zeroizing::new(secret),
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => {
                error!("Failed to read key from keyring: {:?}", e);
                return Err(map_keyring_error(e));
            }
        };

        let (key, unlocked_device_required) = decode_secret(&secret)?;
        KeyHandle::from_key_bytes(alias, KeyTier::Standard, &key, unlocked_device_required)
            .map(Some)
    }

    fn generate_key(&mut self, spec: &KeyGenSpec) -> Result<KeyHandle, GenerateError> {
        if spec.tier == KeyTier::Isolated {
            return Err(GenerateError::TierUnavailable);
        }
        if !spec.randomized_encryption_required {
            return Err(GenerateError::Fault(
                "Keyring keystore only issues randomized-encryption keys".into(),
            ));
        }

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        rand::rng().fill_bytes(&mut key[..]);
        let encoded = encode_secret(&key[..], spec.unlocked_device_required)
            .map_err(|e| GenerateError::Fault(e.to_string()))?;

        let entry = self
            .entry(&spec.alias)
            .map_err(|e| GenerateError::Fault(e.to_string()))?;
        entry.set_password(&encoded).map_err(|e| {
            error!("Failed to store key in keyring: {:?}", e);
            GenerateError::Fault(format!("Keyring error: {}", e))
        })?;

        // Read back through a new Entry so a cached value can't mask a failed write
        let readback = self
            .entry(&spec.alias)
            .and_then(|entry| entry.get_password().map_err(map_keyring_error))
            .map(Zeroizing::new)
            .map_err(|e| GenerateError::Fault(format!("Keyring verification failed: {}", e)))?;
        if *readback != *encoded {
            error!("Keyring verification failed - stored key doesn't match");
            return Err(GenerateError::Fault(
                "Keyring verification failed: data mismatch".into(),
            ));
        }

        info!("Key for alias {} stored in OS keyring", spec.alias);
        KeyHandle::from_key_bytes(
            &spec.alias,
            KeyTier::Standard,
            &key[..],
            spec.unlocked_device_required,
        )
        .map_err(|e| GenerateError::Fault(e.to_string()))
    }

    fn delete_entry(&mut self, alias: &str) -> VaultResult<()> {
        match self.entry(alias)?.delete_credential() {
            Ok(()) => {
                info!("Key for alias {} deleted from OS keyring", alias);
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!("No key to delete (already gone)");
                Ok(())
            }
            Err(e) => {
                error!("Failed to delete key from keyring: {:?}", e);
                Err(map_keyring_error(e))
            }
        }
    }
}

/// Map keyring errors to our error type.
fn map_keyring_error(err: keyring::Error) -> VaultError {
    match err {
        keyring::Error::NoStorageAccess(e) => {
            VaultError::HardwareUnavailable(format!("Keyring access denied: {:?}", e))
        }
        keyring::Error::PlatformFailure(e) => {
            let msg = format!("{:?}", e);
            if msg.contains("Dbus") || msg.contains("dbus") || msg.contains("D-Bus") {
                VaultError::HardwareUnavailable(format!(
                    "System keyring not available (D-Bus error): {}",
                    msg
                ))
            } else {
                VaultError::KeyStoreFault(format!("Keyring error: {}", msg))
            }
        }
        keyring::Error::Ambiguous(_) => {
            VaultError::KeyStoreFault("Multiple keyring entries found".into())
        }
        keyring::Error::BadEncoding(_) => {
            VaultError::KeyStoreFault("Keyring encoding error".into())
        }
        _ => VaultError::KeyStoreFault(format!("Keyring error: {}", err)),
    }
}
