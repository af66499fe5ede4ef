//! In-process software keystore.
//!
//! Keys live only in process memory and are zeroized when removed or
//! dropped. Used as the fallback tier where no platform keystore is
//! reachable, and as the test backend.

use std::collections::HashMap;

use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

use super::{GenerateError, KeyGenSpec, KeyHandle, PlatformKeyStore, KEY_SIZE};
use crate::error::{VaultError, VaultResult};
use crate::models::KeyTier;

struct SoftwareEntry {
    key: Zeroizing<[u8; KEY_SIZE]>,
    tier: KeyTier,
    unlocked_device_required: bool,
}

/// Software-tier [`PlatformKeyStore`].
///
/// Grants the isolated tier only when built with
/// [`with_isolated_tier(true)`](Self::with_isolated_tier); otherwise an
/// isolated request fails with [`GenerateError::TierUnavailable`].
#[derive(Default)]
pub struct SoftwareKeyStore {
    entries: HashMap<String, SoftwareEntry>,
    isolated_tier: bool,
    loaded: bool,
}

impl SoftwareKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulate a device with (or without) a secure element.
    pub fn with_isolated_tier(mut self, available: bool) -> Self {
        self.isolated_tier = available;
        self
    }

    /// Import existing key material under `alias` at the standard tier.
    pub fn with_key(mut self, alias: &str, key: [u8; KEY_SIZE]) -> Self {
        self.entries.insert(
            alias.to_string(),
            SoftwareEntry {
                key: Zeroizing::new(key),
                tier: KeyTier::Standard,
                unlocked_device_required: true,
            },
        );
        self
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    fn ensure_loaded(&self) -> VaultResult<()> {
        if self.loaded {
            Ok(())
        } else {
            Err(VaultError::KeyStoreFault("Keystore not loaded".into()))
        }
    }
}

impl PlatformKeyStore for SoftwareKeyStore {
    fn load(&mut self) -> VaultResult<()> {
        self.loaded = true;
        Ok(())
    }

    fn get_key(&self, alias: &str) -> VaultResult<Option<KeyHandle>> {
        self.ensure_loaded()?;
        self.entries
            .get(alias)
            .map(|entry| {
                KeyHandle::from_key_bytes(
                    alias,
                    entry.tier,
                    entry.key.as_slice(),
                    entry.unlocked_device_required,
                )
            })
            .transpose()
    }

    fn generate_key(&mut self, spec: &KeyGenSpec) -> Result<KeyHandle, GenerateError> {
        if !self.loaded {
            return Err(GenerateError::Fault("Keystore not loaded".into()));
        }
        if spec.tier == KeyTier::Isolated && !self.isolated_tier {
            return Err(GenerateError::TierUnavailable);
        }
        if !spec.randomized_encryption_required {
            return Err(GenerateError::Fault(
                "Software keystore only issues randomized-encryption keys".into(),
            ));
        }

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        rand::rng().fill_bytes(&mut key[..]);

        let handle = KeyHandle::from_key_bytes(
            &spec.alias,
            spec.tier,
            key.as_slice(),
            spec.unlocked_device_required,
        )
        .map_err(|e| GenerateError::Fault(e.to_string()))?;

        self.entries.insert(
            spec.alias.clone(),
            SoftwareEntry {
                key,
                tier: spec.tier,
                unlocked_device_required: spec.unlocked_device_required,
            },
        );
        debug!("Generated software key for alias {}", spec.alias);
        Ok(handle)
    }

    fn delete_entry(&mut self, alias: &str) -> VaultResult<()> {
        self.ensure_loaded()?;
        if self.entries.remove(alias).is_none() {
            debug!("No software key to delete for alias {} (already gone)", alias);
        }
        Ok(())
    }
}
