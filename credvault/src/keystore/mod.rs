//! Hardware-backed key management.
//!
//! A [`PlatformKeyStore`] is the raw platform keystore (secure element,
//! TEE, OS keyring, or the in-process software tier). [`TieredKeyProvider`]
//! sits on top of it and implements [`SecureKeyProvider`]: it resolves the
//! key for an alias, creating it on first use with the strongest tier the
//! platform grants.

#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
pub mod os_keyring;
pub mod software;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};
use crate::models::KeyTier;

/// Nonce size for AES-GCM (96 bits = 12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size for AES-GCM (128 bits = 16 bytes)
pub const TAG_SIZE: usize = 16;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// First API level that honours tier selection and the unlocked-device policy.
const KEY_POLICY_MIN_API_LEVEL: u32 = 28;

/// API levels whose unlock-state tracking is broken: keys bound to the
/// unlocked state become unusable after reboot on these releases.
const UNLOCK_STATE_BUG_API_LEVELS: std::ops::RangeInclusive<u32> = 31..=34;

/// Opaque reference to an AES-256-GCM key held by a platform keystore.
///
/// The handle exposes sealing and opening only. Sealing always draws its
/// nonce from the key's own generator; there is no way to pass one in.
#[derive(Clone)]
pub struct KeyHandle {
    alias: String,
    tier: KeyTier,
    unlocked_device_required: bool,
    cipher: Aes256Gcm,
}

impl KeyHandle {
    /// Wrap raw key material. Fails unless `key` is exactly 32 bytes.
    pub fn from_key_bytes(
        alias: impl Into<String>,
        tier: KeyTier,
        key: &[u8],
        unlocked_device_required: bool,
    ) -> VaultResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| VaultError::KeyStoreFault(format!("Invalid key: {}", e)))?;
        Ok(Self {
            alias: alias.into(),
            tier,
            unlocked_device_required,
            cipher,
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn tier(&self) -> KeyTier {
        self.tier
    }

    /// Whether the key refuses to operate while the device is locked.
    pub fn unlocked_device_required(&self) -> bool {
        self.unlocked_device_required
    }

    /// Encrypt under a freshly generated random nonce.
    ///
    /// Returns the nonce and `ciphertext || tag`.
    pub(crate) fn seal(&self, plaintext: &[u8]) -> VaultResult<([u8; NONCE_SIZE], Vec<u8>)> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| VaultError::KeyStoreFault(format!("Encryption failed: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce.as_slice());
        Ok((nonce_bytes, ciphertext))
    }

    /// Decrypt `ciphertext || tag` under the given nonce.
    pub(crate) fn open(
        &self,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
    ) -> VaultResult<Zeroizing<Vec<u8>>> {
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| VaultError::AuthenticationFailed)
    }
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the actual key material
        f.debug_struct("KeyHandle")
            .field("alias", &self.alias)
            .field("tier", &self.tier)
            .field("unlocked_device_required", &self.unlocked_device_required)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Platform release the keystore runs on.
///
/// `api_level` is `None` on platforms without the versioned key policy
/// model (desktop keyrings, the software tier); those get the full policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformVersion {
    pub api_level: Option<u32>,
}

impl PlatformVersion {
    pub fn new(api_level: Option<u32>) -> Self {
        Self { api_level }
    }

    /// Whether tier selection and the unlocked-device policy can be set.
    pub fn supports_key_policies(&self) -> bool {
        self.api_level
            .map_or(true, |level| level >= KEY_POLICY_MIN_API_LEVEL)
    }

    /// Whether this release is in the range with broken unlock-state tracking.
    pub fn has_unlock_state_bug(&self) -> bool {
        self.api_level
            .is_some_and(|level| UNLOCK_STATE_BUG_API_LEVELS.contains(&level))
    }
}

/// Parameters for creating a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGenSpec {
    pub alias: String,
    pub tier: KeyTier,
    /// Key becomes unusable while the device is locked.
    pub unlocked_device_required: bool,
    /// Key refuses caller-chosen nonces.
    pub randomized_encryption_required: bool,
}

impl KeyGenSpec {
    /// Build the creation policy for `alias` at `tier` on `platform`.
    pub fn new(alias: &str, tier: KeyTier, platform: PlatformVersion) -> Self {
        let policies = platform.supports_key_policies();
        Self {
            alias: alias.to_string(),
            tier: if policies { tier } else { KeyTier::Standard },
            unlocked_device_required: policies && !platform.has_unlock_state_bug(),
            randomized_encryption_required: true,
        }
    }
}

/// Why key generation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    /// The requested protection tier does not exist on this device.
    #[error("Requested key tier unavailable")]
    TierUnavailable,

    #[error("Key generation failed: {0}")]
    Fault(String),
}

impl From<GenerateError> for VaultError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::TierUnavailable => {
                VaultError::HardwareUnavailable("No usable key protection tier".into())
            }
            GenerateError::Fault(msg) => VaultError::KeyStoreFault(msg),
        }
    }
}

/// Raw platform keystore.
pub trait PlatformKeyStore {
    /// Open the keystore. Called once before the first lookup.
    fn load(&mut self) -> VaultResult<()>;

    /// Look up the key stored under `alias`.
    fn get_key(&self, alias: &str) -> VaultResult<Option<KeyHandle>>;

    /// Create a key per `spec`, replacing any entry under the same alias.
    fn generate_key(&mut self, spec: &KeyGenSpec) -> Result<KeyHandle, GenerateError>;

    /// Remove the entry for `alias`. Removing a missing entry succeeds.
    fn delete_entry(&mut self, alias: &str) -> VaultResult<()>;
}

/// Obtains the vault's symmetric key.
pub trait SecureKeyProvider {
    /// Return the key for `alias`, creating it if absent. Repeated calls
    /// return the same key until [`destroy_key`](Self::destroy_key).
    fn get_or_create_key(&mut self, alias: &str) -> VaultResult<KeyHandle>;

    /// Remove the key for `alias`. A missing key is not an error.
    fn destroy_key(&mut self, alias: &str) -> VaultResult<()>;
}

/// [`SecureKeyProvider`] that prefers the isolated tier and downgrades
/// once to the standard tier when the device has no secure element.
///
/// The underlying keystore is opened lazily on first use and stays open
/// for the provider's lifetime. No internal locking: callers sharing a
/// provider across threads must serialize access themselves.
pub struct TieredKeyProvider<K: PlatformKeyStore> {
    keystore: K,
    loaded: bool,
    platform: PlatformVersion,
    last_tier: Option<KeyTier>,
}

impl<K: PlatformKeyStore> TieredKeyProvider<K> {
    pub fn new(keystore: K, platform: PlatformVersion) -> Self {
        Self {
            keystore,
            loaded: false,
            platform,
            last_tier: None,
        }
    }

    /// Tier of the key most recently resolved by this provider.
    pub fn last_tier(&self) -> Option<KeyTier> {
        self.last_tier
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn keystore(&mut self) -> VaultResult<&mut K> {
        if !self.loaded {
            debug!("Loading platform keystore");
            self.keystore.load()?;
            self.loaded = true;
        }
        Ok(&mut self.keystore)
    }

    fn generate(&mut self, alias: &str) -> VaultResult<KeyHandle> {
        let platform = self.platform;
        let keystore = self.keystore()?;

        let isolated = KeyGenSpec::new(alias, KeyTier::Isolated, platform);
        match keystore.generate_key(&isolated) {
            Ok(key) => Ok(key),
            Err(GenerateError::TierUnavailable) => {
                warn!("Isolated key tier unavailable, falling back to standard tier");
                let standard = KeyGenSpec::new(alias, KeyTier::Standard, platform);
                keystore.generate_key(&standard).map_err(VaultError::from)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<K: PlatformKeyStore> SecureKeyProvider for TieredKeyProvider<K> {
    fn get_or_create_key(&mut self, alias: &str) -> VaultResult<KeyHandle> {
        let existing = self.keystore()?.get_key(alias)?;
        let key = match existing {
            Some(key) => {
                debug!("Using existing key for alias {}", alias);
                key
            }
            None => {
                info!("No key for alias {}, generating", alias);
                let key = self.generate(alias).map_err(|e| {
                    error!("Key generation failed for alias {}: {}", alias, e);
                    e
                })?;
                info!("Generated {} tier key for alias {}", key.tier(), alias);
                key
            }
        };
        self.last_tier = Some(key.tier());
        Ok(key)
    }

    fn destroy_key(&mut self, alias: &str) -> VaultResult<()> {
        let result = self
            .keystore()
            .and_then(|keystore| keystore.delete_entry(alias));
        match &result {
            Ok(()) => {
                info!("Key for alias {} destroyed", alias);
                self.last_tier = None;
            }
            Err(e) => error!("Failed to destroy key for alias {}: {}", alias, e),
        }
        result
    }
}
