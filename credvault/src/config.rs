use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{VaultError, VaultResult};
use crate::keystore::PlatformVersion;

/// Keystore alias for the vault key. Must stay stable across releases so
/// existing keys remain resolvable.
pub const DEFAULT_KEY_ALIAS: &str = "com.credvault.credentials";

/// Key-value namespace holding the encrypted fields.
pub const DEFAULT_NAMESPACE: &str = "CredentialVaultPreferences";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub key_alias: String,
    pub namespace: String,
    /// Platform API level, if the platform has versioned key policies.
    pub platform_version: Option<u32>,
    pub allow_fallback: bool,
    pub allow_weak_factor: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            key_alias: DEFAULT_KEY_ALIAS.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            platform_version: None,
            allow_fallback: true,
            allow_weak_factor: false,
        }
    }
}

impl VaultConfig {
    pub fn platform(&self) -> PlatformVersion {
        PlatformVersion::new(self.platform_version)
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.key_alias.trim().is_empty() {
            return Err(VaultError::MalformedInput("Key alias must not be empty".into()));
        }
        if self.namespace.trim().is_empty() {
            return Err(VaultError::MalformedInput("Namespace must not be empty".into()));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> VaultResult<VaultConfig> {
    if !path.exists() {
        return Ok(VaultConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: VaultConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &VaultConfig) -> VaultResult<()> {
    config.validate()?;
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
