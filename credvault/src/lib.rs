//! Hardware-backed encrypted credential vault.
//!
//! The vault keeps one username/password pair encrypted with AES-256-GCM
//! under a key held by the platform keystore:
//! - [`probe::AuthCapabilityProbe`] decides whether the vault may be used
//! - [`keystore::TieredKeyProvider`] resolves the key, preferring an isolated tier
//! - [`codec`] encrypts fields and reads both current and legacy formats
//! - [`vault::CredentialVault`] ties these to a [`kv::KeyValueStore`]

pub mod codec;
pub mod config;
pub mod error;
pub mod keystore;
pub mod kv;
pub mod models;
pub mod probe;
pub mod vault;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::{load_config, save_config, VaultConfig, DEFAULT_KEY_ALIAS, DEFAULT_NAMESPACE};
pub use error::{VaultError, VaultResult};
pub use keystore::{
    software::SoftwareKeyStore, GenerateError, KeyGenSpec, KeyHandle, PlatformKeyStore,
    PlatformVersion, SecureKeyProvider, TieredKeyProvider,
};
pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use models::{CapabilityResult, Credential, FormatVersion, KeyTier};
pub use probe::{AuthCapabilityProbe, Authenticators, BiometricStatus, DeviceCapabilities};
pub use vault::CredentialVault;

#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
pub use keystore::os_keyring::KeyringKeyStore;

/// Install a tracing subscriber for embedding binaries and tests.
///
/// Honours `RUST_LOG`; defaults to `credvault=debug`. Does nothing if a
/// global subscriber is already set.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credvault=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
