//! CredentialVault - encrypted storage of a single username/password pair.
//!
//! Both fields are encrypted independently under the alias key and kept
//! as `<alias>-username` / `<alias>-password` in the key-value store.
//!
//! Every public operation returns a plain `bool` or `Option`: lower-layer
//! errors are logged and folded into failure so callers get a stable
//! contract. `retrieve_password` in particular returns `None` both when
//! nothing is stored and when decryption fails (typically because the
//! user has not authenticated yet), so the two cases are not
//! distinguishable from outside.

use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::codec;
use crate::config::VaultConfig;
use crate::error::VaultResult;
use crate::keystore::{KeyHandle, SecureKeyProvider};
use crate::kv::KeyValueStore;
use crate::models::{Credential, FormatVersion};

const USERNAME_SUFFIX: &str = "-username";
const PASSWORD_SUFFIX: &str = "-password";

pub struct CredentialVault<P: SecureKeyProvider, S: KeyValueStore> {
    alias: String,
    provider: P,
    store: S,
}

impl<P: SecureKeyProvider, S: KeyValueStore> CredentialVault<P, S> {
    pub fn new(alias: impl Into<String>, provider: P, store: S) -> Self {
        Self {
            alias: alias.into(),
            provider,
            store,
        }
    }

    /// Build a vault using the alias from `config`.
    pub fn with_config(config: &VaultConfig, provider: P, store: S) -> VaultResult<Self> {
        config.validate()?;
        Ok(Self::new(config.key_alias.clone(), provider, store))
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn kv_store(&self) -> &S {
        &self.store
    }

    /// Store key of the encrypted username.
    pub fn username_key(&self) -> String {
        format!("{}{}", self.alias, USERNAME_SUFFIX)
    }

    /// Store key of the encrypted password.
    pub fn password_key(&self) -> String {
        format!("{}{}", self.alias, PASSWORD_SUFFIX)
    }

    /// Encrypt and persist the credential pair.
    ///
    /// Returns `false` without touching the store when either field is
    /// missing, and `false` on any keystore, encryption or write failure.
    pub fn store(&mut self, username: Option<&str>, password: Option<&str>) -> bool {
        let (Some(username), Some(password)) = (username, password) else {
            warn!("Refusing to store credentials with a missing field");
            return false;
        };

        match self.write_credentials(username, password) {
            Ok(()) => {
                info!("Credentials stored for alias {}", self.alias);
                true
            }
            Err(e) => {
                error!("Failed to store credentials: {}", e);
                false
            }
        }
    }

    /// Decrypt the stored password.
    ///
    /// `None` when nothing is stored or when it cannot be decrypted.
    pub fn retrieve_password(&mut self) -> Option<Zeroizing<String>> {
        let (_, password) = self.read_entries()?;
        let key = self.resolve_key()?;
        match codec::decrypt(&password, &key) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                // Usually means the user has not authenticated yet
                debug!("Password not decryptable: {}", e);
                None
            }
        }
    }

    /// Decrypt both stored fields. Same absent-on-failure contract as
    /// [`retrieve_password`](Self::retrieve_password).
    pub fn retrieve_credentials(&mut self) -> Option<Credential> {
        let (username, password) = self.read_entries()?;
        let key = self.resolve_key()?;
        let decrypted = codec::decrypt(&username, &key).and_then(|username| {
            codec::decrypt(&password, &key).map(|password| (username, password))
        });
        match decrypted {
            Ok((username, password)) => Some(Credential::new(username.as_str(), password.as_str())),
            Err(e) => {
                debug!("Credentials not decryptable: {}", e);
                None
            }
        }
    }

    /// Whether both encrypted fields are present. Does not touch the key.
    pub fn has_credentials(&self) -> bool {
        self.read_entries().is_some()
    }

    /// Destroy the alias key and remove both stored fields.
    ///
    /// A key that is already gone counts as success. If the store cannot
    /// be read, or the key cannot be destroyed, both are left in place.
    pub fn delete(&mut self) -> bool {
        // Destroying the key over an unreadable store would orphan the fields
        if let Err(e) = self.store.keys() {
            error!("Credential store unreadable, keeping key: {}", e);
            return false;
        }

        if let Err(e) = self.provider.destroy_key(&self.alias) {
            error!("Failed to delete credentials: {}", e);
            return false;
        }

        let username_key = self.username_key();
        let password_key = self.password_key();
        match self
            .store
            .remove_all(&[username_key.as_str(), password_key.as_str()])
        {
            Ok(()) => {
                info!("Credentials deleted for alias {}", self.alias);
                true
            }
            Err(e) => {
                error!("Failed to clear stored credentials: {}", e);
                false
            }
        }
    }

    /// Re-encrypt the stored pair if either field is in the legacy
    /// fixed-nonce format.
    ///
    /// Returns `Ok(true)` if the record was rewritten, `Ok(false)` if
    /// there was nothing to migrate.
    pub fn migrate_legacy(&mut self) -> VaultResult<bool> {
        let Some((username, password)) = self.read_entries() else {
            return Ok(false);
        };
        let key = self.provider.get_or_create_key(&self.alias)?;
        let (username, username_format) = codec::decrypt_detailed(&username, &key)?;
        let (password, password_format) = codec::decrypt_detailed(&password, &key)?;

        if username_format == FormatVersion::Current && password_format == FormatVersion::Current {
            return Ok(false);
        }

        info!("Re-encrypting legacy credentials for alias {}", self.alias);
        self.write_credentials(&username, &password)?;
        Ok(true)
    }

    fn write_credentials(&mut self, username: &str, password: &str) -> VaultResult<()> {
        let key = self.provider.get_or_create_key(&self.alias)?;
        let username = codec::encrypt(username, &key)?;
        let password = codec::encrypt(password, &key)?;

        let username_key = self.username_key();
        let password_key = self.password_key();
        self.store.put_all(&[
            (username_key.as_str(), username.as_str()),
            (password_key.as_str(), password.as_str()),
        ])
    }

    fn read_entries(&self) -> Option<(String, String)> {
        let read = |key: String| match self.store.get(&key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read {}: {}", key, e);
                None
            }
        };

        let username = read(self.username_key());
        let password = read(self.password_key());
        match (username, password) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => {
                debug!("No stored credentials for alias {}", self.alias);
                None
            }
        }
    }

    fn resolve_key(&mut self) -> Option<KeyHandle> {
        match self.provider.get_or_create_key(&self.alias) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Vault key unavailable: {}", e);
                None
            }
        }
    }
}
