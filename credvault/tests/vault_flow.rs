//! End-to-end vault flows over the public API.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};

use credvault::{
    codec, AuthCapabilityProbe, Authenticators, BiometricStatus, CapabilityResult,
    CredentialVault, DeviceCapabilities, FileStore, FormatVersion, KeyTier, KeyValueStore,
    MemoryStore, PlatformVersion, SecureKeyProvider, SoftwareKeyStore, TieredKeyProvider,
    VaultConfig,
};

const ALIAS: &str = "com.credvault.test";
const KEY_BYTES: [u8; 32] = [0x5a; 32];

fn legacy_field(plaintext: &str) -> String {
    let cipher = Aes256Gcm::new_from_slice(&KEY_BYTES).unwrap();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&[0u8; 12]), plaintext.as_bytes())
        .unwrap();
    STANDARD.encode(ciphertext)
}

#[test]
fn store_retrieve_delete_on_disk() {
    credvault::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = VaultConfig::default();

    let provider = TieredKeyProvider::new(SoftwareKeyStore::new(), config.platform());
    let store = FileStore::open(dir.path(), &config.namespace).unwrap();
    let mut vault = CredentialVault::with_config(&config, provider, store).unwrap();

    assert!(vault.store(Some("alice"), Some("p@ss")));
    assert!(vault.kv_store().path().exists());
    assert_eq!(vault.retrieve_password().unwrap().as_str(), "p@ss");

    // Re-opened namespace sees the same encrypted fields
    let reopened = FileStore::open(dir.path(), &config.namespace).unwrap();
    assert_eq!(reopened.keys().unwrap().len(), 2);

    assert!(vault.delete());
    assert!(vault.retrieve_password().is_none());
    assert!(!vault.kv_store().path().exists());
}

#[test]
fn isolated_tier_downgrades_to_standard() {
    let provider = TieredKeyProvider::new(SoftwareKeyStore::new(), PlatformVersion::new(Some(34)));
    let mut vault = CredentialVault::new(ALIAS, provider, MemoryStore::new());

    assert!(vault.store(Some("alice"), Some("p@ss")));
    assert_eq!(vault.provider().last_tier(), Some(KeyTier::Standard));
}

#[test]
fn isolated_tier_used_when_present() {
    let store = SoftwareKeyStore::new().with_isolated_tier(true);
    let mut provider = TieredKeyProvider::new(store, PlatformVersion::new(Some(35)));
    let key = provider.get_or_create_key(ALIAS).unwrap();

    assert_eq!(key.tier(), KeyTier::Isolated);
    assert!(key.unlocked_device_required());
}

#[test]
fn legacy_records_are_readable_and_migratable() {
    let keystore = SoftwareKeyStore::new().with_key(ALIAS, KEY_BYTES);
    let provider = TieredKeyProvider::new(keystore, PlatformVersion::default());
    let mut store = MemoryStore::new();
    let username = legacy_field("alice");
    let password = legacy_field("p@ss");
    store
        .put_all(&[
            (&*format!("{}-username", ALIAS), username.as_str()),
            (&*format!("{}-password", ALIAS), password.as_str()),
        ])
        .unwrap();
    let mut vault = CredentialVault::new(ALIAS, provider, store);

    assert_eq!(vault.retrieve_password().unwrap().as_str(), "p@ss");
    let credential = vault.retrieve_credentials().unwrap();
    assert_eq!(credential.username, "alice");

    assert!(vault.migrate_legacy().unwrap());
    assert!(!vault.migrate_legacy().unwrap());

    let rewritten = vault
        .kv_store()
        .get(&vault.password_key())
        .unwrap()
        .unwrap();
    assert_ne!(rewritten, password);
    assert_eq!(STANDARD.decode(&rewritten).unwrap().len(), 12 + "p@ss".len() + 16);
    assert_eq!(vault.retrieve_password().unwrap().as_str(), "p@ss");
}

#[test]
fn legacy_blob_reports_legacy_format() {
    let keystore = SoftwareKeyStore::new().with_key(ALIAS, KEY_BYTES);
    let mut provider = TieredKeyProvider::new(keystore, PlatformVersion::default());
    let key = provider.get_or_create_key(ALIAS).unwrap();

    let (plaintext, format) = codec::decrypt_detailed(&legacy_field("hunter2"), &key).unwrap();
    assert_eq!(plaintext.as_str(), "hunter2");
    assert_eq!(format, FormatVersion::Legacy);
}

struct Device {
    fingerprint: bool,
    face: bool,
    pin: bool,
}

impl DeviceCapabilities for Device {
    fn has_fingerprint_hardware(&self) -> bool {
        self.fingerprint
    }

    fn has_face_hardware(&self) -> bool {
        self.face
    }

    fn has_iris_hardware(&self) -> bool {
        false
    }

    fn is_device_secure(&self) -> bool {
        self.pin
    }

    fn can_authenticate(&self, authenticators: Authenticators) -> BiometricStatus {
        if (self.fingerprint || self.face)
            && authenticators.contains(Authenticators::BIOMETRIC_STRONG)
        {
            BiometricStatus::Success
        } else {
            BiometricStatus::NoHardware
        }
    }
}

#[test]
fn capability_matrix() {
    let both = AuthCapabilityProbe::new(Device {
        fingerprint: true,
        face: true,
        pin: true,
    });
    assert_eq!(both.is_available(false, false), CapabilityResult::Multiple);

    let pin_only = AuthCapabilityProbe::new(Device {
        fingerprint: false,
        face: false,
        pin: true,
    });
    assert_eq!(pin_only.is_available(true, false), CapabilityResult::FallbackOnly);
    assert_eq!(pin_only.is_available(false, false), CapabilityResult::Unavailable);

    let no_pin = AuthCapabilityProbe::new(Device {
        fingerprint: true,
        face: false,
        pin: false,
    });
    assert_eq!(no_pin.is_available(false, false), CapabilityResult::Fingerprint);
    assert_eq!(no_pin.is_available(true, false), CapabilityResult::Unavailable);
}

#[test]
fn probe_gates_vault_use() {
    let probe = AuthCapabilityProbe::new(Device {
        fingerprint: true,
        face: false,
        pin: true,
    });
    let config = VaultConfig::default();
    let capability = probe.is_available(config.allow_fallback, config.allow_weak_factor);
    assert!(capability.is_available());

    let provider = TieredKeyProvider::new(SoftwareKeyStore::new(), config.platform());
    let mut vault = CredentialVault::with_config(&config, provider, MemoryStore::new()).unwrap();
    assert!(vault.store(Some("alice"), Some("p@ss")));
    assert!(vault.has_credentials());
}
