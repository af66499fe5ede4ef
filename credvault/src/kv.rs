//! String-keyed persistence for encrypted credential fields.
//!
//! The vault only needs an opaque map from string keys to base64 text.
//! [`MemoryStore`] keeps it in memory; [`FileStore`] keeps one JSON file
//! per namespace.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{VaultError, VaultResult};

/// Opaque string-keyed store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> VaultResult<Option<String>>;

    /// Write all entries in one commit: either every entry lands or none.
    fn put_all(&mut self, entries: &[(&str, &str)]) -> VaultResult<()>;

    /// Remove the given keys. Keys that are not present are ignored.
    fn remove_all(&mut self, keys: &[&str]) -> VaultResult<()>;

    fn keys(&self) -> VaultResult<Vec<String>>;
}

/// In-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put_all(&mut self, entries: &[(&str, &str)]) -> VaultResult<()> {
        for (key, value) in entries {
            self.entries.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_all(&mut self, keys: &[&str]) -> VaultResult<()> {
        for key in keys {
            self.entries.remove(*key);
        }
        Ok(())
    }

    fn keys(&self) -> VaultResult<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}

/// File-backed store: `<dir>/<namespace>.json`.
///
/// Writes go to a temp file that is renamed over the original, so a
/// crash never leaves a half-written namespace. The parsed file is cached
/// after the first read.
pub struct FileStore {
    path: PathBuf,
    cache: RefCell<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    /// Open the namespace `namespace` under `dir`, creating `dir` if needed.
    pub fn open(dir: impl AsRef<Path>, namespace: &str) -> VaultResult<Self> {
        if namespace.is_empty() || namespace.contains(['/', '\\']) {
            return Err(VaultError::MalformedInput(format!(
                "Invalid namespace: {:?}",
                namespace
            )));
        }
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("{}.json", namespace)),
            cache: RefCell::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> VaultResult<BTreeMap<String, String>> {
        if let Some(entries) = self.cache.borrow().as_ref() {
            return Ok(entries.clone());
        }

        let entries = if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            // A zero-length file is what an interrupted first write leaves behind
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        *self.cache.borrow_mut() = Some(entries.clone());
        Ok(entries)
    }

    fn persist(&self, entries: BTreeMap<String, String>) -> VaultResult<()> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            debug!("Namespace file {:?} removed (empty)", self.path);
        } else {
            let content = serde_json::to_string_pretty(&entries)?;

            // Write atomically (write to temp file, then rename)
            let temp_path = self.path.with_extension("json.tmp");
            if let Err(e) = write_restricted(&temp_path, &content)
                .and_then(|()| std::fs::rename(&temp_path, &self.path))
            {
                if temp_path.exists() {
                    let _ = std::fs::remove_file(&temp_path);
                }
                return Err(e.into());
            }
        }

        *self.cache.borrow_mut() = Some(entries);
        Ok(())
    }
}

fn write_restricted(path: &Path, content: &str) -> std::io::Result<()> {
    std::fs::write(path, content)?;

    // Set restrictive permissions on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn put_all(&mut self, entries: &[(&str, &str)]) -> VaultResult<()> {
        let mut current = self.load()?;
        for (key, value) in entries {
            current.insert((*key).to_string(), (*value).to_string());
        }
        self.persist(current)
    }

    fn remove_all(&mut self, keys: &[&str]) -> VaultResult<()> {
        let mut current = self.load()?;
        let before = current.len();
        for key in keys {
            current.remove(*key);
        }
        if current.len() == before {
            return Ok(());
        }
        self.persist(current)
    }

    fn keys(&self) -> VaultResult<Vec<String>> {
        Ok(self.load()?.into_keys().collect())
    }
}
