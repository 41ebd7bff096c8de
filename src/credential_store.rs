use crate::errors::StoreError;
use keyring::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;

/// Durable key/value medium behind the session.
///
/// No transactional guarantee across keys: two writes are two writes.
pub trait CredentialStore: Send + Sync {
    fn write(&self, key: &str, value: &str)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    fn read(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// OS keychain with a JSON file fallback when the keychain is missing or refuses a write.
#[derive(Debug)]
pub struct KeyringStore {
    service_name: String,
    keyring_enabled: bool,
    fallback: FileStore,
}

impl KeyringStore {
    pub fn new(service_name: &str, fallback_path: PathBuf) -> Self {
        // Probe once so a missing platform backend is reported a single time
        let keyring_enabled = match Entry::new(service_name, "probe") {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    "Keyring is not available on this system ({}), will use file-based storage.",
                    e
                );
                false
            }
        };

        KeyringStore {
            service_name: service_name.to_string(),
            keyring_enabled,
            fallback: FileStore::new(fallback_path),
        }
    }

    fn entry(&self, key: &str) -> Option<Entry> {
        if !self.keyring_enabled {
            return None;
        }
        match Entry::new(&self.service_name, key) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Failed to open keyring entry for {}: {:?}", key, e);
                None
            }
        }
    }
}

impl CredentialStore for KeyringStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(entry) = self.entry(key) {
            match entry.set_password(value) {
                Ok(()) => {
                    tracing::debug!("Stored {} in keyring", key);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to save {} to keyring: {:?}. Trying fallback storage.",
                        key,
                        e
                    );
                }
            }
        }

        self.fallback.write(key, value).await
    }

    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(entry) = self.entry(key) {
            match entry.get_password() {
                Ok(value) if !value.is_empty() => return Ok(Some(value)),
                Ok(_) | Err(keyring::Error::NoEntry) => {
                    tracing::debug!("No {} found in keyring, checking file storage", key);
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to load {} from keyring: {:?}. Checking file storage.",
                        key,
                        e
                    );
                }
            }
        }

        self.fallback.read(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let deleted = match self.entry(key) {
            Some(entry) => keyring_delete_result(key, entry.delete_password()),
            None => Ok(()),
        };

        // The fallback may hold a copy from an earlier failed keyring write
        self.fallback.delete(key).await?;
        deleted
    }
}

/// A value left behind in the keychain is still readable, so only a missing
/// entry counts as deleted.
fn keyring_delete_result(key: &str, result: keyring::Result<()>) -> Result<(), StoreError> {
    match result {
        Ok(()) => {
            tracing::debug!("Deleted {} from keyring", key);
            Ok(())
        }
        Err(keyring::Error::NoEntry) => {
            tracing::debug!("No {} entry found in keyring to delete", key);
            Ok(())
        }
        Err(e) => {
            tracing::warn!("Failed to delete {} from keyring: {:?}", key, e);
            Err(e.into())
        }
    }
}

/// Single JSON object on disk, one property per key.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file
    lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        FileStore {
            path,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, values: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        tokio::fs::write(&self.path, contents).await?;
        Ok(())
    }
}

impl CredentialStore for FileStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values).await?;
        tracing::debug!("Stored {} in {:?}", key, self.path);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        Ok(values.remove(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        if values.remove(key).is_some() {
            self.persist(&values).await?;
        }
        Ok(())
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.values.lock().map_err(|_| StoreError::Unavailable {
            reason: "memory store lock poisoned".to_string(),
        })
    }
}

impl CredentialStore for MemoryStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values()?.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values()?.remove(key);
        Ok(())
    }
}

/// Store picked from configuration at startup.
#[derive(Debug)]
pub enum ConfiguredStore {
    Keyring(KeyringStore),
    File(FileStore),
    Memory(MemoryStore),
}

impl CredentialStore for ConfiguredStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        match self {
            ConfiguredStore::Keyring(store) => store.write(key, value).await,
            ConfiguredStore::File(store) => store.write(key, value).await,
            ConfiguredStore::Memory(store) => store.write(key, value).await,
        }
    }

    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            ConfiguredStore::Keyring(store) => store.read(key).await,
            ConfiguredStore::File(store) => store.read(key).await,
            ConfiguredStore::Memory(store) => store.read(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self {
            ConfiguredStore::Keyring(store) => store.delete(key).await,
            ConfiguredStore::File(store) => store.delete(key).await,
            ConfiguredStore::Memory(store) => store.delete(key).await,
        }
    }
}
