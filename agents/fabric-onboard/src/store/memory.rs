//! In-memory object store

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{ObjectStore, StoreError};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    public: bool,
}

/// Process-local store with the same semantics as the S3 store
///
/// Keys can be marked unavailable to simulate a storage outage.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    unavailable: Mutex<Vec<String>>,
    writes: Mutex<usize>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` exists and was written with public-read
    pub fn is_public(&self, key: &str) -> bool {
        self.objects
            .lock()
            .map(|objects| objects.get(key).map(|o| o.public).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Total number of successful `put` calls
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Make every operation on keys starting with `prefix` fail as unavailable
    pub fn fail_prefix(&self, prefix: &str) {
        if let Ok(mut unavailable) = self.unavailable.lock() {
            unavailable.push(prefix.to_string());
        }
    }

    fn check_available(&self, key: &str) -> Result<(), StoreError> {
        let unavailable = self.unavailable.lock().map_err(|_| poisoned(key))?;
        if unavailable.iter().any(|p| key.starts_with(p.as_str())) {
            return Err(StoreError::Unavailable {
                key: key.to_string(),
                reason: "simulated outage".to_string(),
            });
        }
        Ok(())
    }
}

fn poisoned(key: &str) -> StoreError {
    StoreError::Unavailable {
        key: key.to_string(),
        reason: "store lock poisoned".to_string(),
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn location(&self, key: &str) -> String {
        format!("memory://{key}")
    }

    async fn put(&self, key: &str, bytes: &[u8], public: bool) -> Result<(), StoreError> {
        self.check_available(key)?;
        let mut objects = self.objects.lock().map_err(|_| poisoned(key))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                public,
            },
        );
        *self.writes.lock().map_err(|_| poisoned(key))? += 1;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.check_available(key)?;
        let objects = self.objects.lock().map_err(|_| poisoned(key))?;
        objects
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check_available(prefix)?;
        let objects = self.objects.lock().map_err(|_| poisoned(prefix))?;
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
