use crate::store::{SectionStore, StoreError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory section store. Clones share the same sections, so a caller can
/// hand one clone to a gateway and keep another to inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    sections: BTreeMap<String, Vec<u8>>,
    writes: BTreeMap<String, usize>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with an IO error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Number of successful writes to `key`.
    pub fn write_count(&self, key: &str) -> usize {
        self.inner.lock().writes.get(key).copied().unwrap_or(0)
    }

    /// Successful writes across all keys.
    pub fn total_writes(&self) -> usize {
        self.inner.lock().writes.values().sum()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().sections.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().sections.is_empty()
    }
}

impl SectionStore for MemoryStore {
    fn read_section(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.lock().sections.get(key).cloned())
    }

    fn write_section(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "write to {key} refused"
            ))));
        }
        inner.sections.insert(key.to_owned(), data.to_vec());
        *inner.writes.entry(key.to_owned()).or_default() += 1;
        Ok(())
    }

    fn section_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.lock().sections.keys().cloned().collect())
    }
}
