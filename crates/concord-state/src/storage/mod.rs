pub mod memory;
pub mod persistent;

use std::collections::BTreeMap;

use crate::error::StateError;

/// Key-value storage with a pending write set that becomes durable on
/// `commit`. One `commit` is one atomic batch.
pub trait Storage: Send + Sync {
    /// Get a value by key, pending writes included
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn put(&mut self, key: &[u8], value: &[u8]);

    fn delete(&mut self, key: &[u8]);

    /// Make pending changes durable
    fn commit(&mut self) -> Result<(), StateError>;

    /// Drop pending changes
    fn rollback(&mut self);

    fn exists(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// All live keys with a given prefix, in ascending order
    fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>>;
}

/// Committed data plus a pending write set, shared by the storage backends
#[derive(Debug, Clone, Default)]
pub(crate) struct WriteBuffer {
    pub(crate) data: BTreeMap<Vec<u8>, Vec<u8>>,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteBuffer {
    pub(crate) fn with_data(data: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        WriteBuffer {
            data,
            pending: BTreeMap::new(),
        }
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.pending.get(key) {
            Some(pending) => pending.clone(),
            None => self.data.get(key).cloned(),
        }
    }

    pub(crate) fn stage(&mut self, key: &[u8], value: Option<&[u8]>) {
        self.pending.insert(key.to_vec(), value.map(<[u8]>::to_vec));
    }

    pub(crate) fn apply(&mut self) {
        for (key, value) in std::mem::take(&mut self.pending) {
            match value {
                Some(v) => {
                    self.data.insert(key, v);
                }
                None => {
                    self.data.remove(&key);
                }
            }
        }
    }

    pub(crate) fn discard(&mut self) {
        self.pending.clear();
    }

    pub(crate) fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        let committed = self
            .data
            .range(prefix.to_vec()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .filter(|k| !matches!(self.pending.get(*k), Some(None)));
        let staged = self
            .pending
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(k, v)| v.is_some() && !self.data.contains_key(*k))
            .map(|(k, _)| k);

        let mut keys: Vec<Vec<u8>> = committed.chain(staged).cloned().collect();
        keys.sort();
        keys
    }
}

pub use memory::MemoryStorage;
pub use persistent::FileStorage;
