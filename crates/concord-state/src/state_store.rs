use std::collections::BTreeMap;

use concord_core::serialize;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::storage::Storage;

/// Prefix under which application state lives in the chain storage
pub(crate) const STATE_PREFIX: &[u8] = b"st:";

/// One key touched while executing a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub key: Vec<u8>,
    pub before: Option<Vec<u8>>,
    pub after: Option<Vec<u8>>,
}

/// All state changes of one block; enough to apply or revert it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDiff {
    pub entries: Vec<DiffEntry>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write overlay over the committed chain state.
///
/// Nothing reaches storage through the overlay. Execution writes into it,
/// then `into_diff` hands the changes to the chain store, which persists
/// them atomically together with the block.
pub struct StateStore<'a> {
    base: &'a dyn Storage,
    changes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> StateStore<'a> {
    pub(crate) fn new(base: &'a dyn Storage) -> Self {
        StateStore {
            base,
            changes: BTreeMap::new(),
        }
    }

    fn prefixed(key: &[u8]) -> Vec<u8> {
        [STATE_PREFIX, key].concat()
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.changes.get(key) {
            Some(change) => change.clone(),
            None => self.base.get(&Self::prefixed(key)),
        }
    }

    pub fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.changes.insert(key.to_vec(), Some(value));
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.changes.insert(key.to_vec(), None);
    }

    pub fn get_value<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StateError> {
        self.get(key)
            .map(|bytes| serialize::from_bytes(&bytes).map_err(StateError::from))
            .transpose()
    }

    pub fn set_value<T: Serialize>(&mut self, key: &[u8], value: &T) -> Result<(), StateError> {
        let bytes = serialize::to_bytes(value)?;
        self.set(key, bytes);
        Ok(())
    }

    /// Changes that actually differ from the committed state
    pub fn into_diff(self) -> StateDiff {
        let entries = self
            .changes
            .into_iter()
            .filter_map(|(key, after)| {
                let before = self.base.get(&Self::prefixed(&key));
                (before != after).then_some(DiffEntry { key, before, after })
            })
            .collect();
        StateDiff { entries }
    }
}

/// Write the `after` side of a diff into storage
pub(crate) fn apply_diff<S: Storage>(storage: &mut S, diff: &StateDiff) {
    for entry in &diff.entries {
        let key = StateStore::prefixed(&entry.key);
        match &entry.after {
            Some(value) => storage.put(&key, value),
            None => storage.delete(&key),
        }
    }
}

/// Restore the `before` side of a diff
pub(crate) fn revert_diff<S: Storage>(storage: &mut S, diff: &StateDiff) {
    for entry in diff.entries.iter().rev() {
        let key = StateStore::prefixed(&entry.key);
        match &entry.before {
            Some(value) => storage.put(&key, value),
            None => storage.delete(&key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_overlay_reads_own_writes() {
        let mut storage = MemoryStorage::new();
        storage.put(b"st:balance", b"10");
        storage.commit().unwrap();

        let mut store = StateStore::new(&storage);
        assert_eq!(store.get(b"balance"), Some(b"10".to_vec()));

        store.set(b"balance", b"5".to_vec());
        store.delete(b"nonce");
        assert_eq!(store.get(b"balance"), Some(b"5".to_vec()));
        assert_eq!(store.get(b"nonce"), None);
        assert_eq!(storage.get(b"st:balance"), Some(b"10".to_vec()));
    }

    #[test]
    fn test_diff_skips_noop_changes() {
        let mut storage = MemoryStorage::new();
        storage.put(b"st:a", b"1");
        storage.commit().unwrap();

        let mut store = StateStore::new(&storage);
        store.set(b"a", b"1".to_vec());
        store.set(b"b", b"2".to_vec());
        store.delete(b"missing");

        let diff = store.into_diff();
        assert_eq!(
            diff.entries,
            vec![DiffEntry {
                key: b"b".to_vec(),
                before: None,
                after: Some(b"2".to_vec()),
            }]
        );
    }

    #[test]
    fn test_apply_then_revert_restores_state() {
        let mut storage = MemoryStorage::new();
        storage.put(b"st:a", b"1");
        storage.commit().unwrap();

        let diff = {
            let mut store = StateStore::new(&storage);
            store.set_value(b"a", &2u64).unwrap();
            store.set(b"b", b"new".to_vec());
            store.into_diff()
        };

        apply_diff(&mut storage, &diff);
        storage.commit().unwrap();
        assert!(storage.exists(b"st:b"));

        revert_diff(&mut storage, &diff);
        storage.commit().unwrap();
        assert_eq!(storage.get(b"st:a"), Some(b"1".to_vec()));
        assert!(!storage.exists(b"st:b"));
    }
}
