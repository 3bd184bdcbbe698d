use super::{Storage, WriteBuffer};
use crate::error::StateError;

/// In-memory storage, used by tests and ephemeral nodes
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    buffer: WriteBuffer,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    /// Number of committed keys
    pub fn len(&self) -> usize {
        self.buffer.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.data.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.buffer.get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.buffer.stage(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.buffer.stage(key, None);
    }

    fn commit(&mut self) -> Result<(), StateError> {
        self.buffer.apply();
        Ok(())
    }

    fn rollback(&mut self) {
        self.buffer.discard();
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.keys_with_prefix(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_writes_visible_until_rollback() {
        let mut storage = MemoryStorage::new();

        storage.put(b"blk:1", b"block");
        assert_eq!(storage.get(b"blk:1"), Some(b"block".to_vec()));
        assert!(storage.is_empty());

        storage.rollback();
        assert_eq!(storage.get(b"blk:1"), None);
    }

    #[test]
    fn test_delete_then_commit() {
        let mut storage = MemoryStorage::new();
        storage.put(b"tip", b"a");
        storage.commit().unwrap();

        storage.delete(b"tip");
        assert!(!storage.exists(b"tip"));
        storage.rollback();
        assert!(storage.exists(b"tip"));

        storage.delete(b"tip");
        storage.commit().unwrap();
        assert!(!storage.exists(b"tip"));
        assert_eq!(storage.len(), 0);
    }

    #[test]
    fn test_prefix_query_merges_pending() {
        let mut storage = MemoryStorage::new();
        storage.put(b"tmp:1", b"a");
        storage.put(b"tmp:3", b"c");
        storage.put(b"blk:1", b"x");
        storage.commit().unwrap();

        storage.put(b"tmp:2", b"b");
        storage.delete(b"tmp:3");

        assert_eq!(
            storage.keys_with_prefix(b"tmp:"),
            vec![b"tmp:1".to_vec(), b"tmp:2".to_vec()]
        );
    }
}
