use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use concord_core::serialize;
use tracing::debug;

use super::{Storage, WriteBuffer};
use crate::error::StateError;

/// File-backed storage using a single snapshot file, rewritten atomically
/// (write to temp file, then rename) on every commit.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    buffer: WriteBuffer,
}

impl FileStorage {
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self, StateError> {
        let path = path.into();
        let data: BTreeMap<Vec<u8>, Vec<u8>> = match fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => serialize::from_bytes(&bytes)?,
            Ok(_) => BTreeMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StateError::Storage(e.to_string())),
        };
        debug!("Opened {:?} with {} keys", path, data.len());

        Ok(FileStorage {
            path,
            buffer: WriteBuffer::with_data(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush_to_disk(&self) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StateError::Storage(e.to_string()))?;
        }

        let bytes = serialize::to_bytes(&self.buffer.data)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &bytes).map_err(|e| StateError::Storage(e.to_string()))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| StateError::Storage(e.to_string()))?;
        Ok(())
    }
}

impl Storage for FileStorage {
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
        self.flush_to_disk()
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
    use rand::Rng;

    fn temp_path() -> PathBuf {
        let suffix: u64 = rand::thread_rng().gen();
        std::env::temp_dir().join(format!("concord-storage-{suffix}.bin"))
    }

    #[test]
    fn test_commit_survives_reopen() {
        let path = temp_path();
        {
            let mut storage = FileStorage::new(&path).unwrap();
            storage.put(b"chain:final", &7u64.to_be_bytes());
            storage.put(b"chain:tip", b"x");
            storage.commit().unwrap();
            storage.put(b"lost", b"y");
        }

        let reopened = FileStorage::new(&path).unwrap();
        assert_eq!(
            reopened.get(b"chain:final"),
            Some(7u64.to_be_bytes().to_vec())
        );
        assert!(reopened.exists(b"chain:tip"));
        assert!(!reopened.exists(b"lost"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let storage = FileStorage::new(temp_path()).unwrap();
        assert!(storage.keys_with_prefix(b"").is_empty());
    }
}
