//! Persisted key-value storage for canvas documents
//!
//! Documents are stored under a namespaced key derived from the configured
//! persistence key. Natively every key is one file inside the storage
//! directory; tests use the in-memory store.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

/// Prefix of the key holding the serialized document
pub const DOCUMENT_KEY_PREFIX: &str = "TLDRAW_DOCUMENT_v1";

/// Legacy prefix shared by every key the storage subsystem has ever written
pub const LEGACY_PREFIX: &str = "tldraw";

/// Errors raised by a key-value store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read key `{key}`: {source}")]
    Read { key: String, source: io::Error },
    #[error("failed to write key `{key}`: {source}")]
    Write { key: String, source: io::Error },
    #[error("failed to remove key `{key}`: {source}")]
    Remove { key: String, source: io::Error },
    #[error("failed to list keys in {}: {source}", .dir.display())]
    List { dir: PathBuf, source: io::Error },
}

/// Byte-oriented persisted storage shared by the engine, the validator and
/// the fault boundary
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove `key`; removing an absent key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// List every key currently present
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// The storage namespace of one persistence key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    persistence_key: String,
}

impl Namespace {
    pub fn new(persistence_key: impl Into<String>) -> Self {
        Self {
            persistence_key: persistence_key.into(),
        }
    }

    /// Key holding the serialized document
    pub fn document_key(&self) -> String {
        format!("{}{}", DOCUMENT_KEY_PREFIX, self.persistence_key)
    }

    /// Whether `key` belongs to this namespace or to the legacy one
    pub fn contains(&self, key: &str) -> bool {
        if !self.persistence_key.is_empty() && key.contains(&self.persistence_key) {
            return true;
        }
        key.get(..LEGACY_PREFIX.len())
            .map(|prefix| prefix.eq_ignore_ascii_case(LEGACY_PREFIX))
            .unwrap_or(false)
    }

    /// Remove every key of the namespace, returning how many were removed.
    ///
    /// Keeps going after a failed removal so one bad entry cannot leave the
    /// rest of the namespace behind; the first error is returned afterwards.
    pub fn clear(&self, store: &dyn KeyValueStore) -> Result<usize, StorageError> {
        let mut removed = 0;
        let mut first_error = None;

        for key in store.keys()? {
            if !self.contains(&key) {
                continue;
            }
            match store.remove(&key) {
                Ok(()) => {
                    tracing::debug!("Removed persisted key {}", key);
                    removed += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to remove persisted key {}: {}", key, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}

/// In-memory store, used by tests and as a fallback when no storage
/// directory can be opened
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A poisoned map is still a consistent map: every operation is a
        // single insert or remove.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries().keys().cloned().collect())
    }
}

/// Directory-backed store: one file per key
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a storage directory
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|source| StorageError::List {
            dir: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(encode_key(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp_path = self.dir.join(format!("{}{}", encode_key(key), TMP_SUFFIX));
        let write_err = |source| StorageError::Write {
            key: key.to_string(),
            source,
        };

        fs::write(&tmp_path, value).map_err(write_err)?;
        fs::rename(&tmp_path, &path).map_err(write_err)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Remove {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| StorageError::List {
            dir: self.dir.clone(),
            source,
        })?;

        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }
            if let Some(key) = decode_key(&name) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Suffix of in-flight writes. Encoded keys only put hex digits after `%`,
/// so no key maps to a name ending in it.
const TMP_SUFFIX: &str = "%tmp";

fn encode_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

fn decode_key(name: &str) -> Option<String> {
    urlencoding::decode(name).ok().map(|key| key.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_key_uses_persistence_key() {
        let ns = Namespace::new("infinite-canvas-v1");
        assert_eq!(ns.document_key(), "TLDRAW_DOCUMENT_v1infinite-canvas-v1");
    }

    #[test]
    fn test_namespace_membership() {
        let ns = Namespace::new("infinite-canvas-v1");
        assert!(ns.contains("TLDRAW_DOCUMENT_v1infinite-canvas-v1"));
        assert!(ns.contains("TLDRAW_USER_DATA_v3"));
        assert!(ns.contains("tldraw_session_state"));
        assert!(ns.contains("TlDraw-mixed-case"));
        assert!(ns.contains("session-infinite-canvas-v1"));
        assert!(!ns.contains("theme"));
        assert!(!ns.contains("my-tldraw"));
    }

    #[test]
    fn test_clear_removes_only_namespace_keys() {
        let store = MemoryStore::new();
        store.set("TLDRAW_DOCUMENT_v1infinite-canvas-v1", b"{}").unwrap();
        store.set("tldraw_prefs", b"1").unwrap();
        store.set("theme", b"dark").unwrap();

        let removed = Namespace::new("infinite-canvas-v1").clear(&store).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.keys().unwrap(), vec!["theme".to_string()]);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert_eq!(store.get("missing").unwrap(), None);

        store.set("TLDRAW_DOCUMENT_v1infinite-canvas-v1", b"{\"a\":1}").unwrap();
        store.set("odd/key:with spaces", b"x").unwrap();

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "TLDRAW_DOCUMENT_v1infinite-canvas-v1".to_string(),
                "odd/key:with spaces".to_string(),
            ]
        );
        assert_eq!(
            store.get("odd/key:with spaces").unwrap(),
            Some(b"x".to_vec())
        );

        store.remove("odd/key:with spaces").unwrap();
        store.remove("odd/key:with spaces").unwrap();
        assert_eq!(store.keys().unwrap().len(), 1);
    }

    #[test]
    fn test_key_encoding() {
        assert_eq!(encode_key("a.b/c d"), "a.b%2Fc%20d");
        assert_eq!(decode_key("a.b%2Fc%20d").as_deref(), Some("a.b/c d"));
        assert_eq!(decode_key("%FF%FE"), None);
        assert!(!encode_key("x%tmp").ends_with(TMP_SUFFIX));
    }

    #[test]
    fn test_dotted_keys_survive_pending_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("backup.tmp", b"1").unwrap();
        fs::write(dir.path().join(format!("other{}", TMP_SUFFIX)), b"partial").unwrap();

        assert_eq!(store.keys().unwrap(), vec!["backup.tmp".to_string()]);
        assert_eq!(store.get("backup.tmp").unwrap(), Some(b"1".to_vec()));
    }
}
