//! Startup validation of persisted canvas state
//!
//! Runs before the canvas engine hydrates its document. A document value
//! that is not syntactically valid JSON would make hydration fail on every
//! launch, so the whole storage namespace is cleared instead.

use std::sync::Arc;

use super::storage::{KeyValueStore, Namespace};

/// Validates the persisted document once per application session
pub struct StorageValidator {
    store: Arc<dyn KeyValueStore>,
    namespace: Namespace,
    /// Verdict of the first validation in this session
    verdict: Option<bool>,
}

impl StorageValidator {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: Namespace) -> Self {
        Self {
            store,
            namespace,
            verdict: None,
        }
    }

    /// Check the persisted document, clearing the namespace if it is corrupt.
    ///
    /// Returns `true` when the value is absent, parses or cannot be read,
    /// `false` when it had to be cleared.
    pub fn validate(&self) -> bool {
        let key = self.namespace.document_key();

        let data = match self.store.get(&key) {
            Ok(Some(data)) if !data.is_empty() => data,
            Ok(_) => return true,
            Err(e) => {
                // Only malformed data is cleared; a read failure is left to hydration
                tracing::error!("Could not read persisted document {}: {}", key, e);
                return true;
            }
        };

        match serde_json::from_slice::<serde_json::Value>(&data) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Corrupted persisted document detected, clearing: {}", e);
                self.clear_namespace();
                false
            }
        }
    }

    /// Validate on the first call of the session; later calls return the
    /// first verdict without touching storage
    pub fn ensure_valid(&mut self) -> bool {
        if let Some(verdict) = self.verdict {
            return verdict;
        }
        let verdict = self.validate();
        self.verdict = Some(verdict);
        verdict
    }

    fn clear_namespace(&self) {
        match self.namespace.clear(self.store.as_ref()) {
            Ok(removed) => tracing::info!("Cleared {} persisted keys", removed),
            Err(e) => tracing::error!("Failed to clear persisted storage: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::canvas::CanvasEditor;
    use crate::core::document::Document;
    use crate::core::storage::{MemoryStore, StorageError};

    const KEY: &str = "TLDRAW_DOCUMENT_v1infinite-canvas-v1";

    fn validator(store: &Arc<MemoryStore>) -> StorageValidator {
        StorageValidator::new(store.clone(), Namespace::new("infinite-canvas-v1"))
    }

    #[test]
    fn test_absent_document_is_valid() {
        let store = Arc::new(MemoryStore::new());
        store.set("unrelated", b"value").unwrap();

        assert!(validator(&store).validate());
        assert_eq!(store.keys().unwrap(), vec!["unrelated".to_string()]);
    }

    #[test]
    fn test_valid_document_is_untouched() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY, br#"{"schema_version":1,"shapes":[]}"#).unwrap();
        store.set("tldraw_session", b"{}").unwrap();

        assert!(validator(&store).validate());
        assert_eq!(store.keys().unwrap().len(), 2);
        assert_eq!(
            store.get(KEY).unwrap(),
            Some(br#"{"schema_version":1,"shapes":[]}"#.to_vec())
        );
    }

    #[test]
    fn test_malformed_values_clear_the_namespace() {
        let malformed: [&[u8]; 4] = [
            b"invalid json {{{",
            b"{\"unterminated\": ",
            b"\xff\xfe\x00garbage",
            b"[1, 2,]",
        ];

        for value in malformed {
            let store = Arc::new(MemoryStore::new());
            store.set(KEY, value).unwrap();
            store.set("TLDRAW_USER_DATA_v3", b"{}").unwrap();
            store.set("tldraw_prefs", b"{}").unwrap();
            store.set("other-infinite-canvas-v1-cache", b"{}").unwrap();
            store.set("theme", b"dark").unwrap();

            let validator = validator(&store);
            assert!(!validator.validate());
            assert_eq!(store.keys().unwrap(), vec!["theme".to_string()]);

            // Repeated calls after the clear are no-ops
            assert!(validator.validate());
            assert_eq!(store.keys().unwrap(), vec!["theme".to_string()]);
        }
    }

    #[test]
    fn test_empty_value_counts_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY, b"").unwrap();

        assert!(validator(&store).validate());
        assert_eq!(store.keys().unwrap(), vec![KEY.to_string()]);
    }

    struct UnreadableStore {
        inner: MemoryStore,
    }

    impl KeyValueStore for UnreadableStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Err(StorageError::Read {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        }
        fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
        fn keys(&self) -> Result<Vec<String>, StorageError> {
            self.inner.keys()
        }
    }

    #[test]
    fn test_read_failure_keeps_the_namespace() {
        let store = Arc::new(UnreadableStore {
            inner: MemoryStore::new(),
        });
        store.set(KEY, br#"{"schema_version":1}"#).unwrap();
        store.set("tldraw_prefs", b"{}").unwrap();

        let validator = StorageValidator::new(store.clone(), Namespace::new("infinite-canvas-v1"));

        assert!(validator.validate());
        assert_eq!(store.keys().unwrap().len(), 2);
    }

    #[test]
    fn test_hydration_after_clear_yields_default_document() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY, b"invalid json {{{").unwrap();

        let mut validator = validator(&store);
        assert!(!validator.ensure_valid());

        let editor = CanvasEditor::hydrate(
            store.clone(),
            &Namespace::new("infinite-canvas-v1"),
            Duration::from_millis(500),
        )
        .unwrap();
        let fresh = Document::new();
        let snapshot = editor.get_snapshot();
        assert!(snapshot.shapes.is_empty());
        assert_eq!(snapshot.pages, fresh.pages);
        assert_eq!(snapshot.camera, fresh.camera);
        assert!(editor.current_page_shape_ids().is_empty());
    }

    struct CountingStore {
        inner: MemoryStore,
        reads: AtomicUsize,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
        fn keys(&self) -> Result<Vec<String>, StorageError> {
            self.inner.keys()
        }
    }

    #[test]
    fn test_ensure_valid_runs_once_per_session() {
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            reads: AtomicUsize::new(0),
        });
        store.set(KEY, b"not json").unwrap();

        let mut validator =
            StorageValidator::new(store.clone(), Namespace::new("infinite-canvas-v1"));

        assert!(!validator.ensure_valid());
        assert!(!validator.ensure_valid());
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert!(store.keys().unwrap().is_empty());
    }
}
