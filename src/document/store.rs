//! Document State Tracker
//!
//! One authoritative [`Document`] per URI. Updates swap in a complete new
//! snapshot under the write lock, so concurrent readers always observe a
//! fully-formed document.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{ContentChange, Document};
use crate::error::DocumentError;

#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: RwLock<HashMap<String, Arc<Document>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened document.
    ///
    /// Re-opening a URI that is already tracked is idempotent: the existing
    /// snapshot is kept and returned.
    pub async fn open(
        &self,
        uri: &str,
        language_id: &str,
        version: i32,
        text: String,
    ) -> Arc<Document> {
        let mut docs = self.docs.write().await;
        if let Some(existing) = docs.get(uri) {
            tracing::warn!("Document already open, keeping tracked state: {}", uri);
            return Arc::clone(existing);
        }
        let doc = Arc::new(Document::new(uri, language_id, version, text));
        docs.insert(uri.to_string(), Arc::clone(&doc));
        tracing::debug!("Opened document {} (version {})", uri, version);
        doc
    }

    /// Apply content changes, replacing the snapshot atomically.
    pub async fn change(
        &self,
        uri: &str,
        changes: &[ContentChange],
        version: i32,
    ) -> Result<Arc<Document>, DocumentError> {
        let mut docs = self.docs.write().await;
        let current = docs
            .get(uri)
            .ok_or_else(|| DocumentError::NotOpen(uri.to_string()))?;
        let next = Arc::new(current.with_changes(changes, version)?);
        docs.insert(uri.to_string(), Arc::clone(&next));
        tracing::trace!("Document {} now at version {}", uri, version);
        Ok(next)
    }

    /// Record a save. When the client includes the full text, the tracked
    /// content is refreshed from it.
    pub async fn save(
        &self,
        uri: &str,
        text: Option<String>,
    ) -> Result<Arc<Document>, DocumentError> {
        let mut docs = self.docs.write().await;
        let current = docs
            .get(uri)
            .ok_or_else(|| DocumentError::NotOpen(uri.to_string()))?;
        let doc = match text {
            Some(text) if text != current.content() => {
                let next = Arc::new(current.with_changes(
                    &[ContentChange::Full { text }],
                    current.version(),
                )?);
                docs.insert(uri.to_string(), Arc::clone(&next));
                next
            }
            _ => Arc::clone(current),
        };
        tracing::debug!("Document saved: {}", uri);
        Ok(doc)
    }

    /// Stop tracking a URI entirely.
    pub async fn close(&self, uri: &str) -> Result<(), DocumentError> {
        self.docs
            .write()
            .await
            .remove(uri)
            .map(|_| tracing::debug!("Closed document {}", uri))
            .ok_or_else(|| DocumentError::NotOpen(uri.to_string()))
    }

    pub async fn get(&self, uri: &str) -> Option<Arc<Document>> {
        self.docs.read().await.get(uri).cloned()
    }

    pub async fn list(&self) -> Vec<Arc<Document>> {
        self.docs.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_get_close() {
        let store = DocumentStore::new();
        store
            .open("file:///a.rs", "rust", 1, "fn main() {}".to_string())
            .await;
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.get("file:///a.rs").await.unwrap().content(),
            "fn main() {}"
        );

        store.close("file:///a.rs").await.unwrap();
        assert!(store.get("file:///a.rs").await.is_none());
        assert!(matches!(
            store.close("file:///a.rs").await,
            Err(DocumentError::NotOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let store = DocumentStore::new();
        store
            .open("file:///a.rs", "rust", 1, "original".to_string())
            .await;
        let doc = store
            .open("file:///a.rs", "rust", 9, "other".to_string())
            .await;
        assert_eq!(doc.content(), "original");
        assert_eq!(doc.version(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_change_replaces_snapshot() {
        let store = DocumentStore::new();
        let first = store
            .open("file:///a.rs", "rust", 1, "ab\ncd".to_string())
            .await;
        let second = store
            .change(
                "file:///a.rs",
                &[ContentChange::Incremental {
                    offset: 0,
                    length: 2,
                    text: "xyz".to_string(),
                }],
                2,
            )
            .await
            .unwrap();

        assert_eq!(second.content(), "xyz\ncd");
        assert_eq!(second.version(), 2);
        // The previously handed-out snapshot is unchanged.
        assert_eq!(first.content(), "ab\ncd");
        assert!(Arc::ptr_eq(
            &store.get("file:///a.rs").await.unwrap(),
            &second
        ));
    }

    #[tokio::test]
    async fn test_change_unknown_uri() {
        let store = DocumentStore::new();
        assert!(matches!(
            store
                .change("file:///nope.rs", &[], 1)
                .await,
            Err(DocumentError::NotOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_save_refreshes_content() {
        let store = DocumentStore::new();
        store
            .open("file:///a.rs", "rust", 3, "draft".to_string())
            .await;
        let saved = store
            .save("file:///a.rs", Some("flushed".to_string()))
            .await
            .unwrap();
        assert_eq!(saved.content(), "flushed");
        assert_eq!(saved.version(), 3);

        let untouched = store.save("file:///a.rs", None).await.unwrap();
        assert_eq!(untouched.content(), "flushed");
    }

    #[tokio::test]
    async fn test_list_tracks_all_documents() {
        let store = DocumentStore::new();
        store.open("file:///a.rs", "rust", 1, "a".to_string()).await;
        store.open("file:///b.rs", "rust", 1, "b".to_string()).await;
        let mut uris: Vec<_> = store
            .list()
            .await
            .iter()
            .map(|d| d.uri().to_string())
            .collect();
        uris.sort();
        assert_eq!(uris, vec!["file:///a.rs", "file:///b.rs"]);
    }
}
