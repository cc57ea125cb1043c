//! In-memory document collection.

use async_trait::async_trait;
use docindex_core::{Document, DocumentId, DocumentSource, StoreError};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Documents keyed by id, enumerated in id order.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<DocumentId, Document>>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a batch of documents. Later duplicates win.
    #[must_use]
    pub fn from_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let map = documents.into_iter().map(|doc| (doc.id, doc)).collect();
        Self {
            documents: RwLock::new(map),
        }
    }

    /// Insert or replace a document. Returns the previous version.
    pub async fn upsert(&self, document: Document) -> Option<Document> {
        debug!("Upserted document {}", document.id);
        self.documents.write().await.insert(document.id, document)
    }

    pub async fn remove(&self, id: DocumentId) -> Option<Document> {
        self.documents.write().await.remove(&id)
    }

    pub async fn get(&self, id: DocumentId) -> Option<Document> {
        self.documents.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentStore {
    async fn document_ids(&self) -> Result<Vec<DocumentId>, StoreError> {
        Ok(self.documents.read().await.keys().copied().collect())
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.get(id).await)
    }
}
