//! Core traits for the engine's collaborators.
//!
//! - [`ExpressionEvaluator`]: turn a template node's expression into labels
//! - [`DocumentSource`]: enumerate and fetch documents for rebuilds
//! - [`IndexStore`]: hold index state behind per-index exclusive leases
//!
//! The engine only talks to these traits, so evaluators and stores can be
//! swapped without touching the reindexing algorithm.

use async_trait::async_trait;
use std::ops::{Deref, DerefMut};
use tokio::sync::OwnedMutexGuard;

use crate::error::{EvaluationError, StoreError};
use crate::template::TemplateNode;
use crate::types::{Document, DocumentId, IndexId, IndexState};

// ============================================================================
// Expression Evaluation
// ============================================================================

/// Evaluates template node expressions against documents.
///
/// Implementations must be pure: the same expression and document
/// attributes always give the same labels.
pub trait ExpressionEvaluator: Send + Sync {
    /// Name of this evaluator.
    fn name(&self) -> &str;

    /// Check an expression without evaluating it.
    fn validate(&self, _expression: &str) -> Result<(), EvaluationError> {
        Ok(())
    }

    /// Evaluate a node against a document. An empty result means the
    /// document does not match the node.
    fn evaluate(
        &self,
        node: &TemplateNode,
        document: &Document,
    ) -> Result<Vec<String>, EvaluationError>;
}

// ============================================================================
// Documents
// ============================================================================

/// Read access to the document subsystem.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Ids of every document currently known.
    async fn document_ids(&self) -> Result<Vec<DocumentId>, StoreError>;

    /// Fetch a document; `None` if it was deleted meanwhile.
    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError>;
}

// ============================================================================
// Index Storage
// ============================================================================

/// Exclusive access to one index's state until committed or dropped.
///
/// Reads see the stored state. The first write clones it into a working
/// copy, and only [`write_back`](Self::write_back) replaces the stored
/// state with that copy. Dropping the lease discards every change.
pub struct IndexLease {
    guard: OwnedMutexGuard<IndexState>,
    working: Option<IndexState>,
}

impl IndexLease {
    /// Wrap a held lock on the stored state.
    #[must_use]
    pub fn new(guard: OwnedMutexGuard<IndexState>) -> Self {
        Self {
            guard,
            working: None,
        }
    }

    /// True once the lease has been written through.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.working.is_some()
    }

    /// Replace the stored state with the working copy and release the
    /// lock. Returns false if nothing was written.
    pub fn write_back(self) -> bool {
        let Self { mut guard, working } = self;
        match working {
            Some(state) => {
                *guard = state;
                true
            }
            None => false,
        }
    }
}

impl Deref for IndexLease {
    type Target = IndexState;

    fn deref(&self) -> &IndexState {
        match &self.working {
            Some(state) => state,
            None => &*self.guard,
        }
    }
}

impl DerefMut for IndexLease {
    fn deref_mut(&mut self) -> &mut IndexState {
        let Self { guard, working } = self;
        working.get_or_insert_with(|| IndexState::clone(&**guard))
    }
}

/// Transactional storage for index state.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Store a new index. Fails with [`StoreError::Duplicate`] on a taken slug.
    async fn insert_index(&self, state: IndexState) -> Result<IndexId, StoreError>;

    /// Delete an index with its template and instance trees. Returns false
    /// if it did not exist.
    async fn remove_index(&self, id: IndexId) -> Result<bool, StoreError>;

    /// Ids of all indexes in creation order.
    async fn index_ids(&self) -> Result<Vec<IndexId>, StoreError>;

    /// Resolve a slug.
    async fn find_by_slug(&self, slug: &str) -> Result<Option<IndexId>, StoreError>;

    /// Move an index to a new slug. Fails with [`StoreError::Duplicate`] if
    /// another index holds it.
    async fn rename_slug(&self, id: IndexId, slug: &str) -> Result<(), StoreError>;

    /// Acquire the index's lease, waiting for any current holder.
    async fn lease(&self, id: IndexId) -> Result<Option<IndexLease>, StoreError>;

    /// Persist the leased state and release the lease. A lease dropped
    /// without a commit leaves the stored state as it was.
    async fn commit(&self, lease: IndexLease) -> Result<(), StoreError>;
}
