//! Reindexing engine for document indexes.
//!
//! [`IndexingEngine`] keeps each index's instance tree in step with the
//! documents and the index's template tree:
//!
//! - indexing: [`reindex`](IndexingEngine::reindex),
//!   [`reindex_all`](IndexingEngine::reindex_all),
//!   [`rebuild`](IndexingEngine::rebuild),
//!   [`remove_document`](IndexingEngine::remove_document)
//! - authoring: index and template node edits, each followed by a rebuild
//! - reading: [`tree`](IndexingEngine::tree), [`node`](IndexingEngine::node),
//!   [`node_by_path`](IndexingEngine::node_by_path),
//!   [`document_placements`](IndexingEngine::document_placements)
//!
//! [`EventDispatcher`] applies document lifecycle events in order from a
//! background task.
//!
//! # Example
//!
//! ```rust
//! use docindex_core::{Document, NewIndex, NewTemplateNode};
//! use docindex_engine::{EngineConfig, IndexingEngine};
//! use docindex_expr::FieldPathEvaluator;
//! use docindex_store::{MemoryDocumentStore, MemoryIndexStore};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> docindex_core::Result<()> {
//! let engine = IndexingEngine::new(
//!     Arc::new(MemoryIndexStore::new()),
//!     Arc::new(MemoryDocumentStore::new()),
//!     Arc::new(FieldPathEvaluator::new()),
//!     EngineConfig::default(),
//! );
//!
//! let tags = engine.create_index(NewIndex::new("Tags", "tags")).await?;
//! let root = engine.template_tree(tags.id).await?.root();
//! engine
//!     .create_template_node(tags.id, root, NewTemplateNode::new("doc.tag_list").linking(), None)
//!     .await?;
//!
//! let doc = Document::new(1, "invoice").with_attribute("tag_list", json!(["invoice", "2024"]));
//! engine.reindex(&doc, tags.id).await?;
//!
//! let tree = engine.tree(tags.id).await?;
//! assert_eq!(tree.children.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod authoring;
pub mod dispatcher;
pub mod engine;
pub mod reader;
pub mod walk;

#[cfg(test)]
mod test_support;

pub use authoring::IndexPatch;
pub use dispatcher::{DocumentEvent, EventDispatcher};
pub use engine::{CancellationFlag, EngineConfig, IndexUpdate, IndexingEngine};
pub use reader::{DocumentPlacement, NodeDetail, NodeSummary, NodeView};
pub use walk::{normalize_labels, EvaluationFailure, ReindexOutcome};
