//! Storage backends for the document index engine.
//!
//! - [`MemoryIndexStore`]: index state held in memory, one exclusive lease
//!   per index
//! - [`MemoryDocumentStore`]: a document collection usable as the engine's
//!   [`DocumentSource`](docindex_core::DocumentSource)
//!
//! # Example
//!
//! ```rust
//! use docindex_core::{IndexState, IndexStore, NewIndex};
//! use docindex_store::MemoryIndexStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryIndexStore::new();
//! let id = store.insert_index(IndexState::new(NewIndex::new("Tags", "tags"))).await?;
//!
//! let lease = store.lease(id).await?.expect("index exists");
//! assert_eq!(lease.index.slug, "tags");
//! store.commit(lease).await?;
//! # Ok(())
//! # }
//! ```

pub mod documents;
pub mod memory;

pub use documents::MemoryDocumentStore;
pub use memory::MemoryIndexStore;
