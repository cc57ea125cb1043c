//! # docindex
//!
//! Wiring between configuration, the in-memory stores and the engine, used
//! by the `docindex` binary and its integration tests.
//!
//! ```text
//! config.toml ─► IndexSpec ─► IndexingEngine ◄─ documents.json
//!                                   │
//!                              NodeView / placements
//! ```

pub mod app;
pub mod config;

pub use app::{check_expressions, install_indexes, load_documents, render_tree, Workspace};
pub use config::{Config, IndexSpec, NodeSpec};
