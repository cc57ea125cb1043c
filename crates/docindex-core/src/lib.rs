//! # docindex-core
//!
//! Core types, trees and traits for the document index engine.
//!
//! An [`Index`] owns a [`TemplateTree`] of authored expression nodes and an
//! [`InstanceTree`] derived from evaluating those expressions against
//! documents:
//!
//! ```text
//! Document ─► ExpressionEvaluator ─► labels ─► InstanceTree
//!                    ▲                             │
//!              TemplateTree                    placements
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Document`] | Attributes read by expressions |
//! | [`Index`] | Label, slug and switches of one scheme |
//! | [`TemplateTree`] | Authored arena with an implicit root |
//! | [`InstanceTree`] | Materialized arena with document placements |
//! | [`IndexState`] | Everything one lease protects |
//!
//! ## Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`ExpressionEvaluator`] | Evaluate a node against a document |
//! | [`DocumentSource`] | Enumerate documents for rebuilds |
//! | [`IndexStore`] | Per-index leases over stored state |

pub mod error;
pub mod instance;
pub mod template;
pub mod traits;
pub mod types;

pub use error::{Error, EvaluationError, Missing, Result, StoreError};
pub use instance::{InstanceNode, InstanceTree, SiblingKey, ROOT_INSTANCE};
pub use template::{NewTemplateNode, TemplateNode, TemplateTree};
pub use traits::*;
pub use types::*;
