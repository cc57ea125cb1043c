//! Expression evaluation for the document index engine.
//!
//! Provides [`FieldPathEvaluator`], the default
//! [`ExpressionEvaluator`](docindex_core::ExpressionEvaluator). Expressions
//! read a document attribute (or a literal) and pass it through filters:
//!
//! ```text
//! doc.tag_list
//! doc.metadata.client | lower
//! doc.date_added | date:"%Y"
//! doc.keywords | split:"," | trim
//! doc.department | default:"Unfiled"
//! 'Everything'
//! ```
//!
//! Multi-valued attributes (JSON arrays) yield one label per element.

pub mod evaluator;
pub mod parser;

pub use evaluator::FieldPathEvaluator;
pub use parser::{parse, Expression, Filter, Source};
