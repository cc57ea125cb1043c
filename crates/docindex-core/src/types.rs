//! Core types for the document index engine.
//!
//! ## Identifiers
//! - [`IndexId`], [`TemplateNodeId`]: generated for authored entities
//! - [`InstanceNodeId`]: allocated by the instance arena
//! - [`DocumentId`]: supplied by the document subsystem
//!
//! ## Documents
//! - [`Document`]: the attributes an expression reads
//!
//! ## Indexes
//! - [`Index`]: identity and switches of one classification scheme
//! - [`IndexState`]: an index together with its template and instance trees
//! - [`EngineStats`]: counters maintained by the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::instance::InstanceTree;
use crate::template::TemplateTree;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of an [`Index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexId(pub Uuid);

impl IndexId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IndexId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a template node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateNodeId(pub Uuid);

impl TemplateNodeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TemplateNodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TemplateNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of an instance node. Unique within one instance tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceNodeId(pub u64);

impl fmt::Display for InstanceNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of a document owned by the document subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Documents
// ============================================================================

/// A document as seen by the engine: an id, a type and an attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier assigned by the document subsystem
    pub id: DocumentId,
    /// Document type name, matched against [`Index::document_types`]
    #[serde(default)]
    pub document_type: String,
    /// Attributes readable by expressions
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Document {
    /// Create a document with no attributes.
    pub fn new(id: u64, document_type: impl Into<String>) -> Self {
        Self {
            id: DocumentId(id),
            document_type: document_type.into(),
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Resolve a dotted attribute path, descending through nested objects.
    #[must_use]
    pub fn attribute(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.attributes.get(*first)?;
        for segment in rest {
            current = match current {
                Value::Object(map) => map.get(*segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

// ============================================================================
// Indexes
// ============================================================================

/// Identity and switches of one classification scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub id: IndexId,
    /// Display label
    pub label: String,
    /// Unique, URL-safe name
    pub slug: String,
    /// Disabled indexes hold no documents
    pub enabled: bool,
    /// Document types this index applies to (empty = every type)
    #[serde(default)]
    pub document_types: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Completion time of the last full rebuild
    pub last_rebuilt_at: Option<DateTime<Utc>>,
}

impl Index {
    /// True when documents of `document_type` are classified by this index.
    #[must_use]
    pub fn applies_to(&self, document_type: &str) -> bool {
        self.document_types.is_empty() || self.document_types.iter().any(|t| t == document_type)
    }
}

/// Parameters for creating an index.
#[derive(Debug, Clone, Default)]
pub struct NewIndex {
    pub label: String,
    pub slug: String,
    pub enabled: bool,
    pub document_types: Vec<String>,
}

impl NewIndex {
    /// An enabled index for every document type.
    pub fn new(label: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            slug: slug.into(),
            enabled: true,
            document_types: Vec::new(),
        }
    }
}

/// An index with its template definition and its derived instance tree.
///
/// Held behind a per-index lease; everything reachable from here changes
/// together or not at all.
#[derive(Debug, Clone)]
pub struct IndexState {
    pub index: Index,
    pub templates: TemplateTree,
    pub instances: InstanceTree,
}

impl IndexState {
    /// Create the state for a new index with an implicit template root and
    /// an empty instance tree.
    #[must_use]
    pub fn new(spec: NewIndex) -> Self {
        let templates = TemplateTree::new();
        let instances = InstanceTree::new(templates.root());
        Self {
            index: Index {
                id: IndexId::new(),
                label: spec.label,
                slug: spec.slug,
                enabled: spec.enabled,
                document_types: spec.document_types,
                created_at: Utc::now(),
                last_rebuilt_at: None,
            },
            templates,
            instances,
        }
    }

    #[must_use]
    pub fn id(&self) -> IndexId {
        self.index.id
    }
}

/// Counters maintained by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Per-index reindex passes completed
    pub documents_reindexed: u64,
    /// Evaluation failures treated as no-match
    pub evaluation_failures: u64,
    /// Instance nodes removed by pruning
    pub nodes_pruned: u64,
    /// Full rebuilds completed
    pub rebuilds: u64,
    pub last_update: Option<DateTime<Utc>>,
}
