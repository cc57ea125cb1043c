//! Instance tree: the materialized classification of documents.
//!
//! Nodes live in an arena keyed by [`InstanceNodeId`]. Children of a node
//! are keyed by [`SiblingKey`] (source template node + evaluated label), so
//! a parent can never hold two children with the same key. The tree also
//! keeps a reverse map from each document to the nodes it is attached to.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{Error, Missing, Result};
use crate::types::{DocumentId, InstanceNodeId, TemplateNodeId};

/// Reserved id of the instance root.
pub const ROOT_INSTANCE: InstanceNodeId = InstanceNodeId(1);

/// First id handed out to a non-root node.
const FIRST_NODE_ID: u64 = 2;

/// Key of a child among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SiblingKey {
    pub template: TemplateNodeId,
    pub label: String,
}

/// One materialized node.
#[derive(Debug, Clone)]
pub struct InstanceNode {
    pub id: InstanceNodeId,
    /// Parent node (`None` only for the root)
    pub parent: Option<InstanceNodeId>,
    /// Template node this instance was derived from
    pub template: TemplateNodeId,
    /// Evaluated value (empty for the root)
    pub label: String,
    documents: BTreeSet<DocumentId>,
    children: BTreeMap<SiblingKey, InstanceNodeId>,
}

impl InstanceNode {
    /// Documents attached directly to this node.
    #[must_use]
    pub fn documents(&self) -> &BTreeSet<DocumentId> {
        &self.documents
    }

    /// Children keyed by (template node, label).
    #[must_use]
    pub fn children(&self) -> &BTreeMap<SiblingKey, InstanceNodeId> {
        &self.children
    }

    /// No documents and no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.children.is_empty()
    }
}

/// Arena of instance nodes for one index.
#[derive(Debug, Clone)]
pub struct InstanceTree {
    root_template: TemplateNodeId,
    nodes: HashMap<InstanceNodeId, InstanceNode>,
    /// Document -> nodes it is attached to
    placements: HashMap<DocumentId, BTreeSet<InstanceNodeId>>,
    /// Next id to allocate; never reused, even across `clear`
    next_id: u64,
}

impl InstanceTree {
    /// Create a tree holding only the root, derived from the template root.
    #[must_use]
    pub fn new(root_template: TemplateNodeId) -> Self {
        let mut tree = Self {
            root_template,
            nodes: HashMap::new(),
            placements: HashMap::new(),
            next_id: FIRST_NODE_ID,
        };
        tree.insert_root();
        tree
    }

    fn insert_root(&mut self) {
        self.nodes.insert(
            ROOT_INSTANCE,
            InstanceNode {
                id: ROOT_INSTANCE,
                parent: None,
                template: self.root_template,
                label: String::new(),
                documents: BTreeSet::new(),
                children: BTreeMap::new(),
            },
        );
    }

    #[must_use]
    pub fn root(&self) -> InstanceNodeId {
        ROOT_INSTANCE
    }

    #[must_use]
    pub fn get(&self, id: InstanceNodeId) -> Option<&InstanceNode> {
        self.nodes.get(&id)
    }

    /// Number of nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Look up a child by key.
    #[must_use]
    pub fn child(
        &self,
        parent: InstanceNodeId,
        template: TemplateNodeId,
        label: &str,
    ) -> Option<InstanceNodeId> {
        let key = SiblingKey {
            template,
            label: label.to_string(),
        };
        self.nodes.get(&parent)?.children.get(&key).copied()
    }

    /// Insert a new child. Fails if a sibling with the same key exists.
    pub fn insert_child(
        &mut self,
        parent: InstanceNodeId,
        template: TemplateNodeId,
        label: &str,
    ) -> Result<InstanceNodeId> {
        let key = SiblingKey {
            template,
            label: label.to_string(),
        };
        let id = InstanceNodeId(self.next_id);
        let parent_node = self
            .nodes
            .get_mut(&parent)
            .ok_or(Error::NotFound(Missing::InstanceNode(parent)))?;
        if parent_node.children.contains_key(&key) {
            return Err(Error::StructuralConflict(format!(
                "instance node {parent} already has a child `{label}` for template node {template}"
            )));
        }
        parent_node.children.insert(key, id);
        self.next_id += 1;

        self.nodes.insert(
            id,
            InstanceNode {
                id,
                parent: Some(parent),
                template,
                label: label.to_string(),
                documents: BTreeSet::new(),
                children: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    /// Return the child with this key, creating it if absent. The flag is
    /// true when the node was created.
    pub fn get_or_create(
        &mut self,
        parent: InstanceNodeId,
        template: TemplateNodeId,
        label: &str,
    ) -> Result<(InstanceNodeId, bool)> {
        match self.child(parent, template, label) {
            Some(id) => Ok((id, false)),
            None => self.insert_child(parent, template, label).map(|id| (id, true)),
        }
    }

    /// Attach a document to a node. Returns false if it was already there.
    pub fn attach(&mut self, node: InstanceNodeId, document: DocumentId) -> Result<bool> {
        if node == ROOT_INSTANCE {
            return Err(Error::StructuralConflict(
                "documents cannot be attached to the instance root".to_string(),
            ));
        }
        let entry = self
            .nodes
            .get_mut(&node)
            .ok_or(Error::NotFound(Missing::InstanceNode(node)))?;
        let inserted = entry.documents.insert(document);
        if inserted {
            self.placements.entry(document).or_default().insert(node);
        }
        Ok(inserted)
    }

    /// Detach a document from a node. A missing node or membership is a
    /// no-op and returns false.
    pub fn detach(&mut self, node: InstanceNodeId, document: DocumentId) -> bool {
        let removed = self
            .nodes
            .get_mut(&node)
            .is_some_and(|entry| entry.documents.remove(&document));
        if let Some(nodes) = self.placements.get_mut(&document) {
            nodes.remove(&node);
            if nodes.is_empty() {
                self.placements.remove(&document);
            }
        }
        removed
    }

    /// Detach a document everywhere, returning the nodes it left.
    pub fn detach_everywhere(&mut self, document: DocumentId) -> Vec<InstanceNodeId> {
        let nodes: Vec<_> = self
            .placements
            .remove(&document)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for node in &nodes {
            if let Some(entry) = self.nodes.get_mut(node) {
                entry.documents.remove(&document);
            }
        }
        nodes
    }

    /// Nodes a document is currently attached to.
    #[must_use]
    pub fn placements(&self, document: DocumentId) -> BTreeSet<InstanceNodeId> {
        self.placements.get(&document).cloned().unwrap_or_default()
    }

    /// Documents attached anywhere in this tree.
    pub fn placed_documents(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.placements.keys().copied()
    }

    /// Remove `node` if it is empty, then each ancestor that becomes empty,
    /// stopping at the first non-empty ancestor or the root. Returns the
    /// number of nodes removed.
    pub fn prune(&mut self, node: InstanceNodeId) -> usize {
        let mut removed = 0;
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ROOT_INSTANCE {
                break;
            }
            let Some(entry) = self.nodes.get(&id) else {
                break;
            };
            if !entry.is_empty() {
                break;
            }
            let parent = entry.parent;
            let key = SiblingKey {
                template: entry.template,
                label: entry.label.clone(),
            };
            self.nodes.remove(&id);
            if let Some(parent_node) = parent.and_then(|p| self.nodes.get_mut(&p)) {
                parent_node.children.remove(&key);
            }
            removed += 1;
            current = parent;
        }
        removed
    }

    /// Discard every node except the root.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.placements.clear();
        self.insert_root();
    }

    /// Labels from below the root down to `node`.
    #[must_use]
    pub fn path(&self, node: InstanceNodeId) -> Option<Vec<String>> {
        let mut labels = Vec::new();
        let mut current = self.nodes.get(&node)?;
        while let Some(parent) = current.parent {
            labels.push(current.label.clone());
            current = self.nodes.get(&parent)?;
        }
        labels.reverse();
        Some(labels)
    }

    /// Follow labels from the root. When siblings from different template
    /// nodes share a label, the first in key order wins.
    #[must_use]
    pub fn find_by_path<S: AsRef<str>>(&self, labels: &[S]) -> Option<InstanceNodeId> {
        let mut current = ROOT_INSTANCE;
        for label in labels {
            let node = self.nodes.get(&current)?;
            current = node
                .children
                .iter()
                .find(|(key, _)| key.label == label.as_ref())
                .map(|(_, id)| *id)?;
        }
        Some(current)
    }

    /// Distinct documents attached anywhere under `node`, itself included.
    #[must_use]
    pub fn subtree_documents(&self, node: InstanceNodeId) -> BTreeSet<DocumentId> {
        let mut out = BTreeSet::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(entry) = self.nodes.get(&id) {
                out.extend(entry.documents.iter().copied());
                stack.extend(entry.children.values().copied());
            }
        }
        out
    }

    /// Non-root nodes with no documents and no children. Always empty once
    /// an engine operation has finished.
    #[must_use]
    pub fn dangling(&self) -> Vec<InstanceNodeId> {
        let mut ids: Vec<_> = self
            .nodes
            .values()
            .filter(|node| node.id != ROOT_INSTANCE && node.is_empty())
            .map(|node| node.id)
            .collect();
        ids.sort();
        ids
    }
}
