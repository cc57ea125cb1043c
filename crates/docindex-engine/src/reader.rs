//! Read-only views of instance trees.

use docindex_core::{
    DocumentId, Error, IndexId, IndexState, InstanceNodeId, Missing, Result, TemplateNodeId,
};
use serde::Serialize;

use crate::engine::IndexingEngine;

/// Recursive snapshot of an instance subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub id: InstanceNodeId,
    pub label: String,
    /// Labels from below the root down to this node
    pub path: Vec<String>,
    /// Source template node
    pub template: TemplateNodeId,
    /// Documents attached directly to this node
    pub documents: usize,
    pub children: Vec<NodeView>,
}

impl NodeView {
    /// Number of nodes in this view, itself included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(NodeView::node_count).sum::<usize>()
    }
}

/// One child as listed by [`NodeDetail`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub id: InstanceNodeId,
    pub label: String,
    pub documents: usize,
}

/// A single node with its documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDetail {
    pub id: InstanceNodeId,
    pub label: String,
    pub path: Vec<String>,
    pub template: TemplateNodeId,
    pub documents: Vec<DocumentId>,
    /// Distinct documents anywhere in the subtree
    pub total_documents: usize,
    pub children: Vec<NodeSummary>,
}

/// Where a document sits in one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentPlacement {
    pub index: IndexId,
    pub slug: String,
    pub node: InstanceNodeId,
    pub path: Vec<String>,
}

impl IndexingEngine {
    /// Snapshot of an index's whole instance tree.
    pub async fn tree(&self, index: IndexId) -> Result<NodeView> {
        let lease = self.lease_existing(index).await?;
        view(&lease, lease.instances.root())
            .ok_or(Error::NotFound(Missing::InstanceNode(lease.instances.root())))
    }

    /// One node with its documents and children.
    pub async fn node(&self, index: IndexId, node: InstanceNodeId) -> Result<NodeDetail> {
        let lease = self.lease_existing(index).await?;
        detail(&lease, node).ok_or(Error::NotFound(Missing::InstanceNode(node)))
    }

    /// Follow labels from the root. An empty path is the root.
    pub async fn node_by_path<S: AsRef<str> + Sync>(
        &self,
        index: IndexId,
        labels: &[S],
    ) -> Result<Option<NodeDetail>> {
        let lease = self.lease_existing(index).await?;
        Ok(lease
            .instances
            .find_by_path(labels)
            .and_then(|node| detail(&lease, node)))
    }

    /// Every node holding `document`, across all indexes.
    pub async fn document_placements(&self, document: DocumentId) -> Result<Vec<DocumentPlacement>> {
        let mut out = Vec::new();
        for index in self.store.index_ids().await? {
            let Some(lease) = self.store.lease(index).await? else {
                continue;
            };
            for node in lease.instances.placements(document) {
                if let Some(path) = lease.instances.path(node) {
                    out.push(DocumentPlacement {
                        index,
                        slug: lease.index.slug.clone(),
                        node,
                        path,
                    });
                }
            }
        }
        Ok(out)
    }
}

/// Children of `node` ordered by template sibling position, then label.
fn ordered_children(state: &IndexState, node: InstanceNodeId) -> Vec<InstanceNodeId> {
    let Some(entry) = state.instances.get(node) else {
        return Vec::new();
    };
    let siblings = state
        .templates
        .get(entry.template)
        .map(|t| t.children())
        .unwrap_or_default();

    let mut keyed: Vec<_> = entry
        .children()
        .iter()
        .map(|(key, id)| {
            let position = siblings
                .iter()
                .position(|t| *t == key.template)
                .unwrap_or(usize::MAX);
            (position, key.label.as_str(), *id)
        })
        .collect();
    keyed.sort();
    keyed.into_iter().map(|(_, _, id)| id).collect()
}

fn view(state: &IndexState, node: InstanceNodeId) -> Option<NodeView> {
    let entry = state.instances.get(node)?;
    Some(NodeView {
        id: entry.id,
        label: entry.label.clone(),
        path: state.instances.path(node)?,
        template: entry.template,
        documents: entry.documents().len(),
        children: ordered_children(state, node)
            .into_iter()
            .filter_map(|child| view(state, child))
            .collect(),
    })
}

fn detail(state: &IndexState, node: InstanceNodeId) -> Option<NodeDetail> {
    let entry = state.instances.get(node)?;
    let children = ordered_children(state, node)
        .into_iter()
        .filter_map(|child| state.instances.get(child))
        .map(|child| NodeSummary {
            id: child.id,
            label: child.label.clone(),
            documents: child.documents().len(),
        })
        .collect();

    Some(NodeDetail {
        id: entry.id,
        label: entry.label.clone(),
        path: state.instances.path(node)?,
        template: entry.template,
        documents: entry.documents().iter().copied().collect(),
        total_documents: state.instances.subtree_documents(node).len(),
        children,
    })
}
