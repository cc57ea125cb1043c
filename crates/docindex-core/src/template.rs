//! Template tree: the authored definition of an index.
//!
//! Nodes live in an arena keyed by [`TemplateNodeId`]; each node stores its
//! parent id and the ordered ids of its children. The root is created with
//! the tree and cannot be deleted, disabled, moved or given an expression.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Missing, Result};
use crate::types::TemplateNodeId;

/// One authored node of a template tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateNode {
    pub id: TemplateNodeId,
    /// Parent node (`None` only for the root)
    pub parent: Option<TemplateNodeId>,
    /// Opaque expression evaluated against documents (empty for the root)
    pub expression: String,
    /// Disabled nodes hide their whole subtree
    pub enabled: bool,
    /// Attach matching documents to this node's instances
    pub link_documents: bool,
    /// Ordered children
    children: Vec<TemplateNodeId>,
}

impl TemplateNode {
    /// Ordered child ids.
    #[must_use]
    pub fn children(&self) -> &[TemplateNodeId] {
        &self.children
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Parameters for a new template node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTemplateNode {
    pub expression: String,
    pub enabled: bool,
    pub link_documents: bool,
}

impl NewTemplateNode {
    /// An enabled, non-linking node.
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            enabled: true,
            link_documents: false,
        }
    }

    /// Attach documents to this node's instances.
    #[must_use]
    pub fn linking(mut self) -> Self {
        self.link_documents = true;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Arena of template nodes with a single implicit root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateTree {
    root: TemplateNodeId,
    nodes: HashMap<TemplateNodeId, TemplateNode>,
}

impl TemplateTree {
    /// Create a tree holding only the root.
    #[must_use]
    pub fn new() -> Self {
        let root = TemplateNodeId::new();
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            TemplateNode {
                id: root,
                parent: None,
                expression: String::new(),
                enabled: true,
                link_documents: false,
                children: Vec::new(),
            },
        );
        Self { root, nodes }
    }

    #[must_use]
    pub fn root(&self) -> TemplateNodeId {
        self.root
    }

    #[must_use]
    pub fn get(&self, id: TemplateNodeId) -> Option<&TemplateNode> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: TemplateNodeId) -> bool {
        self.nodes.contains_key(&id)
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

    /// Enabled children of `id`, in sibling order.
    pub fn enabled_children(&self, id: TemplateNodeId) -> impl Iterator<Item = &TemplateNode> {
        self.nodes
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.nodes.get(child))
            .filter(|child| child.enabled)
    }

    /// True when the node and all of its ancestors are enabled.
    #[must_use]
    pub fn is_active(&self, id: TemplateNodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            match self.nodes.get(&node_id) {
                Some(node) if node.enabled => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// Ids of `id` and all its descendants, parents before children.
    #[must_use]
    pub fn subtree(&self, id: TemplateNodeId) -> Vec<TemplateNodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node_id) = stack.pop() {
            if let Some(node) = self.nodes.get(&node_id) {
                out.push(node_id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Add a node under `parent`. `position` is clamped to the sibling count;
    /// `None` appends.
    pub fn add_child(
        &mut self,
        parent: TemplateNodeId,
        spec: NewTemplateNode,
        position: Option<usize>,
    ) -> Result<TemplateNodeId> {
        let id = TemplateNodeId::new();
        let siblings = &mut self
            .nodes
            .get_mut(&parent)
            .ok_or(Error::NotFound(Missing::TemplateNode(parent)))?
            .children;
        let at = position.map_or(siblings.len(), |p| p.min(siblings.len()));
        siblings.insert(at, id);

        self.nodes.insert(
            id,
            TemplateNode {
                id,
                parent: Some(parent),
                expression: spec.expression,
                enabled: spec.enabled,
                link_documents: spec.link_documents,
                children: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Remove a node and its subtree, returning the removed ids.
    pub fn remove(&mut self, id: TemplateNodeId) -> Result<Vec<TemplateNodeId>> {
        let parent = self.non_root(id, "delete")?.parent;
        let removed = self.subtree(id);
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }
        for node_id in &removed {
            self.nodes.remove(node_id);
        }
        Ok(removed)
    }

    /// Reparent a node. Moving a node under itself or one of its
    /// descendants is refused.
    pub fn move_node(
        &mut self,
        id: TemplateNodeId,
        new_parent: TemplateNodeId,
        position: Option<usize>,
    ) -> Result<()> {
        let old_parent = self.non_root(id, "move")?.parent;
        if !self.nodes.contains_key(&new_parent) {
            return Err(Error::NotFound(Missing::TemplateNode(new_parent)));
        }
        if self.subtree(id).contains(&new_parent) {
            return Err(Error::StructuralConflict(format!(
                "cannot move template node {id} under its own subtree"
            )));
        }

        if let Some(parent) = old_parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }
        if let Some(parent) = self.nodes.get_mut(&new_parent) {
            let at = position.map_or(parent.children.len(), |p| p.min(parent.children.len()));
            parent.children.insert(at, id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(new_parent);
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, id: TemplateNodeId, enabled: bool) -> Result<()> {
        self.non_root_mut(id, "toggle")?.enabled = enabled;
        Ok(())
    }

    pub fn set_expression(&mut self, id: TemplateNodeId, expression: impl Into<String>) -> Result<()> {
        self.non_root_mut(id, "edit")?.expression = expression.into();
        Ok(())
    }

    pub fn set_link_documents(&mut self, id: TemplateNodeId, link_documents: bool) -> Result<()> {
        self.non_root_mut(id, "edit")?.link_documents = link_documents;
        Ok(())
    }

    fn non_root(&self, id: TemplateNodeId, action: &str) -> Result<&TemplateNode> {
        if id == self.root {
            return Err(Error::StructuralConflict(format!(
                "cannot {action} the root template node"
            )));
        }
        self.nodes
            .get(&id)
            .ok_or(Error::NotFound(Missing::TemplateNode(id)))
    }

    fn non_root_mut(&mut self, id: TemplateNodeId, action: &str) -> Result<&mut TemplateNode> {
        self.non_root(id, action)?;
        self.nodes
            .get_mut(&id)
            .ok_or(Error::NotFound(Missing::TemplateNode(id)))
    }
}

impl Default for TemplateTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_chain() -> (TemplateTree, TemplateNodeId, TemplateNodeId) {
        let mut tree = TemplateTree::new();
        let year = tree
            .add_child(tree.root(), NewTemplateNode::new("doc.year"), None)
            .unwrap();
        let month = tree
            .add_child(year, NewTemplateNode::new("doc.month").linking(), None)
            .unwrap();
        (tree, year, month)
    }

    #[test]
    fn test_new_tree_has_root_only() {
        let tree = TemplateTree::new();
        let root = tree.get(tree.root()).unwrap();
        assert!(root.is_root());
        assert!(root.enabled);
        assert!(!root.link_documents);
        assert!(root.expression.is_empty());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_add_child_links_parent() {
        let (tree, year, month) = tree_with_chain();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get(tree.root()).unwrap().children(), &[year]);
        assert_eq!(tree.get(month).unwrap().parent, Some(year));
        assert!(tree.get(month).unwrap().link_documents);
    }

    #[test]
    fn test_add_child_position() {
        let mut tree = TemplateTree::new();
        let a = tree.add_child(tree.root(), NewTemplateNode::new("'a'"), None).unwrap();
        let b = tree.add_child(tree.root(), NewTemplateNode::new("'b'"), Some(0)).unwrap();
        let c = tree.add_child(tree.root(), NewTemplateNode::new("'c'"), Some(99)).unwrap();
        assert_eq!(tree.get(tree.root()).unwrap().children(), &[b, a, c]);
    }

    #[test]
    fn test_add_child_missing_parent() {
        let mut tree = TemplateTree::new();
        let err = tree
            .add_child(TemplateNodeId::new(), NewTemplateNode::new("x"), None)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_remove_cascades() {
        let (mut tree, year, month) = tree_with_chain();
        let removed = tree.remove(year).unwrap();
        assert_eq!(removed, vec![year, month]);
        assert_eq!(tree.len(), 1);
        assert!(tree.get(tree.root()).unwrap().children().is_empty());
    }

    #[test]
    fn test_root_is_protected() {
        let mut tree = TemplateTree::new();
        let root = tree.root();
        assert!(matches!(tree.remove(root), Err(Error::StructuralConflict(_))));
        assert!(matches!(
            tree.set_enabled(root, false),
            Err(Error::StructuralConflict(_))
        ));
        assert!(matches!(
            tree.set_expression(root, "doc.x"),
            Err(Error::StructuralConflict(_))
        ));
        assert!(matches!(
            tree.set_link_documents(root, true),
            Err(Error::StructuralConflict(_))
        ));
    }

    #[test]
    fn test_move_node() {
        let (mut tree, year, month) = tree_with_chain();
        tree.move_node(month, tree.root(), Some(0)).unwrap();
        assert_eq!(tree.get(tree.root()).unwrap().children(), &[month, year]);
        assert!(tree.get(year).unwrap().children().is_empty());
        assert_eq!(tree.get(month).unwrap().parent, Some(tree.root()));
    }

    #[test]
    fn test_move_into_own_subtree_is_conflict() {
        let (mut tree, year, month) = tree_with_chain();
        assert!(matches!(
            tree.move_node(year, month, None),
            Err(Error::StructuralConflict(_))
        ));
        assert!(matches!(
            tree.move_node(year, year, None),
            Err(Error::StructuralConflict(_))
        ));
        // Tree unchanged
        assert_eq!(tree.get(year).unwrap().children(), &[month]);
    }

    #[test]
    fn test_is_active_follows_ancestors() {
        let (mut tree, year, month) = tree_with_chain();
        assert!(tree.is_active(month));
        tree.set_enabled(year, false).unwrap();
        assert!(!tree.is_active(month));
        assert!(!tree.is_active(year));
        assert!(tree.is_active(tree.root()));
        assert!(!tree.is_active(TemplateNodeId::new()));
    }

    #[test]
    fn test_enabled_children_skips_disabled() {
        let mut tree = TemplateTree::new();
        let on = tree.add_child(tree.root(), NewTemplateNode::new("'on'"), None).unwrap();
        tree.add_child(tree.root(), NewTemplateNode::new("'off'").disabled(), None)
            .unwrap();
        let ids: Vec<_> = tree.enabled_children(tree.root()).map(|n| n.id).collect();
        assert_eq!(ids, vec![on]);
    }

    #[test]
    fn test_subtree_preorder() {
        let mut tree = TemplateTree::new();
        let a = tree.add_child(tree.root(), NewTemplateNode::new("'a'"), None).unwrap();
        let a1 = tree.add_child(a, NewTemplateNode::new("'a1'"), None).unwrap();
        let b = tree.add_child(tree.root(), NewTemplateNode::new("'b'"), None).unwrap();
        assert_eq!(tree.subtree(tree.root()), vec![tree.root(), a, a1, b]);
    }
}
