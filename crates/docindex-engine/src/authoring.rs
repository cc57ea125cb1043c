//! Template authoring operations.
//!
//! Each structural edit validates first, mutates the template tree, clears
//! the instance tree under the same lease and then rebuilds, so once the
//! call returns the instances match the new definition.

use docindex_core::{
    Error, Index, IndexId, IndexState, Missing, NewIndex, NewTemplateNode, Result,
    StoreError, TemplateNodeId, TemplateTree,
};
use tracing::info;

use crate::engine::{CancellationFlag, IndexUpdate, IndexingEngine};

/// Changes to an index's identity. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct IndexPatch {
    pub label: Option<String>,
    pub slug: Option<String>,
    pub document_types: Option<Vec<String>>,
}

fn slug_conflict(slug: &str) -> Error {
    Error::StructuralConflict(format!("an index with slug `{slug}` already exists"))
}

fn check_slug(slug: &str) -> Result<()> {
    if slug.is_empty()
        || !slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::Other(format!(
            "invalid slug `{slug}`: use letters, digits, `-` or `_`"
        )));
    }
    Ok(())
}

impl IndexingEngine {
    /// Create an index with an implicit root template node.
    pub async fn create_index(&self, spec: NewIndex) -> Result<Index> {
        check_slug(&spec.slug)?;
        if self.store.find_by_slug(&spec.slug).await?.is_some() {
            return Err(slug_conflict(&spec.slug));
        }

        let state = IndexState::new(spec);
        let index = state.index.clone();
        self.store.insert_index(state).await.map_err(|e| match e {
            StoreError::Duplicate(_) => slug_conflict(&index.slug),
            other => Error::Store(other),
        })?;
        info!("Created index {} ({})", index.slug, index.id);

        self.populate(index.id, &CancellationFlag::default()).await?;
        self.index(index.id).await
    }

    /// Change label, slug or document types. Only a document type change
    /// rebuilds.
    pub async fn update_index(&self, id: IndexId, patch: IndexPatch) -> Result<Index> {
        if let Some(slug) = &patch.slug {
            check_slug(slug)?;
        }

        let mut lease = self.lease_existing(id).await?;
        if let Some(slug) = &patch.slug {
            if *slug != lease.index.slug {
                self.store.rename_slug(id, slug).await.map_err(|e| match e {
                    StoreError::Duplicate(_) => slug_conflict(slug),
                    other => Error::Store(other),
                })?;
                lease.index.slug = slug.clone();
            }
        }
        if let Some(label) = patch.label {
            lease.index.label = label;
        }

        let mut rebuild = false;
        if let Some(types) = patch.document_types {
            if types != lease.index.document_types {
                lease.index.document_types = types;
                lease.instances.clear();
                rebuild = true;
            }
        }
        let index = lease.index.clone();
        self.store.commit(lease).await?;

        if rebuild {
            self.populate(id, &CancellationFlag::default()).await?;
            return self.index(id).await;
        }
        Ok(index)
    }

    /// Enable or disable an index. A disabled index holds no documents.
    pub async fn set_index_enabled(&self, id: IndexId, enabled: bool) -> Result<Index> {
        let mut lease = self.lease_existing(id).await?;
        if lease.index.enabled == enabled {
            return Ok(lease.index.clone());
        }
        lease.index.enabled = enabled;
        lease.instances.clear();
        self.store.commit(lease).await?;
        info!(
            "Index {} {}",
            id,
            if enabled { "enabled" } else { "disabled" }
        );

        if enabled {
            self.populate(id, &CancellationFlag::default()).await?;
        }
        self.index(id).await
    }

    /// Delete an index together with its template and instance trees.
    pub async fn delete_index(&self, id: IndexId) -> Result<()> {
        // Wait for in-flight work on this index before removing it.
        let lease = self.lease_existing(id).await?;
        let removed = self.store.remove_index(id).await?;
        drop(lease);

        if !removed {
            return Err(Error::NotFound(Missing::Index(id)));
        }
        info!("Deleted index {}", id);
        self.publish(IndexUpdate::IndexDeleted { index: id });
        Ok(())
    }

    /// Add a template node under `parent`. `position` is clamped to the
    /// sibling count; `None` appends.
    pub async fn create_template_node(
        &self,
        index: IndexId,
        parent: TemplateNodeId,
        spec: NewTemplateNode,
        position: Option<usize>,
    ) -> Result<TemplateNodeId> {
        self.evaluator.validate(&spec.expression)?;

        let lease = self.lease_existing(index).await?;
        if !lease.templates.contains(parent) {
            drop(lease);
            return Err(self.foreign_or_missing(index, parent).await);
        }
        drop(lease);

        self.edit_templates(index, |templates| {
            templates.add_child(parent, spec, position)
        })
        .await
    }

    /// Delete a template node with its subtree. Returns the number of
    /// template nodes removed.
    pub async fn delete_template_node(&self, index: IndexId, node: TemplateNodeId) -> Result<usize> {
        self.edit_templates(index, |templates| templates.remove(node).map(|ids| ids.len()))
            .await
    }

    /// Reparent a template node.
    pub async fn move_template_node(
        &self,
        index: IndexId,
        node: TemplateNodeId,
        new_parent: TemplateNodeId,
        position: Option<usize>,
    ) -> Result<()> {
        self.edit_templates(index, |templates| {
            templates.move_node(node, new_parent, position)
        })
        .await
    }

    pub async fn set_template_node_enabled(
        &self,
        index: IndexId,
        node: TemplateNodeId,
        enabled: bool,
    ) -> Result<()> {
        self.edit_templates(index, |templates| templates.set_enabled(node, enabled))
            .await
    }

    pub async fn set_template_node_expression(
        &self,
        index: IndexId,
        node: TemplateNodeId,
        expression: &str,
    ) -> Result<()> {
        self.evaluator.validate(expression)?;
        self.edit_templates(index, |templates| templates.set_expression(node, expression))
            .await
    }

    pub async fn set_template_node_link_documents(
        &self,
        index: IndexId,
        node: TemplateNodeId,
        link_documents: bool,
    ) -> Result<()> {
        self.edit_templates(index, |templates| {
            templates.set_link_documents(node, link_documents)
        })
        .await
    }

    /// All indexes in creation order.
    pub async fn list_indexes(&self) -> Result<Vec<Index>> {
        let mut out = Vec::new();
        for id in self.store.index_ids().await? {
            // Deleted between listing and leasing
            if let Some(lease) = self.store.lease(id).await? {
                out.push(lease.index.clone());
            }
        }
        Ok(out)
    }

    pub async fn index(&self, id: IndexId) -> Result<Index> {
        Ok(self.lease_existing(id).await?.index.clone())
    }

    /// Resolve an index by slug.
    pub async fn index_by_slug(&self, slug: &str) -> Result<Option<Index>> {
        match self.store.find_by_slug(slug).await? {
            Some(id) => match self.index(id).await {
                Ok(index) => Ok(Some(index)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }

    /// Snapshot of an index's template tree.
    pub async fn template_tree(&self, id: IndexId) -> Result<TemplateTree> {
        Ok(self.lease_existing(id).await?.templates.clone())
    }

    /// Apply a template mutation, clear the instance tree in the same lease
    /// and rebuild. A failed mutation leaves everything untouched.
    async fn edit_templates<T, F>(&self, index: IndexId, edit: F) -> Result<T>
    where
        F: FnOnce(&mut TemplateTree) -> Result<T>,
    {
        let mut lease = self.lease_existing(index).await?;
        let value = edit(&mut lease.templates)?;
        lease.instances.clear();
        self.store.commit(lease).await?;

        self.populate(index, &CancellationFlag::default()).await?;
        Ok(value)
    }

    /// Error for a parent that is not in `index`: a conflict if another
    /// index owns it, otherwise not found.
    async fn foreign_or_missing(&self, index: IndexId, parent: TemplateNodeId) -> Error {
        let ids = match self.store.index_ids().await {
            Ok(ids) => ids,
            Err(e) => return Error::Store(e),
        };
        for other in ids.into_iter().filter(|id| *id != index) {
            match self.store.lease(other).await {
                Ok(Some(lease)) if lease.templates.contains(parent) => {
                    return Error::StructuralConflict(format!(
                        "template node {parent} belongs to index {other}, not {index}"
                    ));
                }
                Ok(_) => {}
                Err(e) => return Error::Store(e),
            }
        }
        Error::NotFound(Missing::TemplateNode(parent))
    }
}
