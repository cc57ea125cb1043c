//! Building an engine from configuration and feeding it documents.

use anyhow::{Context, Result};
use docindex_core::{
    Document, EvaluationError, ExpressionEvaluator, Index, IndexId, NewIndex, NewTemplateNode,
    TemplateNodeId,
};
use docindex_engine::{EventDispatcher, IndexingEngine, NodeView};
use docindex_expr::FieldPathEvaluator;
use docindex_store::{MemoryDocumentStore, MemoryIndexStore};
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, IndexSpec, NodeSpec};

/// An engine with its document collection.
pub struct Workspace {
    pub engine: Arc<IndexingEngine>,
    pub documents: Arc<MemoryDocumentStore>,
    event_buffer: usize,
}

impl Workspace {
    /// Create an engine with in-memory stores and install the configured
    /// indexes.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let documents = Arc::new(MemoryDocumentStore::new());
        let engine = Arc::new(IndexingEngine::new(
            Arc::new(MemoryIndexStore::new()),
            Arc::clone(&documents) as Arc<dyn docindex_core::DocumentSource>,
            Arc::new(FieldPathEvaluator::new()),
            config.engine.engine_config(),
        ));

        install_indexes(&engine, &config.indexes).await?;
        Ok(Self {
            engine,
            documents,
            event_buffer: config.engine.event_buffer,
        })
    }

    /// Start an event dispatcher sized by `engine.event_buffer`.
    #[must_use]
    pub fn dispatcher(&self) -> EventDispatcher {
        EventDispatcher::spawn(Arc::clone(&self.engine), self.event_buffer)
    }

    /// Add documents to the collection and rebuild every index once.
    pub async fn classify(&self, documents: Vec<Document>) -> Result<usize> {
        let count = documents.len();
        for document in documents {
            self.documents.upsert(document).await;
        }
        self.engine
            .rebuild_all()
            .await
            .context("Failed to rebuild indexes")?;
        info!("Classified {} documents", count);
        Ok(count)
    }
}

/// Create the configured indexes and their template nodes.
pub async fn install_indexes(engine: &IndexingEngine, specs: &[IndexSpec]) -> Result<Vec<Index>> {
    let mut installed = Vec::with_capacity(specs.len());
    for spec in specs {
        let index = engine
            .create_index(NewIndex {
                label: spec.label.clone(),
                slug: spec.slug.clone(),
                enabled: spec.enabled,
                document_types: spec.document_types.clone(),
            })
            .await
            .with_context(|| format!("Failed to create index `{}`", spec.slug))?;

        let root = engine.template_tree(index.id).await?.root();
        for node in &spec.nodes {
            install_node(engine, index.id, root, node)
                .await
                .with_context(|| format!("Failed to install templates of `{}`", spec.slug))?;
        }
        info!("Installed index {} ({} top-level nodes)", spec.slug, spec.nodes.len());
        installed.push(engine.index(index.id).await?);
    }
    Ok(installed)
}

async fn install_node(
    engine: &IndexingEngine,
    index: IndexId,
    parent: TemplateNodeId,
    spec: &NodeSpec,
) -> Result<()> {
    let mut pending = vec![(parent, spec)];
    while let Some((parent, spec)) = pending.pop() {
        let id = engine
            .create_template_node(
                index,
                parent,
                NewTemplateNode {
                    expression: spec.expression.clone(),
                    enabled: spec.enabled,
                    link_documents: spec.link_documents,
                },
                None,
            )
            .await
            .with_context(|| format!("Invalid template node `{}`", spec.expression))?;
        // Reversed so siblings are created, and appended, in order.
        pending.extend(spec.children.iter().rev().map(|child| (id, child)));
    }
    Ok(())
}

/// Read a JSON array of documents.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid documents in {}", path.display()))
}

/// Every expression in `specs` that fails to parse, as
/// `(index slug, expression, error)`.
pub fn check_expressions(
    specs: &[IndexSpec],
    evaluator: &dyn ExpressionEvaluator,
) -> Vec<(String, String, EvaluationError)> {
    specs
        .iter()
        .flat_map(|index| {
            index
                .nodes
                .iter()
                .flat_map(NodeSpec::walk)
                .filter_map(move |node| {
                    evaluator.validate(&node.expression).err().map(|e| {
                        (index.slug.clone(), node.expression.clone(), e)
                    })
                })
        })
        .collect()
}

/// Render a tree as indented text, with direct document counts.
#[must_use]
pub fn render_tree(title: &str, view: &NodeView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{title}");
    render_children(&mut out, view, "");
    out
}

fn render_children(out: &mut String, view: &NodeView, prefix: &str) {
    let count = view.children.len();
    for (i, child) in view.children.iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        let _ = writeln!(out, "{prefix}{branch}{} ({})", child.label, child.documents);
        let next = format!("{prefix}{}", if last { "    " } else { "│   " });
        render_children(out, child, &next);
    }
}
