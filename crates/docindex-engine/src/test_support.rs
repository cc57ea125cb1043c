//! Fixtures shared by the engine's unit tests.

use docindex_core::{Document, IndexId, NewIndex, NewTemplateNode, TemplateNodeId};
use docindex_expr::FieldPathEvaluator;
use docindex_store::{MemoryDocumentStore, MemoryIndexStore};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::engine::{EngineConfig, IndexingEngine};

pub struct Fixture {
    pub engine: Arc<IndexingEngine>,
    pub documents: Arc<MemoryDocumentStore>,
}

pub fn fixture(documents: impl IntoIterator<Item = Document>) -> Fixture {
    fixture_with(documents, EngineConfig::default())
}

pub fn fixture_with(documents: impl IntoIterator<Item = Document>, config: EngineConfig) -> Fixture {
    let documents = Arc::new(MemoryDocumentStore::from_documents(documents));
    let engine = Arc::new(IndexingEngine::new(
        Arc::new(MemoryIndexStore::new()),
        Arc::clone(&documents) as Arc<dyn docindex_core::DocumentSource>,
        Arc::new(FieldPathEvaluator::new()),
        config,
    ));
    Fixture { engine, documents }
}

pub fn tagged(id: u64, tags: Value) -> Document {
    Document::new(id, "invoice").with_attribute("tag_list", tags)
}

/// The "Tags" index: root -> `doc.tag_list` (linking).
pub async fn tags_index(engine: &IndexingEngine) -> (IndexId, TemplateNodeId) {
    let index = engine
        .create_index(NewIndex::new("Tags", "tags"))
        .await
        .unwrap();
    let root = engine.template_tree(index.id).await.unwrap().root();
    let node = engine
        .create_template_node(
            index.id,
            root,
            NewTemplateNode::new("doc.tag_list").linking(),
            None,
        )
        .await
        .unwrap();
    (index.id, node)
}

pub async fn root_labels(engine: &IndexingEngine, index: IndexId) -> Vec<String> {
    engine
        .tree(index)
        .await
        .unwrap()
        .children
        .into_iter()
        .map(|child| child.label)
        .collect()
}

pub async fn assert_no_dangling(engine: &IndexingEngine, index: IndexId) {
    let lease = engine.lease_existing(index).await.unwrap();
    assert!(
        lease.instances.dangling().is_empty(),
        "dangling nodes: {:?}",
        lease.instances.dangling()
    );
}

pub fn invoice() -> Document {
    tagged(1, json!(["invoice", "2024"]))
}
