//! Integration tests for the full flow: config → indexes → documents →
//! instance trees → incremental events.

use docindex::{load_documents, Config, Workspace};
use docindex_core::{Document, DocumentId, Index};
use docindex_engine::{DocumentEvent, IndexUpdate, NodeView};
use serde_json::json;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

const CONFIG: &str = r#"
[engine]
rebuild_batch_size = 2

[[indexes]]
label = "Tags"
slug = "tags"

[[indexes.nodes]]
expression = "doc.tag_list | lower"
link_documents = true

[[indexes]]
label = "Clients"
slug = "clients"
document_types = ["invoice"]

[[indexes.nodes]]
expression = "doc.metadata.client | default:'Unknown'"

[[indexes.nodes.children]]
expression = "doc.date_added | date:'%Y'"

[[indexes]]
label = "Archive"
slug = "archive"
enabled = false

[[indexes.nodes]]
expression = "'All'"
"#;

fn corpus() -> serde_json::Value {
    json!([
        {
            "id": 1,
            "document_type": "invoice",
            "attributes": {
                "tag_list": ["Invoice", "2024"],
                "metadata": {"client": "Acme"},
                "date_added": "2024-03-15T10:30:00Z"
            }
        },
        {
            "id": 2,
            "document_type": "invoice",
            "attributes": {
                "tag_list": ["invoice"],
                "metadata": {},
                "date_added": "2023-11-02"
            }
        },
        {
            "id": 3,
            "document_type": "memo",
            "attributes": {
                "tag_list": ["memo"],
                "metadata": {"client": "Acme"},
                "date_added": "2024-01-01"
            }
        }
    ])
}

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

async fn workspace() -> Workspace {
    let file = write_config(CONFIG);
    let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
    let workspace = Workspace::from_config(&config).await.unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("documents.json");
    std::fs::write(&path, corpus().to_string()).unwrap();
    let documents = load_documents(&path).unwrap();
    assert_eq!(documents.len(), 3);

    workspace.classify(documents).await.unwrap();
    workspace
}

async fn index(workspace: &Workspace, slug: &str) -> Index {
    workspace
        .engine
        .index_by_slug(slug)
        .await
        .unwrap()
        .unwrap()
}

fn labels(view: &NodeView) -> Vec<&str> {
    view.children.iter().map(|c| c.label.as_str()).collect()
}

fn no_empty_nodes(view: &NodeView) -> bool {
    view.children
        .iter()
        .all(|child| (child.documents > 0 || !child.children.is_empty()) && no_empty_nodes(child))
}

#[tokio::test]
async fn test_config_defines_indexes() {
    let workspace = workspace().await;
    let indexes = workspace.engine.list_indexes().await.unwrap();

    let slugs: Vec<_> = indexes.iter().map(|i| i.slug.as_str()).collect();
    assert_eq!(slugs, vec!["tags", "clients", "archive"]);
    assert!(!indexes[2].enabled);
    assert_eq!(indexes[1].document_types, vec!["invoice"]);
    assert!(indexes.iter().all(|i| i.last_rebuilt_at.is_some()));
}

#[tokio::test]
async fn test_build_trees() {
    let workspace = workspace().await;

    let tags = index(&workspace, "tags").await;
    let tree = workspace.engine.tree(tags.id).await.unwrap();
    assert_eq!(labels(&tree), vec!["2024", "invoice", "memo"]);
    let invoice = workspace
        .engine
        .node_by_path(tags.id, &["invoice"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invoice.documents, vec![DocumentId(1), DocumentId(2)]);

    // Memos are outside the clients index; client-less invoices use the default
    let clients = index(&workspace, "clients").await;
    let tree = workspace.engine.tree(clients.id).await.unwrap();
    assert_eq!(labels(&tree), vec!["Acme", "Unknown"]);
    let acme = workspace
        .engine
        .node_by_path(clients.id, &["Acme", "2024"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(acme.documents, vec![DocumentId(1)]);
    let unknown = workspace
        .engine
        .node_by_path(clients.id, &["Unknown", "2023"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unknown.documents, vec![DocumentId(2)]);

    let archive = index(&workspace, "archive").await;
    assert!(workspace.engine.tree(archive.id).await.unwrap().children.is_empty());

    for slug in ["tags", "clients", "archive"] {
        let id = index(&workspace, slug).await.id;
        assert!(no_empty_nodes(&workspace.engine.tree(id).await.unwrap()));
    }
}

#[tokio::test]
async fn test_document_placements_across_indexes() {
    let workspace = workspace().await;

    let placements = workspace
        .engine
        .document_placements(DocumentId(1))
        .await
        .unwrap();
    let mut found: Vec<_> = placements
        .iter()
        .map(|p| format!("{}:{}", p.slug, p.path.join("/")))
        .collect();
    found.sort();
    assert_eq!(found, vec!["clients:Acme/2024", "tags:2024", "tags:invoice"]);
}

#[tokio::test]
async fn test_incremental_events_after_build() {
    let workspace = workspace().await;
    let tags = index(&workspace, "tags").await;
    let mut updates = workspace.engine.subscribe();
    let dispatcher = workspace.dispatcher();

    // Drop the `2024` tag from document 1
    let edited = Document::new(1, "invoice")
        .with_attribute("tag_list", json!(["invoice"]))
        .with_attribute("metadata", json!({"client": "Acme"}))
        .with_attribute("date_added", json!("2024-03-15"));
    workspace.documents.upsert(edited.clone()).await;
    dispatcher
        .dispatch(DocumentEvent::AttributesChanged(edited))
        .await
        .unwrap();

    workspace.documents.remove(DocumentId(3)).await;
    dispatcher
        .dispatch(DocumentEvent::Deleted(DocumentId(3)))
        .await
        .unwrap();
    dispatcher.shutdown().await.unwrap();

    let tree = workspace.engine.tree(tags.id).await.unwrap();
    assert_eq!(labels(&tree), vec!["invoice"]);
    assert!(no_empty_nodes(&tree));

    let mut pruned = 0;
    while let Ok(update) = updates.try_recv() {
        if let IndexUpdate::NodesPruned { index, count } = update {
            if index == tags.id {
                pruned += count;
            }
        }
    }
    assert_eq!(pruned, 2);
}

#[tokio::test]
async fn test_template_edits_rebuild_configured_index() {
    let workspace = workspace().await;
    let archive = index(&workspace, "archive").await;

    workspace
        .engine
        .set_index_enabled(archive.id, true)
        .await
        .unwrap();
    let all = workspace
        .engine
        .node_by_path(archive.id, &["All"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(all.documents.len(), 3);

    let tags = index(&workspace, "tags").await;
    let templates = workspace.engine.template_tree(tags.id).await.unwrap();
    let node = templates.get(templates.root()).unwrap().children()[0];
    workspace.engine.delete_template_node(tags.id, node).await.unwrap();
    assert!(workspace.engine.tree(tags.id).await.unwrap().children.is_empty());
}

#[tokio::test]
async fn test_missing_explicit_config_is_error() {
    let dir = tempdir().unwrap();
    let err = Config::load_from(Some(dir.path().join("nope.toml"))).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[tokio::test]
async fn test_install_rejects_bad_expression() {
    let file = write_config(
        r#"
[[indexes]]
label = "Bad"
slug = "bad"

[[indexes.nodes]]
expression = "tag_list"
"#,
    );
    let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
    assert!(Workspace::from_config(&config).await.is_err());
}

#[test]
fn test_load_documents_rejects_non_array() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("documents.json");
    std::fs::write(&path, r#"{"id": 1}"#).unwrap();
    assert!(load_documents(&path).is_err());
}
