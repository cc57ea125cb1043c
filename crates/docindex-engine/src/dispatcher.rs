//! Document event dispatcher.
//!
//! Lifecycle events are queued on an `mpsc` channel and applied one at a
//! time by a background task, so events for one document are applied in
//! the order they were sent.

use docindex_core::{Document, DocumentId, Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::engine::IndexingEngine;

/// Document lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    Created(Document),
    AttributesChanged(Document),
    Deleted(DocumentId),
}

impl DocumentEvent {
    #[must_use]
    pub fn document_id(&self) -> DocumentId {
        match self {
            Self::Created(doc) | Self::AttributesChanged(doc) => doc.id,
            Self::Deleted(id) => *id,
        }
    }
}

/// Feeds document events to an [`IndexingEngine`].
pub struct EventDispatcher {
    event_tx: mpsc::Sender<DocumentEvent>,
    handle: JoinHandle<usize>,
}

impl EventDispatcher {
    /// Start the background task with a queue of `buffer` events.
    pub fn spawn(engine: Arc<IndexingEngine>, buffer: usize) -> Self {
        let (event_tx, mut event_rx) = mpsc::channel::<DocumentEvent>(buffer.max(1));

        let handle = tokio::spawn(async move {
            let mut handled = 0;
            while let Some(event) = event_rx.recv().await {
                debug!("Received document event: {:?}", event.document_id());
                let result = match &event {
                    DocumentEvent::Created(doc) => engine.on_document_created(doc).await,
                    DocumentEvent::AttributesChanged(doc) => {
                        engine.on_document_attributes_changed(doc).await
                    }
                    DocumentEvent::Deleted(id) => engine.on_document_deleted(*id).await,
                };
                if let Err(e) = result {
                    error!(
                        "Failed to apply event for document {}: {}",
                        event.document_id(),
                        e
                    );
                }
                handled += 1;
            }
            info!("Event dispatcher stopped after {} events", handled);
            handled
        });

        Self { event_tx, handle }
    }

    /// A sender for producers running elsewhere.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<DocumentEvent> {
        self.event_tx.clone()
    }

    /// Queue an event, waiting for space if the queue is full.
    pub async fn dispatch(&self, event: DocumentEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| Error::Other("event dispatcher has stopped".to_string()))
    }

    /// Close the queue and wait until every queued event is applied.
    /// Returns the number of events handled.
    ///
    /// Senders obtained from [`sender`](Self::sender) keep the queue open
    /// until they are dropped.
    pub async fn shutdown(self) -> Result<usize> {
        drop(self.event_tx);
        self.handle
            .await
            .map_err(|e| Error::Other(format!("event dispatcher task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture, invoice, root_labels, tagged, tags_index};
    use docindex_core::NewTemplateNode;
    use serde_json::json;

    #[test]
    fn test_event_document_id() {
        assert_eq!(DocumentEvent::Created(invoice()).document_id(), DocumentId(1));
        assert_eq!(DocumentEvent::Deleted(DocumentId(9)).document_id(), DocumentId(9));
    }

    #[tokio::test]
    async fn test_events_applied_in_order() {
        let fx = fixture([]);
        let (index, _) = tags_index(&fx.engine).await;
        let dispatcher = EventDispatcher::spawn(Arc::clone(&fx.engine), 4);

        dispatcher
            .dispatch(DocumentEvent::Created(invoice()))
            .await
            .unwrap();
        dispatcher
            .dispatch(DocumentEvent::AttributesChanged(tagged(1, json!(["memo"]))))
            .await
            .unwrap();
        dispatcher
            .dispatch(DocumentEvent::Created(tagged(2, json!(["memo", "draft"]))))
            .await
            .unwrap();
        dispatcher
            .dispatch(DocumentEvent::Deleted(DocumentId(2)))
            .await
            .unwrap();

        assert_eq!(dispatcher.shutdown().await.unwrap(), 4);
        assert_eq!(root_labels(&fx.engine, index).await, vec!["memo"]);
        let memo = fx.engine.node_by_path(index, &["memo"]).await.unwrap().unwrap();
        assert_eq!(memo.documents, vec![DocumentId(1)]);
    }

    #[tokio::test]
    async fn test_sender_from_other_task() {
        let fx = fixture([]);
        let (index, _) = tags_index(&fx.engine).await;
        let dispatcher = EventDispatcher::spawn(Arc::clone(&fx.engine), 16);

        let tx = dispatcher.sender();
        let producer = tokio::spawn(async move {
            for id in 1..=10 {
                tx.send(DocumentEvent::Created(tagged(id, json!(["batch"]))))
                    .await
                    .unwrap();
            }
        });
        producer.await.unwrap();

        assert_eq!(dispatcher.shutdown().await.unwrap(), 10);
        let batch = fx.engine.node_by_path(index, &["batch"]).await.unwrap().unwrap();
        assert_eq!(batch.documents.len(), 10);
    }

    #[tokio::test]
    async fn test_evaluation_failures_do_not_stop_the_loop() {
        let fx = fixture([]);
        let (index, tags) = tags_index(&fx.engine).await;
        fx.engine
            .create_template_node(index, tags, NewTemplateNode::new("doc.missing"), None)
            .await
            .unwrap();
        let dispatcher = EventDispatcher::spawn(Arc::clone(&fx.engine), 4);

        dispatcher
            .dispatch(DocumentEvent::Created(invoice()))
            .await
            .unwrap();
        dispatcher
            .dispatch(DocumentEvent::Created(tagged(2, json!(["x"]))))
            .await
            .unwrap();

        assert_eq!(dispatcher.shutdown().await.unwrap(), 2);
        // One failure per branch: `invoice`, `2024` and `x`
        assert_eq!(fx.engine.stats().await.evaluation_failures, 3);
        assert_eq!(root_labels(&fx.engine, index).await, vec!["2024", "invoice", "x"]);
    }
}
