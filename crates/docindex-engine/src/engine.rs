//! The reindexing engine.

use chrono::Utc;
use docindex_core::{
    Document, DocumentId, DocumentSource, EngineStats, Error, ExpressionEvaluator, IndexId,
    IndexLease, IndexStore, Missing, Result, TemplateNodeId,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::walk::{reindex_state, remove_from_state, ReindexOutcome};

/// Index update events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexUpdate {
    DocumentIndexed {
        index: IndexId,
        document: DocumentId,
        attached: usize,
        detached: usize,
    },
    DocumentRemoved {
        index: IndexId,
        document: DocumentId,
    },
    EvaluationFailed {
        index: IndexId,
        template: TemplateNodeId,
        document: DocumentId,
        error: String,
    },
    NodesPruned {
        index: IndexId,
        count: usize,
    },
    IndexRebuilt {
        index: IndexId,
        documents: usize,
    },
    IndexDeleted {
        index: IndexId,
    },
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Documents processed per lease during a rebuild
    pub rebuild_batch_size: usize,
    /// Labels longer than this are truncated
    pub max_label_length: usize,
    /// Capacity of the update broadcast channel
    pub update_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rebuild_batch_size: 256,
            max_label_length: 128,
            update_buffer: 256,
        }
    }
}

/// Cooperative cancellation for long rebuilds.
///
/// Checked between batches; a cancelled rebuild leaves a partial tree that
/// the next rebuild discards.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Keeps instance trees in step with documents and templates.
pub struct IndexingEngine {
    pub(crate) store: Arc<dyn IndexStore>,
    pub(crate) documents: Arc<dyn DocumentSource>,
    pub(crate) evaluator: Arc<dyn ExpressionEvaluator>,
    pub(crate) config: EngineConfig,
    /// Update broadcast
    update_tx: broadcast::Sender<IndexUpdate>,
    /// Current stats
    stats: Arc<RwLock<EngineStats>>,
}

impl IndexingEngine {
    /// Create a new engine.
    pub fn new(
        store: Arc<dyn IndexStore>,
        documents: Arc<dyn DocumentSource>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        config: EngineConfig,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(config.update_buffer.max(1));
        Self {
            store,
            documents,
            evaluator,
            config,
            update_tx,
            stats: Arc::new(RwLock::new(EngineStats::default())),
        }
    }

    /// Subscribe to index updates.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexUpdate> {
        self.update_tx.subscribe()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    pub(crate) fn publish(&self, update: IndexUpdate) {
        // No subscribers is fine.
        let _ = self.update_tx.send(update);
    }

    pub(crate) async fn lease_existing(&self, index: IndexId) -> Result<IndexLease> {
        self.store
            .lease(index)
            .await?
            .ok_or(Error::NotFound(Missing::Index(index)))
    }

    // ------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------

    /// Reindex one document against one index.
    ///
    /// An index deleted in the meantime is skipped.
    pub async fn reindex(&self, document: &Document, index: IndexId) -> Result<ReindexOutcome> {
        let Some(mut lease) = self.store.lease(index).await? else {
            debug!("Index {} is gone, skipping document {}", index, document.id);
            return Ok(ReindexOutcome::default());
        };

        let outcome = reindex_state(
            &mut lease,
            self.evaluator.as_ref(),
            document,
            self.config.max_label_length,
        )?;
        self.store.commit(lease).await?;

        self.record(index, document.id, &outcome).await;
        Ok(outcome)
    }

    /// Reindex a document against every index. Disabled indexes get a
    /// detach-only pass.
    pub async fn reindex_all(&self, document: &Document) -> Result<Vec<(IndexId, ReindexOutcome)>> {
        let ids = self.store.index_ids().await?;
        let mut outcomes = Vec::with_capacity(ids.len());
        for index in ids {
            let outcome = self.reindex(document, index).await?;
            outcomes.push((index, outcome));
        }
        Ok(outcomes)
    }

    /// Detach a document from every index and prune. Returns the number of
    /// memberships removed.
    pub async fn remove_document(&self, document: DocumentId) -> Result<usize> {
        let mut total = 0;
        for index in self.store.index_ids().await? {
            let Some(mut lease) = self.store.lease(index).await? else {
                continue;
            };
            let (detached, pruned) = remove_from_state(&mut lease, document);
            self.store.commit(lease).await?;

            if detached > 0 {
                self.publish(IndexUpdate::DocumentRemoved { index, document });
            }
            if pruned > 0 {
                self.publish(IndexUpdate::NodesPruned {
                    index,
                    count: pruned,
                });
                let mut s = self.stats.write().await;
                s.nodes_pruned += pruned as u64;
                s.last_update = Some(Utc::now());
            }
            total += detached;
        }
        debug!("Removed document {} ({} memberships)", document, total);
        Ok(total)
    }

    /// Discard and recompute an index's instance tree from every known
    /// document. Returns the number of documents processed.
    pub async fn rebuild(&self, index: IndexId) -> Result<usize> {
        self.rebuild_with_cancel(index, &CancellationFlag::default())
            .await
    }

    /// [`rebuild`](Self::rebuild), checking `cancel` between batches.
    pub async fn rebuild_with_cancel(
        &self,
        index: IndexId,
        cancel: &CancellationFlag,
    ) -> Result<usize> {
        let mut lease = self.lease_existing(index).await?;
        lease.instances.clear();
        self.store.commit(lease).await?;
        self.populate(index, cancel).await
    }

    /// Rebuild every index. Returns per-index document counts.
    pub async fn rebuild_all(&self) -> Result<Vec<(IndexId, usize)>> {
        let mut counts = Vec::new();
        for index in self.store.index_ids().await? {
            match self.rebuild(index).await {
                Ok(count) => counts.push((index, count)),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(counts)
    }

    /// Fill a cleared instance tree in batches, releasing the lease and
    /// yielding between them.
    pub(crate) async fn populate(&self, index: IndexId, cancel: &CancellationFlag) -> Result<usize> {
        let ids = self.documents.document_ids().await?;
        let total = ids.len();
        let batch_size = self.config.rebuild_batch_size.max(1);
        let mut processed = 0;

        info!("Rebuilding index {} from {} documents", index, total);

        for batch in ids.chunks(batch_size) {
            if cancel.is_cancelled() {
                info!("Rebuild of index {} cancelled at {}/{}", index, processed, total);
                return Err(Error::Cancelled { processed, total });
            }

            let Some(mut lease) = self.store.lease(index).await? else {
                debug!("Index {} deleted during rebuild", index);
                return Ok(processed);
            };

            // An error below drops the lease, discarding the whole batch.
            let mut outcomes = Vec::with_capacity(batch.len());
            for id in batch {
                // Fetched under the lease so a concurrent edit of the same
                // document cannot be overwritten with stale attributes.
                let Some(document) = self.documents.get_document(*id).await? else {
                    continue;
                };
                let outcome = reindex_state(
                    &mut lease,
                    self.evaluator.as_ref(),
                    &document,
                    self.config.max_label_length,
                )?;
                outcomes.push((document.id, outcome));
            }
            self.store.commit(lease).await?;

            for (document, outcome) in &outcomes {
                self.record(index, *document, outcome).await;
            }
            processed += batch.len();
            tokio::task::yield_now().await;
        }

        if let Some(mut lease) = self.store.lease(index).await? {
            lease.index.last_rebuilt_at = Some(Utc::now());
            self.store.commit(lease).await?;
        }

        {
            let mut s = self.stats.write().await;
            s.rebuilds += 1;
            s.last_update = Some(Utc::now());
        }
        info!("Rebuilt index {} ({} documents)", index, processed);
        self.publish(IndexUpdate::IndexRebuilt {
            index,
            documents: processed,
        });
        Ok(processed)
    }

    async fn record(&self, index: IndexId, document: DocumentId, outcome: &ReindexOutcome) {
        for failure in &outcome.failures {
            warn!(
                "Expression of template node {} failed for document {}: {}",
                failure.template, document, failure.error
            );
            self.publish(IndexUpdate::EvaluationFailed {
                index,
                template: failure.template,
                document,
                error: failure.error.to_string(),
            });
        }
        if !outcome.is_unchanged() {
            self.publish(IndexUpdate::DocumentIndexed {
                index,
                document,
                attached: outcome.attached,
                detached: outcome.detached,
            });
        }
        if outcome.pruned > 0 {
            self.publish(IndexUpdate::NodesPruned {
                index,
                count: outcome.pruned,
            });
        }

        let mut s = self.stats.write().await;
        s.documents_reindexed += 1;
        s.evaluation_failures += outcome.failures.len() as u64;
        s.nodes_pruned += outcome.pruned as u64;
        s.last_update = Some(Utc::now());
    }

    // ------------------------------------------------------------------
    // Document lifecycle hooks
    // ------------------------------------------------------------------

    pub async fn on_document_created(&self, document: &Document) -> Result<()> {
        self.reindex_all(document).await.map(|_| ())
    }

    pub async fn on_document_attributes_changed(&self, document: &Document) -> Result<()> {
        self.reindex_all(document).await.map(|_| ())
    }

    pub async fn on_document_deleted(&self, document: DocumentId) -> Result<()> {
        self.remove_document(document).await.map(|_| ())
    }
}
