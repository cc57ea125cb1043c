//! The per-document, per-index placement walk.
//!
//! Everything here runs on an already leased [`IndexState`]; callers own
//! locking and commits, and drop the lease instead of committing when a
//! pass fails.

use docindex_core::{
    Document, DocumentId, EvaluationError, ExpressionEvaluator, IndexState, InstanceNodeId,
    InstanceTree, Result, TemplateNodeId, TemplateTree, ROOT_INSTANCE,
};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// An expression that failed for one document and was treated as no match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationFailure {
    pub template: TemplateNodeId,
    pub error: EvaluationError,
}

/// What one reindex pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexOutcome {
    /// New memberships
    pub attached: usize,
    /// Memberships removed
    pub detached: usize,
    /// Instance nodes removed by pruning
    pub pruned: usize,
    /// Final number of nodes holding the document
    pub placements: usize,
    pub failures: Vec<EvaluationFailure>,
}

impl ReindexOutcome {
    /// True when the pass left the tree as it was.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.attached == 0 && self.detached == 0 && self.pruned == 0
    }
}

/// Place a document into an index's instance tree, removing it from nodes
/// it no longer belongs to and pruning what became empty.
///
/// A disabled index, or one that does not apply to the document's type,
/// gets a detach-only pass.
pub fn reindex_state(
    state: &mut IndexState,
    evaluator: &dyn ExpressionEvaluator,
    document: &Document,
    max_label_length: usize,
) -> Result<ReindexOutcome> {
    let root = state.templates.root();
    let mut walk = Walk {
        templates: &state.templates,
        instances: &mut state.instances,
        evaluator,
        document,
        max_label_length,
        targets: BTreeSet::new(),
        failures: Vec::new(),
    };

    if state.index.enabled && state.index.applies_to(&document.document_type) {
        walk.descend(root, ROOT_INSTANCE)?;
    }

    let Walk {
        instances,
        targets,
        failures,
        ..
    } = walk;

    let mut outcome = ReindexOutcome {
        failures,
        ..ReindexOutcome::default()
    };

    let previous = instances.placements(document.id);
    for &node in &targets {
        if instances.attach(node, document.id)? {
            outcome.attached += 1;
        }
    }
    for &node in previous.difference(&targets) {
        if instances.detach(node, document.id) {
            outcome.detached += 1;
        }
        outcome.pruned += instances.prune(node);
    }
    outcome.placements = targets.len();

    debug!(
        "Document {} in index {}: +{} -{} pruned {}",
        document.id,
        state.index.slug,
        outcome.attached,
        outcome.detached,
        outcome.pruned
    );
    Ok(outcome)
}

/// Detach a document from every node of one index and prune. Returns the
/// number of memberships removed and nodes pruned.
pub fn remove_from_state(state: &mut IndexState, document: DocumentId) -> (usize, usize) {
    let left = state.instances.detach_everywhere(document);
    let pruned = left
        .iter()
        .map(|node| state.instances.prune(*node))
        .sum();
    (left.len(), pruned)
}

/// Trim, cap length, drop empties and collapse duplicates in first-seen
/// order.
#[must_use]
pub fn normalize_labels(labels: Vec<String>, max_label_length: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .filter_map(|label| {
            let capped: String = label.trim().chars().take(max_label_length).collect();
            let capped = capped.trim_end().to_string();
            if capped.is_empty() {
                return None;
            }
            seen.insert(capped.clone()).then_some(capped)
        })
        .collect()
}

struct Walk<'a> {
    templates: &'a TemplateTree,
    instances: &'a mut InstanceTree,
    evaluator: &'a dyn ExpressionEvaluator,
    document: &'a Document,
    max_label_length: usize,
    /// Nodes the document belongs to after this pass
    targets: BTreeSet<InstanceNodeId>,
    failures: Vec<EvaluationFailure>,
}

impl Walk<'_> {
    /// Evaluate the enabled children of `template` under `instance`. Returns
    /// true if any child produced a branch.
    fn descend(&mut self, template: TemplateNodeId, instance: InstanceNodeId) -> Result<bool> {
        let templates = self.templates;
        let mut branched = false;

        for child in templates.enabled_children(template) {
            let labels = match self.evaluator.evaluate(child, self.document) {
                Ok(labels) => normalize_labels(labels, self.max_label_length),
                Err(error) => {
                    self.failures.push(EvaluationFailure {
                        template: child.id,
                        error,
                    });
                    continue;
                }
            };

            // Each label is an independent branch with its own descendants.
            for label in labels {
                let (node, _) = self.instances.get_or_create(instance, child.id, &label)?;
                branched = true;

                let below = self.descend(child.id, node)?;
                if child.link_documents || !below {
                    self.targets.insert(node);
                }
            }
        }
        Ok(branched)
    }
}
