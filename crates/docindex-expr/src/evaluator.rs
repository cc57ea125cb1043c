//! Attribute-path evaluator.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use docindex_core::{Document, EvaluationError, ExpressionEvaluator, TemplateNode};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::parser::{parse, Expression, Filter, Source};

/// Maximum number of cached expressions.
const DEFAULT_CACHE_SIZE: usize = 1_024;

struct CacheEntry {
    expression: Arc<Expression>,
    /// Access stamp for eviction
    last_used: AtomicU64,
}

/// Evaluates `doc.<path>` expressions with filters.
///
/// Parsed expressions are cached by source text, since every document is
/// evaluated against the same handful of template nodes. When the cache is
/// full the least recently used tenth is evicted.
///
/// # Example
///
/// ```rust
/// use docindex_core::{Document, ExpressionEvaluator, NewTemplateNode, TemplateTree};
/// use docindex_expr::FieldPathEvaluator;
/// use serde_json::json;
///
/// let mut tree = TemplateTree::new();
/// let id = tree
///     .add_child(tree.root(), NewTemplateNode::new("doc.tags | upper"), None)
///     .unwrap();
/// let doc = Document::new(1, "memo").with_attribute("tags", json!(["a", "b"]));
///
/// let labels = FieldPathEvaluator::new()
///     .evaluate(tree.get(id).unwrap(), &doc)
///     .unwrap();
/// assert_eq!(labels, vec!["A", "B"]);
/// ```
pub struct FieldPathEvaluator {
    cache: RwLock<HashMap<String, CacheEntry>>,
    max_size: usize,
    access_counter: AtomicU64,
}

impl Default for FieldPathEvaluator {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_SIZE)
    }
}

impl FieldPathEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an evaluator caching at most `max_size` expressions.
    #[must_use]
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_size: max_size.max(1),
            access_counter: AtomicU64::new(0),
        }
    }

    fn next_access(&self) -> u64 {
        self.access_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn compiled(&self, expression: &str) -> Result<Arc<Expression>, EvaluationError> {
        if let Some(hit) = self.cache.read().ok().and_then(|cache| {
            cache.get(expression).map(|entry| {
                entry.last_used.store(self.next_access(), Ordering::Relaxed);
                Arc::clone(&entry.expression)
            })
        }) {
            return Ok(hit);
        }

        let parsed = Arc::new(parse(expression)?);
        if let Ok(mut cache) = self.cache.write() {
            self.maybe_evict(&mut cache);
            cache.insert(
                expression.to_string(),
                CacheEntry {
                    expression: Arc::clone(&parsed),
                    last_used: AtomicU64::new(self.next_access()),
                },
            );
        }
        debug!("Compiled expression `{}`", expression);
        Ok(parsed)
    }

    /// Make room for one entry by dropping the least recently used tenth.
    fn maybe_evict(&self, cache: &mut HashMap<String, CacheEntry>) {
        if cache.len() < self.max_size {
            return;
        }

        let evict_count = (self.max_size / 10).max(1);
        let mut entries: Vec<_> = cache
            .iter()
            .map(|(key, entry)| (entry.last_used.load(Ordering::Relaxed), key.clone()))
            .collect();
        entries.sort_unstable();

        for (_, key) in entries.into_iter().take(evict_count) {
            cache.remove(&key);
        }
        debug!("Evicted {} cached expressions", evict_count);
    }

    /// Number of cached expressions.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.read().map(|cache| cache.len()).unwrap_or(0)
    }
}

impl ExpressionEvaluator for FieldPathEvaluator {
    fn name(&self) -> &str {
        "field-path"
    }

    fn validate(&self, expression: &str) -> Result<(), EvaluationError> {
        self.compiled(expression).map(|_| ())
    }

    fn evaluate(
        &self,
        node: &TemplateNode,
        document: &Document,
    ) -> Result<Vec<String>, EvaluationError> {
        let expression = self.compiled(&node.expression)?;
        evaluate_expression(&expression, document)
    }
}

/// Evaluate a parsed expression against a document.
pub fn evaluate_expression(
    expression: &Expression,
    document: &Document,
) -> Result<Vec<String>, EvaluationError> {
    let mut values = match &expression.source {
        Source::Literal(text) => vec![text.clone()],
        Source::Path(segments) => {
            let path: Vec<&str> = segments.iter().map(String::as_str).collect();
            let dotted = format!("doc.{}", segments.join("."));
            match document.attribute(&path) {
                Some(value) => flatten(value, &dotted)?,
                None if expression.has_default() => Vec::new(),
                None => return Err(EvaluationError::MissingAttribute(dotted)),
            }
        }
    };

    for filter in &expression.filters {
        values = apply(filter, values)?;
    }
    Ok(values)
}

/// Scalars become one value, arrays one value per scalar element, null
/// nothing.
fn flatten(value: &Value, path: &str) -> Result<Vec<String>, EvaluationError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Null => {}
                    Value::Array(_) | Value::Object(_) => {
                        return Err(EvaluationError::NotScalar(path.to_string()));
                    }
                    scalar => out.push(scalar_text(scalar)),
                }
            }
            Ok(out)
        }
        Value::Object(_) => Err(EvaluationError::NotScalar(path.to_string())),
        scalar => Ok(vec![scalar_text(scalar)]),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn apply(filter: &Filter, values: Vec<String>) -> Result<Vec<String>, EvaluationError> {
    let out: Vec<String> = match filter {
        Filter::Lower => values.into_iter().map(|v| v.to_lowercase()).collect(),
        Filter::Upper => values.into_iter().map(|v| v.to_uppercase()).collect(),
        Filter::Trim => values.into_iter().map(|v| v.trim().to_string()).collect(),
        Filter::First => values.into_iter().take(1).collect(),
        Filter::Last => values.into_iter().last().into_iter().collect(),
        Filter::Split(sep) => values
            .iter()
            .flat_map(|v| v.split(sep.as_str()).map(str::to_string))
            .collect(),
        Filter::Date(pattern) => values
            .iter()
            .map(|v| format_date(v, pattern))
            .collect::<Result<_, _>>()?,
        Filter::Default(fallback) => {
            if values.is_empty() {
                vec![fallback.clone()]
            } else {
                values
            }
        }
    };
    Ok(out)
}

fn format_date(value: &str, pattern: &str) -> Result<String, EvaluationError> {
    let failed = |reason: String| EvaluationError::Filter {
        filter: "date".to_string(),
        reason,
    };

    let text = value.trim();
    let mut out = String::new();
    let written = if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        write!(out, "{}", dt.format(pattern))
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        write!(out, "{}", dt.format(pattern))
    } else if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        write!(out, "{}", date.format(pattern))
    } else {
        return Err(failed(format!("`{text}` is not a date")));
    };

    written.map_err(|_| failed(format!("pattern `{pattern}` does not apply to `{text}`")))?;
    Ok(out)
}
