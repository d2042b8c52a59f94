//! Shape-preserving compression for JSON tool output.
//!
//! Search and retrieval tools return arrays of result objects, or a single
//! object with a handful of meaningful fields buried among bulky ones. This
//! compressor shrinks that content while keeping it parseable as the same
//! shape:
//!
//! - **Arrays** keep their first and last element. The interior becomes one
//!   string element `"[N items omitted]"`. Arrays of two or fewer elements are
//!   kept whole.
//! - **Objects** keep only fields from a priority allow-list (`id`, `title`,
//!   `url`, `score`, ...). Other fields are dropped, not truncated.
//! - If the pruned value still exceeds the ceiling, one more level is reduced:
//!   each retained child gets an even share of the remaining budget and is
//!   pruned, reduced or truncated to fit it.
//! - If the serialized result is still too large, it is truncated as plain
//!   text.
//!
//! # Boundary
//!
//! Keeping the first and last element is tuned to ranked, search-result
//! shaped lists, where the head is the most relevant hit and the tail the
//! most recent. It is not a general summarization algorithm. Payloads whose
//! meaning lives in the middle (time series, diffs) need their own
//! [`CompressionStrategy`] placed ahead of this one in the chain.

use serde_json::{Map, Value};

use super::strategy::{CompressionStrategy, StrategyKind};
use super::token::TokenEstimator;
use super::truncate::Truncator;

/// Fields kept when an object is pruned, in priority order.
pub const DEFAULT_PRIORITY_FIELDS: &[&str] = &[
    "id",
    "name",
    "title",
    "label",
    "type",
    "url",
    "link",
    "source",
    "score",
    "relevance",
    "message",
    "error",
];

/// Render the interior-omission marker for `count` elements.
pub fn omission_marker(count: usize) -> String {
    format!("[{count} items omitted]")
}

/// Parse an omission marker back into its count.
fn omitted_count(value: &Value) -> Option<usize> {
    value
        .as_str()?
        .strip_prefix('[')?
        .strip_suffix(" items omitted]")?
        .parse()
        .ok()
}

#[derive(Debug, Clone)]
pub struct StructuredCompressor {
    estimator: TokenEstimator,
    truncator: Truncator,
    priority_fields: Vec<String>,
}

impl Default for StructuredCompressor {
    fn default() -> Self {
        Self::new(TokenEstimator::default())
    }
}

impl StructuredCompressor {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self {
            truncator: Truncator::new(estimator.clone()),
            estimator,
            priority_fields: DEFAULT_PRIORITY_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }

    /// Replace the object-field allow-list.
    pub fn with_priority_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn priority_fields(&self) -> &[String] {
        &self.priority_fields
    }

    /// Compress JSON array or object content to at most `max_tokens`.
    ///
    /// Returns `None` when the content is not JSON or is a bare scalar.
    pub fn compress_structured(&self, content: &str, max_tokens: usize) -> Option<String> {
        let value: Value = serde_json::from_str(content.trim()).ok()?;

        let mut reduced = match value {
            Value::Array(items) => Value::Array(reduce_array(items)),
            Value::Object(map) => Value::Object(self.prune_object(map)),
            _ => return None,
        };

        if self.estimate_value(&reduced) > max_tokens {
            self.fit_children(&mut reduced, max_tokens);
        }

        let serialized = reduced.to_string();
        if self.estimator.estimate(&serialized) > max_tokens {
            return Some(self.truncator.truncate(&serialized, max_tokens));
        }
        Some(serialized)
    }

    /// Keep allow-listed fields, in allow-list order.
    fn prune_object(&self, mut map: Map<String, Value>) -> Map<String, Value> {
        let mut kept = Map::new();
        for field in &self.priority_fields {
            if let Some(v) = map.remove(field) {
                kept.insert(field.clone(), v);
            }
        }
        kept
    }

    /// Give every adjustable child of `value` an equal share of whatever the
    /// skeleton leaves over, and shrink the children that exceed it.
    /// Omission markers are part of the skeleton and never touched.
    fn fit_children(&self, value: &mut Value, max_tokens: usize) {
        let overhead = self.estimate_value(&skeleton(value));
        let children: Vec<&mut Value> = match value {
            Value::Array(items) => items
                .iter_mut()
                .filter(|v| omitted_count(v).is_none())
                .collect(),
            Value::Object(map) => map.values_mut().collect(),
            _ => return,
        };
        if children.is_empty() {
            return;
        }

        let share = max_tokens.saturating_sub(overhead) / children.len();
        for child in children {
            if self.estimate_value(child) > share {
                let taken = std::mem::take(child);
                *child = self.shrink_child(taken, share);
            }
        }
    }

    fn shrink_child(&self, child: Value, share: usize) -> Value {
        match child {
            Value::Object(map) => Value::Object(self.prune_object(map)),
            Value::Array(items) => Value::Array(reduce_array(items)),
            Value::String(s) => Value::String(self.truncator.truncate(&s, share)),
            other => other,
        }
    }

    fn estimate_value(&self, value: &Value) -> usize {
        self.estimator.estimate(&value.to_string())
    }
}

/// First and last element around a single omission marker. Markers already
/// in the interior are folded into the new count.
fn reduce_array(mut items: Vec<Value>) -> Vec<Value> {
    if items.len() <= 2 {
        return items;
    }
    let last = items.pop();
    let mut iter = items.into_iter();
    let first = iter.next();
    let omitted: usize = iter.map(|v| omitted_count(&v).unwrap_or(1)).sum();

    first
        .into_iter()
        .chain(std::iter::once(Value::String(omission_marker(omitted))))
        .chain(last)
        .collect()
}

/// `value` with every adjustable child replaced by `null`.
fn skeleton(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| {
                    if omitted_count(v).is_some() {
                        v.clone()
                    } else {
                        Value::Null
                    }
                })
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.keys()
                .map(|k| (k.clone(), Value::Null))
                .collect(),
        ),
        other => other.clone(),
    }
}

impl CompressionStrategy for StructuredCompressor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Structured
    }

    fn try_compress(&self, content: &str, max_tokens: usize) -> Option<String> {
        self.compress_structured(content, max_tokens)
    }
}
