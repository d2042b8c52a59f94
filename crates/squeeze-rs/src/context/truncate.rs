//! Last-resort truncation to a fixed token budget.
//!
//! Keeps a content prefix and appends [`TRUNCATION_MARKER`]. The marker is
//! charged against the budget before the prefix is chosen, so the output
//! never estimates above `max_tokens`.
//!
//! With the character estimator, the nominal character budget is
//! `max_tokens × chars_per_token` (4.0 by default). Non-ASCII characters cost
//! a full token each, so a prefix containing them is cut earlier than the
//! nominal budget. With a BPE estimator there is no nominal budget: the
//! longest prefix is found by bisection, and every candidate is estimated as
//! it will be emitted.

use super::strategy::{CompressionStrategy, StrategyKind};
use super::token::TokenEstimator;

/// Suffix appended to truncated content.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Output when not even [`TRUNCATION_MARKER`] fits the budget. Estimates to
/// zero tokens at the default character ratio and to one BPE token.
pub const ELISION_MARKER: &str = "...";

/// Deterministic prefix-keeping truncation.
#[derive(Debug, Clone, Default)]
pub struct Truncator {
    estimator: TokenEstimator,
}

impl Truncator {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    /// Nominal character budget for `max_tokens`.
    pub fn char_budget(&self, max_tokens: usize) -> usize {
        (max_tokens as f64 * self.estimator.chars_per_token()) as usize
    }

    /// Clamp `content` to `max_tokens`.
    ///
    /// Content that already fits is returned unchanged, which makes repeated
    /// application a no-op.
    pub fn truncate(&self, content: &str, max_tokens: usize) -> String {
        if self.estimator.estimate(content) <= max_tokens {
            return content.to_string();
        }
        if self.estimator.estimate(TRUNCATION_MARKER) > max_tokens {
            return ELISION_MARKER.to_string();
        }

        // Byte offset after each character; `ends[k]` closes a k-char prefix.
        let ends: Vec<usize> = content
            .char_indices()
            .map(|(i, _)| i)
            .skip(1)
            .chain(std::iter::once(content.len()))
            .collect();
        let prefix = |chars: usize| match chars {
            0 => "",
            k => content.get(..ends[k - 1]).unwrap_or_default(),
        };
        let fits = |chars: usize| {
            let mut candidate = prefix(chars).to_string();
            candidate.push_str(TRUNCATION_MARKER);
            self.estimator.estimate(&candidate) <= max_tokens
        };

        let mut hi = ends.len();
        if self.estimator.is_char_based() {
            let nominal = self
                .char_budget(max_tokens)
                .saturating_sub(TRUNCATION_MARKER.chars().count());
            hi = hi.min(nominal);
        }

        // Largest k in [0, hi] that fits. k = 0 fits: the marker was checked.
        let mut lo = 0;
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if fits(mid) {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        let mut out = prefix(lo).to_string();
        out.push_str(TRUNCATION_MARKER);
        out
    }
}

impl CompressionStrategy for Truncator {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Truncated
    }

    fn try_compress(&self, content: &str, max_tokens: usize) -> Option<String> {
        if content.is_empty() {
            return None;
        }
        Some(self.truncate(content, max_tokens))
    }
}
