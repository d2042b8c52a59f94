//! Rule-based summarization of prose built from repeated tagged units.
//!
//! Research agents emit long assistant turns made of `<finding>...</finding>`
//! blocks. When such a message has to shrink, the first and last unit are
//! kept verbatim and everything between them becomes a single count marker:
//!
//! ```text
//! <finding>A</finding>
//! [... 1 findings omitted ...]
//! <finding>C</finding>
//! ```
//!
//! Markers already present between the kept units are folded into the new
//! count, so summarizing a summary never loses track of how much was dropped.
//! No model call is involved.
//!
//! When even the two kept units are too large, their bodies are cut inside
//! the delimiters, so both units still open and close. The body is the unit
//! pattern's first capture group. A custom pattern without a capture group
//! has no known body: such units are cut as plain text and may lose their
//! closing delimiter. If neither cut fits, the two units are joined and
//! truncated as plain text, which usually drops the last unit.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::strategy::{CompressionStrategy, StrategyKind};
use super::token::TokenEstimator;
use super::truncate::Truncator;

/// Default sub-unit delimiter. Group 1 is the unit body.
pub const DEFAULT_UNIT_PATTERN: &str = r"(?s)<finding>(.*?)</finding>";

/// Default noun used in omission markers.
pub const DEFAULT_UNIT_LABEL: &str = "findings";

static DEFAULT_UNIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_UNIT_PATTERN).expect("default unit pattern is valid"));

static DEFAULT_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    marker_regex(DEFAULT_UNIT_LABEL).expect("default marker pattern is valid")
});

/// Matches `[... N <label> omitted ...]`, capturing N.
pub(crate) fn marker_regex(label: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"\[\.\.\. (\d+) {} omitted \.\.\.\]",
        regex::escape(label)
    ))
}

#[derive(Debug, Clone)]
pub struct HeuristicSummarizer {
    estimator: TokenEstimator,
    truncator: Truncator,
    unit: Regex,
    marker: Regex,
    label: String,
}

impl Default for HeuristicSummarizer {
    fn default() -> Self {
        Self::new(TokenEstimator::default())
    }
}

impl HeuristicSummarizer {
    /// A summarizer for `<finding>` blocks.
    pub fn new(estimator: TokenEstimator) -> Self {
        Self {
            truncator: Truncator::new(estimator.clone()),
            estimator,
            unit: DEFAULT_UNIT_RE.clone(),
            marker: DEFAULT_MARKER_RE.clone(),
            label: DEFAULT_UNIT_LABEL.to_string(),
        }
    }

    /// A summarizer for a custom sub-unit delimiter, e.g.
    /// `(?s)<source>(.*?)</source>` labelled `"sources"`.
    pub fn with_pattern(
        pattern: &str,
        label: impl Into<String>,
        estimator: TokenEstimator,
    ) -> Result<Self, regex::Error> {
        let label = label.into();
        Ok(Self {
            truncator: Truncator::new(estimator.clone()),
            estimator,
            unit: Regex::new(pattern)?,
            marker: marker_regex(&label)?,
            label,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pattern(&self) -> &str {
        self.unit.as_str()
    }

    /// The marker line standing in for `count` omitted units.
    pub fn omission_marker(&self, count: usize) -> String {
        format!("[... {count} {} omitted ...]", self.label)
    }

    /// Summarize `content` to at most `max_tokens`.
    ///
    /// Returns `None` when fewer than two units are present.
    pub fn summarize(&self, content: &str, max_tokens: usize) -> Option<String> {
        let units: Vec<Captures<'_>> = self.unit.captures_iter(content).collect();
        if units.len() < 2 {
            return None;
        }
        let first = &units[0];
        let last = &units[units.len() - 1];
        let (head, tail) = (first.get(0)?, last.get(0)?);

        let interior = content.get(head.end()..tail.start()).unwrap_or_default();
        let folded: usize = self
            .marker
            .captures_iter(interior)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<usize>().ok())
            .sum();
        let omitted = units.len() - 2 + folded;
        let marker = (omitted > 0).then(|| self.omission_marker(omitted));

        let summary = join_units(head.as_str(), marker.as_deref(), tail.as_str());
        if self.estimator.estimate(&summary) <= max_tokens {
            return Some(summary);
        }
        if let Some(fitted) = self.fit_units(content, first, last, marker.as_deref(), max_tokens) {
            return Some(fitted);
        }

        let pair = join_units(head.as_str(), None, tail.as_str());
        Some(self.truncator.truncate(&pair, max_tokens))
    }

    /// Cut both kept units to share `max_tokens`. Leftover from the first
    /// unit goes to the last.
    fn fit_units(
        &self,
        content: &str,
        first: &Captures<'_>,
        last: &Captures<'_>,
        marker: Option<&str>,
        max_tokens: usize,
    ) -> Option<String> {
        // Two separators and rounding at each join.
        let reserve = marker.map_or(0, |m| self.estimator.estimate(m)) + 2;
        let available = max_tokens.checked_sub(reserve)?;

        let head = self.fit_unit(content, first, available / 2)?;
        let rest = available.saturating_sub(self.estimator.estimate(&head));
        let tail = self.fit_unit(content, last, rest)?;

        let out = join_units(&head, marker, &tail);
        (self.estimator.estimate(&out) <= max_tokens).then_some(out)
    }

    /// One unit within `share` tokens, cutting its body when the pattern
    /// captures one.
    fn fit_unit(&self, content: &str, unit: &Captures<'_>, share: usize) -> Option<String> {
        let whole = unit.get(0)?;
        if self.estimator.estimate(whole.as_str()) <= share {
            return Some(whole.as_str().to_string());
        }
        let Some(body) = unit.get(1) else {
            return Some(self.truncator.truncate(whole.as_str(), share));
        };

        let open = content.get(whole.start()..body.start())?;
        let close = content.get(body.end()..whole.end())?;
        let frame = self.estimator.estimate(&format!("{open}{close}"));
        let body_budget = share.checked_sub(frame + 1)?;

        let out = format!(
            "{open}{}{close}",
            self.truncator.truncate(body.as_str(), body_budget)
        );
        (self.estimator.estimate(&out) <= share).then_some(out)
    }
}

fn join_units(head: &str, marker: Option<&str>, tail: &str) -> String {
    match marker {
        Some(marker) => format!("{head}\n{marker}\n{tail}"),
        None => format!("{head}\n{tail}"),
    }
}

impl CompressionStrategy for HeuristicSummarizer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Heuristic
    }

    fn try_compress(&self, content: &str, max_tokens: usize) -> Option<String> {
        self.summarize(content, max_tokens)
    }
}
