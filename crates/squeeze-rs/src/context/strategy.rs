//! The "compress within a ceiling, or decline" contract.
//!
//! Content-shape sniffing is an ordered list of strategies rather than a
//! nest of conditionals. Each strategy inspects the content and either
//! returns a reduced rendition or `None` ("not my shape"). The first strategy
//! that accepts wins. Adding a compressor for a new shape (tables,
//! diffs) means implementing [`CompressionStrategy`] and pushing it onto a
//! [`StrategyChain`].

use serde::{Deserialize, Serialize};

use super::sentences::SentenceSummarizer;
use super::structured::StructuredCompressor;
use super::summarizer::HeuristicSummarizer;
use super::token::TokenEstimator;
use super::truncate::Truncator;

/// Which strategy produced a message's final content.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Passed through unchanged.
    #[default]
    None,
    Structured,
    Heuristic,
    Truncated,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::None => write!(f, "none"),
            StrategyKind::Structured => write!(f, "structured"),
            StrategyKind::Heuristic => write!(f, "heuristic"),
            StrategyKind::Truncated => write!(f, "truncated"),
        }
    }
}

/// A single content-shape compressor.
///
/// Implementations must never panic on malformed input: content they cannot
/// interpret is declined with `None` so the next strategy gets a turn.
pub trait CompressionStrategy: Send + Sync + std::fmt::Debug {
    /// The label recorded in outcomes when this strategy is applied.
    fn kind(&self) -> StrategyKind;

    /// Reduce `content` to at most `max_tokens`, or decline.
    fn try_compress(&self, content: &str, max_tokens: usize) -> Option<String>;
}

/// An ordered list of strategies tried first to last.
#[derive(Debug, Default)]
pub struct StrategyChain {
    strategies: Vec<Box<dyn CompressionStrategy>>,
}

impl StrategyChain {
    /// An empty chain. Every message passes through it unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// structured → tagged units → sentences → truncation, all sharing one
    /// estimator.
    pub fn standard(estimator: TokenEstimator) -> Self {
        Self::new()
            .with(StructuredCompressor::new(estimator.clone()))
            .with(HeuristicSummarizer::new(estimator.clone()))
            .with(SentenceSummarizer::new(estimator.clone()))
            .with(Truncator::new(estimator))
    }

    /// Append a strategy. Strategies run in registration order.
    pub fn with(mut self, strategy: impl CompressionStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Kinds in the order they are tried.
    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Run the chain. Returns the first accepted rendition and who made it.
    pub fn apply(&self, content: &str, max_tokens: usize) -> Option<(String, StrategyKind)> {
        self.strategies.iter().find_map(|strategy| {
            strategy
                .try_compress(content, max_tokens)
                .map(|out| (out, strategy.kind()))
        })
    }
}
