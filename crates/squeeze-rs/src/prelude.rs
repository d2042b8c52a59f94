//! Convenience re-exports for common `squeeze-rs` types.
//!
//! ```
//! use squeeze_rs::prelude::*;
//! ```
//!
//! Covers the transcript model, the policy and its budget, the strategy
//! types and the event handlers. Constants and the individual compressors'
//! helpers stay in their modules.

// ── Transcript ──────────────────────────────────────────────────────
pub use crate::{Message, Role, Transcript};

// ── Compression ─────────────────────────────────────────────────────
pub use crate::context::{
    CompressionBudget, CompressionReport, CompressionStrategy, HeuristicSummarizer,
    MessageCompressionPolicy, SentenceSummarizer, StrategyChain, StrategyKind,
    StructuredCompressor, TokenEstimator, Tokenizer, Truncator, compress_blocking,
};

// ── Events ──────────────────────────────────────────────────────────
pub use crate::events::{
    CompositeEventHandler, CompressionEvent, CompressionOutcome, EventHandler, FnEventHandler,
    LoggingHandler, NoopHandler, OutcomeCollector,
};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::CompressionConfig;
pub use crate::error::{ConfigError, TranscriptError};
