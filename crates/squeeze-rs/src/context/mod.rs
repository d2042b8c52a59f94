//! Context compression: estimation, per-message strategies and the
//! transcript-level policy.
//!
//! Layered from leaves to orchestration:
//!
//! 1. **[`token`]**: [`TokenEstimator`] maps text to an approximate token
//!    count, by character heuristic or a BPE vocabulary. Every other
//!    component shares one instance.
//!
//! 2. **[`strategy`]**: the [`CompressionStrategy`] contract ("fit this
//!    content into N tokens, or decline") and the ordered [`StrategyChain`].
//!
//! 3. The strategies themselves:
//!    - **[`structured`]**: JSON arrays keep first/last element, objects keep
//!      allow-listed fields.
//!    - **[`summarizer`]**: tagged prose keeps first/last unit around an
//!      omission count.
//!    - **[`sentences`]**: untagged prose keeps its opening and closing
//!      sentences around an omission count.
//!    - **[`truncate`]**: prefix plus `"... [truncated]"`. Always applicable.
//!
//! 4. **[`budget`]** and **[`policy`]**: partition a transcript into
//!    protected prefix, compressible middle and protected suffix, share the
//!    budget across the middle, and run the chain on oversized messages.

pub mod budget;
pub mod policy;
pub mod sentences;
pub mod strategy;
pub mod structured;
pub mod summarizer;
pub mod token;
pub mod truncate;

pub use budget::CompressionBudget;
pub use policy::{CompressionReport, MessageCompressionPolicy, ZoneBreakdown, compress_blocking};
pub use strategy::{CompressionStrategy, StrategyChain, StrategyKind};
pub use structured::StructuredCompressor;
pub use sentences::SentenceSummarizer;
pub use summarizer::HeuristicSummarizer;
pub use token::{DEFAULT_CHARS_PER_TOKEN, TokenEstimator, Tokenizer};
pub use truncate::{ELISION_MARKER, TRUNCATION_MARKER, Truncator};
