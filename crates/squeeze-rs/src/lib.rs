//! Token-budgeted context compression for multi-turn research agents.
//!
//! `squeeze-rs` shapes the message list handed to a language model so it fits
//! a hard token budget. The core abstraction is the
//! [`MessageCompressionPolicy`](context::policy::MessageCompressionPolicy), a
//! reusable, stateless planner that partitions a [`Transcript`] into a
//! protected prefix, a compressible middle and a protected suffix, hands out
//! per-message token ceilings across the middle, and shrinks oversized
//! messages with a chain of shape-aware strategies.
//!
//! The caller keeps the canonical, uncompressed transcript. Compression always
//! returns a *new* transcript for a single model call.
//!
//! # Getting started
//!
//! ```
//! use squeeze_rs::prelude::*;
//!
//! let mut transcript = Transcript::new();
//! transcript.push(Role::System, "You are a careful research assistant.");
//! transcript.push(Role::User, "Survey recent work on sparse attention.");
//! for i in 0..12 {
//!     transcript.push(Role::Tool, format!("<finding>result {i}</finding>").repeat(40));
//! }
//!
//! let budget = CompressionBudget::new(1_500).with_prefix_message_count(2);
//! let policy = MessageCompressionPolicy::new(budget);
//! let compressed = policy.compress(&transcript);
//!
//! assert_eq!(compressed.len(), transcript.len());
//! assert_eq!(compressed.messages()[0], transcript.messages()[0]);
//! ```
//!
//! # Where to find things
//!
//! - **Estimate tokens:** [`TokenEstimator`](context::token::TokenEstimator), by character
//!   heuristic or a `tiktoken` vocabulary ([`Tokenizer`](context::token::Tokenizer)).
//! - **Shrink one message:** the [`CompressionStrategy`](context::strategy::CompressionStrategy)
//!   trait and its implementors: [`StructuredCompressor`](context::structured::StructuredCompressor)
//!   for JSON tool output, [`HeuristicSummarizer`](context::summarizer::HeuristicSummarizer)
//!   for tagged prose, [`SentenceSummarizer`](context::sentences::SentenceSummarizer) for
//!   untagged prose, [`Truncator`](context::truncate::Truncator) as the last resort.
//! - **Shrink a transcript:** [`MessageCompressionPolicy`](context::policy::MessageCompressionPolicy)
//!   configured by a [`CompressionBudget`](context::budget::CompressionBudget).
//! - **Observe what happened:** implement [`EventHandler`](events::EventHandler), or use
//!   [`LoggingHandler`](events::LoggingHandler) / [`OutcomeCollector`](events::OutcomeCollector).
//! - **Load settings from disk:** [`CompressionConfig`](config::CompressionConfig).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Estimator, compressors, strategy chain, budget and policy |
//! | [`events`] | Per-invocation events, outcomes and handlers |
//! | [`config`] | JSON-backed configuration with documented defaults |
//! | [`error`] | Error types for transcript construction and config loading |

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod prelude;

use serde::{Deserialize, Serialize};

pub use error::{ConfigError, TranscriptError};

// ── Messages ───────────────────────────────────────────────────────

/// The role of a message sender in a transcript.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A single transcript entry.
///
/// Messages are immutable value objects. Compression never edits one in
/// place; it builds a replacement with [`with_content`](Self::with_content)
/// that keeps the role and sequence index.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    role: Role,
    content: String,
    sequence_index: usize,
}

impl Message {
    /// Create a message at an explicit transcript position.
    pub fn new(role: Role, content: impl Into<String>, sequence_index: usize) -> Self {
        Self {
            role,
            content: content.into(),
            sequence_index,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    /// A copy of this message carrying different content.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            role: self.role,
            content: content.into(),
            sequence_index: self.sequence_index,
        }
    }
}

// ── Transcript ─────────────────────────────────────────────────────

/// An ordered message history, in conversation order.
///
/// Every message's `sequence_index` equals its position. The invariant is
/// enforced on every constructor, including deserialization.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(try_from = "Vec<Message>", into = "Vec<Message>")]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transcript from raw `(role, content)` turns, assigning indexes.
    pub fn from_turns<I, S>(turns: I) -> Self
    where
        I: IntoIterator<Item = (Role, S)>,
        S: Into<String>,
    {
        let mut transcript = Self::new();
        for (role, content) in turns {
            transcript.push(role, content);
        }
        transcript
    }

    /// Adopt pre-built messages, checking that each index matches its position.
    pub fn from_messages(messages: Vec<Message>) -> Result<Self, TranscriptError> {
        for (position, msg) in messages.iter().enumerate() {
            if msg.sequence_index != position {
                return Err(TranscriptError::IndexMismatch {
                    position,
                    found: msg.sequence_index,
                });
            }
        }
        Ok(Self { messages })
    }

    /// Append a message and return its assigned sequence index.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> usize {
        let index = self.messages.len();
        self.messages.push(Message::new(role, content, index));
        index
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Wrap messages whose indexes are already known to match positions.
    pub(crate) fn from_ordered(messages: Vec<Message>) -> Self {
        debug_assert!(
            messages
                .iter()
                .enumerate()
                .all(|(i, m)| m.sequence_index == i)
        );
        Self { messages }
    }
}

impl TryFrom<Vec<Message>> for Transcript {
    type Error = TranscriptError;

    fn try_from(messages: Vec<Message>) -> Result<Self, Self::Error> {
        Self::from_messages(messages)
    }
}

impl From<Transcript> for Vec<Message> {
    fn from(transcript: Transcript) -> Self {
        transcript.messages
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
