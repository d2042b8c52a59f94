//! Transcript-level compression.
//!
//! [`MessageCompressionPolicy`] takes a full [`Transcript`] and returns a new
//! one that fits the configured [`CompressionBudget`]:
//!
//! 1. Transcripts with no compressible middle, or that already fit the limit,
//!    come back unchanged.
//! 2. `available = limit - prefix - suffix`. If that is not positive, every
//!    middle message collapses to its minimal truncated form.
//! 3. The middle gets `floor(available * older_share)` tokens. Messages are
//!    visited oldest first; each may use an equal share of what is still
//!    unspent, so allowance left over by small messages flows to later ones.
//! 4. A message above its ceiling runs the strategy chain. If the chain
//!    declines or overshoots, plain truncation is applied.
//!
//! The protected prefix and suffix are never touched, and sequence indexes
//! are preserved.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::budget::CompressionBudget;
use super::strategy::{StrategyChain, StrategyKind};
use super::token::TokenEstimator;
use super::truncate::Truncator;
use crate::config::CompressionConfig;
use crate::error::ConfigError;
use crate::events::{CompressionEvent, CompressionOutcome, EventHandler, NoopHandler};
use crate::{Message, Transcript};

// ── Breakdown ──────────────────────────────────────────────────────

/// Per-zone token accounting for one compression pass.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneBreakdown {
    pub prefix_tokens: usize,
    pub suffix_tokens: usize,
    pub middle_tokens_before: usize,
    pub middle_tokens_after: usize,
    /// Limit minus both protected zones. Negative on protected overrun.
    pub available: i64,
    /// The middle's allocation out of `available`.
    pub older_budget: usize,
    pub total_tokens_before: usize,
    pub total_tokens_after: usize,
}

impl ZoneBreakdown {
    pub fn to_log_string(&self) -> String {
        format!(
            "prefix={}t, middle={}t->{}t (budget {}t of {}t available), suffix={}t, total={}t->{}t",
            self.prefix_tokens,
            self.middle_tokens_before,
            self.middle_tokens_after,
            self.older_budget,
            self.available,
            self.suffix_tokens,
            self.total_tokens_before,
            self.total_tokens_after,
        )
    }

    /// Percentage of the original estimate removed.
    pub fn reduction_pct(&self) -> f64 {
        if self.total_tokens_before == 0 {
            return 0.0;
        }
        let saved = self.total_tokens_before.saturating_sub(self.total_tokens_after);
        saved as f64 / self.total_tokens_before as f64 * 100.0
    }
}

/// The result of [`MessageCompressionPolicy::compress_with_report`].
#[derive(Debug, Clone)]
pub struct CompressionReport {
    pub transcript: Transcript,
    /// One entry per message, in transcript order.
    pub outcomes: Vec<CompressionOutcome>,
    pub breakdown: ZoneBreakdown,
}

impl CompressionReport {
    /// Number of messages whose content changed.
    pub fn compressed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.was_compressed()).count()
    }
}

// ── Policy ─────────────────────────────────────────────────────────

/// Fits a transcript into a token budget.
///
/// Holds no per-call state. One instance can be shared across threads and
/// used for any number of transcripts.
#[derive(Debug)]
pub struct MessageCompressionPolicy {
    budget: CompressionBudget,
    estimator: TokenEstimator,
    truncator: Truncator,
    strategies: StrategyChain,
}

impl MessageCompressionPolicy {
    /// A policy with the default estimator and the standard strategy chain.
    ///
    /// The budget is not validated here. Out-of-range shares are clamped
    /// when the middle's allocation is computed; use
    /// [`CompressionBudget::validate`] to reject them instead.
    pub fn new(budget: CompressionBudget) -> Self {
        let estimator = TokenEstimator::default();
        Self {
            budget,
            truncator: Truncator::new(estimator.clone()),
            strategies: StrategyChain::standard(estimator.clone()),
            estimator,
        }
    }

    /// Build a policy from a validated configuration.
    pub fn from_config(config: &CompressionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let estimator = config.estimator();
        Ok(Self {
            budget: config.budget(),
            truncator: Truncator::new(estimator.clone()),
            strategies: config.strategy_chain_for(&estimator)?,
            estimator,
        })
    }

    /// Use a different estimator. The strategy chain is rebuilt as the
    /// standard chain around it, so call this before
    /// [`with_strategies`](Self::with_strategies).
    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.truncator = Truncator::new(estimator.clone());
        self.strategies = StrategyChain::standard(estimator.clone());
        self.estimator = estimator;
        self
    }

    /// Replace the strategy chain.
    pub fn with_strategies(mut self, strategies: StrategyChain) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn budget(&self) -> &CompressionBudget {
        &self.budget
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    pub fn strategies(&self) -> &StrategyChain {
        &self.strategies
    }

    /// Compress `transcript`. The input is left untouched.
    pub fn compress(&self, transcript: &Transcript) -> Transcript {
        self.compress_with_handler(transcript, &NoopHandler).transcript
    }

    /// Compress and return per-message outcomes and zone accounting.
    pub fn compress_with_report(&self, transcript: &Transcript) -> CompressionReport {
        self.compress_with_handler(transcript, &NoopHandler)
    }

    /// Compress, reporting progress to `handler`.
    pub fn compress_with_handler(
        &self,
        transcript: &Transcript,
        handler: &dyn EventHandler,
    ) -> CompressionReport {
        let messages = transcript.messages();
        let len = messages.len();
        let sizes: Vec<usize> = messages
            .iter()
            .map(|m| self.estimator.estimate_message(m))
            .collect();
        let total_before = sizes.iter().fold(0, |acc: usize, &n| acc.saturating_add(n));
        let limit = self.budget.total_token_limit;

        let prefix_len = self.budget.prefix_message_count.min(len);
        let suffix_len = self.budget.suffix_window_size.min(len - prefix_len);
        let middle_end = len - suffix_len;

        let prefix_tokens = sizes[..prefix_len]
            .iter()
            .fold(0, |acc: usize, &n| acc.saturating_add(n));
        let suffix_tokens = sizes[middle_end..]
            .iter()
            .fold(0, |acc: usize, &n| acc.saturating_add(n));
        let protected_tokens = prefix_tokens.saturating_add(suffix_tokens);
        let middle_before = total_before.saturating_sub(protected_tokens);
        let available = self.budget.available(protected_tokens);
        let older_budget = self.budget.older_budget(available);

        let mut breakdown = ZoneBreakdown {
            prefix_tokens,
            suffix_tokens,
            middle_tokens_before: middle_before,
            middle_tokens_after: middle_before,
            available,
            older_budget,
            total_tokens_before: total_before,
            total_tokens_after: total_before,
        };

        handler.on_event(&CompressionEvent::Started {
            message_count: len,
            estimated_tokens: total_before,
            token_limit: limit,
        });

        if self.budget.partition(len).is_none() || total_before <= limit {
            let outcomes: Vec<CompressionOutcome> = messages
                .iter()
                .zip(&sizes)
                .map(|(m, &size)| unchanged(m, size))
                .collect();
            for outcome in &outcomes {
                handler.on_event(&CompressionEvent::Outcome(outcome));
            }
            handler.on_event(&CompressionEvent::Finished {
                breakdown: &breakdown,
            });
            return CompressionReport {
                transcript: transcript.clone(),
                outcomes,
                breakdown,
            };
        }

        let exhausted = available <= 0;
        if protected_tokens > limit {
            warn!(
                "Protected messages alone exceed the token limit: {} > {}",
                protected_tokens, limit
            );
        }
        if exhausted {
            warn!(
                "No budget left for {} middle messages; collapsing them",
                middle_end - prefix_len
            );
            handler.on_event(&CompressionEvent::BudgetExhausted {
                protected_tokens,
                token_limit: limit,
                middle_count: middle_end - prefix_len,
            });
        }

        let mut out = Vec::with_capacity(len);
        let mut outcomes = Vec::with_capacity(len);

        for (msg, &size) in messages[..prefix_len].iter().zip(&sizes) {
            out.push(msg.clone());
            outcomes.push(unchanged(msg, size));
        }

        let middle_len = middle_end - prefix_len;
        let mut remaining = older_budget;
        let mut middle_after = 0;
        for (offset, (msg, &size)) in messages[prefix_len..middle_end]
            .iter()
            .zip(&sizes[prefix_len..middle_end])
            .enumerate()
        {
            let (content, kind) = if exhausted {
                self.collapse(msg.content())
            } else {
                let ceiling = remaining / (middle_len - offset);
                if size <= ceiling {
                    (None, StrategyKind::None)
                } else {
                    self.shrink(msg.content(), ceiling)
                }
            };

            let (compressed, after) = match content {
                Some(c) => {
                    let after = self.estimator.estimate(&c);
                    debug!(
                        "Compressed message {} ({}): {} -> {} tokens via {}",
                        msg.sequence_index(),
                        msg.role(),
                        size,
                        after,
                        kind
                    );
                    (msg.with_content(c), after)
                }
                None => (msg.clone(), size),
            };
            remaining = remaining.saturating_sub(after);
            middle_after += after;

            outcomes.push(CompressionOutcome {
                sequence_index: msg.sequence_index(),
                role: msg.role(),
                original_token_estimate: size,
                compressed_token_estimate: after,
                strategy_applied: kind,
            });
            out.push(compressed);
        }

        for (msg, &size) in messages[middle_end..].iter().zip(&sizes[middle_end..]) {
            out.push(msg.clone());
            outcomes.push(unchanged(msg, size));
        }

        breakdown.middle_tokens_after = middle_after;
        breakdown.total_tokens_after = prefix_tokens + middle_after + suffix_tokens;

        info!(
            "Message compression completed: {} -> {} tokens (reduction: {:.1}%)",
            breakdown.total_tokens_before,
            breakdown.total_tokens_after,
            breakdown.reduction_pct()
        );

        for outcome in &outcomes {
            handler.on_event(&CompressionEvent::Outcome(outcome));
        }
        handler.on_event(&CompressionEvent::Finished {
            breakdown: &breakdown,
        });

        CompressionReport {
            transcript: Transcript::from_ordered(out),
            outcomes,
            breakdown,
        }
    }

    /// Run the chain for one message; fall back to truncation if the chain
    /// declines or overshoots the ceiling.
    fn shrink(&self, content: &str, ceiling: usize) -> (Option<String>, StrategyKind) {
        match self.strategies.apply(content, ceiling) {
            Some((out, kind)) if self.estimator.estimate(&out) <= ceiling => (Some(out), kind),
            _ => (
                Some(self.truncator.truncate(content, ceiling)),
                StrategyKind::Truncated,
            ),
        }
    }

    /// Minimal form for a message when there is no budget at all.
    ///
    /// Content that already estimates within zero tokens (empty or very
    /// short text, or an earlier elision marker) cannot be reduced further
    /// and is left as it is, reported as `none`. Every other middle message
    /// becomes [`ELISION_MARKER`](super::truncate::ELISION_MARKER).
    fn collapse(&self, content: &str) -> (Option<String>, StrategyKind) {
        let out = self.truncator.truncate(content, 0);
        if out == content {
            (None, StrategyKind::None)
        } else {
            (Some(out), StrategyKind::Truncated)
        }
    }
}

fn unchanged(msg: &Message, size: usize) -> CompressionOutcome {
    CompressionOutcome {
        sequence_index: msg.sequence_index(),
        role: msg.role(),
        original_token_estimate: size,
        compressed_token_estimate: size,
        strategy_applied: StrategyKind::None,
    }
}

/// Run [`MessageCompressionPolicy::compress`] on tokio's blocking pool.
///
/// Compression is CPU-bound. Async callers should not run it on a reactor
/// thread for large transcripts.
pub async fn compress_blocking(
    policy: Arc<MessageCompressionPolicy>,
    transcript: Transcript,
) -> Result<Transcript, tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || policy.compress(&transcript)).await
}
