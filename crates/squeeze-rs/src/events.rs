//! Events, outcomes and handlers for a compression pass.
//!
//! Every call to
//! [`MessageCompressionPolicy::compress_with_handler`](crate::context::policy::MessageCompressionPolicy::compress_with_handler)
//! emits a short, ordered stream of [`CompressionEvent`]s: one `Started`, an
//! optional `BudgetExhausted`, one `Outcome` per message in transcript order,
//! and one `Finished`. Callers implement [`EventHandler`] to feed these into
//! metrics or test assertions.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget compression |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`OutcomeCollector`] | Keep every per-message outcome for later inspection |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Role;
use crate::context::policy::ZoneBreakdown;
use crate::context::strategy::StrategyKind;

// ── Outcomes ───────────────────────────────────────────────────────

/// What happened to one message during a compression pass.
///
/// Observability only. Outcomes are never part of the transcript.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CompressionOutcome {
    pub sequence_index: usize,
    pub role: Role,
    pub original_token_estimate: usize,
    pub compressed_token_estimate: usize,
    pub strategy_applied: StrategyKind,
}

impl CompressionOutcome {
    /// Tokens removed from this message. Zero for untouched messages.
    pub fn tokens_saved(&self) -> usize {
        self.original_token_estimate
            .saturating_sub(self.compressed_token_estimate)
    }

    pub fn was_compressed(&self) -> bool {
        self.strategy_applied != StrategyKind::None
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the policy during one compression pass.
#[derive(Debug)]
pub enum CompressionEvent<'a> {
    /// A compression pass is starting.
    Started {
        message_count: usize,
        estimated_tokens: usize,
        token_limit: usize,
    },
    /// The protected zones alone use up the limit. Every compressible
    /// message is about to collapse to its minimal form. Messages that
    /// already estimate to zero tokens are left unchanged and report `none`.
    BudgetExhausted {
        protected_tokens: usize,
        token_limit: usize,
        middle_count: usize,
    },
    /// The fate of a single message. Emitted for every message, protected
    /// ones included, in transcript order.
    Outcome(&'a CompressionOutcome),
    /// The pass is complete.
    Finished { breakdown: &'a ZoneBreakdown },
}

/// Handler for compression events.
///
/// # Example
///
/// ```
/// use squeeze_rs::events::{CompressionEvent, EventHandler};
///
/// struct SavedTokens(std::sync::atomic::AtomicUsize);
///
/// impl EventHandler for SavedTokens {
///     fn on_event(&self, event: &CompressionEvent<'_>) {
///         if let CompressionEvent::Outcome(outcome) = event {
///             self.0.fetch_add(outcome.tokens_saved(), std::sync::atomic::Ordering::Relaxed);
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called for each event. The default implementation ignores it.
    fn on_event(&self, event: &CompressionEvent<'_>) {
        let _ = event;
    }
}

impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    fn on_event(&self, event: &CompressionEvent<'_>) {
        (**self).on_event(event)
    }
}

/// A handler that ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```
/// use squeeze_rs::events::{CompressionEvent, FnEventHandler};
///
/// let handler = FnEventHandler::new(|event| {
///     if let CompressionEvent::BudgetExhausted { protected_tokens, .. } = event {
///         eprintln!("protected zones alone use {protected_tokens} tokens");
///     }
/// });
/// # let _ = handler;
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&CompressionEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&CompressionEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&CompressionEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &CompressionEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler, in registration order.
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a handler to the chain. Handlers are called in registration order.
    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler without breaking the builder chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &CompressionEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Records every [`CompressionOutcome`] it sees.
///
/// Wrap it in an [`Arc`] to keep a handle after passing it to a
/// [`CompositeEventHandler`].
#[derive(Debug, Default)]
pub struct OutcomeCollector {
    outcomes: Mutex<Vec<CompressionOutcome>>,
}

impl OutcomeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the outcomes recorded so far.
    pub fn outcomes(&self) -> Vec<CompressionOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Drain the recorded outcomes.
    pub fn take(&self) -> Vec<CompressionOutcome> {
        std::mem::take(
            &mut *self
                .outcomes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl EventHandler for OutcomeCollector {
    fn on_event(&self, event: &CompressionEvent<'_>) {
        if let CompressionEvent::Outcome(outcome) = event {
            self.outcomes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push((*outcome).clone());
        }
    }
}

/// Logs events through `tracing`.
///
/// Per-message outcomes are logged at `debug`, and only for messages that
/// were actually compressed. Budget exhaustion is a `warn`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &CompressionEvent<'_>) {
        match event {
            CompressionEvent::Started {
                message_count,
                estimated_tokens,
                token_limit,
            } => {
                debug!(
                    "Compressing {message_count} messages: ~{estimated_tokens} tokens against a limit of {token_limit}"
                );
            }
            CompressionEvent::BudgetExhausted {
                protected_tokens,
                token_limit,
                middle_count,
            } => {
                warn!(
                    "Budget exhausted: protected zones use {protected_tokens} of {token_limit} tokens; collapsing {middle_count} middle messages"
                );
            }
            CompressionEvent::Outcome(outcome) => {
                if outcome.was_compressed() {
                    debug!(
                        "  [{}] {} {}: {} -> {} tokens",
                        outcome.sequence_index,
                        outcome.role,
                        outcome.strategy_applied,
                        outcome.original_token_estimate,
                        outcome.compressed_token_estimate,
                    );
                }
            }
            CompressionEvent::Finished { breakdown } => {
                debug!("  zones: {}", breakdown.to_log_string());
            }
        }
    }
}
