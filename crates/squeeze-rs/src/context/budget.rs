//! Token budget for a compression pass.
//!
//! A [`CompressionBudget`] splits a transcript into three zones:
//!
//! - **Protected prefix**: the first `prefix_message_count` messages (system
//!   prompt, original task). Never modified.
//! - **Compressible middle**: everything between the two protected zones.
//! - **Protected suffix**: the last `suffix_window_size` messages. Full
//!   fidelity for the turns the model is reasoning about right now.
//!
//! `older_share` and `recent_share` are fractions of what remains of
//! `total_token_limit` after both protected zones are paid for. The middle
//! receives `older_share`; `recent_share` is headroom for estimator error and
//! is never handed out.
//!
//! # Example
//!
//! ```
//! use squeeze_rs::context::budget::CompressionBudget;
//!
//! let budget = CompressionBudget::new(8_000)
//!     .with_prefix_message_count(2)
//!     .with_suffix_window_size(4);
//!
//! assert_eq!(budget.partition(10), Some((2, 4)));
//! assert_eq!(budget.older_budget(1_000), 600);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Messages kept verbatim at the start of the transcript.
pub const DEFAULT_PREFIX_MESSAGE_COUNT: usize = 3;

/// Messages kept verbatim at the end of the transcript.
pub const DEFAULT_SUFFIX_WINDOW_SIZE: usize = 5;

/// Share of the compressible remainder handed to the middle.
pub const DEFAULT_OLDER_SHARE: f64 = 0.6;

/// Share of the compressible remainder held back as headroom.
pub const DEFAULT_RECENT_SHARE: f64 = 0.4;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CompressionBudget {
    /// Hard ceiling for the whole transcript, in estimated tokens.
    pub total_token_limit: usize,
    pub prefix_message_count: usize,
    pub suffix_window_size: usize,
    pub older_share: f64,
    pub recent_share: f64,
}

impl CompressionBudget {
    /// A budget with the default zone sizes and shares.
    pub fn new(total_token_limit: usize) -> Self {
        Self {
            total_token_limit,
            prefix_message_count: DEFAULT_PREFIX_MESSAGE_COUNT,
            suffix_window_size: DEFAULT_SUFFIX_WINDOW_SIZE,
            older_share: DEFAULT_OLDER_SHARE,
            recent_share: DEFAULT_RECENT_SHARE,
        }
    }

    pub fn with_prefix_message_count(mut self, count: usize) -> Self {
        self.prefix_message_count = count;
        self
    }

    pub fn with_suffix_window_size(mut self, size: usize) -> Self {
        self.suffix_window_size = size;
        self
    }

    /// Set both shares. They are not normalised; see [`validate`](Self::validate)
    /// and [`older_budget`](Self::older_budget).
    pub fn with_shares(mut self, older_share: f64, recent_share: f64) -> Self {
        self.older_share = older_share;
        self.recent_share = recent_share;
        self
    }

    /// Sizes of the protected `(prefix, suffix)` zones for a transcript of
    /// `len` messages. Returns `None` when the transcript is too short to
    /// have a compressible middle.
    pub fn partition(&self, len: usize) -> Option<(usize, usize)> {
        if len <= self.prefix_message_count + self.suffix_window_size {
            return None;
        }
        Some((self.prefix_message_count, self.suffix_window_size))
    }

    /// Tokens left for the middle once the protected zones are paid for.
    /// Negative when the protected zones alone overrun the limit.
    pub fn available(&self, protected_tokens: usize) -> i64 {
        self.total_token_limit as i64 - protected_tokens as i64
    }

    /// The middle's allocation out of `available` tokens. Never more than
    /// `available`: `older_share` is clamped to `[0.0, 1.0]` and NaN counts
    /// as zero, whether or not the budget was validated.
    pub fn older_budget(&self, available: i64) -> usize {
        if available <= 0 {
            return 0;
        }
        let share = if self.older_share.is_nan() {
            0.0
        } else {
            self.older_share.clamp(0.0, 1.0)
        };
        ((available as f64 * share).floor() as usize).min(available as usize)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("older_share", self.older_share),
            ("recent_share", self.recent_share),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ShareOutOfRange { field, value });
            }
        }
        let sum = self.older_share + self.recent_share;
        if sum > 1.0 + f64::EPSILON {
            return Err(ConfigError::SharesExceedOne(sum));
        }
        Ok(())
    }
}
