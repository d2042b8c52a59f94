//! JSON-backed configuration.
//!
//! Every field has a default, so a config file only needs the settings it
//! changes:
//!
//! ```json
//! {
//!   "total_token_limit": 64000,
//!   "tokenizer": "o200k_base",
//!   "suffix_window_size": 8,
//!   "model_token_limits": { "gpt-4o": 128000, "small-local": 8000 }
//! }
//! ```
//!
//! Unknown fields are rejected so that typos surface as errors instead of
//! silently falling back to defaults.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::budget::{
    CompressionBudget, DEFAULT_OLDER_SHARE, DEFAULT_PREFIX_MESSAGE_COUNT, DEFAULT_RECENT_SHARE,
    DEFAULT_SUFFIX_WINDOW_SIZE,
};
use crate::context::policy::MessageCompressionPolicy;
use crate::context::sentences::SentenceSummarizer;
use crate::context::strategy::StrategyChain;
use crate::context::structured::{DEFAULT_PRIORITY_FIELDS, StructuredCompressor};
use crate::context::summarizer::{DEFAULT_UNIT_LABEL, DEFAULT_UNIT_PATTERN, HeuristicSummarizer};
use crate::context::token::{
    DEFAULT_CHARS_PER_TOKEN, MIN_CHARS_PER_TOKEN, TokenEstimator, Tokenizer,
};
use crate::context::truncate::Truncator;
use crate::error::ConfigError;

/// Token limit used when neither the config nor a model entry sets one.
pub const DEFAULT_TOKEN_LIMIT: usize = 100_000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionConfig {
    pub total_token_limit: usize,
    pub prefix_message_count: usize,
    pub suffix_window_size: usize,
    pub older_share: f64,
    pub recent_share: f64,
    /// Counting backend: `chars`, `o200k_base` or `cl100k_base`.
    pub tokenizer: Tokenizer,
    /// ASCII characters per estimated token for the `chars` backend.
    pub chars_per_token: f64,
    /// Object fields kept by structured compression, in priority order.
    pub priority_fields: Vec<String>,
    /// Delimiter regex for heuristic summarization units.
    pub unit_pattern: String,
    /// Noun used in heuristic omission markers.
    pub unit_label: String,
    /// Per-model overrides of `total_token_limit`.
    pub model_token_limits: BTreeMap<String, usize>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            total_token_limit: DEFAULT_TOKEN_LIMIT,
            prefix_message_count: DEFAULT_PREFIX_MESSAGE_COUNT,
            suffix_window_size: DEFAULT_SUFFIX_WINDOW_SIZE,
            older_share: DEFAULT_OLDER_SHARE,
            recent_share: DEFAULT_RECENT_SHARE,
            tokenizer: Tokenizer::default(),
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            priority_fields: DEFAULT_PRIORITY_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            unit_pattern: DEFAULT_UNIT_PATTERN.to_string(),
            unit_label: DEFAULT_UNIT_LABEL.to_string(),
            model_token_limits: BTreeMap::new(),
        }
    }
}

impl CompressionConfig {
    /// Read and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&data)
    }

    /// Parse and validate a config from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.budget().validate()?;
        if !(self.chars_per_token.is_finite() && self.chars_per_token >= MIN_CHARS_PER_TOKEN) {
            return Err(ConfigError::InvalidCharsPerToken(self.chars_per_token));
        }
        Regex::new(&self.unit_pattern)?;
        Ok(())
    }

    pub fn budget(&self) -> CompressionBudget {
        CompressionBudget::new(self.total_token_limit)
            .with_prefix_message_count(self.prefix_message_count)
            .with_suffix_window_size(self.suffix_window_size)
            .with_shares(self.older_share, self.recent_share)
    }

    /// The estimator for this config. BPE vocabularies are loaded on first
    /// use and shared process-wide.
    pub fn estimator(&self) -> TokenEstimator {
        TokenEstimator::new(self.tokenizer, self.chars_per_token)
    }

    /// The standard chain, configured with this config's allow-list and
    /// unit pattern.
    pub fn strategy_chain(&self) -> Result<StrategyChain, ConfigError> {
        self.strategy_chain_for(&self.estimator())
    }

    /// [`strategy_chain`](Self::strategy_chain) around an existing estimator.
    pub fn strategy_chain_for(
        &self,
        estimator: &TokenEstimator,
    ) -> Result<StrategyChain, ConfigError> {
        Ok(StrategyChain::new()
            .with(
                StructuredCompressor::new(estimator.clone())
                    .with_priority_fields(self.priority_fields.iter().cloned()),
            )
            .with(HeuristicSummarizer::with_pattern(
                &self.unit_pattern,
                &self.unit_label,
                estimator.clone(),
            )?)
            .with(SentenceSummarizer::new(estimator.clone()))
            .with(Truncator::new(estimator.clone())))
    }

    /// Token limit for `model`, falling back to `total_token_limit`.
    pub fn token_limit_for(&self, model: &str) -> usize {
        self.model_token_limits
            .get(model)
            .copied()
            .unwrap_or(self.total_token_limit)
    }

    /// A copy of this config with the limit resolved for `model`.
    pub fn for_model(&self, model: &str) -> Self {
        Self {
            total_token_limit: self.token_limit_for(model),
            ..self.clone()
        }
    }

    /// Build a policy for `model`.
    pub fn policy_for_model(&self, model: &str) -> Result<MessageCompressionPolicy, ConfigError> {
        MessageCompressionPolicy::from_config(&self.for_model(model))
    }
}
