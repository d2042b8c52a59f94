//! Token estimation.
//!
//! Two backends behind one [`TokenEstimator`]:
//!
//! - **Character heuristic** (the default): ASCII text averages about four
//!   characters per token for BPE vocabularies, while CJK and other non-ASCII
//!   characters usually cost at least one token each. No vocabulary to load.
//! - **BPE**: exact counts from a `tiktoken` vocabulary (`o200k_base` or
//!   `cl100k_base`). `o200k_base` falls back to `cl100k_base`, and both fall
//!   back to the character heuristic when the vocabulary cannot be loaded.
//!
//! Exactness is not required, but every component of a policy must share one
//! estimator so budget comparisons stay consistent.
//!
//! # Monotonicity
//!
//! The character heuristic never decreases as text is appended. BPE counts
//! almost never do, but a merge across the join can make `a + b` cost fewer
//! tokens than `a` alone. Components therefore re-estimate what they produce
//! instead of adding up the estimates of its parts.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;
use tracing::{info, warn};

use crate::{Message, Transcript};

/// Default ASCII characters per token.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Smallest accepted ASCII ratio. Anything lower turns a short text into an
/// astronomically large estimate.
pub const MIN_CHARS_PER_TOKEN: f64 = 0.1;

/// Which counting backend an estimator uses.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tokenizer {
    /// The character heuristic.
    #[default]
    #[serde(rename = "chars")]
    Chars,
    /// The GPT-4o vocabulary. Falls back to `cl100k_base`.
    #[serde(rename = "o200k_base")]
    O200kBase,
    /// The GPT-4 / GPT-3.5 vocabulary.
    #[serde(rename = "cl100k_base")]
    Cl100kBase,
}

impl Tokenizer {
    /// Vocabularies to try, in order.
    fn candidates(self) -> &'static [Tokenizer] {
        match self {
            Tokenizer::Chars => &[],
            Tokenizer::O200kBase => &[Tokenizer::O200kBase, Tokenizer::Cl100kBase],
            Tokenizer::Cl100kBase => &[Tokenizer::Cl100kBase],
        }
    }
}

impl fmt::Display for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tokenizer::Chars => write!(f, "chars"),
            Tokenizer::O200kBase => write!(f, "o200k_base"),
            Tokenizer::Cl100kBase => write!(f, "cl100k_base"),
        }
    }
}

impl FromStr for Tokenizer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chars" => Ok(Tokenizer::Chars),
            "o200k_base" => Ok(Tokenizer::O200kBase),
            "cl100k_base" => Ok(Tokenizer::Cl100kBase),
            other => Err(format!(
                "unknown tokenizer '{other}' (expected chars, o200k_base or cl100k_base)"
            )),
        }
    }
}

// ── Vocabularies ───────────────────────────────────────────────────

static O200K_BASE: LazyLock<Option<Arc<CoreBPE>>> =
    LazyLock::new(|| load_vocabulary(Tokenizer::O200kBase));

static CL100K_BASE: LazyLock<Option<Arc<CoreBPE>>> =
    LazyLock::new(|| load_vocabulary(Tokenizer::Cl100kBase));

fn load_vocabulary(tokenizer: Tokenizer) -> Option<Arc<CoreBPE>> {
    let loaded = match tokenizer {
        Tokenizer::Chars => return None,
        Tokenizer::O200kBase => tiktoken_rs::o200k_base(),
        Tokenizer::Cl100kBase => tiktoken_rs::cl100k_base(),
    };
    match loaded {
        Ok(bpe) => {
            info!("Loaded {tokenizer} encoding for token counting");
            Some(Arc::new(bpe))
        }
        Err(e) => {
            warn!("Failed to load {tokenizer} encoding: {e}");
            None
        }
    }
}

/// The process-wide copy of a vocabulary. Loaded once, on first use.
fn shared_vocabulary(tokenizer: Tokenizer) -> Option<Arc<CoreBPE>> {
    match tokenizer {
        Tokenizer::Chars => None,
        Tokenizer::O200kBase => O200K_BASE.clone(),
        Tokenizer::Cl100kBase => CL100K_BASE.clone(),
    }
}

// ── Estimator ──────────────────────────────────────────────────────

/// Maps text to an approximate token count.
///
/// With the character backend,
/// `estimate = floor(ascii_chars / chars_per_token) + non_ascii_chars`.
/// With a BPE backend, the estimate is the length of the ordinary encoding
/// (special tokens are counted as plain text).
///
/// Cloning is cheap: vocabularies are shared behind an [`Arc`].
#[derive(Clone)]
pub struct TokenEstimator {
    tokenizer: Tokenizer,
    bpe: Option<Arc<CoreBPE>>,
    chars_per_token: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            tokenizer: Tokenizer::Chars,
            bpe: None,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("tokenizer", &self.tokenizer)
            .field("chars_per_token", &self.chars_per_token)
            .finish()
    }
}

impl PartialEq for TokenEstimator {
    fn eq(&self, other: &Self) -> bool {
        self.tokenizer == other.tokenizer && self.chars_per_token == other.chars_per_token
    }
}

impl TokenEstimator {
    /// An estimator for `tokenizer`, resolving BPE fallbacks now.
    ///
    /// `chars_per_token` drives the character backend, including when a BPE
    /// vocabulary fails to load. Ratios below [`MIN_CHARS_PER_TOKEN`] or
    /// non-finite ratios fall back to the default.
    pub fn new(tokenizer: Tokenizer, chars_per_token: f64) -> Self {
        let chars_per_token = sanitize_ratio(chars_per_token);
        let resolved = tokenizer
            .candidates()
            .iter()
            .find_map(|&candidate| shared_vocabulary(candidate).map(|bpe| (candidate, bpe)));

        match resolved {
            Some((tokenizer, bpe)) => Self {
                tokenizer,
                bpe: Some(bpe),
                chars_per_token,
            },
            None => {
                if tokenizer != Tokenizer::Chars {
                    warn!("No BPE vocabulary available for {tokenizer}; using character estimation");
                }
                Self {
                    tokenizer: Tokenizer::Chars,
                    bpe: None,
                    chars_per_token,
                }
            }
        }
    }

    /// A character-heuristic estimator with a calibrated ASCII ratio.
    pub fn with_chars_per_token(chars_per_token: f64) -> Self {
        Self::new(Tokenizer::Chars, chars_per_token)
    }

    /// The backend actually in use, after fallbacks.
    pub fn tokenizer(&self) -> Tokenizer {
        self.tokenizer
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }

    /// Whether the estimate is a pure function of character counts. Only
    /// then is [`estimate_counts`](Self::estimate_counts) meaningful.
    pub fn is_char_based(&self) -> bool {
        self.bpe.is_none()
    }

    /// Estimate the token count of `text`. Empty text is zero.
    pub fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match &self.bpe {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            None => {
                let (ascii, other) = char_counts(text);
                self.estimate_counts(ascii, other)
            }
        }
    }

    /// Character-heuristic estimate from pre-counted characters. Saturates
    /// instead of overflowing.
    pub fn estimate_counts(&self, ascii_chars: usize, other_chars: usize) -> usize {
        ((ascii_chars as f64 / self.chars_per_token) as usize).saturating_add(other_chars)
    }

    /// Estimate a single message (content only; no per-message overhead).
    pub fn estimate_message(&self, message: &Message) -> usize {
        self.estimate(message.content())
    }

    /// Estimate a slice of messages.
    pub fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.estimate_message(m))
            .fold(0, usize::saturating_add)
    }

    /// Estimate a whole transcript.
    pub fn estimate_transcript(&self, transcript: &Transcript) -> usize {
        self.estimate_messages(transcript.messages())
    }
}

fn sanitize_ratio(chars_per_token: f64) -> f64 {
    if chars_per_token.is_finite() && chars_per_token >= MIN_CHARS_PER_TOKEN {
        chars_per_token
    } else {
        DEFAULT_CHARS_PER_TOKEN
    }
}

/// Count ASCII and non-ASCII characters in `text`.
pub(crate) fn char_counts(text: &str) -> (usize, usize) {
    text.chars().fold((0, 0), |(ascii, other), c| {
        if c.is_ascii() {
            (ascii + 1, other)
        } else {
            (ascii, other + 1)
        }
    })
}
