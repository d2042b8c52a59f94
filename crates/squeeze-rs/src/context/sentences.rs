//! Rule-based summarization of untagged prose.
//!
//! Long narrative turns with no delimited units keep their opening and
//! closing sentences. Everything between them becomes one count marker:
//!
//! ```text
//! First. Second. [... 6 sentences omitted ...] Ninth. Tenth.
//! ```
//!
//! A sentence ends at `.`, `!` or `?` followed by whitespace; the terminator
//! stays with its sentence. Markers already in the omitted stretch are folded
//! into the new count.
//!
//! Content with nothing between the kept sentences is declined. When the
//! summary exceeds its ceiling, fewer sentences are kept on each side, down
//! to one. If even that does not fit, the content is declined and left to
//! truncation.

use std::sync::LazyLock;

use regex::Regex;

use super::strategy::{CompressionStrategy, StrategyKind};
use super::summarizer::marker_regex;
use super::token::TokenEstimator;

/// Sentences kept at each end.
pub const DEFAULT_KEEP_SENTENCES: usize = 2;

/// Noun used in sentence omission markers.
pub const SENTENCE_LABEL: &str = "sentences";

static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence boundary pattern is valid"));

static SENTENCE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    marker_regex(SENTENCE_LABEL).expect("sentence marker pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'a> {
    Sentence(&'a str),
    Omitted(usize),
}

impl<'a> Piece<'a> {
    fn sentence(self) -> Option<&'a str> {
        match self {
            Piece::Sentence(s) => Some(s),
            Piece::Omitted(_) => None,
        }
    }

    /// How many sentences this piece stands for.
    fn weight(self) -> usize {
        match self {
            Piece::Sentence(_) => 1,
            Piece::Omitted(n) => n,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentenceSummarizer {
    estimator: TokenEstimator,
    keep: usize,
}

impl Default for SentenceSummarizer {
    fn default() -> Self {
        Self::new(TokenEstimator::default())
    }
}

impl SentenceSummarizer {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self {
            estimator,
            keep: DEFAULT_KEEP_SENTENCES,
        }
    }

    /// Sentences kept at each end. At least one.
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep.max(1);
        self
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    /// The marker standing in for `count` omitted sentences.
    pub fn omission_marker(&self, count: usize) -> String {
        format!("[... {count} {SENTENCE_LABEL} omitted ...]")
    }

    /// Summarize `content` to at most `max_tokens`.
    ///
    /// Returns `None` when no sentence lies between the kept ones, or when
    /// one sentence at each end already exceeds the ceiling.
    pub fn summarize(&self, content: &str, max_tokens: usize) -> Option<String> {
        let pieces = split_pieces(content);
        let full = self.render(&pieces, self.keep)?;
        if self.estimator.estimate(&full) <= max_tokens {
            return Some(full);
        }
        (1..self.keep).rev().find_map(|keep| {
            self.render(&pieces, keep)
                .filter(|summary| self.estimator.estimate(summary) <= max_tokens)
        })
    }

    /// `keep` sentences at each end around one marker.
    fn render(&self, pieces: &[Piece<'_>], keep: usize) -> Option<String> {
        let positions: Vec<usize> = pieces
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.sentence().map(|_| i))
            .collect();
        if positions.len() < keep * 2 {
            return None;
        }
        let head_end = positions[keep - 1];
        let tail_start = positions[positions.len() - keep];

        let omitted: usize = pieces
            .get(head_end + 1..tail_start)
            .unwrap_or_default()
            .iter()
            .map(|p| p.weight())
            .sum();
        if omitted == 0 {
            return None;
        }

        let marker = self.omission_marker(omitted);
        let head = positions[..keep].iter().filter_map(|&i| pieces[i].sentence());
        let tail = positions[positions.len() - keep..]
            .iter()
            .filter_map(|&i| pieces[i].sentence());
        let parts: Vec<&str> = head
            .chain(std::iter::once(marker.as_str()))
            .chain(tail)
            .collect();
        Some(parts.join(" "))
    }
}

/// Sentences and existing markers, in order.
fn split_pieces(content: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut cursor = 0;
    for caps in SENTENCE_MARKER_RE.captures_iter(content) {
        let (Some(whole), Some(count)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        push_sentences(
            content.get(cursor..whole.start()).unwrap_or_default(),
            &mut pieces,
        );
        pieces.push(Piece::Omitted(count.as_str().parse().unwrap_or(0)));
        cursor = whole.end();
    }
    push_sentences(content.get(cursor..).unwrap_or_default(), &mut pieces);
    pieces
}

fn push_sentences<'a>(text: &'a str, pieces: &mut Vec<Piece<'a>>) {
    let mut start = 0;
    for boundary in SENTENCE_END_RE.find_iter(text) {
        // The terminator is a single ASCII byte.
        push_sentence(text.get(start..boundary.start() + 1), pieces);
        start = boundary.end();
    }
    push_sentence(text.get(start..), pieces);
}

fn push_sentence<'a>(sentence: Option<&'a str>, pieces: &mut Vec<Piece<'a>>) {
    if let Some(s) = sentence.map(str::trim).filter(|s| !s.is_empty()) {
        pieces.push(Piece::Sentence(s));
    }
}

impl CompressionStrategy for SentenceSummarizer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Heuristic
    }

    fn try_compress(&self, content: &str, max_tokens: usize) -> Option<String> {
        self.summarize(content, max_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(n: usize) -> String {
        (0..n)
            .map(|i| format!("Sentence {i} adds detail."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn keeps_two_sentences_at_each_end() {
        let s = SentenceSummarizer::default();
        let out = s.summarize(&report(10), 100).unwrap();
        assert_eq!(
            out,
            "Sentence 0 adds detail. Sentence 1 adds detail. [... 6 sentences omitted ...] \
             Sentence 8 adds detail. Sentence 9 adds detail."
        );
    }

    #[test]
    fn nothing_to_omit_is_not_applicable() {
        let s = SentenceSummarizer::default();
        assert!(s.summarize("One. Two. Three. Four.", 0).is_none());
        assert!(s.summarize("a single run-on thought with no stop", 0).is_none());
        assert!(s.summarize("", 0).is_none());
    }

    #[test]
    fn mixed_terminators_split() {
        let s = SentenceSummarizer::default();
        let out = s
            .summarize("Is it new? Yes! It is. Mostly. Fine. Checked twice. Done.", 100)
            .unwrap();
        assert_eq!(
            out,
            "Is it new? Yes! [... 3 sentences omitted ...] Checked twice. Done."
        );
    }

    #[test]
    fn falls_back_to_one_sentence_each_side() {
        let s = SentenceSummarizer::default();
        let est = TokenEstimator::default();
        let out = s.summarize(&report(10), 25).unwrap();
        assert_eq!(
            out,
            "Sentence 0 adds detail. [... 8 sentences omitted ...] Sentence 9 adds detail."
        );
        assert!(est.estimate(&out) <= 25);
    }

    #[test]
    fn declines_when_nothing_fits() {
        let s = SentenceSummarizer::default();
        assert!(s.summarize(&report(10), 5).is_none());
    }

    #[test]
    fn existing_markers_fold_into_count() {
        let s = SentenceSummarizer::default();
        let out = s
            .summarize("A. B. C. [... 5 sentences omitted ...] D. E. F.", 100)
            .unwrap();
        assert_eq!(out, "A. B. [... 7 sentences omitted ...] E. F.");
    }

    #[test]
    fn resummarizing_is_a_no_op() {
        let s = SentenceSummarizer::default();
        let once = s.summarize(&report(30), 60).unwrap();
        assert_eq!(s.summarize(&once, 60).unwrap(), once);
    }

    #[test]
    fn keep_is_at_least_one() {
        let s = SentenceSummarizer::default().with_keep(0);
        assert_eq!(s.keep(), 1);
        assert_eq!(
            s.summarize("A. B. C.", 100).unwrap(),
            "A. [... 1 sentences omitted ...] C."
        );
    }

    #[test]
    fn non_ascii_sentences_are_kept_whole() {
        let s = SentenceSummarizer::default();
        let content = "研究开始. 数据收集. 中间步骤. 更多步骤. 分析完成. 结论如下.";
        let out = s.summarize(content, 100).unwrap();
        assert!(out.starts_with("研究开始. 数据收集."));
        assert!(out.ends_with("分析完成. 结论如下."));
        assert!(out.contains("[... 2 sentences omitted ...]"));
    }
}
