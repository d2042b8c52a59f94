//! End-to-end tests for the compression policy.
//!
//! Build realistic research-agent transcripts (search-result JSON, tagged
//! findings, long prose) and check the policy's guarantees on them.

use std::sync::Arc;

use serde_json::{Value, json};
use squeeze_rs::context::ELISION_MARKER;
use squeeze_rs::prelude::*;

/// ASCII text that estimates to exactly `tokens` at the default ratio.
fn prose(tokens: usize) -> String {
    "lorem ipsum dolor sit amet "
        .chars()
        .cycle()
        .take(tokens * 4)
        .collect()
}

/// A search-tool result: a JSON list of `n` result objects.
fn search_results(batch: usize, n: usize) -> String {
    let items: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "url": format!("https://example.com/{batch}/{i}"),
                "title": format!("Result {i}"),
                "score": 0.91,
                "content": prose(80),
            })
        })
        .collect();
    Value::Array(items).to_string()
}

fn estimate(t: &Transcript) -> usize {
    TokenEstimator::default().estimate_transcript(t)
}

/// A mix of shapes for the property checks.
fn mixed_transcript(len: usize) -> Transcript {
    let mut t = Transcript::new();
    t.push(Role::System, prose(40));
    for i in 1..len {
        match i % 4 {
            0 => t.push(Role::Tool, search_results(i, 6 + i % 5)),
            1 => t.push(
                Role::Assistant,
                (0..5 + i % 3)
                    .map(|k| format!("<finding>{}</finding>", prose(15 + k)))
                    .collect::<String>(),
            ),
            2 => t.push(Role::User, prose(20 + i * 7)),
            _ => t.push(Role::Tool, json!({"id": i, "body": prose(120)}).to_string()),
        };
    }
    t
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn search_results_are_reduced_to_first_and_last() {
    let mut t = Transcript::new();
    t.push(Role::System, prose(50));
    for batch in 0..10 {
        t.push(Role::Tool, search_results(batch, 20));
    }
    assert!(estimate(&t) > 15_000);

    let budget = CompressionBudget::new(5_000)
        .with_prefix_message_count(1)
        .with_suffix_window_size(2);
    let out = MessageCompressionPolicy::new(budget).compress(&t);

    assert!(estimate(&out) <= 5_000);
    assert_eq!(out.messages()[0], t.messages()[0]);
    assert_eq!(out.messages()[9], t.messages()[9]);
    assert_eq!(out.messages()[10], t.messages()[10]);

    for (batch, msg) in out.messages()[1..9].iter().enumerate() {
        let parsed: Value = serde_json::from_str(msg.content()).unwrap();
        let arr = parsed.as_array().unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr[1], json!("[18 items omitted]"));
        assert_eq!(arr[0]["url"], format!("https://example.com/{batch}/0"));
        assert_eq!(arr[2]["url"], format!("https://example.com/{batch}/19"));
    }
}

#[test]
fn short_transcript_is_returned_unchanged() {
    let t = Transcript::from_turns([
        (Role::System, prose(900)),
        (Role::User, prose(900)),
        (Role::Tool, search_results(0, 20)),
        (Role::Assistant, prose(900)),
    ]);
    let out = MessageCompressionPolicy::new(CompressionBudget::new(100)).compress(&t);
    assert_eq!(out, t);
}

#[test]
fn findings_keep_first_and_last() {
    let summarizer = HeuristicSummarizer::default();
    let out = summarizer
        .summarize("<finding>A</finding><finding>B</finding><finding>C</finding>", 17)
        .unwrap();
    let a = out.find("<finding>A</finding>").unwrap();
    let marker = out.find("[... 1 findings omitted ...]").unwrap();
    let c = out.find("<finding>C</finding>").unwrap();
    assert!(a < marker && marker < c);
}

#[test]
fn findings_are_summarized_through_the_policy() {
    let findings = format!(
        "<finding>A</finding><finding>{}</finding><finding>C</finding>",
        prose(100)
    );
    let t = Transcript::from_turns([
        (Role::System, "sys".to_string()),
        (Role::Assistant, findings),
        (Role::User, "ok".to_string()),
    ]);
    let budget = CompressionBudget::new(50)
        .with_prefix_message_count(1)
        .with_suffix_window_size(1);
    let report = MessageCompressionPolicy::new(budget).compress_with_report(&t);

    assert_eq!(report.outcomes[1].strategy_applied, StrategyKind::Heuristic);
    assert_eq!(
        report.transcript.messages()[1].content(),
        "<finding>A</finding>\n[... 1 findings omitted ...]\n<finding>C</finding>"
    );
}

#[test]
fn zero_available_collapses_every_middle_message() {
    let mut t = Transcript::new();
    t.push(Role::System, prose(100));
    t.push(Role::Tool, search_results(0, 20));
    t.push(Role::Assistant, prose(300));
    t.push(Role::Tool, prose(50));
    t.push(Role::User, prose(100));

    let budget = CompressionBudget::new(200)
        .with_prefix_message_count(1)
        .with_suffix_window_size(1);
    let report = MessageCompressionPolicy::new(budget).compress_with_report(&t);

    assert_eq!(report.breakdown.available, 0);
    for (msg, outcome) in report.transcript.messages()[1..4]
        .iter()
        .zip(&report.outcomes[1..4])
    {
        assert_eq!(msg.content(), ELISION_MARKER);
        assert_eq!(outcome.strategy_applied, StrategyKind::Truncated);
    }
    assert_eq!(report.transcript.messages()[0], t.messages()[0]);
    assert_eq!(report.transcript.messages()[4], t.messages()[4]);
}

// ── Properties ───────────────────────────────────────────────────────

fn budgets() -> Vec<CompressionBudget> {
    let mut out = Vec::new();
    for limit in [50, 400, 1_200, 3_000, 20_000] {
        for (prefix, suffix) in [(0, 0), (1, 2), (3, 5)] {
            out.push(
                CompressionBudget::new(limit)
                    .with_prefix_message_count(prefix)
                    .with_suffix_window_size(suffix),
            );
        }
    }
    out
}

#[test]
fn middle_stays_within_available_budget() {
    let est = TokenEstimator::default();
    for len in [3, 9, 17, 30] {
        let t = mixed_transcript(len);
        for budget in budgets() {
            let report = MessageCompressionPolicy::new(budget.clone()).compress_with_report(&t);
            let b = &report.breakdown;
            if b.total_tokens_before <= budget.total_token_limit || b.available < 0 {
                continue;
            }
            let Some((prefix, suffix)) = budget.partition(t.len()) else {
                continue;
            };
            let middle = &report.transcript.messages()[prefix..t.len() - suffix];
            let middle_tokens = est.estimate_messages(middle);
            assert!(
                middle_tokens as i64 <= b.available,
                "len {len}, budget {budget:?}: {middle_tokens} > {}",
                b.available
            );
            assert!(estimate(&report.transcript) <= budget.total_token_limit);
        }
    }
}

#[test]
fn out_of_range_shares_never_exceed_the_limit() {
    let mut t = Transcript::new();
    t.push(Role::System, prose(10));
    for _ in 0..4 {
        t.push(Role::Tool, prose(400));
    }
    t.push(Role::User, prose(10));

    let budget = CompressionBudget::new(1_000)
        .with_prefix_message_count(1)
        .with_suffix_window_size(1)
        .with_shares(1.5, 0.0);
    let report = MessageCompressionPolicy::new(budget).compress_with_report(&t);
    assert_eq!(report.breakdown.available, 980);
    assert_eq!(report.breakdown.older_budget, 980);
    assert!(estimate(&report.transcript) <= 1_000);

    let est = TokenEstimator::default();
    for len in [9, 17, 30] {
        let t = mixed_transcript(len);
        for (older, recent) in [(1.5, 0.0), (-0.5, 0.2), (f64::NAN, 0.0), (1.0, 0.0), (0.3, 0.9)] {
            for limit in [400, 1_200, 3_000] {
                let budget = CompressionBudget::new(limit)
                    .with_prefix_message_count(1)
                    .with_suffix_window_size(2)
                    .with_shares(older, recent);
                let report = MessageCompressionPolicy::new(budget).compress_with_report(&t);
                let b = &report.breakdown;
                if b.total_tokens_before <= limit || b.available < 0 {
                    continue;
                }
                let middle = &report.transcript.messages()[1..t.len() - 2];
                assert!(est.estimate_messages(middle) as i64 <= b.available);
                assert!(
                    estimate(&report.transcript) <= limit,
                    "len {len}, shares ({older}, {recent}), limit {limit}"
                );
            }
        }
    }
}

#[test]
fn protected_zones_are_byte_identical() {
    for len in [9, 17, 30] {
        let t = mixed_transcript(len);
        for budget in budgets() {
            let Some((prefix, suffix)) = budget.partition(t.len()) else {
                continue;
            };
            let out = MessageCompressionPolicy::new(budget).compress(&t);
            assert_eq!(out.messages()[..prefix], t.messages()[..prefix]);
            assert_eq!(
                out.messages()[t.len() - suffix..],
                t.messages()[t.len() - suffix..]
            );
        }
    }
}

#[test]
fn order_and_roles_are_preserved() {
    let t = mixed_transcript(30);
    for budget in budgets() {
        let out = MessageCompressionPolicy::new(budget).compress(&t);
        assert_eq!(out.len(), t.len());
        for (i, (a, b)) in out.iter().zip(t.iter()).enumerate() {
            assert_eq!(a.sequence_index(), i);
            assert_eq!(a.role(), b.role());
        }
    }
}

#[test]
fn compressing_twice_is_a_no_op() {
    for len in [9, 17, 30] {
        let t = mixed_transcript(len);
        for budget in budgets() {
            let policy = MessageCompressionPolicy::new(budget);
            let once = policy.compress(&t);
            let twice = policy.compress(&once);
            assert_eq!(once, twice);
        }
    }
}

#[test]
fn structured_lists_keep_first_and_last_elements() {
    let compressor = StructuredCompressor::default();
    for n in [3, 4, 10, 50] {
        let input: Vec<Value> = (0..n)
            .map(|i| json!({"id": i, "title": format!("t{i}"), "extra": "x".repeat(200)}))
            .collect();
        let out = compressor
            .compress_structured(&Value::Array(input.clone()).to_string(), 1_000)
            .unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.first(), input.first());
        assert_eq!(parsed.last(), input.last());
    }
}

#[test]
fn cjk_tool_output_fits_its_ceiling() {
    let results: Vec<Value> = (0..12)
        .map(|i| {
            json!({
                "url": format!("https://example.cn/{i}"),
                "title": format!("检索结果 {i}"),
                "content": "大型语言模型的上下文压缩研究".repeat(30),
            })
        })
        .collect();
    let mut t = Transcript::new();
    t.push(Role::System, prose(20));
    for _ in 0..4 {
        t.push(Role::Tool, Value::Array(results.clone()).to_string());
    }
    t.push(Role::User, prose(20));

    let budget = CompressionBudget::new(600)
        .with_prefix_message_count(1)
        .with_suffix_window_size(1);
    let report = MessageCompressionPolicy::new(budget).compress_with_report(&t);
    assert!(estimate(&report.transcript) <= 600);
    for (msg, outcome) in report.transcript.messages()[1..5]
        .iter()
        .zip(&report.outcomes[1..5])
    {
        assert_eq!(outcome.strategy_applied, StrategyKind::Structured);
        let parsed: Value = serde_json::from_str(msg.content()).unwrap();
        assert_eq!(parsed[1], json!("[10 items omitted]"));
        assert_eq!(parsed[2]["title"], "检索结果 11");
    }
}

#[test]
fn untagged_prose_keeps_its_closing_sentences() {
    let narrative: String = (0..40)
        .map(|i| format!("Observation {i} confirms the trend. "))
        .collect();
    let t = Transcript::from_turns([
        (Role::System, "sys".to_string()),
        (Role::Assistant, narrative),
        (Role::User, "ok".to_string()),
    ]);
    let budget = CompressionBudget::new(100)
        .with_prefix_message_count(1)
        .with_suffix_window_size(1);
    let report = MessageCompressionPolicy::new(budget).compress_with_report(&t);

    assert_eq!(report.outcomes[1].strategy_applied, StrategyKind::Heuristic);
    let content = report.transcript.messages()[1].content();
    assert!(content.starts_with("Observation 0 confirms the trend."));
    assert!(content.contains("[... 36 sentences omitted ...]"));
    assert!(content.ends_with("Observation 38 confirms the trend. Observation 39 confirms the trend."));
}

#[test]
fn bpe_estimator_holds_the_budget() {
    let est = TokenEstimator::new(Tokenizer::O200kBase, 4.0);
    assert_eq!(est.tokenizer(), Tokenizer::O200kBase);
    let budget = CompressionBudget::new(3_000)
        .with_prefix_message_count(1)
        .with_suffix_window_size(2);
    let policy = MessageCompressionPolicy::new(budget).with_estimator(est.clone());

    let t = mixed_transcript(30);
    assert!(est.estimate_transcript(&t) > 3_000);
    let report = policy.compress_with_report(&t);
    assert!(est.estimate_transcript(&report.transcript) <= 3_000);
    assert_eq!(report.transcript.messages()[0], t.messages()[0]);
    assert_eq!(policy.compress(&report.transcript), report.transcript);
}

// ── Concurrency ──────────────────────────────────────────────────────

#[test]
fn shared_policy_across_threads() {
    let policy = Arc::new(MessageCompressionPolicy::new(
        CompressionBudget::new(1_200)
            .with_prefix_message_count(1)
            .with_suffix_window_size(2),
    ));
    let transcripts: Vec<Transcript> = [9, 17, 30].into_iter().map(mixed_transcript).collect();
    let expected: Vec<Transcript> = transcripts.iter().map(|t| policy.compress(t)).collect();

    std::thread::scope(|s| {
        let handles: Vec<_> = transcripts
            .iter()
            .map(|t| {
                let policy = policy.clone();
                s.spawn(move || policy.compress(t))
            })
            .collect();
        for (handle, want) in handles.into_iter().zip(&expected) {
            assert_eq!(&handle.join().unwrap(), want);
        }
    });
}

#[tokio::test]
async fn compress_blocking_runs_off_the_reactor() {
    let policy = Arc::new(MessageCompressionPolicy::new(CompressionBudget::new(1_200)));
    let t = mixed_transcript(17);
    let expected = policy.compress(&t);

    let tasks: Vec<_> = (0..4)
        .map(|_| tokio::spawn(compress_blocking(policy.clone(), t.clone())))
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), expected);
    }
}

// ── Configuration ────────────────────────────────────────────────────

#[test]
fn config_file_drives_the_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("squeeze.json");
    std::fs::write(
        &path,
        r#"{
            "total_token_limit": 600,
            "prefix_message_count": 1,
            "suffix_window_size": 1,
            "unit_pattern": "(?s)<source>.*?</source>",
            "unit_label": "sources"
        }"#,
    )
    .unwrap();

    let config = CompressionConfig::load(&path).unwrap();
    let policy = MessageCompressionPolicy::from_config(&config).unwrap();

    let sources: String = (0..6)
        .map(|i| format!("<source>{}</source>", prose(100 + i)))
        .collect();
    let t = Transcript::from_turns([
        (Role::System, "sys".to_string()),
        (Role::Assistant, sources),
        (Role::User, "ok".to_string()),
    ]);
    let report = policy.compress_with_report(&t);
    assert_eq!(report.outcomes[1].strategy_applied, StrategyKind::Heuristic);
    assert!(
        report.transcript.messages()[1]
            .content()
            .contains("[... 4 sources omitted ...]")
    );
}

#[test]
fn configured_priority_fields_decide_what_survives() {
    let config = CompressionConfig::from_json_str(
        r#"{
            "total_token_limit": 200,
            "prefix_message_count": 1,
            "suffix_window_size": 1,
            "priority_fields": ["doi", "title"]
        }"#,
    )
    .unwrap();
    let policy = MessageCompressionPolicy::from_config(&config).unwrap();

    let paper = json!({
        "doi": "10.48550/arXiv.1706.03762",
        "title": "Attention Is All You Need",
        "url": "https://arxiv.org/abs/1706.03762",
        "abstract": prose(300),
    });
    let t = Transcript::from_turns([
        (Role::System, "sys".to_string()),
        (Role::Tool, paper.to_string()),
        (Role::User, "ok".to_string()),
    ]);
    let report = policy.compress_with_report(&t);

    assert_eq!(report.outcomes[1].strategy_applied, StrategyKind::Structured);
    let kept: Value = serde_json::from_str(report.transcript.messages()[1].content()).unwrap();
    let mut keys: Vec<&str> = kept.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["doi", "title"]);
    assert_eq!(kept["title"], "Attention Is All You Need");
}
