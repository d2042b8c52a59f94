//! Compress a transcript JSON file under a token budget and print the result.
//!
//! The transcript is a JSON array of `{"role", "content"}` objects, optionally
//! carrying `sequence_index`. The compressed transcript is printed to stdout;
//! logs and `--outcomes` go to stderr.
//!
//! # Examples
//!
//! ```sh
//! # Compress a saved transcript to 8k tokens
//! squeeze --transcript run.json --limit 8000
//!
//! # Settings from a config file, with a one-off override
//! squeeze --transcript run.json --config squeeze.json --suffix 2
//!
//! # Count with the GPT-4o vocabulary instead of the character heuristic
//! squeeze --transcript run.json --limit 8000 --tokenizer o200k_base
//!
//! # Pipe from another tool and show per-message outcomes
//! cat run.json | squeeze --stdin --limit 4000 --outcomes -v
//! ```

use std::io::{self, Read};
use std::process;
use std::sync::Arc;

use clap::Parser;
use serde::{Deserialize, Serialize};
use squeeze_rs::config::CompressionConfig;
use squeeze_rs::context::policy::{MessageCompressionPolicy, ZoneBreakdown};
use squeeze_rs::context::token::Tokenizer;
use squeeze_rs::events::{CompositeEventHandler, CompressionOutcome, LoggingHandler, OutcomeCollector};
use squeeze_rs::{Message, Role, Transcript};

/// Compress a transcript JSON file under a token budget.
#[derive(Parser)]
#[command(name = "squeeze")]
struct Cli {
    // ── Input ──────────────────────────────────────────────────
    /// Path to a transcript JSON file
    #[arg(long, conflicts_with = "stdin")]
    transcript: Option<String>,

    /// Read the transcript from stdin
    #[arg(long)]
    stdin: bool,

    // ── Budget ─────────────────────────────────────────────────
    /// Path to a JSON config file
    #[arg(long)]
    config: Option<String>,

    /// Resolve the token limit from the config's per-model table
    #[arg(long)]
    model: Option<String>,

    /// Total token limit (overrides the config)
    #[arg(long)]
    limit: Option<usize>,

    /// Messages protected at the start
    #[arg(long)]
    prefix: Option<usize>,

    /// Messages protected at the end
    #[arg(long)]
    suffix: Option<usize>,

    /// Share of the remaining budget given to the compressible middle
    #[arg(long)]
    older_share: Option<f64>,

    /// Token counting backend: chars, o200k_base or cl100k_base
    #[arg(long)]
    tokenizer: Option<Tokenizer>,

    // ── Output ─────────────────────────────────────────────────
    /// Print per-message outcomes and the zone breakdown to stderr
    #[arg(long)]
    outcomes: bool,

    /// Log each compressed message
    #[arg(short, long)]
    verbose: bool,
}

/// A transcript entry as accepted on input.
#[derive(Deserialize)]
struct InputMessage {
    role: Role,
    content: String,
    #[serde(default)]
    sequence_index: Option<usize>,
}

#[derive(Serialize)]
struct OutcomeReport<'a> {
    outcomes: &'a [CompressionOutcome],
    breakdown: &'a ZoneBreakdown,
}

// ── Helpers ────────────────────────────────────────────────────────

fn read_input(cli: &Cli) -> Result<String, String> {
    match (&cli.transcript, cli.stdin) {
        (Some(path), _) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read transcript '{path}': {e}")),
        (None, true) => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            Ok(buf)
        }
        (None, false) => Err("provide --transcript or --stdin".to_string()),
    }
}

/// Parse input, assigning indexes when none are given.
fn parse_transcript(json: &str) -> Result<Transcript, String> {
    let entries: Vec<InputMessage> =
        serde_json::from_str(json).map_err(|e| format!("failed to parse transcript: {e}"))?;

    if entries.iter().all(|m| m.sequence_index.is_none()) {
        return Ok(Transcript::from_turns(
            entries.into_iter().map(|m| (m.role, m.content)),
        ));
    }

    let messages = entries
        .into_iter()
        .enumerate()
        .map(|(pos, m)| Message::new(m.role, m.content, m.sequence_index.unwrap_or(pos)))
        .collect();
    Transcript::from_messages(messages).map_err(|e| format!("invalid transcript: {e}"))
}

fn build_config(cli: &Cli) -> Result<CompressionConfig, String> {
    let mut config = match &cli.config {
        Some(path) => CompressionConfig::load(path).map_err(|e| e.to_string())?,
        None => CompressionConfig::default(),
    };
    if let Some(model) = &cli.model {
        config = config.for_model(model);
    }
    if let Some(limit) = cli.limit {
        config.total_token_limit = limit;
    }
    if let Some(prefix) = cli.prefix {
        config.prefix_message_count = prefix;
    }
    if let Some(suffix) = cli.suffix {
        config.suffix_window_size = suffix;
    }
    if let Some(share) = cli.older_share {
        config.older_share = share;
        config.recent_share = (1.0 - share).max(0.0);
    }
    if let Some(tokenizer) = cli.tokenizer {
        config.tokenizer = tokenizer;
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<String, String> {
    let transcript = parse_transcript(&read_input(cli)?)?;
    let config = build_config(cli)?;
    let policy = MessageCompressionPolicy::from_config(&config).map_err(|e| e.to_string())?;

    let collector = Arc::new(OutcomeCollector::new());
    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with_if(cli.outcomes, collector.clone());
    let report = policy.compress_with_handler(&transcript, &handler);

    if cli.outcomes {
        let outcomes = collector.take();
        let json = serde_json::to_string_pretty(&OutcomeReport {
            outcomes: &outcomes,
            breakdown: &report.breakdown,
        })
        .map_err(|e| format!("failed to serialize outcomes: {e}"))?;
        eprintln!("{json}");
    }

    serde_json::to_string_pretty(&report.transcript)
        .map_err(|e| format!("failed to serialize transcript: {e}"))
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match run(&cli) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
