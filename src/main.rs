use std::io::Write;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use skein_context::{
    ContextStrategy, FifoConfig, FifoStrategy, LruStrategy, NoopStrategy, SummarizeConfig,
    SummarizeStrategy,
};
use skein_engine::{Conversation, ConversationStats};

/// Chat with a remote model while a compaction strategy keeps the context
/// window bounded.
#[derive(Parser, Debug)]
#[command(name = "skein", version)]
struct Args {
    /// Model URI: `provider/model` or `provider@base_url:model?params`
    model_uri: String,

    /// API key for the chat backend
    #[arg(long, env = "SKEIN_API_KEY", hide_env_values = true)]
    api_key: String,

    /// System prompt prepended to the conversation
    #[arg(long)]
    system: Option<String>,

    /// Compaction strategy: noop, fifo, summarize, lru
    #[arg(long, default_value = "noop")]
    strategy: String,

    /// FIFO: number of recent turns to keep
    #[arg(long)]
    keep_recent_turns: Option<usize>,

    /// Token budget for the transmitted context
    #[arg(long)]
    max_input_tokens: Option<usize>,

    /// Fraction of the budget at which summarization triggers
    #[arg(long, default_value_t = 0.75)]
    summarize_threshold: f64,

    /// Recent turns kept verbatim by summarize/lru
    #[arg(long, default_value_t = 2)]
    prefer_recent_turns: usize,

    /// Summarizer model URI (defaults to the chat model URI)
    #[arg(long)]
    summarizer_uri: Option<String>,

    /// Summarizer API key (defaults to the chat API key)
    #[arg(long, env = "SKEIN_SUMMARIZER_API_KEY", hide_env_values = true)]
    summarizer_api_key: Option<String>,
}

fn build_strategy(args: &Args) -> anyhow::Result<Box<dyn ContextStrategy>> {
    match args.strategy.as_str() {
        "noop" => Ok(Box::new(NoopStrategy)),
        "fifo" => {
            let strategy = FifoStrategy::new(FifoConfig {
                keep_recent_turns: args.keep_recent_turns,
                max_input_tokens: args.max_input_tokens,
                ..FifoConfig::default()
            })?;
            Ok(Box::new(strategy))
        }
        kind @ ("summarize" | "lru") => {
            let budget = args
                .max_input_tokens
                .context("--max-input-tokens is required for summarize/lru")?;
            let uri = args
                .summarizer_uri
                .clone()
                .unwrap_or_else(|| args.model_uri.clone());
            let key = args
                .summarizer_api_key
                .clone()
                .unwrap_or_else(|| args.api_key.clone());
            let mut config = SummarizeConfig::new(budget, uri, key);
            config.summarize_threshold = args.summarize_threshold;
            config.prefer_recent_turns = args.prefer_recent_turns;

            if kind == "lru" {
                Ok(Box::new(LruStrategy::new(config)?))
            } else {
                Ok(Box::new(SummarizeStrategy::new(config)?))
            }
        }
        other => bail!("unknown strategy `{other}` (expected noop, fifo, summarize, lru)"),
    }
}

fn print_stats(stats: &ConversationStats) {
    println!("messages: {}", stats.total_messages);
    for (role, count) in &stats.by_role {
        println!("  {role}: {count}");
    }
    println!(
        "tokens: in {} / out {} / total {}",
        ConversationStats::format_tokens(stats.input_tokens),
        ConversationStats::format_tokens(stats.output_tokens),
        ConversationStats::format_tokens(stats.total_tokens),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let strategy = build_strategy(&args)?;

    let mut conversation = Conversation::connect(&args.model_uri, &args.api_key)?;
    if let Some(system) = &args.system {
        conversation = conversation.with_system_prompt(system.as_str());
    }
    conversation = conversation.with_strategy(strategy);

    println!(
        "connected to {} ({}); /stats, /reset, /quit",
        conversation.backend_name(),
        args.model_uri
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/stats" => {
                print_stats(&conversation.stats());
                continue;
            }
            "/reset" => {
                conversation.reset();
                println!("conversation reset");
                continue;
            }
            _ => {}
        }

        let result = conversation
            .send_stream(line, |chunk| {
                print!("{}", chunk.content);
                let _ = std::io::stdout().flush();
            })
            .await;
        println!();

        if let Err(e) = result {
            eprintln!("error: {e:#}");
        }
    }

    Ok(())
}
