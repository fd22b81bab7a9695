use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;

use subtally::auth::{AccessToken, AuthSession, CodeExchange, StaticToken, TokenSource};
use subtally::config::Config;
use subtally::feed::PollContext;
use subtally::gate::ConcurrencyGate;
use subtally::prompt::{LineRouter, TerminalPrompt};
use subtally::{Engine, PollResult};

/// Get the config directory path (~/.config/subtally/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("subtally"))
}

#[derive(Parser, Debug)]
#[command(
    name = "subtally",
    about = "Track subreddits and report their most active posters and top posts"
)]
struct Args {
    /// Config file (default: ~/.config/subtally/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum concurrent listing requests
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Posts per listing page (1-100)
    #[arg(long, value_name = "N")]
    page_size: Option<u32>,

    /// Subreddits to track. Read from stdin, one per line, when omitted.
    feeds: Vec<String>,
}

fn print_result(result: PollResult) {
    match result.result {
        Ok(Some(report)) => println!("{report}\n"),
        Ok(None) => eprintln!("r/{}: no posts found", result.feed),
        Err(e) => eprintln!("r/{}: {e}", result.feed),
    }
}

fn track(engine: &mut Engine, name: &str) {
    if let Err(e) = engine.track(name) {
        eprintln!("Not tracking {:?}: {e}", name.trim());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries reports only
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_dir()?.join("config.toml"),
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .with_env();
    if let Some(n) = args.concurrency {
        config.max_concurrent_requests = n;
    }
    if let Some(n) = args.page_size {
        config.page_size = n;
    }
    config.validate().context("Invalid configuration")?;

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    // Sole reader of stdin; the prompt and the feed-name loop both go through it
    let input = Arc::new(LineRouter::new());
    let mut feed_lines = input.spawn_stdin();

    let source: Arc<dyn TokenSource> = match &config.access_token {
        Some(token) => Arc::new(StaticToken::new(AccessToken::non_expiring(
            SecretString::from(token.clone()),
        ))),
        None => Arc::new(CodeExchange::new(
            client.clone(),
            config.oauth_settings()?,
            Arc::new(TerminalPrompt::new(Arc::clone(&input))),
        )),
    };
    let auth = AuthSession::new(source);

    auth.valid_token().await.context("Authorization failed")?;

    let ctx = PollContext::new(
        client,
        config.poll_settings()?,
        auth,
        ConcurrencyGate::new(config.max_concurrent_requests),
        config.rate_limit_seed(),
    );
    let mut engine = Engine::new(ctx);

    if !args.feeds.is_empty() {
        for name in &args.feeds {
            track(&mut engine, name);
        }
        while let Some(result) = engine.next_result().await {
            print_result(result);
        }
        return Ok(());
    }

    eprintln!("Enter subreddit names, one per line (blank line to finish):");
    let mut accepting = true;

    loop {
        tokio::select! {
            line = feed_lines.recv(), if accepting => match line {
                Some(line) if !line.trim().is_empty() => track(&mut engine, &line),
                _ => {
                    accepting = false;
                    tracing::info!(running = engine.pending(), "No more feeds accepted, draining");
                }
            },
            Some(result) = engine.next_result(), if engine.pending() > 0 => print_result(result),
            else => break,
        }
    }

    Ok(())
}
