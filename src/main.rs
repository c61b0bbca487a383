use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use skyshelf::app::{App, Intent};
use skyshelf::config::Config;
use skyshelf::engine::{FeedEvent, FilterState, KindFilter};
use skyshelf::feed::{build_client, BlueskySource};
use skyshelf::report;
use skyshelf::runner::{self, RunMode};

/// Output width for item lines.
const LINE_WIDTH: usize = 100;

/// Get the default config file path (~/.config/skyshelf/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("skyshelf")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "skyshelf",
    version,
    about = "Load and filter a Bluesky account's public feed"
)]
struct Args {
    /// Config file (default: ~/.config/skyshelf/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Account handle or DID, overriding the config file
    #[arg(long, value_name = "HANDLE")]
    actor: Option<String>,

    /// Content kind to show: all, text, images or videos
    #[arg(long, default_value_t = KindFilter::All)]
    kind: KindFilter,

    /// Only show posts with this tag (repeatable, OR-combined)
    #[arg(long = "tag", value_name = "CHAR")]
    tags: Vec<char>,

    /// Maximum number of items to print
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// Keep running: revalidate periodically, reprint on change and read
    /// commands (kind/tag/clear/more/refresh/near) from stdin
    #[arg(long)]
    watch: bool,
}

/// Forward stdin lines as intents until EOF.
fn spawn_stdin_reader(intent_tx: mpsc::Sender<Intent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match line.parse::<Intent>() {
                    Ok(intent) => {
                        if intent_tx.send(intent).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(actor) = args.actor {
        config.actor = actor;
    }

    url::Url::parse(&config.api_base)
        .with_context(|| format!("Invalid api_base '{}'", config.api_base))?;

    let client = build_client().context("Failed to build HTTP client")?;
    let source = BlueskySource::new(client, &config.api_base, &config.actor, config.page_size);
    tracing::info!(actor = %config.actor, api_base = %config.api_base, "Starting");

    let (event_tx, event_rx) = mpsc::channel::<FeedEvent>(32);
    let (intent_tx, intent_rx) = mpsc::channel::<Intent>(16);

    let mut app = App::new(Arc::new(source), config.engine(), event_tx)
        .with_filter(FilterState::new(args.kind, args.tags));

    if args.watch {
        let mut view_rx = app.subscribe();
        let limit = args.limit;
        tokio::spawn(async move {
            while view_rx.changed().await.is_ok() {
                let view = view_rx.borrow_and_update().clone();
                println!("{}", report::render(&view, limit, LINE_WIDTH));
            }
        });
        spawn_stdin_reader(intent_tx);
        runner::run(&mut app, event_rx, intent_rx, RunMode::Watch).await?;
    } else {
        // No intents in one-shot mode
        drop(intent_tx);
        runner::run(&mut app, event_rx, intent_rx, RunMode::UntilSettled).await?;
        print!("{}", report::render(&app.view(), args.limit, LINE_WIDTH));
    }

    Ok(())
}
