use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use chain_notify::config::{CommandTemplate, HookConfig};
use chain_notify::feed::replay;
use chain_notify::{Channel, MemoryChainView, NotificationService};

#[derive(Parser)]
#[command(author, version, about = "Replay a node event feed and run notification hooks")]
struct Args {
    /// Hook settings as JSON; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Command to run when a block is connected (%s = block hash)
    #[arg(long)]
    blocknotify: Option<String>,

    /// Command to run when a wallet transaction changes (%s = txid, %w %b %h)
    #[arg(long)]
    walletnotify: Option<String>,

    /// Command to run on an alert (%s = quoted message)
    #[arg(long)]
    alertnotify: Option<String>,

    #[arg(long)]
    walletname: Option<String>,

    /// Maximum hook commands running at once (default: unbounded)
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Kill hook commands running longer than this
    #[arg(long)]
    command_timeout_secs: Option<u64>,

    /// JSON-lines event feed (default: stdin)
    #[arg(long)]
    events: Option<PathBuf>,

    /// Keep running this long after the feed ends so queued hooks can launch
    #[arg(long, default_value_t = 500)]
    linger_ms: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = build_config(&args)?;
    let mut service = NotificationService::start(config)?;
    let mut view = MemoryChainView::new();

    let t0 = Instant::now();
    let applied = match &args.events {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("opening event feed {}", path.display()))?;
            replay(BufReader::new(file), &mut service, &mut view)?
        }
        None => replay(io::stdin().lock(), &mut service, &mut view)?,
    };

    println!(
        "[MAIN] applied {} events in {:?}; tip = {}",
        applied,
        t0.elapsed(),
        service
            .tip()
            .map(|t| format!("{} @ {}", t.hash, t.height))
            .unwrap_or_else(|| "none".to_string())
    );

    std::thread::sleep(Duration::from_millis(args.linger_ms));
    Ok(())
}

fn build_config(args: &Args) -> Result<HookConfig> {
    let mut config = match &args.config {
        Some(path) => HookConfig::from_json_file(path)?,
        None => HookConfig::default(),
    };

    if let Some(t) = &args.blocknotify {
        config.block_notify = Some(CommandTemplate::parse(Channel::Block, t)?);
    }
    if let Some(t) = &args.walletnotify {
        config.wallet_notify = Some(CommandTemplate::parse(Channel::Wallet, t)?);
    }
    if let Some(t) = &args.alertnotify {
        config.alert_notify = Some(CommandTemplate::parse(Channel::Alert, t)?);
    }
    if let Some(name) = &args.walletname {
        config.wallet_name = name.clone();
    }
    if args.max_concurrent.is_some() {
        config.max_concurrent = args.max_concurrent;
    }
    if let Some(secs) = args.command_timeout_secs {
        config.command_timeout = Some(Duration::from_secs(secs));
    }

    Ok(config)
}
