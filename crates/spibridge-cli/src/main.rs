//! SPI Bridge Command-Line Tool
//!
//! Replays scripted content changes through an event subscription and prints
//! the bundles a consumer would receive.

mod formatter;
mod script;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;
use script::Script;

use spibridge_core::config::{DEFAULT_MAX_POLL_TIMEOUT_MS, DEFAULT_POLL_TIMEOUT_MS};
use spibridge_core::{EventSubscription, MemoryStore, SharedFilter, StandardFilter, SubscriptionConfig};
use spibridge_proto::{DefaultIdFactory, EventType, NamespaceRegistry, Path, ALL_EVENTS};

/// Session the subscription translates against.
const OBSERVER_USER: &str = "spibridge";

/// SPI Bridge Command-Line Tool
#[derive(Parser, Debug)]
#[command(name = "spibridge")]
#[command(version, about = "Replay content changes through an SPI event subscription")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a change script and print the resulting event bundles
    Replay(ReplayArgs),
}

#[derive(clap::Args, Debug)]
pub struct ReplayArgs {
    /// JSON change script
    pub script: PathBuf,

    /// Only deliver events whose parent is this path
    #[arg(long)]
    pub path: Option<String>,

    /// Also match events below --path
    #[arg(long)]
    pub deep: bool,

    /// Comma-separated event types (node-added, node-removed, property-added,
    /// property-removed, property-changed)
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<EventType>,

    /// Drop events from local batches
    #[arg(long)]
    pub no_local: bool,

    /// Poll timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Also print subscription counters
    #[arg(long)]
    pub stats: bool,
}

impl ReplayArgs {
    /// Subscription configuration for these arguments.
    pub fn to_config(&self) -> SubscriptionConfig {
        let timeout = Duration::from_millis(self.timeout_ms);
        SubscriptionConfig::new()
            .with_poll_timeout(timeout)
            .with_max_poll_timeout(timeout.max(Duration::from_millis(DEFAULT_MAX_POLL_TIMEOUT_MS)))
    }

    /// Filters for these arguments.
    ///
    /// Without any filter flag the set is empty and every event is delivered.
    pub fn filters(&self, registry: &NamespaceRegistry) -> Result<Vec<SharedFilter>, spibridge_proto::Error> {
        if self.path.is_none() && self.types.is_empty() && !self.no_local {
            return Ok(Vec::new());
        }

        let mut filter = match &self.path {
            Some(path) => StandardFilter::new(Path::parse(path, registry)?).deep(self.deep),
            None => StandardFilter::everything(),
        };
        let mask = if self.types.is_empty() {
            ALL_EVENTS
        } else {
            EventType::mask(&self.types)
        };
        filter = filter.with_event_types(mask).no_local(self.no_local);
        Ok(vec![filter.shared()])
    }
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spibridge_cli=info".into()),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        Command::Replay(replay) => run_replay(&replay),
    }
}

/// Replay a script and print what a subscriber receives.
fn run_replay(args: &ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let script = Script::load(&args.script)?;
    let registry = NamespaceRegistry::new();
    let filters = args.filters(&registry)?;

    let store = MemoryStore::with_namespaces(registry.clone());
    let observer = store.login(OBSERVER_USER);
    let subscription = EventSubscription::new(
        Arc::new(DefaultIdFactory),
        Arc::new(observer.clone()),
        args.to_config(),
    )?;
    subscription.register(&observer)?;

    tracing::info!(
        script = %args.script.display(),
        batches = script.batches.len(),
        operations = script.operation_count(),
        "replaying script"
    );
    script.replay(&store, &observer, &subscription)?;

    let bundles = subscription.get_event_bundles_default(&filters);
    let formatter = formatter::create_formatter(args.format, &registry);
    println!("{}", formatter.format_bundles(&bundles));
    if args.stats {
        println!("{}", formatter.format_stats(&subscription.stats()));
    }

    Ok(())
}
