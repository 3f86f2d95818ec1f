//! # LinkTracker
//!
//! Watches GitHub repositories and StackOverflow questions and tells Telegram
//! subscribers when they change.
//!
//! Usage:
//!   linktracker                          # Run bot + scheduler until Ctrl-C
//!   linktracker scan                     # One scan cycle, then exit
//!   linktracker scan --dry-run           # Print notifications instead of sending
//!   linktracker config                   # Print the effective configuration

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use linktracker_bot::{ConversationBot, Dispatcher, TelegramClient};
use linktracker_core::traits::Messenger;
use linktracker_core::types::SubscriberId;
use linktracker_core::LinkTrackerConfig;
use linktracker_db::SqliteStore;
use linktracker_scheduler::{LinkChecker, Notifier, Scheduler};
use linktracker_sources::SourceRegistry;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "linktracker",
    version,
    about = "🔗 LinkTracker: GitHub and StackOverflow update notifications on Telegram"
)]
struct Cli {
    /// Config file (default: ~/.linktracker/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot and the scan scheduler until Ctrl-C
    Run,
    /// Run a single scan cycle and deliver its notifications
    Scan {
        /// Print notifications to stdout instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "linktracker=debug,linktracker_core=debug,linktracker_sources=debug,\
         linktracker_scheduler=debug,linktracker_bot=debug,linktracker_db=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Scan { dry_run } => scan(config, dry_run).await,
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&str>) -> Result<LinkTrackerConfig> {
    let config = match path {
        Some(p) => {
            let path = PathBuf::from(shellexpand::tilde(p).as_ref());
            LinkTrackerConfig::load_from(&path)?.with_env_overrides()
        }
        None => LinkTrackerConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

fn open_store(config: &LinkTrackerConfig) -> Result<Arc<SqliteStore>> {
    let path = config.database.resolved_path();
    let store = SqliteStore::open(&path)?;
    tracing::info!("🗄️ Database: {} ({} tracked link(s))", path.display(), store.link_count()?);
    Ok(Arc::new(store))
}

fn link_checker(config: &LinkTrackerConfig, store: Arc<SqliteStore>, sources: SourceRegistry) -> LinkChecker {
    LinkChecker::new(
        store,
        sources,
        config.scheduler.page_size,
        config.scheduler.check_concurrency,
    )
}

async fn run(config: LinkTrackerConfig) -> Result<()> {
    let store = open_store(&config)?;
    let sources = SourceRegistry::from_config(&config)?;
    tracing::info!("🔌 Sources: {}", sources.names().join(", "));

    let telegram = TelegramClient::new(&config.telegram)?;
    match telegram.get_me().await {
        Ok(me) => tracing::info!(
            "🤖 Telegram bot: @{} ({})",
            me.username.as_deref().unwrap_or("unknown"),
            me.first_name
        ),
        Err(e) => tracing::warn!("⚠️ Telegram getMe failed: {e}"),
    }
    if let Err(e) = telegram.set_commands().await {
        tracing::warn!("⚠️ Could not register the command menu: {e}");
    }
    let messenger: Arc<dyn Messenger> = Arc::new(telegram.clone());

    let scheduler = Scheduler::new(
        link_checker(&config, store.clone(), sources.clone()),
        Notifier::new(messenger.clone()),
        &config.scheduler,
    )
    .start();

    let bot = Arc::new(ConversationBot::new(store.clone(), store, sources));
    let dispatcher = Dispatcher::start(bot, messenger, &config.dispatcher);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatch = tokio::spawn(dispatcher.run(telegram.start_polling(), shutdown_rx));

    println!("🔗 LinkTracker running. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutting down");

    shutdown_tx.send(true).ok();
    dispatch.await?;
    scheduler.stop().await;
    Ok(())
}

async fn scan(config: LinkTrackerConfig, dry_run: bool) -> Result<()> {
    let store = open_store(&config)?;
    let sources = SourceRegistry::from_config(&config)?;
    let messenger: Arc<dyn Messenger> = if dry_run {
        Arc::new(StdoutMessenger)
    } else {
        Arc::new(TelegramClient::new(&config.telegram)?)
    };

    let scheduler = Scheduler::new(
        link_checker(&config, store, sources),
        Notifier::new(messenger),
        &config.scheduler,
    );
    let stats = scheduler.run_once().await?;
    let (delivered, failed) = scheduler.notifier().counts();

    println!("📊 Scan finished");
    println!("   Page requests: {} ({} non-empty)", stats.requests, stats.pages);
    println!("   Checked:       {}", stats.checked);
    println!("   Updated:       {}", stats.updated);
    println!("   Unsupported:   {}", stats.unsupported);
    println!("   Failed:        {}", stats.failed);
    println!("   Notifications: {delivered} delivered, {failed} failed");
    Ok(())
}

/// Prints notifications instead of sending them.
struct StdoutMessenger;

#[async_trait]
impl Messenger for StdoutMessenger {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn deliver(&self, subscriber: SubscriberId, text: &str) -> linktracker_core::Result<()> {
        println!("→ {subscriber}: {text}");
        Ok(())
    }
}
