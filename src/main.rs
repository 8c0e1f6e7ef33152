//! # AdRelay
//!
//! Forwards ads from users' messaging accounts into their groups on a
//! schedule, with free and premium tiers.
//!
//! Usage:
//!   adrelay run                        # Start the bot and every saved session
//!   adrelay init-config                # Write a default config file
//!   adrelay check-config               # Validate the config and exit
//!   adrelay --config ./dev.toml run    # Custom config path

use std::path::PathBuf;
use std::sync::Arc;

use adrelay_bot::{BotHandler, run_bot};
use adrelay_channels::{TelegramConfig, TelegramFactory, TelegramTransport};
use adrelay_core::{AdRelayConfig, TierPolicy};
use adrelay_scheduler::{AutomationManager, CampaignRunner, Forwarder, spawn_campaign_runner};
use adrelay_store::SqliteStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adrelay", version, about = "📢 AdRelay: scheduled ad forwarding bot")]
struct Cli {
    /// Config file (default: ~/.adrelay/config.toml)
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
    /// Start the command bot, saved sessions and the campaign runner
    Run,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate the config and print a summary
    CheckConfig,
}

fn config_path(cli: &Cli) -> PathBuf {
    match &cli.config {
        Some(p) => PathBuf::from(shellexpand::tilde(p).to_string()),
        None => AdRelayConfig::default_path(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let path = config_path(&cli);
    match cli.command.unwrap_or(Commands::Run) {
        Commands::InitConfig { force } => {
            if path.exists() && !force {
                println!("⚠️  {} already exists (use --force to overwrite)", path.display());
                return Ok(());
            }
            AdRelayConfig::default().save_to(&path)?;
            println!("✅ Wrote default config to {}", path.display());
            println!("   Set bot.token and bot.owner_id, then run `adrelay run`.");
            Ok(())
        }
        Commands::CheckConfig => {
            let config = AdRelayConfig::load_or_default(&path)?;
            config.validate()?;
            println!("✅ Config OK: {}", path.display());
            println!("   Bot:       @{} (owner {})", config.bot.username, config.bot.owner_id);
            println!("   Database:  {}", config.database.resolved_path().display());
            println!("   Free:      {}s fixed delay", config.free.delay_secs);
            println!(
                "   Premium:   {}-{}s (default {}s)",
                config.premium.min_delay_secs,
                config.premium.max_delay_secs,
                config.premium.default_delay_secs
            );
            Ok(())
        }
        Commands::Run => run(AdRelayConfig::load_or_default(&path)?).await,
    }
}

async fn run(config: AdRelayConfig) -> Result<()> {
    config.validate()?;

    let db_path = config.database.resolved_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = Arc::new(SqliteStore::open(&db_path)?);
    tracing::info!("💾 Database: {}", db_path.display());

    let forwarder = Arc::new(Forwarder::new(
        store,
        TierPolicy::from_config(&config),
        config.forwarding.clone(),
    ));
    let manager = Arc::new(AutomationManager::new(
        Arc::new(TelegramFactory::new()),
        forwarder.clone(),
    ));
    manager.start_all().await?;

    let campaigns = Arc::new(CampaignRunner::new(forwarder, manager.sessions().clone()));
    let campaign_task = spawn_campaign_runner(campaigns, config.forwarding.campaign_check_secs);

    let mut bot_config = TelegramConfig::new(config.bot.token.clone());
    bot_config.poll_interval = config.bot.poll_interval;
    let poller = TelegramTransport::new(bot_config.clone());
    let replier = Arc::new(TelegramTransport::new(bot_config));
    let handler = Arc::new(BotHandler::new(manager.clone(), config.bot.owner_id));

    tokio::select! {
        result = run_bot(handler, poller, replier) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down..."),
    }

    campaign_task.abort();
    manager.shutdown().await;
    Ok(())
}
