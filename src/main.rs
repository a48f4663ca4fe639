use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use ladderbot::bot::Bot;
use ladderbot::config::Config;

/// Ladderbot - Telegram period prediction bot with a staking ladder
#[derive(Parser, Debug)]
#[command(name = "ladderbot", version, about)]
struct Args {
    /// Path to the TOML config file (defaults are used when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Telegram bot token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Administrator's numeric Telegram id (overrides the config file)
    #[arg(long, env = "ADMIN_ID")]
    admin_id: Option<i64>,

    /// Override the user store path
    #[arg(long)]
    store: Option<PathBuf>,

    /// Keep users in memory only
    #[arg(long, conflicts_with = "store")]
    memory: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(args.log_level)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(id) = args.admin_id {
        config.admin.id = id;
    }
    if let Some(path) = args.store {
        config.store.path = Some(path);
    }
    if args.memory {
        config.store.path = None;
    }
    let token = config.token(args.token.as_deref())?;

    info!(
        admin_id = config.admin.id,
        free_max_level = config.ladder.free_max_level,
        vip_max_level = config.ladder.vip_max_level,
        "🤖 Ladderbot starting"
    );

    let bot = Bot::new(config, &token)?;
    bot.run().await
}
