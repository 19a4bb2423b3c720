mod calendar;
mod config;
mod line;
mod version;
mod web;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::{
    calendar::{
        CachedTokenProvider, ClientSecret, EventSource, GoogleCalendar, InteractiveTokenProvider,
        TokenCache, TokenProvider,
    },
    config::{Config, open_config, write_default_config},
    line::{HttpPushTransport, LineCredentials, LineNotifier},
    version::SHORT_VERSION,
    web::Dashboard,
};

#[derive(Parser)]
#[command(version = SHORT_VERSION)]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long)]
    init: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// ダッシュボードを起動する（既定）
    Serve,
    /// Google カレンダーへのアクセスを認可し、トークンを保存する
    Auth,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.init {
        write_default_config(&args.config)?;
        info!(path = ?args.config, "Created default configuration");
        return Ok(());
    }

    info!(version = SHORT_VERSION, "kamidash version");

    let config = open_config(&args.config).context("Failed to load configuration")?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Auth => authorize(config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let gym = config.gym.evaluator().context("Invalid gym configuration")?;

    let notifier = LineNotifier::new(LineCredentials::from_env(), HttpPushTransport::new()?);
    if !notifier.is_enabled() {
        info!("LINE_TOKEN / LINE_USER_ID are not set; comments will not be forwarded");
    }

    let (events, window) = match &config.calendar {
        Some(calendar) => {
            let tokens = CachedTokenProvider::new(
                TokenCache::new(&calendar.token_cache),
                &calendar.client_secret,
            )?;
            let source: Arc<dyn EventSource> = Arc::new(GoogleCalendar::new(
                tokens,
                &calendar.calendar_id,
                calendar.max_results,
            )?);
            info!(
                calendar_id = %calendar.calendar_id,
                window = %humantime::format_duration(calendar.window),
                "Calendar enabled"
            );
            (Some(source), calendar.window)
        }
        None => {
            info!("Calendar is not configured");
            (None, Default::default())
        }
    };

    let dashboard = Dashboard::new(&config.gym.name, gym, events, window, Arc::new(notifier))?;
    web::serve(config.server.listen, Arc::new(dashboard)).await
}

async fn authorize(config: Config) -> Result<()> {
    let calendar = config.calendar.context("[calendar] is not configured")?;
    let secret = ClientSecret::load(&calendar.client_secret)?;
    let tokens: Box<dyn TokenProvider> = Box::new(InteractiveTokenProvider::new(
        secret,
        TokenCache::new(&calendar.token_cache),
    )?);
    tokens.access_token().await?;
    info!(path = ?calendar.token_cache, "Calendar access is authorized");
    Ok(())
}
