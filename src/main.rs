use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use appliance_agent::catalog_store::SqliteCatalogStore;
use appliance_agent::config::{AppConfig, CliConfig, FileConfig};
use appliance_agent::download_manager::{DownloadManager, HttpApplianceFetcher};
use appliance_agent::feed_sync::{FeedSynchronizer, HttpFeedFetcher};
use appliance_agent::notifications::LogNotificationSink;
use appliance_agent::publisher::{OwnFeedPublisher, PublisherConfig};
use appliance_agent::router::RequestRouter;
use appliance_agent::server::run_server;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in it override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite catalog database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Directory where downloaded appliances are stored.
    #[clap(long, value_parser = parse_path)]
    pub repository_path: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8090)]
    pub port: u16,

    /// Timeout in seconds for fetching a feed document.
    #[clap(long, default_value_t = 30)]
    pub feed_timeout_sec: u64,

    /// Connect timeout in seconds for appliance downloads.
    #[clap(long, default_value_t = 30)]
    pub download_connect_timeout_sec: u64,

    /// Directory of locally shared bundles. Enables own-feed publishing.
    #[clap(long, value_parser = parse_path)]
    pub share_path: Option<PathBuf>,

    /// Public URL prefix under which the share directory is served.
    #[clap(long)]
    pub base_url: Option<String>,

    /// File name of the published feed inside the share directory.
    #[clap(long, default_value = "feed.xml")]
    pub feed_filename: String,

    /// uuid of the published feed. Generated when omitted.
    #[clap(long)]
    pub feed_uuid: Option<String>,

    /// Title of the published feed.
    #[clap(long)]
    pub feed_name: Option<String>,

    /// Description of the published feed.
    #[clap(long)]
    pub feed_description: Option<String>,

    /// Interval in seconds between own-feed refreshes.
    #[clap(long, default_value_t = 300)]
    pub feed_refresh_sec: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            repository_path: self.repository_path.clone(),
            port: self.port,
            feed_timeout_sec: self.feed_timeout_sec,
            download_connect_timeout_sec: self.download_connect_timeout_sec,
            share_path: self.share_path.clone(),
            base_url: self.base_url.clone(),
            feed_filename: self.feed_filename.clone(),
            feed_uuid: self.feed_uuid.clone(),
            feed_name: self.feed_name.clone(),
            feed_description: self.feed_description.clone(),
            feed_refresh_sec: self.feed_refresh_sec,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Opening SQLite catalog database at {:?}...", config.db_path);
    let catalog_store = Arc::new(SqliteCatalogStore::new(&config.db_path)?);

    let notifier = Arc::new(LogNotificationSink);
    let download_manager = DownloadManager::new(
        catalog_store.clone(),
        Arc::new(HttpApplianceFetcher::new(config.download_connect_timeout)),
        config.repository_path.clone(),
        notifier.clone(),
        notifier.clone(),
    );
    let synchronizer = FeedSynchronizer::new(
        catalog_store.clone(),
        Arc::new(HttpFeedFetcher::new(config.feed_timeout)),
        download_manager.clone(),
        notifier,
    );
    let request_router = Arc::new(RequestRouter::new(
        synchronizer,
        download_manager,
        catalog_store,
    ));

    let cancellation_token = CancellationToken::new();

    if let Some(settings) = config.publisher {
        let publisher = OwnFeedPublisher::new(PublisherConfig {
            share_path: settings.share_path,
            feed_filename: settings.feed_filename,
            base_url: settings.base_url,
            feed_uuid: settings.feed_uuid,
            feed_name: settings.feed_name,
            feed_description: settings.feed_description,
            refresh_interval: settings.refresh_interval,
        });
        // Bring the feed up to date before serving, then keep refreshing
        if let Err(err) = publisher.publish_once() {
            warn!("initial own-feed publish failed: {:#}", err);
        }
        let publisher_token = cancellation_token.clone();
        tokio::spawn(async move { publisher.run(publisher_token).await });
    }

    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown_token.cancel();
        }
    });

    info!("Ready to serve at port {}!", config.port);
    run_server(request_router, config.port, cancellation_token).await
}
