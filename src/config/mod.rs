mod file_config;

pub use file_config::{FileConfig, PublisherFileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub repository_path: Option<PathBuf>,
    pub port: u16,
    pub feed_timeout_sec: u64,
    pub download_connect_timeout_sec: u64,
    pub share_path: Option<PathBuf>,
    pub base_url: Option<String>,
    pub feed_filename: String,
    pub feed_uuid: Option<String>,
    pub feed_name: Option<String>,
    pub feed_description: Option<String>,
    pub feed_refresh_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_path: PathBuf,
    pub repository_path: PathBuf,
    pub port: u16,
    pub feed_timeout: Duration,
    pub download_connect_timeout: Duration,

    // Own-feed publishing, enabled when a share path is configured
    pub publisher: Option<PublisherSettings>,
}

#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub share_path: PathBuf,
    pub base_url: String,
    pub feed_filename: String,
    pub feed_uuid: String,
    pub feed_name: String,
    pub feed_description: String,
    pub refresh_interval: Duration,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        let repository_path = file
            .repository_path
            .map(PathBuf::from)
            .or_else(|| cli.repository_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "repository_path must be specified via --repository-path or in config file"
                )
            })?;
        if !repository_path.exists() {
            bail!("Repository directory does not exist: {:?}", repository_path);
        }
        if !repository_path.is_dir() {
            bail!("repository_path is not a directory: {:?}", repository_path);
        }

        let port = file.port.unwrap_or(cli.port);
        let feed_timeout = Duration::from_secs(file.feed_timeout_sec.unwrap_or(cli.feed_timeout_sec));
        let download_connect_timeout = Duration::from_secs(
            file.download_connect_timeout_sec
                .unwrap_or(cli.download_connect_timeout_sec),
        );

        // Publisher settings, only assembled when a share path is configured
        let publisher_file = file.publisher.unwrap_or_default();
        let share_path = publisher_file
            .share_path
            .map(PathBuf::from)
            .or_else(|| cli.share_path.clone());
        let publisher = match share_path {
            None => None,
            Some(share_path) => {
                if !share_path.exists() {
                    bail!("Share directory does not exist: {:?}", share_path);
                }
                if !share_path.is_dir() {
                    bail!("share_path is not a directory: {:?}", share_path);
                }
                let base_url = publisher_file
                    .base_url
                    .or_else(|| cli.base_url.clone())
                    .ok_or_else(|| {
                        anyhow::anyhow!("base_url is required when a share path is configured")
                    })?;
                let feed_uuid = publisher_file
                    .feed_uuid
                    .or_else(|| cli.feed_uuid.clone())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                Some(PublisherSettings {
                    share_path,
                    base_url,
                    feed_filename: publisher_file
                        .feed_filename
                        .unwrap_or_else(|| cli.feed_filename.clone()),
                    feed_uuid,
                    feed_name: publisher_file
                        .feed_name
                        .or_else(|| cli.feed_name.clone())
                        .unwrap_or_else(|| "Shared appliances".to_string()),
                    feed_description: publisher_file
                        .feed_description
                        .or_else(|| cli.feed_description.clone())
                        .unwrap_or_default(),
                    refresh_interval: Duration::from_secs(
                        publisher_file.refresh_sec.unwrap_or(cli.feed_refresh_sec),
                    ),
                })
            }
        };

        Ok(Self {
            db_path,
            repository_path,
            port,
            feed_timeout,
            download_connect_timeout,
            publisher,
        })
    }
}
