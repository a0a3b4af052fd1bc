use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub repository_path: Option<String>,
    pub port: Option<u16>,
    pub feed_timeout_sec: Option<u64>,
    pub download_connect_timeout_sec: Option<u64>,

    // Own-feed publishing
    pub publisher: Option<PublisherFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PublisherFileConfig {
    pub share_path: Option<String>,
    pub base_url: Option<String>,
    pub feed_filename: Option<String>,
    pub feed_uuid: Option<String>,
    pub feed_name: Option<String>,
    pub feed_description: Option<String>,
    pub refresh_sec: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
