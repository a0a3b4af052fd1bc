//! Streaming fetch of appliance bundles.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

/// An open transfer: the announced size (if any) and the chunk stream.
pub struct ApplianceTransfer {
    pub total_size: Option<u64>,
    pub chunks: BoxStream<'static, Result<Vec<u8>>>,
}

/// Capability to fetch an appliance bundle as a chunk stream.
#[async_trait]
pub trait ApplianceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ApplianceTransfer>;
}

/// HTTP fetcher over a shared reqwest client.
///
/// Only the connection attempt is bounded; the transfer itself runs for as
/// long as the download takes.
pub struct HttpApplianceFetcher {
    client: reqwest::Client,
}

impl HttpApplianceFetcher {
    pub fn new(connect_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

#[async_trait]
impl ApplianceFetcher for HttpApplianceFetcher {
    async fn fetch(&self, url: &str) -> Result<ApplianceTransfer> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("failed to connect for download")?;

        if !response.status().is_success() {
            anyhow::bail!("download failed with status: {}", response.status());
        }

        let total_size = response.content_length();
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(anyhow::Error::from))
            .boxed();

        Ok(ApplianceTransfer { total_size, chunks })
    }
}
