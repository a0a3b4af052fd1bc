//! Feed synchronization.
//!
//! Pulls every registered feed, reconciles the catalog with what the feeds
//! advertise and produces the merged per-source view served to clients.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog_store::{
    ApplianceRecord, ApplianceStatus, CatalogStore, FeedSource, InsertOutcome,
};
use crate::download_manager::ActiveDownloadSet;
use crate::error::AgentError;
use crate::feed::{parse_feed, FeedDocument};
use crate::notifications::{CatalogEvent, NotificationSink};

/// Capability to fetch a feed document body.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// HTTP fetcher with an overall per-request timeout.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch feed {url}"))?;
        if !response.status().is_success() {
            anyhow::bail!("feed {} answered with status: {}", url, response.status());
        }
        Ok(response.text().await.context("failed to read feed body")?)
    }
}

/// One appliance as presented to clients: feed metadata merged with the
/// locally tracked installation status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogAppliance {
    pub uuid: String,
    pub name: String,
    pub description: String,
    pub download_url: String,
    pub size: i64,
    pub published_at: String,
    pub status: ApplianceStatus,
}

/// A source together with the appliances its feed currently advertises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCatalog {
    pub source: FeedSource,
    pub appliances: Vec<CatalogAppliance>,
}

pub struct FeedSynchronizer {
    catalog_store: Arc<dyn CatalogStore>,
    fetcher: Arc<dyn FeedFetcher>,
    active_downloads: Arc<dyn ActiveDownloadSet>,
    notifier: Arc<dyn NotificationSink>,
}

impl FeedSynchronizer {
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn FeedFetcher>,
        active_downloads: Arc<dyn ActiveDownloadSet>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            catalog_store,
            fetcher,
            active_downloads,
            notifier,
        }
    }

    /// Synchronize every registered source and return the merged catalog, in
    /// registration order.
    ///
    /// An unreachable feed is skipped for this pass and its source kept. A
    /// feed that fetches but does not parse gets its source (and appliances)
    /// removed; the pass still completes for the remaining sources and the
    /// last such failure is surfaced to the caller afterwards.
    pub async fn sync_all(&self) -> Result<Vec<SourceCatalog>, AgentError> {
        let sources = self.catalog_store.list_sources().map_err(AgentError::store)?;

        let mut synced: Vec<(FeedSource, FeedDocument)> = Vec::new();
        let mut last_bad_feed: Option<AgentError> = None;

        for source in sources {
            let body = match self.fetcher.fetch(&source.url).await {
                Ok(body) => body,
                Err(err) => {
                    warn!("feed {} is unreachable, skipping: {:#}", source.url, err);
                    continue;
                }
            };
            let doc = match parse_feed(&body) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!("feed {} is invalid, dropping source: {:#}", source.url, err);
                    self.catalog_store
                        .delete_source_by_url(&source.url)
                        .map_err(AgentError::store)?;
                    last_bad_feed = Some(AgentError::BadFeedFormat(format!("{err:#}")));
                    continue;
                }
            };
            let resolved = self.reconcile(&source.url, &doc)?;
            synced.push((resolved, doc));
        }

        self.recover_orphaned_installing()?;

        if let Some(err) = last_bad_feed {
            return Err(err);
        }

        let mut catalogs = Vec::with_capacity(synced.len());
        for (source, doc) in synced {
            catalogs.push(self.build_view(source, &doc)?);
        }
        Ok(catalogs)
    }

    /// Register a new feed source. The feed must fetch and parse before the
    /// registration is accepted.
    pub async fn register(&self, url: &str) -> Result<(), AgentError> {
        let body = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|err| AgentError::UnreachableFeed(format!("{err:#}")))?;
        let doc =
            parse_feed(&body).map_err(|err| AgentError::BadFeedFormat(format!("{err:#}")))?;

        self.reconcile(url, &doc)?;
        info!("registered feed source {} ({})", doc.uuid, url);
        self.notifier.push_event(CatalogEvent::Register);
        self.notifier
            .announce(&format!("New feed source registered: {}", doc.title));
        Ok(())
    }

    /// Remove a source and everything it advertised.
    pub fn unregister(&self, uuid: &str) -> Result<(), AgentError> {
        let deleted = self
            .catalog_store
            .delete_source(uuid)
            .map_err(AgentError::store)?;
        if !deleted {
            return Err(AgentError::SourceNotFound(uuid.to_string()));
        }
        info!("unregistered feed source {}", uuid);
        self.notifier.push_event(CatalogEvent::Unregister);
        self.notifier
            .announce(&format!("Feed source {uuid} has been removed"));
        Ok(())
    }

    /// Store the source identity learned from the document and fold its
    /// entries into the catalog. Existing rows keep status and local_path.
    fn reconcile(&self, url: &str, doc: &FeedDocument) -> Result<FeedSource, AgentError> {
        let source = FeedSource {
            uuid: Some(doc.uuid.clone()),
            name: doc.title.clone(),
            description: doc.description.clone(),
            url: url.to_string(),
        };
        self.catalog_store
            .upsert_source(&source)
            .map_err(AgentError::store)?;

        for entry in &doc.entries {
            self.catalog_store
                .insert_appliance(&ApplianceRecord {
                    uuid: entry.uuid.clone(),
                    name: entry.title.clone(),
                    description: entry.description.clone(),
                    download_url: entry.enclosure_url.clone(),
                    status: ApplianceStatus::NotInstalled,
                    source: doc.uuid.clone(),
                    local_path: None,
                })
                .map_err(AgentError::store)?;
        }
        Ok(source)
    }

    /// Rows stuck in `INSTALLING` with no active download worker are leftovers
    /// of an interrupted run; flag them so clients see the failure.
    fn recover_orphaned_installing(&self) -> Result<(), AgentError> {
        let installing = self
            .catalog_store
            .list_appliances_by_status(ApplianceStatus::Installing)
            .map_err(AgentError::store)?;
        for record in installing {
            if self.active_downloads.contains(&record.uuid) {
                continue;
            }
            warn!("appliance {} was installing with no active download", record.uuid);
            self.catalog_store
                .set_appliance_status(&record.uuid, ApplianceStatus::InstallationError, None)
                .map_err(AgentError::store)?;
        }
        Ok(())
    }

    /// Merge a parsed document with the stored per-appliance status, keeping
    /// the document's entry order.
    fn build_view(
        &self,
        source: FeedSource,
        doc: &FeedDocument,
    ) -> Result<SourceCatalog, AgentError> {
        let mut appliances = Vec::with_capacity(doc.entries.len());
        for entry in &doc.entries {
            let status = self
                .catalog_store
                .get_appliance(&entry.uuid)
                .map_err(AgentError::store)?
                .map(|record| record.status)
                .unwrap_or(ApplianceStatus::NotInstalled);
            appliances.push(CatalogAppliance {
                uuid: entry.uuid.clone(),
                name: entry.title.clone(),
                description: entry.description.clone(),
                download_url: entry.enclosure_url.clone(),
                size: entry.enclosure_length,
                published_at: entry.pub_date.clone(),
                status,
            });
        }
        Ok(SourceCatalog { source, appliances })
    }
}
