use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::Context;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::catalog_store::{ApplianceStatus, CatalogStore};
use crate::error::AgentError;
use crate::notifications::{CatalogEvent, NotificationSink, PresenceController};

use super::fetcher::{ApplianceFetcher, ApplianceTransfer};
use super::models::{DownloadJob, DownloadSnapshot};
use super::ActiveDownloadSet;

/// What a worker reports back once its transfer is over.
enum DownloadOutcome {
    Completed { uuid: String, path: PathBuf },
    Failed { uuid: String, error: String },
}

/// Owns the download queue and the lifecycle of every transfer.
///
/// Workers only move bytes and report an outcome over the channel; the
/// supervising task is the single writer of post-transfer state (catalog
/// status, queue membership, notifications, presence).
pub struct DownloadManager {
    catalog_store: Arc<dyn CatalogStore>,
    fetcher: Arc<dyn ApplianceFetcher>,
    repository_path: PathBuf,
    jobs: Arc<RwLock<HashMap<String, Arc<DownloadJob>>>>,
    outcome_tx: mpsc::UnboundedSender<DownloadOutcome>,
    notifier: Arc<dyn NotificationSink>,
    presence: Arc<dyn PresenceController>,
}

impl DownloadManager {
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn ApplianceFetcher>,
        repository_path: PathBuf,
        notifier: Arc<dyn NotificationSink>,
        presence: Arc<dyn PresenceController>,
    ) -> Arc<Self> {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let jobs = Arc::new(RwLock::new(HashMap::new()));
        tokio::spawn(run_supervisor(
            outcome_rx,
            jobs.clone(),
            catalog_store.clone(),
            notifier.clone(),
            presence.clone(),
        ));
        Arc::new(Self {
            catalog_store,
            fetcher,
            repository_path,
            jobs,
            outcome_tx,
            notifier,
            presence,
        })
    }

    /// Queue a download for a known appliance and return immediately.
    ///
    /// The appliance is flipped to `INSTALLING` before the worker starts, so
    /// the queue and the catalog never disagree about what is in flight.
    pub fn start_download(&self, uuid: &str) -> Result<(), AgentError> {
        let record = self
            .catalog_store
            .get_appliance(uuid)
            .map_err(AgentError::store)?
            .ok_or_else(|| AgentError::ApplianceNotFound(uuid.to_string()))?;

        let destination = self
            .repository_path
            .join(format!("{uuid}.{}", extension_for(&record.download_url)));
        let job = Arc::new(DownloadJob::new(
            uuid,
            record.download_url.clone(),
            destination,
            record.name.clone(),
        ));

        // Reserve the queue slot under the write lock so two concurrent
        // requests for the same uuid cannot both pass the duplicate check
        // and spawn two workers for one destination file.
        {
            let mut jobs = self.jobs.write().unwrap();
            match jobs.entry(uuid.to_string()) {
                Entry::Occupied(_) => {
                    return Err(anyhow::anyhow!(
                        "a download is already active for appliance {uuid}"
                    )
                    .into());
                }
                Entry::Vacant(slot) => {
                    slot.insert(job.clone());
                }
            }
        }

        if let Err(err) =
            self.catalog_store
                .set_appliance_status(uuid, ApplianceStatus::Installing, None)
        {
            self.jobs.write().unwrap().remove(uuid);
            return Err(AgentError::store(err));
        }

        info!("starting download of appliance {} from {}", uuid, record.download_url);
        self.notifier.push_event(CatalogEvent::DownloadStart);
        self.presence.set_presence("Downloading appliance...");

        let fetcher = self.fetcher.clone();
        let outcome_tx = self.outcome_tx.clone();
        tokio::spawn(run_worker(fetcher, job, outcome_tx));
        Ok(())
    }

    /// Snapshot of every in-flight download.
    pub fn list_queue(&self) -> Vec<DownloadSnapshot> {
        self.jobs
            .read()
            .unwrap()
            .values()
            .map(|job| job.snapshot())
            .collect()
    }

    /// Remove an installed appliance's local file and mark it not installed.
    pub fn delete_installed(&self, uuid: &str) -> Result<(), AgentError> {
        let record = self
            .catalog_store
            .get_appliance(uuid)
            .map_err(AgentError::store)?
            .ok_or_else(|| AgentError::ApplianceNotFound(uuid.to_string()))?;

        if record.status != ApplianceStatus::Installed {
            return Err(AgentError::ApplianceNotInstalled(uuid.to_string()));
        }
        let path = record
            .local_path
            .map(PathBuf::from)
            .filter(|path| path.exists())
            .ok_or_else(|| AgentError::ApplianceNotInstalled(uuid.to_string()))?;

        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove installed appliance file {path:?}"))?;
        self.catalog_store
            .set_appliance_status(uuid, ApplianceStatus::NotInstalled, None)
            .map_err(AgentError::store)?;

        info!("deleted installed appliance {} ({:?})", uuid, path);
        self.notifier.push_event(CatalogEvent::ApplianceDeleted);
        self.notifier
            .announce(&format!("Appliance {uuid} has been deleted"));
        Ok(())
    }

    /// Cancelling an in-flight transfer is not offered.
    pub fn cancel_download(&self, _uuid: &str) -> Result<(), AgentError> {
        Err(AgentError::NotSupported("cancelling an active download"))
    }
}

impl ActiveDownloadSet for DownloadManager {
    fn contains(&self, uuid: &str) -> bool {
        self.jobs.read().unwrap().contains_key(uuid)
    }
}

/// Derive the local file extension from the download URL, falling back to a
/// generic one when the URL has no usable suffix.
fn extension_for(url: &str) -> &str {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .unwrap_or(url);
    match path.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            &path[path.len() - ext.len()..]
        }
        _ => "bundle",
    }
}

async fn run_worker(
    fetcher: Arc<dyn ApplianceFetcher>,
    job: Arc<DownloadJob>,
    outcome_tx: mpsc::UnboundedSender<DownloadOutcome>,
) {
    let outcome = match transfer(fetcher.as_ref(), &job).await {
        Ok(()) => DownloadOutcome::Completed {
            uuid: job.uuid.clone(),
            path: job.destination.clone(),
        },
        Err(err) => DownloadOutcome::Failed {
            uuid: job.uuid.clone(),
            error: format!("{err:#}"),
        },
    };
    if outcome_tx.send(outcome).is_err() {
        error!("download supervisor is gone, dropping outcome for {}", job.uuid);
    }
}

async fn transfer(fetcher: &dyn ApplianceFetcher, job: &DownloadJob) -> anyhow::Result<()> {
    let ApplianceTransfer {
        total_size,
        mut chunks,
    } = fetcher.fetch(&job.url).await?;

    if let Some(parent) = job.destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create repository directory {parent:?}"))?;
    }
    let mut file = tokio::fs::File::create(&job.destination)
        .await
        .with_context(|| format!("failed to create {:?}", job.destination))?;

    let mut downloaded: u64 = 0;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        job.record_progress(downloaded, total_size);
    }
    file.flush().await?;
    job.mark_complete();
    Ok(())
}

async fn run_supervisor(
    mut outcome_rx: mpsc::UnboundedReceiver<DownloadOutcome>,
    jobs: Arc<RwLock<HashMap<String, Arc<DownloadJob>>>>,
    catalog_store: Arc<dyn CatalogStore>,
    notifier: Arc<dyn NotificationSink>,
    presence: Arc<dyn PresenceController>,
) {
    while let Some(outcome) = outcome_rx.recv().await {
        match outcome {
            DownloadOutcome::Completed { uuid, path } => {
                if let Err(err) = catalog_store.set_appliance_status(
                    &uuid,
                    ApplianceStatus::Installed,
                    Some(&path.to_string_lossy()),
                ) {
                    error!("failed to mark appliance {} as installed: {:#}", uuid, err);
                }
                jobs.write().unwrap().remove(&uuid);
                info!("appliance {} installed at {:?}", uuid, path);
                notifier.push_event(CatalogEvent::DownloadComplete);
                notifier.announce(&format!("Appliance {uuid} has been installed"));
            }
            DownloadOutcome::Failed { uuid, error } => {
                warn!("download of appliance {} failed: {}", uuid, error);
                let destination = jobs
                    .read()
                    .unwrap()
                    .get(&uuid)
                    .map(|job| job.destination.clone());
                if let Some(destination) = destination {
                    if let Err(err) = tokio::fs::remove_file(&destination).await {
                        if err.kind() != std::io::ErrorKind::NotFound {
                            warn!("could not remove partial file {:?}: {}", destination, err);
                        }
                    }
                }
                if let Err(err) = catalog_store.set_appliance_status(
                    &uuid,
                    ApplianceStatus::InstallationError,
                    None,
                ) {
                    error!("failed to record download error for {}: {:#}", uuid, err);
                }
                jobs.write().unwrap().remove(&uuid);
                notifier.push_event(CatalogEvent::DownloadError);
                notifier.announce(&format!("Download of appliance {uuid} failed: {error}"));
            }
        }
        if jobs.read().unwrap().is_empty() {
            presence.restore_presence();
        }
    }
}
