//! Concurrent appliance downloads.
//!
//! One background worker per in-flight transfer; a supervising task applies
//! the outcome (catalog update, queue removal, notifications) so workers
//! never re-enter shared state themselves.

mod fetcher;
mod manager;
mod models;

pub use fetcher::{ApplianceFetcher, ApplianceTransfer, HttpApplianceFetcher};
pub use manager::DownloadManager;
pub use models::{DownloadJob, DownloadSnapshot, TOTAL_SIZE_UNKNOWN};

/// Read-only view of which downloads are currently in flight.
///
/// The feed synchronizer consumes this to detect orphaned `INSTALLING` rows
/// without depending on the concrete manager type.
pub trait ActiveDownloadSet: Send + Sync {
    fn contains(&self, uuid: &str) -> bool;
}
