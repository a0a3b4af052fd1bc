//! Catalog store trait definition.

use anyhow::Result;

use super::models::{ApplianceRecord, ApplianceStatus, FeedSource, InsertOutcome};

/// Durable storage of feed sources and appliance records.
///
/// All mutating methods take an exclusive lock internally; callers never
/// hand-roll locking. Enumerations are returned in storage (insertion)
/// order, which gives registration order for sources and feed-document
/// order for appliances.
pub trait CatalogStore: Send + Sync {
    // === Sources ===

    /// Insert a source if its `url` is unseen, otherwise update
    /// uuid/name/description for the matching `url`.
    fn upsert_source(&self, source: &FeedSource) -> Result<()>;

    /// Delete a source by uuid and cascade to all appliances whose `source`
    /// matches. Returns false if no source had that uuid.
    fn delete_source(&self, uuid: &str) -> Result<bool>;

    /// Delete a source by url, cascading through its uuid when one has been
    /// learned. Used when a feed turns out to be structurally invalid before
    /// its uuid is known.
    fn delete_source_by_url(&self, url: &str) -> Result<bool>;

    fn get_source_by_url(&self, url: &str) -> Result<Option<FeedSource>>;

    /// All sources in registration order.
    fn list_sources(&self) -> Result<Vec<FeedSource>>;

    // === Appliances ===

    /// Insert a new appliance row, or refresh feed metadata for an existing
    /// uuid. Never overwrites status or local_path of an existing row.
    fn insert_appliance(&self, record: &ApplianceRecord) -> Result<InsertOutcome>;

    fn get_appliance(&self, uuid: &str) -> Result<Option<ApplianceRecord>>;

    /// Conditional status update. `local_path` is written as given: `Some`
    /// stores the path, `None` clears it, so the column always reflects the
    /// status.
    fn set_appliance_status(
        &self,
        uuid: &str,
        status: ApplianceStatus,
        local_path: Option<&str>,
    ) -> Result<()>;

    /// All appliances of one source, in feed-document order.
    fn list_appliances_by_source(&self, source_uuid: &str) -> Result<Vec<ApplianceRecord>>;

    fn list_appliances_by_status(&self, status: ApplianceStatus) -> Result<Vec<ApplianceRecord>>;
}
