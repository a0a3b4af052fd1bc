//! Data models for the appliance catalog.

use serde::{Deserialize, Serialize};

/// Installation status of an appliance.
///
/// The integer values are the persisted representation; they are part of the
/// on-disk layout and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplianceStatus {
    /// local_path points at a completed, valid download.
    Installed,
    /// A download worker is currently active for this uuid.
    Installing,
    /// Known, never downloaded, or deleted after having been installed.
    NotInstalled,
    /// Was `Installing` but no active worker exists for it. A recovered
    /// inconsistency marker, set either by the explicit failure path or by
    /// orphan detection during a sync pass.
    InstallationError,
}

impl ApplianceStatus {
    pub fn as_i32(&self) -> i32 {
        match self {
            ApplianceStatus::Installed => 1,
            ApplianceStatus::Installing => 2,
            ApplianceStatus::NotInstalled => 3,
            ApplianceStatus::InstallationError => 4,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(ApplianceStatus::Installed),
            2 => Some(ApplianceStatus::Installing),
            3 => Some(ApplianceStatus::NotInstalled),
            4 => Some(ApplianceStatus::InstallationError),
            _ => None,
        }
    }
}

/// A registered remote feed.
///
/// The `url` is the stable identity at registration time; `uuid` is learned
/// from the feed document on the first successful sync and may overwrite an
/// earlier placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSource {
    pub uuid: Option<String>,
    pub name: String,
    pub description: String,
    pub url: String,
}

impl FeedSource {
    /// A freshly registered source: only the URL is known until the feed is
    /// parsed for the first time.
    pub fn unresolved(url: impl Into<String>) -> Self {
        Self {
            uuid: None,
            name: String::new(),
            description: String::new(),
            url: url.into(),
        }
    }
}

/// A persisted appliance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplianceRecord {
    /// Assigned by the advertising feed, globally unique across sources.
    pub uuid: String,
    pub name: String,
    pub description: String,
    pub download_url: String,
    pub status: ApplianceStatus,
    /// uuid of the owning feed source.
    pub source: String,
    /// Filesystem location once installed, `None` otherwise.
    pub local_path: Option<String>,
}

/// Result of attempting to insert an appliance row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The uuid was already known; feed metadata was refreshed, status and
    /// local_path were left untouched. Carries the row's current status so
    /// the caller can apply its reconciliation rule.
    AlreadyKnown(ApplianceStatus),
}
