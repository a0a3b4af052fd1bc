//! Error taxonomy for externally visible failures.
//!
//! Internal plumbing uses `anyhow::Result`; everything that crosses the
//! request router boundary is first folded into an [`AgentError`] so the
//! router can attach the numeric code expected by clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The feed URL could not be fetched. The source, if registered, is kept.
    #[error("feed is unreachable: {0}")]
    UnreachableFeed(String),

    /// The fetched document is not a structurally valid appliance feed.
    /// During a sync pass this removes the offending source.
    #[error("document is not a valid appliance feed: {0}")]
    BadFeedFormat(String),

    #[error("no source registered with uuid {0}")]
    SourceNotFound(String),

    #[error("no appliance known with uuid {0}")]
    ApplianceNotFound(String),

    /// Delete requested for an appliance that is not installed, or whose
    /// installed file is gone.
    #[error("appliance {0} is not installed")]
    ApplianceNotInstalled(String),

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// Persistence I/O failure. Surfaced as-is, the operation is aborted.
    #[error("catalog store failure: {0}")]
    Store(#[source] anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AgentError {
    /// Wrap a store-level failure.
    pub fn store(err: anyhow::Error) -> Self {
        AgentError::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = AgentError::BadFeedFormat("no channel element".to_string());
        assert!(err.to_string().contains("not a valid appliance feed"));

        let err = AgentError::ApplianceNotInstalled("abc".to_string());
        assert_eq!(err.to_string(), "appliance abc is not installed");
    }

    #[test]
    fn test_internal_from_anyhow() {
        let err: AgentError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, AgentError::Internal(_)));
    }
}
