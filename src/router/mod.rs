//! Request routing.
//!
//! Decodes client actions, drives the matching component and folds every
//! failure into an error reply carrying the per-action numeric code that
//! fleet clients key their retry logic on.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog_store::{ApplianceRecord, ApplianceStatus, CatalogStore};
use crate::download_manager::{DownloadManager, DownloadSnapshot};
use crate::error::AgentError;
use crate::feed_sync::{FeedSynchronizer, SourceCatalog};

/// Stable per-action error codes. Part of the client protocol.
mod codes {
    pub const GET: i32 = -6001;
    pub const REGISTER: i32 = -6002;
    pub const UNREGISTER: i32 = -6003;
    pub const DOWNLOAD_APPLIANCE: i32 = -6004;
    pub const DOWNLOAD_QUEUE: i32 = -6005;
    pub const GET_APPLIANCES: i32 = -6006;
    pub const DELETE_APPLIANCE: i32 = -6007;
    pub const GET_INSTALLED_APPLIANCES: i32 = -6008;
    pub const STOP_DOWNLOAD: i32 = -6009;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum AgentRequest {
    /// Synchronize all feeds and return the merged catalog.
    Get,
    Register {
        url: String,
    },
    Unregister {
        uuid: String,
    },
    DownloadAppliance {
        uuid: String,
    },
    DownloadQueue,
    /// A single appliance record by its own uuid.
    GetAppliances {
        uuid: String,
    },
    GetInstalledAppliances,
    DeleteAppliance {
        uuid: String,
    },
    Stop {
        uuid: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AgentResponse {
    Catalog { sources: Vec<SourceCatalog> },
    Registered,
    Unregistered,
    DownloadStarted,
    DownloadQueue { downloads: Vec<DownloadSnapshot> },
    Appliance { appliance: ApplianceRecord },
    Appliances { appliances: Vec<ApplianceRecord> },
    ApplianceDeleted,
    Stopped,
    Error { code: i32, message: String },
}

pub struct RequestRouter {
    synchronizer: FeedSynchronizer,
    download_manager: Arc<DownloadManager>,
    catalog_store: Arc<dyn CatalogStore>,
}

impl RequestRouter {
    pub fn new(
        synchronizer: FeedSynchronizer,
        download_manager: Arc<DownloadManager>,
        catalog_store: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            synchronizer,
            download_manager,
            catalog_store,
        }
    }

    pub async fn handle(&self, request: AgentRequest) -> AgentResponse {
        match request {
            AgentRequest::Get => self
                .synchronizer
                .sync_all()
                .await
                .map(|sources| AgentResponse::Catalog { sources })
                .unwrap_or_else(|err| error_response(codes::GET, err)),
            AgentRequest::Register { url } => self
                .synchronizer
                .register(&url)
                .await
                .map(|()| AgentResponse::Registered)
                .unwrap_or_else(|err| error_response(codes::REGISTER, err)),
            AgentRequest::Unregister { uuid } => self
                .synchronizer
                .unregister(&uuid)
                .map(|()| AgentResponse::Unregistered)
                .unwrap_or_else(|err| error_response(codes::UNREGISTER, err)),
            AgentRequest::DownloadAppliance { uuid } => self
                .download_manager
                .start_download(&uuid)
                .map(|()| AgentResponse::DownloadStarted)
                .unwrap_or_else(|err| error_response(codes::DOWNLOAD_APPLIANCE, err)),
            AgentRequest::DownloadQueue => AgentResponse::DownloadQueue {
                downloads: self.download_manager.list_queue(),
            },
            AgentRequest::GetAppliances { uuid } => self
                .get_appliance(&uuid)
                .map(|appliance| AgentResponse::Appliance { appliance })
                .unwrap_or_else(|err| error_response(codes::GET_APPLIANCES, err)),
            AgentRequest::GetInstalledAppliances => self
                .catalog_store
                .list_appliances_by_status(ApplianceStatus::Installed)
                .map_err(AgentError::store)
                .map(|appliances| AgentResponse::Appliances { appliances })
                .unwrap_or_else(|err| error_response(codes::GET_INSTALLED_APPLIANCES, err)),
            AgentRequest::DeleteAppliance { uuid } => self
                .download_manager
                .delete_installed(&uuid)
                .map(|()| AgentResponse::ApplianceDeleted)
                .unwrap_or_else(|err| error_response(codes::DELETE_APPLIANCE, err)),
            AgentRequest::Stop { uuid } => self
                .download_manager
                .cancel_download(&uuid)
                .map(|()| AgentResponse::Stopped)
                .unwrap_or_else(|err| error_response(codes::STOP_DOWNLOAD, err)),
        }
    }

    fn get_appliance(&self, uuid: &str) -> Result<ApplianceRecord, AgentError> {
        self.catalog_store
            .get_appliance(uuid)
            .map_err(AgentError::store)?
            .ok_or_else(|| AgentError::ApplianceNotFound(uuid.to_string()))
    }
}

fn error_response(code: i32, err: AgentError) -> AgentResponse {
    warn!("request failed with code {}: {}", code, err);
    AgentResponse::Error {
        code,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::catalog_store::SqliteCatalogStore;
    use crate::download_manager::{ApplianceFetcher, ApplianceTransfer};
    use crate::feed_sync::FeedFetcher;
    use crate::notifications::RecordingSink;

    use super::*;

    #[derive(Default)]
    struct ScriptedFeeds {
        bodies: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl FeedFetcher for ScriptedFeeds {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.bodies
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unreachable: {url}"))
        }
    }

    struct NoDownloads;

    #[async_trait]
    impl ApplianceFetcher for NoDownloads {
        async fn fetch(&self, _url: &str) -> Result<ApplianceTransfer> {
            anyhow::bail!("no network in this test")
        }
    }

    fn feed_xml() -> String {
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel>\
         <title>one</title><description>d</description><uuid>S1</uuid>\
         <item><title>a</title><description></description>\
         <enclosure url=\"http://d/a1.bundle\" length=\"7\"/>\
         <pubDate>Mon, 07 Jul 2025 08:30:00 +0000</pubDate>\
         <uuid>A1</uuid></item></channel></rss>"
            .to_string()
    }

    fn router_with_feed() -> RequestRouter {
        let store = std::sync::Arc::new(SqliteCatalogStore::in_memory().unwrap());
        let sink = std::sync::Arc::new(RecordingSink::default());
        let feeds = std::sync::Arc::new(ScriptedFeeds::default());
        feeds
            .bodies
            .lock()
            .unwrap()
            .insert("http://feeds/one.xml".to_string(), feed_xml());
        let download_manager = DownloadManager::new(
            store.clone(),
            std::sync::Arc::new(NoDownloads),
            PathBuf::from("/nonexistent"),
            sink.clone(),
            sink.clone(),
        );
        let synchronizer = FeedSynchronizer::new(
            store.clone(),
            feeds,
            download_manager.clone(),
            sink,
        );
        RequestRouter::new(synchronizer, download_manager, store)
    }

    fn request(json: &str) -> AgentRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_request_decoding() {
        assert!(matches!(request(r#"{"action":"get"}"#), AgentRequest::Get));
        assert!(matches!(
            request(r#"{"action":"register","url":"http://x"}"#),
            AgentRequest::Register { .. }
        ));
        assert!(matches!(
            request(r#"{"action":"downloadappliance","uuid":"A1"}"#),
            AgentRequest::DownloadAppliance { .. }
        ));
        assert!(matches!(
            request(r#"{"action":"getinstalledappliances"}"#),
            AgentRequest::GetInstalledAppliances
        ));
        assert!(serde_json::from_str::<AgentRequest>(r#"{"action":"reboot"}"#).is_err());
    }

    #[tokio::test]
    async fn test_register_then_get() {
        let router = router_with_feed();
        let response = router
            .handle(request(
                r#"{"action":"register","url":"http://feeds/one.xml"}"#,
            ))
            .await;
        assert!(matches!(response, AgentResponse::Registered));

        let response = router.handle(request(r#"{"action":"get"}"#)).await;
        let AgentResponse::Catalog { sources } = response else {
            panic!("expected catalog");
        };
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].appliances[0].uuid, "A1");
    }

    #[tokio::test]
    async fn test_register_unreachable_uses_register_code() {
        let router = router_with_feed();
        let response = router
            .handle(request(
                r#"{"action":"register","url":"http://feeds/missing.xml"}"#,
            ))
            .await;
        let AgentResponse::Error { code, .. } = response else {
            panic!("expected error");
        };
        assert_eq!(code, codes::REGISTER);
    }

    #[tokio::test]
    async fn test_get_appliances_returns_the_requested_record() {
        let router = router_with_feed();
        router
            .handle(request(
                r#"{"action":"register","url":"http://feeds/one.xml"}"#,
            ))
            .await;

        let response = router
            .handle(request(r#"{"action":"getappliances","uuid":"A1"}"#))
            .await;
        let AgentResponse::Appliance { appliance } = response else {
            panic!("expected appliance");
        };
        assert_eq!(appliance.uuid, "A1");
        assert_eq!(appliance.name, "a");

        // A source uuid is not an appliance uuid
        let response = router
            .handle(request(r#"{"action":"getappliances","uuid":"S1"}"#))
            .await;
        let AgentResponse::Error { code, .. } = response else {
            panic!("expected error");
        };
        assert_eq!(code, codes::GET_APPLIANCES);
    }

    #[tokio::test]
    async fn test_download_unknown_appliance_uses_download_code() {
        let router = router_with_feed();
        let response = router
            .handle(request(r#"{"action":"downloadappliance","uuid":"nope"}"#))
            .await;
        let AgentResponse::Error { code, .. } = response else {
            panic!("expected error");
        };
        assert_eq!(code, codes::DOWNLOAD_APPLIANCE);
    }

    #[tokio::test]
    async fn test_delete_not_installed_uses_delete_code() {
        let router = router_with_feed();
        router
            .handle(request(
                r#"{"action":"register","url":"http://feeds/one.xml"}"#,
            ))
            .await;
        let response = router
            .handle(request(r#"{"action":"deleteappliance","uuid":"A1"}"#))
            .await;
        let AgentResponse::Error { code, .. } = response else {
            panic!("expected error");
        };
        assert_eq!(code, codes::DELETE_APPLIANCE);
    }

    #[tokio::test]
    async fn test_stop_is_rejected_with_its_own_code() {
        let router = router_with_feed();
        let response = router
            .handle(request(r#"{"action":"stop","uuid":"A1"}"#))
            .await;
        let AgentResponse::Error { code, message } = response else {
            panic!("expected error");
        };
        assert_eq!(code, codes::STOP_DOWNLOAD);
        assert!(message.contains("not supported"));
    }

    #[tokio::test]
    async fn test_empty_download_queue() {
        let router = router_with_feed();
        let response = router.handle(request(r#"{"action":"downloadqueue"}"#)).await;
        let AgentResponse::DownloadQueue { downloads } = response else {
            panic!("expected queue");
        };
        assert!(downloads.is_empty());
    }
}
