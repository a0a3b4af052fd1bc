//! Appliance Catalog Agent Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod catalog_store;
pub mod config;
pub mod download_manager;
pub mod error;
pub mod feed;
pub mod feed_sync;
pub mod notifications;
pub mod publisher;
pub mod router;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use catalog_store::{CatalogStore, SqliteCatalogStore};
pub use error::AgentError;
pub use router::{AgentRequest, AgentResponse, RequestRouter};
pub use server::run_server;
