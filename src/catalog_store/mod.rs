//! Durable catalog of feed sources and the appliances they advertise.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{ApplianceRecord, ApplianceStatus, FeedSource, InsertOutcome};
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use store::SqliteCatalogStore;
pub use trait_def::CatalogStore;
