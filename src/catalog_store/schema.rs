//! Database schema for the appliance catalog.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

/// Registered feed sources. A source is keyed by URL at registration time;
/// the uuid column is filled in once the feed has been parsed.
const SOURCES_TABLE_V1: Table = Table {
    name: "sources",
    columns: &[
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("url", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("uuid", &SqlType::Text, is_unique = true),
    ],
    indices: &[],
};

/// Appliances advertised by the registered sources. `source` holds the uuid
/// of the owning row in `sources`; the cascade on unregistration is done
/// explicitly in a transaction, not via a foreign key, because the parent
/// key is learned after the source row is created.
const APPLIANCES_TABLE_V1: Table = Table {
    name: "appliances",
    columns: &[
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("url", &SqlType::Text),
        sqlite_column!("uuid", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("status", &SqlType::Integer, non_null = true),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!("local_path", &SqlType::Text),
    ],
    indices: &[
        ("idx_appliances_source", "source"),
        ("idx_appliances_status", "status"),
    ],
};

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[SOURCES_TABLE_V1, APPLIANCES_TABLE_V1],
}];
