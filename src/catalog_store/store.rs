//! SQLite-backed catalog store.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::sqlite_persistence::read_schema_version;

use super::models::{ApplianceRecord, ApplianceStatus, FeedSource, InsertOutcome};
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::CatalogStore;

/// SQLite-backed implementation of [`CatalogStore`].
///
/// A single connection guarded by a mutex serializes all access; that is
/// sufficient for the write rates involved (sync passes and download
/// completions) and keeps every operation atomic with respect to readers.
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    /// Open an existing catalog database or create a new one with the
    /// current schema. An existing database is validated against the
    /// declared layout before any query runs.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(&db_path)?;
            CATALOG_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new catalog database at {:?}", db_path.as_ref());
            conn
        };

        let version = read_schema_version(&conn).context("Failed to read catalog db version")?;
        if version >= CATALOG_VERSIONED_SCHEMAS.len() {
            bail!(
                "Catalog database version {} is too new (max supported: {})",
                version,
                CATALOG_VERSIONED_SCHEMAS.len() - 1
            );
        }
        CATALOG_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        Ok(SqliteCatalogStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        CATALOG_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(SqliteCatalogStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_source(row: &rusqlite::Row) -> rusqlite::Result<FeedSource> {
        Ok(FeedSource {
            name: row.get::<_, Option<String>>("name")?.unwrap_or_default(),
            description: row
                .get::<_, Option<String>>("description")?
                .unwrap_or_default(),
            url: row.get("url")?,
            uuid: row.get("uuid")?,
        })
    }

    fn row_to_appliance(row: &rusqlite::Row) -> rusqlite::Result<ApplianceRecord> {
        Ok(ApplianceRecord {
            name: row.get::<_, Option<String>>("name")?.unwrap_or_default(),
            description: row
                .get::<_, Option<String>>("description")?
                .unwrap_or_default(),
            download_url: row.get::<_, Option<String>>("url")?.unwrap_or_default(),
            uuid: row.get("uuid")?,
            status: ApplianceStatus::from_i32(row.get("status")?)
                .unwrap_or(ApplianceStatus::NotInstalled),
            source: row.get("source")?,
            local_path: row.get("local_path")?,
        })
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn upsert_source(&self, source: &FeedSource) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        // COALESCE keeps a learned uuid when an unresolved source is
        // re-upserted before its first successful sync.
        conn.execute(
            r#"INSERT INTO sources (name, description, url, uuid)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(url) DO UPDATE SET
                   name = excluded.name,
                   description = excluded.description,
                   uuid = COALESCE(excluded.uuid, sources.uuid)"#,
            params![source.name, source.description, source.url, source.uuid],
        )?;
        Ok(())
    }

    fn delete_source(&self, uuid: &str) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM appliances WHERE source = ?1", [uuid])?;
        let deleted = tx.execute("DELETE FROM sources WHERE uuid = ?1", [uuid])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn delete_source_by_url(&self, url: &str) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let uuid: Option<String> = tx
            .query_row("SELECT uuid FROM sources WHERE url = ?1", [url], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();
        if let Some(uuid) = uuid {
            tx.execute("DELETE FROM appliances WHERE source = ?1", [uuid])?;
        }
        let deleted = tx.execute("DELETE FROM sources WHERE url = ?1", [url])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn get_source_by_url(&self, url: &str) -> Result<Option<FeedSource>> {
        let conn = self.conn.lock().unwrap();
        let source = conn
            .query_row(
                "SELECT name, description, url, uuid FROM sources WHERE url = ?1",
                [url],
                Self::row_to_source,
            )
            .optional()?;
        Ok(source)
    }

    fn list_sources(&self) -> Result<Vec<FeedSource>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT name, description, url, uuid FROM sources ORDER BY rowid")?;
        let sources = stmt
            .query_map([], Self::row_to_source)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sources)
    }

    fn insert_appliance(&self, record: &ApplianceRecord) -> Result<InsertOutcome> {
        let conn = self.conn.lock().unwrap();
        let existing_status: Option<i32> = conn
            .query_row(
                "SELECT status FROM appliances WHERE uuid = ?1",
                [&record.uuid],
                |row| row.get(0),
            )
            .optional()?;

        match existing_status {
            Some(status) => {
                // The feed stays authoritative for metadata, the store for
                // status and local_path.
                conn.execute(
                    r#"UPDATE appliances
                       SET name = ?1, description = ?2, url = ?3, source = ?4
                       WHERE uuid = ?5"#,
                    params![
                        record.name,
                        record.description,
                        record.download_url,
                        record.source,
                        record.uuid
                    ],
                )?;
                Ok(InsertOutcome::AlreadyKnown(
                    ApplianceStatus::from_i32(status).unwrap_or(ApplianceStatus::NotInstalled),
                ))
            }
            None => {
                conn.execute(
                    r#"INSERT INTO appliances
                       (name, description, url, uuid, status, source, local_path)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                    params![
                        record.name,
                        record.description,
                        record.download_url,
                        record.uuid,
                        record.status.as_i32(),
                        record.source,
                        record.local_path,
                    ],
                )?;
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    fn get_appliance(&self, uuid: &str) -> Result<Option<ApplianceRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT name, description, url, uuid, status, source, local_path
                 FROM appliances WHERE uuid = ?1",
                [uuid],
                Self::row_to_appliance,
            )
            .optional()?;
        Ok(record)
    }

    fn set_appliance_status(
        &self,
        uuid: &str,
        status: ApplianceStatus,
        local_path: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE appliances SET status = ?1, local_path = ?2 WHERE uuid = ?3",
            params![status.as_i32(), local_path, uuid],
        )?;
        Ok(())
    }

    fn list_appliances_by_source(&self, source_uuid: &str) -> Result<Vec<ApplianceRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name, description, url, uuid, status, source, local_path
             FROM appliances WHERE source = ?1 ORDER BY rowid",
        )?;
        let records = stmt
            .query_map([source_uuid], Self::row_to_appliance)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn list_appliances_by_status(&self, status: ApplianceStatus) -> Result<Vec<ApplianceRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name, description, url, uuid, status, source, local_path
             FROM appliances WHERE status = ?1 ORDER BY rowid",
        )?;
        let records = stmt
            .query_map([status.as_i32()], Self::row_to_appliance)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}
