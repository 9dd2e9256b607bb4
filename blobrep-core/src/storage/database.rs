use crate::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the relational store shared by the blob table and the
/// stored-object ledger. Connections are opened per operation.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let database = Self { path };
        database.init_schema()?;
        Ok(database)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blobs (
                pk INTEGER PRIMARY KEY AUTOINCREMENT,
                bucket TEXT NOT NULL,
                name TEXT NOT NULL,
                content BLOB NOT NULL,
                checksum TEXT NOT NULL,
                modified TEXT NOT NULL,
                mtime TEXT,
                content_type TEXT NOT NULL DEFAULT '',
                UNIQUE (bucket, name)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS stored_objects (
                pk INTEGER PRIMARY KEY AUTOINCREMENT,
                store TEXT NOT NULL,
                name TEXT NOT NULL,
                sha384 TEXT NOT NULL,
                len INTEGER NOT NULL,
                doc_name TEXT,
                doc_rev TEXT,
                store_created TEXT NOT NULL,
                created TEXT NOT NULL,
                modified TEXT NOT NULL,
                deleted TEXT,
                UNIQUE (store, name)
            )",
            [],
        )?;

        // Live-row lookups for verification
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_stored_objects_live
             ON stored_objects(store, deleted)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_stored_objects_doc
             ON stored_objects(doc_name, doc_rev)",
            [],
        )?;

        Ok(())
    }
}

pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

pub(crate) fn parse_optional_timestamp(
    value: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}
