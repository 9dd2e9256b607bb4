use super::checksum::compute_sha384;
use super::database::{Database, format_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::replication::{ChangeNotifier, ReplicationMessage};
use crate::{BlobError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Machine-readable code for a refused overwrite.
pub const CONFLICT_OBJECT_EXISTS: &str = "object-exists";

const UPSERT_BLOB: &str =
    "INSERT INTO blobs (bucket, name, content, checksum, modified, mtime, content_type)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT (bucket, name) DO UPDATE SET
        content = excluded.content,
        checksum = excluded.checksum,
        modified = excluded.modified,
        mtime = excluded.mtime,
        content_type = excluded.content_type";

const INSERT_BLOB: &str =
    "INSERT INTO blobs (bucket, name, content, checksum, modified, mtime, content_type)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

/// How a write treats an existing row for the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Overwrite,
    /// Fails with a `Conflict` when the key already exists.
    CreateOnly,
}

/// A named binary object as stored in the blobs table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bucket: String,
    pub name: String,
    pub content: Bytes,
    pub checksum: String,
    pub modified: DateTime<Utc>,
    pub mtime: Option<DateTime<Utc>>,
    pub content_type: String,
}

impl Blob {
    pub fn key(&self) -> String {
        format!("{}/{}", self.bucket, self.name)
    }

    /// Explicit mtime if one was recorded, otherwise the row's modified time.
    pub fn effective_mtime(&self) -> DateTime<Utc> {
        self.mtime.unwrap_or(self.modified)
    }
}

/// Blob row summary without content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobStat {
    pub name: String,
    pub checksum: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Authoritative store of named blobs keyed by (bucket, name).
///
/// Only single-object mutations exist. Every committed `put` and every `delete`
/// that removed a row hands exactly one message to the change notifier.
pub struct BlobStore {
    database: Database,
    notifier: Arc<dyn ChangeNotifier>,
}

impl BlobStore {
    pub fn new(database: Database, notifier: Arc<dyn ChangeNotifier>) -> Self {
        Self { database, notifier }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn put(
        &self,
        bucket: &str,
        name: &str,
        content: &[u8],
        mtime: Option<DateTime<Utc>>,
        content_type: Option<&str>,
    ) -> Result<Blob> {
        self.write(
            bucket,
            name,
            content,
            mtime,
            content_type,
            WriteMode::Overwrite,
            |_, _| Ok(()),
        )
    }

    /// Writes one blob row and runs `within` in the same transaction, so
    /// companion rows commit or roll back together with the blob. Writers
    /// take the database write lock up front, which serializes same-key
    /// writers. The notifier is told only after the commit.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn write<F>(
        &self,
        bucket: &str,
        name: &str,
        content: &[u8],
        mtime: Option<DateTime<Utc>>,
        content_type: Option<&str>,
        mode: WriteMode,
        within: F,
    ) -> Result<Blob>
    where
        F: FnOnce(&Connection, &Blob) -> Result<()>,
    {
        validate_key(bucket, name)?;

        let blob = Blob {
            bucket: bucket.to_string(),
            name: name.to_string(),
            content: Bytes::copy_from_slice(content),
            checksum: compute_sha384(content),
            modified: Utc::now(),
            mtime,
            content_type: content_type.unwrap_or_default().to_string(),
        };

        let sql = match mode {
            WriteMode::Overwrite => UPSERT_BLOB,
            WriteMode::CreateOnly => INSERT_BLOB,
        };

        let mut conn = self.database.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            sql,
            params![
                bucket,
                name,
                content,
                blob.checksum,
                format_timestamp(&blob.modified),
                blob.mtime.as_ref().map(format_timestamp),
                blob.content_type,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(error, _))
                if error.code == ErrorCode::ConstraintViolation =>
            {
                return Err(BlobError::conflict(
                    CONFLICT_OBJECT_EXISTS,
                    format!("{}/{} already exists in storage", bucket, name),
                ));
            }
            Err(error) => return Err(error.into()),
        }

        within(&*tx, &blob)?;
        tx.commit()?;

        tracing::debug!(
            "stored blob bucket={} name={} size={} checksum={}",
            bucket,
            name,
            content.len(),
            blob.checksum
        );
        self.notifier.notify(ReplicationMessage::new(bucket, name));

        Ok(blob)
    }

    pub fn get(&self, bucket: &str, name: &str) -> Result<Blob> {
        self.read_current(bucket, name)?
            .ok_or_else(|| BlobError::NotFound(format!("{}/{}", bucket, name)))
    }

    /// Reads the committed row straight from the database. The replication
    /// worker depends on this always reflecting the latest write.
    pub fn read_current(&self, bucket: &str, name: &str) -> Result<Option<Blob>> {
        let conn = self.database.connect()?;

        let row: Option<(Vec<u8>, String, String, Option<String>, String)> = conn
            .query_row(
                "SELECT content, checksum, modified, mtime, content_type
                 FROM blobs WHERE bucket = ?1 AND name = ?2",
                [bucket, name],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((content, checksum, modified, mtime, content_type)) => Ok(Some(Blob {
                bucket: bucket.to_string(),
                name: name.to_string(),
                content: Bytes::from(content),
                checksum,
                modified: parse_timestamp(&modified)?,
                mtime: parse_optional_timestamp(mtime)?,
                content_type,
            })),
            None => Ok(None),
        }
    }

    /// Removes the row. Returns whether a row existed; only an actual removal
    /// is announced to the notifier.
    pub fn delete(&self, bucket: &str, name: &str) -> Result<bool> {
        self.delete_with(bucket, name, |_| Ok(()))
    }

    /// `delete` with `within` run inside the deleting transaction.
    pub(crate) fn delete_with<F>(&self, bucket: &str, name: &str, within: F) -> Result<bool>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        let mut conn = self.database.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let affected = tx.execute(
            "DELETE FROM blobs WHERE bucket = ?1 AND name = ?2",
            [bucket, name],
        )?;
        within(&*tx)?;
        tx.commit()?;

        if affected > 0 {
            tracing::debug!("deleted blob bucket={} name={}", bucket, name);
            self.notifier.notify(ReplicationMessage::new(bucket, name));
        }

        Ok(affected > 0)
    }

    pub fn exists(&self, bucket: &str, name: &str) -> Result<bool> {
        let conn = self.database.connect()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM blobs WHERE bucket = ?1 AND name = ?2",
                [bucket, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Content length computed in SQL without loading the content.
    pub fn size(&self, bucket: &str, name: &str) -> Result<u64> {
        let conn = self.database.connect()?;
        let size: Option<i64> = conn
            .query_row(
                "SELECT length(content) FROM blobs WHERE bucket = ?1 AND name = ?2",
                [bucket, name],
                |row| row.get(0),
            )
            .optional()?;

        size.map(|s| s as u64)
            .ok_or_else(|| BlobError::NotFound(format!("{}/{}", bucket, name)))
    }

    /// All rows of a bucket, without content, ordered by name.
    pub fn list_stats(&self, bucket: &str) -> Result<Vec<BlobStat>> {
        let conn = self.database.connect()?;
        let mut stmt = conn.prepare(
            "SELECT name, checksum, length(content), modified
             FROM blobs WHERE bucket = ?1 ORDER BY name",
        )?;

        let rows = stmt.query_map([bucket], |row| {
            let name: String = row.get(0)?;
            let checksum: String = row.get(1)?;
            let size: i64 = row.get(2)?;
            let modified: String = row.get(3)?;

            Ok(BlobStat {
                name,
                checksum,
                size: size as u64,
                modified: parse_timestamp(&modified)?,
            })
        })?;

        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?);
        }

        Ok(stats)
    }
}

fn validate_key(bucket: &str, name: &str) -> Result<()> {
    if bucket.trim().is_empty() {
        return Err(BlobError::InvalidRequest(
            "bucket cannot be empty".to_string(),
        ));
    }
    if name.trim().is_empty() {
        return Err(BlobError::InvalidRequest(
            "blob name cannot be empty".to_string(),
        ));
    }

    // Names become object paths in the external store, so they must parse
    // as one there as well.
    if let Err(error) = object_store::path::Path::parse(name) {
        return Err(BlobError::InvalidRequest(format!(
            "invalid blob name '{}': {}",
            name, error
        )));
    }
    Ok(())
}
