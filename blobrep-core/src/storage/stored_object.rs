use super::checksum::compute_sha384;
use super::database::{Database, format_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::{BlobError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

/// Metadata ledger entry mirroring a blob's existence and integrity data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub store: String,
    pub name: String,
    pub sha384: String,
    pub len: u64,
    pub doc_name: Option<String>,
    pub doc_rev: Option<String>,
    pub store_created: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub deleted: Option<DateTime<Utc>>,
}

impl StoredObject {
    pub fn is_live(&self) -> bool {
        self.deleted.is_none()
    }
}

/// Tracks one row per (store, name), updated in place. Tombstones are set by
/// `soft_delete` and cleared again when the object is recorded anew.
pub struct StoredObjectTracker {
    database: Database,
}

const SELECT_COLUMNS: &str = "store, name, sha384, len, doc_name, doc_rev,
                              store_created, created, modified, deleted";

impl StoredObjectTracker {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn record(
        &self,
        store: &str,
        name: &str,
        sha384: &str,
        len: u64,
        doc_name: Option<&str>,
        doc_rev: Option<&str>,
    ) -> Result<StoredObject> {
        let conn = self.database.connect()?;
        record_in(&conn, store, name, sha384, len, doc_name, doc_rev)?;

        self.get(store, name)?.ok_or_else(|| {
            BlobError::Internal(format!("stored object {}/{} vanished after record", store, name))
        })
    }

    /// Marks the live row deleted. A missing live row is only logged: it
    /// points at drift elsewhere, not at a caller error.
    pub fn soft_delete(&self, store: &str, name: &str, warn_if_missing: bool) -> Result<bool> {
        let conn = self.database.connect()?;
        soft_delete_in(&conn, store, name, warn_if_missing)
    }

    /// The row for (store, name), live or tombstoned.
    pub fn get(&self, store: &str, name: &str) -> Result<Option<StoredObject>> {
        let conn = self.database.connect()?;
        let sql = format!(
            "SELECT {} FROM stored_objects WHERE store = ?1 AND name = ?2",
            SELECT_COLUMNS
        );
        let object = conn.query_row(&sql, [store, name], row_to_object).optional()?;
        Ok(object)
    }

    pub fn get_live(&self, store: &str, name: &str) -> Result<Option<StoredObject>> {
        Ok(self.get(store, name)?.filter(StoredObject::is_live))
    }

    pub fn list_live(&self, store: &str) -> Result<Vec<StoredObject>> {
        let conn = self.database.connect()?;
        let sql = format!(
            "SELECT {} FROM stored_objects
             WHERE store = ?1 AND deleted IS NULL ORDER BY name",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([store], row_to_object)?;

        let mut objects = Vec::new();
        for row in rows {
            objects.push(row?);
        }

        Ok(objects)
    }

    /// Checks content read from the blob store against the live tracking row.
    /// Any disagreement is fatal for the read.
    pub fn verify(&self, store: &str, name: &str, content: &[u8]) -> Result<StoredObject> {
        let key = format!("{}/{}", store, name);
        let object = self.get_live(store, name)?.ok_or_else(|| BlobError::IntegrityMismatch {
            key: key.clone(),
            detail: "no live stored object record".to_string(),
        })?;

        if object.len != content.len() as u64 {
            return Err(BlobError::IntegrityMismatch {
                key,
                detail: format!("len expected {} actual {}", object.len, content.len()),
            });
        }

        let actual = compute_sha384(content);
        if object.sha384 != actual {
            return Err(BlobError::IntegrityMismatch {
                key,
                detail: format!("sha384 expected {} actual {}", object.sha384, actual),
            });
        }

        Ok(object)
    }
}

/// Upserts the row on an open connection or transaction. Re-recording a
/// tombstoned object resurrects it.
pub(crate) fn record_in(
    conn: &Connection,
    store: &str,
    name: &str,
    sha384: &str,
    len: u64,
    doc_name: Option<&str>,
    doc_rev: Option<&str>,
) -> Result<()> {
    let now = format_timestamp(&Utc::now());

    // doc_name/doc_rev are only filled in while still unset
    conn.execute(
        "INSERT INTO stored_objects (
            store, name, sha384, len, doc_name, doc_rev,
            store_created, created, modified, deleted
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7, NULL)
        ON CONFLICT (store, name) DO UPDATE SET
            sha384 = excluded.sha384,
            len = excluded.len,
            modified = excluded.modified,
            deleted = NULL,
            doc_name = COALESCE(stored_objects.doc_name, excluded.doc_name),
            doc_rev = COALESCE(stored_objects.doc_rev, excluded.doc_rev)",
        params![store, name, sha384, len as i64, doc_name, doc_rev, now],
    )?;
    Ok(())
}

pub(crate) fn soft_delete_in(
    conn: &Connection,
    store: &str,
    name: &str,
    warn_if_missing: bool,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE stored_objects SET deleted = ?1
         WHERE store = ?2 AND name = ?3 AND deleted IS NULL",
        params![format_timestamp(&Utc::now()), store, name],
    )?;

    if affected == 0 && warn_if_missing {
        tracing::warn!(
            "soft delete found no live stored object: store={} name={}",
            store,
            name
        );
    }

    Ok(affected > 0)
}

fn row_to_object(row: &Row<'_>) -> rusqlite::Result<StoredObject> {
    let len: i64 = row.get(3)?;
    let store_created: String = row.get(6)?;
    let created: String = row.get(7)?;
    let modified: String = row.get(8)?;

    Ok(StoredObject {
        store: row.get(0)?,
        name: row.get(1)?,
        sha384: row.get(2)?,
        len: len as u64,
        doc_name: row.get(4)?,
        doc_rev: row.get(5)?,
        store_created: parse_timestamp(&store_created)?,
        created: parse_timestamp(&created)?,
        modified: parse_timestamp(&modified)?,
        deleted: parse_optional_timestamp(row.get(9)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tracker(temp_dir: &tempfile::TempDir) -> StoredObjectTracker {
        let database = Database::open(temp_dir.path().join("blobs.db")).unwrap();
        StoredObjectTracker::new(database)
    }

    #[test]
    fn test_record_creates_then_updates_in_place() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tracker = open_tracker(&temp_dir);

        let first = tracker
            .record("draft", "a.txt", &compute_sha384(b"a"), 1, Some("draft-foo"), Some("00"))
            .unwrap();
        let second = tracker
            .record("draft", "a.txt", &compute_sha384(b"bb"), 2, Some("draft-bar"), Some("01"))
            .unwrap();

        assert_eq!(second.sha384, compute_sha384(b"bb"));
        assert_eq!(second.len, 2);
        assert_eq!(second.created, first.created);
        assert_eq!(second.store_created, first.store_created);
        assert!(second.modified >= first.modified);
        // association is fixed once set
        assert_eq!(second.doc_name.as_deref(), Some("draft-foo"));
        assert_eq!(second.doc_rev.as_deref(), Some("00"));
        assert_eq!(tracker.list_live("draft").unwrap().len(), 1);
    }

    #[test]
    fn test_doc_association_filled_when_unset() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tracker = open_tracker(&temp_dir);

        tracker.record("draft", "a.txt", &compute_sha384(b"a"), 1, None, None).unwrap();
        let object = tracker
            .record("draft", "a.txt", &compute_sha384(b"a"), 1, Some("draft-foo"), Some("02"))
            .unwrap();
        assert_eq!(object.doc_name.as_deref(), Some("draft-foo"));
        assert_eq!(object.doc_rev.as_deref(), Some("02"));
    }

    #[test]
    fn test_soft_delete_and_resurrection() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tracker = open_tracker(&temp_dir);

        tracker.record("rfc", "rfc9999.txt", &compute_sha384(b"x"), 1, None, None).unwrap();
        assert!(tracker.soft_delete("rfc", "rfc9999.txt", true).unwrap());

        let tombstoned = tracker.get("rfc", "rfc9999.txt").unwrap().unwrap();
        assert!(tombstoned.deleted.is_some());
        assert!(tracker.get_live("rfc", "rfc9999.txt").unwrap().is_none());
        assert!(tracker.list_live("rfc").unwrap().is_empty());

        // second delete finds no live row
        assert!(!tracker.soft_delete("rfc", "rfc9999.txt", true).unwrap());

        let revived = tracker
            .record("rfc", "rfc9999.txt", &compute_sha384(b"y"), 1, None, None)
            .unwrap();
        assert!(revived.is_live());
        assert_eq!(revived.created, tombstoned.created);
    }

    #[test]
    fn test_soft_delete_missing_without_warning_leaves_no_row() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tracker = open_tracker(&temp_dir);

        assert!(!tracker.soft_delete("draft", "never-stored", false).unwrap());
        assert!(tracker.get("draft", "never-stored").unwrap().is_none());
    }

    #[test]
    fn test_verify_detects_drift() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tracker = open_tracker(&temp_dir);
        let content = b"These are my bytes.";

        tracker
            .record("draft", "a.txt", &compute_sha384(content), content.len() as u64, None, None)
            .unwrap();
        assert!(tracker.verify("draft", "a.txt", content).is_ok());

        // same length, different bytes
        let err = tracker.verify("draft", "a.txt", b"These are my bytes!").unwrap_err();
        assert!(matches!(err, BlobError::IntegrityMismatch { .. }));
        assert!(err.to_string().contains("sha384"));

        let err = tracker.verify("draft", "a.txt", b"short").unwrap_err();
        assert!(err.to_string().contains("len"));

        let err = tracker.verify("draft", "untracked", content).unwrap_err();
        assert!(matches!(err, BlobError::IntegrityMismatch { .. }));
    }
}
