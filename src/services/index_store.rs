//! src/services/index_store.rs
//!
//! IndexStore: the relational index kept in SQLite. Object and directory
//! records are never physically removed; `deleted_at` marks a tombstone and
//! create-or-restore clears it again. Every mutation is a single statement so
//! concurrent callers converge without holding a transaction open.

use super::error::{LibraryResult, index_err};
use crate::models::{
    directory::DirectoryRecord,
    object::{NewObject, ObjectRecord},
    user::{OwnerId, User},
};
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const OBJECT_COLUMNS: &str =
    "id, owner_id, key, content_type, checksum, captured_at, created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct IndexStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl IndexStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema statement by statement.
    ///
    /// Every statement is `IF NOT EXISTS`, so running this twice is harmless.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        for stmt in SCHEMA.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() || stmt.lines().all(|l| l.trim_start().starts_with("--")) {
                continue;
            }
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Insert, overwrite or restore the record for `(owner, key)`.
    ///
    /// - absent: a new live row is inserted.
    /// - live: mutable fields are overwritten in place.
    /// - tombstoned: the tombstone is cleared and fields overwritten.
    ///
    /// `created_at` and `id` of an existing row are preserved in both update
    /// cases.
    pub async fn create_or_restore_object(&self, object: &NewObject) -> LibraryResult<ObjectRecord> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO photo_objects ({OBJECT_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
             ON CONFLICT(owner_id, key) DO UPDATE SET
                 content_type = excluded.content_type,
                 checksum = excluded.checksum,
                 captured_at = excluded.captured_at,
                 updated_at = excluded.updated_at,
                 deleted_at = NULL
             RETURNING {OBJECT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ObjectRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(object.owner_id)
            .bind(&object.key)
            .bind(&object.content_type)
            .bind(&object.checksum)
            .bind(object.captured_at.map(normalize_capture_time))
            .bind(now)
            .bind(now)
            .fetch_one(&*self.db)
            .await
            .map_err(index_err(format!(
                "create or restore {} for owner {}",
                object.key, object.owner_id
            )))?;
        debug!("indexed object {} for owner {}", record.key, record.owner_id);
        Ok(record)
    }

    /// Insert or restore the directory record for `path`.
    ///
    /// A live directory is left untouched; the empty path is a no-op.
    pub async fn create_or_restore_directory(&self, path: &str) -> LibraryResult<()> {
        if path.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO photo_directories (id, path, created_at, updated_at, deleted_at)
             VALUES (?, ?, ?, ?, NULL)
             ON CONFLICT(path) DO UPDATE SET
                 deleted_at = NULL,
                 updated_at = excluded.updated_at
             WHERE photo_directories.deleted_at IS NOT NULL",
        )
        .bind(Uuid::new_v4())
        .bind(path)
        .bind(now)
        .bind(now)
        .execute(&*self.db)
        .await
        .map_err(index_err(format!("create or restore directory {}", path)))?;
        debug!("materialized directory {}", path);
        Ok(())
    }

    pub async fn fetch_live_object(
        &self,
        owner: OwnerId,
        key: &str,
    ) -> LibraryResult<Option<ObjectRecord>> {
        let sql = format!(
            "SELECT {OBJECT_COLUMNS} FROM photo_objects
             WHERE owner_id = ? AND key = ? AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, ObjectRecord>(&sql)
            .bind(owner)
            .bind(key)
            .fetch_optional(&*self.db)
            .await
            .map_err(index_err(format!("fetch {} for owner {}", key, owner)))
    }

    /// Fetch the row for `(owner, key)` whether live or tombstoned.
    pub async fn fetch_object(
        &self,
        owner: OwnerId,
        key: &str,
    ) -> LibraryResult<Option<ObjectRecord>> {
        let sql = format!("SELECT {OBJECT_COLUMNS} FROM photo_objects WHERE owner_id = ? AND key = ?");
        sqlx::query_as::<_, ObjectRecord>(&sql)
            .bind(owner)
            .bind(key)
            .fetch_optional(&*self.db)
            .await
            .map_err(index_err(format!("fetch {} for owner {}", key, owner)))
    }

    pub async fn live_object_exists(&self, owner: OwnerId, key: &str) -> LibraryResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM photo_objects WHERE owner_id = ? AND key = ? AND deleted_at IS NULL",
        )
        .bind(owner)
        .bind(key)
        .fetch_optional(&*self.db)
        .await
        .map_err(index_err(format!("check {} for owner {}", key, owner)))?;
        Ok(found.is_some())
    }

    /// Every record of `owner`, live and tombstoned, ordered by key.
    pub async fn list_owner_objects(&self, owner: OwnerId) -> LibraryResult<Vec<ObjectRecord>> {
        let sql = format!("SELECT {OBJECT_COLUMNS} FROM photo_objects WHERE owner_id = ? ORDER BY key");
        sqlx::query_as::<_, ObjectRecord>(&sql)
            .bind(owner)
            .fetch_all(&*self.db)
            .await
            .map_err(index_err(format!("list objects for owner {}", owner)))
    }

    /// Tombstone a live record. Returns false when there was nothing live.
    pub async fn soft_delete_object(&self, owner: OwnerId, key: &str) -> LibraryResult<bool> {
        let now = Utc::now();
        let res = sqlx::query(
            "UPDATE photo_objects SET deleted_at = ?, updated_at = ?
             WHERE owner_id = ? AND key = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(owner)
        .bind(key)
        .execute(&*self.db)
        .await
        .map_err(index_err(format!("soft delete {} for owner {}", key, owner)))?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_captured_at(
        &self,
        owner: OwnerId,
        key: &str,
        captured_at: Option<DateTime<Utc>>,
    ) -> LibraryResult<bool> {
        let res = sqlx::query(
            "UPDATE photo_objects SET captured_at = ?, updated_at = ?
             WHERE owner_id = ? AND key = ? AND deleted_at IS NULL",
        )
        .bind(captured_at.map(normalize_capture_time))
        .bind(Utc::now())
        .bind(owner)
        .bind(key)
        .execute(&*self.db)
        .await
        .map_err(index_err(format!("update capture time of {} for owner {}", key, owner)))?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_content_type(
        &self,
        owner: OwnerId,
        key: &str,
        content_type: &str,
    ) -> LibraryResult<bool> {
        let res = sqlx::query(
            "UPDATE photo_objects SET content_type = ?, updated_at = ?
             WHERE owner_id = ? AND key = ? AND deleted_at IS NULL",
        )
        .bind(content_type)
        .bind(Utc::now())
        .bind(owner)
        .bind(key)
        .execute(&*self.db)
        .await
        .map_err(index_err(format!("update content type of {} for owner {}", key, owner)))?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn fetch_live_directory(&self, path: &str) -> LibraryResult<Option<DirectoryRecord>> {
        sqlx::query_as::<_, DirectoryRecord>(
            "SELECT id, path, created_at, updated_at, deleted_at FROM photo_directories
             WHERE path = ? AND deleted_at IS NULL",
        )
        .bind(path)
        .fetch_optional(&*self.db)
        .await
        .map_err(index_err(format!("fetch directory {}", path)))
    }

    /// Fetch a directory row whether live or tombstoned.
    pub async fn fetch_directory(&self, path: &str) -> LibraryResult<Option<DirectoryRecord>> {
        sqlx::query_as::<_, DirectoryRecord>(
            "SELECT id, path, created_at, updated_at, deleted_at FROM photo_directories WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&*self.db)
        .await
        .map_err(index_err(format!("fetch directory {}", path)))
    }

    /// Live directory paths starting with `prefix`, ordered by path.
    pub async fn list_live_directories(&self, prefix: &str) -> LibraryResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT path FROM photo_directories
             WHERE deleted_at IS NULL AND substr(path, 1, length(?)) = ?
             ORDER BY path",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&*self.db)
        .await
        .map_err(index_err(format!("list directories under {:?}", prefix)))
    }

    /// Map an external identity to a stable numeric owner id.
    pub async fn get_or_create_user(&self, username: &str) -> LibraryResult<User> {
        sqlx::query(
            "INSERT INTO users (username, created_at) VALUES (?, ?)
             ON CONFLICT(username) DO NOTHING",
        )
        .bind(username)
        .bind(Utc::now())
        .execute(&*self.db)
        .await
        .map_err(index_err(format!("create user {}", username)))?;

        sqlx::query_as::<_, User>("SELECT id, username, created_at FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&*self.db)
            .await
            .map_err(index_err(format!("fetch user {}", username)))
    }

    /// Liveness check for readiness probes.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&*self.db).await.map(|_| ())
    }
}

/// Capture times are kept to whole seconds so their text form sorts
/// chronologically.
pub fn normalize_capture_time(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(0)
}
