//! Directory garbage collection.
//!
//! A directory record stays live while at least one live object key sits
//! anywhere beneath `path/`. The emptiness check and the tombstone write are a
//! single conditional `UPDATE`, so a concurrent upload into the directory
//! either lands before the check (directory kept) or restores it afterwards.

use super::{
    error::{LibraryResult, index_err},
    index_store::IndexStore,
};
use chrono::Utc;
use tracing::info;

impl IndexStore {
    /// Tombstone `path` if no live object other than `excluding` remains under
    /// it. Returns whether a directory was removed.
    ///
    /// No-op for the empty path and for directories that are already absent.
    pub async fn maybe_delete_directory(
        &self,
        path: &str,
        excluding: Option<&str>,
    ) -> LibraryResult<bool> {
        if path.is_empty() {
            return Ok(false);
        }
        let now = Utc::now();
        let res = sqlx::query(
            "UPDATE photo_directories SET deleted_at = ?, updated_at = ?
             WHERE path = ? AND deleted_at IS NULL
               AND NOT EXISTS (
                   SELECT 1 FROM photo_objects
                   WHERE deleted_at IS NULL
                     AND substr(key, 1, length(?)) = ?
                     AND (? IS NULL OR key <> ?)
               )",
        )
        .bind(now)
        .bind(now)
        .bind(path)
        .bind(format!("{}/", path))
        .bind(format!("{}/", path))
        .bind(excluding)
        .bind(excluding)
        .execute(&*self.db)
        .await
        .map_err(index_err(format!("garbage collect directory {}", path)))?;

        let removed = res.rows_affected() > 0;
        if removed {
            info!("removed empty directory {}", path);
        }
        Ok(removed)
    }
}
