//! Represents a virtual directory materialized from object key prefixes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A "folder" implied by the keys of live objects.
///
/// Directories are not owner-scoped: a path is live while at least one live
/// object sits beneath it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct DirectoryRecord {
    pub id: Uuid,

    /// Directory path without a trailing separator (e.g. `photos/2024`).
    pub path: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Soft-delete tombstone. `None` means the directory is live.
    pub deleted_at: Option<DateTime<Utc>>,
}
