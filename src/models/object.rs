//! Represents an indexed object (photo or index file) stored in the blob store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::user::OwnerId;

/// Index row for a single blob.
///
/// The blob store stays authoritative for bytes and attributes; this record
/// holds the subset needed to list, order and authorize access without a
/// blob round trip.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ObjectRecord {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Identity that owns this object.
    pub owner_id: OwnerId,

    /// Full path-like key of the blob (e.g. `photos/2024/img.jpg`).
    pub key: String,

    /// Content type (MIME type) as reported by the blob store.
    pub content_type: String,

    /// Base64-encoded MD5 digest of the blob bytes.
    pub checksum: String,

    /// When the photo was taken, if known. Drives listing order.
    pub captured_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Soft-delete tombstone. `None` means the record is live.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ObjectRecord {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Mutable payload written by create-or-restore.
#[derive(Clone, Debug, PartialEq)]
pub struct NewObject {
    pub owner_id: OwnerId,
    pub key: String,
    pub content_type: String,
    pub checksum: String,
    pub captured_at: Option<DateTime<Utc>>,
}
