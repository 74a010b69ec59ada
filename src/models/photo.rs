//! Response shape returned to callers for a single photo.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{metadata::PhotoMetadata, object::ObjectRecord};
use crate::services::blob_store::BlobAttributes;

/// Index data merged with whatever blob attributes were fetched.
///
/// Listing endpoints only read the index, so `size_bytes` and `metadata` are
/// absent there; single-object endpoints fill them from the blob store.
#[derive(Serialize, Clone, Debug)]
pub struct Photo {
    pub key: String,
    pub content_type: String,
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PhotoMetadata>,
}

impl Photo {
    pub fn from_record(record: &ObjectRecord) -> Self {
        Self {
            key: record.key.clone(),
            content_type: record.content_type.clone(),
            checksum: record.checksum.clone(),
            size_bytes: None,
            created_at: record.created_at,
            updated_at: record.updated_at,
            captured_at: record.captured_at,
            metadata: None,
        }
    }

    /// Attach size and decoded side-channel metadata from the blob store.
    pub fn with_attributes(mut self, attrs: &BlobAttributes) -> Self {
        self.size_bytes = Some(attrs.size);
        self.metadata = Some(PhotoMetadata::decode(&attrs.metadata));
        self
    }
}
