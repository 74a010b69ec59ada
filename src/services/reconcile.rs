//! Reconciliation between the blob store and the index.
//!
//! The blob store is authoritative. A pass lists every blob, diffs the listing
//! against the owner's live records, restores what is missing, tombstones what
//! vanished and optionally re-extracts metadata. Each repair is its own
//! statement; a failure on one key is logged and the pass moves on. A blob
//! whose attributes cannot be read counts as present: its record is neither
//! added nor tombstoned.

use super::{
    blob_store::{BlobAttributes, BlobError, read_head},
    error::{LibraryResult, blob_err},
    extractor::METADATA_HEAD_LIMIT,
    library_service::LibraryService,
    paths::is_index_file,
};
use crate::models::{metadata::PhotoMetadata, object::NewObject, user::OwnerId};
use futures::StreamExt;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    pub metadata_updated: usize,
}

impl LibraryService {
    /// Repair the index of `owner` against the blob store.
    ///
    /// A failed listing aborts the pass before any repair, since a partial
    /// listing would tombstone records whose blobs still exist.
    pub async fn sync(&self, owner: OwnerId, refresh_metadata: bool) -> LibraryResult<SyncReport> {
        let mut listing = self
            .blobs
            .list("")
            .await
            .map_err(blob_err("list blob store"))?;
        let mut blobs: BTreeMap<String, BlobAttributes> = BTreeMap::new();
        let mut unreadable: HashSet<String> = HashSet::new();
        while let Some(item) = listing.next().await {
            match item {
                Ok(attrs) => {
                    blobs.insert(attrs.key.clone(), attrs);
                }
                Err(BlobError::CorruptAttributes { key, source }) => {
                    warn!("skipping {} during sync, attributes unreadable: {}", key, source);
                    unreadable.insert(key);
                }
                Err(err) => return Err(blob_err("list blob store")(err)),
            }
        }

        let records = self.index.list_owner_objects(owner).await?;
        let live: HashSet<&str> = records
            .iter()
            .filter(|r| r.is_live())
            .map(|r| r.key.as_str())
            .collect();

        let mut report = SyncReport::default();

        for (key, attrs) in &blobs {
            if live.contains(key.as_str()) {
                continue;
            }
            let metadata = PhotoMetadata::decode(&attrs.metadata);
            let object = NewObject {
                owner_id: owner,
                key: key.clone(),
                content_type: attrs.content_type.clone(),
                checksum: attrs.checksum.clone(),
                captured_at: metadata.captured_at,
            };
            if let Err(err) = self.index.create_or_restore_object(&object).await {
                warn!("failed to index {} during sync: {}", key, err);
                continue;
            }
            if let Err(err) = self.materialize_directories(key).await {
                warn!("failed to materialize directory for {} during sync: {}", key, err);
            }
            report.added += 1;
        }

        for record in records.iter().filter(|r| r.is_live()) {
            if blobs.contains_key(&record.key) || unreadable.contains(&record.key) {
                continue;
            }
            if let Err(err) = self.index.soft_delete_object(owner, &record.key).await {
                warn!("failed to remove {} during sync: {}", record.key, err);
                continue;
            }
            self.collect_directories(&record.key).await;
            report.removed += 1;
        }

        if refresh_metadata {
            for key in blobs.keys().filter(|k| !is_index_file(k)) {
                match self.refresh_metadata(owner, key).await {
                    Ok(()) => report.metadata_updated += 1,
                    Err(err) => warn!("failed to refresh metadata of {} during sync: {}", key, err),
                }
            }
        }

        info!(
            "sync completed for owner {}: added {}, removed {}, metadata updated {} ({} blobs, {} unreadable, {} records before)",
            owner,
            report.added,
            report.removed,
            report.metadata_updated,
            blobs.len(),
            unreadable.len(),
            records.len()
        );
        Ok(report)
    }

    /// Re-extract metadata from the head of `key` and store it on both sides.
    /// Markdown index files are skipped by the caller.
    async fn refresh_metadata(&self, owner: OwnerId, key: &str) -> LibraryResult<()> {
        let stream = self
            .blobs
            .get_stream(key)
            .await
            .map_err(blob_err(format!("open {}", key)))?;
        let (head, _) = read_head(stream, METADATA_HEAD_LIMIT)
            .await
            .map_err(|e| blob_err(format!("read {}", key))(e.into()))?;

        let metadata = self.extractor.extract(&head, key);
        self.blobs
            .update_attributes(key, None, Some(metadata.encode()))
            .await
            .map_err(blob_err(format!("update attributes of {}", key)))?;
        self.index
            .set_captured_at(owner, key, metadata.captured_at)
            .await?;
        Ok(())
    }
}
