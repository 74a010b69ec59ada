//! Copy and rename.
//!
//! Both are sagas over the two stores: the blob is copied first, the index is
//! written second, and a failed index write undoes the blob copy. Rename then
//! removes the source. The gap between the destination commit and the source
//! removal is repaired by the next sync if the process dies inside it.

use super::{
    error::{LibraryError, LibraryResult, blob_err},
    library_service::LibraryService,
};
use crate::models::{metadata::PhotoMetadata, object::NewObject, photo::Photo, user::OwnerId};
use tracing::{error, info, warn};

impl LibraryService {
    pub async fn copy(&self, owner: OwnerId, source: &str, destination: &str) -> LibraryResult<Photo> {
        let photo = self.copy_object(owner, source, destination).await?;
        info!("copied {} to {} for owner {}", source, destination, owner);
        Ok(photo)
    }

    /// Copy, then remove the source blob and record and collect its directory.
    pub async fn rename(&self, owner: OwnerId, source: &str, destination: &str) -> LibraryResult<Photo> {
        let photo = self.copy_object(owner, source, destination).await?;

        if let Err(err) = self.blobs.delete(source).await {
            if err.is_not_found() {
                warn!("{} not found in blob store during rename, continuing", source);
            } else {
                warn!(
                    "failed to delete {} after rename to {}, next sync will repair: {}",
                    source, destination, err
                );
            }
        }
        self.index.soft_delete_object(owner, source).await?;
        self.collect_directories(source).await;

        info!("renamed {} to {} for owner {}", source, destination, owner);
        Ok(photo)
    }

    async fn copy_object(&self, owner: OwnerId, source: &str, destination: &str) -> LibraryResult<Photo> {
        if source.is_empty() || destination.is_empty() {
            return Err(LibraryError::invalid("source and destination are required"));
        }
        if source == destination {
            return Err(LibraryError::invalid("source and destination must differ"));
        }
        let src = self
            .index
            .fetch_live_object(owner, source)
            .await?
            .ok_or_else(|| LibraryError::not_found(format!("source not found: {}", source)))?;
        if self.index.live_object_exists(owner, destination).await? {
            return Err(LibraryError::AlreadyExists(format!(
                "destination already exists: {}",
                destination
            )));
        }

        let attrs = self
            .blobs
            .copy(source, destination)
            .await
            .map_err(blob_err(format!("copy {} to {}", source, destination)))?;

        let captured_at = PhotoMetadata::decode(&attrs.metadata)
            .captured_at
            .or(src.captured_at);
        let record = match self
            .index
            .create_or_restore_object(&NewObject {
                owner_id: owner,
                key: destination.to_string(),
                content_type: attrs.content_type.clone(),
                checksum: attrs.checksum.clone(),
                captured_at,
            })
            .await
        {
            Ok(record) => record,
            Err(err) => {
                self.discard_copied_blob(destination).await;
                return Err(err);
            }
        };

        if let Err(err) = self.materialize_directories(destination).await {
            if let Err(undo) = self.index.soft_delete_object(owner, destination).await {
                error!("failed to roll back record of {}: {}", destination, undo);
            }
            self.discard_copied_blob(destination).await;
            return Err(err);
        }

        Ok(Photo::from_record(&record).with_attributes(&attrs))
    }

    async fn discard_copied_blob(&self, key: &str) {
        if let Err(err) = self.blobs.delete(key).await {
            error!("failed to remove orphaned copy {}: {}", key, err);
        }
    }
}
