//! src/services/library_service.rs
//!
//! LibraryService: every externally visible operation of the photo library.
//! Writes go to the blob store first and to the index second; reads use the
//! index and only touch the blob store for attributes and bytes. Copy/rename
//! live in `transfer.rs`, reconciliation in `reconcile.rs`.

use super::{
    blob_store::{
        BlobAttributes, BlobStore, ByteStream, SignMethod, SignedRequest, read_head, rejoin,
    },
    error::{LibraryError, LibraryResult, blob_err},
    extractor::{METADATA_HEAD_LIMIT, MetadataExtractor},
    frontmatter::parse_front_matter,
    index_store::IndexStore,
    paths::{ancestors_of, directory_of, index_key_for},
};
use crate::models::{
    object::{NewObject, ObjectRecord},
    photo::Photo,
    user::OwnerId,
};
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{info, warn};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
pub const MARKDOWN_CONTENT_TYPE: &str = "text/markdown";
pub const DEFAULT_SIGNED_URL_SECONDS: i64 = 3600;
pub const MAX_SIGNED_URL_SECONDS: i64 = 604_800;

/// Which directories a write materializes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DirectoryPolicy {
    /// Only the object's immediate parent.
    #[default]
    ImmediateParent,
    /// The immediate parent and every ancestor above it.
    Ancestors,
}

#[derive(Clone)]
pub struct LibraryService {
    pub index: IndexStore,
    pub blobs: Arc<dyn BlobStore>,
    pub(crate) extractor: Arc<dyn MetadataExtractor>,
    policy: DirectoryPolicy,
}

/// An open download: attributes plus the byte stream.
pub struct Download {
    pub attributes: BlobAttributes,
    pub body: ByteStream,
}

#[derive(Debug, Serialize)]
pub struct PhotoPage {
    pub photos: Vec<Photo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignedUrl {
    pub signed_url: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct MarkdownDocument {
    pub key: String,
    pub markdown: String,
}

impl LibraryService {
    pub fn new(
        index: IndexStore,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn MetadataExtractor>,
        policy: DirectoryPolicy,
    ) -> Self {
        Self {
            index,
            blobs,
            extractor,
            policy,
        }
    }

    /// Create or restore the directories implied by `key` under the policy.
    pub(crate) async fn materialize_directories(&self, key: &str) -> LibraryResult<()> {
        let dir = directory_of(key);
        match self.policy {
            DirectoryPolicy::ImmediateParent => self.index.create_or_restore_directory(&dir).await,
            DirectoryPolicy::Ancestors => {
                for path in ancestors_of(&dir) {
                    self.index.create_or_restore_directory(&path).await?;
                }
                Ok(())
            }
        }
    }

    /// Garbage-collect the directories that may have been emptied by removing
    /// `key`. Failures are logged; the removal itself already happened.
    pub(crate) async fn collect_directories(&self, key: &str) {
        let dir = directory_of(key);
        let chain = match self.policy {
            DirectoryPolicy::ImmediateParent => vec![dir],
            DirectoryPolicy::Ancestors => ancestors_of(&dir),
        };
        for path in chain {
            if let Err(err) = self.index.maybe_delete_directory(&path, Some(key)).await {
                warn!("failed to garbage collect directory {}: {}", path, err);
            }
        }
    }

    async fn require_live(&self, owner: OwnerId, key: &str) -> LibraryResult<ObjectRecord> {
        if key.is_empty() {
            return Err(LibraryError::invalid("key is required"));
        }
        self.index
            .fetch_live_object(owner, key)
            .await?
            .ok_or_else(|| LibraryError::not_found(format!("photo not found: {}", key)))
    }

    async fn stat_in_storage(&self, key: &str) -> LibraryResult<BlobAttributes> {
        match self.blobs.stat(key).await {
            Ok(attrs) => Ok(attrs),
            Err(err) if err.is_not_found() => Err(LibraryError::not_found(format!(
                "photo not found in storage: {}",
                key
            ))),
            Err(err) => Err(blob_err(format!("stat {}", key))(err)),
        }
    }

    /// Stream an upload into the blob store and index it.
    ///
    /// The head of the body is peeked for metadata extraction; the complete
    /// body is then forwarded unchanged.
    pub async fn upload(
        &self,
        owner: OwnerId,
        key: &str,
        content_type: &str,
        body: ByteStream,
    ) -> LibraryResult<Photo> {
        if key.is_empty() {
            return Err(LibraryError::invalid("key is required"));
        }
        let content_type = if content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            content_type
        };

        let (head, rest) = read_head(body, METADATA_HEAD_LIMIT)
            .await
            .map_err(|e| blob_err(format!("read upload body for {}", key))(e.into()))?;
        if head.is_empty() {
            return Err(LibraryError::invalid("data is required"));
        }
        let metadata = self.extractor.extract(&head, key);

        let attrs = self
            .blobs
            .put(key, rejoin(head, rest), content_type, metadata.encode())
            .await
            .map_err(blob_err(format!("upload {}", key)))?;

        let record = self
            .index
            .create_or_restore_object(&NewObject {
                owner_id: owner,
                key: key.to_string(),
                content_type: attrs.content_type.clone(),
                checksum: attrs.checksum.clone(),
                captured_at: metadata.captured_at,
            })
            .await?;
        self.materialize_directories(key).await?;

        info!(
            "uploaded {} ({} bytes, md5 {}) for owner {}",
            key, attrs.size, attrs.checksum, owner
        );
        Ok(Photo::from_record(&record).with_attributes(&attrs))
    }

    /// Blob attributes of `key`, for header-only responses.
    pub async fn attributes(&self, _owner: OwnerId, key: &str) -> LibraryResult<BlobAttributes> {
        self.stat_object(key).await
    }

    async fn stat_object(&self, key: &str) -> LibraryResult<BlobAttributes> {
        if key.is_empty() {
            return Err(LibraryError::invalid("key is required"));
        }
        match self.blobs.stat(key).await {
            Ok(attrs) => Ok(attrs),
            Err(err) if err.is_not_found() => {
                Err(LibraryError::not_found(format!("object not found: {}", key)))
            }
            Err(err) => Err(blob_err(format!("stat {}", key))(err)),
        }
    }

    /// Open the bytes of `key` for streaming.
    pub async fn download(&self, owner: OwnerId, key: &str) -> LibraryResult<Download> {
        let attributes = self.attributes(owner, key).await?;
        let body = self
            .blobs
            .get_stream(key)
            .await
            .map_err(blob_err(format!("open {}", key)))?;
        Ok(Download { attributes, body })
    }

    /// Serve a download authorized by a URL this store signed earlier.
    ///
    /// `method` is the method of the incoming request. A GET signature also
    /// covers HEAD.
    pub async fn open_signed(
        &self,
        key: &str,
        request: &SignedRequest,
        method: SignMethod,
    ) -> LibraryResult<Download> {
        let signed: SignMethod = request
            .method
            .parse()
            .map_err(LibraryError::InvalidArgument)?;
        let allowed = signed == method || (signed == SignMethod::Get && method == SignMethod::Head);
        if !allowed || !self.blobs.verify_signed_url(key, request) {
            return Err(LibraryError::Unauthenticated(
                "invalid or expired signature".into(),
            ));
        }
        let attributes = self.stat_object(key).await?;
        let body: ByteStream = match method {
            SignMethod::Head => Box::pin(futures::stream::empty()),
            _ => self
                .blobs
                .get_stream(key)
                .await
                .map_err(blob_err(format!("open {}", key)))?,
        };
        Ok(Download { attributes, body })
    }

    /// Index record merged with blob attributes and decoded metadata.
    pub async fn get(&self, owner: OwnerId, key: &str) -> LibraryResult<Photo> {
        let record = self.require_live(owner, key).await?;
        let attrs = self.stat_in_storage(key).await?;
        Ok(Photo::from_record(&record).with_attributes(&attrs))
    }

    pub async fn exists(&self, owner: OwnerId, key: &str) -> LibraryResult<bool> {
        if key.is_empty() {
            return Err(LibraryError::invalid("key is required"));
        }
        self.index.live_object_exists(owner, key).await
    }

    /// Remove the blob, tombstone the record, then collect its directory.
    ///
    /// A blob that is already gone is tolerated so a half-finished earlier
    /// delete can be completed.
    pub async fn delete(&self, owner: OwnerId, key: &str) -> LibraryResult<bool> {
        self.require_live(owner, key).await?;

        if let Err(err) = self.blobs.delete(key).await {
            if err.is_not_found() {
                warn!("{} not found in blob store, continuing with index deletion", key);
            } else {
                return Err(blob_err(format!("delete {}", key))(err));
            }
        }

        self.index.soft_delete_object(owner, key).await?;
        self.collect_directories(key).await;
        info!("deleted {} for owner {}", key, owner);
        Ok(true)
    }

    /// Live directory paths under `prefix`.
    ///
    /// Non-recursive listings collapse every path to the first segment below
    /// the prefix, de-duplicated and in path order.
    pub async fn list_directories(
        &self,
        _owner: OwnerId,
        prefix: &str,
        recursive: bool,
    ) -> LibraryResult<Vec<String>> {
        let paths = self.index.list_live_directories(prefix).await?;
        if recursive {
            return Ok(paths);
        }

        let mut children: Vec<String> = Vec::new();
        for path in &paths {
            let rest = &path[prefix.len()..];
            let skipped = rest.len() - rest.trim_start_matches('/').len();
            let rest = &rest[skipped..];
            if rest.is_empty() {
                continue;
            }
            let segment_len = rest.find('/').unwrap_or(rest.len());
            let child = &path[..prefix.len() + skipped + segment_len];
            if !children.iter().any(|c| c == child) {
                children.push(child.to_string());
            }
        }
        Ok(children)
    }

    pub async fn list_photos(
        &self,
        owner: OwnerId,
        prefix: &str,
        page_size: i64,
        page_token: Option<&str>,
    ) -> LibraryResult<PhotoPage> {
        let page = self
            .index
            .list_page(owner, prefix, page_size, page_token)
            .await?;
        Ok(PhotoPage {
            photos: page.items.iter().map(Photo::from_record).collect(),
            next_page_token: page.next_page_token,
        })
    }

    /// Replace the content type and/or side-channel map of a photo.
    ///
    /// Empty values count as "not provided"; at least one must remain.
    pub async fn update_metadata(
        &self,
        owner: OwnerId,
        key: &str,
        content_type: Option<String>,
        custom: Option<HashMap<String, String>>,
    ) -> LibraryResult<Photo> {
        if key.is_empty() {
            return Err(LibraryError::invalid("key is required"));
        }
        let content_type = content_type.filter(|c| !c.is_empty());
        let custom = custom.filter(|m| !m.is_empty());
        if content_type.is_none() && custom.is_none() {
            return Err(LibraryError::invalid(
                "at least one of custom_metadata or content_type must be provided",
            ));
        }

        let record = self.require_live(owner, key).await?;
        let attrs = match self
            .blobs
            .update_attributes(key, content_type.clone(), custom.clone())
            .await
        {
            Ok(attrs) => attrs,
            Err(err) if err.is_not_found() => {
                return Err(LibraryError::not_found(format!(
                    "photo not found in storage: {}",
                    key
                )));
            }
            Err(err) => return Err(blob_err(format!("update attributes of {}", key))(err)),
        };

        let record = match content_type.as_deref() {
            Some(ct) if ct != record.content_type => {
                self.index.set_content_type(owner, key, ct).await?;
                self.require_live(owner, key).await?
            }
            _ => record,
        };

        info!(
            "updated metadata of {} for owner {} ({} custom entries)",
            key,
            owner,
            custom.as_ref().map_or(0, HashMap::len)
        );
        Ok(Photo::from_record(&record).with_attributes(&attrs))
    }

    /// Time-limited URL for `key`. Defaults to GET for one hour.
    pub async fn signed_url(
        &self,
        owner: OwnerId,
        key: &str,
        method: Option<&str>,
        expiration_seconds: Option<i64>,
    ) -> LibraryResult<SignedUrl> {
        if key.is_empty() {
            return Err(LibraryError::invalid("key is required"));
        }
        let seconds = match expiration_seconds {
            Some(s) if s > MAX_SIGNED_URL_SECONDS => {
                return Err(LibraryError::invalid(format!(
                    "expiration_seconds cannot exceed {} (7 days)",
                    MAX_SIGNED_URL_SECONDS
                )));
            }
            Some(s) if s > 0 => s,
            _ => DEFAULT_SIGNED_URL_SECONDS,
        };
        let method: SignMethod = match method.filter(|m| !m.is_empty()) {
            Some(m) => m.parse().map_err(LibraryError::InvalidArgument)?,
            None => SignMethod::Get,
        };

        self.require_live(owner, key).await?;

        let expires_at: DateTime<Utc> = Utc::now() + ChronoDuration::seconds(seconds);
        let signed_url = self
            .blobs
            .sign_url(key, method, Duration::from_secs(seconds as u64))
            .await
            .map_err(blob_err(format!("sign {}", key)))?;

        info!(
            "signed {} {} for {}s for owner {}",
            method, key, seconds, owner
        );
        Ok(SignedUrl {
            signed_url,
            expires_at: expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }

    fn markdown_key(prefix: &str) -> LibraryResult<String> {
        if prefix.trim_end_matches('/').is_empty() {
            return Err(LibraryError::invalid("prefix is required"));
        }
        Ok(index_key_for(prefix))
    }

    fn validate_markdown(markdown: &str) -> LibraryResult<()> {
        if markdown.is_empty() {
            return Err(LibraryError::invalid("markdown is required"));
        }
        parse_front_matter(markdown)
            .map(|_| ())
            .map_err(|e| LibraryError::invalid(format!("invalid markdown frontmatter: {}", e)))
    }

    async fn require_live_directory(&self, key: &str) -> LibraryResult<()> {
        let dir = directory_of(key);
        match self.index.fetch_live_directory(&dir).await? {
            Some(_) => Ok(()),
            None => Err(LibraryError::not_found(format!("directory not found: {}", dir))),
        }
    }

    async fn write_markdown(&self, owner: OwnerId, key: &str, markdown: String) -> LibraryResult<()> {
        let body: ByteStream = Box::pin(futures::stream::once(async move {
            Ok::<_, std::io::Error>(Bytes::from(markdown))
        }));
        let attrs = self
            .blobs
            .put(key, body, MARKDOWN_CONTENT_TYPE, HashMap::new())
            .await
            .map_err(blob_err(format!("write {}", key)))?;
        self.index
            .create_or_restore_object(&NewObject {
                owner_id: owner,
                key: key.to_string(),
                content_type: attrs.content_type,
                checksum: attrs.checksum,
                captured_at: None,
            })
            .await?;
        Ok(())
    }

    /// Write `<prefix>/index.md` and materialize its directory.
    pub async fn create_markdown(
        &self,
        owner: OwnerId,
        prefix: &str,
        markdown: &str,
    ) -> LibraryResult<String> {
        let key = Self::markdown_key(prefix)?;
        Self::validate_markdown(markdown)?;

        self.write_markdown(owner, &key, markdown.to_string()).await?;
        self.materialize_directories(&key).await?;
        info!("created markdown {} for owner {}", key, owner);
        Ok(key)
    }

    pub async fn get_markdown(&self, owner: OwnerId, prefix: &str) -> LibraryResult<MarkdownDocument> {
        let key = Self::markdown_key(prefix)?;
        self.require_live_directory(&key).await?;

        let bytes = match self.blobs.get(&key).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => {
                return Err(LibraryError::not_found(format!(
                    "markdown file not found in storage: {}",
                    key
                )));
            }
            Err(err) => return Err(blob_err(format!("read {}", key))(err)),
        };
        let markdown = String::from_utf8(bytes.to_vec())
            .map_err(|_| LibraryError::invalid(format!("{} is not valid UTF-8", key)))?;
        info!("read markdown {} for owner {}", key, owner);
        Ok(MarkdownDocument { key, markdown })
    }

    pub async fn update_markdown(
        &self,
        owner: OwnerId,
        prefix: &str,
        markdown: &str,
    ) -> LibraryResult<String> {
        let key = Self::markdown_key(prefix)?;
        Self::validate_markdown(markdown)?;
        self.require_live_directory(&key).await?;

        self.write_markdown(owner, &key, markdown.to_string()).await?;
        info!("updated markdown {} for owner {}", key, owner);
        Ok(key)
    }

    pub async fn delete_markdown(&self, owner: OwnerId, prefix: &str) -> LibraryResult<bool> {
        let key = Self::markdown_key(prefix)?;
        self.require_live_directory(&key).await?;

        if let Err(err) = self.blobs.delete(&key).await {
            if err.is_not_found() {
                warn!("{} not found in blob store, continuing with index deletion", key);
            } else {
                return Err(blob_err(format!("delete {}", key))(err));
            }
        }
        self.index.soft_delete_object(owner, &key).await?;
        self.collect_directories(&key).await;
        info!("deleted markdown {} for owner {}", key, owner);
        Ok(true)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{body, service, service_with};
    use super::*;
    use chrono::TimeZone;
    use futures::StreamExt;

    #[tokio::test]
    async fn upload_then_delete_materializes_and_collects_directory() {
        let (svc, blobs) = service().await;
        svc.upload(1, "a/b/c.jpg", "image/jpeg", body(b"jpeg bytes")).await.unwrap();
        assert!(svc.index.fetch_live_directory("a/b").await.unwrap().is_some());
        assert!(svc.index.fetch_live_directory("a").await.unwrap().is_none());

        assert!(svc.delete(1, "a/b/c.jpg").await.unwrap());
        assert!(svc.index.fetch_live_directory("a/b").await.unwrap().is_none());
        assert!(!blobs.contains("a/b/c.jpg"));
        assert!(!svc.exists(1, "a/b/c.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn upload_records_checksum_capture_time_and_metadata() {
        let (svc, blobs) = service().await;
        let photo = svc
            .upload(1, "trip/x.jpg", "image/jpeg", body(b"EXIF:2023-07-04T12:00:00Z\nrest"))
            .await
            .unwrap();
        assert_eq!(
            photo.captured_at,
            Some(Utc.with_ymd_and_hms(2023, 7, 4, 12, 0, 0).unwrap())
        );
        let attrs = blobs.attributes("trip/x.jpg").unwrap();
        assert_eq!(photo.checksum, attrs.checksum);
        assert_eq!(attrs.size, 30);
        assert_eq!(attrs.metadata["original_filename"], "trip/x.jpg");
        assert_eq!(attrs.metadata["date_taken"], "2023-07-04T12:00:00Z");

        let fetched = svc.get(1, "trip/x.jpg").await.unwrap();
        assert_eq!(fetched.size_bytes, Some(30));
        assert_eq!(
            fetched.metadata.unwrap().original_filename.as_deref(),
            Some("trip/x.jpg")
        );
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_before_any_write() {
        let (svc, blobs) = service().await;
        let err = svc.upload(1, "a.jpg", "image/jpeg", body(b"")).await.unwrap_err();
        assert!(matches!(err, LibraryError::InvalidArgument(_)));
        assert!(!blobs.contains("a.jpg"));
    }

    #[tokio::test]
    async fn reupload_restores_tombstoned_record() {
        let (svc, _) = service().await;
        let first = svc.upload(1, "d/a.jpg", "image/jpeg", body(b"one")).await.unwrap();
        svc.delete(1, "d/a.jpg").await.unwrap();
        let second = svc.upload(1, "d/a.jpg", "image/png", body(b"two")).await.unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.content_type, "image/png");
        assert!(svc.index.fetch_live_directory("d").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn non_last_delete_keeps_directory() {
        let (svc, _) = service().await;
        svc.upload(1, "d/a.jpg", "image/jpeg", body(b"a")).await.unwrap();
        svc.upload(1, "d/b.jpg", "image/jpeg", body(b"b")).await.unwrap();
        svc.delete(1, "d/a.jpg").await.unwrap();
        assert!(svc.index.fetch_live_directory("d").await.unwrap().is_some());
        svc.delete(1, "d/b.jpg").await.unwrap();
        assert!(svc.index.fetch_live_directory("d").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_tolerates_missing_blob_but_not_other_failures() {
        let (svc, blobs) = service().await;
        svc.upload(1, "gone.jpg", "image/jpeg", body(b"x")).await.unwrap();
        blobs.remove_raw("gone.jpg");
        assert!(svc.delete(1, "gone.jpg").await.unwrap());

        svc.upload(1, "stuck.jpg", "image/jpeg", body(b"x")).await.unwrap();
        blobs.fail_key("stuck.jpg");
        let err = svc.delete(1, "stuck.jpg").await.unwrap_err();
        assert!(err.is_store_failure());
        assert!(svc.exists(1, "stuck.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn records_are_scoped_to_their_owner() {
        let (svc, _) = service().await;
        svc.upload(1, "mine.jpg", "image/jpeg", body(b"x")).await.unwrap();
        assert!(matches!(
            svc.get(2, "mine.jpg").await.unwrap_err(),
            LibraryError::NotFound(_)
        ));
        assert!(matches!(
            svc.delete(2, "mine.jpg").await.unwrap_err(),
            LibraryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn ancestor_policy_materializes_and_collects_the_chain() {
        let (svc, _) = service_with(DirectoryPolicy::Ancestors).await;
        svc.upload(1, "a/b/c/x.jpg", "image/jpeg", body(b"x")).await.unwrap();
        svc.upload(1, "a/y.jpg", "image/jpeg", body(b"y")).await.unwrap();
        for dir in ["a", "a/b", "a/b/c"] {
            assert!(svc.index.fetch_live_directory(dir).await.unwrap().is_some(), "{}", dir);
        }

        svc.delete(1, "a/b/c/x.jpg").await.unwrap();
        assert!(svc.index.fetch_live_directory("a/b/c").await.unwrap().is_none());
        assert!(svc.index.fetch_live_directory("a/b").await.unwrap().is_none());
        assert!(svc.index.fetch_live_directory("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn download_streams_bytes() {
        let (svc, _) = service().await;
        svc.upload(1, "dl.jpg", "image/jpeg", body(b"0123456789")).await.unwrap();
        let dl = svc.download(1, "dl.jpg").await.unwrap();
        assert_eq!(dl.attributes.size, 10);
        let chunks: Vec<_> = dl.body.collect().await;
        let bytes: Vec<u8> = chunks.into_iter().flat_map(|c| c.unwrap().to_vec()).collect();
        assert_eq!(bytes, b"0123456789");

        assert!(matches!(
            svc.download(1, "missing.jpg").await.err().unwrap(),
            LibraryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn non_recursive_directory_listing_returns_children() {
        let (svc, _) = service().await;
        for dir in ["a", "a/b", "a/b/c", "a/d", "ab", "z/y"] {
            svc.index.create_or_restore_directory(dir).await.unwrap();
        }
        assert_eq!(
            svc.list_directories(1, "", false).await.unwrap(),
            vec!["a", "ab", "z"]
        );
        assert_eq!(
            svc.list_directories(1, "a/", false).await.unwrap(),
            vec!["a/b", "a/d"]
        );
        assert_eq!(
            svc.list_directories(1, "a", false).await.unwrap(),
            vec!["a/b", "a/d", "ab"]
        );
        assert_eq!(
            svc.list_directories(1, "a/", true).await.unwrap(),
            vec!["a/b", "a/b/c", "a/d"]
        );
    }

    #[tokio::test]
    async fn update_metadata_validates_and_mirrors_content_type() {
        let (svc, blobs) = service().await;
        svc.upload(1, "m.jpg", "image/jpeg", body(b"x")).await.unwrap();

        let err = svc
            .update_metadata(1, "m.jpg", Some(String::new()), Some(HashMap::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::InvalidArgument(_)));

        let mut custom = HashMap::new();
        custom.insert("album".to_string(), "summer".to_string());
        let photo = svc
            .update_metadata(1, "m.jpg", Some("image/heic".into()), Some(custom.clone()))
            .await
            .unwrap();
        assert_eq!(photo.content_type, "image/heic");
        let record = svc.index.fetch_live_object(1, "m.jpg").await.unwrap().unwrap();
        assert_eq!(record.content_type, "image/heic");
        assert_eq!(blobs.attributes("m.jpg").unwrap().metadata, custom);

        blobs.remove_raw("m.jpg");
        let err = svc
            .update_metadata(1, "m.jpg", Some("image/png".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::NotFound(_)));
    }

    #[tokio::test]
    async fn signed_url_validation() {
        let (svc, _) = service().await;
        svc.upload(1, "s.jpg", "image/jpeg", body(b"x")).await.unwrap();

        let url = svc.signed_url(1, "s.jpg", None, None).await.unwrap();
        assert!(url.signed_url.contains("method=GET"));
        assert!(url.signed_url.contains("ttl=3600"));

        let url = svc.signed_url(1, "s.jpg", Some("put"), Some(60)).await.unwrap();
        assert!(url.signed_url.contains("method=PUT"));

        let too_long = svc
            .signed_url(1, "s.jpg", None, Some(MAX_SIGNED_URL_SECONDS + 1))
            .await
            .unwrap_err();
        assert!(matches!(too_long, LibraryError::InvalidArgument(_)));

        let bad_method = svc.signed_url(1, "s.jpg", Some("POST"), None).await.unwrap_err();
        assert!(matches!(bad_method, LibraryError::InvalidArgument(_)));

        let missing = svc.signed_url(1, "nope.jpg", None, None).await.unwrap_err();
        assert!(matches!(missing, LibraryError::NotFound(_)));
    }

    #[tokio::test]
    async fn signed_downloads_require_a_valid_signature() {
        let (svc, _) = service().await;
        svc.upload(1, "s.jpg", "image/jpeg", body(b"x")).await.unwrap();
        let request = SignedRequest {
            method: "GET".into(),
            expires: Utc::now().timestamp() + 60,
            signature: "forged".into(),
        };
        assert!(matches!(
            svc.open_signed("s.jpg", &request, SignMethod::Get).await.err().unwrap(),
            LibraryError::Unauthenticated(_)
        ));
        let put = SignedRequest {
            method: "PUT".into(),
            ..request
        };
        assert!(matches!(
            svc.open_signed("s.jpg", &put, SignMethod::Get).await.err().unwrap(),
            LibraryError::Unauthenticated(_)
        ));
    }

    #[tokio::test]
    async fn markdown_lifecycle() {
        let (svc, blobs) = service().await;
        let doc = "---\nsort_photos_in_chronological_order: true\n---\n# Trip\n";

        let key = svc.create_markdown(1, "trip/", doc).await.unwrap();
        assert_eq!(key, "trip/index.md");
        assert_eq!(blobs.attributes(&key).unwrap().content_type, MARKDOWN_CONTENT_TYPE);
        assert!(svc.index.fetch_live_directory("trip").await.unwrap().is_some());

        let read = svc.get_markdown(1, "trip").await.unwrap();
        assert_eq!(read.markdown, doc);

        svc.update_markdown(1, "trip", "---\n---\n# Renamed\n").await.unwrap();
        assert_eq!(svc.get_markdown(1, "trip").await.unwrap().markdown, "---\n---\n# Renamed\n");

        // Index files never show up as photos.
        assert!(svc.list_photos(1, "trip/", 0, None).await.unwrap().photos.is_empty());

        assert!(svc.delete_markdown(1, "trip").await.unwrap());
        assert!(svc.index.fetch_live_directory("trip").await.unwrap().is_none());
        assert!(matches!(
            svc.get_markdown(1, "trip").await.unwrap_err(),
            LibraryError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn markdown_requires_valid_front_matter_and_directory() {
        let (svc, blobs) = service().await;
        let err = svc
            .create_markdown(1, "trip", "---\nunknown: 1\n---\n")
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::InvalidArgument(_)));
        assert!(!blobs.contains("trip/index.md"));

        let err = svc.create_markdown(1, "", "---\n---\n").await.unwrap_err();
        assert!(matches!(err, LibraryError::InvalidArgument(_)));

        let err = svc.update_markdown(1, "nowhere", "---\n---\n").await.unwrap_err();
        assert!(matches!(err, LibraryError::NotFound(_)));
    }
}
