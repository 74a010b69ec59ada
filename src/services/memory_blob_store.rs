//! In-memory blob store used by tests.

use super::blob_store::{BlobAttributes, BlobError, BlobResult, BlobStore, ByteStream, SignMethod};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{StreamExt, stream::BoxStream};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io,
    sync::RwLock,
    time::Duration,
};

/// `BTreeMap`-backed store. Keys come back from `list` in sorted order.
///
/// Also exposes raw mutation helpers so tests can simulate out-of-band
/// changes and inject failures for specific keys.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, (Bytes, BlobAttributes)>>,
    failing: RwLock<HashSet<String>>,
    delete_faults: RwLock<HashMap<String, DeleteFault>>,
}

/// How a `delete` of a specific key misbehaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteFault {
    /// The object disappears concurrently; delete reports not-found.
    AlreadyGone,
    /// Delete fails with an I/O error and leaves the object in place.
    Fails,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an object directly, bypassing the service.
    pub fn insert_raw(
        &self,
        key: &str,
        data: &'static [u8],
        content_type: &str,
        metadata: HashMap<String, String>,
    ) {
        let now = Utc::now();
        let attrs = BlobAttributes {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size: data.len() as i64,
            checksum: general_purpose::STANDARD.encode(md5::compute(data).0),
            created_at: now,
            updated_at: now,
            metadata,
        };
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), (Bytes::from_static(data), attrs));
    }

    /// Remove an object directly, bypassing the service.
    pub fn remove_raw(&self, key: &str) {
        self.objects.write().expect("lock poisoned").remove(key);
    }

    /// Make every operation on `key` except listing fail with an I/O error.
    pub fn fail_key(&self, key: &str) {
        self.failing
            .write()
            .expect("lock poisoned")
            .insert(key.to_string());
    }

    /// Make only `delete` of `key` misbehave.
    pub fn fault_delete(&self, key: &str, fault: DeleteFault) {
        self.delete_faults
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), fault);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().expect("lock poisoned").contains_key(key)
    }

    pub fn attributes(&self, key: &str) -> Option<BlobAttributes> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(key)
            .map(|(_, attrs)| attrs.clone())
    }

    fn check(&self, key: &str) -> BlobResult<()> {
        if self.failing.read().expect("lock poisoned").contains(key) {
            return Err(BlobError::Io(io::Error::other(format!(
                "injected failure for {}",
                key
            ))));
        }
        Ok(())
    }

    fn entry(&self, key: &str) -> BlobResult<(Bytes, BlobAttributes)> {
        self.check(key)?;
        self.objects
            .read()
            .expect("lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        mut body: ByteStream,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> BlobResult<BlobAttributes> {
        self.check(key)?;
        let mut buf = BytesMut::new();
        let mut digest = md5::Context::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            digest.consume(&chunk);
            buf.extend_from_slice(&chunk);
        }
        let now = Utc::now();
        let attrs = BlobAttributes {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size: buf.len() as i64,
            checksum: general_purpose::STANDARD.encode(digest.compute().0),
            created_at: now,
            updated_at: now,
            metadata,
        };
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), (buf.freeze(), attrs.clone()));
        Ok(attrs)
    }

    async fn get_stream(&self, key: &str) -> BlobResult<ByteStream> {
        let (data, _) = self.entry(key)?;
        Ok(Box::pin(futures::stream::iter(vec![Ok(data)])))
    }

    async fn stat(&self, key: &str) -> BlobResult<BlobAttributes> {
        self.entry(key).map(|(_, attrs)| attrs)
    }

    async fn update_attributes(
        &self,
        key: &str,
        content_type: Option<String>,
        metadata: Option<HashMap<String, String>>,
    ) -> BlobResult<BlobAttributes> {
        self.check(key)?;
        let mut map = self.objects.write().expect("lock poisoned");
        let (_, attrs) = map
            .get_mut(key)
            .ok_or_else(|| BlobError::NotFound(key.to_string()))?;
        if let Some(content_type) = content_type {
            attrs.content_type = content_type;
        }
        if let Some(metadata) = metadata {
            attrs.metadata = metadata;
        }
        attrs.updated_at = Utc::now();
        Ok(attrs.clone())
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.check(key)?;
        let fault = self
            .delete_faults
            .read()
            .expect("lock poisoned")
            .get(key)
            .copied();
        match fault {
            Some(DeleteFault::AlreadyGone) => {
                self.objects.write().expect("lock poisoned").remove(key);
                return Err(BlobError::NotFound(key.to_string()));
            }
            Some(DeleteFault::Fails) => {
                return Err(BlobError::Io(io::Error::other(format!(
                    "injected delete failure for {}",
                    key
                ))));
            }
            None => {}
        }
        self.objects
            .write()
            .expect("lock poisoned")
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn copy(&self, src: &str, dst: &str) -> BlobResult<BlobAttributes> {
        self.check(dst)?;
        let (data, source) = self.entry(src)?;
        let now = Utc::now();
        let attrs = BlobAttributes {
            key: dst.to_string(),
            created_at: now,
            updated_at: now,
            ..source
        };
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(dst.to_string(), (data, attrs.clone()));
        Ok(attrs)
    }

    async fn list(&self, prefix: &str) -> BlobResult<BoxStream<'static, BlobResult<BlobAttributes>>> {
        let items: Vec<BlobResult<BlobAttributes>> = self
            .objects
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(_, (_, attrs))| Ok(attrs.clone()))
            .collect();
        Ok(futures::stream::iter(items).boxed())
    }

    async fn sign_url(&self, key: &str, method: SignMethod, ttl: Duration) -> BlobResult<String> {
        self.entry(key)?;
        Ok(format!(
            "memory://{}?method={}&ttl={}",
            key,
            method,
            ttl.as_secs()
        ))
    }
}
