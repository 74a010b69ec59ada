//! Blob store adapter contract.
//!
//! The blob store is the authoritative source of object existence and bytes.
//! It is a flat key space with a string side-channel map per object and no
//! native directories. Implementations:
//! - [`LocalBlobStore`](super::local_blob_store::LocalBlobStore): sharded files on local disk
//! - `MemoryBlobStore`: `BTreeMap`-backed, used by tests
//!
//! [`TimeoutBlobStore`] wraps any implementation so no call made by the
//! service can hang.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, io, pin::Pin, str::FromStr, sync::Arc, time::Duration};
use thiserror::Error;

/// Chunked byte stream used for uploads and downloads.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("invalid blob key `{0}`")]
    InvalidKey(String),
    #[error("blob operation `{0}` timed out")]
    Timeout(&'static str),
    #[error("attributes for blob `{key}` are unreadable: {source}")]
    CorruptAttributes {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BlobError {
    /// The one condition callers special-case (treat-as-absent).
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound(_))
    }
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Attributes the blob store keeps for each object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BlobAttributes {
    pub key: String,
    pub content_type: String,
    pub size: i64,
    /// Base64-encoded MD5 digest of the bytes.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// HTTP methods a signed URL may authorize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignMethod {
    Get,
    Put,
    Delete,
    Head,
}

impl SignMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignMethod::Get => "GET",
            SignMethod::Put => "PUT",
            SignMethod::Delete => "DELETE",
            SignMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for SignMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(SignMethod::Get),
            "PUT" => Ok(SignMethod::Put),
            "DELETE" => Ok(SignMethod::Delete),
            "HEAD" => Ok(SignMethod::Head),
            other => Err(format!(
                "invalid method: {} (must be GET, PUT, DELETE, or HEAD)",
                other
            )),
        }
    }
}

/// Query parameters carried by a signed URL.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedRequest {
    pub method: String,
    pub expires: i64,
    pub signature: String,
}

/// Flat key/value blob storage.
///
/// Implementations must report a missing key as [`BlobError::NotFound`] and
/// nothing else, since callers treat that case as "already absent".
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `body` under `key`, replacing any existing object.
    /// The checksum is computed incrementally while the stream is consumed.
    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> BlobResult<BlobAttributes>;

    /// Open the object for chunked reading.
    async fn get_stream(&self, key: &str) -> BlobResult<ByteStream>;

    /// Read the whole object into memory.
    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        let mut stream = self.get_stream(key).await?;
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    async fn stat(&self, key: &str) -> BlobResult<BlobAttributes>;

    /// Replace the content type and/or the whole side-channel map.
    async fn update_attributes(
        &self,
        key: &str,
        content_type: Option<String>,
        metadata: Option<HashMap<String, String>>,
    ) -> BlobResult<BlobAttributes>;

    async fn delete(&self, key: &str) -> BlobResult<()>;

    /// Server-side copy; the destination inherits content type and metadata.
    async fn copy(&self, src: &str, dst: &str) -> BlobResult<BlobAttributes>;

    /// Every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> BlobResult<BoxStream<'static, BlobResult<BlobAttributes>>>;

    /// Produce a time-limited URL granting `method` on `key`.
    async fn sign_url(&self, key: &str, method: SignMethod, ttl: Duration) -> BlobResult<String>;

    /// Check a signed URL previously issued by this store.
    fn verify_signed_url(&self, _key: &str, _request: &SignedRequest) -> bool {
        false
    }

    /// Readiness check.
    async fn probe(&self) -> BlobResult<()> {
        Ok(())
    }
}

/// Read up to `limit` bytes from the front of `stream`.
///
/// Returns the buffered head and the untouched remainder, so the caller can
/// inspect the head and still forward the complete body.
pub async fn read_head(mut stream: ByteStream, limit: usize) -> io::Result<(Bytes, ByteStream)> {
    let mut head = BytesMut::new();
    while head.len() < limit {
        match stream.next().await {
            Some(chunk) => head.extend_from_slice(&chunk?),
            None => break,
        }
    }
    Ok((head.freeze(), stream))
}

/// Re-join a head read by [`read_head`] with the rest of its stream.
pub fn rejoin(head: Bytes, rest: ByteStream) -> ByteStream {
    if head.is_empty() {
        return rest;
    }
    Box::pin(futures::stream::once(async move { Ok(head) }).chain(rest))
}

/// Bounds the calls of the wrapped store by a fixed timeout.
///
/// Streamed bodies are bounded per chunk instead of as a whole: an upload or
/// download may take as long as it needs while it keeps making progress, and
/// fails once it stalls for longer than the timeout.
pub struct TimeoutBlobStore {
    inner: Arc<dyn BlobStore>,
    timeout: Duration,
}

impl TimeoutBlobStore {
    pub fn new(inner: Arc<dyn BlobStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = BlobResult<T>>,
    ) -> BlobResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(BlobError::Timeout(op)),
        }
    }
}

/// Fail `stream` with [`io::ErrorKind::TimedOut`] when no chunk arrives
/// within `idle`.
fn idle_bounded(stream: ByteStream, idle: Duration) -> ByteStream {
    Box::pin(futures::stream::unfold(Some(stream), move |state| async move {
        let mut stream = state?;
        match tokio::time::timeout(idle, stream.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(stream))),
            Ok(None) => None,
            Err(_) => Some((
                Err(io::Error::new(io::ErrorKind::TimedOut, "blob stream stalled")),
                None,
            )),
        }
    }))
}

#[async_trait]
impl BlobStore for TimeoutBlobStore {
    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> BlobResult<BlobAttributes> {
        let body = idle_bounded(body, self.timeout);
        self.inner.put(key, body, content_type, metadata).await
    }

    async fn get_stream(&self, key: &str) -> BlobResult<ByteStream> {
        let stream = self.bounded("get", self.inner.get_stream(key)).await?;
        Ok(idle_bounded(stream, self.timeout))
    }

    async fn stat(&self, key: &str) -> BlobResult<BlobAttributes> {
        self.bounded("stat", self.inner.stat(key)).await
    }

    async fn update_attributes(
        &self,
        key: &str,
        content_type: Option<String>,
        metadata: Option<HashMap<String, String>>,
    ) -> BlobResult<BlobAttributes> {
        self.bounded(
            "update",
            self.inner.update_attributes(key, content_type, metadata),
        )
        .await
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.bounded("delete", self.inner.delete(key)).await
    }

    async fn copy(&self, src: &str, dst: &str) -> BlobResult<BlobAttributes> {
        self.bounded("copy", self.inner.copy(src, dst)).await
    }

    async fn list(&self, prefix: &str) -> BlobResult<BoxStream<'static, BlobResult<BlobAttributes>>> {
        self.bounded("list", self.inner.list(prefix)).await
    }

    async fn sign_url(&self, key: &str, method: SignMethod, ttl: Duration) -> BlobResult<String> {
        self.bounded("sign", self.inner.sign_url(key, method, ttl))
            .await
    }

    fn verify_signed_url(&self, key: &str, request: &SignedRequest) -> bool {
        self.inner.verify_signed_url(key, request)
    }

    async fn probe(&self) -> BlobResult<()> {
        self.bounded("probe", self.inner.probe()).await
    }
}
