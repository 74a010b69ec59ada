//! src/services/local_blob_store.rs
//!
//! LocalBlobStore: a blob store on local disk. Payloads live under
//! `base_path/objects/{shard}/{shard}/{key}` and their attributes (content
//! type, checksum, timestamps, side-channel metadata) in a JSON sidecar under
//! `base_path/attrs/{shard}/{shard}/{key}.json`. Both are written to a
//! temporary file first and renamed into place.

use super::blob_store::{
    BlobAttributes, BlobError, BlobResult, BlobStore, ByteStream, SignMethod, SignedRequest,
};
use async_trait::async_trait;
use base64::{
    Engine as _,
    engine::general_purpose::{self, URL_SAFE_NO_PAD},
};
use chrono::Utc;
use futures::{StreamExt, stream::BoxStream};
use hmac::{Hmac, Mac};
use md5::Context;
use sha2::Sha256;
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const TMP_PREFIX: &str = ".tmp-";

#[derive(Clone)]
pub struct LocalBlobStore {
    /// Base directory on disk.
    pub base_path: PathBuf,

    /// HMAC key for signed URLs.
    signing_secret: String,

    /// Externally reachable URL of this server, used to build signed URLs.
    public_url: String,
}

impl LocalBlobStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        signing_secret: impl Into<String>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            signing_secret: signing_secret.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects empty or overlong keys, absolute keys, empty, `.` or `..`
    /// segments, control characters and backslashes.
    fn ensure_key_safe(key: &str) -> BlobResult<()> {
        let invalid = || BlobError::InvalidKey(key.to_string());
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(invalid());
        }
        if key.starts_with('/') {
            return Err(invalid());
        }
        if key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(invalid());
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        if key.rsplit('/').next().is_some_and(|name| name.starts_with(TMP_PREFIX)) {
            return Err(invalid());
        }
        Ok(())
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase hex.
    fn shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn objects_root(&self) -> PathBuf {
        self.base_path.join("objects")
    }

    fn attrs_root(&self) -> PathBuf {
        self.base_path.join("attrs")
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (a, b) = Self::shards(key);
        self.objects_root().join(a).join(b).join(key)
    }

    fn attrs_path(&self, key: &str) -> PathBuf {
        let (a, b) = Self::shards(key);
        self.attrs_root().join(a).join(b).join(format!("{}.json", key))
    }

    /// HMAC-SHA256 over `METHOD\nkey\nexpires`, keyed by the signing secret.
    fn signed_mac(&self, key: &str, method: &str, expires: i64) -> io::Result<Hmac<Sha256>> {
        // HMAC accepts keys of any length.
        let mut mac = <Hmac<Sha256>>::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|_| io::Error::other("invalid signing secret"))?;
        mac.update(format!("{}\n{}\n{}", method, key, expires).as_bytes());
        Ok(mac)
    }

    /// Write bytes atomically: temp file in the target directory, fsync, rename.
    async fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
        let tmp = TempFile::beside(path).await?;
        let mut file = File::create(tmp.path()).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        tmp.persist(path).await
    }

    async fn write_attrs(&self, attrs: &BlobAttributes) -> BlobResult<()> {
        let json = serde_json::to_vec(attrs).map_err(|source| BlobError::CorruptAttributes {
            key: attrs.key.clone(),
            source,
        })?;
        Self::write_atomic(&self.attrs_path(&attrs.key), &json).await?;
        Ok(())
    }

    /// Load attributes, synthesizing them when the payload was dropped in
    /// without a sidecar.
    async fn read_attrs(&self, key: &str) -> BlobResult<BlobAttributes> {
        let object_path = self.object_path(key);
        let meta = fs::metadata(&object_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                BlobError::NotFound(key.to_string())
            } else {
                BlobError::Io(err)
            }
        })?;

        match fs::read(self.attrs_path(key)).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| {
                BlobError::CorruptAttributes {
                    key: key.to_string(),
                    source,
                }
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no attribute sidecar for {}, synthesizing", key);
                let checksum = checksum_of_file(&object_path).await?;
                let modified = meta
                    .modified()
                    .map(chrono::DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                Ok(BlobAttributes {
                    key: key.to_string(),
                    content_type: DEFAULT_CONTENT_TYPE.into(),
                    size: meta.len() as i64,
                    checksum,
                    created_at: modified,
                    updated_at: modified,
                    metadata: HashMap::new(),
                })
            }
            Err(err) => Err(BlobError::Io(err)),
        }
    }

    /// Recursively collect payload keys below the objects root.
    async fn collect_keys(&self, prefix: &str) -> BlobResult<Vec<String>> {
        let root = self.objects_root();
        let mut keys = Vec::new();
        let mut stack = vec![(root.clone(), 0usize)];

        while let Some((dir, depth)) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(BlobError::Io(err)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push((path, depth + 1));
                    continue;
                }
                // Shard directories occupy the first two levels.
                if depth < 2 {
                    continue;
                }
                let name = entry.file_name();
                if name.to_string_lossy().starts_with(TMP_PREFIX) {
                    continue;
                }
                let Some(key) = key_from_path(&root, &path) else {
                    continue;
                };
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Recursively remove empty directories up to `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    /// Stream-upload an object to disk.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5 and size while streaming.
    /// - Atomically renames into final location, then writes the sidecar.
    ///
    /// The temp file is removed on errors and when the upload is cancelled.
    async fn put(
        &self,
        key: &str,
        mut body: ByteStream,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> BlobResult<BlobAttributes> {
        Self::ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let tmp = TempFile::beside(&file_path).await?;
        let mut file = File::create(tmp.path()).await?;

        let mut size: i64 = 0;
        let mut digest = Context::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            size += chunk.len() as i64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.sync_all().await?;
        drop(file);
        tmp.persist(&file_path).await?;

        let now = Utc::now();
        let attrs = BlobAttributes {
            key: key.to_string(),
            content_type: if content_type.is_empty() {
                DEFAULT_CONTENT_TYPE.into()
            } else {
                content_type.to_string()
            },
            size,
            checksum: general_purpose::STANDARD.encode(digest.compute().0),
            created_at: now,
            updated_at: now,
            metadata,
        };
        self.write_attrs(&attrs).await?;
        debug!("stored {} ({} bytes) at {}", key, size, file_path.display());
        Ok(attrs)
    }

    async fn get_stream(&self, key: &str) -> BlobResult<ByteStream> {
        Self::ensure_key_safe(key)?;
        let file = File::open(self.object_path(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                BlobError::NotFound(key.to_string())
            } else {
                BlobError::Io(err)
            }
        })?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn stat(&self, key: &str) -> BlobResult<BlobAttributes> {
        Self::ensure_key_safe(key)?;
        self.read_attrs(key).await
    }

    async fn update_attributes(
        &self,
        key: &str,
        content_type: Option<String>,
        metadata: Option<HashMap<String, String>>,
    ) -> BlobResult<BlobAttributes> {
        Self::ensure_key_safe(key)?;
        let mut attrs = self.read_attrs(key).await?;
        if let Some(content_type) = content_type {
            attrs.content_type = content_type;
        }
        if let Some(metadata) = metadata {
            attrs.metadata = metadata;
        }
        attrs.updated_at = Utc::now();
        self.write_attrs(&attrs).await?;
        Ok(attrs)
    }

    /// Remove payload and sidecar, then prune empty shard directories.
    async fn delete(&self, key: &str) -> BlobResult<()> {
        Self::ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BlobError::NotFound(key.to_string()));
            }
            Err(err) => return Err(BlobError::Io(err)),
        }

        let attrs_path = self.attrs_path(key);
        if let Err(err) = fs::remove_file(&attrs_path).await {
            if err.kind() != ErrorKind::NotFound {
                debug!("failed to remove sidecar {}: {}", attrs_path.display(), err);
            }
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.objects_root()).await;
        }
        if let Some(parent) = attrs_path.parent() {
            self.prune_empty_dirs(parent, &self.attrs_root()).await;
        }
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> BlobResult<BlobAttributes> {
        Self::ensure_key_safe(src)?;
        Self::ensure_key_safe(dst)?;
        let source = self.read_attrs(src).await?;

        let dst_path = self.object_path(dst);
        let tmp = TempFile::beside(&dst_path).await?;
        fs::copy(self.object_path(src), tmp.path())
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    BlobError::NotFound(src.to_string())
                } else {
                    BlobError::Io(err)
                }
            })?;
        tmp.persist(&dst_path).await?;

        let now = Utc::now();
        let attrs = BlobAttributes {
            key: dst.to_string(),
            created_at: now,
            updated_at: now,
            ..source
        };
        self.write_attrs(&attrs).await?;
        Ok(attrs)
    }

    async fn list(&self, prefix: &str) -> BlobResult<BoxStream<'static, BlobResult<BlobAttributes>>> {
        let keys = self.collect_keys(prefix).await?;
        let store = self.clone();
        let stream = futures::stream::iter(keys)
            .then(move |key| {
                let store = store.clone();
                async move { store.read_attrs(&key).await }
            })
            .boxed();
        Ok(stream)
    }

    async fn sign_url(&self, key: &str, method: SignMethod, ttl: Duration) -> BlobResult<String> {
        Self::ensure_key_safe(key)?;
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let tag = self.signed_mac(key, method.as_str(), expires)?.finalize();
        let signature = URL_SAFE_NO_PAD.encode(tag.into_bytes());
        let encoded_key = key
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        Ok(format!(
            "{}/signed/{}?method={}&expires={}&signature={}",
            self.public_url, encoded_key, method, expires, signature
        ))
    }

    fn verify_signed_url(&self, key: &str, request: &SignedRequest) -> bool {
        if request.expires < Utc::now().timestamp() {
            return false;
        }
        let Ok(tag) = URL_SAFE_NO_PAD.decode(&request.signature) else {
            return false;
        };
        let method = request.method.to_ascii_uppercase();
        match self.signed_mac(key, &method, request.expires) {
            // Constant-time comparison.
            Ok(mac) => mac.verify_slice(&tag).is_ok(),
            Err(_) => false,
        }
    }

    /// Write/read/delete a temp file under `base_path`.
    async fn probe(&self) -> BlobResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let bytes = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if bytes? != b"readyz" {
            return Err(BlobError::Io(io::Error::other("file content mismatch")));
        }
        Ok(())
    }
}

/// A temporary file next to its final location. Removed on drop unless
/// [`TempFile::persist`] renamed it into place, so an error or a cancelled
/// future never leaves it behind.
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    async fn beside(target: &Path) -> io::Result<Self> {
        let parent = parent_of(target)?;
        fs::create_dir_all(&parent).await?;
        Ok(Self {
            path: parent.join(format!("{}{}", TMP_PREFIX, Uuid::new_v4())),
            armed: true,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(mut self, target: &Path) -> io::Result<()> {
        fs::rename(&self.path, target).await?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn parent_of(path: &Path) -> io::Result<PathBuf> {
    path.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| io::Error::other("object path missing parent directory"))
}

/// Strip `root/{shard}/{shard}/` from a payload path.
fn key_from_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .skip(2)
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

async fn checksum_of_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path).await?;
    let mut digest = Context::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        digest.consume(&buf[..n]);
    }
    Ok(general_purpose::STANDARD.encode(digest.compute().0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::TryStreamExt;

    fn body(data: &'static [u8]) -> ByteStream {
        Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(&data[..data.len() / 2])),
            Ok(Bytes::from_static(&data[data.len() / 2..])),
        ]))
    }

    fn store(dir: &tempfile::TempDir) -> LocalBlobStore {
        LocalBlobStore::new(dir.path(), "secret", "http://localhost:3000/")
    }

    #[tokio::test]
    async fn put_get_stat_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let mut meta = HashMap::new();
        meta.insert("original_filename".to_string(), "a.jpg".to_string());

        let attrs = store
            .put("photos/2024/a.jpg", body(b"hello world"), "image/jpeg", meta.clone())
            .await
            .unwrap();
        assert_eq!(attrs.size, 11);
        assert_eq!(
            attrs.checksum,
            general_purpose::STANDARD.encode(md5::compute(b"hello world").0)
        );

        let bytes = store.get("photos/2024/a.jpg").await.unwrap();
        assert_eq!(&bytes[..], b"hello world");

        let stat = store.stat("photos/2024/a.jpg").await.unwrap();
        assert_eq!(stat.content_type, "image/jpeg");
        assert_eq!(stat.metadata, meta);
    }

    #[tokio::test]
    async fn missing_keys_report_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.stat("nope.jpg").await.unwrap_err().is_not_found());
        assert!(store.delete("nope.jpg").await.unwrap_err().is_not_found());
        assert!(store.copy("nope.jpg", "b.jpg").await.unwrap_err().is_not_found());
        assert!(store.get_stream("nope.jpg").await.err().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn rejects_unsafe_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        for key in ["", "/abs.jpg", "a/../b.jpg", "a//b.jpg", "dir/", "a\\b", "x/.tmp-1"] {
            let err = store
                .put(key, body(b"xx"), "image/jpeg", HashMap::new())
                .await
                .unwrap_err();
            assert!(matches!(err, BlobError::InvalidKey(_)), "key {:?}", key);
        }
    }

    #[tokio::test]
    async fn copy_delete_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store
            .put("a/x.jpg", body(b"abcdef"), "image/jpeg", HashMap::new())
            .await
            .unwrap();
        let copied = store.copy("a/x.jpg", "b/y.jpg").await.unwrap();
        assert_eq!(copied.key, "b/y.jpg");
        assert_eq!(copied.content_type, "image/jpeg");

        let keys: Vec<String> = store
            .list("")
            .await
            .unwrap()
            .map_ok(|a| a.key)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(keys, vec!["a/x.jpg".to_string(), "b/y.jpg".to_string()]);

        let only_b: Vec<BlobAttributes> =
            store.list("b/").await.unwrap().try_collect().await.unwrap();
        assert_eq!(only_b.len(), 1);

        store.delete("a/x.jpg").await.unwrap();
        assert!(store.stat("a/x.jpg").await.unwrap_err().is_not_found());
        assert!(store.stat("b/y.jpg").await.is_ok());
    }

    #[tokio::test]
    async fn payload_without_sidecar_is_listed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let path = store.object_path("dropped/in.jpg");
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"oob").await.unwrap();

        let listed: Vec<BlobAttributes> = store.list("").await.unwrap().try_collect().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "dropped/in.jpg");
        assert_eq!(listed[0].size, 3);
        assert_eq!(listed[0].content_type, DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn update_attributes_replaces_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let mut meta = HashMap::new();
        meta.insert("a".to_string(), "1".to_string());
        store.put("k.jpg", body(b"zz"), "image/jpeg", meta).await.unwrap();

        let mut replacement = HashMap::new();
        replacement.insert("b".to_string(), "2".to_string());
        let updated = store
            .update_attributes("k.jpg", Some("image/png".into()), Some(replacement.clone()))
            .await
            .unwrap();
        assert_eq!(updated.content_type, "image/png");
        assert_eq!(updated.metadata, replacement);
    }

    #[tokio::test]
    async fn signed_urls_verify_until_tampered() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let url = store
            .sign_url("a b/c.jpg", SignMethod::Get, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:3000/signed/a%20b/c.jpg?method=GET&expires="));

        let query = url.split('?').nth(1).unwrap();
        let mut params = HashMap::new();
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            params.insert(k.to_string(), v.to_string());
        }
        let request = SignedRequest {
            method: params["method"].clone(),
            expires: params["expires"].parse().unwrap(),
            signature: params["signature"].clone(),
        };
        assert!(store.verify_signed_url("a b/c.jpg", &request));
        assert!(!store.verify_signed_url("a b/other.jpg", &request));

        let wrong_method = SignedRequest {
            method: "DELETE".into(),
            ..request.clone()
        };
        assert!(!store.verify_signed_url("a b/c.jpg", &wrong_method));

        let expired = SignedRequest {
            expires: 0,
            ..request
        };
        assert!(!store.verify_signed_url("a b/c.jpg", &expired));
    }

    #[tokio::test]
    async fn dotted_names_are_not_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store
            .put("trip..final.jpg", body(b"ok"), "image/jpeg", HashMap::new())
            .await
            .unwrap();
        store
            .put("a/...b/c.jpg", body(b"ok"), "image/jpeg", HashMap::new())
            .await
            .unwrap();
        assert!(matches!(
            store.stat("a/../c.jpg").await.unwrap_err(),
            BlobError::InvalidKey(_)
        ));
    }

    #[tokio::test]
    async fn signatures_depend_on_the_secret() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let other = LocalBlobStore::new(dir.path(), "another secret", "http://localhost:3000");
        let url = store
            .sign_url("k.jpg", SignMethod::Get, Duration::from_secs(60))
            .await
            .unwrap();
        let (_, query) = url.split_once('?').unwrap();
        let params: HashMap<&str, &str> =
            query.split('&').filter_map(|p| p.split_once('=')).collect();
        let request = SignedRequest {
            method: params["method"].into(),
            expires: params["expires"].parse().unwrap(),
            signature: params["signature"].into(),
        };
        // 32-byte tag, unpadded url-safe base64.
        assert_eq!(request.signature.len(), 43);
        assert!(store.verify_signed_url("k.jpg", &request));
        assert!(!other.verify_signed_url("k.jpg", &request));

        let garbage = SignedRequest {
            signature: "not base64!".into(),
            ..request
        };
        assert!(!store.verify_signed_url("k.jpg", &garbage));
    }

    fn temp_files(root: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                    found.push(path);
                }
            }
        }
        found
    }

    #[tokio::test]
    async fn failed_upload_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let broken: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"part")),
            Err(io::Error::other("client went away")),
        ]));
        assert!(store.put("a.jpg", broken, "image/jpeg", HashMap::new()).await.is_err());
        assert!(temp_files(dir.path()).is_empty());
        assert!(store.stat("a.jpg").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn cancelled_upload_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let stalled: ByteStream = Box::pin(
            futures::stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"part"))])
                .chain(futures::stream::pending()),
        );
        let upload = store.put("a.jpg", stalled, "image/jpeg", HashMap::new());
        assert!(tokio::time::timeout(Duration::from_millis(50), upload).await.is_err());
        assert!(temp_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn probe_succeeds_on_writable_dir() {
        let dir = tempfile::tempdir().unwrap();
        store(&dir).probe().await.unwrap();
    }
}
