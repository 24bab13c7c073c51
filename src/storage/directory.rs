use std::{
    fmt::Debug,
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{fs, sync::RwLock};
use tracing::instrument;
use walkdir::WalkDir;

use crate::{
    error::{Error, Result},
    metadata::ObjectMetadata,
    path::{clean, relative_path},
    storage::{self, CopyFile, UploadFile},
};

/// Directory under the bucket root holding one JSON metadata file per object.
pub const META_DIR: &str = ".stout-meta";

/// A bucket kept in a local directory, e.g. one served by a static web
/// server or synced to a CDN origin.
///
/// Bodies are written to a temporary name and renamed into place, so a
/// reader never sees a partial object.
#[derive(Debug)]
pub struct DirectoryStorage {
    root: PathBuf,
    max_keys: usize,
    lock: RwLock<()>,
}

impl DirectoryStorage {
    #[instrument(err)]
    pub async fn new<P: Into<PathBuf> + Debug>(path: P) -> Result<Self> {
        let root = path.into();
        fs::create_dir_all(&root).await?;

        Ok(Self {
            root,
            max_keys: storage::MAX_KEYS,
            lock: RwLock::new(()),
        })
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let cleaned = clean(key);
        if cleaned.is_empty()
            || cleaned.starts_with('/')
            || cleaned.starts_with("..")
            || cleaned == META_DIR
            || cleaned.starts_with(&format!("{META_DIR}/"))
        {
            return Err(Error::Storage(format!("invalid object key {key:?}")));
        }

        Ok(self.root.join(cleaned))
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{}.json", clean(key)))
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let _guard = self.lock.read().await;
        Ok(fs::read(self.object_path(key)?).await?)
    }

    pub async fn metadata(&self, key: &str) -> Result<ObjectMetadata> {
        let _guard = self.lock.read().await;
        let raw = fs::read(self.metadata_path(key)).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn write_atomic(path: &Path, body: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, body).await?;
        fs::rename(&tmp, path).await
    }

    async fn write_metadata(&self, key: &str, metadata: &ObjectMetadata) -> Result<()> {
        let raw = serde_json::to_vec_pretty(metadata)?;
        Self::write_atomic(&self.metadata_path(key), &raw).await?;
        Ok(())
    }
}

#[async_trait]
impl storage::Storage for DirectoryStorage {
    #[instrument(skip(self, file), fields(dest = %file.dest, len = file.body.len()), err)]
    async fn upload_file(&self, file: UploadFile) -> Result<()> {
        let path = self.object_path(&file.dest)?;
        let metadata =
            ObjectMetadata::public(file.cache_seconds, &file.content_type, &file.content_encoding);

        let _guard = self.lock.read().await;
        Self::write_atomic(&path, &file.body).await?;
        self.write_metadata(&file.dest, &metadata).await
    }

    #[instrument(skip(self, copy), fields(source = %copy.source, dest = %copy.dest), err)]
    async fn copy_file(&self, copy: CopyFile) -> Result<()> {
        let source = self.object_path(&copy.source)?;
        let dest = self.object_path(&copy.dest)?;
        let metadata =
            ObjectMetadata::public(copy.cache_seconds, &copy.content_type, &copy.content_encoding);

        let _guard = self.lock.read().await;
        let body = fs::read(&source).await?;
        Self::write_atomic(&dest, &body).await?;
        self.write_metadata(&copy.dest, &metadata).await
    }

    #[instrument(skip(self), err)]
    async fn list_bucket_filepaths(&self, prefix: &str) -> Result<Vec<String>> {
        let _guard = self.lock.write().await;

        let root = self.root.clone();
        let keys = tokio::task::spawn_blocking(move || -> io::Result<Vec<String>> {
            let mut keys = Vec::new();
            let walker = WalkDir::new(&root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() != 1 || e.file_name() != META_DIR);

            for entry in walker {
                let entry = entry.map_err(io::Error::from)?;
                if entry.file_type().is_dir() {
                    continue;
                }
                keys.push(relative_path(&root, entry.path()));
            }

            Ok(keys)
        })
        .await
        .map_err(io::Error::other)??;

        let keys: Vec<String> = keys.into_iter().filter(|k| k.starts_with(prefix)).collect();

        if keys.len() > self.max_keys {
            return Err(Error::TooManyObjects {
                prefix: prefix.to_string(),
                limit: self.max_keys,
            });
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn upload(dest: &str, body: &[u8]) -> UploadFile {
        UploadFile {
            dest: dest.to_string(),
            body: body.to_vec(),
            cache_seconds: 60,
            content_type: "text/css; charset=utf-8".to_string(),
            content_encoding: String::new(),
        }
    }

    #[tokio::test]
    async fn upload_writes_body_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path()).await.unwrap();

        storage.upload_file(upload("site/a.css", b"body {}")).await.unwrap();

        assert_eq!(storage.read("site/a.css").await.unwrap(), b"body {}");
        let metadata = storage.metadata("site/a.css").await.unwrap();
        assert_eq!(metadata.cache_control, "public, max-age=60");
        assert_eq!(metadata.acl, ObjectMetadata::PUBLIC_READ);
    }

    #[tokio::test]
    async fn copy_replaces_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path()).await.unwrap();
        storage.upload_file(upload("v1/index.html", b"<p>1</p>")).await.unwrap();

        storage
            .copy_file(CopyFile {
                source: "v1/index.html".into(),
                dest: "index.html".into(),
                cache_seconds: 60,
                content_type: "text/html; charset=utf-8".into(),
                content_encoding: "gzip".into(),
            })
            .await
            .unwrap();

        assert_eq!(storage.read("index.html").await.unwrap(), b"<p>1</p>");
        let metadata = storage.metadata("index.html").await.unwrap();
        assert_eq!(metadata.content_type, "text/html; charset=utf-8");
        assert_eq!(metadata.content_encoding, "gzip");
    }

    #[tokio::test]
    async fn copy_of_missing_object_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path()).await.unwrap();

        let result = storage
            .copy_file(CopyFile {
                source: "nope.html".into(),
                dest: "index.html".into(),
                cache_seconds: 60,
                content_type: String::new(),
                content_encoding: String::new(),
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn listing_filters_by_prefix_and_hides_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path()).await.unwrap();
        for key in ["site/abc/index.html", "site/abc/blog/post.html", "site/index.html"] {
            storage.upload_file(upload(key, b"x")).await.unwrap();
        }

        let keys = storage.list_bucket_filepaths("site/abc/").await.unwrap();

        assert_eq!(keys, vec!["site/abc/blog/post.html", "site/abc/index.html"]);
    }

    #[tokio::test]
    async fn listing_past_the_page_limit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path()).await.unwrap().with_max_keys(2);
        for key in ["v/a.html", "v/b.html", "v/c.html"] {
            storage.upload_file(upload(key, b"x")).await.unwrap();
        }

        let err = storage.list_bucket_filepaths("v/").await.unwrap_err();
        assert!(matches!(err, Error::TooManyObjects { limit: 2, .. }));
    }

    #[tokio::test]
    async fn escaping_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path()).await.unwrap();

        assert!(storage.upload_file(upload("../outside", b"x")).await.is_err());
        assert!(storage.upload_file(upload(".stout-meta/x", b"x")).await.is_err());
    }
}
