use async_trait::async_trait;

pub use directory::DirectoryStorage;
pub use memory::MemoryStorage;

use crate::error::Result;

mod directory;
mod memory;

/// Listing page size backends are expected to support.
pub const MAX_KEYS: usize = 1000;

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub dest: String,
    pub body: Vec<u8>,
    pub cache_seconds: u64,
    pub content_type: String,
    pub content_encoding: String,
}

#[derive(Debug, Clone)]
pub struct CopyFile {
    pub source: String,
    pub dest: String,
    pub cache_seconds: u64,
    pub content_type: String,
    pub content_encoding: String,
}

/// The operations deploy and rollback need from a bucket. Every object is
/// written publicly readable.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Idempotent put.
    async fn upload_file(&self, file: UploadFile) -> Result<()>;

    /// Server-side copy that replaces the metadata of the destination.
    async fn copy_file(&self, copy: CopyFile) -> Result<()>;

    /// Every key under `prefix`. Fails with
    /// [`Error::TooManyObjects`](crate::error::Error::TooManyObjects) rather
    /// than returning a truncated listing.
    async fn list_bucket_filepaths(&self, prefix: &str) -> Result<Vec<String>>;
}

#[async_trait]
impl<S: Storage + ?Sized> Storage for std::sync::Arc<S> {
    async fn upload_file(&self, file: UploadFile) -> Result<()> {
        (**self).upload_file(file).await
    }

    async fn copy_file(&self, copy: CopyFile) -> Result<()> {
        (**self).copy_file(copy).await
    }

    async fn list_bucket_filepaths(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list_bucket_filepaths(prefix).await
    }
}
