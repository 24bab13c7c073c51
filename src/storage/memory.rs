use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;

use crate::{
    error::{Error, Result},
    metadata::ObjectMetadata,
    storage::{self, CopyFile, UploadFile},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub metadata: ObjectMetadata,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    uploads: Vec<String>,
    copies: Vec<(String, String)>,
    failing_uploads: usize,
}

/// An in-process bucket that records every call made against it.
#[derive(Debug)]
pub struct MemoryStorage {
    state: Mutex<State>,
    max_keys: usize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_keys: storage::MAX_KEYS,
        }
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the next `count` uploads fail with a storage error.
    pub fn fail_uploads(&self, count: usize) {
        self.state().failing_uploads = count;
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    /// Destination of every successful upload, in call order.
    pub fn uploads(&self) -> Vec<String> {
        self.state().uploads.clone()
    }

    /// `(source, dest)` of every successful copy, in call order.
    pub fn copies(&self) -> Vec<(String, String)> {
        self.state().copies.clone()
    }
}

#[async_trait]
impl storage::Storage for MemoryStorage {
    async fn upload_file(&self, file: UploadFile) -> Result<()> {
        let mut state = self.state();

        if state.failing_uploads > 0 {
            state.failing_uploads -= 1;
            return Err(Error::Storage(format!("upload of {} rejected", file.dest)));
        }

        let metadata =
            ObjectMetadata::public(file.cache_seconds, &file.content_type, &file.content_encoding);
        state.uploads.push(file.dest.clone());
        state.objects.insert(
            file.dest,
            StoredObject {
                body: file.body,
                metadata,
            },
        );

        Ok(())
    }

    async fn copy_file(&self, copy: CopyFile) -> Result<()> {
        let mut state = self.state();

        let body = state
            .objects
            .get(&copy.source)
            .map(|o| o.body.clone())
            .ok_or_else(|| Error::Storage(format!("no such object {}", copy.source)))?;

        let metadata =
            ObjectMetadata::public(copy.cache_seconds, &copy.content_type, &copy.content_encoding);
        state.copies.push((copy.source, copy.dest.clone()));
        state.objects.insert(copy.dest, StoredObject { body, metadata });

        Ok(())
    }

    async fn list_bucket_filepaths(&self, prefix: &str) -> Result<Vec<String>> {
        let keys: Vec<String> = self
            .state()
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();

        if keys.len() > self.max_keys {
            return Err(Error::TooManyObjects {
                prefix: prefix.to_string(),
                limit: self.max_keys,
            });
        }

        Ok(keys)
    }
}
