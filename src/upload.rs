use std::{
    io::{self, Write},
    path::Path,
};

use flate2::{Compression, write::GzEncoder};
use futures::{StreamExt, TryStreamExt, future::try_join_all, stream};
use tracing::{info, instrument, warn};

use crate::{
    error::{Error, Result},
    hash, html,
    metadata::{FileRef, FileSet, HtmlFile},
    path::{clamp, join_path, relative_key, relative_path},
    reader,
    retry::{Backoff, retry_notify},
    storage::{CopyFile, Storage, UploadFile},
};

/// Cache lifetime of objects that a later deploy may overwrite.
pub const LIMITED: u64 = 60;
/// Cache lifetime of content-addressed objects.
pub const FOREVER: u64 = 31_556_926;

pub const UPLOAD_WORKERS: usize = 20;

/// Extensions of formats that are already compressed.
const NO_GZIP: &[&str] = &["mp4", "webm", "ogg"];

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.').map(|(_, ext)| ext)
}

pub fn should_compress(path: &str) -> bool {
    !extension(path).is_some_and(|ext| NO_GZIP.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// True for keys of HTML pages, whatever the case of the extension.
pub fn is_html(key: &str) -> bool {
    extension(key).is_some_and(|ext| ext.eq_ignore_ascii_case("html"))
}

pub fn content_encoding(path: &str) -> &'static str {
    if should_compress(path) { "gzip" } else { "" }
}

pub fn guess_content_type(path: &str) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    let textual = mime.type_().as_str() == "text"
        || matches!(mime.essence_str(), "application/javascript" | "application/json");

    if textual {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}

pub fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Key for `path` (relative to `dest`), with the hash prefix put in front of
/// the file name when `include_hash` is set.
pub fn destination(dest: &str, path: &str, include_hash: bool, hash_prefix: &str) -> String {
    let key = if include_hash {
        let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));
        join_path(&[dest, dir, format!("{hash_prefix}_{name}").as_str()])
    } else {
        join_path(&[dest, path])
    };

    clamp(&key)
}

#[derive(Debug)]
pub struct UploadRequest<'a> {
    pub body: Vec<u8>,
    /// Path of the object relative to `dest`.
    pub path: &'a str,
    pub dest: &'a str,
    pub include_hash: bool,
    pub cache_seconds: u64,
}

/// Pushes files to a [`Storage`] with compression, content addressing and
/// retries.
pub struct Uploader<S> {
    storage: S,
    backoff: Backoff,
    workers: usize,
}

impl<S: Storage> Uploader<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            backoff: Backoff::default(),
            workers: UPLOAD_WORKERS,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Uploads one body and returns the key it was stored under.
    pub async fn upload_file_to_provider(&self, req: UploadRequest<'_>) -> Result<String> {
        let compress = should_compress(req.path);
        let body = if compress { gzip(&req.body)? } else { req.body };

        let hash_prefix = hash::hash_prefix(&body);
        let dest = destination(req.dest, req.path, req.include_hash, &hash_prefix);

        info!(dest = %dest, hash = %hash_prefix, cache_seconds = req.cache_seconds, "uploading");

        let file = UploadFile {
            dest: dest.clone(),
            body,
            cache_seconds: req.cache_seconds,
            content_type: guess_content_type(&dest),
            content_encoding: content_encoding(req.path).to_string(),
        };

        retry_notify(
            &self.backoff,
            || self.storage.upload_file(file.clone()),
            |err, next| warn!(dest = %dest, "error uploading: {err}, retrying in {next:?}"),
        )
        .await
        .map_err(|e| Error::Upload {
            path: dest.clone(),
            source: Box::new(e),
        })?;

        Ok(dest)
    }

    async fn write_file(&self, dest: &str, include_hash: bool, file: &FileRef) -> Result<String> {
        let body = reader::read_locked(&file.local_path)?;

        let cache_seconds = if include_hash { FOREVER } else { LIMITED };
        let partial = relative_key(dest, &file.remote_path);

        self.upload_file_to_provider(UploadRequest {
            body,
            path: &partial,
            dest,
            include_hash,
            cache_seconds,
        })
        .await
    }

    /// Uploads `files` over the worker pool and returns their keys in input
    /// order. The first failure aborts the whole batch.
    ///
    /// HTML may only go out hashed; asking for an unhashed HTML upload fails
    /// before anything is sent.
    #[instrument(skip(self, files), fields(files = files.len()), err)]
    pub async fn deploy_files(
        &self,
        dest: &str,
        include_hash: bool,
        files: &[&FileRef],
    ) -> Result<Vec<String>> {
        if !include_hash {
            if let Some(html) = files
                .iter()
                .find(|f| is_html(&f.remote_path))
            {
                return Err(Error::UnversionedHtml {
                    path: html.remote_path.clone(),
                });
            }
        }

        stream::iter(files.iter().map(|file| self.write_file(dest, include_hash, file)))
            .buffered(self.workers)
            .try_collect()
            .await
    }

    /// Uploads every entry of `files` hashed and records where each went.
    pub async fn deploy_dependencies(&self, dest: &str, files: &mut FileSet) -> Result<()> {
        let uploaded = {
            let refs: Vec<&FileRef> = files.files().iter().collect();
            self.deploy_files(dest, true, &refs).await?
        };

        let ids: Vec<_> = files.iter().map(|(id, _)| id).collect();
        for (id, path) in ids.into_iter().zip(uploaded) {
            files.set_uploaded(id, path);
        }

        Ok(())
    }

    /// Renders `page` against the uploaded dependencies, stores it under the
    /// version directory and aliases it to its live path.
    #[instrument(skip(self, root, page, files), fields(page = %page.file.local_path.display()), err)]
    pub async fn deploy_html(
        &self,
        root: &Path,
        dest: &str,
        id: &str,
        page: &HtmlFile,
        files: &FileSet,
    ) -> Result<()> {
        let doc = reader::read_locked(&page.file.local_path)?;
        let rendered = html::render_html(&doc, page, files);

        let internal = clamp(&relative_path(root, &page.file.local_path));
        let from_path = join_path(&[dest, id, internal.as_str()]);
        let to_path = join_path(&[dest, internal.as_str()]);

        let from_path = self
            .upload_file_to_provider(UploadRequest {
                body: rendered,
                path: &from_path,
                dest: "",
                include_hash: false,
                cache_seconds: FOREVER,
            })
            .await?;

        info!(from = %from_path, to = %to_path, "copying");

        self.storage
            .copy_file(CopyFile {
                source: from_path.clone(),
                dest: to_path,
                cache_seconds: LIMITED,
                content_type: HTML_CONTENT_TYPE.to_string(),
                content_encoding: content_encoding(&from_path).to_string(),
            })
            .await
    }

    /// Runs [`Uploader::deploy_html`] for every page at once.
    pub async fn deploy_pages(
        &self,
        root: &Path,
        dest: &str,
        id: &str,
        pages: &[HtmlFile],
        files: &FileSet,
    ) -> Result<()> {
        try_join_all(
            pages
                .iter()
                .map(|page| self.deploy_html(root, dest, id, page, files)),
        )
        .await?;

        Ok(())
    }
}
