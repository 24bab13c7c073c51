use std::{
    collections::HashMap,
    ops::{Index, IndexMut},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// One physical file under management.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub local_path: PathBuf,
    /// Logical destination key, before any hash prefix.
    pub remote_path: String,
    /// Final key, filled in once the upload succeeded.
    pub uploaded_path: Option<String>,
}

impl FileRef {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(local_path: P, remote_path: S) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            uploaded_path: None,
        }
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        self.local_path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Position of a [`FileRef`] inside a [`FileSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(usize);

impl FileId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Arena of the dependency files of one deploy, deduplicated by local path.
///
/// Built single-threaded while HTML is resolved, then frozen: upload tasks
/// only ever receive `(FileId, &FileRef)` pairs and hand their result back to
/// the owner, which records it with [`FileSet::set_uploaded`].
#[derive(Debug, Default)]
pub struct FileSet {
    files: Vec<FileRef>,
    by_local: HashMap<PathBuf, FileId>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of the file at `local_path`, inserting it with
    /// `remote_path` if it is not known yet. The first remote path wins.
    pub fn intern(&mut self, local_path: PathBuf, remote_path: String) -> FileId {
        if let Some(id) = self.by_local.get(&local_path) {
            return *id;
        }

        let id = FileId(self.files.len());
        self.by_local.insert(local_path.clone(), id);
        self.files.push(FileRef::new(local_path, remote_path));
        id
    }

    pub fn get(&self, local_path: &Path) -> Option<FileId> {
        self.by_local.get(local_path).copied()
    }

    pub fn contains(&self, local_path: &Path) -> bool {
        self.by_local.contains_key(local_path)
    }

    pub fn set_uploaded(&mut self, id: FileId, uploaded_path: String) {
        self.files[id.0].uploaded_path = Some(uploaded_path);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &FileRef)> {
        self.files.iter().enumerate().map(|(i, f)| (FileId(i), f))
    }

    pub fn files(&self) -> &[FileRef] {
        &self.files
    }
}

impl Index<FileId> for FileSet {
    type Output = FileRef;

    fn index(&self, id: FileId) -> &FileRef {
        &self.files[id.0]
    }
}

impl IndexMut<FileId> for FileSet {
    fn index_mut(&mut self, id: FileId) -> &mut FileRef {
        &mut self.files[id.0]
    }
}

/// One textual occurrence of a dependency inside an HTML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInst {
    pub file: FileId,
    /// The attribute value exactly as written in the document.
    pub inst_path: String,
}

/// An HTML page plus its resolved local dependencies.
#[derive(Debug, Clone)]
pub struct HtmlFile {
    pub file: FileRef,
    pub dependencies: Vec<FileInst>,
    /// Effective `<base href>`, trailing slash removed.
    pub base: String,
}

/// Headers stored alongside an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub cache_control: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_encoding: String,
    pub acl: String,
}

impl ObjectMetadata {
    pub const PUBLIC_READ: &'static str = "public-read";

    pub fn public(cache_seconds: u64, content_type: &str, content_encoding: &str) -> Self {
        Self {
            cache_control: format!("public, max-age={cache_seconds}"),
            content_type: content_type.to_string(),
            content_encoding: content_encoding.to_string(),
            acl: Self::PUBLIC_READ.to_string(),
        }
    }
}
