use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::{
    error::{Error, Result},
    html,
    metadata::{FileInst, FileRef, FileSet, HtmlFile},
    path::{clamp, join_path, relative_path, to_slash},
    reader,
};

/// Pages with their dependencies, and the deduplicated dependency arena they
/// point into.
#[derive(Debug, Default)]
pub struct Resolved {
    pub pages: Vec<HtmlFile>,
    pub files: FileSet,
}

impl Resolved {
    /// Every page and every unique dependency, by local path.
    pub fn local_paths(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .map(|(_, f)| f.local_path.clone())
            .chain(self.pages.iter().map(|p| p.file.local_path.clone()))
            .collect()
    }
}

/// Where the references of one page resolve against.
struct Resolution<'a> {
    root: &'a str,
    dest: &'a str,
    /// Page directory relative to the root.
    rel: String,
    base: &'a str,
    real_root: String,
    effective_dest: String,
}

impl<'a> Resolution<'a> {
    fn new(root: &'a str, dest: &'a str, rel: String, base: &'a str) -> Self {
        let mut real_root = join_path(&[root, base]);
        let mut effective_dest = join_path(&[dest, base]);

        if base.starts_with('/') {
            if starts_with_segment(base, &format!("/{dest}")) {
                effective_dest = base.to_string();
            }
            if ends_with_segment(root.trim_end_matches('/'), base) {
                real_root = root.to_string();
            }
        }

        Self {
            root,
            dest,
            rel,
            base,
            real_root,
            effective_dest,
        }
    }

    /// Local file and destination key of one reference.
    fn resolve(&self, reference: &str) -> (PathBuf, String) {
        let (local, remote) = if reference.starts_with('/') {
            (
                join_path(&[self.root, reference]),
                join_path(&[self.dest, reference]),
            )
        } else if self.base.starts_with('/') {
            (
                join_path(&[self.real_root.as_str(), reference]),
                join_path(&[self.effective_dest.as_str(), reference]),
            )
        } else {
            (
                join_path(&[self.root, self.rel.as_str(), self.base, reference]),
                join_path(&[self.dest, self.rel.as_str(), self.base, reference]),
            )
        };

        (PathBuf::from(local), clamp(&remote))
    }
}

fn starts_with_segment(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.is_empty() || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn ends_with_segment(path: &str, suffix: &str) -> bool {
    match path.strip_suffix(suffix) {
        Some(rest) => suffix.starts_with('/') || rest.is_empty() || rest.ends_with('/'),
        None => false,
    }
}

/// Validates and normalizes a `<base href>` value.
fn effective_base(page: &Path, base: Option<String>) -> Result<String> {
    let Some(base) = base else {
        return Ok(String::new());
    };

    let lower = base.to_ascii_lowercase();
    if lower.starts_with("http") || base.starts_with("//") {
        return Err(Error::AbsoluteBase {
            file: page.to_path_buf(),
            base,
        });
    }

    match base.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => Ok(stripped.to_string()),
        _ => Ok(base),
    }
}

/// Parses every page and resolves its local dependencies. A file referenced
/// from several pages, or several times from one page, gets a single entry in
/// [`Resolved::files`].
#[instrument(skip(root, pages), fields(pages = pages.len()), err)]
pub fn resolve_dependencies<P: AsRef<Path>>(
    root: P,
    dest: &str,
    pages: &[&FileRef],
) -> Result<Resolved> {
    let root = root.as_ref();
    let root_str = to_slash(root);

    let mut resolved = Resolved::default();

    for page in pages {
        let doc = reader::read_locked(&page.local_path)?;
        let parsed = html::parse_html(&doc);

        let base = effective_base(&page.local_path, parsed.base)?;

        let dir = page.local_path.parent().unwrap_or(Path::new(""));
        let rel = relative_path(root, dir);

        let resolution = Resolution::new(&root_str, dest, rel, &base);

        let mut dependencies = Vec::with_capacity(parsed.references.len());
        for reference in parsed.references {
            let target = html::strip_query(&reference);
            if target.is_empty() {
                continue;
            }

            let (local, remote) = resolution.resolve(target);
            debug!(
                page = %page.local_path.display(),
                reference = %reference,
                local = %local.display(),
                remote = %remote,
                "resolved"
            );

            let file = resolved.files.intern(local, remote);
            dependencies.push(FileInst {
                file,
                inst_path: reference,
            });
        }

        resolved.pages.push(HtmlFile {
            file: (*page).clone(),
            dependencies,
            base,
        });
    }

    Ok(resolved)
}
