use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
};

use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::{
    error::{Error, Result},
    metadata::FileRef,
    path::{clamp, join_path, relative_path, to_slash},
};

/// Patterns carrying this prefix are taken as-is instead of under the root.
pub const ROOT_ESCAPE: &str = "-/";

/// Expands a comma separated list of glob patterns into files. Directories
/// are walked recursively. A file matched by several patterns is listed once,
/// at its first position, and a pattern matching nothing is an error.
#[instrument(skip(root), err)]
pub fn expand_files<P: AsRef<Path>>(root: P, patterns: &str) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();

    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for pattern in patterns.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let full = match pattern.strip_prefix(ROOT_ESCAPE) {
            Some(rest) => rest.to_string(),
            None => to_slash(root.join(pattern)),
        };

        let mut matched = 0usize;
        for entry in glob::glob(&full)? {
            let path = entry.map_err(io::Error::from)?;

            if path.is_dir() {
                for file in WalkDir::new(&path).sort_by_file_name() {
                    let file = file.map_err(io::Error::from)?;
                    if file.file_type().is_dir() {
                        continue;
                    }

                    matched += 1;
                    let file = file.into_path();
                    if seen.insert(file.clone()) {
                        out.push(file);
                    }
                }
            } else {
                matched += 1;
                if seen.insert(path.clone()) {
                    out.push(path);
                }
            }
        }

        debug!(pattern, matched, "expanded pattern");
        if matched == 0 {
            return Err(Error::NoMatches {
                pattern: pattern.to_string(),
            });
        }
    }

    Ok(out)
}

/// Discovers files and maps each to its key under `dest`.
pub fn list_files<P: AsRef<Path>>(
    root: P,
    patterns: &str,
    dest: &str,
) -> Result<Vec<FileRef>> {
    let root = root.as_ref();

    let files = expand_files(root, patterns)?
        .into_iter()
        .map(|path| {
            let remote = remote_path(root, &path, dest);
            FileRef::new(path, remote)
        })
        .collect();

    Ok(files)
}

/// `dest` joined with the path of `path` relative to `root`, clamped so it
/// never climbs above `dest`.
pub fn remote_path(root: &Path, path: &Path, dest: &str) -> String {
    let rel = relative_path(root, path);
    clamp(&join_path(&[dest, clamp(&rel).as_str()]))
}

pub fn files_with_extension<'a>(files: &'a [FileRef], ext: &str) -> Vec<&'a FileRef> {
    files.iter().filter(|f| f.has_extension(ext)).collect()
}

/// Every file of `full` whose local path is not in `removed`.
pub fn ignore_files<'a, I>(full: &'a [FileRef], removed: I) -> Vec<&'a FileRef>
where
    I: IntoIterator,
    I::Item: AsRef<Path>,
{
    let removed: HashSet<String> = removed
        .into_iter()
        .map(|p| join_path(&[to_slash(p)]))
        .collect();

    full.iter()
        .filter(|f| !removed.contains(&join_path(&[to_slash(&f.local_path)])))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("assets/img")).unwrap();
        fs::write(root.join("index.html"), "<html></html>").unwrap();
        fs::write(root.join("about.html"), "<html></html>").unwrap();
        fs::write(root.join("assets/site.css"), "body {}").unwrap();
        fs::write(root.join("assets/img/logo.png"), [0u8; 4]).unwrap();
        dir
    }

    fn names(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files.iter().map(|f| relative_path(root, f)).collect()
    }

    #[test]
    fn expands_globs_and_directories() {
        let dir = site();
        let files = expand_files(dir.path(), "*.html,assets").unwrap();

        assert_eq!(
            names(dir.path(), &files),
            vec!["about.html", "index.html", "assets/img/logo.png", "assets/site.css"]
        );
    }

    #[test]
    fn overlapping_patterns_list_a_file_once() {
        let dir = site();
        let files = expand_files(dir.path(), "index.html, *.html").unwrap();

        assert_eq!(names(dir.path(), &files), vec!["index.html", "about.html"]);
    }

    #[test]
    fn unmatched_pattern_is_fatal() {
        let dir = site();
        let err = expand_files(dir.path(), "*.html,*.txt").unwrap_err();
        assert!(matches!(err, Error::NoMatches { pattern } if pattern == "*.txt"));
    }

    #[test]
    fn escaped_pattern_is_not_rooted() {
        let dir = site();
        let pattern = format!("{}{}", ROOT_ESCAPE, to_slash(dir.path().join("index.html")));

        let files = expand_files("/nonexistent-root", &pattern).unwrap();
        assert_eq!(files, vec![dir.path().join("index.html")]);
    }

    #[test]
    fn remote_paths_live_under_dest() {
        let dir = site();
        let files = list_files(dir.path(), "assets", "site").unwrap();

        let remotes: Vec<_> = files.iter().map(|f| f.remote_path.as_str()).collect();
        assert_eq!(remotes, vec!["site/assets/img/logo.png", "site/assets/site.css"]);
    }

    #[test]
    fn remote_path_is_clamped() {
        let root = Path::new("build/www");
        let outside = Path::new("build/assets/logo.png");

        assert_eq!(remote_path(root, outside, "site"), "site/assets/logo.png");
        assert_eq!(remote_path(root, outside, "./"), "assets/logo.png");
    }

    #[test]
    fn partitions_html_from_the_rest() {
        let dir = site();
        let files = list_files(dir.path(), "*.html,assets", "").unwrap();

        let html = files_with_extension(&files, "html");
        assert_eq!(html.len(), 2);

        let rest = ignore_files(&files, html.iter().map(|f| &f.local_path));
        let rest: Vec<_> = rest.iter().map(|f| f.remote_path.as_str()).collect();
        assert_eq!(rest, vec!["assets/img/logo.png", "assets/site.css"]);
    }
}
