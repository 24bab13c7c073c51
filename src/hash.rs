//! Content hashing for uploaded names and deploy versions.
//!
//! Version ids are the XOR of per-file digests, so they do not depend on the
//! order files were discovered in. XOR lets two swapped files cancel out; that
//! is acceptable for naming a deploy and changing it would change every id
//! already handed out.

use std::{io, path::Path};

use crate::reader;

/// Length of the hex prefix used both for hashed file names and version ids.
pub const PREFIX_LEN: usize = 12;

pub fn hash_bytes(data: &[u8]) -> [u8; 16] {
    md5::compute(data).0
}

/// First [`PREFIX_LEN`] hex characters of the digest of `data`.
pub fn hash_prefix(data: &[u8]) -> String {
    let mut hex = hex::encode(hash_bytes(data));
    hex.truncate(PREFIX_LEN);
    hex
}

/// Digest of the path string, a newline, then the file contents.
pub fn hash_filepath<P: AsRef<Path>>(path: P) -> io::Result<[u8; 16]> {
    let path = path.as_ref();

    let mut context = md5::Context::new();
    context.consume(path.to_string_lossy().as_bytes());
    context.consume(b"\n");
    context.consume(reader::read_locked(path)?);

    Ok(context.compute().0)
}

/// XOR of [`hash_filepath`] over every path, as minimal-width lowercase hex.
pub fn hash_filepaths<P: AsRef<Path>>(paths: &[P]) -> io::Result<String> {
    let mut acc = 0u128;
    for path in paths {
        acc ^= u128::from_be_bytes(hash_filepath(path)?);
    }

    Ok(format!("{acc:x}"))
}

/// The deploy version id: a [`PREFIX_LEN`]-character prefix of
/// [`hash_filepaths`].
pub fn version_id<P: AsRef<Path>>(paths: &[P]) -> io::Result<String> {
    let mut id = hash_filepaths(paths)?;
    id.truncate(PREFIX_LEN);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn fixture(files: &[(&str, &str)]) -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let paths = files
            .iter()
            .map(|(name, body)| {
                let path = dir.path().join(name);
                std::fs::write(&path, body).unwrap();
                path
            })
            .collect();
        (dir, paths)
    }

    #[test]
    fn hash_prefix_is_md5_hex() {
        assert_eq!(hash_prefix(b""), "d41d8cd98f00");
        assert_eq!(hash_prefix(b"hello").len(), PREFIX_LEN);
    }

    #[test]
    fn filepaths_hash_ignores_order() {
        let (_dir, paths) = fixture(&[
            ("index.html", "<html></html>"),
            ("style.css", "body {}"),
            ("app.js", "console.log(1)"),
        ]);

        let forward = hash_filepaths(&paths).unwrap();
        let mut reversed = paths.clone();
        reversed.reverse();
        let rotated = vec![paths[1].clone(), paths[2].clone(), paths[0].clone()];

        assert_eq!(forward, hash_filepaths(&reversed).unwrap());
        assert_eq!(forward, hash_filepaths(&rotated).unwrap());
    }

    #[test]
    fn path_is_part_of_the_digest() {
        let (_dir, paths) = fixture(&[("a.css", "same"), ("b.css", "same")]);

        assert_ne!(
            hash_filepath(&paths[0]).unwrap(),
            hash_filepath(&paths[1]).unwrap()
        );
    }

    #[test]
    fn single_file_hash_matches_its_digest() {
        let (_dir, paths) = fixture(&[("a.css", "body {}")]);

        let expected = format!("{:x}", u128::from_be_bytes(hash_filepath(&paths[0]).unwrap()));
        assert_eq!(hash_filepaths(&paths).unwrap(), expected);
    }

    #[test]
    fn empty_set_hashes_to_zero() {
        let paths: Vec<PathBuf> = Vec::new();
        assert_eq!(hash_filepaths(&paths).unwrap(), "0");
    }
}
