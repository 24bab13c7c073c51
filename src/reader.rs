use std::{
    fs::File,
    io::{self, Read},
    ops::Deref,
    path::Path,
};

use fs2::FileExt;

/// A file held under a shared advisory lock for as long as it is open.
pub struct FileLock {
    inner: File,
}

impl FileLock {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        FileExt::lock_shared(&file)?;

        Ok(Self { inner: file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.inner);
    }
}

impl Deref for FileLock {
    type Target = File;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Reads a whole file while holding a shared lock on it.
pub fn read_locked<P: AsRef<Path>>(path: P) -> io::Result<Vec<u8>> {
    let lock = FileLock::open(&path)?;

    let mut buffer = Vec::new();
    (&*lock).read_to_end(&mut buffer)?;

    Ok(buffer)
}
