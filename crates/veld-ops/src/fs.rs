//! The filesystem effects the engine is allowed to perform.

use std::fs;
use std::io;
use std::path::Path;

/// Mutating filesystem primitives used when applying operations.
///
/// Planning reads the filesystem directly; only the effects go through this
/// trait, so a wrapper can inject failures between steps.
pub trait FileSystem: Send + Sync + std::fmt::Debug {
    /// Copy a file or a whole directory tree to a path that does not exist.
    ///
    /// Returns the number of bytes copied.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Rename within one filesystem.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Remove a file, a symlink, or a directory with everything below it.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Send a path to the platform trash.
    fn trash(&self, path: &Path) -> io::Result<()>;

    /// Create a single directory; its parent must exist.
    fn create_dir(&self, path: &Path) -> io::Result<()>;
}

/// The local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let file_type = fs::symlink_metadata(from)?.file_type();
        if file_type.is_dir() {
            copy_dir_recursive(from, to)
        } else if file_type.is_symlink() {
            copy_symlink(from, to)
        } else {
            fs::copy(from, to)
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        if fs::symlink_metadata(path)?.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn trash(&self, path: &Path) -> io::Result<()> {
        trash::delete(path).map_err(|e| io::Error::other(e.to_string()))
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }
}

/// Check whether anything, including a dangling symlink, occupies `path`.
pub(crate) fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Recursively copy a directory.
fn copy_dir_recursive(source: &Path, dest: &Path) -> io::Result<u64> {
    fs::create_dir_all(dest)?;

    let mut total_bytes = 0u64;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry.file_type()?;

        total_bytes += if file_type.is_dir() {
            copy_dir_recursive(&path, &dest_path)?
        } else if file_type.is_symlink() {
            copy_symlink(&path, &dest_path)?
        } else {
            fs::copy(&path, &dest_path)?
        };
    }

    Ok(total_bytes)
}

#[cfg(unix)]
fn copy_symlink(source: &Path, dest: &Path) -> io::Result<u64> {
    let target = fs::read_link(source)?;
    std::os::unix::fs::symlink(target, dest)?;
    Ok(0)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, dest: &Path) -> io::Result<u64> {
    fs::copy(source, dest)
}
