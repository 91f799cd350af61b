//! Filesystem helpers

use std::fs;
use std::io;
use std::path::Path;

/// Recursively delete `path`, tolerating read-only entries.
///
/// Version-control metadata inside extracted source trees is sometimes
/// read-only, which makes a plain `remove_dir_all` fail on Windows. On failure
/// every entry is made writable and the delete is retried once.
pub fn remove_dir_all_forced(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            log::debug!(
                "Problem removing {} ({}), attempting to make writable",
                path.display(),
                e
            );
            clear_readonly(path)?;
            fs::remove_dir_all(path)
        }
    }
}

#[allow(clippy::permissions_set_readonly_false)]
fn clear_readonly(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Ok(());
    }

    let mut permissions = metadata.permissions();
    if permissions.readonly() {
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)?;
    }

    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            clear_readonly(&entry?.path())?;
        }
    }
    Ok(())
}

/// True when both paths resolve to the same file on disk
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
