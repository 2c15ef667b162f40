//! Recursive removal that tolerates read-only entries.

use std::fs;
use std::io;
use std::path::Path;

/// Remove `path` and everything below it.
///
/// Read-only files and directories are made writable and the removal is
/// retried. A missing path is not an error.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if meta.is_dir() {
        // Entries cannot be unlinked from a read-only directory.
        make_writable(path, &meta)?;
        for entry in fs::read_dir(path)? {
            remove_tree(&entry?.path())?;
        }
        fs::remove_dir(path)
    } else {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                make_writable(path, &meta)?;
                fs::remove_file(path)
            }
            Err(e) => Err(e),
        }
    }
}

fn make_writable(path: &Path, meta: &fs::Metadata) -> io::Result<()> {
    let mut perms = meta.permissions();
    if perms.readonly() && !meta.file_type().is_symlink() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}
