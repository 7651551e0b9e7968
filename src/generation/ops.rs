//! Directory-level filesystem primitives used by the generation manager

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// The only filesystem operations generation management relies on
pub trait DirectoryOps: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Rename a file or directory; atomic on the same filesystem
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Replace `path` with `contents` so readers see either the old or the new file
    fn write_file_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Read a whole file, `None` if it does not exist
    fn read_file(&self, path: &Path) -> io::Result<Option<Vec<u8>>>;

    fn exists(&self, path: &Path) -> bool;

    /// Names of the subdirectories of `path`; empty if `path` does not exist
    fn list_dirs(&self, path: &Path) -> io::Result<Vec<String>>;
}

/// `std::fs` backed implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDirectoryOps;

impl DirectoryOps for LocalDirectoryOps {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        match fs::remove_dir_all(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)?;
        sync_parent(to);
        Ok(())
    }

    fn write_file_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        let tmp_path = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }

        if let Err(e) = fs::rename(&tmp_path, path) {
            fs::remove_file(&tmp_path).ok();
            return Err(e);
        }
        sync_parent(path);
        Ok(())
    }

    fn read_file(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dirs(&self, path: &Path) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Best-effort fsync of the containing directory so a rename survives a crash
#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            dir.sync_all().ok();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_file_atomic_replaces_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pointer.json");
        let ops = LocalDirectoryOps;

        ops.write_file_atomic(&path, b"one").unwrap();
        ops.write_file_atomic(&path, b"two").unwrap();

        assert_eq!(ops.read_file(&path).unwrap().unwrap(), b"two");
        assert_eq!(ops.list_dirs(temp_dir.path()).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_missing_paths_are_tolerated() {
        let temp_dir = TempDir::new().unwrap();
        let ops = LocalDirectoryOps;
        let missing = temp_dir.path().join("missing");

        assert!(ops.read_file(&missing).unwrap().is_none());
        assert!(ops.list_dirs(&missing).unwrap().is_empty());
        assert!(ops.remove_dir_all(&missing).is_ok());
    }
}
