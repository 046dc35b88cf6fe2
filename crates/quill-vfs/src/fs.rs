use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File system abstraction for Quill.
///
/// The trait is intentionally small so it can be implemented for different
/// backends (local FS, in-memory test hosts).
pub trait FileSystem: Send + Sync {
    /// Reads the file contents as UTF-8 text.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Returns whether a path exists (file or directory).
    fn exists(&self, path: &Path) -> bool;

    /// Returns whether a path is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Returns the size of a file in bytes.
    ///
    /// Size is an authoritative external fact: callers must not recompute it
    /// from content (the host may report a size that differs from the bytes
    /// it serves, e.g. for lazily materialized files).
    fn file_size(&self, path: &Path) -> io::Result<u64>;

    /// Lists immediate directory entries (files and subdirectories).
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Local OS file system implementation.
#[derive(Debug, Clone, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            out.push(entry.path());
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn local_fs_reports_metadata_size() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.ts");
        let mut f = fs::File::create(&file).unwrap();
        f.write_all(b"export class A {}").unwrap();

        let fs = LocalFs::new();
        assert!(fs.exists(&file));
        assert!(!fs.is_dir(&file));
        assert_eq!(fs.file_size(&file).unwrap(), 17);
        assert_eq!(fs.read_to_string(&file).unwrap(), "export class A {}");
    }

    #[test]
    fn local_fs_lists_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::File::create(dir.path().join("b.ts")).unwrap();
        fs::File::create(dir.path().join("a.ts")).unwrap();

        let fs = LocalFs::new();
        let entries = fs.read_dir(dir.path()).unwrap();
        assert_eq!(
            entries,
            vec![dir.path().join("a.ts"), dir.path().join("b.ts")]
        );
    }
}
