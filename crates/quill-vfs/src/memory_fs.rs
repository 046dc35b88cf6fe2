use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::fs::FileSystem;
use crate::path::normalize_path;

type ReadHook = Box<dyn Fn(&Path) + Send + Sync>;

#[derive(Debug, Clone)]
struct FileEntry {
    content: String,
    /// When set, `file_size` reports this instead of the content length.
    size_override: Option<u64>,
}

#[derive(Default)]
struct MemoryFsState {
    files: BTreeMap<PathBuf, FileEntry>,
}

/// Deterministic in-memory file system for tests.
///
/// Directories are implicit: any strict ancestor of a stored file path is a
/// directory. Tests can override the reported size of individual files
/// (without giving them content) and install a read hook that observes every
/// `read_to_string` call, which is how the event-before-config-read ordering
/// contract is verified.
#[derive(Default)]
pub struct MemoryFs {
    state: Mutex<MemoryFsState>,
    on_read: Mutex<Option<ReadHook>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a file.
    pub fn write_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = normalize_path(path.as_ref());
        let mut state = self.state.lock();
        let size_override = state
            .files
            .get(&path)
            .and_then(|entry| entry.size_override);
        state.files.insert(
            path,
            FileEntry {
                content: content.into(),
                size_override,
            },
        );
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) {
        let path = normalize_path(path.as_ref());
        self.state.lock().files.remove(&path);
    }

    /// Overrides the size reported for `path`, independent of its content.
    pub fn set_file_size(&self, path: impl AsRef<Path>, size: u64) {
        let path = normalize_path(path.as_ref());
        let mut state = self.state.lock();
        match state.files.get_mut(&path) {
            Some(entry) => entry.size_override = Some(size),
            None => {
                state.files.insert(
                    path,
                    FileEntry {
                        content: String::new(),
                        size_override: Some(size),
                    },
                );
            }
        }
    }

    /// Installs a hook invoked with the path of every `read_to_string` call.
    pub fn set_read_hook(&self, hook: impl Fn(&Path) + Send + Sync + 'static) {
        *self.on_read.lock() = Some(Box::new(hook));
    }

    pub fn clear_read_hook(&self) {
        *self.on_read.lock() = None;
    }

    fn is_implicit_dir(state: &MemoryFsState, path: &Path) -> bool {
        state
            .files
            .keys()
            .any(|file| file.parent().is_some_and(|parent| parent.starts_with(path)))
    }
}

impl FileSystem for MemoryFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let path = normalize_path(path);
        if let Some(hook) = self.on_read.lock().as_ref() {
            hook(&path);
        }
        self.state
            .lock()
            .files
            .get(&path)
            .map(|entry| entry.content.clone())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("{}", path.display()))
            })
    }

    fn exists(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        let state = self.state.lock();
        state.files.contains_key(&path) || Self::is_implicit_dir(&state, &path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        let state = self.state.lock();
        !state.files.contains_key(&path) && Self::is_implicit_dir(&state, &path)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        let path = normalize_path(path);
        self.state
            .lock()
            .files
            .get(&path)
            .map(|entry| {
                entry
                    .size_override
                    .unwrap_or(entry.content.len() as u64)
            })
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("{}", path.display()))
            })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let path = normalize_path(path);
        let state = self.state.lock();
        if !Self::is_implicit_dir(&state, &path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}", path.display()),
            ));
        }

        // Immediate children only: truncate every file under `path` to one
        // component past it.
        let mut children = BTreeSet::new();
        for file in state.files.keys() {
            if let Ok(rel) = file.strip_prefix(&path) {
                if let Some(first) = rel.components().next() {
                    children.insert(path.join(first.as_os_str()));
                }
            }
        }
        Ok(children.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn size_override_wins_over_content_length() {
        let fs = MemoryFs::new();
        fs.write_file("/a/app.js", "let x = 1;");
        assert_eq!(fs.file_size(Path::new("/a/app.js")).unwrap(), 10);

        fs.set_file_size("/a/app.js", 4096);
        assert_eq!(fs.file_size(Path::new("/a/app.js")).unwrap(), 4096);

        // Rewriting content keeps the override.
        fs.write_file("/a/app.js", "let x = 2; let y = 3;");
        assert_eq!(fs.file_size(Path::new("/a/app.js")).unwrap(), 4096);
    }

    #[test]
    fn implicit_directories() {
        let fs = MemoryFs::new();
        fs.write_file("/a/b/c.ts", "");
        assert!(fs.exists(Path::new("/a")));
        assert!(fs.is_dir(Path::new("/a/b")));
        assert!(!fs.is_dir(Path::new("/a/b/c.ts")));
        assert_eq!(
            fs.read_dir(Path::new("/a")).unwrap(),
            vec![PathBuf::from("/a/b")]
        );
    }

    #[test]
    fn read_hook_observes_reads() {
        let fs = MemoryFs::new();
        fs.write_file("/a/tsconfig.json", "{}");
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        fs.set_read_hook(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        fs.read_to_string(Path::new("/a/tsconfig.json")).unwrap();
        fs.read_to_string(Path::new("/a/tsconfig.json")).unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn paths_are_normalized_on_insert_and_lookup() {
        let fs = MemoryFs::new();
        fs.write_file("/a/./b/../app.ts", "x");
        assert!(fs.exists(Path::new("/a/app.ts")));
        assert_eq!(fs.read_to_string(Path::new("/a/app.ts")).unwrap(), "x");
    }
}
