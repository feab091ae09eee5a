//! Durable image storage.
//!
//! The store is addressed with store-relative paths ("i/img_42.jpg")
//! so callers never see the mount point. Writes are verified: the
//! file is synced and its on-disk length compared against the request,
//! and anything short of that is reported so the caller can delete the
//! partial file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not mounted")]
    NotMounted,
    #[error("failed to mount store at {path}: {source}")]
    Mount {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("write to {path} failed: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("short write to {path}: {written} of {expected} bytes")]
    ShortWrite {
        path: String,
        written: u64,
        expected: u64,
    },
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to list {dir}: {source}")]
    List {
        dir: String,
        #[source]
        source: io::Error,
    },
}

/// Name and size of one stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// File name without its directory.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// Trait for the durable image store.
///
/// This abstraction keeps the pipeline testable without a filesystem
/// and keeps remount semantics (the recovery path for open failures)
/// behind one seam.
pub trait DurableStore {
    /// Mounts the store, creating its directory layout if missing.
    fn mount(&mut self) -> Result<(), StoreError>;

    /// Unmounts and mounts again; the recovery path after open failures.
    fn remount(&mut self) -> Result<(), StoreError>;

    /// Writes `bytes` to `path`, replacing any existing file, and
    /// verifies the durable length matches the request.
    fn write_file(&mut self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Removes the file at `path`.
    fn remove(&mut self, path: &str) -> Result<(), StoreError>;

    /// Lists the files directly under `dir`.
    fn list(&self, dir: &str) -> Result<Vec<StoredEntry>, StoreError>;

    /// Removes every file under `dir` whose name ends with `suffix`,
    /// returning the removed paths. Individual removal failures are
    /// logged and skipped so one stuck file cannot abort a sweep.
    fn remove_matching(&mut self, dir: &str, suffix: &str) -> Result<Vec<String>, StoreError> {
        let mut removed = Vec::new();
        for entry in self.list(dir)? {
            if !entry.name.ends_with(suffix) {
                continue;
            }
            let path = format!("{dir}/{}", entry.name);
            match self.remove(&path) {
                Ok(()) => removed.push(path),
                Err(e) => tracing::warn!(path = %path, error = %e, "Sweep could not remove file"),
            }
        }
        Ok(removed)
    }
}

/// Filesystem-backed store rooted at a data directory.
#[derive(Debug)]
pub struct FlashStore {
    root: PathBuf,
    image_dir: String,
    mounted: bool,
}

impl FlashStore {
    /// Creates an unmounted store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, image_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            image_dir: image_dir.into(),
            mounted: false,
        }
    }

    /// Returns the absolute path of the image directory.
    pub fn image_root(&self) -> PathBuf {
        self.root.join(&self.image_dir)
    }

    /// Returns the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl DurableStore for FlashStore {
    fn mount(&mut self) -> Result<(), StoreError> {
        let image_root = self.image_root();
        fs::create_dir_all(&image_root).map_err(|e| StoreError::Mount {
            path: image_root.display().to_string(),
            source: e,
        })?;
        self.mounted = true;
        tracing::debug!(root = %self.root.display(), "Store mounted");
        Ok(())
    }

    fn remount(&mut self) -> Result<(), StoreError> {
        self.mounted = false;
        self.mount()
    }

    fn write_file(&mut self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        if !self.mounted {
            return Err(StoreError::NotMounted);
        }

        let absolute = self.resolve(path);
        let mut file = fs::File::create(&absolute).map_err(|e| StoreError::Open {
            path: path.to_string(),
            source: e,
        })?;
        file.write_all(bytes).map_err(|e| StoreError::Write {
            path: path.to_string(),
            source: e,
        })?;
        file.sync_all().map_err(|e| StoreError::Write {
            path: path.to_string(),
            source: e,
        })?;

        let written = file
            .metadata()
            .map_err(|e| StoreError::Write {
                path: path.to_string(),
                source: e,
            })?
            .len();
        let expected = bytes.len() as u64;
        if written != expected {
            return Err(StoreError::ShortWrite {
                path: path.to_string(),
                written,
                expected,
            });
        }
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), StoreError> {
        if !self.mounted {
            return Err(StoreError::NotMounted);
        }
        fs::remove_file(self.resolve(path)).map_err(|e| StoreError::Remove {
            path: path.to_string(),
            source: e,
        })
    }

    fn list(&self, dir: &str) -> Result<Vec<StoredEntry>, StoreError> {
        if !self.mounted {
            return Err(StoreError::NotMounted);
        }

        let absolute = self.root.join(dir);
        let entries = fs::read_dir(&absolute).map_err(|e| StoreError::List {
            dir: dir.to_string(),
            source: e,
        })?;

        let mut listed = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::List {
                dir: dir.to_string(),
                source: e,
            })?;
            let metadata = entry.metadata().map_err(|e| StoreError::List {
                dir: dir.to_string(),
                source: e,
            })?;
            if !metadata.is_file() {
                continue;
            }
            listed.push(StoredEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
            });
        }
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mounted_store() -> (tempfile::TempDir, FlashStore) {
        let dir = tempdir().unwrap();
        let mut store = FlashStore::new(dir.path(), "i");
        store.mount().unwrap();
        (dir, store)
    }

    #[test]
    fn test_mount_creates_image_dir() {
        let (dir, store) = mounted_store();
        assert!(dir.path().join("i").is_dir());
        assert_eq!(store.image_root(), dir.path().join("i"));
    }

    #[test]
    fn test_write_before_mount_refused() {
        let dir = tempdir().unwrap();
        let mut store = FlashStore::new(dir.path(), "i");
        assert!(matches!(
            store.write_file("i/x.jpg", b"data"),
            Err(StoreError::NotMounted)
        ));
    }

    #[test]
    fn test_write_then_read_back() {
        let (dir, mut store) = mounted_store();
        store.write_file("i/img_1.jpg", b"jpeg bytes").unwrap();
        let on_disk = fs::read(dir.path().join("i/img_1.jpg")).unwrap();
        assert_eq!(on_disk, b"jpeg bytes");
    }

    #[test]
    fn test_remove_missing_file_errors() {
        let (_dir, mut store) = mounted_store();
        assert!(matches!(
            store.remove("i/nope.jpg"),
            Err(StoreError::Remove { .. })
        ));
    }

    #[test]
    fn test_open_failure_when_dir_vanishes() {
        let (dir, mut store) = mounted_store();
        fs::remove_dir_all(dir.path().join("i")).unwrap();
        assert!(matches!(
            store.write_file("i/img_1.jpg", b"x"),
            Err(StoreError::Open { .. })
        ));

        // Remount recreates the layout and the write succeeds.
        store.remount().unwrap();
        store.write_file("i/img_1.jpg", b"x").unwrap();
    }

    #[test]
    fn test_list_reports_files_and_sizes() {
        let (_dir, mut store) = mounted_store();
        store.write_file("i/a.jpg", b"aaa").unwrap();
        store.write_file("i/b.jpg", b"bb").unwrap();

        let entries = store.list("i").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], StoredEntry { name: "a.jpg".into(), size: 3 });
        assert_eq!(entries[1], StoredEntry { name: "b.jpg".into(), size: 2 });
    }

    #[test]
    fn test_remove_matching_only_touches_suffix() {
        let (dir, mut store) = mounted_store();
        store.write_file("i/img_1.jpg", b"a").unwrap();
        store.write_file("i/img_2.jpg", b"b").unwrap();
        store.write_file("i/keep.txt", b"c").unwrap();

        let removed = store.remove_matching("i", ".jpg").unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!dir.path().join("i/img_1.jpg").exists());
        assert!(dir.path().join("i/keep.txt").exists());

        // Idempotent: a second sweep finds nothing.
        assert!(store.remove_matching("i", ".jpg").unwrap().is_empty());
    }
}
