//! Local directory store

use crate::archive::ArchiveStore;
use crate::capability::{Backend, Capabilities, FileHandle, Handle};
use crate::format::is_supported_archive;
use crate::staging::{Stager, Staged};
use crate::{path, Entry, Result, Store, VfsError};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Serves an on-disk directory
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    /// Set when the directory is a clone or extraction this store owns
    staged: Option<Staged>,
}

impl LocalStore {
    /// Wrap an existing directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|e| VfsError::io(root.display().to_string(), e))?;

        if !root.is_dir() {
            return Err(VfsError::InvalidMount(root.display().to_string()));
        }

        Ok(Self { root, staged: None })
    }

    /// Wrap a directory inside (or equal to) a staged resource; `close` releases it
    pub fn staged(root: impl AsRef<Path>, staged: Staged) -> Result<Self> {
        let mut store = Self::new(root)?;
        store.staged = Some(staged);
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, rel: &str) -> PathBuf {
        let rel = path::clean(rel);
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    fn entry_for(&self, rel: &str, full: &Path) -> Result<Entry> {
        let metadata = fs::metadata(full).map_err(|e| VfsError::io(rel, e))?;
        Ok(Entry::from((path::file_name(rel), &metadata)).with_source(full))
    }
}

impl Backend for LocalStore {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn open(&self, rel: &str) -> Result<Handle> {
        let full = self.resolve(rel);
        let entry = self.entry_for(rel, &full)?;

        if entry.is_dir {
            return Ok(Box::new(LocalDirHandle {
                rel: rel.to_string(),
                path: full,
                entry,
            }));
        }

        let file = File::open(&full).map_err(|e| VfsError::io(rel, e))?;
        Ok(Box::new(LocalFileHandle { file, entry }))
    }

    fn stat(&self, rel: &str) -> Result<Entry> {
        self.entry_for(rel, &self.resolve(rel))
    }

    fn read_file(&self, rel: &str) -> Result<Vec<u8>> {
        let full = self.resolve(rel);
        if full.is_dir() {
            return Err(VfsError::IsADirectory(rel.to_string()));
        }
        fs::read(&full).map_err(|e| VfsError::io(rel, e))
    }

    fn read_dir(&self, rel: &str) -> Result<Vec<Entry>> {
        list_dir(rel, &self.resolve(rel))
    }

    fn sub_store(&self, rel: &str, _stager: &Stager) -> Result<Store> {
        let full = self.resolve(rel);
        let metadata = fs::metadata(&full).map_err(|e| VfsError::io(rel, e))?;

        if metadata.is_dir() {
            return Ok(Store::new(LocalStore::new(&full)?));
        }
        if is_supported_archive(rel) {
            return Ok(Store::new(ArchiveStore::open(&full)?));
        }
        Err(VfsError::InvalidMount(rel.to_string()))
    }

    fn close(&self) -> Result<()> {
        match &self.staged {
            Some(staged) => staged.release(),
            None => Ok(()),
        }
    }
}

fn list_dir(rel: &str, full: &Path) -> Result<Vec<Entry>> {
    let metadata = fs::metadata(full).map_err(|e| VfsError::io(rel, e))?;
    if !metadata.is_dir() {
        return Err(VfsError::NotADirectory(rel.to_string()));
    }

    let mut entries = Vec::new();
    for dirent in fs::read_dir(full).map_err(|e| VfsError::io(rel, e))? {
        let dirent = dirent.map_err(|e| VfsError::io(rel, e))?;
        let child = dirent.path();
        let name = dirent.file_name().to_string_lossy().to_string();

        // Follow symlinks; dangling ones are skipped
        let metadata = match fs::metadata(&child) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(path = %child.display(), "skipping unreadable entry: {}", e);
                continue;
            }
        };
        entries.push(Entry::from((name.as_str(), &metadata)).with_source(child));
    }

    Ok(entries)
}

struct LocalFileHandle {
    file: File,
    entry: Entry,
}

impl Read for LocalFileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for LocalFileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl FileHandle for LocalFileHandle {
    fn stat(&self) -> Result<Entry> {
        Ok(self.entry.clone())
    }
}

struct LocalDirHandle {
    rel: String,
    path: PathBuf,
    entry: Entry,
}

impl Read for LocalDirHandle {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "is a directory"))
    }
}

impl Seek for LocalDirHandle {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Ok(0)
    }
}

impl FileHandle for LocalDirHandle {
    fn stat(&self) -> Result<Entry> {
        Ok(self.entry.clone())
    }

    fn read_dir(&mut self) -> Result<Vec<Entry>> {
        list_dir(&self.rel, &self.path)
    }
}
