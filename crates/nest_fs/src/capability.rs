//! Capability interface and adapter
//!
//! A [`Backend`] only has to implement `open`. Backends that can answer `stat`,
//! `read_file`, `read_dir` or `sub_store` directly advertise it through
//! [`Capabilities`]; the [`Store`] adapter reads that descriptor once and routes
//! every call either to the fast path or to a fallback built on `open`.

use crate::archive::ArchiveStore;
use crate::path;
use crate::staging::Stager;
use crate::{Entry, Result, VfsError};
use std::io::{Read, Seek};

/// Readable, seekable payload that can move across threads
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// An open file or directory
pub trait FileHandle: Read + Seek + Send {
    fn stat(&self) -> Result<Entry>;

    /// List a directory handle. File handles return [`VfsError::NotADirectory`].
    fn read_dir(&mut self) -> Result<Vec<Entry>> {
        Err(VfsError::NotADirectory(self.stat()?.name))
    }
}

pub type Handle = Box<dyn FileHandle>;

/// Fast paths a backend implements natively
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub stat: bool,
    pub read_file: bool,
    pub read_dir: bool,
    pub sub_store: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        stat: true,
        read_file: true,
        read_dir: true,
        sub_store: true,
    };
}

/// A backing store.
///
/// Paths are relative to the store root and already cleaned. Optional methods are
/// only called when the matching [`Capabilities`] flag is set.
pub trait Backend: Send + Sync {
    /// Short label for logs
    fn kind(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn open(&self, path: &str) -> Result<Handle>;

    fn stat(&self, path: &str) -> Result<Entry> {
        Err(VfsError::Unsupported(format!("{}: stat {}", self.kind(), path)))
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Err(VfsError::Unsupported(format!("{}: read_file {}", self.kind(), path)))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<Entry>> {
        Err(VfsError::Unsupported(format!("{}: read_dir {}", self.kind(), path)))
    }

    /// Build the store mounted at `path` (an archive, or a directory)
    fn sub_store(&self, path: &str, stager: &Stager) -> Result<Store> {
        let _ = stager;
        Err(VfsError::Unsupported(format!("{}: sub_store {}", self.kind(), path)))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Capability adapter around a [`Backend`]
pub struct Store {
    backend: Box<dyn Backend>,
    caps: Capabilities,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("kind", &self.backend.kind())
            .field("caps", &self.caps)
            .finish()
    }
}

impl Store {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    pub fn from_boxed(backend: Box<dyn Backend>) -> Self {
        let caps = backend.capabilities();
        tracing::trace!(kind = backend.kind(), ?caps, "store capabilities resolved");
        Self { backend, caps }
    }

    pub fn kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn open(&self, path: &str) -> Result<Handle> {
        self.backend.open(&path::clean(path))
    }

    pub fn stat(&self, path: &str) -> Result<Entry> {
        let path = path::clean(path);
        if self.caps.stat {
            return self.backend.stat(&path);
        }
        self.backend.open(&path)?.stat()
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let path = path::clean(path);
        if self.caps.read_file {
            return self.backend.read_file(&path);
        }

        let mut handle = self.backend.open(&path)?;
        if handle.stat()?.is_dir {
            return Err(VfsError::IsADirectory(path));
        }
        let mut buffer = Vec::new();
        handle
            .read_to_end(&mut buffer)
            .map_err(|e| VfsError::io(path, e))?;
        Ok(buffer)
    }

    /// Entries in byte order of their names
    pub fn read_dir(&self, path: &str) -> Result<Vec<Entry>> {
        let path = path::clean(path);
        let mut entries = if self.caps.read_dir {
            self.backend.read_dir(&path)?
        } else {
            self.backend.open(&path)?.read_dir()?
        };
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Store for the archive (or directory) at `path`.
    ///
    /// Backends without a native sub-store are indexed as an archive read through
    /// `open`.
    pub fn sub_store(&self, path: &str, stager: &Stager) -> Result<Store> {
        let path = path::clean(path);
        if self.caps.sub_store {
            return self.backend.sub_store(&path, stager);
        }

        let handle = self.backend.open(&path)?;
        let entry = handle.stat()?;
        if entry.is_dir {
            return Err(VfsError::InvalidMount(path));
        }
        let archive = ArchiveStore::from_handle(path::file_name(&path), handle, stager)?;
        Ok(Store::new(archive))
    }

    pub fn close(&self) -> Result<()> {
        self.backend.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Backend that only knows how to open files
    struct OpenOnly;

    struct MemHandle {
        entry: Entry,
        data: Cursor<Vec<u8>>,
        children: Option<Vec<Entry>>,
    }

    impl Read for MemHandle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl Seek for MemHandle {
        fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
            self.data.seek(pos)
        }
    }

    impl FileHandle for MemHandle {
        fn stat(&self) -> Result<Entry> {
            Ok(self.entry.clone())
        }

        fn read_dir(&mut self) -> Result<Vec<Entry>> {
            self.children
                .clone()
                .ok_or_else(|| VfsError::NotADirectory(self.entry.name.clone()))
        }
    }

    impl Backend for OpenOnly {
        fn kind(&self) -> &'static str {
            "open-only"
        }

        fn open(&self, path: &str) -> Result<Handle> {
            match path {
                "" => Ok(Box::new(MemHandle {
                    entry: Entry::directory(""),
                    data: Cursor::new(Vec::new()),
                    children: Some(vec![Entry::file("b10", 1), Entry::file("b2", 1)]),
                })),
                "hello.txt" => Ok(Box::new(MemHandle {
                    entry: Entry::file("hello.txt", 5),
                    data: Cursor::new(b"hello".to_vec()),
                    children: None,
                })),
                other => Err(VfsError::NotFound(other.to_string())),
            }
        }
    }

    #[test]
    fn test_fallbacks_are_built_from_open() {
        let store = Store::new(OpenOnly);
        assert_eq!(store.capabilities(), Capabilities::default());

        assert_eq!(store.read_file("/hello.txt").unwrap(), b"hello");
        assert_eq!(store.stat("./hello.txt").unwrap().size, 5);

        let names: Vec<_> = store.read_dir("/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["b10", "b2"]);

        assert!(store.stat("missing").unwrap_err().is_not_found());
        assert!(matches!(
            store.read_dir("hello.txt"),
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_sub_store_fallback_rejects_directories() {
        let store = Store::new(OpenOnly);
        let stager = Stager::default();
        assert!(matches!(
            store.sub_store("", &stager),
            Err(VfsError::InvalidMount(_))
        ));
    }
}
