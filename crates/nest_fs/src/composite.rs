//! Composition layer: one tree over a base store and every archive nested in it
//!
//! A path component `<archive-name><suffix>` (default suffix `-dir`) enters the
//! archive; the unmodified name still reads the archive's raw bytes. Archives are
//! indexed on first use and memoized in a mount table keyed by the component path,
//! so every mounted archive becomes a child [`CompositeFs`] that resolves its own
//! nested mounts the same way.

use crate::capability::{Backend, Capabilities, FileHandle, Handle};
use crate::entry::EntryKind;
use crate::format::is_supported_archive;
use crate::natural::sort_entries;
use crate::path::{self, strip_mount_suffix};
use crate::staging::Stager;
use crate::{Entry, Result, Store, VfsError};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_MOUNT_SUFFIX: &str = "-dir";

/// Observer invoked with the mount path each time an archive is indexed
pub type MountHook = Arc<dyn Fn(&str) + Send + Sync>;

type MountCell = Arc<OnceCell<Arc<CompositeFs>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MountState {
    /// No archive has been entered yet
    Unmounted,
    Mounted,
    /// Terminal
    Closed,
}

enum Route {
    Base(String),
    Child {
        child: Arc<CompositeFs>,
        mount: String,
        rest: String,
    },
}

pub struct CompositeFs {
    base: Store,
    suffix: String,
    stager: Stager,
    mounts: Mutex<BTreeMap<String, MountCell>>,
    closed: AtomicBool,
    hook: Option<MountHook>,
}

impl std::fmt::Debug for CompositeFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeFs")
            .field("base", &self.base)
            .field("suffix", &self.suffix)
            .field("state", &self.state())
            .finish()
    }
}

impl CompositeFs {
    pub fn new(base: Store, stager: Stager) -> Self {
        Self {
            base,
            suffix: DEFAULT_MOUNT_SUFFIX.to_string(),
            stager,
            mounts: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
            hook: None,
        }
    }

    /// Use a different mount suffix. An empty suffix is ignored.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        if suffix.is_empty() {
            tracing::warn!("empty mount suffix ignored, keeping {}", self.suffix);
        } else {
            self.suffix = suffix;
        }
        self
    }

    /// Register an observer for archive extractions (inherited by child mounts)
    pub fn on_mount(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn state(&self) -> MountState {
        if self.closed.load(Ordering::SeqCst) {
            MountState::Closed
        } else if self.mounts.lock().values().any(|cell| cell.get().is_some()) {
            MountState::Mounted
        } else {
            MountState::Unmounted
        }
    }

    /// Mount paths currently held by this level of the tree
    pub fn mounted(&self) -> Vec<String> {
        self.mounts
            .lock()
            .iter()
            .filter(|(_, cell)| cell.get().is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn open(&self, path: &str) -> Result<Handle> {
        match self.route(path)? {
            Route::Base(p) => {
                let handle = self.base.open(&p)?;
                Ok(Box::new(CompositeHandle {
                    inner: handle,
                    suffix: self.suffix.clone(),
                    rename: None,
                }))
            }
            Route::Child { child, mount, rest } => {
                let handle = child.open(&rest).map_err(|e| e.within(&mount))?;
                let rename = rest.is_empty().then(|| path::file_name(&mount).to_string());
                Ok(Box::new(CompositeHandle {
                    inner: handle,
                    suffix: self.suffix.clone(),
                    rename,
                }))
            }
        }
    }

    pub fn stat(&self, path: &str) -> Result<Entry> {
        match self.route(path)? {
            Route::Base(p) => self.base.stat(&p),
            Route::Child { child, mount, rest } => {
                let mut entry = child.stat(&rest).map_err(|e| e.within(&mount))?;
                if rest.is_empty() {
                    entry.name = path::file_name(&mount).to_string();
                    entry.kind = EntryKind::Synthetic;
                }
                Ok(entry)
            }
        }
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        match self.route(path)? {
            Route::Base(p) => self.base.read_file(&p),
            Route::Child { child, mount, rest } => {
                child.read_file(&rest).map_err(|e| e.within(&mount))
            }
        }
    }

    /// List a directory with a synthetic `<name><suffix>` entry next to every archive
    pub fn read_dir(&self, path: &str) -> Result<Vec<Entry>> {
        match self.route(path)? {
            Route::Base(p) => Ok(augment(self.base.read_dir(&p)?, &self.suffix)),
            Route::Child { child, mount, rest } => {
                child.read_dir(&rest).map_err(|e| e.within(&mount))
            }
        }
    }

    /// Close every mounted child depth-first, then the base store.
    ///
    /// Best effort: every child is closed even if some fail, and the last error is
    /// returned. Afterwards every operation fails with `NotFound`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mounts = std::mem::take(&mut *self.mounts.lock());
        let mut result = Ok(());
        for (name, cell) in mounts {
            let Some(child) = cell.get() else { continue };
            if let Err(e) = child.close() {
                tracing::warn!(mount = %name, "failed to close mount: {}", e);
                result = Err(e.within(&name));
            }
        }

        if let Err(e) = self.base.close() {
            tracing::warn!(kind = self.base.kind(), "failed to close base store: {}", e);
            result = Err(e);
        }
        result
    }

    fn ensure_open(&self, path: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VfsError::NotFound(path.to_string()));
        }
        Ok(())
    }

    fn route(&self, path: &str) -> Result<Route> {
        self.ensure_open(path)?;

        let mut segments = path::split_mounts(path, &self.suffix).into_iter();
        let Some(first) = segments.next() else {
            return Err(VfsError::NotFound(path.to_string()));
        };

        let rest: Vec<String> = segments.collect();
        if rest.is_empty() {
            return Ok(Route::Base(first));
        }

        let child = self.mount(&first)?;
        Ok(Route::Child {
            child,
            mount: first,
            rest: path::clean(&rest.join("/")),
        })
    }

    /// Resolve the child for a mount component, indexing the archive on first use.
    ///
    /// The table lock only guards the lookup; construction runs inside the
    /// per-mount cell so concurrent callers for the same archive wait for one
    /// extraction while other mounts proceed.
    fn mount(&self, mount: &str) -> Result<Arc<CompositeFs>> {
        let cell = {
            let mut table = self.mounts.lock();
            // `close` flips the flag before draining, so nothing is inserted after the drain
            if self.closed.load(Ordering::SeqCst) {
                return Err(VfsError::NotFound(mount.to_string()));
            }
            table
                .entry(mount.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let child = match cell.get_or_try_init(|| self.build_child(mount)) {
            Ok(child) => child.clone(),
            Err(e) => {
                self.forget(mount, &cell);
                return Err(e);
            }
        };

        // Closed while the archive was being indexed: the table no longer owns it
        if self.closed.load(Ordering::SeqCst) {
            self.forget(mount, &cell);
            if let Err(e) = child.close() {
                tracing::debug!(mount, "closing orphaned mount: {}", e);
            }
            return Err(VfsError::NotFound(mount.to_string()));
        }

        Ok(child)
    }

    /// Drop `cell` from the table unless another caller already replaced it
    fn forget(&self, mount: &str, cell: &MountCell) {
        let mut table = self.mounts.lock();
        if table.get(mount).is_some_and(|current| Arc::ptr_eq(current, cell)) {
            table.remove(mount);
        }
    }

    fn build_child(&self, mount: &str) -> Result<Arc<CompositeFs>> {
        let component = path::file_name(mount);
        let archive = strip_mount_suffix(component, &self.suffix)
            .ok_or_else(|| VfsError::InvalidMount(mount.to_string()))?;
        let archive_path = path::join(path::parent(mount), archive);

        let store = self.base.sub_store(&archive_path, &self.stager)?;
        tracing::info!(mount, kind = store.kind(), "mounted archive");
        if let Some(hook) = &self.hook {
            hook(mount);
        }

        Ok(Arc::new(CompositeFs {
            base: store,
            suffix: self.suffix.clone(),
            stager: self.stager.clone(),
            mounts: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
            hook: self.hook.clone(),
        }))
    }

    fn sub_store(&self, path: &str, stager: &Stager) -> Result<Store> {
        match self.route(path)? {
            Route::Base(p) => self.base.sub_store(&p, stager),
            Route::Child { child, mount, rest } => child
                .sub_store(&rest, stager)
                .map_err(|e| e.within(&mount)),
        }
    }
}

/// A composition can itself serve as the base of another composition
impl Backend for CompositeFs {
    fn kind(&self) -> &'static str {
        "composite"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn open(&self, path: &str) -> Result<Handle> {
        CompositeFs::open(self, path)
    }

    fn stat(&self, path: &str) -> Result<Entry> {
        CompositeFs::stat(self, path)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        CompositeFs::read_file(self, path)
    }

    fn read_dir(&self, path: &str) -> Result<Vec<Entry>> {
        CompositeFs::read_dir(self, path)
    }

    fn sub_store(&self, path: &str, stager: &Stager) -> Result<Store> {
        CompositeFs::sub_store(self, path, stager)
    }

    fn close(&self) -> Result<()> {
        CompositeFs::close(self)
    }
}

fn augment(mut entries: Vec<Entry>, suffix: &str) -> Vec<Entry> {
    let synthetic: Vec<Entry> = entries
        .iter()
        .filter(|e| !e.is_dir && !e.is_synthetic() && is_supported_archive(&e.name))
        .map(|e| e.mount_point(suffix))
        .collect();
    entries.extend(synthetic);
    sort_entries(&mut entries);
    entries
}

/// Handle whose directory listings are augmented like [`CompositeFs::read_dir`]
struct CompositeHandle {
    inner: Handle,
    suffix: String,
    /// Mount roots report the synthetic component name
    rename: Option<String>,
}

impl Read for CompositeHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for CompositeHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl FileHandle for CompositeHandle {
    fn stat(&self) -> Result<Entry> {
        let mut entry = self.inner.stat()?;
        if let Some(name) = &self.rename {
            entry.name = name.clone();
            entry.kind = EntryKind::Synthetic;
        }
        Ok(entry)
    }

    fn read_dir(&mut self) -> Result<Vec<Entry>> {
        Ok(augment(self.inner.read_dir()?, &self.suffix))
    }
}
