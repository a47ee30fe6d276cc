//! Archive store: a decoded archive exposed through the capability interface
//!
//! Zip members are read on demand through the open archive reader. Tar streams,
//! 7z and rar are sequential (or solid) formats, so their payloads are decoded
//! once while the index is built.

use crate::capability::{Backend, Capabilities, FileHandle, Handle, ReadSeek};
use crate::encoding::{self, decode_bytes};
use crate::format::{ArchiveFormat, SNIFF_LEN};
use crate::staging::{Staged, Stager};
use crate::{path, Entry, Result, VfsError};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
enum Content {
    Dir,
    Bytes(Arc<[u8]>),
    /// Index into the open zip archive
    Zip(usize),
}

#[derive(Debug)]
struct Node {
    entry: Entry,
    content: Content,
    children: BTreeSet<String>,
}

/// Path → node map with implicit parent directories
#[derive(Debug)]
struct Index {
    nodes: HashMap<String, Node>,
}

impl Index {
    fn new(archive_name: &str) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            String::new(),
            Node {
                entry: Entry::directory(archive_name),
                content: Content::Dir,
                children: BTreeSet::new(),
            },
        );
        Self { nodes }
    }

    fn insert(&mut self, raw_path: &str, mut entry: Entry, content: Content) {
        let full = path::clean(raw_path);
        if full.is_empty() {
            return;
        }

        let parent = path::parent(&full).to_string();
        let name = path::file_name(&full).to_string();
        self.ensure_dir(&parent);

        entry.name = name.clone();
        let children = match self.nodes.remove(&full) {
            // An explicit directory record after its implicit creation only adds metadata
            Some(mut existing) if existing.entry.is_dir && entry.is_dir => {
                existing.entry.modified = entry.modified.or(existing.entry.modified);
                self.nodes.insert(full, existing);
                return;
            }
            Some(existing) => existing.children,
            None => BTreeSet::new(),
        };

        self.nodes.insert(
            full,
            Node {
                entry,
                content,
                children,
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.insert(name);
        }
    }

    fn ensure_dir(&mut self, dir: &str) {
        if self.nodes.contains_key(dir) {
            return;
        }

        let parent = path::parent(dir).to_string();
        self.ensure_dir(&parent);

        let name = path::file_name(dir).to_string();
        self.nodes.insert(
            dir.to_string(),
            Node {
                entry: Entry::directory(name.clone()),
                content: Content::Dir,
                children: BTreeSet::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.insert(name);
        }
    }

    fn get(&self, path: &str) -> Result<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    fn list(&self, dir: &str) -> Result<Vec<Entry>> {
        let node = self.get(dir)?;
        if !node.entry.is_dir {
            return Err(VfsError::NotADirectory(dir.to_string()));
        }

        Ok(node
            .children
            .iter()
            .filter_map(|name| self.nodes.get(&path::join(dir, name)))
            .map(|child| child.entry.clone())
            .collect())
    }

    fn file_count(&self) -> usize {
        self.nodes.values().filter(|n| !n.entry.is_dir).count()
    }
}

type ZipReader = zip::ZipArchive<Box<dyn ReadSeek>>;

/// Upper bound on buffer space reserved from a member's declared size
const PREALLOC_LIMIT: u64 = 1 << 20;

/// A decoded archive
pub struct ArchiveStore {
    name: String,
    format: ArchiveFormat,
    index: Index,
    zip: Mutex<Option<ZipReader>>,
    staged: Mutex<Vec<Staged>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStore")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("entries", &self.index.nodes.len())
            .finish()
    }
}

impl ArchiveStore {
    /// Open an archive file from disk
    pub fn open(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let mut file = File::open(path).map_err(|e| VfsError::io(path.display().to_string(), e))?;
        let format = detect(&name, &mut file)?;

        if format == ArchiveFormat::Rar {
            return Self::from_index(&name, format, index_rar(&name, path)?, None);
        }
        Self::from_reader(&name, Box::new(file), format)
    }

    /// Index an archive read from an already-open handle (the nested case).
    ///
    /// The handle stays open for zip archives and is dropped on `close`. Rar needs a
    /// real file, so its payload is spilled into a staged directory first.
    pub fn from_handle(name: &str, handle: impl ReadSeek + 'static, stager: &Stager) -> Result<Self> {
        let mut reader: Box<dyn ReadSeek> = Box::new(handle);
        let format = detect(name, &mut reader)?;

        if format != ArchiveFormat::Rar {
            return Self::from_reader(name, reader, format);
        }

        let staged = stager.stage_temp_dir("rar")?;
        let spill = staged.path().join("payload.rar");
        let mut file =
            File::create(&spill).map_err(|e| VfsError::io(spill.display().to_string(), e))?;
        io::copy(&mut reader, &mut file).map_err(|e| VfsError::io(name, e))?;
        drop(file);

        let index = index_rar(name, &spill)?;
        Self::from_index(name, format, index, None).map(|store| store.with_staged(staged))
    }

    fn from_reader(name: &str, reader: Box<dyn ReadSeek>, format: ArchiveFormat) -> Result<Self> {
        match format {
            ArchiveFormat::Zip => {
                let (index, zip) = index_zip(name, reader)?;
                Self::from_index(name, format, index, Some(zip))
            }
            ArchiveFormat::SevenZip => Self::from_index(name, format, index_7z(name, reader)?, None),
            ArchiveFormat::Rar => Err(VfsError::Unsupported(format!(
                "{}: rar archives must be opened from a file",
                name
            ))),
            tar => Self::from_index(name, format, index_tar(name, tar, reader)?, None),
        }
    }

    fn from_index(
        name: &str,
        format: ArchiveFormat,
        index: Index,
        zip: Option<ZipReader>,
    ) -> Result<Self> {
        tracing::debug!(archive = name, ?format, files = index.file_count(), "indexed archive");
        Ok(Self {
            name: name.to_string(),
            format,
            index,
            zip: Mutex::new(zip),
            staged: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Tie a staged resource (download, spill) to this store's lifetime
    pub fn with_staged(self, staged: Staged) -> Self {
        self.staged.lock().push(staged);
        self
    }

    fn node(&self, path: &str) -> Result<&Node> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VfsError::NotFound(format!("{} (archive {} closed)", path, self.name)));
        }
        self.index.get(path)
    }

    fn bytes(&self, path: &str, node: &Node) -> Result<Arc<[u8]>> {
        match &node.content {
            Content::Dir => Err(VfsError::IsADirectory(path.to_string())),
            Content::Bytes(data) => Ok(data.clone()),
            Content::Zip(i) => {
                let mut guard = self.zip.lock();
                let archive = guard
                    .as_mut()
                    .ok_or_else(|| VfsError::NotFound(format!("{} (archive closed)", path)))?;
                let mut file = archive
                    .by_index(*i)
                    .map_err(|e| VfsError::corrupt(&self.name, e))?;
                let declared = file.size();
                Ok(read_member(&self.name, path, &mut file, declared)?.into())
            }
        }
    }
}

impl Backend for ArchiveStore {
    fn kind(&self) -> &'static str {
        "archive"
    }

    // Nested archives go through the adapter's open-and-index fallback
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            stat: true,
            read_file: true,
            read_dir: true,
            sub_store: false,
        }
    }

    fn open(&self, path: &str) -> Result<Handle> {
        let node = self.node(path)?;
        let (data, children) = match node.content {
            Content::Dir => (Arc::from(Vec::new()), Some(self.index.list(path)?)),
            _ => (self.bytes(path, node)?, None),
        };

        Ok(Box::new(ArchiveHandle {
            entry: node.entry.clone(),
            data: Cursor::new(data),
            children,
        }))
    }

    fn stat(&self, path: &str) -> Result<Entry> {
        Ok(self.node(path)?.entry.clone())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let node = self.node(path)?;
        Ok(self.bytes(path, node)?.to_vec())
    }

    fn read_dir(&self, path: &str) -> Result<Vec<Entry>> {
        self.node(path)?;
        self.index.list(path)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.zip.lock().take();
        let mut result = Ok(());
        for staged in self.staged.lock().drain(..) {
            if let Err(e) = staged.release() {
                result = Err(e);
            }
        }
        tracing::debug!(archive = %self.name, "closed archive");
        result
    }
}

struct ArchiveHandle {
    entry: Entry,
    data: Cursor<Arc<[u8]>>,
    children: Option<Vec<Entry>>,
}

impl Read for ArchiveHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

impl Seek for ArchiveHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.data.seek(pos)
    }
}

impl FileHandle for ArchiveHandle {
    fn stat(&self) -> Result<Entry> {
        Ok(self.entry.clone())
    }

    fn read_dir(&mut self) -> Result<Vec<Entry>> {
        self.children
            .clone()
            .ok_or_else(|| VfsError::NotADirectory(self.entry.name.clone()))
    }
}

/// Suffix first, then magic bytes. Leaves the reader rewound.
fn detect<R: Read + Seek + ?Sized>(name: &str, reader: &mut R) -> Result<ArchiveFormat> {
    if let Some(format) = ArchiveFormat::from_name(name) {
        return Ok(format);
    }

    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut *reader)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .map_err(|e| VfsError::io(name, e))?;
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| VfsError::io(name, e))?;

    ArchiveFormat::sniff(&head)
        .ok_or_else(|| VfsError::Unsupported(format!("{}: unrecognized archive signature", name)))
}

/// Read one member whose header declares `declared` bytes.
///
/// The declared size only bounds the initial allocation; a member that ends
/// early or runs long is corrupt.
fn read_member(archive: &str, member: &str, reader: &mut impl Read, declared: u64) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(declared.min(PREALLOC_LIMIT) as usize);
    reader
        .read_to_end(&mut data)
        .map_err(|e| VfsError::corrupt(archive, e))?;

    if data.len() as u64 != declared {
        return Err(VfsError::corrupt(
            archive,
            format!("{} holds {} bytes but declares {}", member, data.len(), declared),
        ));
    }
    Ok(data)
}

fn unix_time(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn zip_time(dt: zip::DateTime) -> Option<SystemTime> {
    let naive = chrono::NaiveDate::from_ymd_opt(dt.year().into(), dt.month().into(), dt.day().into())?
        .and_hms_opt(dt.hour().into(), dt.minute().into(), dt.second().into())?;
    Some(SystemTime::from(naive.and_utc()))
}

fn index_zip(name: &str, reader: Box<dyn ReadSeek>) -> Result<(Index, ZipReader)> {
    let mut archive = zip::ZipArchive::new(reader).map_err(|e| VfsError::corrupt(name, e))?;
    let hint = encoding::system_encoding_hint();
    let mut index = Index::new(name);

    for i in 0..archive.len() {
        let file = archive
            .by_index_raw(i)
            .map_err(|e| VfsError::corrupt(name, e))?;

        // Names are UTF-8 in modern archives; older ones use the creator's code page
        let raw_name = file.name_raw();
        let member = match std::str::from_utf8(raw_name) {
            Ok(s) => s.to_string(),
            Err(_) => decode_bytes(raw_name, hint).0,
        };
        let modified = file.last_modified().and_then(zip_time);

        if file.is_dir() {
            index.insert(&member, Entry::directory("").with_modified(modified), Content::Dir);
        } else {
            index.insert(
                &member,
                Entry::file("", file.size()).with_modified(modified),
                Content::Zip(i),
            );
        }
    }

    Ok((index, archive))
}

fn index_tar(name: &str, format: ArchiveFormat, reader: Box<dyn ReadSeek>) -> Result<Index> {
    let decoder = format
        .tar_decoder(reader)
        .map_err(|e| VfsError::corrupt(name, e))?;
    let mut archive = tar::Archive::new(decoder);
    let mut index = Index::new(name);

    for member in archive.entries().map_err(|e| VfsError::corrupt(name, e))? {
        let mut member = member.map_err(|e| VfsError::corrupt(name, e))?;
        let member_path = String::from_utf8_lossy(&member.path_bytes()).to_string();
        let entry_type = member.header().entry_type();
        let modified = member.header().mtime().ok().map(unix_time);

        if entry_type.is_dir() {
            index.insert(&member_path, Entry::directory("").with_modified(modified), Content::Dir);
            continue;
        }
        if !entry_type.is_file() {
            tracing::trace!(archive = name, member = %member_path, ?entry_type, "skipping non-regular tar member");
            continue;
        }

        let declared = member.size();
        let data = read_member(name, &member_path, &mut member, declared)?;
        index.insert(
            &member_path,
            Entry::file("", data.len() as u64).with_modified(modified),
            Content::Bytes(data.into()),
        );
    }

    Ok(index)
}

fn index_7z(name: &str, reader: Box<dyn ReadSeek>) -> Result<Index> {
    let mut index = Index::new(name);

    sevenz_rust::decompress_with_extract_fn(reader, Path::new(""), |entry, data, _| {
        if entry.is_directory() {
            index.insert(entry.name(), Entry::directory(""), Content::Dir);
            return Ok(true);
        }

        let mut buffer = Vec::new();
        data.read_to_end(&mut buffer)?;
        index.insert(
            entry.name(),
            Entry::file("", buffer.len() as u64),
            Content::Bytes(buffer.into()),
        );
        Ok(true)
    })
    .map_err(|e| VfsError::corrupt(name, e))?;

    Ok(index)
}

#[cfg(feature = "rar")]
fn index_rar(name: &str, archive_path: &Path) -> Result<Index> {
    let mut index = Index::new(name);
    let mut archive = unrar::Archive::new(archive_path)
        .open_for_processing()
        .map_err(|e| VfsError::corrupt(name, e))?;

    while let Some(header) = archive.read_header().map_err(|e| VfsError::corrupt(name, e))? {
        let member = header.entry().filename.to_string_lossy().replace('\\', "/");
        let is_dir = header.entry().is_directory();

        archive = if is_dir {
            index.insert(&member, Entry::directory(""), Content::Dir);
            header.skip().map_err(|e| VfsError::corrupt(name, e))?
        } else {
            let (data, next) = header.read().map_err(|e| VfsError::corrupt(name, e))?;
            index.insert(
                &member,
                Entry::file("", data.len() as u64),
                Content::Bytes(data.into()),
            );
            next
        };
    }

    Ok(index)
}

#[cfg(not(feature = "rar"))]
fn index_rar(name: &str, _archive_path: &Path) -> Result<Index> {
    Err(VfsError::Unsupported(format!(
        "{}: built without rar support",
        name
    )))
}
