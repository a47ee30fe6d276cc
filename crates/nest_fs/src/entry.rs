//! Directory entries shared by every store

use serde::Serialize;
use std::path::PathBuf;
use std::time::SystemTime;

/// Whether an entry mirrors the backing store or was synthesized by the composition layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    Real,
    /// "Enter this archive" affordance
    Synthetic,
}

/// Entry in a virtual file system
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    /// Base name (no directory components)
    pub name: String,

    /// File size in bytes (0 for directories)
    pub size: u64,

    /// Last modified time, if the backing medium records one
    pub modified: Option<SystemTime>,

    pub is_dir: bool,

    pub kind: EntryKind,

    /// On-disk location when the entry is backed by a real file
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Entry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            modified: None,
            is_dir: false,
            kind: EntryKind::Real,
            source: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            modified: None,
            is_dir: true,
            kind: EntryKind::Real,
            source: None,
        }
    }

    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Build the synthetic directory entry that mounts this archive file
    pub fn mount_point(&self, suffix: &str) -> Self {
        Self {
            name: format!("{}{}", self.name, suffix),
            size: 0,
            modified: self.modified,
            is_dir: true,
            kind: EntryKind::Synthetic,
            source: None,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.kind == EntryKind::Synthetic
    }
}

impl From<(&str, &std::fs::Metadata)> for Entry {
    fn from((name, metadata): (&str, &std::fs::Metadata)) -> Self {
        Self {
            name: name.to_string(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified: metadata.modified().ok(),
            is_dir: metadata.is_dir(),
            kind: EntryKind::Real,
            source: None,
        }
    }
}
