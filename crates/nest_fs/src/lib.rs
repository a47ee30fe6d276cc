//! nestfs file system core
//!
//! Serves one read-only tree over local directories, git repositories and remote
//! archives, where any archive inside the tree can be entered as a directory:
//! - Capability adapter: backends implement `open`, fast paths are optional
//! - Stores: local directory, archive (tar family, zip, 7z, rar), git clone
//! - Composition: `<archive><suffix>` path components mount nested archives
//! - Staging: temp directories and downloads released on close

mod archive;
mod capability;
mod composite;
mod encoding;
mod entry;
mod error;
mod format;
mod git;
mod local;
mod natural;
pub mod path;
mod source;
mod staging;

#[cfg(test)]
mod testing;

pub use archive::ArchiveStore;
pub use capability::{Backend, Capabilities, FileHandle, Handle, ReadSeek, Store};
pub use composite::{CompositeFs, MountHook, MountState, DEFAULT_MOUNT_SUFFIX};
pub use encoding::{decode_bytes, detect_encoding, system_encoding_hint, EncodingHint};
pub use entry::{Entry, EntryKind};
pub use error::{Result, VfsError};
pub use format::{is_supported_archive, ArchiveFormat, ARCHIVE_SUFFIXES};
pub use git::{clone_repository, is_git_locator, GitOptions};
pub use local::LocalStore;
pub use natural::{natural_cmp, sort_entries};
pub use source::{mount_source, open_source, SourceKind};
pub use staging::{is_remote, CancelToken, Fetched, Staged, Stager, StagingOptions};
