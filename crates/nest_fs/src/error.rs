//! Error taxonomy for the virtual filesystem

use std::io;
use thiserror::Error;

/// Errors surfaced by every store and by the composition layer
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A directory was required but the path names a file
    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("staging failed for {locator}: {reason}")]
    Staging { locator: String, reason: String },

    #[error("corrupt archive {name}: {reason}")]
    CorruptArchive { name: String, reason: String },

    #[error("invalid mount: {0}")]
    InvalidMount(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Plain(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, VfsError>;

impl VfsError {
    /// Map an I/O error for `path`, folding `ErrorKind::NotFound` into [`VfsError::NotFound`]
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound(path),
            _ => VfsError::Io { path, source },
        }
    }

    pub fn staging(locator: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        VfsError::Staging {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    pub fn corrupt(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        VfsError::CorruptArchive {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound(_) => true,
            VfsError::Io { source, .. } | VfsError::Plain(source) => {
                source.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }

    /// Prefix the path carried by this error with the mount it was raised under.
    ///
    /// Errors bubbling out of a nested composition read `outer.zip-dir/inner/x.txt`
    /// instead of only the suffix the child saw.
    pub fn within(self, mount: &str) -> Self {
        let join = |p: String| {
            if p.is_empty() {
                mount.to_string()
            } else {
                format!("{}/{}", mount.trim_end_matches('/'), p)
            }
        };

        match self {
            VfsError::NotFound(p) => VfsError::NotFound(join(p)),
            VfsError::NotADirectory(p) => VfsError::NotADirectory(join(p)),
            VfsError::IsADirectory(p) => VfsError::IsADirectory(join(p)),
            VfsError::InvalidMount(p) => VfsError::InvalidMount(join(p)),
            VfsError::Io { path, source } => VfsError::Io {
                path: join(path),
                source,
            },
            VfsError::Plain(source) => VfsError::io(mount, source),
            VfsError::CorruptArchive { name, reason } => VfsError::CorruptArchive {
                name: join(name),
                reason,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_is_folded() {
        let err = VfsError::io("a/b.txt", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, VfsError::NotFound(ref p) if p == "a/b.txt"));
        assert!(err.is_not_found());

        let err = VfsError::io("a", io::Error::new(io::ErrorKind::PermissionDenied, "no"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_within_prefixes_path() {
        let err = VfsError::NotFound("x.txt".into()).within("outer.zip-dir");
        assert_eq!(err.to_string(), "not found: outer.zip-dir/x.txt");

        let err = VfsError::NotFound(String::new()).within("outer.zip-dir");
        assert_eq!(err.to_string(), "not found: outer.zip-dir");

        let err = VfsError::Unsupported("thing".into()).within("m");
        assert_eq!(err.to_string(), "unsupported: thing");
    }
}
