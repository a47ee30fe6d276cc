//! Application error types

use nest_fs::VfsError;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Recoverable (reported per request) =====
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Staging failed: {0}")]
    Staging(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Invalid mount: {0}")]
    InvalidMount(String),

    #[error("File I/O error: {0}")]
    Io(String),

    // ===== Fatal (startup) =====
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Init(String),
}

impl AppError {
    /// Is this error recoverable?
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::Config(_) | AppError::Init(_))
    }

    /// Is this a fatal error?
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Get a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound(path) => format!("No such file or directory: {}", path),
            AppError::Staging(msg) => format!("Could not fetch source: {}", msg),
            AppError::Archive(msg) => format!("Archive cannot be read: {}", msg),
            _ => self.to_string(),
        }
    }
}

impl From<VfsError> for AppError {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(p) => AppError::NotFound(p),
            VfsError::NotADirectory(p) => AppError::NotADirectory(p),
            VfsError::IsADirectory(p) => AppError::IsADirectory(p),
            VfsError::Unsupported(msg) => AppError::Unsupported(msg),
            VfsError::InvalidMount(p) => AppError::InvalidMount(p),
            e @ VfsError::Staging { .. } => AppError::Staging(e.to_string()),
            e @ VfsError::CorruptArchive { .. } => AppError::Archive(e.to_string()),
            e if e.is_not_found() => AppError::NotFound(e.to_string()),
            e => AppError::Io(e.to_string()),
        }
    }
}
