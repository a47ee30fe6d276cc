//! nestfs service layer
//!
//! This crate contains:
//! - Configuration
//! - Error types
//! - The source catalog routing URL prefixes to compositions

pub mod catalog;
pub mod config;
pub mod error;

pub use catalog::Catalog;
pub use config::{GeneralConfig, GitConfig, RemoteConfig, ServeConfig, SourceConfig};
pub use error::AppError;
