//! Source catalog: URL prefixes mapped to root compositions

use crate::config::ServeConfig;
use crate::error::AppError;
use nest_fs::{mount_source, path, CompositeFs, Entry, Handle, Stager};

struct Mounted {
    /// Cleaned prefix, `""` for the root
    prefix: String,
    locator: String,
    fs: CompositeFs,
}

/// Served sources, routed by longest matching prefix
#[derive(Default)]
pub struct Catalog {
    sources: Vec<Mounted>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.sources.iter().map(|s| (&s.prefix, &s.locator)))
            .finish()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every configured source. Any failure here is a startup failure.
    pub fn from_config(config: &ServeConfig, stager: &Stager) -> Result<Self, AppError> {
        config.validate()?;

        let mut catalog = Self::new();
        for source in &config.sources {
            let fs = mount_source(&source.locator, stager, &config.general.mount_suffix)
                .map_err(|e| {
                    AppError::Init(format!("source {} ({}): {}", source.prefix, source.locator, e))
                });
            let fs = match fs {
                Ok(fs) => fs,
                Err(e) => {
                    // Sources opened so far own staged directories
                    if let Err(close_err) = catalog.close_all() {
                        tracing::warn!("cleanup after failed startup: {}", close_err);
                    }
                    return Err(e);
                }
            };
            catalog.add(&source.prefix, &source.locator, fs)?;
        }
        Ok(catalog)
    }

    pub fn add(&mut self, prefix: &str, locator: &str, fs: CompositeFs) -> Result<(), AppError> {
        let prefix = path::clean(prefix);
        if self.sources.iter().any(|s| s.prefix == prefix) {
            return Err(AppError::Config(format!("duplicate source prefix /{}", prefix)));
        }

        tracing::info!(prefix = %format!("/{}", prefix), locator, "serving source");
        self.sources.push(Mounted {
            prefix,
            locator: locator.to_string(),
            fs,
        });
        self.sources
            .sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()).then_with(|| a.prefix.cmp(&b.prefix)));
        Ok(())
    }

    /// Served prefixes, longest first
    pub fn prefixes(&self) -> Vec<String> {
        self.sources.iter().map(|s| format!("/{}", s.prefix)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Find the source serving `url_path` and the path left after its prefix
    pub fn resolve(&self, url_path: &str) -> Option<(&CompositeFs, String)> {
        let cleaned = path::clean(url_path);
        self.sources.iter().find_map(|source| {
            let rest = if source.prefix.is_empty() {
                Some(cleaned.as_str())
            } else if cleaned == source.prefix {
                Some("")
            } else {
                cleaned
                    .strip_prefix(source.prefix.as_str())
                    .and_then(|r| r.strip_prefix('/'))
            };
            rest.map(|r| (&source.fs, r.to_string()))
        })
    }

    fn route(&self, url_path: &str) -> Result<(&CompositeFs, String), AppError> {
        self.resolve(url_path)
            .ok_or_else(|| AppError::NotFound(url_path.to_string()))
    }

    pub fn open(&self, url_path: &str) -> Result<Handle, AppError> {
        let (fs, rest) = self.route(url_path)?;
        Ok(fs.open(&rest)?)
    }

    pub fn stat(&self, url_path: &str) -> Result<Entry, AppError> {
        let (fs, rest) = self.route(url_path)?;
        Ok(fs.stat(&rest)?)
    }

    pub fn read_file(&self, url_path: &str) -> Result<Vec<u8>, AppError> {
        let (fs, rest) = self.route(url_path)?;
        Ok(fs.read_file(&rest)?)
    }

    pub fn read_dir(&self, url_path: &str) -> Result<Vec<Entry>, AppError> {
        let (fs, rest) = self.route(url_path)?;
        Ok(fs.read_dir(&rest)?)
    }

    /// Close every source; returns the last error
    pub fn close_all(&mut self) -> Result<(), AppError> {
        let mut result = Ok(());
        for source in self.sources.drain(..) {
            if let Err(e) = source.fs.close() {
                tracing::warn!(prefix = %source.prefix, "failed to close source: {}", e);
                result = Err(e.into());
            }
        }
        result
    }
}

impl Drop for Catalog {
    fn drop(&mut self) {
        if let Err(e) = self.close_all() {
            tracing::warn!("closing catalog on drop: {}", e);
        }
    }
}
