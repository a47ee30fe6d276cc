//! Temporary staging directories and remote downloads
//!
//! Every store that needs scratch space (git clones, downloaded archives, rar
//! payloads spilled from a nested handle) asks the [`Stager`] for a [`Staged`]
//! directory and owns it until its own `close`.

use crate::git::GitOptions;
use crate::{Result, VfsError};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// Cooperative cancellation shared by clones and downloads
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A staged temporary directory with an idempotent release
#[derive(Debug)]
pub struct Staged {
    label: String,
    path: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

impl Staged {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Remove the directory recursively. Later calls are no-ops.
    pub fn release(&self) -> Result<()> {
        let Some(dir) = self.dir.lock().take() else {
            return Ok(());
        };

        dir.close()
            .map_err(|e| VfsError::io(self.path.display().to_string(), e))?;
        tracing::debug!(label = %self.label, path = %self.path.display(), "released staged directory");
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.dir.lock().is_none()
    }
}

impl Drop for Staged {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(label = %self.label, "failed to release staged directory: {}", e);
        }
    }
}

/// Result of [`Stager::download_if_remote`]
#[derive(Debug)]
pub struct Fetched {
    /// Local path of the payload
    pub path: PathBuf,
    /// Present when the payload was downloaded and must be released by its owner
    pub staged: Option<Staged>,
}

/// Tunables for staging
#[derive(Debug, Clone)]
pub struct StagingOptions {
    /// Parent for staged directories (system temp dir when `None`)
    pub temp_root: Option<PathBuf>,
    /// Whole-request timeout for downloads
    pub timeout: Option<Duration>,
    pub user_agent: String,
    pub git: GitOptions,
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            temp_root: None,
            timeout: Some(Duration::from_secs(300)),
            user_agent: concat!("nestfs/", env!("CARGO_PKG_VERSION")).to_string(),
            git: GitOptions::default(),
        }
    }
}

struct StagerInner {
    options: StagingOptions,
    cancel: CancelToken,
    client: OnceCell<reqwest::blocking::Client>,
}

/// Creates staged directories and downloads remote payloads
#[derive(Clone)]
pub struct Stager {
    inner: Arc<StagerInner>,
}

impl Default for Stager {
    fn default() -> Self {
        Self::new(StagingOptions::default())
    }
}

impl std::fmt::Debug for Stager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stager")
            .field("options", &self.inner.options)
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish()
    }
}

impl Stager {
    pub fn new(options: StagingOptions) -> Self {
        Self::with_cancel(options, CancelToken::new())
    }

    pub fn with_cancel(options: StagingOptions, cancel: CancelToken) -> Self {
        Self {
            inner: Arc::new(StagerInner {
                options,
                cancel,
                client: OnceCell::new(),
            }),
        }
    }

    pub fn options(&self) -> &StagingOptions {
        &self.inner.options
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    /// Create a uniquely named temporary directory
    pub fn stage_temp_dir(&self, label: &str) -> Result<Staged> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("nestfs-{}-", label);
        builder.prefix(&prefix);

        let dir = match &self.inner.options.temp_root {
            Some(root) => std::fs::create_dir_all(root)
                .and_then(|_| builder.tempdir_in(root)),
            None => builder.tempdir(),
        }
        .map_err(|e| VfsError::staging(label, e))?;

        let path = dir.path().to_path_buf();
        tracing::debug!(label, path = %path.display(), "staged temporary directory");

        Ok(Staged {
            label: label.to_string(),
            path,
            dir: Mutex::new(Some(dir)),
        })
    }

    /// Fetch HTTP(S) locators into a staged directory; other locators pass through
    pub fn download_if_remote(&self, locator: &str) -> Result<Fetched> {
        if !is_remote(locator) {
            return Ok(Fetched {
                path: PathBuf::from(locator),
                staged: None,
            });
        }

        let url = url::Url::parse(locator).map_err(|e| VfsError::staging(locator, e))?;
        let file_name = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or("download")
            .to_string();

        // Dropping `staged` on any error below removes the partial download
        let staged = self.stage_temp_dir("download")?;
        let dest = staged.path().join(&file_name);
        let bytes = self.fetch_into(locator, &dest)?;

        tracing::info!(locator, bytes, path = %dest.display(), "downloaded remote payload");
        Ok(Fetched {
            path: dest,
            staged: Some(staged),
        })
    }

    fn client(&self) -> Result<&reqwest::blocking::Client> {
        self.inner.client.get_or_try_init(|| {
            let mut builder = reqwest::blocking::Client::builder()
                .user_agent(self.inner.options.user_agent.clone());
            if let Some(timeout) = self.inner.options.timeout {
                builder = builder.timeout(timeout);
            }
            builder
                .build()
                .map_err(|e| VfsError::staging("http client", e))
        })
    }

    fn fetch_into(&self, locator: &str, dest: &Path) -> Result<u64> {
        let mut response = self
            .client()?
            .get(locator)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| VfsError::staging(locator, e))?;

        let mut file =
            File::create(dest).map_err(|e| VfsError::io(dest.display().to_string(), e))?;
        let mut buffer = vec![0u8; DOWNLOAD_CHUNK];
        let mut total = 0u64;

        loop {
            if self.inner.cancel.is_cancelled() {
                return Err(VfsError::staging(locator, "download cancelled"));
            }
            let n = response
                .read(&mut buffer)
                .map_err(|e| VfsError::staging(locator, e))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])
                .map_err(|e| VfsError::io(dest.display().to_string(), e))?;
            total += n as u64;
        }

        file.flush()
            .map_err(|e| VfsError::io(dest.display().to_string(), e))?;
        Ok(total)
    }
}

/// True for `http://` and `https://` locators
pub fn is_remote(locator: &str) -> bool {
    let lower = locator.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
