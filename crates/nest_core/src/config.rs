//! Service configuration

use crate::error::AppError;
use directories::ProjectDirs;
use nest_fs::{GitOptions, StagingOptions, DEFAULT_MOUNT_SUFFIX};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub general: GeneralConfig,
    pub git: GitConfig,
    pub remote: RemoteConfig,
    /// Top-level served paths
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Appended to an archive name to enter it as a directory
    pub mount_suffix: String,
    /// Root for staged clones and downloads (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            mount_suffix: DEFAULT_MOUNT_SUFFIX.to_string(),
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// First-attempt branch; the remote HEAD when unset
    pub branch: Option<String>,
    pub fallback_branch: String,
    /// 0 clones full history
    pub depth: u32,
}

impl Default for GitConfig {
    fn default() -> Self {
        let defaults = GitOptions::default();
        Self {
            branch: defaults.branch,
            fallback_branch: defaults.fallback_branch,
            depth: defaults.depth,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Whole-download timeout; 0 disables it
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        let defaults = StagingOptions::default();
        Self {
            timeout_secs: defaults.timeout.map(|t| t.as_secs()).unwrap_or(0),
            user_agent: defaults.user_agent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// URL prefix the source is served under (`/` for the root)
    pub prefix: String,
    /// Local path, git remote or archive URL
    pub locator: String,
}

impl ServeConfig {
    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("using default configuration");
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        ProjectDirs::from("dev", "nestfs", "nestfs")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.general.mount_suffix.is_empty() {
            return Err(AppError::Config("general.mount_suffix must not be empty".into()));
        }
        if self.general.mount_suffix.contains(['/', '\\']) {
            return Err(AppError::Config(format!(
                "general.mount_suffix {:?} must not contain a path separator",
                self.general.mount_suffix
            )));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            let prefix = nest_fs::path::clean(&source.prefix);
            if !seen.insert(prefix.clone()) {
                return Err(AppError::Config(format!("duplicate source prefix /{}", prefix)));
            }
            if source.locator.trim().is_empty() {
                return Err(AppError::Config(format!("source /{} has no locator", prefix)));
            }
        }
        Ok(())
    }

    pub fn staging_options(&self) -> StagingOptions {
        StagingOptions {
            temp_root: self.general.temp_dir.clone(),
            timeout: (self.remote.timeout_secs > 0)
                .then(|| Duration::from_secs(self.remote.timeout_secs)),
            user_agent: self.remote.user_agent.clone(),
            git: GitOptions {
                branch: self.git.branch.clone(),
                fallback_branch: self.git.fallback_branch.clone(),
                depth: self.git.depth,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ServeConfig = toml::from_str(
            r#"
            [git]
            branch = "main"

            [[sources]]
            prefix = "/data"
            locator = "/srv/data"
            "#,
        )
        .unwrap();

        assert_eq!(config.general.mount_suffix, "-dir");
        assert_eq!(config.git.branch.as_deref(), Some("main"));
        assert_eq!(config.git.fallback_branch, "master");
        assert_eq!(config.git.depth, 1);
        assert_eq!(config.remote.timeout_secs, 300);
        assert_eq!(config.sources.len(), 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation() {
        let mut config = ServeConfig::default();
        config.general.mount_suffix = String::new();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = ServeConfig::default();
        config.general.mount_suffix = "/x".into();
        assert!(config.validate().is_err());

        let mut config = ServeConfig::default();
        for prefix in ["/a", "a/"] {
            config.sources.push(SourceConfig {
                prefix: prefix.into(),
                locator: "/srv".into(),
            });
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_staging_options() {
        let mut config = ServeConfig::default();
        config.general.temp_dir = Some(PathBuf::from("/var/tmp/nest"));
        config.remote.timeout_secs = 0;
        config.git.depth = 0;

        let options = config.staging_options();
        assert_eq!(options.temp_root, Some(PathBuf::from("/var/tmp/nest")));
        assert!(options.timeout.is_none());
        assert_eq!(options.git.depth, 0);
        assert_eq!(options.git.fallback_branch, "master");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = ServeConfig::default();
        config.general.mount_suffix = "+".into();
        config.sources.push(SourceConfig {
            prefix: "/".into(),
            locator: "https://example.com/pack.zip".into(),
        });

        config.save_to(&path).unwrap();
        let loaded = ServeConfig::load_from(&path).unwrap();
        assert_eq!(loaded.general.mount_suffix, "+");
        assert_eq!(loaded.sources, config.sources);
    }
}
