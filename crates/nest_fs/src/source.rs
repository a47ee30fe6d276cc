//! Top-level locators: what a served prefix points at and how to open it

use crate::archive::ArchiveStore;
use crate::composite::CompositeFs;
use crate::format::is_supported_archive;
use crate::git::{clone_repository, is_git_locator};
use crate::local::LocalStore;
use crate::staging::{is_remote, Stager};
use crate::{Result, Store, VfsError};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    /// Directory or archive on the local disk
    Local,
    /// Repository cloned into a staged directory
    Git,
    /// `http(s)://` URL ending in an archive suffix, downloaded then indexed
    RemoteArchive,
    /// Any other `http(s)://` URL; proxied by the HTTP layer, not served here
    ReverseProxy,
}

impl SourceKind {
    pub fn classify(locator: &str) -> Self {
        if is_git_locator(locator) {
            return SourceKind::Git;
        }
        if !is_remote(locator) {
            return SourceKind::Local;
        }

        // Query strings and fragments do not count towards the suffix
        let path = url::Url::parse(locator)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| locator.to_string());
        if is_supported_archive(path.trim_end_matches('/')) {
            SourceKind::RemoteArchive
        } else {
            SourceKind::ReverseProxy
        }
    }
}

/// Build the root store for a locator
pub fn open_source(locator: &str, stager: &Stager) -> Result<Store> {
    let kind = SourceKind::classify(locator);
    tracing::debug!(locator, ?kind, "opening source");

    match kind {
        SourceKind::Local => open_local(Path::new(locator)),
        SourceKind::Git => Ok(Store::new(clone_repository(locator, stager)?)),
        SourceKind::RemoteArchive => {
            let fetched = stager.download_if_remote(locator)?;
            let archive = ArchiveStore::open(&fetched.path)?;
            Ok(Store::new(match fetched.staged {
                Some(staged) => archive.with_staged(staged),
                None => archive,
            }))
        }
        SourceKind::ReverseProxy => Err(VfsError::Unsupported(format!(
            "{} is a reverse-proxy target",
            locator
        ))),
    }
}

/// [`open_source`] wrapped in a composition
pub fn mount_source(locator: &str, stager: &Stager, suffix: &str) -> Result<CompositeFs> {
    let store = open_source(locator, stager)?;
    Ok(CompositeFs::new(store, stager.clone()).with_suffix(suffix))
}

fn open_local(path: &Path) -> Result<Store> {
    let metadata =
        std::fs::metadata(path).map_err(|e| VfsError::io(path.display().to_string(), e))?;

    if metadata.is_dir() {
        return Ok(Store::new(LocalStore::new(path)?));
    }
    if is_supported_archive(&path.to_string_lossy()) {
        return Ok(Store::new(ArchiveStore::open(path)?));
    }
    Err(VfsError::InvalidMount(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::StagingOptions;
    use crate::testing::zip_bytes;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_classify() {
        assert_eq!(SourceKind::classify("/srv/data"), SourceKind::Local);
        assert_eq!(SourceKind::classify("./pack.zip"), SourceKind::Local);
        assert_eq!(SourceKind::classify("https://github.com/o/r.git"), SourceKind::Git);
        assert_eq!(SourceKind::classify("git@github.com:o/r"), SourceKind::Git);
        assert_eq!(
            SourceKind::classify("https://example.com/dl/pack.TAR.GZ?token=1"),
            SourceKind::RemoteArchive
        );
        assert_eq!(SourceKind::classify("https://example.com/api/"), SourceKind::ReverseProxy);
    }

    #[test]
    fn test_open_local_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pack.zip"), zip_bytes(&[("a/b.txt", b"b")])).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"n").unwrap();
        let stager = Stager::default();

        let store = open_source(dir.path().to_str().unwrap(), &stager).unwrap();
        assert_eq!(store.kind(), "local");

        let store = open_source(dir.path().join("pack.zip").to_str().unwrap(), &stager).unwrap();
        assert_eq!(store.kind(), "archive");
        assert_eq!(store.read_file("a/b.txt").unwrap(), b"b");

        let err = open_source(dir.path().join("notes.txt").to_str().unwrap(), &stager).unwrap_err();
        assert!(matches!(err, VfsError::InvalidMount(_)));
        assert!(open_source("/definitely/not/here", &stager).unwrap_err().is_not_found());
    }

    #[test]
    fn test_reverse_proxy_is_unsupported() {
        let err = open_source("http://example.com/api", &Stager::default()).unwrap_err();
        assert!(matches!(err, VfsError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_remote_archive_is_downloaded_and_released() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/pack.zip"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[("inner/x.txt", b"remote")])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/gone.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let uri = server.uri();
        let temp = tempfile::tempdir().unwrap();
        let temp_root = temp.path().to_path_buf();

        tokio::task::spawn_blocking(move || {
            let stager = Stager::new(StagingOptions {
                temp_root: Some(temp_root.clone()),
                ..Default::default()
            });

            let fs = mount_source(&format!("{}/files/pack.zip", uri), &stager, "-dir").unwrap();
            assert_eq!(fs.read_file("inner/x.txt").unwrap(), b"remote");
            assert_eq!(std::fs::read_dir(&temp_root).unwrap().count(), 1);
            fs.close().unwrap();
            assert_eq!(std::fs::read_dir(&temp_root).unwrap().count(), 0);

            let err = open_source(&format!("{}/files/gone.zip", uri), &stager).unwrap_err();
            assert!(matches!(err, VfsError::Staging { .. }), "{:?}", err);
            assert_eq!(std::fs::read_dir(&temp_root).unwrap().count(), 0);
        })
        .await
        .unwrap();
    }
}
