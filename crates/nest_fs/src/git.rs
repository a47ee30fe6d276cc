//! Git store: clone a repository into a staged directory and serve the tree

use crate::local::LocalStore;
use crate::staging::{CancelToken, Stager};
use crate::{Result, VfsError};
use std::fs;
use std::io;
use std::path::Path;

/// Repository metadata removed from the root of a finished clone
const STRIPPED: &[&str] = &[".git", ".gitignore", ".gitmodules", ".gitattributes"];

#[derive(Debug, Clone)]
pub struct GitOptions {
    /// Branch for the first attempt (`None` follows the remote HEAD)
    pub branch: Option<String>,
    /// Branch for the single retry
    pub fallback_branch: String,
    /// History depth for network clones (0 = full history)
    pub depth: u32,
}

impl Default for GitOptions {
    fn default() -> Self {
        Self {
            branch: None,
            fallback_branch: "master".to_string(),
            depth: 1,
        }
    }
}

/// `.git` suffix, `ssh://`/`git://` URLs and scp-style `user@host:path` remotes
pub fn is_git_locator(locator: &str) -> bool {
    let trimmed = locator.trim_end_matches('/');
    if trimmed.to_lowercase().ends_with(".git") {
        return true;
    }

    let lower = trimmed.to_lowercase();
    if lower.starts_with("ssh://") || lower.starts_with("git://") {
        return true;
    }
    is_scp_like(trimmed)
}

fn is_scp_like(locator: &str) -> bool {
    if locator.contains("://") {
        return false;
    }
    match (locator.find('@'), locator.find(':')) {
        (Some(at), Some(colon)) => at > 0 && at < colon && colon + 1 < locator.len(),
        _ => false,
    }
}

/// Whether the transport supports shallow fetches (libgit2's local transport does not)
fn is_network_transport(url: &str) -> bool {
    let lower = url.to_lowercase();
    ["http://", "https://", "ssh://", "git://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
        || is_scp_like(url)
}

/// Clone `url` into a staged directory and wrap the checked-out tree.
///
/// The first attempt uses the configured branch (or the remote HEAD); on failure
/// the partial tree is discarded and one retry is made with the fallback branch.
/// Any failure releases the staged directory before returning.
pub fn clone_repository(url: &str, stager: &Stager) -> Result<LocalStore> {
    let options = &stager.options().git;
    let staged = stager.stage_temp_dir("git")?;
    let tree = staged.path().join("tree");

    let primary = options.branch.as_deref();
    let mut result = clone_once(url, &tree, primary, options.depth, stager.cancel_token());

    let fallback = options.fallback_branch.as_str();
    if let Err(e) = &result {
        if primary != Some(fallback) && !stager.cancel_token().is_cancelled() {
            tracing::warn!(url, branch = ?primary, "clone failed, retrying with {}: {}", fallback, e);
            remove_tree(&tree).map_err(|e| VfsError::staging(url, e))?;
            result = clone_once(url, &tree, Some(fallback), options.depth, stager.cancel_token());
        }
    }

    if let Err(e) = result {
        return Err(if stager.cancel_token().is_cancelled() {
            VfsError::staging(url, "clone cancelled")
        } else {
            VfsError::staging(url, e)
        });
    }

    strip_metadata(&tree).map_err(|e| VfsError::staging(url, e))?;
    tracing::info!(url, path = %tree.display(), "cloned repository");
    LocalStore::staged(&tree, staged)
}

fn clone_once(
    url: &str,
    dest: &Path,
    branch: Option<&str>,
    depth: u32,
    cancel: &CancelToken,
) -> std::result::Result<(), git2::Error> {
    let cancel = cancel.clone();
    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.transfer_progress(move |_progress| !cancel.is_cancelled());

    let mut fetch = git2::FetchOptions::new();
    fetch.remote_callbacks(callbacks);
    if depth > 0 && is_network_transport(url) {
        fetch.depth(depth as i32);
    }

    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch);
    if let Some(branch) = branch {
        builder.branch(branch);
        // Single-branch refspec
        let refspec = format!("+refs/heads/{0}:refs/remotes/origin/{0}", branch);
        builder.remote_create(move |repo, name, url| repo.remote_with_fetch(name, url, &refspec));
    }

    tracing::debug!(url, ?branch, depth, "cloning");
    builder.clone(url, dest)?;
    Ok(())
}

fn remove_tree(tree: &Path) -> io::Result<()> {
    match fs::remove_dir_all(tree) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn strip_metadata(tree: &Path) -> io::Result<()> {
    for name in STRIPPED {
        let path = tree.join(name);
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::StagingOptions;
    use crate::Store;
    use git2::{IndexAddOption, Repository, Signature};

    /// Working repository with one commit; returns its directory and HEAD branch
    fn origin() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("README.md"), b"# origin").unwrap();
        fs::write(root.join(".gitignore"), b"target/\n").unwrap();
        fs::write(root.join(".gitmodules"), b"").unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/lib.rs"), b"pub fn f() {}").unwrap();

        let repo = Repository::init(root).unwrap();
        let mut index = repo.index().unwrap();
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test User", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();

        let branch = repo.head().unwrap().shorthand().unwrap().to_string();
        (dir, branch)
    }

    fn stager_in(root: &Path, git: GitOptions) -> Stager {
        Stager::new(StagingOptions {
            temp_root: Some(root.to_path_buf()),
            git,
            ..Default::default()
        })
    }

    #[test]
    fn test_locator_detection() {
        assert!(is_git_locator("https://github.com/o/r.git"));
        assert!(is_git_locator("https://github.com/o/r.git/"));
        assert!(is_git_locator("git@github.com:o/r"));
        assert!(is_git_locator("ssh://git@host/o/r"));
        assert!(!is_git_locator("https://example.com/a.zip"));
        assert!(!is_git_locator("/srv/data"));
        assert!(!is_git_locator("C:\\data"));

        assert!(is_network_transport("git@github.com:o/r.git"));
        assert!(!is_network_transport("/tmp/origin"));
    }

    #[test]
    fn test_clone_strips_repository_metadata() {
        let (origin, _) = origin();
        let temp = tempfile::tempdir().unwrap();
        let stager = stager_in(temp.path(), GitOptions::default());

        let local = clone_repository(origin.path().to_str().unwrap(), &stager).unwrap();
        let root = local.root().to_path_buf();
        for name in STRIPPED {
            assert!(!root.join(name).exists(), "{} survived", name);
        }

        let store = Store::new(local);
        assert_eq!(store.read_file("src/lib.rs").unwrap(), b"pub fn f() {}");
        let names: Vec<_> = store.read_dir("").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["README.md", "src"]);

        store.close().unwrap();
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_retries_with_fallback_branch() {
        let (origin, head) = origin();
        let temp = tempfile::tempdir().unwrap();
        let stager = stager_in(
            temp.path(),
            GitOptions {
                branch: Some("no-such-branch".into()),
                fallback_branch: head,
                depth: 1,
            },
        );

        let store = Store::new(clone_repository(origin.path().to_str().unwrap(), &stager).unwrap());
        assert_eq!(store.read_file("README.md").unwrap(), b"# origin");
    }

    #[test]
    fn test_failure_is_staging_error_and_leaves_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("absent-origin");
        let stager_root = temp.path().join("stage");
        let stager = stager_in(&stager_root, GitOptions::default());

        let err = clone_repository(missing.to_str().unwrap(), &stager).unwrap_err();
        assert!(matches!(err, VfsError::Staging { .. }), "{:?}", err);
        assert_eq!(fs::read_dir(&stager_root).unwrap().count(), 0);
    }
}
