//! Local working-copy management via git2.
//!
//! Each repository worker owns exactly one [`LocalRepo`]; the checkout
//! sequence mutates its on-disk tree, so a working copy is never shared
//! between workers.

use std::path::{Path, PathBuf};

use churnscope_core::{ChurnError, CommitMeta, RepoSpec};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Oid, Repository, Sort};

/// An opened working copy, pinned to the default branch detected at
/// open time.
pub struct LocalRepo {
    repo: Repository,
    path: PathBuf,
    default_branch: String,
}

impl std::fmt::Debug for LocalRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRepo")
            .field("path", &self.path)
            .field("default_branch", &self.default_branch)
            .finish_non_exhaustive()
    }
}

/// Reject working-copy paths the external analyzer cannot receive as an
/// argv element: non-UTF-8, whitespace, or non-ASCII characters.
///
/// Checked before any work begins so a bad path fails the repository
/// up front instead of on commit one.
///
/// # Errors
///
/// Returns [`ChurnError::InvalidEnvironment`] for an incompatible path.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use churnscope_mine::repo::validate_worktree_path;
///
/// assert!(validate_worktree_path(Path::new("/data/repos/junit4")).is_ok());
/// assert!(validate_worktree_path(Path::new("/data/my repos/junit4")).is_err());
/// ```
pub fn validate_worktree_path(path: &Path) -> Result<(), ChurnError> {
    let Some(s) = path.to_str() else {
        return Err(ChurnError::InvalidEnvironment(format!(
            "working-copy path {} is not valid UTF-8",
            path.display()
        )));
    };
    if s.chars().any(|c| c.is_whitespace() || !c.is_ascii()) {
        return Err(ChurnError::InvalidEnvironment(format!(
            "working-copy path '{s}' contains whitespace or non-ASCII characters \
             the analyzer cannot handle"
        )));
    }
    Ok(())
}

/// Open the working copy for `spec`, cloning it if absent.
///
/// # Errors
///
/// Returns [`ChurnError::MissingDependency`] if no local copy exists and
/// cloning fails; this is fatal for the repository.
pub fn ensure_local_copy(spec: &RepoSpec, repos_dir: &Path) -> Result<LocalRepo, ChurnError> {
    let path = spec.local_path(repos_dir);

    let repo = if path.join(".git").exists() {
        Repository::open(&path).map_err(|e| {
            ChurnError::Git(format!("failed to open {}: {e}", path.display()))
        })?
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        RepoBuilder::new().clone(&spec.url, &path).map_err(|e| {
            ChurnError::MissingDependency(format!(
                "no local copy at {} and cloning {} failed: {e}",
                path.display(),
                spec.url
            ))
        })?
    };

    let default_branch = detect_default_branch(&repo);
    Ok(LocalRepo {
        repo,
        path,
        default_branch,
    })
}

fn detect_default_branch(repo: &Repository) -> String {
    // An interrupted traversal leaves HEAD detached, so HEAD alone is
    // not a reliable source for the branch name.
    if !repo.head_detached().unwrap_or(true) {
        if let Ok(head) = repo.head() {
            if let Some(name) = head.shorthand() {
                return name.to_string();
            }
        }
    }
    if let Ok(origin_head) = repo.find_reference("refs/remotes/origin/HEAD") {
        if let Some(target) = origin_head.symbolic_target() {
            if let Some(branch) = target.strip_prefix("refs/remotes/origin/") {
                return branch.to_string();
            }
        }
    }
    for candidate in ["main", "master"] {
        if repo
            .find_reference(&format!("refs/heads/{candidate}"))
            .is_ok()
        {
            return candidate.to_string();
        }
    }
    "master".to_string()
}

impl LocalRepo {
    /// The working-copy root on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Branch checked out again once traversal completes.
    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// Fetch `origin` and fast-forward the default branch if possible.
    ///
    /// Callers treat a failure here as a warning: an out-of-date copy is
    /// still minable.
    ///
    /// # Errors
    ///
    /// Returns [`ChurnError::Git`] if the fetch or fast-forward fails.
    pub fn freshen(&self) -> Result<(), ChurnError> {
        let mut remote = self
            .repo
            .find_remote("origin")
            .map_err(|e| ChurnError::Git(format!("no origin remote: {e}")))?;
        remote
            .fetch(&[] as &[&str], None, None)
            .map_err(|e| ChurnError::Git(format!("fetch failed: {e}")))?;

        let branch = &self.default_branch;
        let remote_ref = self
            .repo
            .find_reference(&format!("refs/remotes/origin/{branch}"))
            .map_err(|e| ChurnError::Git(format!("no remote-tracking ref for {branch}: {e}")))?;
        let remote_oid = remote_ref
            .target()
            .ok_or_else(|| ChurnError::Git(format!("origin/{branch} has no target")))?;

        let mut local_ref = self
            .repo
            .find_reference(&format!("refs/heads/{branch}"))
            .map_err(|e| ChurnError::Git(format!("no local branch {branch}: {e}")))?;
        let local_oid = local_ref
            .target()
            .ok_or_else(|| ChurnError::Git(format!("{branch} has no target")))?;

        if local_oid == remote_oid {
            return Ok(());
        }
        let can_ff = self
            .repo
            .graph_descendant_of(remote_oid, local_oid)
            .map_err(|e| ChurnError::Git(format!("ancestry check failed: {e}")))?;
        if !can_ff {
            return Err(ChurnError::Git(format!(
                "{branch} has diverged from origin/{branch}; not fast-forwarding"
            )));
        }
        local_ref
            .set_target(remote_oid, "churnscope: fast-forward")
            .map_err(|e| ChurnError::Git(format!("fast-forward failed: {e}")))?;
        Ok(())
    }

    /// The repository's full commit sequence, oldest first, with 1-based
    /// traversal indices.
    ///
    /// Walks the first-parent chain of the default branch so indices are
    /// contiguous and strictly increasing regardless of merge topology.
    ///
    /// # Errors
    ///
    /// Returns [`ChurnError::Git`] if the walk cannot be constructed.
    pub fn commit_sequence(&self) -> Result<Vec<CommitMeta>, ChurnError> {
        let mut revwalk = self
            .repo
            .revwalk()
            .map_err(|e| ChurnError::Git(format!("failed to create revwalk: {e}")))?;
        revwalk
            .set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)
            .map_err(|e| ChurnError::Git(format!("failed to set sorting: {e}")))?;
        revwalk
            .simplify_first_parent()
            .map_err(|e| ChurnError::Git(format!("failed to simplify to first parent: {e}")))?;
        revwalk
            .push_ref(&format!("refs/heads/{}", self.default_branch))
            .map_err(|e| ChurnError::Git(format!("failed to push branch tip: {e}")))?;

        let mut commits = Vec::new();
        for (pos, oid_result) in revwalk.enumerate() {
            let oid = oid_result.map_err(|e| ChurnError::Git(format!("revwalk error: {e}")))?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(|e| ChurnError::Git(format!("failed to find commit: {e}")))?;

            commits.push(CommitMeta {
                index: pos + 1,
                hash: oid.to_string(),
                message: commit
                    .message()
                    .unwrap_or("")
                    .lines()
                    .next()
                    .unwrap_or("")
                    .to_string(),
                timestamp: commit.time().seconds(),
                modified_files: self.modified_paths(&commit)?,
            });
        }
        Ok(commits)
    }

    fn modified_paths(&self, commit: &git2::Commit) -> Result<Vec<String>, ChurnError> {
        let diff = self.diff_against_parent(commit)?;
        let mut paths = Vec::new();
        for delta in diff.deltas() {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .unwrap_or(Path::new(""))
                .to_string_lossy()
                .to_string();
            if !path.is_empty() {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn diff_against_parent<'r>(
        &'r self,
        commit: &git2::Commit,
    ) -> Result<git2::Diff<'r>, ChurnError> {
        let commit_tree = commit
            .tree()
            .map_err(|e| ChurnError::Git(format!("failed to get commit tree: {e}")))?;
        let parent_tree = if commit.parent_count() > 0 {
            let parent = commit
                .parent(0)
                .map_err(|e| ChurnError::Git(format!("failed to get parent: {e}")))?;
            Some(
                parent
                    .tree()
                    .map_err(|e| ChurnError::Git(format!("failed to get parent tree: {e}")))?,
            )
        } else {
            None
        };
        self.repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&commit_tree), None)
            .map_err(|e| ChurnError::Git(format!("failed to compute diff: {e}")))
    }

    /// Per-file patch text for one commit, against its first parent.
    ///
    /// Returns `(path, unified-diff text)` pairs; binary files yield an
    /// empty text. Decoding errors are replaced, never fatal.
    ///
    /// # Errors
    ///
    /// Returns [`ChurnError::Git`] if the commit or its diff cannot be read.
    pub fn file_diffs(&self, hash: &str) -> Result<Vec<(String, String)>, ChurnError> {
        let oid = Oid::from_str(hash)
            .map_err(|e| ChurnError::Git(format!("bad commit hash {hash}: {e}")))?;
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|e| ChurnError::Git(format!("failed to find commit {hash}: {e}")))?;
        let diff = self.diff_against_parent(&commit)?;

        let mut out = Vec::new();
        for idx in 0..diff.deltas().len() {
            let Some(delta) = diff.get_delta(idx) else {
                continue;
            };
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .unwrap_or(Path::new(""))
                .to_string_lossy()
                .to_string();
            if path.is_empty() {
                continue;
            }
            let text = match git2::Patch::from_diff(&diff, idx) {
                Ok(Some(mut patch)) => match patch.to_buf() {
                    Ok(buf) => String::from_utf8_lossy(&buf).to_string(),
                    Err(_) => String::new(),
                },
                _ => String::new(),
            };
            out.push((path, text));
        }
        Ok(out)
    }

    /// Force-checkout one commit, leaving HEAD detached on it.
    ///
    /// # Errors
    ///
    /// Returns [`ChurnError::Git`] if the checkout fails.
    pub fn checkout_commit(&self, hash: &str) -> Result<(), ChurnError> {
        let oid = Oid::from_str(hash)
            .map_err(|e| ChurnError::Git(format!("bad commit hash {hash}: {e}")))?;
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|e| ChurnError::Git(format!("failed to find commit {hash}: {e}")))?;

        let mut opts = CheckoutBuilder::new();
        opts.force().remove_untracked(true);
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut opts))
            .map_err(|e| ChurnError::Git(format!("checkout of {hash} failed: {e}")))?;
        self.repo
            .set_head_detached(oid)
            .map_err(|e| ChurnError::Git(format!("failed to detach HEAD at {hash}: {e}")))?;
        Ok(())
    }

    /// Re-attach HEAD to the default branch after traversal completes.
    ///
    /// # Errors
    ///
    /// Returns [`ChurnError::Git`] if the branch cannot be checked out.
    pub fn checkout_default_branch(&self) -> Result<(), ChurnError> {
        let branch = &self.default_branch;
        self.repo
            .set_head(&format!("refs/heads/{branch}"))
            .map_err(|e| ChurnError::Git(format!("failed to set HEAD to {branch}: {e}")))?;
        let mut opts = CheckoutBuilder::new();
        opts.force();
        self.repo
            .checkout_head(Some(&mut opts))
            .map_err(|e| ChurnError::Git(format!("checkout of {branch} failed: {e}")))?;
        Ok(())
    }
}
