//! Version control adapter.
//!
//! Wraps `git2` behind a trait at the seam, with `Git2Vcs` as the only
//! implementation — the surface here is the small one a workspace
//! mutator actually needs: bring a workspace under version control,
//! then commit whatever an agent wrote to it.

use std::path::Path;

use git2::{IndexAddOption, Repository, Signature};

use crate::errors::VcsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsMode {
    /// `git init` an empty workspace directory.
    Init,
    /// `git clone` from a remote into the workspace directory.
    Clone,
}

#[derive(Debug, Clone)]
pub struct CommitResult {
    pub commit_id: String,
    pub branch: String,
    pub pushed: bool,
}

#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Committed(CommitResult),
    /// The working tree matched HEAD; nothing was committed.
    NoChanges,
}

pub trait Vcs: Send + Sync {
    fn setup(&self, workspace_path: &Path, mode: VcsMode, remote: Option<&str>) -> Result<(), VcsError>;
    fn commit(&self, workspace_path: &Path, message: &str) -> Result<CommitOutcome, VcsError>;
}

pub struct Git2Vcs;

impl Git2Vcs {
    pub fn new() -> Self {
        Self
    }

    fn signature() -> Result<Signature<'static>, VcsError> {
        Ok(Signature::now("agentdesk", "agents@localhost")?)
    }

    fn current_branch_name(repo: &Repository) -> String {
        repo.head()
            .ok()
            .and_then(|head| head.shorthand().map(str::to_string))
            .unwrap_or_else(|| "main".to_string())
    }
}

impl Default for Git2Vcs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vcs for Git2Vcs {
    fn setup(&self, workspace_path: &Path, mode: VcsMode, remote: Option<&str>) -> Result<(), VcsError> {
        if workspace_path.join(".git").exists() {
            return Err(VcsError::AlreadyExists { path: workspace_path.display().to_string() });
        }

        match mode {
            VcsMode::Init => {
                std::fs::create_dir_all(workspace_path)?;
                let repo = Repository::init(workspace_path)?;
                if let Some(url) = remote {
                    repo.remote("origin", url)?;
                }
                Ok(())
            }
            VcsMode::Clone => {
                let url = remote.ok_or(VcsError::MissingRemote)?;
                Repository::clone(url, workspace_path)?;
                Ok(())
            }
        }
    }

    fn commit(&self, workspace_path: &Path, message: &str) -> Result<CommitOutcome, VcsError> {
        let repo = Repository::open(workspace_path)?;

        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;

        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        if let Some(parent) = &parent {
            if parent.tree_id() == tree_id {
                return Ok(CommitOutcome::NoChanges);
            }
        }

        let signature = Self::signature()?;
        let parents: Vec<_> = parent.iter().collect();
        let summary = truncate_subject(message);
        let commit_id = repo.commit(Some("HEAD"), &signature, &signature, &summary, &tree, &parents)?;

        let branch = Self::current_branch_name(&repo);
        let pushed = push_if_origin_known(&repo, &branch).unwrap_or(false);

        Ok(CommitOutcome::Committed(CommitResult {
            commit_id: commit_id.to_string(),
            branch,
            pushed,
        }))
    }
}

/// Truncates a commit subject to 72 runes, the conventional git
/// subject-line limit: 69 runes of content plus a literal `"..."`.
fn truncate_subject(message: &str) -> String {
    const LIMIT: usize = 72;
    const ELLIPSIS: &str = "...";
    let first_line = message.lines().next().unwrap_or("");
    if first_line.chars().count() <= LIMIT {
        return first_line.to_string();
    }
    let keep = LIMIT - ELLIPSIS.len();
    let truncated: String = first_line.chars().take(keep).collect();
    format!("{truncated}{ELLIPSIS}")
}

/// Pushes `branch` to `origin` when that remote exists; any failure
/// (missing credentials, unreachable remote) degrades to "not pushed"
/// rather than failing the commit.
fn push_if_origin_known(repo: &Repository, branch: &str) -> Result<bool, git2::Error> {
    let mut remote = match repo.find_remote("origin") {
        Ok(remote) => remote,
        Err(_) => return Ok(false),
    };

    let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
    match remote.push(&[refspec.as_str()], None) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}
