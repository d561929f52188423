//! The abstract commit graph collaborator (§1: "treated as an abstract repo
//! graph with branches, parents, timestamps"). Concrete providers (a real
//! VCS host, or a test double) implement this trait; every other component
//! depends only on the trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub hash: String,
    pub parent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RepoGraphError {
    #[error("unknown repo: {0}")]
    UnknownRepo(String),
    #[error("unknown commit: {0}")]
    UnknownCommit(String),
}

#[async_trait]
pub trait RepoGraph: Send + Sync {
    fn repos(&self) -> Vec<String>;

    /// All known branch heads for a repo, most-frequently-consulted first is
    /// not assumed; callers sort if they care.
    fn branch_heads(&self, repo: &str) -> Result<Vec<String>, RepoGraphError>;

    fn commit(&self, repo: &str, hash: &str) -> Result<Commit, RepoGraphError>;

    /// Is `main` reachable from `ancestor` by walking first-parent, i.e. is
    /// `ancestor` an ancestor-or-self of the repo's main branch head?
    fn is_ancestor(&self, repo: &str, ancestor: &str, descendant: &str) -> Result<bool, RepoGraphError>;

    /// Prefers `main`, falls back to `master`; errors if neither exists
    /// (§4.4 periodic trigger step 1).
    fn main_branch_head(&self, repo: &str) -> Result<String, RepoGraphError> {
        for name in ["main", "master"] {
            if let Ok(heads) = self.branch_heads_named(repo, name) {
                if let Some(h) = heads.into_iter().next() {
                    return Ok(h);
                }
            }
        }
        Err(RepoGraphError::UnknownCommit(format!(
            "no main or master branch in {repo}"
        )))
    }

    fn branch_heads_named(&self, repo: &str, branch: &str) -> Result<Vec<String>, RepoGraphError>;

    /// Walks first-parent from `end`, excluding anything reachable from
    /// `start`, and returns the inclusive-of-`end`/exclusive-of-`start` set
    /// (§3 SkipRule commit range expansion).
    fn resolve_commit_range(
        &self,
        repo: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<String>, RepoGraphError> {
        let mut excluded = std::collections::HashSet::new();
        let mut cur = Some(start.to_string());
        while let Some(h) = cur {
            excluded.insert(h.clone());
            cur = self.commit(repo, &h)?.parent;
        }

        let mut out = Vec::new();
        let mut cur = Some(end.to_string());
        while let Some(h) = cur {
            if excluded.contains(&h) {
                break;
            }
            let commit = self.commit(repo, &h)?;
            out.push(h.clone());
            cur = commit.parent;
        }
        Ok(out)
    }
}
