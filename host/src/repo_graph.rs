//! A file-backed `RepoGraph` (§1's abstract commit-graph provider is
//! explicitly out of scope; this is the minimal concrete implementation
//! that lets the binary actually run, the way the teacher's `ProverState`
//! loads `SupportedChainSpecs` from `chain_spec_list_default.json` instead
//! of querying a live chain registry).

use chrono::{DateTime, Utc};
use sched_lib::repo_graph::{Commit, RepoGraph, RepoGraphError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CommitEntry {
    parent: Option<String>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RepoEntry {
    #[serde(default)]
    branches: HashMap<String, String>,
    commits: HashMap<String, CommitEntry>,
}

/// Loaded once at startup from `--repo-graph-path`; reloading (for a repo
/// graph that changes at runtime) is out of scope, matching the teacher's
/// one-shot `merge_from_file` load of its own chain spec list.
#[derive(Debug, Default)]
pub struct JsonRepoGraph(HashMap<String, RepoEntry>);

impl JsonRepoGraph {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let repos: HashMap<String, RepoEntry> = serde_json::from_str(&data)?;
        Ok(Self(repos))
    }

    fn entry(&self, repo: &str) -> Result<&RepoEntry, RepoGraphError> {
        self.0.get(repo).ok_or_else(|| RepoGraphError::UnknownRepo(repo.to_string()))
    }
}

impl RepoGraph for JsonRepoGraph {
    fn repos(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    fn branch_heads(&self, repo: &str) -> Result<Vec<String>, RepoGraphError> {
        Ok(self.entry(repo)?.branches.values().cloned().collect())
    }

    fn commit(&self, repo: &str, hash: &str) -> Result<Commit, RepoGraphError> {
        let entry = self.entry(repo)?;
        let c = entry
            .commits
            .get(hash)
            .ok_or_else(|| RepoGraphError::UnknownCommit(hash.to_string()))?;
        Ok(Commit {
            hash: hash.to_string(),
            parent: c.parent.clone(),
            timestamp: c.timestamp,
        })
    }

    fn is_ancestor(&self, repo: &str, ancestor: &str, descendant: &str) -> Result<bool, RepoGraphError> {
        let mut cur = Some(descendant.to_string());
        while let Some(hash) = cur {
            if hash == ancestor {
                return Ok(true);
            }
            cur = self.commit(repo, &hash)?.parent;
        }
        Ok(false)
    }

    fn branch_heads_named(&self, repo: &str, branch: &str) -> Result<Vec<String>, RepoGraphError> {
        let entry = self.entry(repo)?;
        entry
            .branches
            .get(branch)
            .cloned()
            .map(|h| vec![h])
            .ok_or_else(|| RepoGraphError::UnknownCommit(branch.to_string()))
    }
}
