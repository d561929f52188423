//! A file-backed `Syncer` (§4.3): reads `<tasks_root>/<repo>/tasks.json` as
//! the repo's job/task config, independent of `revision` — a source-tree
//! checkout + real config parse is out of scope (§1 Non-goals list the
//! commit-graph provider; the config sync is its sibling), matching how
//! `JsonRepoGraph` stands in for a live VCS host.

use async_trait::async_trait;
use sched_core::task_cfg_cache::{Config, SyncError, Syncer};
use sched_lib::model::RepoState;
use std::path::PathBuf;

pub struct JsonSyncer {
    root: PathBuf,
}

impl JsonSyncer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Syncer for JsonSyncer {
    async fn sync(&self, repo_state: &RepoState) -> Result<Config, SyncError> {
        let path = self.root.join(&repo_state.repo).join("tasks.json");
        let data = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SyncError::Transient(format!("reading {}: {e}", path.display())))?;
        serde_json::from_str(&data)
            .map_err(|e| SyncError::Permanent(format!("parsing {}: {e}", path.display())))
    }
}
