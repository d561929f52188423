//! The external execution backend (§4.6: `GetTask(id, includeStats=true)`
//! "additionally calls the external execution backend for CAS upload/
//! download overhead numbers"). Kept abstract the way `sched_core`'s
//! `RepoGraph`/`Syncer` collaborators are, since the real backend is out of
//! scope (§1: "the object store for image blobs").

use async_trait::async_trait;
use sched_lib::error::SchedResult;
use sched_lib::model::Task;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct CasStats {
    pub upload_bytes: u64,
    pub download_bytes: u64,
    pub upload_millis: u64,
    pub download_millis: u64,
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn cas_stats(&self, task: &Task) -> SchedResult<CasStats>;
}

/// Reports zeroed stats for every task; used until a real CAS backend is
/// wired in.
pub struct NullExecutionBackend;

#[async_trait]
impl ExecutionBackend for NullExecutionBackend {
    async fn cas_stats(&self, _task: &Task) -> SchedResult<CasStats> {
        Ok(CasStats::default())
    }
}
