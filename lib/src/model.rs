//! Entity and value types (§3).

use crate::id::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// A content-addressed bundle reference used by `TaskSpec::cas_spec`.
pub type CasSpec = String;

/// An opaque binary fingerprint of a set of key/value pairs (§3, §GLOSSARY).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub struct GroupingId(pub String);

impl GroupingId {
    pub fn from_params(params: &BTreeMap<String, String>) -> Self {
        // A stable fingerprint: sorted key=value pairs, hex-digested. BTreeMap
        // iteration is already sorted, so this is deterministic across calls.
        let joined = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\u{1}");
        GroupingId(hex::encode(joined))
    }
}

/// Review-patch coordinates for a try/CL build. All fields may be empty; an
/// empty `Patch` and a missing `Patch` denote the same thing (§9).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Patch {
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub patch_set: String,
    #[serde(default)]
    pub patch_repo: String,
    #[serde(default)]
    pub server: String,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.issue.is_empty()
            && self.patch_set.is_empty()
            && self.patch_repo.is_empty()
            && self.server.is_empty()
    }
}

/// Identifies a build input: repo + revision, optionally a try/CL patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RepoState {
    pub repo: String,
    pub revision: String,
    #[serde(default)]
    pub patch: Patch,
}

impl RepoState {
    pub fn is_try(&self) -> bool {
        !self.patch.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    AnyBranch,
    MainOnly,
    Nightly,
    Weekly,
    OnDemand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobSpec {
    pub name: String,
    pub priority: f64,
    pub task_specs: Vec<String>,
    pub trigger: Trigger,
}

/// Timeouts are modeled in whole seconds on the wire, the way the teacher's
/// config types express proving timeouts as plain integers rather than
/// `chrono::Duration` (which has no stable wire representation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskSpec {
    pub name: String,
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub execution_timeout_secs: i64,
    pub expiration_secs: i64,
    pub io_timeout_secs: i64,
    pub cas_spec: CasSpec,
    pub priority: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    InProgress,
    Success,
    Failure,
    Mishap,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }

    /// Worst-status-wins ordering used to fold Task statuses into a Job
    /// status (§3 Invariant 3): Mishap is worst, then Failure, then Success.
    fn rank(self) -> u8 {
        match self {
            JobStatus::InProgress => 0,
            JobStatus::Success => 1,
            JobStatus::Failure => 2,
            JobStatus::Mishap => 3,
            JobStatus::Canceled => 4,
        }
    }
}

impl Ord for JobStatus {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}
impl PartialOrd for JobStatus {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failure,
    Mishap,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure | TaskStatus::Mishap)
    }

    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending | TaskStatus::Running => 0,
            TaskStatus::Success => 1,
            TaskStatus::Failure => 2,
            TaskStatus::Mishap => 3,
        }
    }
}

/// Derives the Job status that results from folding a set of Task
/// summaries, per §3 Invariant 3: in-progress while any summary is
/// non-terminal, otherwise the worst of failure/mishap wins over success.
pub fn derive_job_status(summaries: &[TaskSummary]) -> JobStatus {
    if summaries.is_empty() {
        return JobStatus::InProgress;
    }
    if summaries.iter().any(|s| !s.status.is_terminal()) {
        return JobStatus::InProgress;
    }
    let worst = summaries.iter().map(|s| s.status.rank()).max().unwrap_or(0);
    match worst {
        0 | 1 => JobStatus::Success,
        2 => JobStatus::Failure,
        _ => JobStatus::Mishap,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskSummary {
    pub attempt: u32,
    pub status: TaskStatus,
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub task_id: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Job {
    pub id: Id,
    pub repo_state: RepoState,
    pub name: String,
    pub priority: f64,
    pub dependencies: BTreeMap<String, Vec<String>>,
    pub tasks: BTreeMap<String, Vec<TaskSummary>>,
    pub status: JobStatus,
    pub created: DateTime<Utc>,
    pub requested: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub is_force: bool,
    pub buildbucket_build_id: Option<i64>,
    pub buildbucket_lease_key: Option<i64>,
    pub db_modified: Option<DateTime<Utc>>,
}

impl Job {
    /// Enforces `Requested <= Created` (§3): if `requested` is after
    /// `created`, clamp it to `created - 1 tick`.
    pub fn clamp_requested(created: DateTime<Utc>, requested: DateTime<Utc>) -> DateTime<Utc> {
        if requested > created {
            created - chrono::TimeDelta::milliseconds(1)
        } else {
            requested
        }
    }

    pub fn recompute_status(&mut self) {
        // §3: terminal status is monotonic. A Job force-terminated out of
        // band (e.g. `CancelJob`) must not be pulled back to in-progress by
        // stale task summaries still trickling in.
        if self.status.is_terminal() {
            return;
        }
        let all: Vec<TaskSummary> = self.tasks.values().flatten().cloned().collect();
        let next = derive_job_status(&all);
        if next.is_terminal() {
            self.finished = Some(Utc::now());
        }
        self.status = next;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TaskKey {
    pub repo_state: RepoState,
    pub name: String,
    pub forced_job_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Id,
    pub task_key: TaskKey,
    pub commits: Vec<String>,
    pub attempt: u32,
    pub max_attempts: u32,
    pub status: TaskStatus,
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub parent_task_ids: Vec<Id>,
    pub retry_of: Option<Id>,
    pub jobs: Vec<Id>,
    pub properties: BTreeMap<String, String>,
    pub isolated_output: Option<String>,
    pub swarming_task_id: Option<String>,
    pub swarming_bot_id: Option<String>,
    pub db_modified: Option<DateTime<Utc>>,
}

impl Task {
    /// §3: an Id may be assigned up to `TASK_ID_SKEW` before `created` is
    /// set; any larger divergence is a validation error on write.
    pub fn validate_id_skew(&self) -> Result<(), crate::error::SchedError> {
        if self.id.within_skew_of(self.created, crate::id::TASK_ID_SKEW) {
            Ok(())
        } else {
            Err(crate::error::SchedError::invalid_argument(format!(
                "task {} id timestamp diverges from created {} by more than {:?}",
                self.id, self.created, crate::id::TASK_ID_SKEW
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SkipRule {
    pub name: String,
    pub added_by: String,
    pub description: String,
    pub task_spec_patterns: Vec<String>,
    pub commits: Vec<String>,
    pub db_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrimaryBranchDiffCalculationWork {
    pub grouping_id: GroupingId,
    pub last_calculated_ts: DateTime<Utc>,
    pub calculation_lease_ends: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SecondaryBranchDiffCalculationWork {
    pub branch_name: String,
    pub grouping_id: GroupingId,
    pub last_updated_ts: DateTime<Utc>,
    pub digests: Vec<String>,
    pub last_calculated_ts: DateTime<Utc>,
    pub calculation_lease_ends: DateTime<Utc>,
}

impl crate::store::Entity for Job {
    type Id = Id;
    fn id(&self) -> &Id {
        &self.id
    }
    fn db_modified(&self) -> Option<DateTime<Utc>> {
        self.db_modified
    }
    fn set_db_modified(&mut self, ts: DateTime<Utc>) {
        self.db_modified = Some(ts);
    }
    fn created(&self) -> DateTime<Utc> {
        self.created
    }
}

impl crate::store::Entity for Task {
    type Id = Id;
    fn id(&self) -> &Id {
        &self.id
    }
    fn db_modified(&self) -> Option<DateTime<Utc>> {
        self.db_modified
    }
    fn set_db_modified(&mut self, ts: DateTime<Utc>) {
        self.db_modified = Some(ts);
    }
    fn created(&self) -> DateTime<Utc> {
        self.created
    }
}

impl crate::store::Entity for SkipRule {
    type Id = String;
    fn id(&self) -> &String {
        &self.name
    }
    fn db_modified(&self) -> Option<DateTime<Utc>> {
        self.db_modified
    }
    fn set_db_modified(&mut self, ts: DateTime<Utc>) {
        self.db_modified = Some(ts);
    }
    fn created(&self) -> DateTime<Utc> {
        // SkipRule has no Created field in §3; the store still needs
        // something to order by for GetFromDateRange-style scans, so we
        // reuse db_modified's wall-clock notion at construction time.
        self.db_modified.unwrap_or_else(Utc::now)
    }
}
