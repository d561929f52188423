use chrono::Utc;
use sched_lib::model::{JobStatus, Patch, RepoState, TaskKey, TaskStatus, TaskSummary};
use sched_lib::store::{Entity, Store};
use sched_tasks::mem::MemStore;
use sched_tasks::{Id, Job, Task};
use std::collections::BTreeMap;

fn job(seq: u64) -> Job {
    let now = Utc::now();
    Job {
        id: Id::new(now, seq),
        repo_state: RepoState {
            repo: "chromium".into(),
            revision: "abc123".into(),
            patch: Patch::default(),
        },
        name: "linux-rel".into(),
        priority: 0.7,
        dependencies: BTreeMap::new(),
        tasks: BTreeMap::new(),
        status: JobStatus::InProgress,
        created: now,
        requested: now,
        started: Some(now),
        finished: None,
        is_force: false,
        buildbucket_build_id: None,
        buildbucket_lease_key: None,
        db_modified: None,
    }
}

#[tokio::test]
async fn job_status_becomes_terminal_once_every_task_finishes() {
    let store = MemStore::new();
    let mut j = store.put(job(1)).await.unwrap();

    j.tasks.insert(
        "compile".into(),
        vec![TaskSummary {
            attempt: 1,
            status: TaskStatus::Success,
            created: j.created,
            started: j.started,
            finished: Some(Utc::now()),
            task_id: Id::new(j.created, 1),
        }],
    );
    j.recompute_status();
    assert_eq!(j.status, JobStatus::Success);
    assert!(j.finished.is_some());

    let saved = store.put(j).await.unwrap();
    assert_eq!(saved.status, JobStatus::Success);
}

#[tokio::test]
async fn task_id_skew_beyond_six_minutes_is_rejected() {
    let store = MemStore::new();
    let created = Utc::now();
    let too_early = created - chrono::Duration::minutes(7);

    let task = Task {
        id: Id::new(too_early, 1),
        task_key: TaskKey {
            repo_state: RepoState {
                repo: "chromium".into(),
                revision: "abc123".into(),
                patch: Patch::default(),
            },
            name: "compile".into(),
            forced_job_id: None,
        },
        commits: vec!["abc123".into()],
        attempt: 1,
        max_attempts: 1,
        status: TaskStatus::Pending,
        created,
        started: None,
        finished: None,
        parent_task_ids: vec![],
        retry_of: None,
        jobs: vec![],
        properties: BTreeMap::new(),
        isolated_output: None,
        swarming_task_id: None,
        swarming_bot_id: None,
        db_modified: None,
    };

    let err = store.put(task).await.unwrap_err();
    assert!(matches!(err, sched_lib::error::SchedError::InvalidArgument(_)));
}

#[tokio::test]
async fn get_from_date_range_widens_task_scans_by_the_skew_tolerance() {
    let store = MemStore::new();
    let created = Utc::now();
    // Id timestamp 5 minutes before created: within the 6-minute tolerance.
    let id_ts = created - chrono::Duration::minutes(5);

    let task = Task {
        id: Id::new(id_ts, 1),
        task_key: TaskKey {
            repo_state: RepoState {
                repo: "chromium".into(),
                revision: "abc123".into(),
                patch: Patch::default(),
            },
            name: "compile".into(),
            forced_job_id: None,
        },
        commits: vec![],
        attempt: 1,
        max_attempts: 1,
        status: TaskStatus::Pending,
        created,
        started: None,
        finished: None,
        parent_task_ids: vec![],
        retry_of: None,
        jobs: vec![],
        properties: BTreeMap::new(),
        isolated_output: None,
        swarming_task_id: None,
        swarming_bot_id: None,
        db_modified: None,
    };
    let saved = Store::<Task>::put(&store, task).await.unwrap();

    let found = Store::<Task>::get_from_date_range(
        &store,
        created - chrono::Duration::seconds(1),
        created + chrono::Duration::seconds(1),
        None,
    )
    .await
    .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, saved.id);
}
