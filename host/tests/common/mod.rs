pub mod server;

use std::io::Write;
use tempfile::TempDir;

/// Lays out a `repo_graph.json` and a `<repo>/tasks.json` describing one
/// repo ("repo-a") with a single commit and a "build" job depending on two
/// task specs ("compile" <- "fetch-deps"), matching the fixture shape
/// `core::task_cfg_cache`'s own unit tests use.
pub struct Fixtures {
    dir: TempDir,
}

pub const REPO: &str = "repo-a";
pub const COMMIT: &str = "deadbeefcafe";
pub const JOB_NAME: &str = "build";

impl Fixtures {
    pub fn write() -> Self {
        let dir = TempDir::new().expect("tempdir");

        let repo_graph = serde_json::json!({
            REPO: {
                "branches": { "main": COMMIT },
                "commits": {
                    COMMIT: { "parent": null, "timestamp": "2024-01-01T00:00:00Z" }
                }
            }
        });
        write_json(&dir.path().join("repo_graph.json"), &repo_graph);

        let tasks = serde_json::json!({
            "job_specs": [
                { "name": JOB_NAME, "priority": 0.5, "task_specs": ["compile"], "trigger": "any-branch" }
            ],
            "task_specs": [
                {
                    "name": "compile", "dimensions": ["os:linux"], "dependencies": ["fetch-deps"],
                    "execution_timeout_secs": 60, "expiration_secs": 600, "io_timeout_secs": 60,
                    "cas_spec": "cas://compile", "priority": 0.5
                },
                {
                    "name": "fetch-deps", "dimensions": ["os:linux"], "dependencies": [],
                    "execution_timeout_secs": 60, "expiration_secs": 600, "io_timeout_secs": 60,
                    "cas_spec": "cas://fetch", "priority": 0.5
                }
            ]
        });
        let tasks_root = dir.path().join("tasks");
        std::fs::create_dir_all(tasks_root.join(REPO)).expect("mkdir tasks root");
        write_json(&tasks_root.join(REPO).join("tasks.json"), &tasks);

        Self { dir }
    }

    pub fn repo_graph_path(&self) -> std::path::PathBuf {
        self.dir.path().join("repo_graph.json")
    }

    pub fn tasks_root(&self) -> std::path::PathBuf {
        self.dir.path().join("tasks")
    }
}

fn write_json(path: &std::path::Path, value: &serde_json::Value) {
    let mut f = std::fs::File::create(path).expect("create fixture file");
    f.write_all(serde_json::to_string_pretty(value).unwrap().as_bytes()).expect("write fixture file");
}
