mod common;

use common::server::TestServer;
use common::{COMMIT, JOB_NAME};
use sched_lib::id::Id;
use sched_lib::model::Job;
use serde_json::json;

#[tokio::test]
async fn trigger_then_get_then_cancel() {
    let server = TestServer::start("").await;
    let client = reqwest::Client::new();

    let trigger_resp: serde_json::Value = client
        .post(server.url("/prpc/JobService/TriggerJobs"))
        .json(&json!({ "triggers": [{ "job_name": JOB_NAME, "commit_hash": COMMIT }] }))
        .send()
        .await
        .expect("trigger request")
        .json()
        .await
        .expect("trigger response body");

    let job_ids = trigger_resp["job_ids"].as_array().expect("job_ids array");
    assert_eq!(job_ids.len(), 1);
    let job_id: Id = job_ids[0].as_str().unwrap().parse().expect("parse job id");

    let get_resp: serde_json::Value = client
        .get(server.url(&format!("/prpc/JobService/GetJob/{job_id}")))
        .send()
        .await
        .expect("get request")
        .json()
        .await
        .expect("get response body");
    assert_eq!(get_resp["name"], JOB_NAME);
    assert!(get_resp["task_dimensions"]["compile"].as_array().is_some());

    let cancel_resp: serde_json::Value = client
        .post(server.url(&format!("/prpc/JobService/CancelJob/{job_id}")))
        .send()
        .await
        .expect("cancel request")
        .json()
        .await
        .expect("cancel response body");
    assert_eq!(cancel_resp["job"]["status"], "canceled");

    // Canceling an already-terminal job is a client error.
    let status = client
        .post(server.url(&format!("/prpc/JobService/CancelJob/{job_id}")))
        .send()
        .await
        .expect("second cancel request")
        .status();
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn repeated_trigger_dedupes_to_the_same_job() {
    let server = TestServer::start("").await;
    let client = reqwest::Client::new();
    let body = json!({ "triggers": [{ "job_name": JOB_NAME, "commit_hash": COMMIT }] });

    let first: serde_json::Value =
        client.post(server.url("/prpc/JobService/TriggerJobs")).json(&body).send().await.unwrap().json().await.unwrap();
    let second: serde_json::Value =
        client.post(server.url("/prpc/JobService/TriggerJobs")).json(&body).send().await.unwrap().json().await.unwrap();

    assert_eq!(first["job_ids"][0], second["job_ids"][0]);

    // The retried request must not have left a second Job behind in the
    // store under the id it discarded.
    let jobs: Vec<Job> = client
        .get(server.url("/prpc/JobService/SearchJobs"))
        .send()
        .await
        .expect("search request")
        .json()
        .await
        .expect("search response body");
    assert_eq!(jobs.len(), 1);
}

#[tokio::test]
async fn search_jobs_filters_by_status() {
    let server = TestServer::start("").await;
    let client = reqwest::Client::new();

    client
        .post(server.url("/prpc/JobService/TriggerJobs"))
        .json(&json!({ "triggers": [{ "job_name": JOB_NAME, "commit_hash": COMMIT }] }))
        .send()
        .await
        .unwrap();

    let jobs: Vec<Job> = client
        .get(server.url("/prpc/JobService/SearchJobs?status=in-progress"))
        .send()
        .await
        .expect("search request")
        .json()
        .await
        .expect("search response body");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].name, JOB_NAME);

    let none: Vec<Job> = client
        .get(server.url("/prpc/JobService/SearchJobs?status=success"))
        .send()
        .await
        .expect("search request")
        .json()
        .await
        .expect("search response body");
    assert!(none.is_empty());
}

#[tokio::test]
async fn trigger_unknown_commit_is_not_found() {
    let server = TestServer::start("").await;
    let client = reqwest::Client::new();

    let status = client
        .post(server.url("/prpc/JobService/TriggerJobs"))
        .json(&json!({ "triggers": [{ "job_name": JOB_NAME, "commit_hash": "not-a-real-commit" }] }))
        .send()
        .await
        .expect("trigger request")
        .status();
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
}
