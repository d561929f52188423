mod common;

use common::server::TestServer;
use common::{COMMIT, JOB_NAME};
use serde_json::json;

const VIEWER_KEY: &str = "viewer-key";
const EDITOR_KEY: &str = "editor-key";

fn api_keys() -> String {
    json!({
        "ci-viewer": { "key": VIEWER_KEY, "tier": "viewer" },
        "ci-editor": { "key": EDITOR_KEY, "tier": "editor" },
    })
    .to_string()
}

#[tokio::test]
async fn missing_key_is_unauthorized() {
    let server = TestServer::start(&api_keys()).await;
    let client = reqwest::Client::new();

    let status = client.get(server.url("/prpc/JobService/SearchJobs")).send().await.unwrap().status();
    assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn viewer_key_cannot_trigger_jobs() {
    let server = TestServer::start(&api_keys()).await;
    let client = reqwest::Client::new();

    let status = client
        .post(server.url("/prpc/JobService/TriggerJobs"))
        .header("x-api-key", VIEWER_KEY)
        .json(&json!({ "triggers": [{ "job_name": JOB_NAME, "commit_hash": COMMIT }] }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn editor_key_can_trigger_and_viewer_key_can_read_it_back() {
    let server = TestServer::start(&api_keys()).await;
    let client = reqwest::Client::new();

    let trigger_status = client
        .post(server.url("/prpc/JobService/TriggerJobs"))
        .header("x-api-key", EDITOR_KEY)
        .json(&json!({ "triggers": [{ "job_name": JOB_NAME, "commit_hash": COMMIT }] }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(trigger_status, reqwest::StatusCode::OK);

    let search_status = client
        .get(server.url("/prpc/JobService/SearchJobs"))
        .header("x-api-key", VIEWER_KEY)
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(search_status, reqwest::StatusCode::OK);
}

#[tokio::test]
async fn health_and_metrics_are_unauthenticated() {
    let server = TestServer::start(&api_keys()).await;
    let client = reqwest::Client::new();

    let health = client.get(server.url("/healthz")).send().await.unwrap().status();
    assert_eq!(health, reqwest::StatusCode::OK);

    let metrics = client.get(server.url("/metrics")).send().await.unwrap().status();
    assert_eq!(metrics, reqwest::StatusCode::OK);
}
