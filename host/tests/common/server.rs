use rand::Rng;
use sched_host::auth::ApiKeyStore;
use sched_host::repo_graph::JsonRepoGraph;
use sched_host::state::AppState;
use sched_host::syncer::JsonSyncer;
use sched_tasks::mem::MemStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::Fixtures;

/// Spins up a real `sched-host` server against an in-memory store and the
/// repo-graph/task-config fixtures written by [`Fixtures`], the way the
/// teacher's `TestServerBuilder` spins up a real server against an
/// in-memory request pool.
pub struct TestServer {
    pub address: String,
    cancel: CancellationToken,
    _fixtures: Fixtures,
}

impl TestServer {
    /// `api_keys_json`: empty string disables auth (every caller is an
    /// anonymous admin); otherwise the same `name -> {key, tier}` JSON the
    /// `--api-keys` flag accepts.
    pub async fn start(api_keys_json: &str) -> Self {
        let fixtures = Fixtures::write();
        let port: u16 = rand::thread_rng().gen_range(20000..60000);
        let address = format!("127.0.0.1:{port}");

        let graph = Arc::new(JsonRepoGraph::load(&fixtures.repo_graph_path()).expect("load repo graph fixture"));
        let syncer = JsonSyncer::new(fixtures.tasks_root());
        let store = Arc::new(MemStore::new());
        let auth = Arc::new(ApiKeyStore::new(api_keys_json));
        let state = AppState::new(store, graph, syncer, 90, 1, auth.clone());

        let cancel = CancellationToken::new();
        let serve_address = address.clone();
        let serve_cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = sched_host::server::serve(&serve_address, 16, auth, state, serve_cancel).await;
        });

        // Give the listener a moment to bind before the first request.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        Self { address, cancel, _fixtures: fixtures }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
