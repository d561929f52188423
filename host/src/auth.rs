//! Three-tier RPC authorization (§4.6: "viewer", "editor", "admin").
//!
//! Generalized from the teacher's `server/auth.rs` `ApiKeyStore`: the
//! teacher attaches a flat `permissions: Vec<String>` to each key and
//! enforces a single rate limit; here each key carries one `AuthTier` and
//! route groups are nested behind a middleware layer per tier, the same
//! way the teacher nests its `v1`/`v2`/`v3` API routers.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthTier {
    Viewer,
    Editor,
    Admin,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiKeyConfig {
    key: String,
    tier: AuthTier,
    #[serde(default)]
    rate_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub name: String,
    pub tier: AuthTier,
    pub rate_limit: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ApiKey {
    fn new(key: String, name: String, tier: AuthTier, rate_limit: Option<u32>) -> Self {
        Self {
            key,
            name,
            tier,
            rate_limit: rate_limit.unwrap_or(600),
            created_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthenticatedApiKey {
    pub key: String,
    pub name: String,
    pub tier: AuthTier,
}

/// Holds configured keys plus a per-key sliding one-minute request window,
/// the way the teacher's `ApiKeyStore` prunes `Vec<DateTime<Utc>>` on every
/// access rather than running a separate expiry task.
pub struct ApiKeyStore {
    enabled: bool,
    keys: RwLock<DashMap<String, ApiKey>>,
    rate_windows: RwLock<DashMap<String, Vec<chrono::DateTime<chrono::Utc>>>>,
}

impl ApiKeyStore {
    /// `api_keys_json` is a JSON object of `name -> {key, tier, rate_limit?}`.
    /// An empty string disables authorization entirely: every caller is
    /// treated as an anonymous `Admin`, matching the teacher's
    /// `ApiKeyStore::new("")` escape hatch for local development.
    pub fn new(api_keys_json: &str) -> Self {
        if api_keys_json.trim().is_empty() {
            return Self::disabled();
        }
        match serde_json::from_str::<HashMap<String, ApiKeyConfig>>(api_keys_json) {
            Ok(map) => {
                let keys = DashMap::new();
                let rate_windows = DashMap::new();
                for (name, cfg) in map {
                    rate_windows.insert(cfg.key.clone(), Vec::new());
                    keys.insert(cfg.key.clone(), ApiKey::new(cfg.key.clone(), name, cfg.tier, cfg.rate_limit));
                }
                Self {
                    enabled: true,
                    keys: RwLock::new(keys),
                    rate_windows: RwLock::new(rate_windows),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to parse api key config, authorization disabled");
                Self::disabled()
            }
        }
    }

    fn disabled() -> Self {
        Self {
            enabled: false,
            keys: RwLock::new(DashMap::new()),
            rate_windows: RwLock::new(DashMap::new()),
        }
    }

    pub async fn get_key(&self, key: &str) -> Option<ApiKey> {
        self.keys.read().await.get(key).map(|k| k.clone())
    }

    pub async fn list_keys(&self) -> Vec<ApiKey> {
        self.keys.read().await.iter().map(|e| e.value().clone()).collect()
    }

    async fn check_rate_limit(&self, key: &str, limit: u32) -> bool {
        let now = chrono::Utc::now();
        let window_start = now - chrono::Duration::minutes(1);
        let windows = self.rate_windows.read().await;
        let mut requests = windows.entry(key.to_string()).or_insert_with(Vec::new);
        requests.retain(|&t| t >= window_start);
        if requests.len() >= limit as usize {
            return false;
        }
        requests.push(now);
        true
    }
}

fn extract_api_key(req: &Request) -> String {
    req.headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn authorize(store: &ApiKeyStore, mut req: Request, next: Next, required: AuthTier) -> Result<Response, StatusCode> {
    if !store.enabled {
        req.extensions_mut().insert(AuthenticatedApiKey {
            key: "anonymous".to_string(),
            name: "anonymous".to_string(),
            tier: AuthTier::Admin,
        });
        return Ok(next.run(req).await);
    }

    let api_key = extract_api_key(&req);
    if api_key.is_empty() {
        warn!("no API key provided");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let Some(key_info) = store.get_key(&api_key).await else {
        warn!("unknown API key");
        return Err(StatusCode::UNAUTHORIZED);
    };

    if key_info.tier < required {
        warn!(name = %key_info.name, "API key lacks the required tier");
        return Err(StatusCode::FORBIDDEN);
    }

    if !store.check_rate_limit(&api_key, key_info.rate_limit).await {
        warn!(name = %key_info.name, "rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    debug!(name = %key_info.name, "authenticated");
    req.extensions_mut().insert(AuthenticatedApiKey {
        key: api_key,
        name: key_info.name,
        tier: key_info.tier,
    });
    Ok(next.run(req).await)
}

pub async fn require_viewer(State(store): State<Arc<ApiKeyStore>>, req: Request, next: Next) -> Result<Response, StatusCode> {
    authorize(&store, req, next, AuthTier::Viewer).await
}

pub async fn require_editor(State(store): State<Arc<ApiKeyStore>>, req: Request, next: Next) -> Result<Response, StatusCode> {
    authorize(&store, req, next, AuthTier::Editor).await
}

pub async fn require_admin(State(store): State<Arc<ApiKeyStore>>, req: Request, next: Next) -> Result<Response, StatusCode> {
    authorize(&store, req, next, AuthTier::Admin).await
}
