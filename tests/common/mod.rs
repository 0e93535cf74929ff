//! Shared utilities for integration testing: an in-process mock gateway
//! bridge with programmable failures and per-route hit counters.

#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use authority_gateway::config::ClientConfig;

/// How a mock route answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// 200 with the route's normal body.
    Ok,
    /// The given HTTP status with a plain-text body.
    Fail(u16),
    /// Sleep, then answer normally.
    Delay(Duration),
    /// 200 with `{"success": false}`.
    Reject,
    /// Fail with `status` for the first `failures` hits, then answer normally.
    Flaky { failures: u32, status: u16 },
}

#[derive(Default)]
struct Route {
    hits: AtomicU32,
    mode: Mutex<Option<Mode>>,
}

impl Route {
    fn hit(&self) -> (u32, Mode) {
        let n = self.hits.fetch_add(1, Ordering::SeqCst) + 1;
        (n, self.mode.lock().unwrap().unwrap_or(Mode::Ok))
    }
}

#[derive(Default)]
struct GatewayState {
    authorities: Mutex<Vec<Value>>,
    discovery: Route,
    health: Route,
    transfer: Route,
    confirmation: Route,
    pings: Mutex<HashMap<String, Arc<Route>>>,
    last_transfer: Mutex<Option<Value>>,
}

impl GatewayState {
    fn ping_route(&self, name: &str) -> Arc<Route> {
        self.pings
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

pub struct MockGateway {
    pub addr: SocketAddr,
    state: Arc<GatewayState>,
}

impl MockGateway {
    /// Serve on an ephemeral port with the given discovery entries.
    pub async fn start(authorities: Vec<Value>) -> Self {
        let state = Arc::new(GatewayState::default());
        *state.authorities.lock().unwrap() = authorities;

        let app = Router::new()
            .route("/authorities", get(discovery))
            .route("/health", get(health))
            .route("/authorities/{name}/transfer", post(transfer))
            .route("/authorities/{name}/confirmation", post(confirmation))
            .route("/authorities/{name}/ping", post(ping))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_authorities(&self, authorities: Vec<Value>) {
        *self.state.authorities.lock().unwrap() = authorities;
    }

    pub fn set_discovery(&self, mode: Mode) {
        *self.state.discovery.mode.lock().unwrap() = Some(mode);
    }

    pub fn set_health(&self, mode: Mode) {
        *self.state.health.mode.lock().unwrap() = Some(mode);
    }

    pub fn set_transfer(&self, mode: Mode) {
        *self.state.transfer.mode.lock().unwrap() = Some(mode);
    }

    pub fn set_ping(&self, name: &str, mode: Mode) {
        *self.state.ping_route(name).mode.lock().unwrap() = Some(mode);
    }

    pub fn discovery_hits(&self) -> u32 {
        self.state.discovery.hits.load(Ordering::SeqCst)
    }

    pub fn health_hits(&self) -> u32 {
        self.state.health.hits.load(Ordering::SeqCst)
    }

    pub fn transfer_hits(&self) -> u32 {
        self.state.transfer.hits.load(Ordering::SeqCst)
    }

    pub fn confirmation_hits(&self) -> u32 {
        self.state.confirmation.hits.load(Ordering::SeqCst)
    }

    pub fn ping_hits(&self, name: &str) -> u32 {
        self.state.ping_route(name).hits.load(Ordering::SeqCst)
    }

    pub fn last_transfer(&self) -> Option<Value> {
        self.state.last_transfer.lock().unwrap().clone()
    }
}

async fn answer(hit: (u32, Mode), ok: Value) -> Response {
    let (n, mode) = hit;
    match mode {
        Mode::Ok => Json(ok).into_response(),
        Mode::Fail(code) => fail(code),
        Mode::Delay(delay) => {
            tokio::time::sleep(delay).await;
            Json(ok).into_response()
        }
        Mode::Reject => {
            Json(json!({"success": false, "error": "rejected by authority"})).into_response()
        }
        Mode::Flaky { failures, status } if n <= failures => fail(status),
        Mode::Flaky { .. } => Json(ok).into_response(),
    }
}

fn fail(code: u16) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, "mock failure").into_response()
}

async fn discovery(State(state): State<Arc<GatewayState>>) -> Response {
    let hit = state.discovery.hit();
    let authorities = state.authorities.lock().unwrap().clone();
    let count = authorities.len();
    answer(hit, json!({"authorities": authorities, "count": count})).await
}

async fn health(State(state): State<Arc<GatewayState>>) -> Response {
    let hit = state.health.hit();
    answer(hit, json!({"status": "healthy", "authorities": 3})).await
}

async fn transfer(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let hit = state.transfer.hit();
    *state.last_transfer.lock().unwrap() = Some(body);
    answer(hit, json!({"success": true, "authority": name})).await
}

async fn confirmation(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
    Json(_body): Json<Value>,
) -> Response {
    let hit = state.confirmation.hit();
    answer(hit, json!({"success": true, "authority": name})).await
}

async fn ping(State(state): State<Arc<GatewayState>>, Path(name): Path<String>) -> Response {
    let hit = state.ping_route(&name).hit();
    answer(hit, json!({"success": true, "authority": name, "latency_ms": 1.0})).await
}

/// Discovery entry in the gateway's wire format.
pub fn authority(name: &str, port: u16) -> Value {
    json!({
        "name": name,
        "ip": "10.0.0.10",
        "port": port,
        "position": {"x": 10.0, "y": 20.0, "z": 0.0},
        "status": "online",
        "committee_members": ["auth1", "auth2", "auth3"]
    })
}

pub fn authorities(names: &[&str]) -> Vec<Value> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| authority(name, 8001 + i as u16))
        .collect()
}

/// Client configuration tuned for fast, deterministic tests: monitors off,
/// millisecond backoff, fallback file inside `dir`.
pub fn test_config(base_url: &str, dir: &tempfile::TempDir) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.gateway.base_url = base_url.to_string();
    config.gateway.request_timeout_ms = 1_000;
    config.gateway.connect_timeout_ms = 500;
    config.discovery.ttl_secs = 30;
    config.discovery.background_refresh = false;
    config.discovery.fallback_path = dir.path().join("authorities_snapshot.json");
    config.health_check.enabled = false;
    config.circuit_breaker.failure_threshold = 5;
    config.circuit_breaker.recovery_timeout_ms = 30_000;
    config.retries.max_attempts = 3;
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 5;
    config
}

/// A base URL nothing is listening on.
pub async fn dead_gateway_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
