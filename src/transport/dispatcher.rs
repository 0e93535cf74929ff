//! Request dispatch to the gateway bridge.
//!
//! # Responsibilities
//! - Own the pooled HTTP transport for the client's lifetime
//! - Bound concurrent calls with a semaphore
//! - Enforce the per-call deadline
//! - Classify every failure into a [`FailureKind`]
//! - Abort in-flight calls when the client stops
//!
//! # Design Decisions
//! - The transport is created by `open()` and released by `close()`, never
//!   per request
//! - `close()` waits for every permit, so no call outlives it
//! - Authority names are percent-encoded as single path segments

use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use url::Url;

use crate::config::GatewayConfig;
use crate::error::{ClientError, ClientResult, FailureKind};
use crate::observability::MetricsAggregator;
use crate::transport::request::GatewayRequest;

#[derive(Debug)]
pub struct RequestDispatcher {
    base_url: Url,
    config: GatewayConfig,
    transport: RwLock<Option<reqwest::Client>>,
    permits: Semaphore,
    max_in_flight: u32,
    abort: watch::Sender<bool>,
    metrics: Arc<MetricsAggregator>,
}

impl RequestDispatcher {
    pub fn new(config: &GatewayConfig, metrics: Arc<MetricsAggregator>) -> ClientResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ClientError::Validation(format!("invalid gateway URL '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Validation(format!(
                "gateway URL '{}' cannot carry a path",
                config.base_url
            )));
        }

        let max_in_flight = config.max_concurrent_requests.clamp(1, u32::MAX as usize) as u32;
        let (abort, _) = watch::channel(false);

        Ok(Self {
            base_url,
            config: config.clone(),
            transport: RwLock::new(None),
            permits: Semaphore::new(max_in_flight as usize),
            max_in_flight,
            abort,
            metrics,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_open(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Build the pooled transport. Idempotent.
    pub fn open(&self) -> ClientResult<()> {
        let mut slot = self.transport.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(());
        }

        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout())
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(self.config.pool_idle_timeout_secs))
            .build()
            .map_err(|e| ClientError::Validation(format!("failed to build HTTP client: {}", e)))?;

        *slot = Some(client);
        self.abort.send_replace(false);
        tracing::debug!(base_url = %self.base_url, "Gateway transport opened");
        Ok(())
    }

    /// Abort in-flight calls, wait for them to unwind, then drop the pool.
    pub async fn close(&self) {
        let client = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if client.is_none() {
            return;
        }

        self.abort.send_replace(true);
        if let Ok(all) = self.permits.acquire_many(self.max_in_flight).await {
            drop(all);
        }
        drop(client);
        tracing::debug!(base_url = %self.base_url, "Gateway transport closed");
    }

    /// Issue one physical attempt. No retries happen here.
    pub async fn dispatch(&self, request: &GatewayRequest) -> ClientResult<Value> {
        let client = self
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClientError::NotRunning)?;

        let route = request.route();
        let mut abort_rx = self.abort.subscribe();

        let _permit = tokio::select! {
            biased;
            _ = abort_rx.wait_for(|aborted| *aborted) => return Err(ClientError::NotRunning),
            permit = self.permits.acquire() => permit.map_err(|_| ClientError::NotRunning)?,
        };

        let url = self.url_for(request)?;
        let deadline = self.config.request_timeout();
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = abort_rx.wait_for(|aborted| *aborted) => Err(FailureKind::Aborted),
            result = tokio::time::timeout(deadline, exchange(&client, request, url, deadline)) => {
                result.unwrap_or(Err(FailureKind::Timeout(deadline.as_millis() as u64)))
            }
        };

        match outcome {
            Ok(body) => {
                let elapsed = started.elapsed();
                self.metrics.record_request_success(route.label(), elapsed);
                tracing::debug!(
                    route = route.label(),
                    target = %request.target(),
                    latency_ms = elapsed.as_millis() as u64,
                    "Gateway call succeeded"
                );
                Ok(body)
            }
            Err(FailureKind::Aborted) => {
                tracing::debug!(
                    route = route.label(),
                    target = %request.target(),
                    "Gateway call aborted by shutdown"
                );
                Err(ClientError::communication(request.target(), FailureKind::Aborted))
            }
            Err(kind) => {
                self.metrics.record_request_failure(route.label(), &kind);
                tracing::warn!(
                    route = route.label(),
                    target = %request.target(),
                    error = %kind,
                    "Gateway call failed"
                );
                Err(ClientError::communication(request.target(), kind))
            }
        }
    }

    fn url_for(&self, request: &GatewayRequest) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Validation("gateway URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(request.segments());
        Ok(url)
    }
}

async fn exchange(
    client: &reqwest::Client,
    request: &GatewayRequest,
    url: Url,
    deadline: Duration,
) -> Result<Value, FailureKind> {
    let builder = if request.route().is_post() {
        let body = request.body().cloned().unwrap_or(Value::Object(Default::default()));
        client.post(url).json(&body)
    } else {
        client.get(url)
    };

    let response = builder
        .send()
        .await
        .map_err(|e| classify(e, deadline))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FailureKind::Status(status.as_u16()));
    }

    let bytes = response.bytes().await.map_err(|e| classify(e, deadline))?;
    let body: Value = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).map_err(|e| FailureKind::Decode(e.to_string()))?
    };

    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let reason = body
            .get("error")
            .or_else(|| body.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("authority reported failure");
        return Err(FailureKind::Rejected(reason.to_string()));
    }

    Ok(body)
}

fn classify(err: reqwest::Error, deadline: Duration) -> FailureKind {
    if err.is_timeout() {
        FailureKind::Timeout(deadline.as_millis() as u64)
    } else if err.is_connect() {
        FailureKind::Connect(err.to_string())
    } else if err.is_decode() {
        FailureKind::Decode(err.to_string())
    } else {
        FailureKind::Transport(err.to_string())
    }
}
