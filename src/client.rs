//! Public entry point tying the subsystems together.
//!
//! # Data Flow
//! ```text
//! caller
//!     → AuthorityClient (validation, authority resolution)
//!     → DiscoveryCache / FanOutProber / Gateway
//!     → RetryPolicy → CircuitBreaker → RequestDispatcher → gateway bridge
//! ```
//!
//! # Design Decisions
//! - No global instance; each client owns its transport, breaker, and cache
//! - Inputs are validated before any I/O
//! - An unknown authority costs exactly one forced refresh

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::validation::validate_config;
use crate::config::ClientConfig;
use crate::discovery::{Discovery, DiscoveryCache, DiscoveryRefresher, FallbackStore};
use crate::error::{ClientError, ClientResult};
use crate::gateway::Gateway;
use crate::health::{FanOutProber, HealthMonitor};
use crate::lifecycle::TaskGroup;
use crate::model::orders::validate_authority_name;
use crate::model::{AuthorityRecord, ConfirmationOrder, FanOutReport, ProbeResult, TransferOrder};
use crate::observability::{MetricsAggregator, MetricsSnapshot};
use crate::transport::request::unix_seconds;

/// Identifies this client in forwarded order metadata.
pub const GATEWAY_CLIENT_ID: &str = concat!("authority-gateway/", env!("CARGO_PKG_VERSION"));

pub struct AuthorityClient {
    config: ClientConfig,
    metrics: Arc<MetricsAggregator>,
    gateway: Arc<Gateway>,
    cache: Arc<DiscoveryCache>,
    prober: Arc<FanOutProber>,
    tasks: Mutex<Option<TaskGroup>>,
}

impl AuthorityClient {
    /// Build a stopped client. Fails on invalid configuration.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        validate_config(&config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            ClientError::Validation(joined)
        })?;

        let metrics = Arc::new(MetricsAggregator::new());
        let gateway = Arc::new(Gateway::new(&config, metrics.clone())?);
        let cache = Arc::new(DiscoveryCache::new(
            gateway.clone(),
            FallbackStore::new(&config.discovery.fallback_path),
            config.discovery.ttl(),
            metrics.clone(),
        ));
        let prober = Arc::new(FanOutProber::new(gateway.clone(), metrics.clone()));

        Ok(Self {
            config,
            metrics,
            gateway,
            cache,
            prober,
            tasks: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.gateway.is_open()
    }

    /// Open the transport and spawn the background monitors. Idempotent.
    pub async fn start(&self) -> ClientResult<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Ok(());
        }

        self.gateway.open()?;

        let mut group = TaskGroup::new();
        if self.config.discovery.background_refresh {
            let refresher = DiscoveryRefresher::new(self.cache.clone());
            group.spawn("discovery_refresher", move |shutdown| refresher.run(shutdown));
        }
        if self.config.health_check.enabled {
            let monitor = HealthMonitor::new(
                self.prober.clone(),
                self.cache.clone(),
                Duration::from_secs(self.config.health_check.interval_secs),
            );
            group.spawn("health_monitor", move |shutdown| monitor.run(shutdown));
        }

        tracing::info!(
            gateway = %self.config.gateway.base_url,
            background_tasks = group.len(),
            "Authority client started"
        );
        *tasks = Some(group);
        Ok(())
    }

    /// Stop monitors, abort in-flight calls, and release the transport.
    /// Returns once nothing spawned by the client is still running.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        let group = tasks.take();
        if let Some(group) = &group {
            group.signal();
        }

        self.gateway.close().await;
        self.cache.abandon_refresh();

        if let Some(group) = group {
            group.join().await;
            tracing::info!("Authority client stopped");
        }
    }

    fn ensure_running(&self) -> ClientResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(ClientError::NotRunning)
        }
    }

    /// Current authority set, from cache when fresh.
    pub async fn get_authorities(&self) -> ClientResult<Vec<AuthorityRecord>> {
        Ok(self.discover().await?.snapshot.to_vec())
    }

    /// Like [`get_authorities`](Self::get_authorities) but reports freshness
    /// and the snapshot generation.
    pub async fn discover(&self) -> ClientResult<Discovery> {
        self.ensure_running()?;
        self.cache.get().await
    }

    /// Refresh from the gateway regardless of TTL.
    pub async fn force_refresh(&self) -> ClientResult<Vec<AuthorityRecord>> {
        self.ensure_running()?;
        Ok(self.cache.force_refresh().await?.snapshot.to_vec())
    }

    pub async fn get_authority(&self, name: &str) -> ClientResult<Option<AuthorityRecord>> {
        Ok(self.discover().await?.snapshot.get(name).cloned())
    }

    /// Make sure `name` is known, refreshing once if it is not.
    async fn resolve(&self, name: &str) -> ClientResult<()> {
        if self.cache.get().await?.snapshot.contains(name) {
            return Ok(());
        }
        tracing::debug!(authority = name, "Unknown authority, forcing discovery refresh");
        if self.cache.force_refresh().await?.snapshot.contains(name) {
            Ok(())
        } else {
            Err(ClientError::AuthorityNotFound(name.to_string()))
        }
    }

    pub async fn send_transfer(&self, authority: &str, order: &TransferOrder) -> ClientResult<Value> {
        validate_authority_name(authority)?;
        order.validate(&self.config.orders)?;
        self.ensure_running()?;
        self.resolve(authority).await?;

        let body = with_metadata(order, authority)?;
        tracing::info!(
            authority,
            order_id = %order.order_id,
            amount = order.amount,
            token = %order.token,
            "Forwarding transfer order"
        );
        self.gateway.post_transfer(authority, body).await
    }

    pub async fn send_confirmation(
        &self,
        authority: &str,
        confirmation: &ConfirmationOrder,
    ) -> ClientResult<Value> {
        validate_authority_name(authority)?;
        confirmation.validate()?;
        self.ensure_running()?;
        self.resolve(authority).await?;

        let body = with_metadata(confirmation, authority)?;
        tracing::info!(
            authority,
            transfer_order_id = %confirmation.transfer_order_id,
            confirmed = confirmation.confirmed,
            "Forwarding confirmation order"
        );
        self.gateway.post_confirmation(authority, body).await
    }

    /// Probe one authority and record its status.
    pub async fn ping_authority(&self, authority: &str) -> ClientResult<ProbeResult> {
        validate_authority_name(authority)?;
        self.ensure_running()?;
        self.resolve(authority).await?;

        let generation = self
            .cache
            .peek()
            .map(|d| d.generation)
            .unwrap_or_default();
        let outcome = self.prober.probe(authority).await;
        if let Some(status) = outcome.status {
            self.cache
                .apply_statuses(generation, &[(authority.to_string(), status)]);
        }
        Ok(outcome.result)
    }

    /// Probe every known authority concurrently.
    pub async fn ping_all(&self) -> ClientResult<FanOutReport> {
        self.ensure_running()?;
        self.prober.sweep(&self.cache).await
    }

    /// Body of the gateway's `/health` endpoint.
    pub async fn gateway_health(&self) -> ClientResult<Value> {
        self.ensure_running()?;
        self.gateway.health().await
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Serialize an order and stamp it with forwarding metadata.
fn with_metadata<T: serde::Serialize>(order: &T, authority: &str) -> ClientResult<Value> {
    let mut fields = match serde_json::to_value(order) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => {
            let mut fields = Map::new();
            fields.insert("order".to_string(), other);
            fields
        }
        Err(e) => return Err(ClientError::Validation(format!("unserializable order: {}", e))),
    };
    fields.insert("timestamp".to_string(), Value::from(unix_seconds()));
    fields.insert("gateway_client".to_string(), Value::from(GATEWAY_CLIENT_ID));
    fields.insert("target_authority".to_string(), Value::from(authority));
    Ok(Value::Object(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_added_to_order() {
        let order = TransferOrder::new("alice", "bob", 500, "USDC", 3);
        let body = with_metadata(&order, "auth2").unwrap();
        assert_eq!(body["sender"], "alice");
        assert_eq!(body["amount"], 500);
        assert_eq!(body["target_authority"], "auth2");
        assert_eq!(body["gateway_client"], GATEWAY_CLIENT_ID);
        assert!(body["timestamp"].as_f64().is_some());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ClientConfig::default();
        config.retries.max_attempts = 0;
        config.gateway.base_url = String::new();
        match AuthorityClient::new(config) {
            Err(ClientError::Validation(msg)) => {
                assert!(msg.contains("max_attempts"));
                assert!(msg.contains("base_url"));
            }
            other => panic!("expected validation error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_operations_require_start() {
        let client = AuthorityClient::new(ClientConfig::default()).unwrap();
        assert!(!client.is_running());
        assert_eq!(client.get_authorities().await.unwrap_err(), ClientError::NotRunning);
        assert_eq!(client.ping_all().await.unwrap_err(), ClientError::NotRunning);
        assert_eq!(client.gateway_health().await.unwrap_err(), ClientError::NotRunning);
    }

    #[tokio::test]
    async fn test_validation_precedes_io() {
        let client = AuthorityClient::new(ClientConfig::default()).unwrap();
        let bad = TransferOrder::new("alice", "alice", 10, "USDT", 1);
        let err = client.send_transfer("auth1", &bad).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));

        let good = TransferOrder::new("alice", "bob", 10, "USDT", 1);
        let err = client.send_transfer("bad/name", &good).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }
}
