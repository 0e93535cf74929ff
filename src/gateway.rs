//! Typed operations against the gateway bridge.
//!
//! Every call runs through the same pipeline:
//!
//! ```text
//! operation → RetryPolicy (attempts) → CircuitBreaker (admission)
//!           → RequestDispatcher (one HTTP exchange)
//! ```

use serde_json::Value;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::model::DiscoverySnapshot;
use crate::observability::MetricsAggregator;
use crate::resilience::retries::{retry_transient, retry_unsent, Retryable};
use crate::resilience::{CircuitBreaker, RetryPolicy};
use crate::transport::{GatewayRequest, RequestDispatcher};

#[derive(Debug)]
pub struct Gateway {
    dispatcher: RequestDispatcher,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl Gateway {
    pub fn new(config: &ClientConfig, metrics: Arc<MetricsAggregator>) -> ClientResult<Self> {
        let dispatcher = RequestDispatcher::new(&config.gateway, metrics.clone())?;
        let breaker = CircuitBreaker::new(
            dispatcher.base_url().as_str(),
            &config.circuit_breaker,
            metrics.clone(),
        );
        let retry = RetryPolicy::new(&config.retries, metrics);
        Ok(Self {
            dispatcher,
            breaker,
            retry,
        })
    }

    pub fn open(&self) -> ClientResult<()> {
        self.dispatcher.open()
    }

    pub async fn close(&self) {
        self.dispatcher.close().await;
    }

    pub fn is_open(&self) -> bool {
        self.dispatcher.is_open()
    }

    /// Run one logical call through retry, breaker, and dispatcher.
    pub async fn call(&self, request: GatewayRequest) -> ClientResult<Value> {
        if !self.dispatcher.is_open() {
            return Err(ClientError::NotRunning);
        }

        let route = request.route();
        let retryable: Retryable = if route.is_idempotent() {
            retry_transient
        } else {
            retry_unsent
        };

        let dispatcher = &self.dispatcher;
        let request = &request;
        self.retry
            .execute(&self.breaker, route.label(), retryable, move |_| {
                dispatcher.dispatch(request)
            })
            .await
    }

    /// `GET /authorities`, decoded into a snapshot.
    pub async fn fetch_authorities(&self) -> ClientResult<DiscoverySnapshot> {
        let body = self.call(GatewayRequest::discovery()).await?;
        DiscoverySnapshot::from_discovery_body(body)
    }

    /// `GET /health`. Transport failures become `GatewayUnavailable`.
    pub async fn health(&self) -> ClientResult<Value> {
        self.call(GatewayRequest::health())
            .await
            .map_err(|err| match err {
                ClientError::Communication { kind, .. } => {
                    ClientError::GatewayUnavailable(kind.to_string())
                }
                other => other,
            })
    }

    pub async fn ping(&self, authority: &str) -> ClientResult<Value> {
        self.call(GatewayRequest::ping(authority)).await
    }

    pub async fn post_transfer(&self, authority: &str, body: Value) -> ClientResult<Value> {
        self.call(GatewayRequest::transfer(authority, body)).await
    }

    pub async fn post_confirmation(&self, authority: &str, body: Value) -> ClientResult<Value> {
        self.call(GatewayRequest::confirmation(authority, body)).await
    }
}
