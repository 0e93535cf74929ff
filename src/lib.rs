//! Resilient client for authorities reachable through a gateway bridge.

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod health;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod resilience;
pub mod transport;

pub use client::AuthorityClient;
pub use config::schema::ClientConfig;
pub use discovery::{Discovery, Freshness};
pub use error::{ClientError, ClientResult, FailureKind};
