//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → handed to AuthorityClient::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the client is constructed
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ClientConfig;
pub use schema::{
    CircuitBreakerConfig, DiscoveryConfig, GatewayConfig, HealthCheckConfig, ObservabilityConfig,
    OrderConfig, RetryConfig,
};
