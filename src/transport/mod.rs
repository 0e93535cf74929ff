//! Transport to the gateway bridge.
//!
//! # Data Flow
//! ```text
//! GatewayRequest (request.rs)
//!     → dispatcher.rs (permit, deadline, reqwest exchange)
//!     → JSON body or classified FailureKind
//! ```

pub mod dispatcher;
pub mod request;

pub use dispatcher::RequestDispatcher;
pub use request::{GatewayRequest, Route};
