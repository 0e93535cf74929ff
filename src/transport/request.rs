//! Gateway routes and request descriptors.

use serde_json::Value;

use crate::model::unix_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// `GET /authorities`
    Discovery,
    /// `GET /health`
    Health,
    /// `POST /authorities/{name}/transfer`
    Transfer,
    /// `POST /authorities/{name}/confirmation`
    Confirmation,
    /// `POST /authorities/{name}/ping`
    Ping,
}

impl Route {
    /// Metric and log label.
    pub fn label(self) -> &'static str {
        match self {
            Route::Discovery => "discovery",
            Route::Health => "health",
            Route::Transfer => "transfer",
            Route::Confirmation => "confirmation",
            Route::Ping => "ping",
        }
    }

    /// Repeating the request cannot change state on the gateway.
    pub fn is_idempotent(self) -> bool {
        !matches!(self, Route::Transfer | Route::Confirmation)
    }

    pub fn is_post(self) -> bool {
        matches!(self, Route::Transfer | Route::Confirmation | Route::Ping)
    }
}

/// One logical call to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    route: Route,
    authority: Option<String>,
    body: Option<Value>,
}

impl GatewayRequest {
    pub fn discovery() -> Self {
        Self {
            route: Route::Discovery,
            authority: None,
            body: None,
        }
    }

    pub fn health() -> Self {
        Self {
            route: Route::Health,
            authority: None,
            body: None,
        }
    }

    /// Ping carrying the local send time in unix seconds.
    pub fn ping(authority: impl Into<String>) -> Self {
        Self {
            route: Route::Ping,
            authority: Some(authority.into()),
            body: Some(serde_json::json!({ "timestamp": unix_seconds() })),
        }
    }

    pub fn transfer(authority: impl Into<String>, body: Value) -> Self {
        Self {
            route: Route::Transfer,
            authority: Some(authority.into()),
            body: Some(body),
        }
    }

    pub fn confirmation(authority: impl Into<String>, body: Value) -> Self {
        Self {
            route: Route::Confirmation,
            authority: Some(authority.into()),
            body: Some(body),
        }
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Unencoded path segments relative to the gateway base URL.
    pub fn segments(&self) -> Vec<&str> {
        let name = self.authority.as_deref().unwrap_or_default();
        match self.route {
            Route::Discovery => vec!["authorities"],
            Route::Health => vec!["health"],
            Route::Transfer => vec!["authorities", name, "transfer"],
            Route::Confirmation => vec!["authorities", name, "confirmation"],
            Route::Ping => vec!["authorities", name, "ping"],
        }
    }

    /// Human-readable target used in error messages and logs.
    pub fn target(&self) -> String {
        format!("/{}", self.segments().join("/"))
    }
}

/// Unix time as fractional seconds, the timestamp format authorities expect.
pub fn unix_seconds() -> f64 {
    unix_millis() as f64 / 1000.0
}
