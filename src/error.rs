//! Error taxonomy for the gateway client.
//!
//! Every public operation returns [`ClientResult`]. Callers branch on the
//! variant, never on the message text.

use thiserror::Error;

/// Why a single exchange with the gateway failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureKind {
    /// No response within the per-call deadline.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The TCP/TLS connection could not be established; nothing was sent.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The connection broke after the request was written.
    #[error("transport error: {0}")]
    Transport(String),

    /// The gateway answered with a non-success HTTP status.
    #[error("gateway returned HTTP {0}")]
    Status(u16),

    /// The body could not be decoded as the expected JSON.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// The gateway relayed an explicit `success: false` from the authority.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The call was cut short because the client is stopping.
    #[error("aborted by client shutdown")]
    Aborted,
}

impl FailureKind {
    /// Transient failures are worth retrying and count against the breaker.
    pub fn is_transient(&self) -> bool {
        match self {
            FailureKind::Timeout(_) | FailureKind::Connect(_) | FailureKind::Transport(_) => true,
            FailureKind::Status(code) => *code >= 500,
            FailureKind::Decode(_) | FailureKind::Rejected(_) | FailureKind::Aborted => false,
        }
    }

    /// True when the request never left this process.
    pub fn request_not_sent(&self) -> bool {
        matches!(self, FailureKind::Connect(_))
    }

    /// Short label used for metric dimensions.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Timeout(_) => "timeout",
            FailureKind::Connect(_) => "connect",
            FailureKind::Transport(_) => "transport",
            FailureKind::Status(_) => "status",
            FailureKind::Decode(_) => "decode",
            FailureKind::Rejected(_) => "rejected",
            FailureKind::Aborted => "aborted",
        }
    }
}

/// Errors surfaced by [`crate::AuthorityClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Malformed caller input. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The gateway breaker is open; no I/O was attempted.
    #[error("circuit open for gateway {endpoint}")]
    CircuitOpen { endpoint: String },

    /// Transport or HTTP failure after retries were exhausted.
    #[error("communication with {target} failed: {kind}")]
    Communication { target: String, kind: FailureKind },

    /// No authority data from live refresh, cache, or fallback store.
    #[error("authority discovery failed: {0}")]
    Discovery(String),

    /// The gateway health endpoint could not be reached.
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The named authority is not part of the known set.
    #[error("authority {0} not found")]
    AuthorityNotFound(String),

    /// The client has not been started, or has been stopped.
    #[error("client is not running")]
    NotRunning,
}

impl ClientError {
    pub(crate) fn communication(target: impl Into<String>, kind: FailureKind) -> Self {
        ClientError::Communication {
            target: target.into(),
            kind,
        }
    }

    /// Whether the retry policy may issue another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Communication { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }

    /// Failure classification, when the error came from the transport.
    pub fn failure_kind(&self) -> Option<&FailureKind> {
        match self {
            ClientError::Communication { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
