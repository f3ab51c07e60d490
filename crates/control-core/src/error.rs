//! Crate-wide error taxonomy for the control plane.

use thiserror::Error;

/// The phase a middleware was executing in when it failed or aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewarePhase {
    Before,
    After,
}

impl std::fmt::Display for MiddlewarePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MiddlewarePhase::Before => write!(f, "before"),
            MiddlewarePhase::After => write!(f, "after"),
        }
    }
}

/// The full kind taxonomy from the error-handling design: every failure mode a
/// dispatch, registration, or staging operation can report.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("missing correlation id")]
    MissingCorrelationId,

    #[error("no route registered for {event_type} v{version}")]
    RouteNotFound { event_type: String, version: u32 },

    #[error("invalid route declaration: {0}")]
    HandlerSignatureError(String),

    #[error("middleware registration error: {0}")]
    MiddlewareRegistrationError(String),

    #[error("middleware {name} failed in {phase} phase")]
    MiddlewareExecutionError {
        name: String,
        phase: MiddlewarePhase,
    },

    #[error("correlation context corrupted: expected {expected}, found {found}")]
    ContextCorruption { expected: String, found: String },

    #[error("download unsupported: {0}")]
    DownloadUnsupported(String),

    #[error("broker channel closed: {0}")]
    BrokerChannelClosed(String),

    #[error("chat API call failed: {0}")]
    ChatApiError(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ControlResult<T> = Result<T, ControlError>;
