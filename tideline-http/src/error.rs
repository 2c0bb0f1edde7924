use thiserror::Error;
use tideline::{ResolveError, SchedulerFull, SocketError};

/// Errors surfaced through a request's completion callback.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Hostname resolution failed or returned no candidates.
    #[error("resolve: {0}")]
    Resolve(#[from] ResolveError),

    /// No candidate address accepted a connection attempt.
    #[error("no address candidate accepted a connection")]
    ConnectFailed,

    /// Fatal transport condition while sending or receiving.
    #[error("transport: {0}")]
    Transport(#[from] SocketError),

    /// A sub-task could not be scheduled.
    #[error("scheduler: {0}")]
    Scheduler(#[from] SchedulerFull),

    /// A POST was issued without a body.
    #[error("request body is missing or empty")]
    EmptyBody,

    /// The response stream is not valid HTTP.
    #[error("response is not valid HTTP")]
    InvalidResponse,

    /// The response uses a transfer encoding this client does not support.
    #[error("unsupported response transfer encoding")]
    Unsupported,
}
