use thiserror::Error;

/// Failure modes of a single HTTP round trip against the PVE API.
///
/// The transport layer performs exactly one attempt per call; every way that
/// attempt can fail is normalized into one of these variants. Retry policy
/// lives entirely in the task poller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within its deadline.
    #[error("request timed out")]
    Timeout,

    /// Any transfer-level failure other than a timeout (DNS, connect,
    /// TLS handshake, connection reset, ...).
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The server answered 400 Bad Request.
    #[error("server rejected the request (400 Bad Request)")]
    BadRequest,

    /// The server answered 401 Unauthorized.
    #[error("authentication was rejected (401 Unauthorized)")]
    Unauthorized,

    /// The server answered 403 Forbidden.
    #[error("access denied (403 Forbidden)")]
    Forbidden,

    /// The server answered 404 Not Found.
    #[error("resource not found (404 Not Found)")]
    NotFound,

    /// Any other non-2xx status (5xx and unmapped 4xx codes).
    #[error("server answered with unexpected status {status}")]
    ServerError { status: u16 },

    /// The response body could not be decoded as JSON (including empty
    /// bodies on endpoints that are expected to return one).
    #[error("response body could not be decoded as JSON")]
    JsonDecodeFailed,
}

/// Errors surfaced by the guest lifecycle operations.
#[derive(Error, Debug)]
pub enum PveError {
    /// The underlying HTTP round trip failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response arrived but its shape did not match the expected
    /// schema. The full decoding diagnostic is logged at the point of
    /// detection; callers only see which operation drifted.
    #[error("response schema mismatch while {operation}")]
    Schema { operation: &'static str },
}

/// Errors constructing a [`PveEndpoint`](crate::PveEndpoint).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// The credential contains bytes that cannot appear in an HTTP header.
    #[error("credential contains bytes that cannot appear in an HTTP header")]
    CredentialNotHeaderSafe,
}

/// End-to-end outcome of a failed provisioning run.
///
/// Each variant wraps the step that aborted the run. Note the asymmetry:
/// `CloneFailed` means no guest was created, while `PollFailed`,
/// `PollTimedOut` and `ConfigUpdateFailed` may leave a half-cloned or
/// misconfigured guest behind. No rollback is attempted.
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// The clone request itself was rejected; no task was started.
    #[error("template clone failed")]
    CloneFailed(#[source] PveError),

    /// The clone task did not reach a terminal state within the polling
    /// budgets (either the iteration or the error budget ran out).
    #[error("clone task did not reach a terminal state within budget")]
    PollTimedOut,

    /// The clone task stopped with a non-OK exit status.
    #[error("clone task finished unsuccessfully (exit status {exit_status:?})")]
    PollFailed { exit_status: Option<String> },

    /// The clone succeeded but the follow-up config update did not; the
    /// guest exists but is misconfigured.
    #[error("guest config update failed")]
    ConfigUpdateFailed(#[source] PveError),

    /// The caller's cancellation token fired while polling.
    #[error("provisioning was cancelled")]
    Cancelled,
}

/// Type alias for results of a single transport call.
pub type TransportResult<T> = Result<T, TransportError>;

/// Type alias for results of guest lifecycle operations.
pub type PveResult<T> = Result<T, PveError>;
