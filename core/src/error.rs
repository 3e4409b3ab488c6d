//! Error types for the private API client.
//!
//! # Design
//! Callers branch on error class (retry, abort, treat-as-empty), so every
//! class the remote side can express gets its own variant. Local input errors
//! are grouped under `ValidationError` and are always raised before a request
//! is rendered. Transport failures keep their source so a caller-level retry
//! policy can inspect them.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Malformed caller input, detected without any network I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid rank token {0:?}: expected a UUID")]
    InvalidRankToken(String),

    #[error("a rank token is required when paginating with an exclusion list")]
    MissingRankToken,

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("password is too common, choose a different one")]
    PasswordBlacklisted,

    #[error("biography is {actual} characters, the limit is {max}")]
    BiographyTooLong { max: usize, actual: usize },

    #[error("{value:?} is not a valid choice for {field}")]
    InvalidChoice { field: &'static str, value: String },

    #[error("search query must be a non-empty string")]
    EmptyQuery,

    #[error("{0:?} is not a valid email address")]
    InvalidEmail(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// Errors raised by the HTTP client collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    /// The request line or headers exceeded what the transport accepts.
    #[error("request headers too large")]
    HeadersTooLarge,

    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors returned by every client operation.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{endpoint} requires an authenticated session")]
    AuthenticationRequired { endpoint: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Remote rate limiting. Recoverable by backing off.
    #[error("throttled: {message}")]
    Throttled { message: String },

    #[error("request headers too large")]
    RequestHeadersTooLarge,

    #[error("the session is no longer valid, log in again")]
    LoginRequired,

    #[error("challenge required: {message}")]
    ChallengeRequired { message: String, url: Option<String> },

    #[error("feedback required: {message}")]
    FeedbackRequired { message: String },

    #[error("endpoint not found")]
    NotFound,

    /// The reply is not valid JSON.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The reply is JSON but does not match the expected shape.
    #[error("response does not match schema at `{field}`: {message}")]
    SchemaValidation { field: String, message: String },

    /// A multi-step flow did not reach the milestone the step expects.
    #[error("{flow} flow failed at step {index} ({step}): {reason}")]
    FlowProtocol {
        flow: &'static str,
        step: &'static str,
        index: u32,
        reason: String,
    },

    /// Any other non-success reply, with the remote message when present.
    #[error("HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("request payload could not be serialized: {0}")]
    Serialization(String),

    #[error("request was cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::HeadersTooLarge => ApiError::RequestHeadersTooLarge,
            other => ApiError::Transport(other),
        }
    }
}
