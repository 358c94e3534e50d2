use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// No usable token locally; no request was sent
    #[error("Not logged in")]
    NoSession,

    /// The server answered 401; the local session has been cleared
    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Server unreachable: {0}")]
    Network(#[from] TransportError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Failed to encode request body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    #[error("{message} (status {status})")]
    Request { status: StatusCode, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("End date {end} is before start date {start}")]
    InvalidRange { start: String, end: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Failures of the login exchange.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Rejected(String),

    #[error("Server unreachable: {0}")]
    Network(#[from] TransportError),

    #[error("Invalid login response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Failure to obtain any response from the server.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct TransportError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl TransportError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let cut = (0..=MAX_ERROR_BODY_LENGTH)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
        }
    }

    /// Error for a non-success status returned to an endpoint wrapper
    pub fn from_status(status: StatusCode, context: &str, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            context.to_string()
        } else {
            format!("{}: {}", context, Self::truncate_body(body))
        };
        ApiError::Request { status, message }
    }

    /// True when the caller should send the user back to the login prompt
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::NoSession | ApiError::SessionExpired)
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Request { status, .. } => Some(*status),
            ApiError::SessionExpired => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }
}
