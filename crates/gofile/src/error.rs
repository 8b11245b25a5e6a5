//! Error types for GoFile API calls

/// Errors from GoFile API calls.
///
/// None of the variants carry the bearer token.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The request exceeded the client timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Non-success HTTP status
    #[error("GoFile returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// HTTP 200 with a non-"ok" status in the JSON envelope
    #[error("GoFile reported {status}: {body}")]
    Api { status: String, body: String },

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Local file could not be read for upload
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Map a reqwest transport error, keeping timeouts distinguishable.
    pub(crate) fn from_transport(context: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(format!("{context}: {e}"))
        } else {
            Error::Http(format!("{context}: {e}"))
        }
    }
}

/// Result alias for GoFile operations.
pub type Result<T> = std::result::Result<T, Error>;
