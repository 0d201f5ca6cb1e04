use thiserror::Error;

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Everything that can go wrong between the backend, the event stream and the stores.
///
/// None of these are fatal. Page loads that fail leave the affected list with
/// `has_more == false`; the caller decides whether to offer a retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The request could not be sent or the response could not be received.
    #[error("network error: {0}")]
    NetworkFailure(String),
    /// The backend answered with a non-success status.
    #[error("server error ({status}): {message}")]
    ServerError { status: u16, message: String },
    /// The body was not JSON, or lacked the fields we need.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Response for a superseded request or a conversation that is no longer active.
    #[error("stale result discarded")]
    StaleResult,
    #[error("event stream: {0}")]
    Stream(String),
    #[error("config: {0}")]
    Config(String),
    #[error("no conversation is open")]
    NoActiveConversation,
}

impl SyncError {
    pub fn is_stale(&self) -> bool {
        matches!(self, SyncError::StaleResult)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::ServerError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            SyncError::NetworkFailure(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::MalformedResponse(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Stream(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::Config(format!("invalid url: {err}"))
    }
}
