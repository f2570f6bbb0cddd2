use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SessionError::Parse(err.to_string())
        } else {
            SessionError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for SessionError {
    fn from(err: url::ParseError) -> Self {
        SessionError::InvalidUrl(err.to_string())
    }
}
