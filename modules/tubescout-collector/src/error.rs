use std::time::Duration;

/// Result type alias for collector operations.
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Faults raised by the browser capability.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Browser provisioning failed: {0}")]
    Provisioning(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Timed out after {}s waiting for {what}", .timeout.as_secs())]
    Timeout { what: String, timeout: Duration },

    #[error("Page script failed: {0}")]
    Script(String),

    #[error("CDP error: {0}")]
    Cdp(String),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Cdp(err.to_string())
    }
}

impl From<browser_session_client::SessionError> for BrowserError {
    fn from(err: browser_session_client::SessionError) -> Self {
        BrowserError::Provisioning(err.to_string())
    }
}

/// Faults raised by the run store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Run not found: {0}")]
    RunNotFound(uuid::Uuid),

    #[error("Invalid run transition {from} -> {to}")]
    InvalidTransition {
        from: tubescout_common::RunStatus,
        to: tubescout_common::RunStatus,
    },

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The pipeline finished but its outcome could not be written.
    #[error("Run outcome could not be recorded: {source}")]
    Unrecorded {
        outcome: tubescout_common::RunOutcome,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
