pub mod error;

pub use error::{Result, SessionError};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// A browser session provisioned on the remote broker.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSession {
    pub id: String,
    /// CDP websocket endpoint for this session.
    pub connect: String,
    /// Fully-qualified URL that terminates the session, when the broker supplies one.
    #[serde(default)]
    pub stop: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct CreateSessionRequest {
    /// Session lifetime in milliseconds.
    ttl: u64,
    stealth: bool,
}

pub struct BrowserSessionClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl BrowserSessionClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let base_url = Url::parse(base_url.trim_end_matches('/'))?;

        Ok(Self {
            client,
            base_url,
            token: token.map(String::from),
        })
    }

    /// Provision a new remote browser session with the given lifetime.
    pub async fn create_session(&self, ttl: Duration) -> Result<RemoteSession> {
        let endpoint = self.endpoint("session")?;
        let body = CreateSessionRequest {
            ttl: ttl.as_millis() as u64,
            stealth: false,
        };

        tracing::info!(broker = %self.base_url, ttl_secs = ttl.as_secs(), "Creating browser session");

        let resp = self.client.post(endpoint).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SessionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: RemoteSession = resp.json().await?;
        tracing::info!(session_id = %session.id, "Browser session created");
        Ok(session)
    }

    /// Terminate a remote session. A session the broker no longer knows
    /// about counts as stopped.
    pub async fn stop_session(&self, session: &RemoteSession) -> Result<()> {
        let endpoint = match session.stop.as_deref() {
            Some(stop) => self.with_token(Url::parse(stop)?),
            None => self.endpoint(&format!("session/{}", session.id))?,
        };

        let resp = self.client.delete(endpoint).send().await?;

        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            tracing::info!(session_id = %session.id, "Browser session stopped");
            return Ok(());
        }

        let message = resp.text().await.unwrap_or_default();
        Err(SessionError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SessionError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty();
            segments.extend(path.split('/'));
        }
        Ok(self.with_token(url))
    }

    fn with_token(&self, mut url: Url) -> Url {
        if let Some(ref token) = self.token {
            let has_token = url.query_pairs().any(|(k, _)| k == "token");
            if !has_token {
                url.query_pairs_mut().append_pair("token", token);
            }
        }
        url
    }
}
