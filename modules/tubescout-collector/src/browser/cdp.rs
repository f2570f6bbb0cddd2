// Remote Chromium over CDP.
//
// A session is provisioned on the broker, then chromiumoxide connects to the
// websocket endpoint the broker hands back. The CDP handler runs on its own
// tokio task for the lifetime of the session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use browser_session_client::{BrowserSessionClient, RemoteSession};
use chromiumoxide::browser::Browser;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserError, BrowserPage, BrowserProvider, BrowserResult, BrowserSession, WaitPolicy};

/// Poll interval for selector and readiness waits.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Upper bound on closing the CDP connection during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const READY_STATE_SCRIPT: &str =
    "() => ({ href: location.href, state: document.readyState })";

pub struct CdpBrowserProvider {
    client: Arc<BrowserSessionClient>,
    session_ttl: Duration,
    nav_timeout: Duration,
}

impl CdpBrowserProvider {
    pub fn new(client: BrowserSessionClient, session_ttl: Duration, nav_timeout: Duration) -> Self {
        info!(
            ttl_secs = session_ttl.as_secs(),
            nav_timeout_secs = nav_timeout.as_secs(),
            "CdpBrowserProvider initialized"
        );
        Self {
            client: Arc::new(client),
            session_ttl,
            nav_timeout,
        }
    }
}

#[async_trait]
impl BrowserProvider for CdpBrowserProvider {
    async fn acquire(&self) -> BrowserResult<Box<dyn BrowserSession>> {
        let remote = self.client.create_session(self.session_ttl).await?;

        let (browser, mut handler) = match Browser::connect(remote.connect.clone()).await {
            Ok(pair) => pair,
            Err(e) => {
                // The remote session exists even though we never attached to it.
                stop_remote(&self.client, &remote).await;
                return Err(BrowserError::Provisioning(format!(
                    "CDP connect to session {} failed: {e}",
                    remote.id
                )));
            }
        };

        let session_id = remote.id.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(session_id = %session_id, error = %e, "CDP handler stopped");
                    break;
                }
            }
        });

        info!(session_id = %remote.id, "Connected to remote browser");

        Ok(Box::new(CdpSession {
            client: self.client.clone(),
            nav_timeout: self.nav_timeout,
            inner: Some(SessionInner {
                browser: Arc::new(Mutex::new(browser)),
                handler_task,
                remote,
            }),
        }))
    }
}

struct SessionInner {
    browser: Arc<Mutex<Browser>>,
    handler_task: JoinHandle<()>,
    remote: RemoteSession,
}

struct CdpSession {
    client: Arc<BrowserSessionClient>,
    nav_timeout: Duration,
    inner: Option<SessionInner>,
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn new_page(&self) -> BrowserResult<Box<dyn BrowserPage>> {
        let inner = self
            .inner
            .as_ref()
            .ok_or_else(|| BrowserError::Cdp("session already released".to_string()))?;
        open_page(&inner.browser, self.nav_timeout).await
    }

    async fn release(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };

        {
            let mut browser = inner.browser.lock().await;
            match tokio::time::timeout(CLOSE_TIMEOUT, browser.close()).await {
                Ok(Ok(_)) => debug!(session_id = %inner.remote.id, "CDP connection closed"),
                Ok(Err(e)) => warn!(session_id = %inner.remote.id, error = %e, "Error closing CDP connection"),
                Err(_) => warn!(session_id = %inner.remote.id, "Timed out closing CDP connection"),
            }
        }
        inner.handler_task.abort();

        stop_remote(&self.client, &inner.remote).await;
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        // Stop the remote session if release never ran.
        if let Some(inner) = self.inner.take() {
            inner.handler_task.abort();
            warn!(session_id = %inner.remote.id, "Browser session dropped without release");
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let client = self.client.clone();
                let remote = inner.remote;
                handle.spawn(async move {
                    stop_remote(&client, &remote).await;
                });
            }
        }
    }
}

async fn stop_remote(client: &BrowserSessionClient, remote: &RemoteSession) {
    info!(session_id = %remote.id, "Deleting remote browser session");
    if let Err(e) = client.stop_session(remote).await {
        warn!(session_id = %remote.id, error = %e, "Error deleting remote browser session");
    }
}

async fn open_page(
    browser: &Arc<Mutex<Browser>>,
    nav_timeout: Duration,
) -> BrowserResult<Box<dyn BrowserPage>> {
    let page = browser.lock().await.new_page("about:blank").await?;
    Ok(Box::new(CdpPage {
        page: Some(page),
        browser: browser.clone(),
        nav_timeout,
    }))
}

struct CdpPage {
    page: Option<Page>,
    browser: Arc<Mutex<Browser>>,
    nav_timeout: Duration,
}

impl CdpPage {
    fn page(&self) -> BrowserResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| BrowserError::Cdp("page already closed".to_string()))
    }

    async fn ready_state(&self) -> Option<(String, String)> {
        let value = self.evaluate(READY_STATE_SCRIPT).await.ok()?;
        let href = value.get("href")?.as_str()?.to_string();
        let state = value.get("state")?.as_str()?.to_string();
        Some((href, state))
    }

    /// Resolve once a new document replaced `previous_href` and is parsed.
    async fn wait_dom_ready(&self, previous_href: &str) {
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            if let Some((href, state)) = self.ready_state().await {
                if href != previous_href && state != "loading" {
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn goto(&self, url: &str, wait: WaitPolicy) -> BrowserResult<()> {
        let page = self.page()?;
        let nav_error = |message: String| BrowserError::Navigation {
            url: url.to_string(),
            message,
        };

        let navigation = async {
            match wait {
                WaitPolicy::Load => page
                    .goto(url)
                    .await
                    .map(|_| ())
                    .map_err(|e| nav_error(e.to_string())),
                WaitPolicy::DomContentLoaded => {
                    let previous = self
                        .ready_state()
                        .await
                        .map(|(href, _)| href)
                        .unwrap_or_default();
                    let load = page.goto(url);
                    tokio::pin!(load);
                    tokio::select! {
                        res = &mut load => res.map(|_| ()).map_err(|e| nav_error(e.to_string())),
                        _ = self.wait_dom_ready(&previous) => Ok(()),
                    }
                }
            }
        };

        match tokio::time::timeout(self.nav_timeout, navigation).await {
            Ok(res) => res,
            Err(_) => Err(BrowserError::Timeout {
                what: format!("navigation to {url}"),
                timeout: self.nav_timeout,
            }),
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        let page = self.page()?;
        let poll = async {
            loop {
                if page.find_element(selector).await.is_ok() {
                    return;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| BrowserError::Timeout {
                what: format!("selector {selector}"),
                timeout,
            })
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn new_tab(&self) -> BrowserResult<Box<dyn BrowserPage>> {
        open_page(&self.browser, self.nav_timeout).await
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if let Some(page) = self.page.take() {
            page.close().await?;
        }
        Ok(())
    }
}
