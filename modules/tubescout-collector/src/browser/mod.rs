// Browser capability consumed by the collector.
//
// BrowserProvider hands out one session per job. Sessions are never shared
// or pooled; whoever acquires a session must release it. CdpBrowserProvider
// is the production implementation; testing::MockBrowser drives the same
// traits from scripted pages.

pub mod cdp;

use std::time::Duration;

use async_trait::async_trait;

pub use crate::error::BrowserError;
pub use cdp::CdpBrowserProvider;

pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// How long `goto` waits before handing the page back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Return once the document has been parsed.
    DomContentLoaded,
    /// Return once the load event fired.
    Load,
}

#[async_trait]
pub trait BrowserProvider: Send + Sync {
    /// Provision a fresh browser session.
    async fn acquire(&self) -> BrowserResult<Box<dyn BrowserSession>>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> BrowserResult<Box<dyn BrowserPage>>;

    /// Drop the connection and the remote session. Idempotent and
    /// best-effort: teardown failures are logged, never returned.
    async fn release(&mut self);
}

#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str, wait: WaitPolicy) -> BrowserResult<()>;

    /// Wait until `selector` matches at least one element.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()>;

    /// Evaluate a script in the page and return its JSON result.
    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value>;

    /// Open another page in the same browsing context.
    async fn new_tab(&self) -> BrowserResult<Box<dyn BrowserPage>>;

    /// Close the page. Idempotent.
    async fn close(&mut self) -> BrowserResult<()>;
}
