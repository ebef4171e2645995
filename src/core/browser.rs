use crate::core::config::{Config, TimingConfig};
use crate::errors::Result;
use crate::locator::Strategy;
use crate::session::AuthenticationBundle;
use crate::types::{ClickMode, ElementHandle, PageSnapshot, ProbeHit, WaitUntil};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Everything the engine needs from a browser. The Chrome driver implements it
/// over CDP; `testing::FakeBrowser` implements it over static HTML.
#[async_trait]
pub trait BrowserTrait: Send + Sync {
    type TabHandle: Send + Sync;

    /// Launch a new browser instance
    async fn launch(&mut self, config: &Config) -> Result<()>;

    /// Create a new tab/page
    async fn new_tab(&self) -> Result<Self::TabHandle>;

    /// Install cookies and per-origin storage before the first navigation
    async fn restore_auth(&self, tab: &Self::TabHandle, bundle: &AuthenticationBundle) -> Result<()>;

    /// Read back cookies and the current origin's storage
    async fn capture_auth(&self, tab: &Self::TabHandle) -> Result<AuthenticationBundle>;

    /// Navigate and wait for the requested load state, failing with
    /// `NavigationTimeout` once `timeout` elapses
    async fn navigate(
        &self,
        tab: &Self::TabHandle,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<()>;

    /// Evaluate one strategy once, without waiting. `Ok(None)` means nothing
    /// matched in the document or any reachable frame.
    async fn probe(&self, tab: &Self::TabHandle, strategy: &Strategy) -> Result<Option<ProbeHit>>;

    /// Replace the element's value in one action
    async fn fill(&self, tab: &Self::TabHandle, element: &ElementHandle, value: &str) -> Result<()>;

    async fn click(&self, tab: &Self::TabHandle, element: &ElementHandle, mode: ClickMode) -> Result<()>;

    /// Focus the element and type `text` as one discrete input, pausing
    /// `key_delay` between keystrokes when non-zero
    async fn insert_text(
        &self,
        tab: &Self::TabHandle,
        element: &ElementHandle,
        text: &str,
        key_delay: Duration,
    ) -> Result<()>;

    async fn press_key(&self, tab: &Self::TabHandle, element: &ElementHandle, key: &str) -> Result<()>;

    async fn set_input_files(
        &self,
        tab: &Self::TabHandle,
        element: &ElementHandle,
        files: &[PathBuf],
    ) -> Result<()>;

    async fn snapshot(&self, tab: &Self::TabHandle) -> Result<PageSnapshot>;

    async fn current_url(&self, tab: &Self::TabHandle) -> Result<String>;

    /// Check if browser is still running
    fn is_running(&self) -> bool;

    /// Close the browser
    async fn close(&mut self) -> Result<()>;
}

/// The session-scoped value threaded through every component call of a run.
pub struct PageContext<'a, B: BrowserTrait> {
    pub browser: &'a B,
    pub tab: &'a B::TabHandle,
    pub timing: &'a TimingConfig,
}

impl<'a, B: BrowserTrait> PageContext<'a, B> {
    pub fn new(browser: &'a B, tab: &'a B::TabHandle, timing: &'a TimingConfig) -> Self {
        Self {
            browser,
            tab,
            timing,
        }
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.timing.default_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.timing.poll_interval_ms.max(1))
    }

    pub async fn settle(&self, millis: u64) {
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}
