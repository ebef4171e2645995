use crate::browser::navigation::{evaluate_json, NavigationManager};
use crate::browser::page_events::PageEventLog;
use crate::core::{BrowserConfig, BrowserTrait, Config};
use crate::errors::{PublishError, Result};
use crate::locator::Strategy;
use crate::session::{AuthenticationBundle, CookieRecord, OriginStorage};
use crate::types::{ClickMode, ElementHandle, PageSnapshot, ProbeHit, Scope, WaitUntil};
use crate::utils::javascript;
use async_trait::async_trait;
use headless_chrome::protocol::cdp::{Emulation, Input, Network, Page, DOM};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use serde_json::json;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chrome over the DevTools protocol.
pub struct ChromeBrowser {
    browser: Option<Browser>,
    settings: BrowserConfig,
    navigation_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ProbeReply {
    found: bool,
    #[serde(default)]
    scope: Option<usize>,
    #[serde(default)]
    visible: bool,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    label: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActionReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotReply {
    url: String,
    title: String,
    html: String,
    body_text: String,
    frames: Vec<String>,
}

impl ChromeBrowser {
    pub fn new() -> Self {
        Self {
            browser: None,
            settings: BrowserConfig::default(),
            navigation_timeout: Duration::from_secs(30),
        }
    }

    fn run_action(tab: &Tab, script: &str, what: &str) -> Result<()> {
        let reply: ActionReply = evaluate_json(tab, script)?;
        if reply.ok {
            Ok(())
        } else {
            Err(PublishError::DriverFailed(format!(
                "{} failed: {}",
                what,
                reply.error.unwrap_or_else(|| "unknown error".to_string())
            )))
        }
    }

    fn cookie_param(cookie: &CookieRecord) -> Result<Network::CookieParam> {
        let mut param = json!({
            "name": cookie.name,
            "value": cookie.value,
            "domain": cookie.domain,
            "path": cookie.path,
            "secure": cookie.secure,
            "httpOnly": cookie.http_only,
        });
        if !cookie.is_session() {
            param["expires"] = json!(cookie.expires);
        }
        if let Some(same_site) = &cookie.same_site {
            param["sameSite"] = json!(same_site);
        }
        Ok(serde_json::from_value(param)?)
    }

    /// Present the tab as a Japanese-locale desktop visitor.
    fn disguise(&self, tab: &Tab) -> Result<()> {
        if let Some(user_agent) = &self.settings.user_agent {
            tab.set_user_agent(user_agent, Some(&self.settings.locale), None)
                .map_err(PublishError::from_driver)?;
        }
        let hide_webdriver: Page::AddScriptToEvaluateOnNewDocument = serde_json::from_value(json!({
            "source": javascript::HIDE_WEBDRIVER_SCRIPT,
        }))?;
        tab.call_method(hide_webdriver).map_err(PublishError::from_driver)?;

        let timezone = serde_json::from_value::<Emulation::SetTimezoneOverride>(json!({
            "timezoneId": self.settings.timezone,
        }));
        let locale = serde_json::from_value::<Emulation::SetLocaleOverride>(json!({
            "locale": self.settings.locale,
        }));

        if let Err(e) = timezone.map_err(PublishError::from).and_then(|m| {
            tab.call_method(m).map(|_| ()).map_err(PublishError::from_driver)
        }) {
            warn!("Timezone override failed: {}", e);
        }
        if let Err(e) = locale.map_err(PublishError::from).and_then(|m| {
            tab.call_method(m).map(|_| ()).map_err(PublishError::from_driver)
        }) {
            warn!("Locale override failed: {}", e);
        }
        Ok(())
    }
}

impl Default for ChromeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserTrait for ChromeBrowser {
    type TabHandle = Arc<Tab>;

    async fn launch(&mut self, config: &Config) -> Result<()> {
        let window_size_arg = format!(
            "--window-size={},{}",
            config.browser.viewport.width, config.browser.viewport.height
        );
        let lang_arg = format!("--lang={}", config.browser.locale);

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new(&window_size_arg),
            OsStr::new(&lang_arg),
        ];

        for arg in &config.browser.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.browser.headless)
            .window_size(Some((config.browser.viewport.width, config.browser.viewport.height)))
            .idle_browser_timeout(Duration::from_secs(config.browser.idle_timeout_secs))
            .args(args)
            .build()
            .map_err(|e| PublishError::LaunchFailed(e.to_string()))?;

        let browser = Browser::new(launch_options).map_err(|e| PublishError::LaunchFailed(e.to_string()))?;

        info!(
            "Launched Chrome (headless: {}, {}x{})",
            config.browser.headless, config.browser.viewport.width, config.browser.viewport.height
        );
        self.navigation_timeout = Duration::from_millis(config.timing.navigation_timeout_ms);
        self.settings = config.browser.clone();
        self.browser = Some(browser);
        Ok(())
    }

    async fn new_tab(&self) -> Result<Self::TabHandle> {
        let browser = self.browser.as_ref().ok_or(PublishError::BrowserNotLaunched)?;

        let tab = browser
            .new_tab()
            .map_err(|e| PublishError::LaunchFailed(e.to_string()))?;
        tab.set_default_timeout(self.navigation_timeout);
        tab.enable_stealth_mode().map_err(PublishError::from_driver)?;
        self.disguise(&tab)?;
        if let Err(e) = PageEventLog::attach(&tab) {
            warn!("Page console and network events will not be logged: {}", e);
        }

        Ok(tab)
    }

    async fn restore_auth(&self, tab: &Self::TabHandle, bundle: &AuthenticationBundle) -> Result<()> {
        if !bundle.cookies.is_empty() {
            let params = bundle
                .cookies
                .iter()
                .map(Self::cookie_param)
                .collect::<Result<Vec<_>>>()?;
            tab.set_cookies(params).map_err(PublishError::from_driver)?;
            debug!("Injected {} cookies", bundle.cookies.len());
        }

        for origin in bundle.origins.iter().filter(|o| !o.local_storage.is_empty()) {
            self.navigate(tab, &origin.origin, WaitUntil::DomContentLoaded, self.navigation_timeout)
                .await?;
            let entries = serde_json::to_value(&origin.local_storage)?;
            Self::run_action(
                tab,
                &javascript::local_storage_restore_script(&entries),
                "localStorage restore",
            )?;
            debug!(
                "Injected {} localStorage items for {}",
                origin.local_storage.len(),
                origin.origin
            );
        }
        Ok(())
    }

    async fn capture_auth(&self, tab: &Self::TabHandle) -> Result<AuthenticationBundle> {
        let cookies = tab
            .get_cookies()
            .map_err(PublishError::from_driver)?
            .into_iter()
            .map(|c| serde_json::to_value(c).and_then(serde_json::from_value::<CookieRecord>))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let storage: OriginStorage = evaluate_json(tab, javascript::local_storage_dump_script())?;

        Ok(AuthenticationBundle {
            cookies,
            origins: vec![storage],
        })
    }

    async fn navigate(
        &self,
        tab: &Self::TabHandle,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<()> {
        tab.navigate_to(url)
            .map_err(|e| PublishError::NavigationTimeout(format!("{}: {}", url, e)))?;
        tab.wait_until_navigated()
            .map_err(|e| PublishError::NavigationTimeout(format!("{}: {}", url, e)))?;

        let result = NavigationManager::wait_for_load(tab, wait_until, timeout).await?;
        debug!(
            "Loaded {} ({} after {}ms, readyState {})",
            result.url, result.reason, result.duration_ms, result.ready_state
        );
        Ok(())
    }

    async fn probe(&self, tab: &Self::TabHandle, strategy: &Strategy) -> Result<Option<ProbeHit>> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let script = javascript::probe_script(strategy, &token)?;
        let reply: ProbeReply = evaluate_json(tab, &script)?;

        if let Some(error) = reply.error {
            return Err(PublishError::DriverFailed(format!("{}: {}", strategy, error)));
        }
        if !reply.found {
            return Ok(None);
        }

        let scope = reply.scope.map(Scope::Frame).unwrap_or(Scope::Document);
        Ok(Some(ProbeHit {
            handle: ElementHandle::new(scope, token),
            visible: reply.visible,
            enabled: reply.enabled,
            label: reply.label,
        }))
    }

    async fn fill(&self, tab: &Self::TabHandle, element: &ElementHandle, value: &str) -> Result<()> {
        Self::run_action(tab, &javascript::fill_script(element, value), "fill")
    }

    async fn click(&self, tab: &Self::TabHandle, element: &ElementHandle, mode: ClickMode) -> Result<()> {
        Self::run_action(tab, &javascript::click_script(element, mode), "click")
    }

    async fn insert_text(
        &self,
        tab: &Self::TabHandle,
        element: &ElementHandle,
        text: &str,
        key_delay: Duration,
    ) -> Result<()> {
        Self::run_action(tab, &javascript::focus_script(element), "focus")?;

        if key_delay.is_zero() {
            for (index, line) in text.split('\n').enumerate() {
                if index > 0 {
                    tab.press_key("Enter").map_err(PublishError::from_driver)?;
                }
                if !line.is_empty() {
                    tab.call_method(Input::InsertText {
                        text: line.to_string(),
                    })
                    .map_err(PublishError::from_driver)?;
                }
            }
            return Ok(());
        }

        let mut buffer = [0u8; 4];
        for ch in text.chars() {
            if ch == '\n' {
                tab.press_key("Enter").map_err(PublishError::from_driver)?;
            } else {
                tab.send_character(ch.encode_utf8(&mut buffer))
                    .map_err(PublishError::from_driver)?;
            }
            tokio::time::sleep(key_delay).await;
        }
        Ok(())
    }

    async fn press_key(&self, tab: &Self::TabHandle, element: &ElementHandle, key: &str) -> Result<()> {
        Self::run_action(tab, &javascript::focus_script(element), "focus")?;
        tab.press_key(key).map_err(PublishError::from_driver)?;
        Ok(())
    }

    async fn set_input_files(
        &self,
        tab: &Self::TabHandle,
        element: &ElementHandle,
        files: &[PathBuf],
    ) -> Result<()> {
        let object = tab
            .evaluate(&javascript::element_expression(element), false)
            .map_err(PublishError::from_driver)?;
        let object_id = object
            .object_id
            .ok_or_else(|| PublishError::DriverFailed("file input detached".to_string()))?;

        let files: Vec<String> = files.iter().map(|f| f.to_string_lossy().into_owned()).collect();
        let method: DOM::SetFileInputFiles = serde_json::from_value(json!({
            "files": files,
            "objectId": object_id,
        }))?;
        tab.call_method(method).map_err(PublishError::from_driver)?;
        Ok(())
    }

    async fn snapshot(&self, tab: &Self::TabHandle) -> Result<PageSnapshot> {
        let reply: SnapshotReply = evaluate_json(tab, javascript::snapshot_script())?;

        let screenshot_png = match tab.capture_screenshot(
            Page::CaptureScreenshotFormatOption::Png,
            None,
            None,
            true,
        ) {
            Ok(png) => Some(png),
            Err(e) => {
                warn!("Screenshot failed: {}", e);
                None
            }
        };

        Ok(PageSnapshot {
            url: reply.url,
            title: reply.title,
            html: reply.html,
            body_text: reply.body_text,
            frame_urls: reply.frames,
            screenshot_png,
        })
    }

    async fn current_url(&self, tab: &Self::TabHandle) -> Result<String> {
        Ok(tab.get_url())
    }

    fn is_running(&self) -> bool {
        self.browser.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        if self.browser.take().is_some() {
            info!("Browser closed");
        }
        Ok(())
    }
}
