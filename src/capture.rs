//! Interactive login: a person signs in in a visible browser and the
//! resulting session is written out for later unattended runs.

use crate::core::{BrowserTrait, Config, PageContext};
use crate::errors::{PublishError, Result};
use crate::session::{AuthenticationBundle, SessionStore};
use crate::types::WaitUntil;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub login_url: String,
    /// Visited after sign-in so the editor origin sets its own cookies.
    pub editor_url: String,
    pub storage_path: PathBuf,
    /// How long to wait for the browser to land on the site root.
    pub login_wait: Duration,
    pub editor_settle: Duration,
}

impl CaptureOptions {
    pub fn for_site(config: &Config) -> Result<Self> {
        let base = config.base_url()?;
        let login = base
            .join("/login")
            .map_err(|e| PublishError::ConfigurationError(format!("login url: {}", e)))?;
        let editor = match base.host_str() {
            Some(host) => format!("{}://editor.{}/new", base.scheme(), host),
            None => config.compose_url()?.to_string(),
        };

        Ok(Self {
            login_url: login.to_string(),
            editor_url: editor,
            storage_path: PathBuf::from(crate::session::DEFAULT_STORAGE_PATH),
            login_wait: Duration::from_secs(300),
            editor_settle: Duration::from_secs(10),
        })
    }
}

/// Whether `current` is the root page of the site `base` points at.
fn is_site_root(current: &str, base: &url::Url) -> bool {
    match url::Url::parse(current) {
        Ok(url) => url.host_str() == base.host_str() && matches!(url.path(), "" | "/"),
        Err(_) => false,
    }
}

/// Resolves once a line is read from stdin.
pub async fn enter_pressed() -> Result<()> {
    println!("Press Enter once you are signed in...");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(())
}

/// Wait for sign-in, then save cookies and storage from both the site and the
/// editor origin. `confirm` is awaited only if the browser never reaches the
/// site root within `login_wait`.
pub async fn capture_session<B, F>(
    ctx: &PageContext<'_, B>,
    config: &Config,
    options: &CaptureOptions,
    confirm: F,
) -> Result<AuthenticationBundle>
where
    B: BrowserTrait,
    F: Future<Output = Result<()>>,
{
    let base = config.base_url()?;
    let navigation_timeout = Duration::from_millis(config.timing.navigation_timeout_ms);

    ctx.browser
        .navigate(ctx.tab, &options.login_url, WaitUntil::DomContentLoaded, navigation_timeout)
        .await?;
    info!("Sign in at {} in the browser window", options.login_url);

    let deadline = Instant::now() + options.login_wait;
    let mut signed_in = false;
    while Instant::now() < deadline {
        match ctx.browser.current_url(ctx.tab).await {
            Ok(url) if is_site_root(&url, &base) => {
                signed_in = true;
                break;
            }
            Ok(_) => {}
            Err(e) => warn!("Could not read the current URL: {}", e),
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    if signed_in {
        info!("Sign-in detected");
    } else {
        warn!(
            "Did not reach {} within {}s",
            base,
            options.login_wait.as_secs()
        );
        confirm.await?;
    }

    let mut bundle = ctx.browser.capture_auth(ctx.tab).await?;

    match ctx
        .browser
        .navigate(ctx.tab, &options.editor_url, WaitUntil::DomContentLoaded, navigation_timeout)
        .await
    {
        Ok(()) => {
            tokio::time::sleep(options.editor_settle).await;
            bundle.merge(ctx.browser.capture_auth(ctx.tab).await?);
        }
        Err(e) => warn!("Could not open {}: {}; saving the site session only", options.editor_url, e),
    }

    let editor = url::Url::parse(&options.editor_url).ok();
    if let Some(host) = editor.as_ref().and_then(|u| u.host_str()) {
        if bundle.cookies_for(host).next().is_none() {
            warn!("No saved cookie applies to {}; publishing may need another sign-in", host);
        }
    }

    SessionStore::save(&options.storage_path, &bundle)?;
    info!(
        "Saved {} cookies to {}",
        bundle.cookies.len(),
        options.storage_path.display()
    );
    Ok(bundle)
}

/// The `login` command: launch a visible browser, capture, close.
pub async fn login<B: BrowserTrait>(browser: &mut B, config: &Config, options: &CaptureOptions) -> Result<()> {
    let mut visible = config.clone();
    visible.browser.headless = false;

    browser.launch(&visible).await?;
    let result = async {
        let tab = browser.new_tab().await?;
        let ctx = PageContext::new(&*browser, &tab, &visible.timing);
        capture_session(&ctx, &visible, options, enter_pressed()).await
    }
    .await;

    if let Err(e) = browser.close().await {
        warn!("Closing the browser failed: {}", e);
    }
    result.map(|_| ())
}
