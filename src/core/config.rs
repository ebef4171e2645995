use crate::errors::{PublishError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://note.com";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub site: SiteConfig,
    pub timing: TimingConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub locale: String,
    pub timezone: String,
    pub args: Vec<String>,
    /// Chrome is torn down after this long without a DevTools message.
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub compose_path: String,
}

/// Every bounded wait in a run. Millisecond values so the file format stays flat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub default_wait_ms: u64,
    pub poll_interval_ms: u64,
    pub navigation_timeout_ms: u64,
    pub composer_wait_ms: u64,
    pub type_delay_ms: u64,
    pub chunk_size: usize,
    pub inter_chunk_delay_ms: u64,
    pub focus_settle_ms: u64,
    pub panel_settle_ms: u64,
    pub tag_settle_ms: u64,
    pub autosave_wait_ms: u64,
    pub after_submit_settle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub checkpoints: bool,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            locale: "ja-JP".to_string(),
            timezone: "Asia/Tokyo".to_string(),
            args: vec![],
            idle_timeout_secs: 600,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            compose_path: "/notes/new".to_string(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            default_wait_ms: 10000,
            poll_interval_ms: 100,
            navigation_timeout_ms: 30000,
            composer_wait_ms: 60000,
            type_delay_ms: 0,
            chunk_size: 3000,
            inter_chunk_delay_ms: 50,
            focus_settle_ms: 500,
            panel_settle_ms: 300,
            tag_settle_ms: 150,
            autosave_wait_ms: 3000,
            after_submit_settle_ms: 1000,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            checkpoints: true,
            output_dir: PathBuf::from("."),
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PublishError::ConfigurationError(format!("{}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Override the base URL and per-keystroke delay, as given by
    /// `NOTE_BASE_URL` / `NOTE_EDITOR_DELAY_MS` or the matching flags.
    pub fn apply_overrides(&mut self, base_url: Option<String>, delay_ms: Option<String>) -> Result<()> {
        if let Some(base_url) = base_url.filter(|s| !s.trim().is_empty()) {
            self.site.base_url = base_url;
        }
        if let Some(raw) = delay_ms.filter(|s| !s.trim().is_empty()) {
            self.timing.type_delay_ms = raw.trim().parse().map_err(|_| {
                PublishError::ConfigurationError(format!("invalid NOTE_EDITOR_DELAY_MS: {}", raw))
            })?;
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<url::Url> {
        url::Url::parse(&self.site.base_url)
            .map_err(|e| PublishError::ConfigurationError(format!("base url: {}", e)))
    }

    pub fn compose_url(&self) -> Result<url::Url> {
        self.base_url()?
            .join(&self.site.compose_path)
            .map_err(|e| PublishError::ConfigurationError(format!("compose url: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_editor_constants() {
        let config = Config::default();
        assert_eq!(config.timing.chunk_size, 3000);
        assert_eq!(config.timing.type_delay_ms, 0);
        assert_eq!(config.site.base_url, "https://note.com");
        assert!(config.browser.headless);
    }

    #[test]
    fn compose_url_joins_path() {
        let mut config = Config::default();
        config.site.base_url = "https://staging.note.test/".to_string();
        assert_eq!(
            config.compose_url().unwrap().as_str(),
            "https://staging.note.test/notes/new"
        );
    }

    #[test]
    fn overrides_replace_base_url_and_delay() {
        let mut config = Config::default();
        config
            .apply_overrides(Some("https://example.test".into()), Some(" 25 ".into()))
            .unwrap();
        assert_eq!(config.site.base_url, "https://example.test");
        assert_eq!(config.timing.type_delay_ms, 25);
    }

    #[test]
    fn invalid_delay_is_a_configuration_error() {
        let mut config = Config::default();
        let err = config.apply_overrides(None, Some("fast".into())).unwrap_err();
        assert!(matches!(err, PublishError::ConfigurationError(_)));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"timing": {"chunk_size": 100}}"#).unwrap();
        assert_eq!(config.timing.chunk_size, 100);
        assert_eq!(config.timing.poll_interval_ms, 100);
        assert_eq!(config.browser.viewport.width, 1920);
    }
}
