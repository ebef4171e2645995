pub mod browser;
pub mod config;

pub use browser::{BrowserTrait, PageContext};
pub use config::{BrowserConfig, Config, DiagnosticsConfig, SiteConfig, TimingConfig, Viewport};
