//! Page dumps for when the UI has drifted away from the selectors.
//!
//! Capturing never fails the run and never changes its control flow: every
//! problem here is logged and swallowed.

use crate::core::{BrowserTrait, DiagnosticsConfig, PageContext};
use crate::dom::{target_reports, PageCensus, TargetReport};
use crate::locator::LocatorSpec;
use crate::types::PageSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub label: String,
    pub captured_at: DateTime<Utc>,
    pub census: PageCensus,
    pub targets: Vec<TargetReport>,
    /// Files written for this report; empty for in-memory reports.
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

pub struct DiagnosticsCapture {
    config: DiagnosticsConfig,
}

fn write_file(path: &Path, bytes: &[u8]) -> bool {
    match std::fs::write(path, bytes) {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not write {}: {}", path.display(), e);
            false
        }
    }
}

impl DiagnosticsCapture {
    pub fn new(config: DiagnosticsConfig) -> Self {
        Self { config }
    }

    pub fn checkpoints_enabled(&self) -> bool {
        self.config.enabled && self.config.checkpoints
    }

    async fn observe<B: BrowserTrait>(
        &self,
        ctx: &PageContext<'_, B>,
        label: &str,
        specs: &[&LocatorSpec],
    ) -> Option<(DiagnosticReport, PageSnapshot)> {
        if !self.config.enabled {
            return None;
        }

        let snapshot = match ctx.browser.snapshot(ctx.tab).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Diagnostics snapshot '{}' failed: {}", label, e);
                return None;
            }
        };

        let report = DiagnosticReport {
            label: label.to_string(),
            captured_at: Utc::now(),
            census: PageCensus::from_snapshot(&snapshot),
            targets: target_reports(&snapshot.html, specs),
            files: Vec::new(),
        };
        Some((report, snapshot))
    }

    /// Report how each target's strategies fare against the current page,
    /// without touching the filesystem.
    pub async fn inspect<B: BrowserTrait>(
        &self,
        ctx: &PageContext<'_, B>,
        label: &str,
        specs: &[&LocatorSpec],
    ) -> Option<DiagnosticReport> {
        self.observe(ctx, label, specs).await.map(|(report, _)| report)
    }

    /// Snapshot the page and write `debug-{label}.png`, `.html` and `.json`
    /// to the output directory.
    pub async fn capture<B: BrowserTrait>(
        &self,
        ctx: &PageContext<'_, B>,
        label: &str,
        specs: &[&LocatorSpec],
    ) -> Option<DiagnosticReport> {
        let (mut report, snapshot) = self.observe(ctx, label, specs).await?;

        let dir = &self.config.output_dir;
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Could not create {}: {}", dir.display(), e);
            return Some(report);
        }

        if let Some(png) = &snapshot.screenshot_png {
            let path = dir.join(format!("debug-{}.png", label));
            if write_file(&path, png) {
                report.files.push(path);
            }
        }
        let html_path = dir.join(format!("debug-{}.html", label));
        if write_file(&html_path, snapshot.html.as_bytes()) {
            report.files.push(html_path);
        }

        let json_path = dir.join(format!("debug-{}.json", label));
        report.files.push(json_path.clone());
        let saved = match serde_json::to_vec_pretty(&report) {
            Ok(json) => write_file(&json_path, &json),
            Err(e) => {
                warn!("Could not encode diagnostics '{}': {}", label, e);
                false
            }
        };
        if !saved {
            report.files.pop();
        }

        info!(
            "Diagnostics '{}' saved ({} buttons, {} editables) to {}",
            label,
            report.census.buttons,
            report.census.editables,
            dir.display()
        );
        Some(report)
    }

    /// A capture that only runs when checkpoints are enabled.
    pub async fn checkpoint<B: BrowserTrait>(
        &self,
        ctx: &PageContext<'_, B>,
        label: &str,
        specs: &[&LocatorSpec],
    ) -> Option<DiagnosticReport> {
        if !self.checkpoints_enabled() {
            return None;
        }
        self.capture(ctx, label, specs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TimingConfig;
    use crate::locator::Strategy;
    use crate::testing::{FakeBrowser, FakePage, FAKE_PNG};

    fn config(dir: &Path) -> DiagnosticsConfig {
        DiagnosticsConfig {
            enabled: true,
            checkpoints: true,
            output_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn capture_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let browser = FakeBrowser::with_page(FakePage::at(
            "https://note.test/notes/new",
            "<html><head><title>editor</title></head><body><button>公開</button><textarea></textarea></body></html>",
        ));
        let timing = TimingConfig::default();
        let ctx = PageContext::new(&browser, &(), &timing);
        let spec = LocatorSpec::new("title field").then(Strategy::first_of("textarea"));

        let report = DiagnosticsCapture::new(config(dir.path()))
            .capture(&ctx, "error", &[&spec])
            .await
            .unwrap();

        assert_eq!(report.census.url, "https://note.test/notes/new");
        assert_eq!(report.census.buttons, 1);
        assert_eq!(report.targets[0].strategies[0].matches, 1);
        assert_eq!(std::fs::read(dir.path().join("debug-error.png")).unwrap(), FAKE_PNG);
        assert!(dir.path().join("debug-error.html").exists());

        let json = std::fs::read_to_string(dir.path().join("debug-error.json")).unwrap();
        let saved: DiagnosticReport = serde_json::from_str(&json).unwrap();
        assert_eq!(saved.label, "error");
        assert_eq!(report.files.len(), 3);
    }

    #[tokio::test]
    async fn disabled_checkpoints_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let browser = FakeBrowser::with_page(FakePage::new("<p></p>"));
        let timing = TimingConfig::default();
        let ctx = PageContext::new(&browser, &(), &timing);
        let capture = DiagnosticsCapture::new(DiagnosticsConfig {
            checkpoints: false,
            ..config(dir.path())
        });

        assert!(capture.checkpoint(&ctx, "after-navigation", &[]).await.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unwritable_directory_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let browser = FakeBrowser::with_page(FakePage::new("<p></p>"));
        let timing = TimingConfig::default();
        let ctx = PageContext::new(&browser, &(), &timing);

        let report = DiagnosticsCapture::new(config(&blocker.join("nested")))
            .capture(&ctx, "error", &[])
            .await
            .unwrap();
        assert!(report.files.is_empty());
    }
}
