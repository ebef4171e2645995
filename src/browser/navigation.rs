use crate::errors::{PublishError, Result};
use crate::types::WaitUntil;
use crate::utils::javascript;
use headless_chrome::Tab;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Resource count must hold still this long before the network counts as idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);
const POLL: Duration = Duration::from_millis(100);

pub struct NavigationManager;

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub reason: &'static str,
    pub url: String,
    pub ready_state: String,
    pub duration_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadyProbe {
    ready_state: String,
    resources: u64,
    url: String,
}

impl NavigationManager {
    /// Poll the page until it reaches `wait_until`. Script failures while the
    /// old document is torn down are expected and retried.
    pub async fn wait_for_load(tab: &Tab, wait_until: WaitUntil, timeout: Duration) -> Result<NavigationResult> {
        let start_time = Instant::now();
        let mut last_resources: Option<u64> = None;
        let mut quiet_since = start_time;

        while start_time.elapsed() < timeout {
            match evaluate_json::<ReadyProbe>(tab, javascript::ready_state_script()) {
                Ok(probe) => {
                    let dom_ready = matches!(probe.ready_state.as_str(), "interactive" | "complete");
                    let reached = match wait_until {
                        WaitUntil::DomContentLoaded if dom_ready => Some("dom_content_loaded"),
                        WaitUntil::NetworkIdle if probe.ready_state == "complete" => {
                            if last_resources != Some(probe.resources) {
                                last_resources = Some(probe.resources);
                                quiet_since = Instant::now();
                            }
                            (quiet_since.elapsed() >= NETWORK_QUIET).then_some("network_idle")
                        }
                        _ => None,
                    };

                    if let Some(reason) = reached {
                        return Ok(NavigationResult {
                            reason,
                            url: probe.url,
                            ready_state: probe.ready_state,
                            duration_ms: start_time.elapsed().as_millis() as u64,
                        });
                    }
                }
                Err(e) => debug!("Ready probe failed: {}", e),
            }

            tokio::time::sleep(POLL).await;
        }

        Err(PublishError::NavigationTimeout(format!(
            "{} not reached within {}ms",
            match wait_until {
                WaitUntil::DomContentLoaded => "DOMContentLoaded",
                WaitUntil::NetworkIdle => "network idle",
            },
            timeout.as_millis()
        )))
    }
}

/// Evaluate `script` and decode its JSON result. The script is wrapped in
/// `JSON.stringify` so objects come back by value.
pub fn evaluate_json<T: for<'de> Deserialize<'de>>(tab: &Tab, script: &str) -> Result<T> {
    let wrapped = format!("JSON.stringify({})", script.trim());
    let result = tab
        .evaluate(&wrapped, false)
        .map_err(PublishError::from_driver)?;

    let raw = result
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .ok_or_else(|| PublishError::DriverFailed("script returned no value".to_string()))?;
    Ok(serde_json::from_str(raw)?)
}
