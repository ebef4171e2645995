//! Persisted authentication state.
//!
//! The on-disk layout is the `storageState` JSON written by common browser
//! automation tools, so an existing `note-state.json` can be reused as is.

use crate::errors::{PublishError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_STORAGE_PATH: &str = "./note-state.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationBundle {
    #[serde(default)]
    pub cookies: Vec<CookieRecord>,
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Seconds since the epoch; `-1` marks a session cookie.
    #[serde(default = "session_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginStorage {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

fn default_path() -> String {
    "/".to_string()
}

fn session_expiry() -> f64 {
    -1.0
}

impl CookieRecord {
    pub fn is_session(&self) -> bool {
        self.expires < 0.0
    }

    /// Whether the cookie would be sent to `host`.
    pub fn applies_to(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.');
        host == domain || host.ends_with(&format!(".{}", domain))
    }
}

impl AuthenticationBundle {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }

    /// Fold a later capture into this one. Cookies are keyed by name, domain
    /// and path; storage by origin. Entries from `other` win.
    pub fn merge(&mut self, other: AuthenticationBundle) {
        for cookie in other.cookies {
            self.cookies
                .retain(|c| !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path));
            self.cookies.push(cookie);
        }
        for origin in other.origins {
            self.origins.retain(|o| o.origin != origin.origin);
            self.origins.push(origin);
        }
    }

    pub fn cookies_for(&self, host: &str) -> impl Iterator<Item = &CookieRecord> {
        let host = host.to_string();
        self.cookies.iter().filter(move |c| c.applies_to(&host))
    }
}

pub struct SessionStore;

impl SessionStore {
    pub fn load(path: &Path) -> Result<AuthenticationBundle> {
        let unavailable = |reason: String| PublishError::SessionUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;
        let bundle: AuthenticationBundle =
            serde_json::from_str(&raw).map_err(|e| unavailable(e.to_string()))?;

        info!(
            "Loaded session from {} ({} cookies, {} origins)",
            path.display(),
            bundle.cookies.len(),
            bundle.origins.len()
        );
        Ok(bundle)
    }

    /// Used only by the interactive login capture; a publish run never writes.
    pub fn save(path: &Path, bundle: &AuthenticationBundle) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(bundle)?;
        std::fs::write(path, json)?;
        debug!("Wrote session bundle to {}", path.display());
        Ok(())
    }
}
