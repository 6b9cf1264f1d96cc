// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the console API client.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the console API (paths are appended verbatim).
    #[arg(long, default_value = "http://127.0.0.1:8000/api", env = "FIELDOPS_BASE_URL")]
    pub base_url: String,

    /// Path of the login endpoint, relative to the base URL.
    #[arg(long, default_value = "/auth/login", env = "FIELDOPS_LOGIN_PATH")]
    pub login_path: String,

    /// Path of the credential refresh endpoint, relative to the base URL.
    #[arg(long, default_value = "/auth/refresh", env = "FIELDOPS_REFRESH_PATH")]
    pub refresh_path: String,

    /// Per-request timeout in milliseconds. Also bounds the refresh call.
    #[arg(long, default_value_t = 30000, env = "FIELDOPS_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Session file holding the current credential. Defaults to
    /// `<state dir>/session.json`.
    #[arg(long, env = "FIELDOPS_SESSION_FILE")]
    pub session_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_owned(),
            login_path: "/auth/login".to_owned(),
            refresh_path: "/auth/refresh".to_owned(),
            timeout_ms: 30000,
            session_file: None,
        }
    }
}

impl ClientConfig {
    /// Config pointed at `base_url` with every other field defaulted.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Join the base URL and a request path, tolerating a slash on either side.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.is_empty() {
            return base.to_owned();
        }
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    pub fn session_file(&self) -> PathBuf {
        self.session_file.clone().unwrap_or_else(|| state_dir().join("session.json"))
    }
}

/// Resolve the state directory for persisted session data.
///
/// Checks `FIELDOPS_STATE_DIR`, then `$XDG_STATE_HOME/fieldops`,
/// then `$HOME/.local/state/fieldops`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FIELDOPS_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("fieldops");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/fieldops");
    }
    PathBuf::from(".fieldops")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
