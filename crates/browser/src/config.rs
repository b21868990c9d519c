//! Browser configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default desktop user agent presented by every page.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Viewport size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Baseline configuration applied to every freshly opened page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSettings {
    pub viewport: Viewport,
    pub user_agent: String,
    /// CDP resource types failed before they hit the network
    pub blocked_resource_types: Vec<String>,
    /// URL patterns blocked via `Network.setBlockedURLs`
    pub blocked_url_patterns: Vec<String>,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            blocked_resource_types: vec!["Media".to_string()],
            blocked_url_patterns: [
                "*.pdf", "*.mp4", "*.webm", "*.mov", "*.avi", "*.mp3", "*.wav", "*.ogg",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Attach to an already running browser instead of launching one
    pub cdp_url: Option<String>,
    /// Chrome/Chromium binary; discovered on PATH when unset
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Pass `--no-sandbox` (needed in most containers)
    pub no_sandbox: bool,
    /// Profile directory; a temporary one is created when unset
    pub user_data_dir: Option<PathBuf>,
    /// How long to wait for the DevTools endpoint after spawning
    pub launch_timeout_secs: u64,
    pub page: PageSettings,
}

impl BrowserConfig {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            cdp_url: None,
            executable: None,
            headless: true,
            no_sandbox: false,
            user_data_dir: None,
            launch_timeout_secs: 20,
            page: PageSettings::default(),
        }
    }
}
