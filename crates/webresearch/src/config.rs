//! Configuration
//!
//! `ResearchConfig` tunes the research service; `Cli` is the command-line /
//! environment surface of the binary and produces both it and the
//! `BrowserConfig`.

use browser::screenshot::DEFAULT_MAX_BYTES;
use browser::BrowserConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::session::MAX_RESULTS;

pub const DEFAULT_SEARCH_URL: &str = "https://www.google.com";
pub const DEFAULT_CONTENT_LIMIT: usize = 100_000;

#[derive(Debug, Clone)]
pub struct ResearchConfig {
    pub retry: RetryPolicy,
    /// Search engine landing page
    pub search_url: String,
    /// Query box on the landing page
    pub search_input_selector: String,
    /// Container that appears once results rendered
    pub results_selector: String,
    /// Cap on extracted page text, in chars
    pub content_limit: usize,
    pub screenshot_max_bytes: usize,
    pub max_results: usize,
    pub screenshot_dir: PathBuf,
    pub shutdown_deadline: Duration,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            search_input_selector: "textarea[name='q'], input[name='q']".to_string(),
            results_selector: "#search".to_string(),
            content_limit: DEFAULT_CONTENT_LIMIT,
            screenshot_max_bytes: DEFAULT_MAX_BYTES,
            max_results: MAX_RESULTS,
            screenshot_dir: std::env::temp_dir().join("webresearch-screenshots"),
            shutdown_deadline: Duration::from_secs(5),
        }
    }
}

/// Web research tool server speaking MCP over stdio.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// Attach to a running browser's DevTools WebSocket instead of launching Chrome.
    #[arg(long, env = "WEBRESEARCH_CDP_URL", value_name = "WS_URL")]
    pub cdp_url: Option<String>,

    /// Chrome/Chromium executable; searched on PATH when omitted.
    #[arg(long, env = "WEBRESEARCH_CHROME", value_name = "PATH")]
    pub chrome: Option<PathBuf>,

    /// Show the browser window.
    #[arg(long, env = "WEBRESEARCH_HEADFUL", default_value_t = false)]
    pub headful: bool,

    /// Launch Chrome with --no-sandbox (containers).
    #[arg(long, env = "WEBRESEARCH_NO_SANDBOX", default_value_t = false)]
    pub no_sandbox: bool,

    /// Browser profile directory; a temporary one is used when omitted.
    #[arg(long, env = "WEBRESEARCH_USER_DATA_DIR", value_name = "DIR")]
    pub user_data_dir: Option<PathBuf>,

    #[arg(long, env = "WEBRESEARCH_SEARCH_URL", default_value = DEFAULT_SEARCH_URL)]
    pub search_url: String,

    /// Where screenshots are stored while referenced by the session.
    #[arg(long, env = "WEBRESEARCH_SCREENSHOT_DIR", value_name = "DIR")]
    pub screenshot_dir: Option<PathBuf>,

    /// Byte budget of a stored screenshot.
    #[arg(long, env = "WEBRESEARCH_SCREENSHOT_MAX_BYTES", default_value_t = DEFAULT_MAX_BYTES)]
    pub screenshot_max_bytes: usize,

    /// Results kept in the session before the oldest are evicted.
    #[arg(long, env = "WEBRESEARCH_MAX_RESULTS", default_value_t = MAX_RESULTS)]
    pub max_results: usize,

    #[arg(long, env = "WEBRESEARCH_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    #[arg(long, env = "WEBRESEARCH_RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,
}

impl Cli {
    pub fn browser_config(&self) -> BrowserConfig {
        BrowserConfig {
            cdp_url: self.cdp_url.clone(),
            executable: self.chrome.clone(),
            headless: !self.headful,
            no_sandbox: self.no_sandbox,
            user_data_dir: self.user_data_dir.clone(),
            ..BrowserConfig::default()
        }
    }

    pub fn research_config(&self) -> ResearchConfig {
        let defaults = ResearchConfig::default();
        ResearchConfig {
            retry: RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.retry_delay_ms),
            ),
            search_url: self.search_url.clone(),
            screenshot_max_bytes: self.screenshot_max_bytes,
            max_results: self.max_results,
            screenshot_dir: self
                .screenshot_dir
                .clone()
                .unwrap_or(defaults.screenshot_dir.clone()),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["webresearch"]).unwrap();
        let browser = cli.browser_config();
        assert!(browser.headless);
        assert!(browser.cdp_url.is_none());

        let research = cli.research_config();
        assert_eq!(research.retry, RetryPolicy::default());
        assert_eq!(research.max_results, MAX_RESULTS);
        assert_eq!(research.content_limit, DEFAULT_CONTENT_LIMIT);
        assert_eq!(research.screenshot_max_bytes, 500_000);
    }

    #[test]
    fn test_flags_override() {
        let cli = Cli::try_parse_from([
            "webresearch",
            "--headful",
            "--no-sandbox",
            "--cdp-url",
            "ws://127.0.0.1:9222/devtools/browser/x",
            "--max-results",
            "10",
            "--retry-delay-ms",
            "50",
            "--screenshot-dir",
            "/tmp/shots",
        ])
        .unwrap();

        let browser = cli.browser_config();
        assert!(!browser.headless);
        assert!(browser.no_sandbox);
        assert_eq!(
            browser.cdp_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/x")
        );

        let research = cli.research_config();
        assert_eq!(research.max_results, 10);
        assert_eq!(research.retry.delay, Duration::from_millis(50));
        assert_eq!(research.screenshot_dir, PathBuf::from("/tmp/shots"));
    }
}
