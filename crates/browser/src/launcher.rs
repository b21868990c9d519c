//! Browser launching
//!
//! [`Launcher`] produces a live [`BrowserHandle`]; the Resource Manager only
//! ever talks to these two traits. [`ChromeLauncher`] spawns (or attaches
//! to) a real Chrome over CDP.

use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::cdp::protocol::CreateTargetResult;
use crate::cdp::{CDPClient, CDPError, CDPSession, CdpPage};
use crate::config::BrowserConfig;
use crate::error::{BrowserError, Result};
use crate::page::Page;

pub use crate::cdp::client::DisconnectCallback;

/// Binary names probed on PATH when no executable is configured
const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "microsoft-edge",
];

/// A running browser
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Register a disconnect observer; fires immediately if already gone
    fn on_disconnect(&self, callback: DisconnectCallback);

    async fn new_page(&self) -> Result<Arc<dyn Page>>;

    async fn close(&self) -> Result<()>;
}

/// Starts browsers
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>>;
}

/// Launches Chrome with remote debugging, or attaches to `cdp_url`
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn executable(&self) -> Result<PathBuf> {
        if let Some(path) = &self.config.executable {
            return Ok(path.clone());
        }
        CHROME_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| {
                BrowserError::Launch(format!(
                    "no Chrome executable found (tried {})",
                    CHROME_CANDIDATES.join(", ")
                ))
            })
    }

    async fn spawn(&self) -> Result<ChromeBrowser> {
        let executable = self.executable()?;

        let (profile_dir, temp_profile) = match &self.config.user_data_dir {
            Some(dir) => (dir.clone(), None),
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("webresearch-profile-")
                    .tempdir()?;
                (dir.path().to_path_buf(), Some(dir))
            }
        };

        let mut args = vec![
            "--remote-debugging-port=0".to_string(),
            format!("--user-data-dir={}", profile_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-background-networking".to_string(),
            "--mute-audio".to_string(),
        ];
        if self.config.headless {
            args.push("--headless=new".to_string());
        }
        if self.config.no_sandbox {
            args.push("--no-sandbox".to_string());
        }
        args.push("about:blank".to_string());

        tracing::info!("[ChromeLauncher] Launching {}", executable.display());
        let mut child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::Launch(format!("{}: {}", executable.display(), e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BrowserError::Launch("Chrome stderr unavailable".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();

        let timeout = self.config.launch_timeout();
        let ws_url = tokio::time::timeout(timeout, async {
            while let Some(line) = lines.next_line().await? {
                if let Some(url) = line.split("DevTools listening on ").nth(1) {
                    return Ok(url.trim().to_string());
                }
                tracing::trace!("[ChromeLauncher] {}", line);
            }
            Err(BrowserError::Launch(
                "Chrome exited before exposing a DevTools endpoint".to_string(),
            ))
        })
        .await
        .map_err(|_| {
            BrowserError::Launch(format!("no DevTools endpoint within {:?}", timeout))
        })??;

        // Keep draining stderr so Chrome never blocks on a full pipe
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!("[chrome] {}", line);
            }
        });

        tracing::info!("[ChromeLauncher] DevTools endpoint: {}", ws_url);
        let client = CDPClient::connect(&ws_url).await?;
        ChromeBrowser::new(client, Some(child), temp_profile).await
    }
}

#[async_trait]
impl Launcher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>> {
        let browser = match &self.config.cdp_url {
            Some(url) => {
                tracing::info!("[ChromeLauncher] Attaching to {}", url);
                let client = CDPClient::connect(url).await?;
                ChromeBrowser::new(client, None, None).await?
            }
            None => self.spawn().await?,
        };
        Ok(Arc::new(browser))
    }
}

/// Chrome reachable over one CDP connection
pub struct ChromeBrowser {
    client: Arc<CDPClient>,
    child: Mutex<Option<Child>>,
    _profile: Option<tempfile::TempDir>,
}

impl ChromeBrowser {
    async fn new(
        client: Arc<CDPClient>,
        child: Option<Child>,
        profile: Option<tempfile::TempDir>,
    ) -> Result<Self> {
        // Needed for Target.targetDestroyed notifications
        client
            .send_request(
                "Target.setDiscoverTargets",
                Some(json!({ "discover": true })),
                None,
            )
            .await?;

        Ok(Self {
            client,
            child: Mutex::new(child),
            _profile: profile,
        })
    }
}

#[async_trait]
impl BrowserHandle for ChromeBrowser {
    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    fn on_disconnect(&self, callback: DisconnectCallback) {
        self.client.on_disconnect(callback);
    }

    async fn new_page(&self) -> Result<Arc<dyn Page>> {
        let result = self
            .client
            .send_request(
                "Target.createTarget",
                Some(json!({ "url": "about:blank" })),
                None,
            )
            .await?;
        let created: CreateTargetResult =
            serde_json::from_value(result).map_err(CDPError::from)?;

        let session = CDPSession::attach(self.client.clone(), created.target_id, None).await?;
        tracing::debug!("[ChromeBrowser] Opened page {}", session.target_id);
        Ok(Arc::new(CdpPage::new(session)))
    }

    async fn close(&self) -> Result<()> {
        if self.client.is_connected() {
            if let Err(e) = self.client.send_request("Browser.close", None, None).await {
                tracing::debug!("[ChromeBrowser] Browser.close failed: {}", e);
            }
            if let Err(e) = self.client.close().await {
                tracing::debug!("[ChromeBrowser] Closing socket failed: {}", e);
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            let exited =
                tokio::time::timeout(std::time::Duration::from_secs(2), child.wait()).await;
            if exited.is_err() {
                tracing::warn!("[ChromeBrowser] Chrome did not exit, killing");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_executable_wins() {
        let launcher = ChromeLauncher::new(BrowserConfig {
            executable: Some(PathBuf::from("/opt/chrome/chrome")),
            ..BrowserConfig::default()
        });
        assert_eq!(
            launcher.executable().unwrap(),
            PathBuf::from("/opt/chrome/chrome")
        );
    }

    #[tokio::test]
    async fn test_missing_executable_fails_launch() {
        let launcher = ChromeLauncher::new(BrowserConfig {
            executable: Some(PathBuf::from("/nonexistent/chrome-binary")),
            ..BrowserConfig::default()
        });
        let err = launcher.launch().await.err().unwrap();
        assert!(matches!(err, BrowserError::Launch(_)));
    }

    #[tokio::test]
    #[ignore] // Needs Chrome installed
    async fn test_launch_and_open_page() {
        let launcher = ChromeLauncher::new(BrowserConfig {
            no_sandbox: true,
            ..BrowserConfig::default()
        });
        let browser = launcher.launch().await.unwrap();
        let page = browser.new_page().await.unwrap();
        assert!(!page.is_closed());
        browser.close().await.unwrap();
        assert!(!browser.is_connected());
    }
}
