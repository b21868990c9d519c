//! CDP-backed page
//!
//! Implements [`Page`] on top of a [`CDPSession`]. A watcher task marks the
//! page closed when Chrome reports the target detached, crashed or destroyed;
//! a dropped socket is read off the client directly. The watcher lives as
//! long as the page, so nothing is left registered on the shared client.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::client::CDPError;
use super::protocol::{CDPEvent, LayoutMetrics, NavigateResult};
use super::session::CDPSession;
use crate::config::{PageSettings, Viewport};
use crate::error::{BrowserError, Result};
use crate::page::{Cookie, NavigationResponse, Page, QualitySnapshot};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Builds the in-page snapshot expression.
fn quality_script(challenge_selectors: &[&str]) -> String {
    let selectors = Value::from(challenge_selectors.to_vec()).to_string();
    format!(
        r#"(() => {{
  const selectors = {selectors};
  const hasChallenge = selectors.some((s) => {{
    try {{ return document.querySelector(s) !== null; }} catch (e) {{ return false; }}
  }});
  const text = document.body ? (document.body.innerText || '') : '';
  const words = text.replace(/\s+/g, ' ').trim().split(' ').filter(Boolean);
  return {{ hasChallenge, wordCount: words.length, title: document.title || '' }};
}})()"#
    )
}

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// Page driven over the DevTools protocol
pub struct CdpPage {
    session: CDPSession,
    closed: Arc<AtomicBool>,
    /// Marks the page closed on detach, crash or target destruction
    watcher: JoinHandle<()>,
    /// Fails paused requests of blocked resource types
    blocker: Mutex<Option<JoinHandle<()>>>,
}

/// Whether `event` ends the life of the page attached as `session_id` to `target_id`
fn ends_page(session_id: &str, target_id: &str, event: &CDPEvent) -> bool {
    match event.method.as_str() {
        "Inspector.detached" | "Inspector.targetCrashed" => {
            event.session_id.as_deref() == Some(session_id)
        }
        "Target.targetDestroyed" => event.param_str("targetId") == Some(target_id),
        _ => false,
    }
}

impl CdpPage {
    pub fn new(session: CDPSession) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        let watcher = {
            let closed = closed.clone();
            let session = session.clone();
            let mut events = session.events();
            tokio::spawn(async move {
                loop {
                    let event = match events.recv().await {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    if ends_page(&session.session_id, &session.target_id, &event) {
                        tracing::warn!(
                            "[CdpPage] {} for target {}",
                            event.method,
                            session.target_id
                        );
                        closed.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            })
        };

        Self {
            session,
            closed,
            watcher,
            blocker: Mutex::new(None),
        }
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_closed() {
            return Err(BrowserError::PageClosed);
        }
        Ok(self.session.send(method, Some(params)).await?)
    }

    async fn evaluate(&self, expression: impl Into<String>) -> Result<Value> {
        if self.is_closed() {
            return Err(BrowserError::PageClosed);
        }
        self.session
            .evaluate(expression)
            .await
            .map_err(|e| match e {
                CDPError::Protocol { message, .. } => BrowserError::Evaluation(message),
                other => BrowserError::Cdp(other),
            })
    }

    /// Next event for this session accepted by `matches`
    async fn next_event<F>(
        &self,
        events: &mut broadcast::Receiver<CDPEvent>,
        mut matches: F,
    ) -> Result<CDPEvent>
    where
        F: FnMut(&CDPEvent) -> bool + Send,
    {
        loop {
            match events.recv().await {
                Ok(event) if self.session.owns(&event) && matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("[CdpPage] Event receiver lagged by {}", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(BrowserError::PageClosed),
            }
        }
    }

    fn start_blocker(&self) {
        let session = self.session.clone();
        let mut events = session.events();
        let task = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if event.method != "Fetch.requestPaused" || !session.owns(&event) {
                    continue;
                }
                let Some(request_id) = event.param_str("requestId").map(str::to_string) else {
                    continue;
                };
                let result = session
                    .send(
                        "Fetch.failRequest",
                        Some(json!({ "requestId": request_id, "errorReason": "BlockedByClient" })),
                    )
                    .await;
                if let Err(e) = result {
                    tracing::debug!("[CdpPage] Failed to block request {}: {}", request_id, e);
                }
            }
        });

        if let Ok(mut slot) = self.blocker.lock() {
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }
    }

    fn stop_blocker(&self) {
        if let Ok(mut slot) = self.blocker.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.watcher.abort();
        self.stop_blocker();
    }
}

#[async_trait]
impl Page for CdpPage {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || !self.session.client().is_connected()
    }

    async fn configure(&self, settings: &PageSettings) -> Result<()> {
        self.set_viewport(settings.viewport).await?;
        self.send(
            "Network.setUserAgentOverride",
            json!({ "userAgent": settings.user_agent }),
        )
        .await?;
        self.send("Page.setLifecycleEventsEnabled", json!({ "enabled": true }))
            .await?;

        if !settings.blocked_url_patterns.is_empty() {
            self.send(
                "Network.setBlockedURLs",
                json!({ "urls": settings.blocked_url_patterns }),
            )
            .await?;
        }

        if !settings.blocked_resource_types.is_empty() {
            let patterns: Vec<Value> = settings
                .blocked_resource_types
                .iter()
                .map(|t| json!({ "resourceType": t, "requestStage": "Request" }))
                .collect();
            self.start_blocker();
            self.send("Fetch.enable", json!({ "patterns": patterns }))
                .await?;
        }

        Ok(())
    }

    async fn set_cookie(&self, cookie: &Cookie) -> Result<()> {
        self.send(
            "Network.setCookie",
            json!({
                "name": cookie.name,
                "value": cookie.value,
                "domain": cookie.domain,
                "path": cookie.path,
            }),
        )
        .await?;
        Ok(())
    }

    async fn goto(&self, url: &str, timeout: Duration) -> Result<Option<NavigationResponse>> {
        let mut events = self.session.events();

        let navigation = async {
            let result = self.send("Page.navigate", json!({ "url": url })).await?;
            let result: NavigateResult =
                serde_json::from_value(result).map_err(CDPError::from)?;

            if let Some(error) = result.error_text.filter(|e| !e.is_empty()) {
                return Err(BrowserError::Navigation(format!("{}: {}", url, error)));
            }

            // Same-document navigation: no new document will load
            let Some(loader_id) = result.loader_id else {
                return Ok(None);
            };

            let mut response = None;
            loop {
                let event = self
                    .next_event(&mut events, |e| {
                        matches!(
                            e.method.as_str(),
                            "Network.responseReceived" | "Page.domContentEventFired"
                        )
                    })
                    .await?;

                if event.method == "Page.domContentEventFired" {
                    break;
                }

                let Some(params) = event.params.as_ref() else {
                    continue;
                };
                if params["type"] == "Document" && params["loaderId"] == loader_id.as_str() {
                    response = Some(NavigationResponse {
                        status: params["response"]["status"].as_f64().unwrap_or(0.0) as u16,
                        status_text: params["response"]["statusText"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
            }
            Ok::<_, BrowserError>(response)
        };

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| BrowserError::NavigationTimeout(timeout))?
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let expression = format!("document.querySelector({}) !== null", js_string(selector));
        let deadline = Instant::now() + timeout;

        loop {
            if self.evaluate(expression.as_str()).await?.as_bool() == Some(true) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: format!("selector {}", selector),
                    after: timeout,
                });
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn wait_for_network_idle(&self) -> Result<()> {
        let mut events = self.session.events();
        self.next_event(&mut events, |e| {
            e.method == "Page.lifecycleEvent" && e.param_str("name") == Some("networkIdle")
        })
        .await?;
        Ok(())
    }

    async fn quality_snapshot(&self, challenge_selectors: &[&str]) -> Result<QualitySnapshot> {
        let value = self.evaluate(quality_script(challenge_selectors)).await?;
        serde_json::from_value(value)
            .map_err(|e| BrowserError::Evaluation(format!("malformed quality snapshot: {}", e)))
    }

    async fn title(&self) -> Result<String> {
        let value = self.evaluate("document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn url(&self) -> Result<String> {
        let value = self.evaluate("location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn content(&self) -> Result<String> {
        let value = self
            .evaluate("document.documentElement ? document.documentElement.outerHTML : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.focus(); if ('value' in el) el.value = ''; return true; }})()",
            js_string(selector)
        );
        if self.evaluate(expression).await?.as_bool() != Some(true) {
            return Err(BrowserError::Evaluation(format!(
                "element not found: {}",
                selector
            )));
        }
        self.send("Input.insertText", json!({ "text": text })).await?;
        Ok(())
    }

    async fn press_enter_and_wait(&self, timeout: Duration) -> Result<()> {
        let mut events = self.session.events();

        for kind in ["keyDown", "keyUp"] {
            let mut params = json!({
                "type": kind,
                "key": "Enter",
                "code": "Enter",
                "windowsVirtualKeyCode": 13,
                "nativeVirtualKeyCode": 13,
            });
            if kind == "keyDown" {
                params["text"] = json!("\r");
            }
            self.send("Input.dispatchKeyEvent", params).await?;
        }

        tokio::time::timeout(
            timeout,
            self.next_event(&mut events, |e| e.method == "Page.domContentEventFired"),
        )
        .await
        .map_err(|_| BrowserError::NavigationTimeout(timeout))??;
        Ok(())
    }

    async fn content_size(&self) -> Result<(u32, u32)> {
        let metrics = self.send("Page.getLayoutMetrics", json!({})).await?;
        let metrics: LayoutMetrics = serde_json::from_value(metrics).map_err(CDPError::from)?;
        let size = metrics.css_content_size;
        Ok((size.width.ceil() as u32, size.height.ceil() as u32))
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.send(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": viewport.width,
                "height": viewport.height,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
        )
        .await?;
        Ok(())
    }

    async fn capture_png(&self, width: u32, height: u32) -> Result<Vec<u8>> {
        let result = self
            .send(
                "Page.captureScreenshot",
                json!({
                    "format": "png",
                    "captureBeyondViewport": true,
                    "fromSurface": true,
                    "clip": { "x": 0, "y": 0, "width": width, "height": height, "scale": 1 },
                }),
            )
            .await?;

        let data = result["data"]
            .as_str()
            .ok_or_else(|| BrowserError::Capture("missing screenshot data".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| BrowserError::Capture(format!("invalid screenshot encoding: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        self.stop_blocker();
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.session.client().is_connected() {
            return Ok(());
        }
        self.session.close_target().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_script_embeds_selectors() {
        let script = quality_script(&["#cf-challenge-running", "div[id='x']"]);
        assert!(script.contains(r##"["#cf-challenge-running","div[id='x']"]"##));
        assert!(script.contains("wordCount"));
    }

    fn event(method: &str, session_id: Option<&str>, params: Value) -> CDPEvent {
        CDPEvent {
            method: method.to_string(),
            params: Some(params),
            session_id: session_id.map(str::to_string),
        }
    }

    #[test]
    fn test_ends_page_matches_own_session_and_target() {
        let detached = event("Inspector.detached", Some("S1"), json!({}));
        assert!(ends_page("S1", "T1", &detached));
        assert!(!ends_page("S2", "T2", &detached));

        let crashed = event("Inspector.targetCrashed", Some("S1"), json!({}));
        assert!(ends_page("S1", "T1", &crashed));

        let destroyed = event("Target.targetDestroyed", None, json!({ "targetId": "T1" }));
        assert!(ends_page("S1", "T1", &destroyed));
        assert!(!ends_page("S1", "T9", &destroyed));

        let load = event("Page.loadEventFired", Some("S1"), json!({}));
        assert!(!ends_page("S1", "T1", &load));
    }

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("a\"b"), r#""a\"b""#);
    }
}
