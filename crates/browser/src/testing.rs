//! In-memory automation backend
//!
//! [`FakeLauncher`] / [`FakeBrowser`] / [`FakePage`] implement the same traits
//! as the Chrome backend, but pages are static markup evaluated with the
//! `content` crate and captures are synthesized PNGs. Every call that would
//! reach the network is recorded so tests can assert on it.

use async_trait::async_trait;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::cdp::CDPError;
use crate::config::{PageSettings, Viewport};
use crate::error::{BrowserError, Result};
use crate::launcher::{BrowserHandle, DisconnectCallback, Launcher};
use crate::page::{Cookie, NavigationResponse, Page, QualitySnapshot};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How [`FakePage::goto`] behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GotoBehavior {
    Respond,
    Timeout,
    Fail(String),
}

/// Pixel content of synthesized captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePattern {
    /// Compresses to almost nothing
    Solid,
    /// Incompressible
    Noise,
}

/// Blueprint for fake pages
#[derive(Debug, Clone)]
pub struct FakePageSpec {
    pub html: String,
    /// `None` simulates a navigation without a main-document response
    pub status: Option<u16>,
    pub goto: GotoBehavior,
    /// Markup loaded after `press_enter_and_wait`
    pub submit_html: Option<String>,
    pub content_size: (u32, u32),
    pub pattern: CapturePattern,
    /// `false` keeps `wait_for_network_idle` pending forever
    pub network_idle: bool,
    /// Selectors `wait_for_selector` waits out the full timeout for
    pub missing_selectors: Vec<String>,
    pub cookie_failure: bool,
    pub capture_failure: bool,
}

impl Default for FakePageSpec {
    fn default() -> Self {
        Self {
            html: "<html><head><title>Blank</title></head><body></body></html>".to_string(),
            status: Some(200),
            goto: GotoBehavior::Respond,
            submit_html: None,
            content_size: (1280, 800),
            pattern: CapturePattern::Solid,
            network_idle: true,
            missing_selectors: Vec::new(),
            cookie_failure: false,
            capture_failure: false,
        }
    }
}

impl FakePageSpec {
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }

    pub fn with_goto(mut self, goto: GotoBehavior) -> Self {
        self.goto = goto;
        self
    }

    pub fn with_submit_html(mut self, html: impl Into<String>) -> Self {
        self.submit_html = Some(html.into());
        self
    }

    pub fn with_content_size(mut self, width: u32, height: u32) -> Self {
        self.content_size = (width, height);
        self
    }

    pub fn with_pattern(mut self, pattern: CapturePattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_network_idle(mut self, settles: bool) -> Self {
        self.network_idle = settles;
        self
    }

    pub fn with_missing_selector(mut self, selector: impl Into<String>) -> Self {
        self.missing_selectors.push(selector.into());
        self
    }

    pub fn with_cookie_failure(mut self) -> Self {
        self.cookie_failure = true;
        self
    }

    pub fn with_capture_failure(mut self) -> Self {
        self.capture_failure = true;
        self
    }
}

#[derive(Debug)]
struct FakePageState {
    spec: FakePageSpec,
    url: String,
    viewport: Option<Viewport>,
    viewports: Vec<Viewport>,
    settings: Option<PageSettings>,
    cookies: Vec<Cookie>,
    navigations: Vec<String>,
    fills: Vec<(String, String)>,
    captures: usize,
}

/// Page backed by static markup
#[derive(Debug)]
pub struct FakePage {
    state: Mutex<FakePageState>,
    closed: AtomicBool,
}

impl FakePage {
    pub fn new(spec: FakePageSpec) -> Self {
        Self {
            state: Mutex::new(FakePageState {
                spec,
                url: "about:blank".to_string(),
                viewport: None,
                viewports: Vec::new(),
                settings: None,
                cookies: Vec::new(),
                navigations: Vec::new(),
                fills: Vec::new(),
                captures: 0,
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// Simulate the remote side closing or crashing the tab
    pub fn close_out_of_band(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// URLs passed to `goto`, in order
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.state).navigations.clone()
    }

    pub fn captures(&self) -> usize {
        lock(&self.state).captures
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        lock(&self.state).cookies.clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        lock(&self.state).fills.clone()
    }

    pub fn settings(&self) -> Option<PageSettings> {
        lock(&self.state).settings.clone()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        lock(&self.state).viewport
    }

    /// Every viewport passed to `set_viewport`, in order
    pub fn viewports(&self) -> Vec<Viewport> {
        lock(&self.state).viewports.clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(BrowserError::PageClosed)
        } else {
            Ok(())
        }
    }

    fn html(&self) -> String {
        lock(&self.state).spec.html.clone()
    }

    fn has_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let found = content::contains_selector(&self.html(), selector)
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?;
        if found {
            Ok(())
        } else {
            Err(BrowserError::Timeout {
                what: format!("selector {selector}"),
                after: timeout,
            })
        }
    }
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new(FakePageSpec::default())
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Synthesize a PNG of the requested size
pub fn synth_png(width: u32, height: u32, pattern: CapturePattern) -> Result<Vec<u8>> {
    let img = match pattern {
        CapturePattern::Solid => RgbImage::from_pixel(width, height, Rgb([32, 96, 160])),
        CapturePattern::Noise => {
            let mut seed: u32 = 0x9E37_79B9;
            RgbImage::from_fn(width, height, |_, _| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                let [r, g, b, _] = seed.to_le_bytes();
                Rgb([r, g, b])
            })
        }
    };

    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, CompressionType::Fast, FilterType::Sub);
    img.write_with_encoder(encoder)?;
    Ok(out)
}

#[async_trait]
impl Page for FakePage {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn configure(&self, settings: &PageSettings) -> Result<()> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        state.viewport = Some(settings.viewport);
        state.settings = Some(settings.clone());
        Ok(())
    }

    async fn set_cookie(&self, cookie: &Cookie) -> Result<()> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        if state.spec.cookie_failure {
            return Err(BrowserError::Evaluation(format!("cookie {} rejected", cookie.name)));
        }
        state.cookies.push(cookie.clone());
        Ok(())
    }

    async fn goto(&self, url: &str, timeout: Duration) -> Result<Option<NavigationResponse>> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        state.navigations.push(url.to_string());
        match state.spec.goto.clone() {
            GotoBehavior::Timeout => Err(BrowserError::NavigationTimeout(timeout)),
            GotoBehavior::Fail(message) => Err(BrowserError::Navigation(message)),
            GotoBehavior::Respond => {
                state.url = url.to_string();
                Ok(state.spec.status.map(|status| NavigationResponse {
                    status,
                    status_text: status_text(status).to_string(),
                }))
            }
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        let missing = lock(&self.state)
            .spec
            .missing_selectors
            .iter()
            .any(|s| s == selector);
        if missing {
            tokio::time::sleep(timeout).await;
            return Err(BrowserError::Timeout {
                what: format!("selector {selector}"),
                after: timeout,
            });
        }
        self.has_selector(selector, timeout)
    }

    async fn wait_for_network_idle(&self) -> Result<()> {
        self.ensure_open()?;
        let settles = lock(&self.state).spec.network_idle;
        if !settles {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn quality_snapshot(&self, challenge_selectors: &[&str]) -> Result<QualitySnapshot> {
        self.ensure_open()?;
        Ok(content::snapshot_html(&self.html(), challenge_selectors))
    }

    async fn title(&self) -> Result<String> {
        self.ensure_open()?;
        Ok(content::document_title(&self.html()).unwrap_or_default())
    }

    async fn url(&self) -> Result<String> {
        self.ensure_open()?;
        Ok(lock(&self.state).url.clone())
    }

    async fn content(&self) -> Result<String> {
        self.ensure_open()?;
        Ok(self.html())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        self.ensure_open()?;
        self.has_selector(selector, Duration::ZERO)?;
        lock(&self.state)
            .fills
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn press_enter_and_wait(&self, _timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        if let Some(next) = state.spec.submit_html.clone() {
            state.spec.html = next;
        }
        Ok(())
    }

    async fn content_size(&self) -> Result<(u32, u32)> {
        self.ensure_open()?;
        Ok(lock(&self.state).spec.content_size)
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        state.viewport = Some(viewport);
        state.viewports.push(viewport);
        Ok(())
    }

    async fn capture_png(&self, width: u32, height: u32) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let pattern = {
            let mut state = lock(&self.state);
            state.captures += 1;
            if state.spec.capture_failure {
                return Err(BrowserError::Capture("screenshot target gone".to_string()));
            }
            state.spec.pattern
        };
        synth_png(width, height, pattern)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

type PageLog = Arc<Mutex<Vec<Arc<FakePage>>>>;

/// Browser that hands out [`FakePage`]s
pub struct FakeBrowser {
    template: FakePageSpec,
    pages: PageLog,
    connected: AtomicBool,
    observers: Mutex<Vec<DisconnectCallback>>,
    closes: AtomicUsize,
}

impl FakeBrowser {
    fn new(template: FakePageSpec, pages: PageLog) -> Self {
        Self {
            template,
            pages,
            connected: AtomicBool::new(true),
            observers: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    /// Simulate the connection dropping
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let observers: Vec<_> = lock(&self.observers).drain(..).collect();
            for observer in observers {
                observer();
            }
        }
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn on_disconnect(&self, callback: DisconnectCallback) {
        if self.is_connected() {
            lock(&self.observers).push(callback);
        } else {
            callback();
        }
    }

    async fn new_page(&self) -> Result<Arc<dyn Page>> {
        if !self.is_connected() {
            return Err(CDPError::Closed.into());
        }
        let page = Arc::new(FakePage::new(self.template.clone()));
        lock(&self.pages).push(page.clone());
        Ok(page)
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.disconnect();
        Ok(())
    }
}

/// Launcher producing [`FakeBrowser`]s
#[derive(Default)]
pub struct FakeLauncher {
    template: Mutex<FakePageSpec>,
    pages: PageLog,
    browsers: Mutex<Vec<Arc<FakeBrowser>>>,
    fail_launch: AtomicBool,
}

impl FakeLauncher {
    pub fn new(template: FakePageSpec) -> Self {
        Self {
            template: Mutex::new(template),
            ..Self::default()
        }
    }

    /// Blueprint for pages opened from now on
    pub fn set_template(&self, template: FakePageSpec) {
        *lock(&self.template) = template;
    }

    pub fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        lock(&self.browsers).len()
    }

    pub fn browsers(&self) -> Vec<Arc<FakeBrowser>> {
        lock(&self.browsers).clone()
    }

    /// Every page opened so far, across browsers
    pub fn pages(&self) -> Vec<Arc<FakePage>> {
        lock(&self.pages).clone()
    }

    pub fn last_page(&self) -> Option<Arc<FakePage>> {
        lock(&self.pages).last().cloned()
    }

    /// Total `goto` calls across all pages
    pub fn navigation_count(&self) -> usize {
        self.pages().iter().map(|p| p.navigations().len()).sum()
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(BrowserError::Launch("launch disabled".to_string()));
        }
        let template = lock(&self.template).clone();
        let browser = Arc::new(FakeBrowser::new(template, self.pages.clone()));
        lock(&self.browsers).push(browser.clone());
        Ok(browser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_page_navigation_and_snapshot() {
        let page = FakePage::new(
            FakePageSpec::default()
                .with_html("<html><head><title>T</title></head><body>one two three</body></html>"),
        );
        let response = page
            .goto("https://example.com", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response.unwrap().status, 200);
        assert_eq!(page.navigations(), vec!["https://example.com"]);

        let snapshot = page.quality_snapshot(&["#challenge"]).await.unwrap();
        assert_eq!(snapshot.word_count, 3);
        assert_eq!(snapshot.title, "T");
    }

    #[tokio::test]
    async fn test_closed_page_rejects_calls() {
        let page = FakePage::default();
        page.close_out_of_band();
        assert!(matches!(page.title().await, Err(BrowserError::PageClosed)));
    }

    #[tokio::test]
    async fn test_disconnect_fires_observers_once() {
        let launcher = FakeLauncher::default();
        let browser = launcher.launch().await.unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        browser.on_disconnect(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        launcher.browsers()[0].disconnect();
        launcher.browsers()[0].disconnect();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!browser.is_connected());
    }

    #[test]
    fn test_synth_png_dimensions() {
        let bytes = synth_png(64, 48, CapturePattern::Noise).unwrap();
        let img = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }
}
