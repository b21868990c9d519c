//! Research service: the three tools and the session around them.
//!
//! Every tool invocation runs under one operation lock, so the shared page is
//! never driven by two operations at once. Each step that talks to the
//! browser is wrapped in its own retry.

use browser::navigation::{safe_navigate, QualityProfile, NAVIGATION_TIMEOUT};
use browser::screenshot::capture_bounded;
use browser::{BrowserError, BrowserEvent, Launcher, Page, PageSettings, ResourceManager};
use content::{parse_search_results, truncate_content, SearchLayout, SearchResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

use crate::config::ResearchConfig;
use crate::error::{Result, ToolError};
use crate::retry::with_retry;
use crate::session::{
    remove_released, ResearchResult, ScreenshotRef, ScreenshotStore, SessionEvent, SessionStore,
    SessionSummary,
};
use crate::validation::{validate_query, validate_url};

/// Content recorded for a bare screenshot
pub const SCREENSHOT_PLACEHOLDER: &str = "Screenshot taken";

const INPUT_WAIT: Duration = Duration::from_secs(5);
const RESULTS_WAIT: Duration = Duration::from_secs(10);

/// Outcome of `visit_page`
#[derive(Debug, Clone)]
pub struct PageVisit {
    pub url: String,
    pub title: String,
    pub content: String,
    pub screenshot: Option<ScreenshotRef>,
    /// Position of the recorded result in the session
    pub index: usize,
}

/// Outcome of `take_screenshot`
#[derive(Debug, Clone)]
pub struct Capture {
    pub url: String,
    pub screenshot: ScreenshotRef,
    pub index: usize,
}

pub struct ResearchService {
    resources: ResourceManager,
    config: ResearchConfig,
    layout: SearchLayout,
    sessions: Mutex<SessionStore>,
    session_events: broadcast::Sender<SessionEvent>,
    screenshots: ScreenshotStore,
    op_lock: Mutex<()>,
    shut_down: AtomicBool,
}

impl ResearchService {
    pub fn new(launcher: Arc<dyn Launcher>, page: PageSettings, config: ResearchConfig) -> Self {
        let sessions = SessionStore::new(config.max_results);
        Self {
            resources: ResourceManager::new(launcher, page),
            layout: SearchLayout::default(),
            session_events: sessions.event_sender(),
            sessions: Mutex::new(sessions),
            screenshots: ScreenshotStore::new(config.screenshot_dir.clone()),
            op_lock: Mutex::new(()),
            shut_down: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_events.subscribe()
    }

    /// Apply `change` to the session store, then delete the screenshots it released
    async fn update_sessions<T>(&self, change: impl FnOnce(&mut SessionStore) -> T) -> T {
        let (value, released) = {
            let mut sessions = self.sessions.lock().await;
            let value = change(&mut sessions);
            (value, sessions.take_released())
        };
        remove_released(released).await;
        value
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            Err(ToolError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    /// Replace the current session with an empty one labelled `query`
    pub async fn start_session(&self, query: &str) {
        self.update_sessions(|sessions| {
            sessions.start(query);
        })
        .await;
    }

    /// Query the search engine and record every hit
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let query = validate_query(query)?;
        let _op = self.op_lock.lock().await;
        self.ensure_running()?;

        {
            let mut sessions = self.sessions.lock().await;
            if sessions.current().is_none() {
                sessions.start(query);
            }
        }

        let results = with_retry(self.config.retry, "search", move || self.search_once(query)).await?;

        self.update_sessions(|sessions| {
            for hit in &results {
                sessions.add_result(ResearchResult::new(&hit.url, &hit.title, &hit.snippet));
            }
        })
        .await;
        tracing::info!("[Research] Search '{}' returned {} results", query, results.len());
        Ok(results)
    }

    async fn search_once(&self, query: &str) -> Result<Vec<SearchResult>> {
        let page = self.open(&self.config.search_url, QualityProfile::Lenient).await?;
        let page = page.as_ref();
        let retry = self.config.retry;
        let input = self.config.search_input_selector.as_str();

        with_retry(retry, "search input", move || page.wait_for_selector(input, INPUT_WAIT)).await?;
        with_retry(retry, "search submit", move || async move {
            page.fill(input, query).await?;
            page.press_enter_and_wait(NAVIGATION_TIMEOUT).await
        })
        .await?;
        with_retry(retry, "search results", move || self.collect_results(page)).await
    }

    async fn collect_results(&self, page: &dyn Page) -> Result<Vec<SearchResult>> {
        page.wait_for_selector(&self.config.results_selector, RESULTS_WAIT)
            .await?;
        let html = page.content().await?;
        let results = parse_search_results(&html, &self.layout)?;
        if results.is_empty() {
            return Err(BrowserError::Navigation("search returned no results".to_string()).into());
        }
        Ok(results)
    }

    /// Acquire the page and navigate it through the safety layer
    async fn open(&self, url: &str, profile: QualityProfile) -> Result<Arc<dyn Page>> {
        let page = self.resources.acquire_page().await?;
        let events = self.resources.events();
        events.publish(BrowserEvent::NavigationStarted {
            url: url.to_string(),
        });
        safe_navigate(page.as_ref(), url, profile).await?;
        events.publish(BrowserEvent::NavigationComplete {
            url: url.to_string(),
        });
        Ok(page)
    }

    /// Fetch `url` as markdown, optionally with a screenshot, and record it
    pub async fn visit_page(&self, url: &str, take_screenshot: bool) -> Result<PageVisit> {
        let url = validate_url(url)?;
        let _op = self.op_lock.lock().await;
        self.ensure_running()?;

        let retry = self.config.retry;
        let target = url.as_str();
        let page = with_retry(retry, "navigate", move || self.open(target, QualityProfile::Strict)).await?;
        let page = page.as_ref();

        let title = page.title().await?;
        let content = with_retry(retry, "extract content", move || self.extract_content(page)).await?;
        let screenshot = if take_screenshot {
            Some(self.capture(page).await?)
        } else {
            None
        };

        let mut result = ResearchResult::new(target, &title, &content);
        if let Some(shot) = &screenshot {
            result = result.with_screenshot(shot.clone());
        }
        let index = self.update_sessions(|sessions| sessions.add_result(result)).await;
        tracing::info!("[Research] Visited {} ({} chars)", target, content.chars().count());

        Ok(PageVisit {
            url: target.to_string(),
            title,
            content,
            screenshot,
            index,
        })
    }

    async fn extract_content(&self, page: &dyn Page) -> Result<String> {
        let html = page.content().await?;
        let markdown = content::extract_markdown(&html, None)?;
        Ok(truncate_content(&markdown, self.config.content_limit))
    }

    async fn capture(&self, page: &dyn Page) -> Result<ScreenshotRef> {
        let max_bytes = self.config.screenshot_max_bytes;
        let viewport = self.resources.page_settings().viewport;
        let png = with_retry(self.config.retry, "screenshot", move || {
            capture_bounded(page, max_bytes, viewport)
        })
        .await?;
        self.screenshots.save(&png).await
    }

    /// Screenshot the current page without navigating and record it
    pub async fn take_screenshot(&self) -> Result<Capture> {
        let _op = self.op_lock.lock().await;
        self.ensure_running()?;

        let page = self.resources.acquire_page().await?;
        let url = page.url().await.unwrap_or_else(|e| {
            tracing::warn!("[Research] Could not read page URL: {}", e);
            String::new()
        });
        let title = page.title().await.unwrap_or_else(|e| {
            tracing::warn!("[Research] Could not read page title: {}", e);
            String::new()
        });
        let screenshot = self.capture(page.as_ref()).await?;

        let result =
            ResearchResult::new(&url, title, SCREENSHOT_PLACEHOLDER).with_screenshot(screenshot.clone());
        let index = self.update_sessions(|sessions| sessions.add_result(result)).await;
        tracing::info!("[Research] Screenshot of {} stored at index {}", url, index);
        Ok(Capture {
            url,
            screenshot,
            index,
        })
    }

    pub async fn session_summary(&self) -> Option<SessionSummary> {
        self.sessions.lock().await.summary()
    }

    pub async fn screenshot_indices(&self) -> Vec<usize> {
        self.sessions.lock().await.screenshot_indices()
    }

    /// PNG bytes of the screenshot held by result `index`
    pub async fn screenshot(&self, index: usize) -> Result<Vec<u8>> {
        let shot = self.sessions.lock().await.screenshot(index)?;
        shot.read().await
    }

    /// Clear the session, delete stored screenshots and release the browser.
    ///
    /// Idempotent. Returns whether cleanup finished within `deadline`.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return true;
        }
        tracing::info!("[Research] Shutting down");

        let cleanup = async {
            let _op = self.op_lock.lock().await;
            self.update_sessions(SessionStore::clear).await;
            self.screenshots.remove_dir().await;
            self.resources.release_all().await;
        };
        match tokio::time::timeout(deadline, cleanup).await {
            Ok(()) => {
                tracing::info!("[Research] Cleanup complete");
                true
            }
            Err(_) => {
                tracing::warn!("[Research] Cleanup exceeded {:?}", deadline);
                false
            }
        }
    }
}
