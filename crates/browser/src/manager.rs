//! Resource Manager - owns the single browser/page pair
//!
//! Design:
//! - Injectable: the backend comes in as an `Arc<dyn Launcher>`, never a global
//! - Lazy repair: a dead browser or out-of-band closed page is detected on the
//!   next `acquire_page` and replaced, never handed back
//! - Explicit state machine for both handles, observable without locking
//!
//! Callers serialize tool invocations; the inner mutex only guards against
//! accidental overlap, it is not a scheduling mechanism.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::Mutex;

use crate::config::PageSettings;
use crate::error::Result;
use crate::events::{BrowserEvent, EventBus};
use crate::launcher::{BrowserHandle, Launcher};
use crate::page::Page;

/// Lifecycle of the browser handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserState {
    Absent,
    Launching,
    Ready,
    Disconnected,
}

/// Lifecycle of the page handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Absent,
    Open,
    Closed,
}

/// Browser state plus a generation counter so observers registered on a
/// browser that was already replaced cannot mark the new one dead.
#[derive(Debug)]
struct Lifecycle {
    state: BrowserState,
    generation: u64,
}

struct Handles {
    browser: Option<Arc<dyn BrowserHandle>>,
    page: Option<Arc<dyn Page>>,
}

pub struct ResourceManager {
    launcher: Arc<dyn Launcher>,
    settings: PageSettings,
    handles: Mutex<Handles>,
    lifecycle: Arc<StdMutex<Lifecycle>>,
    events: EventBus,
}

fn lock(lifecycle: &StdMutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ResourceManager {
    pub fn new(launcher: Arc<dyn Launcher>, settings: PageSettings) -> Self {
        Self {
            launcher,
            settings,
            handles: Mutex::new(Handles {
                browser: None,
                page: None,
            }),
            lifecycle: Arc::new(StdMutex::new(Lifecycle {
                state: BrowserState::Absent,
                generation: 0,
            })),
            events: EventBus::new(),
        }
    }

    /// Settings applied to every page this manager opens
    pub fn page_settings(&self) -> &PageSettings {
        &self.settings
    }

    pub fn browser_state(&self) -> BrowserState {
        lock(&self.lifecycle).state
    }

    /// Current page state; `Closed` covers out-of-band closes not yet repaired
    pub async fn page_state(&self) -> PageState {
        match &self.handles.lock().await.page {
            None => PageState::Absent,
            Some(page) if page.is_closed() => PageState::Closed,
            Some(_) => PageState::Open,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Return a ready page, launching and reopening as needed.
    ///
    /// Fails only when a fresh browser cannot be started or cannot open a page.
    pub async fn acquire_page(&self) -> Result<Arc<dyn Page>> {
        let mut handles = self.handles.lock().await;

        let browser = match handles.browser.clone() {
            Some(browser) if browser.is_connected() && self.browser_state() == BrowserState::Ready => {
                browser
            }
            stale => {
                if stale.is_some() {
                    tracing::info!("[ResourceManager] Browser disconnected, relaunching");
                }
                let page = handles.page.take();
                handles.browser = None;
                teardown(page, stale).await;

                let browser = self.launch().await?;
                handles.browser = Some(browser.clone());
                browser
            }
        };

        if let Some(page) = &handles.page {
            if !page.is_closed() {
                return Ok(page.clone());
            }
            tracing::info!("[ResourceManager] Page closed out-of-band, reopening");
            handles.page = None;
        }

        let page = browser.new_page().await?;
        if let Err(e) = page.configure(&self.settings).await {
            if let Err(close_err) = page.close().await {
                tracing::debug!("[ResourceManager] Closing unconfigured page failed: {}", close_err);
            }
            return Err(e);
        }
        handles.page = Some(page.clone());
        self.events.publish(BrowserEvent::PageOpened);
        tracing::debug!("[ResourceManager] Page ready");
        Ok(page)
    }

    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>> {
        let generation = {
            let mut lifecycle = lock(&self.lifecycle);
            lifecycle.generation += 1;
            lifecycle.state = BrowserState::Launching;
            lifecycle.generation
        };

        let browser = match self.launcher.launch().await {
            Ok(browser) => browser,
            Err(e) => {
                tracing::error!("[ResourceManager] Launch failed: {}", e);
                lock(&self.lifecycle).state = BrowserState::Absent;
                return Err(e);
            }
        };
        lock(&self.lifecycle).state = BrowserState::Ready;

        let lifecycle = self.lifecycle.clone();
        let events = self.events.clone();
        browser.on_disconnect(Box::new(move || {
            let mut lifecycle = lock(&lifecycle);
            if lifecycle.generation == generation && lifecycle.state == BrowserState::Ready {
                lifecycle.state = BrowserState::Disconnected;
                tracing::warn!("[ResourceManager] Browser connection lost");
                events.publish(BrowserEvent::Disconnected);
            }
        }));

        tracing::info!("[ResourceManager] Browser launched");
        self.events.publish(BrowserEvent::Launched);
        Ok(browser)
    }

    /// Close page and browser. Both references are dropped even if closing fails.
    pub async fn release_all(&self) {
        let (page, browser) = {
            let mut handles = self.handles.lock().await;
            (handles.page.take(), handles.browser.take())
        };
        {
            let mut lifecycle = lock(&self.lifecycle);
            lifecycle.generation += 1;
            lifecycle.state = BrowserState::Absent;
        }

        let had_browser = browser.is_some();
        teardown(page, browser).await;
        if had_browser {
            tracing::info!("[ResourceManager] Browser released");
            self.events.publish(BrowserEvent::Released);
        }
    }
}

/// Best-effort close; failures are logged and swallowed
async fn teardown(page: Option<Arc<dyn Page>>, browser: Option<Arc<dyn BrowserHandle>>) {
    if let Some(page) = page {
        if !page.is_closed() {
            if let Err(e) = page.close().await {
                tracing::warn!("[ResourceManager] Failed to close page: {}", e);
            }
        }
    }
    if let Some(browser) = browser {
        if let Err(e) = browser.close().await {
            tracing::warn!("[ResourceManager] Failed to close browser: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrowserError;
    use crate::testing::{FakeLauncher, FakePageSpec};

    fn manager() -> (Arc<FakeLauncher>, ResourceManager) {
        let launcher = Arc::new(FakeLauncher::new(FakePageSpec::default()));
        let manager = ResourceManager::new(launcher.clone(), PageSettings::default());
        (launcher, manager)
    }

    #[tokio::test]
    async fn test_acquire_launches_once() {
        let (launcher, manager) = manager();
        assert_eq!(manager.browser_state(), BrowserState::Absent);
        assert_eq!(manager.page_state().await, PageState::Absent);

        let first = manager.acquire_page().await.unwrap();
        let second = manager.acquire_page().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(launcher.launches(), 1);
        assert_eq!(manager.browser_state(), BrowserState::Ready);
        assert_eq!(manager.page_state().await, PageState::Open);
    }

    #[tokio::test]
    async fn test_page_gets_baseline_configuration() {
        let (launcher, manager) = manager();
        manager.acquire_page().await.unwrap();

        let page = launcher.last_page().unwrap();
        assert_eq!(page.settings(), Some(PageSettings::default()));
        assert_eq!(page.viewport(), Some(PageSettings::default().viewport));
    }

    #[tokio::test]
    async fn test_out_of_band_close_reopens_page() {
        let (launcher, manager) = manager();
        manager.acquire_page().await.unwrap();
        launcher.last_page().unwrap().close_out_of_band();
        assert_eq!(manager.page_state().await, PageState::Closed);

        let page = manager.acquire_page().await.unwrap();

        assert!(!page.is_closed());
        assert_eq!(launcher.pages().len(), 2);
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_triggers_relaunch() {
        let (launcher, manager) = manager();
        let mut events = manager.events().subscribe();
        manager.acquire_page().await.unwrap();

        launcher.browsers()[0].disconnect();
        assert_eq!(manager.browser_state(), BrowserState::Disconnected);

        let page = manager.acquire_page().await.unwrap();
        assert!(!page.is_closed());
        assert_eq!(launcher.launches(), 2);
        assert_eq!(manager.browser_state(), BrowserState::Ready);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                BrowserEvent::Launched,
                BrowserEvent::PageOpened,
                BrowserEvent::Disconnected,
                BrowserEvent::Launched,
                BrowserEvent::PageOpened,
            ]
        );
    }

    #[tokio::test]
    async fn test_launch_failure_is_resource_error() {
        let (launcher, manager) = manager();
        launcher.set_fail_launch(true);

        let err = manager.acquire_page().await.err().unwrap();
        assert!(matches!(err, BrowserError::Launch(_)));
        assert_eq!(manager.browser_state(), BrowserState::Absent);

        launcher.set_fail_launch(false);
        assert!(manager.acquire_page().await.is_ok());
    }

    #[tokio::test]
    async fn test_release_all_closes_both() {
        let (launcher, manager) = manager();
        manager.acquire_page().await.unwrap();

        manager.release_all().await;

        assert!(launcher.last_page().unwrap().is_closed());
        assert_eq!(launcher.browsers()[0].closes(), 1);
        assert_eq!(manager.browser_state(), BrowserState::Absent);
        assert_eq!(manager.page_state().await, PageState::Absent);

        // Idempotent
        manager.release_all().await;
        assert_eq!(launcher.browsers()[0].closes(), 1);
    }
}
