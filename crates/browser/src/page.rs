//! Page abstraction
//!
//! Everything above the CDP layer talks to a page through this trait so the
//! automation backend can be swapped (real Chrome, or the in-memory fake used
//! in tests). Logic that runs "inside" the page is expressed as plain-data
//! results: the backend decides how the boundary is crossed.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{PageSettings, Viewport};
use crate::error::Result;

pub use content::QualitySnapshot;

/// Main-document response of a navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResponse {
    pub status: u16,
    pub status_text: String,
}

/// Cookie to pre-seed before navigating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

/// A single browser tab
#[async_trait]
pub trait Page: Send + Sync {
    /// Whether the page was closed, crashed, or lost its connection
    fn is_closed(&self) -> bool;

    /// Apply viewport, user agent and resource blocking
    async fn configure(&self, settings: &PageSettings) -> Result<()>;

    async fn set_cookie(&self, cookie: &Cookie) -> Result<()>;

    /// Navigate and wait for DOM-ready.
    ///
    /// Fails with `BrowserError::NavigationTimeout` when DOM-ready is not
    /// reached within `timeout`. Returns `None` when no main-document response
    /// was observed (e.g. same-document navigation).
    async fn goto(&self, url: &str, timeout: Duration) -> Result<Option<NavigationResponse>>;

    /// Wait until `selector` matches an element
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Resolve once the network goes idle. Unbounded: callers race it.
    async fn wait_for_network_idle(&self) -> Result<()>;

    /// Challenge-marker presence, visible word count and title
    async fn quality_snapshot(&self, challenge_selectors: &[&str]) -> Result<QualitySnapshot>;

    async fn title(&self) -> Result<String>;

    async fn url(&self) -> Result<String>;

    /// Serialized markup of the whole document
    async fn content(&self) -> Result<String>;

    /// Focus `selector`, clear it and type `text`
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    /// Press Enter and wait for the resulting navigation to reach DOM-ready
    async fn press_enter_and_wait(&self, timeout: Duration) -> Result<()>;

    /// Natural extent of the rendered content, in CSS pixels
    async fn content_size(&self) -> Result<(u32, u32)>;

    async fn set_viewport(&self, viewport: Viewport) -> Result<()>;

    /// PNG capture of the region `(0, 0, width, height)`
    async fn capture_png(&self, width: u32, height: u32) -> Result<Vec<u8>>;

    async fn close(&self) -> Result<()>;
}
