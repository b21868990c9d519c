//! Session Store
//!
//! Bounded, memory-resident log of research results.
//!
//! Design:
//! - One session at a time; starting a new one drops the old wholesale
//! - FIFO eviction past `max_results`
//! - Screenshot files are owned by the results that reference them; results
//!   that leave the session (eviction, clear, replace) hand their screenshots
//!   to the caller through `take_released` for async deletion

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{Result, ToolError};

pub const MAX_RESULTS: usize = 100;

/// Label of sessions started implicitly by visit / screenshot
pub const DEFAULT_SESSION_LABEL: &str = "Research Session";

/// A stored screenshot.
///
/// The file is deleted by [`ScreenshotFile::remove`] once the session lets go
/// of it; dropping an unremoved file deletes it on the blocking pool.
#[derive(Debug)]
pub struct ScreenshotFile {
    path: PathBuf,
    removed: bool,
}

fn log_removal(path: &Path, outcome: std::io::Result<()>) {
    match outcome {
        Ok(()) => tracing::debug!("[SessionStore] Deleted {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("[SessionStore] Failed to delete {}: {}", path.display(), e),
    }
}

impl ScreenshotFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }

    pub async fn remove(mut self) {
        self.removed = true;
        log_removal(&self.path, tokio::fs::remove_file(&self.path).await);
    }
}

impl Drop for ScreenshotFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || log_removal(&path, std::fs::remove_file(&path)));
            }
            Err(_) => log_removal(&path, std::fs::remove_file(&path)),
        }
    }
}

pub type ScreenshotRef = Arc<ScreenshotFile>;

/// Delete every released screenshot nobody else still holds
pub async fn remove_released(released: Vec<ScreenshotRef>) {
    for shot in released {
        if let Some(file) = Arc::into_inner(shot) {
            file.remove().await;
        }
    }
}

/// Writes screenshots as uniquely named PNG files under one directory
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
}

impl ScreenshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn save(&self, png: &[u8]) -> Result<ScreenshotRef> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.png", Uuid::now_v7()));
        tokio::fs::write(&path, png).await?;
        tracing::debug!("[ScreenshotStore] Saved {} ({} bytes)", path.display(), png.len());
        Ok(Arc::new(ScreenshotFile {
            path,
            removed: false,
        }))
    }

    /// Remove the directory if nothing else is left in it
    pub async fn remove_dir(&self) {
        match tokio::fs::remove_dir(&self.dir).await {
            Ok(()) => tracing::debug!("[ScreenshotStore] Removed {}", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "[ScreenshotStore] Could not remove {}: {}",
                self.dir.display(),
                e
            ),
        }
    }
}

/// One captured outcome of a search, visit or screenshot
#[derive(Debug, Clone)]
pub struct ResearchResult {
    pub url: String,
    pub title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub screenshot: Option<ScreenshotRef>,
}

impl ResearchResult {
    pub fn new(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            timestamp: Utc::now(),
            screenshot: None,
        }
    }

    pub fn with_screenshot(mut self, screenshot: ScreenshotRef) -> Self {
        self.screenshot = Some(screenshot);
        self
    }
}

#[derive(Debug)]
pub struct ResearchSession {
    pub query: String,
    pub last_updated: DateTime<Utc>,
    results: VecDeque<ResearchResult>,
}

impl ResearchSession {
    fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            last_updated: Utc::now(),
            results: VecDeque::new(),
        }
    }

    /// Results, oldest first
    pub fn results(&self) -> impl Iterator<Item = &ResearchResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub title: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub query: String,
    pub result_count: usize,
    pub last_updated: DateTime<Utc>,
    pub results: Vec<ResultSummary>,
}

/// Changes listeners may want to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A result carrying a screenshot was stored at `index`
    ScreenshotAdded { index: usize },
    /// Screenshots were dropped or moved to other indices
    ScreenshotsChanged,
}

pub struct SessionStore {
    session: Option<ResearchSession>,
    max_results: usize,
    events: broadcast::Sender<SessionEvent>,
    released: Vec<ScreenshotRef>,
}

impl SessionStore {
    pub fn new(max_results: usize) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            session: None,
            max_results: max_results.max(1),
            events,
            released: Vec::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    /// Screenshots of results that left the session since the last call
    pub fn take_released(&mut self) -> Vec<ScreenshotRef> {
        std::mem::take(&mut self.released)
    }

    /// Move the screenshots of `results` to the release list
    fn release(&mut self, results: impl IntoIterator<Item = ResearchResult>) -> bool {
        let before = self.released.len();
        self.released
            .extend(results.into_iter().filter_map(|r| r.screenshot));
        self.released.len() > before
    }

    pub fn current(&self) -> Option<&ResearchSession> {
        self.session.as_ref()
    }

    /// Replace the current session with an empty one labelled `query`
    pub fn start(&mut self, query: impl Into<String>) -> &mut ResearchSession {
        let session = ResearchSession::new(query);
        tracing::info!("[SessionStore] New session: {}", session.query);
        self.drop_session();
        self.session.insert(session)
    }

    fn drop_session(&mut self) {
        if let Some(old) = self.session.take() {
            if self.release(old.results) {
                let _ = self.events.send(SessionEvent::ScreenshotsChanged);
            }
        }
    }

    /// Current session, starting one labelled `label` if none exists
    pub fn ensure_session(&mut self, label: &str) -> &mut ResearchSession {
        if self.session.is_none() {
            return self.start(label);
        }
        self.session.get_or_insert_with(|| ResearchSession::new(label))
    }

    /// Append `result`, evicting the oldest past the cap. Returns its index.
    pub fn add_result(&mut self, result: ResearchResult) -> usize {
        let max_results = self.max_results;
        let has_screenshot = result.screenshot.is_some();
        let session = self.ensure_session(DEFAULT_SESSION_LABEL);

        session.last_updated = result.timestamp;
        session.results.push_back(result);
        let excess = session.results.len().saturating_sub(max_results);
        let evicted: Vec<_> = session.results.drain(..excess).collect();
        for result in &evicted {
            tracing::debug!("[SessionStore] Evicted {}", result.url);
        }
        let index = session.results.len() - 1;
        // Every remaining result moved down, screenshots included
        let shifted = !evicted.is_empty()
            && session.results.iter().take(index).any(|r| r.screenshot.is_some());

        let dropped = self.release(evicted);
        if dropped || shifted {
            let _ = self.events.send(SessionEvent::ScreenshotsChanged);
        }
        if has_screenshot {
            let _ = self.events.send(SessionEvent::ScreenshotAdded { index });
        }
        index
    }

    /// Drop the session and every screenshot it owns
    pub fn clear(&mut self) {
        if let Some(session) = &self.session {
            tracing::info!(
                "[SessionStore] Cleared session '{}' ({} results)",
                session.query,
                session.len()
            );
        }
        self.drop_session();
    }

    pub fn summary(&self) -> Option<SessionSummary> {
        self.session.as_ref().map(|session| SessionSummary {
            query: session.query.clone(),
            result_count: session.len(),
            last_updated: session.last_updated,
            results: session
                .results()
                .map(|r| ResultSummary {
                    title: r.title.clone(),
                    url: r.url.clone(),
                    timestamp: r.timestamp,
                })
                .collect(),
        })
    }

    /// Indices of results that carry a screenshot
    pub fn screenshot_indices(&self) -> Vec<usize> {
        self.session
            .iter()
            .flat_map(|s| s.results())
            .enumerate()
            .filter(|(_, r)| r.screenshot.is_some())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn screenshot(&self, index: usize) -> Result<ScreenshotRef> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ToolError::Validation("no active research session".to_string()))?;
        let result = session.results.get(index).ok_or_else(|| {
            ToolError::Validation(format!(
                "screenshot index {index} out of range (session has {} results)",
                session.len()
            ))
        })?;
        result
            .screenshot
            .clone()
            .ok_or_else(|| ToolError::Validation(format!("result {index} has no screenshot")))
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(MAX_RESULTS)
    }
}
