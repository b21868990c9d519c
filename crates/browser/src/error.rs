//! Error types for browser operations

use std::time::Duration;

use thiserror::Error;

use crate::cdp::client::CDPError;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error(transparent)]
    Cdp(#[from] CDPError),

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Page is closed")]
    PageClosed,

    #[error("Navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("HTTP {status}: {status_text}")]
    HttpStatus { status: u16, status_text: String },

    #[error("Bot protection detected: {0}")]
    BotProtection(String),

    #[error("Suspicious page title: {0}")]
    SuspiciousTitle(String),

    #[error("Insufficient content: {words} words (minimum {min})")]
    InsufficientContent { words: usize, min: usize },

    #[error("Page evaluation failed: {0}")]
    Evaluation(String),

    #[error("Page too small for screenshot: {width}x{height}")]
    TooSmall { width: u32, height: u32 },

    #[error("Screenshot capture failed: {0}")]
    Capture(String),

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse failure category, used by callers to classify errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The browser or page could not be established or was lost.
    Resource,
    /// The navigated page was unusable.
    Navigation,
    /// A screenshot could not be produced.
    Capture,
}

impl BrowserError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrowserError::Cdp(_) | BrowserError::Launch(_) | BrowserError::PageClosed => {
                ErrorKind::Resource
            }
            BrowserError::TooSmall { .. } | BrowserError::Capture(_) | BrowserError::Image(_) => {
                ErrorKind::Capture
            }
            BrowserError::Io(_) => ErrorKind::Resource,
            _ => ErrorKind::Navigation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(BrowserError::PageClosed.kind(), ErrorKind::Resource);
        assert_eq!(
            BrowserError::HttpStatus {
                status: 404,
                status_text: "Not Found".into()
            }
            .kind(),
            ErrorKind::Navigation
        );
        assert_eq!(
            BrowserError::TooSmall {
                width: 50,
                height: 50
            }
            .kind(),
            ErrorKind::Capture
        );
    }

    #[test]
    fn test_http_status_message() {
        let err = BrowserError::HttpStatus {
            status: 503,
            status_text: "Service Unavailable".into(),
        };
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
    }
}
