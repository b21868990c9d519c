//! Error taxonomy of the research tools

use browser::{BrowserError, ErrorKind};
use content::ContentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    /// Bad input; never retried
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The loaded page was unusable
    #[error("Navigation error: {0}")]
    Navigation(#[source] BrowserError),

    /// Browser or page could not be established
    #[error("Browser unavailable: {0}")]
    Resource(#[source] BrowserError),

    /// Screenshot could not be produced within constraints
    #[error("Screenshot failed: {0}")]
    Capture(#[source] BrowserError),

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Content processing failed: {0}")]
    Content(#[from] ContentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BrowserError> for ToolError {
    fn from(err: BrowserError) -> Self {
        match err.kind() {
            ErrorKind::Resource => ToolError::Resource(err),
            ErrorKind::Navigation => ToolError::Navigation(err),
            ErrorKind::Capture => ToolError::Capture(err),
        }
    }
}

impl ToolError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ToolError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_browser_errors_are_classified() {
        assert!(matches!(
            ToolError::from(BrowserError::PageClosed),
            ToolError::Resource(_)
        ));
        assert!(matches!(
            ToolError::from(BrowserError::BotProtection("x".into())),
            ToolError::Navigation(_)
        ));
        assert!(matches!(
            ToolError::from(BrowserError::NavigationTimeout(Duration::from_secs(1))),
            ToolError::Navigation(_)
        ));
        assert!(matches!(
            ToolError::from(BrowserError::TooSmall {
                width: 10,
                height: 10
            }),
            ToolError::Capture(_)
        ));
    }

    #[test]
    fn test_message_keeps_cause() {
        let err = ToolError::from(BrowserError::HttpStatus {
            status: 503,
            status_text: "Service Unavailable".into(),
        });
        assert_eq!(
            err.to_string(),
            "Navigation error: HTTP 503: Service Unavailable"
        );
    }
}
