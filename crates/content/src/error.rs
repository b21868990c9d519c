//! Error types for content extraction
//!
//! Simple, flat error hierarchy. No over-engineering.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContentError>;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),

    #[error("Document has no <body> element")]
    MissingBody,

    #[error("Markdown conversion failed: {0}")]
    Conversion(#[from] std::io::Error),
}
