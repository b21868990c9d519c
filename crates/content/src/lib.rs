//! Page Content Processing Library
//!
//! Turns raw page markup into bounded, LLM-friendly markdown.
//!
//! ## Pipeline
//!
//! ```text
//! page HTML → ContentExtractor (main container | stripped body)
//!           → MarkdownSerializer (htmd) → clean_markdown → truncate_content
//! ```
//!
//! Everything here is pure: input is markup, output is plain data. The
//! browser crate is the only component that knows how markup is obtained.

pub mod error;
pub mod extract;
pub mod markdown;
pub mod quality;
pub mod search;
pub mod utils;

pub use error::{ContentError, Result};
pub use extract::{
    contains_selector, document_title, extract_markdown, ContentExtractor, ExtractorConfig,
};
pub use markdown::{html_to_markdown, MarkdownSerializer};
pub use quality::{snapshot_html, QualitySnapshot};
pub use search::{parse_search_results, SearchLayout, SearchResult};
pub use utils::{truncate_content, TRUNCATION_MARKER};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_to_bounded_markdown() {
        let body = "word ".repeat(50);
        let html = format!("<html><body><article><h2>Heading</h2><p>{body}</p></article></body></html>");
        let md = extract_markdown(&html, None).unwrap();
        assert!(md.starts_with("## Heading"));

        let capped = truncate_content(&md, 20);
        assert!(capped.ends_with(TRUNCATION_MARKER));
        assert_eq!(capped.chars().count(), 20 + TRUNCATION_MARKER.chars().count());
    }
}
