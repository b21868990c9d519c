//! Content Extractor - Main entry point for page-to-markdown reduction
//!
//! This handles:
//! - Explicit selector extraction
//! - Main-content container probing in priority order
//! - Fallback to the document body with page chrome stripped
//!
//! All work happens on a parsed copy of the page markup; the live page is
//! never touched.

use scraper::{ElementRef, Html, Selector};

use crate::error::{ContentError, Result};
use crate::markdown::MarkdownSerializer;

/// Likely main-content containers, most specific first.
pub const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=\"main\"]",
    "#content",
    "#main-content",
    "#main",
    ".main-content",
    ".post-content",
    ".article-content",
    ".entry-content",
    ".content",
];

/// Page chrome removed from the body fallback.
pub const CHROME_SELECTORS: &[&str] = &[
    "nav",
    "header",
    "footer",
    "aside",
    "#sidebar",
    ".sidebar",
    ".nav",
    ".navigation",
    ".menu",
    ".ads",
    ".ad",
    ".advertisement",
    "#cookie-notice",
    ".cookie-notice",
    ".cookie-banner",
    "#cookie-consent",
    "[role=\"navigation\"]",
    "[role=\"complementary\"]",
    "[role=\"banner\"]",
    "[role=\"contentinfo\"]",
];

/// Configuration for content extraction
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub main_selectors: Vec<String>,
    pub chrome_selectors: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            main_selectors: MAIN_CONTENT_SELECTORS.iter().map(|s| s.to_string()).collect(),
            chrome_selectors: CHROME_SELECTORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Main content extractor
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor {
    config: ExtractorConfig,
    serializer: MarkdownSerializer,
}

impl ContentExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExtractorConfig) -> Self {
        Self {
            config,
            serializer: MarkdownSerializer::new(),
        }
    }

    /// Pick the markup worth converting.
    ///
    /// With a selector, returns that element's outer HTML (empty when absent).
    /// Otherwise the first matching main-content container wins, falling back
    /// to the body with chrome elements detached.
    pub fn select_html(&self, html: &str, selector: Option<&str>) -> Result<String> {
        let document = Html::parse_document(html);

        if let Some(selector) = selector {
            let selector = parse_selector(selector)?;
            return Ok(document
                .select(&selector)
                .next()
                .map(|el| el.html())
                .unwrap_or_default());
        }

        for candidate in &self.config.main_selectors {
            let selector = parse_selector(candidate)?;
            if let Some(element) = document.select(&selector).next() {
                tracing::debug!("[ContentExtractor] Using main content container {}", candidate);
                return Ok(element.html());
            }
        }

        tracing::debug!("[ContentExtractor] No main container, falling back to body");
        self.stripped_body(document)
    }

    /// Body markup with every chrome element detached from the working copy.
    fn stripped_body(&self, mut document: Html) -> Result<String> {
        let mut doomed = Vec::new();
        for candidate in &self.config.chrome_selectors {
            let selector = parse_selector(candidate)?;
            doomed.extend(document.select(&selector).map(|el| el.id()));
        }

        for id in doomed {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }

        let body = parse_selector("body")?;
        document
            .select(&body)
            .next()
            .map(|el| el.html())
            .ok_or(ContentError::MissingBody)
    }

    /// Extract markdown from a full page.
    pub fn extract_markdown(&self, html: &str, selector: Option<&str>) -> Result<String> {
        let selected = self.select_html(html, selector)?;
        if selected.is_empty() {
            return Ok(String::new());
        }
        self.serializer.convert(&selected)
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| ContentError::InvalidSelector(format!("{selector}: {e}")))
}

/// Page title from the `<title>` element.
pub fn document_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el: ElementRef<'_>| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Whether `selector` matches any element of the document.
pub fn contains_selector(html: &str, selector: &str) -> Result<bool> {
    let selector = parse_selector(selector)?;
    Ok(Html::parse_document(html).select(&selector).next().is_some())
}

/// Convenience wrapper around [`ContentExtractor::extract_markdown`].
pub fn extract_markdown(html: &str, selector: Option<&str>) -> Result<String> {
    ContentExtractor::new().extract_markdown(html, selector)
}
