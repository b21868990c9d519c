//! Search results page parsing

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ContentError, Result};
use crate::utils::collapse_whitespace;

/// One organic result from a search results page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Selectors describing a results page layout
#[derive(Debug, Clone)]
pub struct SearchLayout {
    pub result: String,
    pub title: String,
    pub link: String,
    pub snippet: String,
}

impl Default for SearchLayout {
    fn default() -> Self {
        Self {
            result: "div.g".to_string(),
            title: "h3".to_string(),
            link: "a[href]".to_string(),
            snippet: "div.VwiC3b, div[data-sncf], div.IsZvec, span.aCOpRe".to_string(),
        }
    }
}

/// Parse organic results out of a results page.
///
/// Entries without a title or an http(s) target are skipped. Redirect links
/// of the form `/url?q=<target>` are unwrapped.
pub fn parse_search_results(html: &str, layout: &SearchLayout) -> Result<Vec<SearchResult>> {
    let result_sel = parse_selector(&layout.result)?;
    let title_sel = parse_selector(&layout.title)?;
    let link_sel = parse_selector(&layout.link)?;
    let snippet_sel = parse_selector(&layout.snippet)?;

    let document = Html::parse_document(html);
    let mut results = Vec::new();

    for entry in document.select(&result_sel) {
        let Some(title) = first_text(entry, &title_sel) else {
            continue;
        };
        let Some(url) = entry
            .select(&link_sel)
            .filter_map(|a| a.value().attr("href"))
            .find_map(resolve_result_url)
        else {
            continue;
        };
        let snippet = first_text(entry, &snippet_sel).unwrap_or_default();

        if results.iter().any(|r: &SearchResult| r.url == url) {
            continue;
        }
        results.push(SearchResult {
            title,
            url,
            snippet,
        });
    }

    Ok(results)
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()).trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Absolute http(s) target for a result link.
fn resolve_result_url(href: &str) -> Option<String> {
    if href.starts_with("/url?") {
        let wrapped = Url::parse(&format!("https://www.google.com{href}")).ok()?;
        let target = wrapped
            .query_pairs()
            .find(|(k, _)| k == "q" || k == "url")
            .map(|(_, v)| v.into_owned())?;
        return resolve_result_url(&target);
    }

    let parsed = Url::parse(href).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| ContentError::InvalidSelector(format!("{selector}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RESULTS: &str = r#"<html><body><div id="search">
      <div class="g">
        <a href="https://www.rust-lang.org/"><h3>Rust Programming Language</h3></a>
        <div class="VwiC3b">A language empowering   everyone.</div>
      </div>
      <div class="g">
        <a href="/url?q=https://doc.rust-lang.org/book/&amp;sa=U"><h3>The Book</h3></a>
        <div class="VwiC3b">Learn Rust.</div>
      </div>
      <div class="g"><a href="/search?q=related"><h3>Related searches</h3></a></div>
      <div class="g"><a href="https://no-title.example/"></a></div>
      <div class="g">
        <a href="https://www.rust-lang.org/"><h3>Duplicate</h3></a>
      </div>
    </div></body></html>"#;

    #[test]
    fn test_parse_results() {
        let results = parse_search_results(RESULTS, &SearchLayout::default()).unwrap();
        assert_eq!(
            results,
            vec![
                SearchResult {
                    title: "Rust Programming Language".to_string(),
                    url: "https://www.rust-lang.org/".to_string(),
                    snippet: "A language empowering everyone.".to_string(),
                },
                SearchResult {
                    title: "The Book".to_string(),
                    url: "https://doc.rust-lang.org/book/".to_string(),
                    snippet: "Learn Rust.".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_empty_page() {
        let results = parse_search_results("<html><body></body></html>", &SearchLayout::default())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_resolve_result_url() {
        assert_eq!(resolve_result_url("javascript:void(0)"), None);
        assert_eq!(resolve_result_url("ftp://example.com/file"), None);
        assert_eq!(
            resolve_result_url("/url?q=http://example.com/a%20b&sa=U").as_deref(),
            Some("http://example.com/a%20b")
        );
    }
}
