//! Content-quality snapshot
//!
//! The snapshot is the plain-data result of inspecting a loaded page: whether
//! a bot-challenge marker is present, how many visible words the body
//! carries, and the document title. Live pages compute it in-browser; this
//! module computes the same snapshot from static markup.

use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};

use crate::utils::word_count;

/// Plain-data page snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySnapshot {
    pub has_challenge: bool,
    pub word_count: usize,
    pub title: String,
}

/// Tags whose text is never rendered.
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Snapshot of static markup. Selectors that fail to parse are ignored.
pub fn snapshot_html(html: &str, challenge_selectors: &[&str]) -> QualitySnapshot {
    let document = Html::parse_document(html);

    let has_challenge = challenge_selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .any(|sel| document.select(&sel).next().is_some());

    let word_count = Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|body| {
            let mut text = String::new();
            visible_text(body, &mut text);
            word_count(&text)
        })
        .unwrap_or(0);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    QualitySnapshot {
        has_challenge,
        word_count,
        title,
    }
}

fn visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(el) if !INVISIBLE_TAGS.contains(&el.name()) => {
                if let Some(child_ref) = ElementRef::wrap(child) {
                    visible_text(child_ref, out);
                }
            }
            _ => {}
        }
    }
}
