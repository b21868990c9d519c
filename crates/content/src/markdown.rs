//! Markdown Serializer - Convert HTML fragments to compact markdown
//!
//! Conversion itself is `htmd`; this module only pins the dialect:
//! - ATX headings, fenced code (language from `language-xxx`), inline links
//! - script, style, noscript and other non-content subtrees skipped
//! - `javascript:` and href-less anchors reduced to their text
//! - figure captions rendered as an italic line under the image
//!
//! Output goes through [`clean_markdown`] before it is returned.

use std::fmt;
use std::sync::Arc;

use htmd::element_handler::{HandlerResult, Handlers};
use htmd::options::{BulletListMarker, CodeBlockStyle, HeadingStyle, LinkStyle, Options};
use htmd::{Element, HtmlToMarkdown};

use crate::error::Result;
use crate::utils::{clean_markdown, collapse_whitespace};

/// Subtrees that never contribute text.
pub const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "head", "iframe", "svg", "canvas", "object",
];

/// HTML to markdown serializer
#[derive(Clone)]
pub struct MarkdownSerializer {
    converter: Arc<HtmlToMarkdown>,
}

impl fmt::Debug for MarkdownSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkdownSerializer").finish_non_exhaustive()
    }
}

impl Default for MarkdownSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownSerializer {
    pub fn new() -> Self {
        let options = Options {
            heading_style: HeadingStyle::Atx,
            code_block_style: CodeBlockStyle::Fenced,
            link_style: LinkStyle::Inlined,
            bullet_list_marker: BulletListMarker::Dash,
            ul_bullet_spacing: 1,
            ol_number_spacing: 1,
            ..Default::default()
        };
        let converter = HtmlToMarkdown::builder()
            .options(options)
            .skip_tags(SKIPPED_TAGS.to_vec())
            .add_handler(vec!["a"], anchor_handler)
            .add_handler(vec!["figcaption"], figcaption_handler)
            .build();
        Self {
            converter: Arc::new(converter),
        }
    }

    /// Convert an HTML fragment (or a full document) to cleaned markdown.
    pub fn convert(&self, html: &str) -> Result<String> {
        let raw = self.converter.convert(html)?;
        Ok(clean_markdown(&raw))
    }
}

/// Links only survive with a real target.
fn anchor_handler(handlers: &dyn Handlers, element: Element) -> Option<HandlerResult> {
    let navigable = element.attrs.iter().any(|attr| {
        let name = &attr.name.local;
        let href = attr.value.trim();
        name == "href" && !href.is_empty() && !href.starts_with("javascript:")
    });
    if navigable {
        handlers.fallback(element)
    } else {
        Some(handlers.walk_children(element.node))
    }
}

fn figcaption_handler(handlers: &dyn Handlers, element: Element) -> Option<HandlerResult> {
    let caption = collapse_whitespace(&handlers.walk_children(element.node).content);
    let caption = caption.trim();
    if caption.is_empty() {
        return Some("".into());
    }
    Some(format!("\n*{caption}*\n\n").into())
}

/// One-shot conversion with the default dialect.
pub fn html_to_markdown(html: &str) -> Result<String> {
    MarkdownSerializer::new().convert(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_script_content_dropped() {
        let md = html_to_markdown("<script>evil()</script><p>Hello</p>").unwrap();
        assert!(md.contains("Hello"));
        assert!(!md.contains("evil"));
    }

    #[test]
    fn test_style_and_noscript_dropped() {
        let md = html_to_markdown(
            "<style>body { color: red }</style><noscript>enable js</noscript><p>Visible</p>",
        )
        .unwrap();
        assert_eq!(md, "Visible");
    }

    #[test]
    fn test_headings_and_paragraphs() {
        let md = html_to_markdown("<h1>Title</h1><p>First para</p><h3>Sub</h3><p>Second</p>").unwrap();
        assert_eq!(md, "# Title\n\nFirst para\n\n### Sub\n\nSecond");
    }

    #[test]
    fn test_links_and_images() {
        let md = html_to_markdown(
            r#"<p>See <a href="https://example.com/docs">the docs</a> and <img src="/a.png" alt="diagram"></p>"#,
        )
        .unwrap();
        assert!(md.contains("[the docs](https://example.com/docs)"));
        assert!(md.contains("![diagram](/a.png)"));
    }

    #[test]
    fn test_link_without_target_keeps_text() {
        let md = html_to_markdown(r#"<p><a>plain</a> and <a href="javascript:void(0)">js</a></p>"#)
            .unwrap();
        assert_eq!(md, "plain and js");
    }

    #[test]
    fn test_fenced_code_with_language() {
        let md = html_to_markdown(
            "<pre><code class=\"language-rust\">fn main() {\n    println!(\"hi\");\n}</code></pre>",
        )
        .unwrap();
        assert_eq!(md, "```rust\nfn main() {\n    println!(\"hi\");\n}\n```");
    }

    #[test]
    fn test_figure_with_caption() {
        let md = html_to_markdown(
            r#"<figure><img src="cat.jpg" alt="A cat"><figcaption>The   cat</figcaption></figure>"#,
        )
        .unwrap();
        assert_eq!(md, "![A cat](cat.jpg)\n*The cat*");
    }

    #[test]
    fn test_lists_drop_empty_items() {
        let md = html_to_markdown("<ul><li>one</li><li></li><li>two</li></ul>").unwrap();
        assert!(md.contains("- one"));
        assert!(md.contains("- two"));
        assert!(!md.lines().any(|line| line.trim() == "-"));
    }

    #[test]
    fn test_blank_line_collapse() {
        let md = html_to_markdown("<div><div><p>a</p></div></div><div></div><div><p>b</p></div>")
            .unwrap();
        assert_eq!(md, "a\n\nb");
    }
}
