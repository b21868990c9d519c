//! Text post-processing shared by the markdown pipeline

/// Marker appended when content is cut at the length cap.
pub const TRUNCATION_MARKER: &str = "\n\n... (content truncated)";

/// Cap content at `max_chars` characters, appending [`TRUNCATION_MARKER`]
/// when anything was dropped. Counts chars, so multi-byte text never splits.
pub fn truncate_content(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&text[..cut]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
    }
}

/// Normalize converter output:
/// - whitespace-only lines become empty
/// - list items left without text are dropped
/// - runs of blank lines collapse to a single blank line
/// - leading/trailing whitespace is trimmed
pub fn clean_markdown(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut blank_run = 0usize;

    for line in markdown.lines() {
        let line = line.trim_end();

        if is_empty_list_item(line) {
            continue;
        }

        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }

        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}

fn is_empty_list_item(line: &str) -> bool {
    let trimmed = line.trim();
    if matches!(trimmed, "-" | "*" | "+") {
        return true;
    }
    // "1." / "12." with nothing after
    trimmed.len() > 1
        && trimmed.ends_with('.')
        && trimmed[..trimmed.len() - 1].chars().all(|c| c.is_ascii_digit())
}

/// Collapse every whitespace run to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Number of whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_truncate_content() {
        assert_eq!(truncate_content("hello", 10), "hello");
        assert_eq!(truncate_content("hello", 5), "hello");
        assert_eq!(
            truncate_content("hello world", 5),
            format!("hello{}", TRUNCATION_MARKER)
        );
    }

    #[test]
    fn test_truncate_content_multibyte() {
        let text = "ééééé";
        assert_eq!(truncate_content(text, 2), format!("éé{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_clean_markdown_collapses_blank_runs() {
        let raw = "# Title\n\n\n\n\nBody\n   \n\t\nMore\n";
        assert_eq!(clean_markdown(raw), "# Title\n\nBody\n\nMore");
    }

    #[test]
    fn test_clean_markdown_drops_empty_list_items() {
        let raw = "- one\n- \n-\n1.\n2. two\n";
        assert_eq!(clean_markdown(raw), "- one\n2. two");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("a \n\t b  c"), "a b c");
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\nthree\t four "), 4);
        assert_eq!(word_count(""), 0);
    }
}
