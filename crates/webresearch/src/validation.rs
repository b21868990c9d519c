//! Input validation, applied before anything touches the browser

use url::Url;

use crate::error::{Result, ToolError};

/// Parse `raw` and accept only absolute http(s) URLs with a host
pub fn validate_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ToolError::Validation(format!("invalid URL '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ToolError::Validation(format!(
                "unsupported protocol '{scheme}:' (only http and https URLs can be visited)"
            )));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ToolError::Validation(format!("URL '{raw}' has no host")));
    }
    Ok(url)
}

/// Non-empty, trimmed search query
pub fn validate_query(raw: &str) -> Result<&str> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(ToolError::Validation("search query is empty".to_string()));
    }
    Ok(query)
}
