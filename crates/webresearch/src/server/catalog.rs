//! Static metadata: tools, prompts and resource URIs

use rmcp::model::{
    AnnotateAble, GetPromptResult, JsonObject, Prompt, PromptArgument, PromptMessage,
    PromptMessageRole, RawResource, Resource, Tool,
};
use rmcp::ErrorData as McpError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const SEARCH_TOOL: &str = "search_google";
pub const VISIT_TOOL: &str = "visit_page";
pub const SCREENSHOT_TOOL: &str = "take_screenshot";

pub const SUMMARY_URI: &str = "research://current/summary";
pub const SCREENSHOT_URI_PREFIX: &str = "research://screenshots/";

pub const RESEARCH_PROMPT: &str = "agentic-research";

#[derive(Debug, Deserialize)]
pub struct SearchArgs {
    pub query: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitPageArgs {
    pub url: String,
    #[serde(default = "default_true")]
    pub take_screenshot: bool,
}

fn schema(value: Value) -> Arc<JsonObject> {
    match value {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(JsonObject::new()),
    }
}

pub fn tools() -> Vec<Tool> {
    vec![
        Tool::new(
            SEARCH_TOOL,
            "Search Google for a query and return the result titles, URLs and snippets",
            schema(json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" }
                },
                "required": ["query"]
            })),
        ),
        Tool::new(
            VISIT_TOOL,
            "Visit a web page and return its main content as markdown, optionally with a screenshot",
            schema(json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "http(s) URL to visit" },
                    "takeScreenshot": {
                        "type": "boolean",
                        "description": "Capture a screenshot of the page",
                        "default": true
                    }
                },
                "required": ["url"]
            })),
        ),
        Tool::new(
            SCREENSHOT_TOOL,
            "Take a screenshot of the page currently loaded in the browser",
            schema(json!({ "type": "object", "properties": {} })),
        ),
    ]
}

pub fn screenshot_uri(index: usize) -> String {
    format!("{SCREENSHOT_URI_PREFIX}{index}")
}

/// Index named by a screenshot URI
pub fn parse_screenshot_uri(uri: &str) -> Option<Result<usize, McpError>> {
    let raw = uri.strip_prefix(SCREENSHOT_URI_PREFIX)?;
    Some(raw.parse::<usize>().map_err(|_| {
        McpError::invalid_params(format!("invalid screenshot index '{raw}'"), None)
    }))
}

/// Summary resource plus one entry per stored screenshot
pub fn resources(screenshot_indices: &[usize]) -> Vec<Resource> {
    let summary = RawResource {
        description: Some(
            "Query, result count and the visited results of the current session".to_string(),
        ),
        mime_type: Some("application/json".to_string()),
        ..RawResource::new(SUMMARY_URI, "Current research session summary")
    };
    let mut resources = vec![summary.no_annotation()];
    resources.extend(screenshot_indices.iter().map(|&index| {
        RawResource {
            mime_type: Some("image/png".to_string()),
            ..RawResource::new(screenshot_uri(index), format!("Screenshot of result {index}"))
        }
        .no_annotation()
    }));
    resources
}

pub fn prompts() -> Vec<Prompt> {
    vec![Prompt::new(
        RESEARCH_PROMPT,
        Some("Guide a thorough, source-backed web research session on a topic"),
        Some(vec![PromptArgument {
            name: "topic".to_string(),
            title: None,
            description: Some("What to research".to_string()),
            required: Some(true),
        }]),
    )]
}

pub fn get_prompt(name: &str, arguments: Option<&JsonObject>) -> Result<GetPromptResult, McpError> {
    if name != RESEARCH_PROMPT {
        return Err(McpError::invalid_params(format!("unknown prompt '{name}'"), None));
    }
    let topic = arguments
        .and_then(|args| args.get("topic"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| McpError::invalid_params("missing required argument 'topic'", None))?;

    let text = format!(
        "Research the following topic thoroughly: {topic}\n\n\
         Work iteratively:\n\
         1. Use {SEARCH_TOOL} to find candidate sources, refining the query as you learn.\n\
         2. Use {VISIT_TOOL} on the most relevant results and read their content.\n\
         3. Prefer primary and recent sources; cross-check claims across at least two of them.\n\
         4. Use {SCREENSHOT_TOOL} when visual context matters.\n\
         5. Review {SUMMARY_URI} to see what has been collected so far.\n\n\
         Finish with a structured summary that cites the URL of every source you rely on."
    );

    Ok(GetPromptResult {
        description: Some(format!("Research session on {topic}")),
        messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::PromptMessageContent;

    #[test]
    fn test_tool_names() {
        let names: Vec<_> = tools().iter().map(|t| t.name.to_string()).collect();
        assert_eq!(names, vec![SEARCH_TOOL, VISIT_TOOL, SCREENSHOT_TOOL]);
    }

    #[test]
    fn test_visit_args_default_screenshot() {
        let args: VisitPageArgs = serde_json::from_value(json!({"url": "https://a.b"})).unwrap();
        assert!(args.take_screenshot);
        let args: VisitPageArgs =
            serde_json::from_value(json!({"url": "https://a.b", "takeScreenshot": false})).unwrap();
        assert!(!args.take_screenshot);
    }

    #[test]
    fn test_screenshot_uri_round_trip() {
        assert_eq!(screenshot_uri(3), "research://screenshots/3");
        assert_eq!(parse_screenshot_uri("research://screenshots/3"), Some(Ok(3)));
        assert!(matches!(
            parse_screenshot_uri("research://screenshots/x"),
            Some(Err(_))
        ));
        assert_eq!(parse_screenshot_uri(SUMMARY_URI), None);
    }

    #[test]
    fn test_resources_list_screenshots() {
        let uris: Vec<_> = resources(&[0, 2]).iter().map(|r| r.raw.uri.clone()).collect();
        assert_eq!(
            uris,
            vec![SUMMARY_URI, "research://screenshots/0", "research://screenshots/2"]
        );
    }

    #[test]
    fn test_prompt_requires_topic() {
        let mut args = JsonObject::new();
        assert!(get_prompt(RESEARCH_PROMPT, None).is_err());
        assert!(get_prompt(RESEARCH_PROMPT, Some(&args)).is_err());

        args.insert("topic".to_string(), json!("quantum batteries"));
        let prompt = get_prompt(RESEARCH_PROMPT, Some(&args)).unwrap();
        let PromptMessageContent::Text { text } = &prompt.messages[0].content else {
            panic!("expected a text message");
        };
        assert!(text.contains("quantum batteries"));

        assert!(get_prompt("other", Some(&args)).is_err());
    }
}
