//! CDP Protocol Types
//!
//! These are the fundamental types for CDP communication.
//! Keep them minimal - add domain-specific types only when needed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request ID - monotonically increasing
pub type RequestId = u64;

/// Target ID from Chrome
pub type TargetId = String;

/// Session ID for attached targets
pub type SessionId = String;

/// CDP Request sent to browser
#[derive(Debug, Clone, Serialize)]
pub struct CDPRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// CDP Response from browser
#[derive(Debug, Clone, Deserialize)]
pub struct CDPResponse {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CDPError>,
}

/// CDP Error
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CDPError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// CDP Event from browser (no request ID)
#[derive(Debug, Clone, Deserialize)]
pub struct CDPEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

impl CDPEvent {
    /// String parameter by key
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.as_ref()?.get(key)?.as_str()
    }
}

/// Unified CDP Message (response or event)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CDPMessage {
    Response(CDPResponse),
    Event(CDPEvent),
}

/// Result of Target.createTarget
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTargetResult {
    #[serde(rename = "targetId")]
    pub target_id: TargetId,
}

/// Result of Target.attachToTarget
#[derive(Debug, Clone, Deserialize)]
pub struct AttachToTargetResult {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
}

/// Result of Page.navigate
#[derive(Debug, Clone, Deserialize)]
pub struct NavigateResult {
    #[serde(rename = "frameId")]
    pub frame_id: String,
    #[serde(rename = "loaderId", default)]
    pub loader_id: Option<String>,
    #[serde(rename = "errorText", default)]
    pub error_text: Option<String>,
}

/// Size in CSS pixels, as reported by Page.getLayoutMetrics
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ContentSize {
    pub width: f64,
    pub height: f64,
}

/// Subset of Page.getLayoutMetrics we care about
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutMetrics {
    #[serde(rename = "cssContentSize")]
    pub css_content_size: ContentSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_dispatch() {
        let response: CDPMessage =
            serde_json::from_str(r#"{"id":7,"result":{"frameId":"F"}}"#).unwrap();
        assert!(matches!(response, CDPMessage::Response(CDPResponse { id: 7, .. })));

        let event: CDPMessage = serde_json::from_str(
            r#"{"method":"Page.lifecycleEvent","params":{"name":"networkIdle"},"sessionId":"S1"}"#,
        )
        .unwrap();
        match event {
            CDPMessage::Event(event) => {
                assert_eq!(event.param_str("name"), Some("networkIdle"));
                assert_eq!(event.session_id.as_deref(), Some("S1"));
            }
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_request_skips_empty_fields() {
        let request = CDPRequest {
            id: 1,
            method: "Browser.getVersion".into(),
            params: None,
            session_id: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"id":1,"method":"Browser.getVersion"}"#
        );
    }

    #[test]
    fn test_navigate_result_with_error() {
        let result: NavigateResult = serde_json::from_str(
            r#"{"frameId":"F","loaderId":"L","errorText":"net::ERR_NAME_NOT_RESOLVED"}"#,
        )
        .unwrap();
        assert_eq!(result.error_text.as_deref(), Some("net::ERR_NAME_NOT_RESOLVED"));
    }
}
