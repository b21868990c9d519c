//! CDP Session - Represents a connection to a specific browser target
//!
//! Design: Lightweight wrapper around CDPClient with target-specific context.
//! All sessions share the same WebSocket - no per-session connection overhead.

use super::client::{CDPClient, CDPError, Result};
use super::protocol::{AttachToTargetResult, CDPEvent, SessionId, TargetId};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Domains enabled on every attached page. `Inspector` carries the detach
/// and crash events a page watches for.
pub const DEFAULT_DOMAINS: &[&str] = &["Page", "Network", "Runtime", "DOM", "Inspector"];

/// CDP Session bound to a specific target
#[derive(Clone)]
pub struct CDPSession {
    /// Shared CDP client
    client: Arc<CDPClient>,

    /// Target this session is attached to
    pub target_id: TargetId,

    /// Session ID assigned by Chrome
    pub session_id: SessionId,
}

impl CDPSession {
    /// Attach to a target and create session
    pub async fn attach(
        client: Arc<CDPClient>,
        target_id: TargetId,
        domains: Option<Vec<&str>>,
    ) -> Result<Self> {
        // Attach to target
        let result = client
            .send_request(
                "Target.attachToTarget",
                Some(json!({
                    "targetId": target_id,
                    "flatten": true,
                })),
                None,
            )
            .await?;

        let attach_result: AttachToTargetResult = serde_json::from_value(result)?;
        let session_id = attach_result.session_id;

        let domains = domains.unwrap_or_else(|| DEFAULT_DOMAINS.to_vec());

        // Enable all domains in parallel
        let enable_futures: Vec<_> = domains
            .into_iter()
            .map(|domain| {
                let client = client.clone();
                let session_id = session_id.clone();
                async move {
                    client
                        .send_request(format!("{}.enable", domain), None, Some(session_id))
                        .await
                }
            })
            .collect();

        // Wait for all enables (ignore individual failures)
        let results = futures_util::future::join_all(enable_futures).await;
        let failures = results.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            tracing::warn!(
                "[CDPSession] Some domain enables failed: {}/{}",
                failures,
                results.len()
            );
        }

        Ok(Self {
            client,
            target_id,
            session_id,
        })
    }

    /// Send command within this session's context
    pub async fn send(&self, method: impl Into<String>, params: Option<Value>) -> Result<Value> {
        self.client
            .send_request(method, params, Some(self.session_id.clone()))
            .await
    }

    /// Shared client
    pub fn client(&self) -> &Arc<CDPClient> {
        &self.client
    }

    /// Receive every event from now on; filter with [`CDPSession::owns`]
    pub fn events(&self) -> broadcast::Receiver<CDPEvent> {
        self.client.events()
    }

    /// Whether an event was emitted for this session
    pub fn owns(&self, event: &CDPEvent) -> bool {
        event.session_id.as_deref() == Some(self.session_id.as_str())
    }

    /// Evaluate JavaScript and return its JSON value
    pub async fn evaluate(&self, expression: impl Into<String>) -> Result<Value> {
        let result = self
            .send(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression.into(),
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("unknown exception")
                .to_string();
            return Err(CDPError::Protocol {
                code: -1,
                message,
            });
        }

        Ok(result["result"]["value"].clone())
    }

    /// Close the target this session is attached to
    pub async fn close_target(&self) -> Result<()> {
        self.client
            .send_request(
                "Target.closeTarget",
                Some(json!({ "targetId": &self.target_id })),
                None,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_domains_include_lifecycle_events() {
        for domain in ["Page", "Inspector"] {
            assert!(DEFAULT_DOMAINS.contains(&domain), "{domain} not enabled");
        }
    }
}
