//! Event Bus - Lifecycle events of the browser resources
//!
//! Design: Type-safe events over a tokio broadcast channel.
//! Publishing never blocks and never fails; slow subscribers lag.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Browser lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowserEvent {
    Launched,
    Disconnected,
    PageOpened,
    Released,
    NavigationStarted { url: String },
    NavigationComplete { url: String },
}

/// Simple event bus using tokio broadcast channel
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BrowserEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish an event
    pub fn publish(&self, event: BrowserEvent) {
        let _ = self.tx.send(event); // Ignore error if no subscribers
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<BrowserEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(BrowserEvent::Launched);

        match rx.recv().await {
            Ok(BrowserEvent::Launched) => {}
            _ => panic!("Expected Launched event"),
        }
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.clone().publish(BrowserEvent::NavigationStarted {
            url: "https://example.com".to_string(),
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            BrowserEvent::NavigationStarted {
                url: "https://example.com".to_string()
            }
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        EventBus::default().publish(BrowserEvent::Released);
    }
}
