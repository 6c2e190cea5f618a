//! Live-reload events and their broadcast hub.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Reload channel capacity; slow clients skip ahead past older events
const RELOAD_CHANNEL_CAPACITY: usize = 64;

/// Message pushed to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadEvent {
    /// Reload the whole page
    Reload,
    /// Swap in the listed stylesheets (paths relative to the site root)
    Css { paths: Vec<String> },
}

impl ReloadEvent {
    /// Wire form sent over the WebSocket.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Fan-out of reload events to every connected client.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadEvent>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(RELOAD_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe a new client.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.sender.subscribe()
    }

    /// Send an event to every client; returns how many received it.
    pub fn publish(&self, event: ReloadEvent) -> usize {
        // no subscribers is not an error while nobody has the page open
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_event_json() {
        assert_eq!(ReloadEvent::Reload.to_json().unwrap(), r#"{"type":"reload"}"#);
        let css = ReloadEvent::Css { paths: vec!["css/main.css".to_string()] };
        assert_eq!(css.to_json().unwrap(), r#"{"type":"css","paths":["css/main.css"]}"#);
    }

    #[test]
    fn test_reload_event_parse() {
        let event: ReloadEvent = serde_json::from_str(r#"{"type":"css","paths":[]}"#).unwrap();
        assert_eq!(event, ReloadEvent::Css { paths: vec![] });
    }

    #[test]
    fn test_publish_without_clients() {
        let hub = ReloadHub::new();
        assert_eq!(hub.client_count(), 0);
        assert_eq!(hub.publish(ReloadEvent::Reload), 0);
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let hub = ReloadHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert_eq!(hub.client_count(), 2);
        assert_eq!(hub.publish(ReloadEvent::Reload), 2);
        assert_eq!(a.recv().await.unwrap(), ReloadEvent::Reload);
        assert_eq!(b.recv().await.unwrap(), ReloadEvent::Reload);
    }
}
