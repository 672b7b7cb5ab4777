//! Output event stream
//!
//! The engine emits plan summaries and per-node progress as structured
//! events; external handlers render console lines or JSON.

use crate::plan::Action;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    /// Diagnostic detail
    Debug,
    /// Normal progress
    Info,
    /// Something unexpected but survivable
    Warn,
    /// A failure
    Error,
}

/// A structured progress event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployEvent {
    /// When the event occurred
    pub time: DateTime<Utc>,
    /// Severity
    pub level: EventLevel,
    /// Component the event concerns, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Resource node id the event concerns, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Plan action being executed, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Human readable message
    pub message: String,
    /// Percent complete for the overall run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    /// Free-form annotations
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, String>,
}

impl DeployEvent {
    /// Create an event with the current timestamp
    pub fn new(level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            level,
            component: None,
            resource: None,
            action: None,
            message: message.into(),
            progress: None,
            metadata: IndexMap::new(),
        }
    }

    /// Attach a node's identity to the event
    pub fn for_resource(mut self, component: &str, resource: &str, action: Action) -> Self {
        self.component = Some(component.to_string());
        self.resource = Some(resource.to_string());
        self.action = Some(action);
        self
    }

    /// Attach overall progress
    pub fn with_progress(mut self, progress: u32) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Handle the engine emits events through
///
/// Sends are best-effort; a disabled sender drops everything, and a
/// disconnected receiver never blocks the run.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Option<async_channel::Sender<DeployEvent>>,
}

impl EventSender {
    /// Create a sender/receiver pair on an unbounded channel
    pub fn channel() -> (Self, async_channel::Receiver<DeployEvent>) {
        let (tx, rx) = async_channel::unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that drops every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event
    pub fn emit(&self, event: DeployEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }

    /// Emit an info-level message
    pub fn info(&self, message: impl Into<String>) {
        self.emit(DeployEvent::new(EventLevel::Info, message));
    }

    /// Emit an error-level message
    pub fn error(&self, message: impl Into<String>) {
        self.emit(DeployEvent::new(EventLevel::Error, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_stable_names() {
        let event = DeployEvent::new(EventLevel::Info, "applying")
            .for_resource("app", "app/database/main", Action::Create)
            .with_progress(50);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["level"], "info");
        assert_eq!(json["component"], "app");
        assert_eq!(json["resource"], "app/database/main");
        assert_eq!(json["action"], "create");
        assert_eq!(json["progress"], 50);
        assert!(json.get("time").is_some());
    }

    #[test]
    fn test_disabled_sender_drops_silently() {
        let sender = EventSender::disabled();
        sender.info("nobody listening");
    }

    #[test]
    fn test_channel_delivers() {
        let (sender, rx) = EventSender::channel();
        sender.info("one");
        sender.error("two");

        assert_eq!(rx.len(), 2);
        let first = rx.try_recv().unwrap();
        assert_eq!(first.level, EventLevel::Info);
    }
}
