//! Renderer seam.
//!
//! The core never draws anything itself: after every relevant mutation it
//! hands a [`RenderEvent`] to the injected [`Renderer`].

use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RenderEvent {
    /// Sidebar list of conversations changed (created, deleted, renamed, retitled).
    ConversationsChanged,
    #[serde(rename_all = "camelCase")]
    ActiveConversationChanged { conversation_id: String },
    /// Message list of a conversation changed (append, delta, clear).
    #[serde(rename_all = "camelCase")]
    MessagesChanged { conversation_id: String },
    /// Text streamed into the newest assistant message, already stored.
    #[serde(rename_all = "camelCase")]
    MessageDelta { conversation_id: String, delta: String },
    ProjectsChanged,
    #[serde(rename_all = "camelCase")]
    ActiveProjectChanged { project_id: String },
    #[serde(rename_all = "camelCase")]
    FileChanged { project_id: String, path: String },
    #[serde(rename_all = "camelCase")]
    Status { message: String, is_error: bool },
    StreamingChanged { streaming: bool },
}

impl RenderEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
            is_error: true,
        }
    }
}

pub trait Renderer: Send + Sync {
    fn render(&self, event: &RenderEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn render(&self, _event: &RenderEvent) {}
}

/// Keeps every event in order.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<RenderEvent>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn take(&self) -> Vec<RenderEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }

    /// Status lines in the order they were published.
    pub fn statuses(&self) -> Vec<(String, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RenderEvent::Status { message, is_error } => Some((message, is_error)),
                _ => None,
            })
            .collect()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&self, event: &RenderEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
