use serde_json::{json, Value};

use crate::webrag::ProgressEvent;

/// One frame of a streamed chat reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Started,
    Progress(ProgressEvent),
    Token(String),
    Error(String),
    Complete,
}

impl ChatEvent {
    pub fn to_json(&self) -> Value {
        match self {
            ChatEvent::Started => json!({"status": "started"}),
            ChatEvent::Progress(event) => json!({
                "status": "progress",
                "stage": event.stage.as_str(),
                "message": event.message,
            }),
            ChatEvent::Token(token) => json!({"token": token}),
            ChatEvent::Error(error) => json!({"status": "error", "error": error}),
            ChatEvent::Complete => json!({"status": "complete"}),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Complete)
    }
}
