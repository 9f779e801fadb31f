use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    context::strip_context,
    runtime::{AgentEvent, AgentSession},
};

#[derive(Debug, Deserialize)]
pub struct AssistRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssistResponse {
    pub response: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub state: Value,
    pub create_time: Option<f64>,
    pub update_time: Option<f64>,
    pub event_count: usize,
}

impl From<AgentSession> for SessionSummary {
    fn from(s: AgentSession) -> Self {
        Self {
            event_count: s.events.len(),
            id: s.id,
            state: s.state,
            create_time: s.create_time,
            update_time: s.update_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionMessage {
    pub id: String,
    pub author: Option<String>,
    pub content: Option<String>,
    pub timestamp: Option<f64>,
}

impl From<AgentEvent> for SessionMessage {
    fn from(e: AgentEvent) -> Self {
        let content = match e.author.as_deref() {
            Some("user") => e.text.as_deref().map(strip_context),
            _ => e.text,
        };
        Self {
            id: e.id,
            author: e.author,
            content,
            timestamp: e.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
