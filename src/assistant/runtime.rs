use anyhow::Context;
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::AgentConfig;

/// A conversation held by the agent runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSession {
    pub id: String,
    pub state: Value,
    pub create_time: Option<f64>,
    pub update_time: Option<f64>,
    pub events: Vec<AgentEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentEvent {
    pub id: String,
    pub author: Option<String>,
    pub text: Option<String>,
    pub timestamp: Option<f64>,
}

/// Hosted agent runtime. Sessions are namespaced by `user_id`; a session id
/// is only visible to the user it was created for.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Create a session, under `session_id` when given.
    async fn create_session(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        state: Value,
    ) -> anyhow::Result<AgentSession>;
    async fn get_session(&self, user_id: &str, session_id: &str)
        -> anyhow::Result<Option<AgentSession>>;
    async fn list_sessions(&self, user_id: &str) -> anyhow::Result<Vec<AgentSession>>;
    async fn delete_session(&self, user_id: &str, session_id: &str) -> anyhow::Result<()>;
    /// Send one user message and return the final reply text, if any.
    async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> anyhow::Result<Option<String>>;
}

/// Client for an agent API server (`/apps/{app}/users/{user}/sessions`, `/run`).
#[derive(Clone)]
pub struct AdkClient {
    http: reqwest::Client,
    base_url: Url,
    app_name: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSession {
    id: String,
    #[serde(default)]
    state: Value,
    #[serde(default)]
    create_time: Option<f64>,
    #[serde(default)]
    last_update_time: Option<f64>,
    #[serde(default)]
    events: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(default)]
    id: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    partial: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest<'a> {
    app_name: &'a str,
    user_id: &'a str,
    session_id: &'a str,
    new_message: WireContent,
}

impl WireContent {
    fn text(&self) -> Option<String> {
        let joined: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if joined.is_empty() {
            None
        } else {
            Some(joined.join(""))
        }
    }
}

impl From<WireEvent> for AgentEvent {
    fn from(e: WireEvent) -> Self {
        Self {
            id: e.id,
            author: e.author,
            text: e.content.as_ref().and_then(WireContent::text),
            timestamp: e.timestamp,
        }
    }
}

impl From<WireSession> for AgentSession {
    fn from(s: WireSession) -> Self {
        Self {
            id: s.id,
            state: s.state,
            create_time: s.create_time,
            update_time: s.last_update_time,
            events: s.events.into_iter().map(AgentEvent::from).collect(),
        }
    }
}

/// Text of the last complete, non-user event carrying any text.
fn final_reply(events: Vec<WireEvent>) -> Option<String> {
    events
        .into_iter()
        .rev()
        .filter(|e| e.partial != Some(true))
        .filter(|e| e.author.as_deref() != Some("user"))
        .find_map(|e| e.content.as_ref().and_then(WireContent::text))
}

impl AdkClient {
    pub fn new(http: reqwest::Client, config: &AgentConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url).context("parse agent base url")?;
        anyhow::ensure!(!base_url.cannot_be_a_base(), "agent base url has no path");
        Ok(Self {
            http,
            base_url,
            app_name: config.app_name.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Base url plus `segments`, each percent-encoded as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("agent base url has no path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn sessions_url(&self, user_id: &str) -> anyhow::Result<Url> {
        self.endpoint(&["apps", self.app_name.as_str(), "users", user_id, "sessions"])
    }

    fn session_url(&self, user_id: &str, session_id: &str) -> anyhow::Result<Url> {
        self.endpoint(&[
            "apps",
            self.app_name.as_str(),
            "users",
            user_id,
            "sessions",
            session_id,
        ])
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

#[async_trait]
impl AgentRuntime for AdkClient {
    async fn create_session(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        state: Value,
    ) -> anyhow::Result<AgentSession> {
        let url = match session_id {
            Some(id) => self.session_url(user_id, id)?,
            None => self.sessions_url(user_id)?,
        };
        let body = if state.is_null() { json!({}) } else { state };
        let session: WireSession = self
            .authorized(self.http.post(url))
            .json(&body)
            .send()
            .await
            .context("agent create session")?
            .error_for_status()
            .context("agent create session status")?
            .json()
            .await
            .context("decode agent session")?;
        debug!(user_id, session_id = %session.id, "agent session created");
        Ok(session.into())
    }

    async fn get_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> anyhow::Result<Option<AgentSession>> {
        let res = self
            .authorized(self.http.get(self.session_url(user_id, session_id)?))
            .send()
            .await
            .context("agent get session")?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let session: WireSession = res
            .error_for_status()
            .context("agent get session status")?
            .json()
            .await
            .context("decode agent session")?;
        Ok(Some(session.into()))
    }

    async fn list_sessions(&self, user_id: &str) -> anyhow::Result<Vec<AgentSession>> {
        let sessions: Vec<WireSession> = self
            .authorized(self.http.get(self.sessions_url(user_id)?))
            .send()
            .await
            .context("agent list sessions")?
            .error_for_status()
            .context("agent list sessions status")?
            .json()
            .await
            .context("decode agent sessions")?;
        Ok(sessions.into_iter().map(AgentSession::from).collect())
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> anyhow::Result<()> {
        let res = self
            .authorized(self.http.delete(self.session_url(user_id, session_id)?))
            .send()
            .await
            .context("agent delete session")?;
        if res.status() == StatusCode::NOT_FOUND {
            warn!(user_id, session_id, "agent session already gone");
            return Ok(());
        }
        res.error_for_status()
            .context("agent delete session status")?;
        Ok(())
    }

    async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> anyhow::Result<Option<String>> {
        let req = RunRequest {
            app_name: &self.app_name,
            user_id,
            session_id,
            new_message: WireContent {
                role: Some("user".into()),
                parts: vec![WirePart {
                    text: Some(message.to_string()),
                }],
            },
        };
        let events: Vec<WireEvent> = self
            .authorized(self.http.post(self.endpoint(&["run"])?))
            .json(&req)
            .send()
            .await
            .context("agent run")?
            .error_for_status()
            .context("agent run status")?
            .json()
            .await
            .context("decode agent events")?;
        debug!(user_id, session_id, events = events.len(), "agent run finished");
        Ok(final_reply(events))
    }
}
