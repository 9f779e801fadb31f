use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, instrument};

use super::{
    context::{build_context, strip_context, with_context},
    dto::{AssistRequest, AssistResponse, MessageResponse, SessionMessage, SessionSummary},
    runtime::AgentSession,
};
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
};

const SESSION: &str = "session";
const NO_REPLY: &str = "No AI response";

pub fn assistant_routes() -> Router<AppState> {
    Router::new()
        .route("/ai/assist", post(assist))
        .route("/ai/sessions", get(list_sessions))
        .route("/ai/sessions/:id", delete(delete_session))
        .route(
            "/ai/sessions/:id/messages",
            get(session_messages).delete(clear_session_messages),
        )
}

/// Session ids become a path segment upstream; anything else is treated as
/// a session the caller does not own.
fn check_session_id(id: &str) -> AppResult<()> {
    lazy_static! {
        static ref SESSION_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,128}$").unwrap();
    }
    if SESSION_ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(AppError::Denied(SESSION))
    }
}

async fn owned_session(state: &AppState, user_key: &str, id: &str) -> AppResult<AgentSession> {
    check_session_id(id)?;
    state
        .agent
        .get_session(user_key, id)
        .await?
        .ok_or(AppError::Denied(SESSION))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn assist(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<AssistRequest>,
) -> AppResult<Json<AssistResponse>> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::validation("Message must not be empty"));
    }
    let user_key = user.id.to_string();

    let session_id = match payload.session_id.filter(|s| !s.trim().is_empty()) {
        None => {
            state
                .agent
                .create_session(&user_key, None, Value::Null)
                .await?
                .id
        }
        Some(id) => {
            check_session_id(&id)?;
            match state.agent.get_session(&user_key, &id).await? {
                Some(existing) => existing.id,
                None => {
                    state
                        .agent
                        .create_session(&user_key, Some(&id), Value::Null)
                        .await?
                        .id
                }
            }
        }
    };

    let pets = state.pets.list(user.id).await?;
    let context = build_context(&pets, OffsetDateTime::now_utc().date());
    let reply = state
        .agent
        .run(&user_key, &session_id, &with_context(&context, message))
        .await?;

    let response = reply
        .map(|text| strip_context(&text))
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| NO_REPLY.to_string());

    info!(session_id = %session_id, pets = pets.len(), "assistant replied");
    Ok(Json(AssistResponse {
        response,
        session_id,
    }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<SessionSummary>>> {
    let sessions = state.agent.list_sessions(&user.id.to_string()).await?;
    Ok(Json(sessions.into_iter().map(SessionSummary::from).collect()))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn session_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<SessionMessage>>> {
    let session = owned_session(&state, &user.id.to_string(), &id).await?;
    Ok(Json(
        session.events.into_iter().map(SessionMessage::from).collect(),
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let user_key = user.id.to_string();
    owned_session(&state, &user_key, &id).await?;
    state.agent.delete_session(&user_key, &id).await?;
    info!(session_id = %id, "assistant session deleted");
    Ok(Json(MessageResponse {
        message: "Session deleted",
    }))
}

/// Empties a session's history by recreating it under the same id with the
/// same state.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn clear_session_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let user_key = user.id.to_string();
    let session = owned_session(&state, &user_key, &id).await?;
    state.agent.delete_session(&user_key, &id).await?;
    state
        .agent
        .create_session(&user_key, Some(&id), session.state)
        .await?;
    info!(session_id = %id, "assistant session cleared");
    Ok(Json(MessageResponse {
        message: "Session messages cleared",
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::testing::TestClient;

    #[tokio::test]
    async fn assist_injects_context_and_hides_it() {
        let client = TestClient::new();
        let token = client.register("a@x.com").await;
        client
            .post(
                "/pets",
                Some(&token),
                json!({ "name": "Bella", "species": "cat", "birthdate": "2019-01-10", "weight": 4.0 }),
            )
            .await;

        let (status, body) = client
            .post("/ai/assist", Some(&token), json!({ "message": "What should Bella eat?" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        let session_id = body["session_id"].as_str().unwrap().to_string();
        assert_eq!(body["response"], "echo: What should Bella eat?");

        let sent = client.agent.last_prompt().unwrap();
        assert!(sent.contains("Bella: species cat"));
        assert!(sent.ends_with("What should Bella eat?"));

        let (status, messages) = client
            .get(&format!("/ai/sessions/{}/messages", session_id), Some(&token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(messages[0]["author"], "user");
        assert_eq!(messages[0]["content"], "What should Bella eat?");

        let (_, again) = client
            .post(
                "/ai/assist",
                Some(&token),
                json!({ "message": "And how much?", "session_id": session_id }),
            )
            .await;
        assert_eq!(again["session_id"], body["session_id"]);

        let (_, sessions) = client.get("/ai/sessions", Some(&token)).await;
        assert_eq!(sessions.as_array().unwrap().len(), 1);
        assert_eq!(sessions[0]["event_count"], 4);
    }

    #[tokio::test]
    async fn assist_rejects_empty_message_and_handles_silence() {
        let client = TestClient::new();
        let token = client.register("a@x.com").await;

        let (status, _) = client
            .post("/ai/assist", Some(&token), json!({ "message": "   " }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        client.agent.set_silent(true);
        let (status, body) = client
            .post(
                "/ai/assist",
                Some(&token),
                json!({ "message": "hello", "session_id": "chosen-id" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "No AI response");
        assert_eq!(body["session_id"], "chosen-id");
    }

    #[tokio::test]
    async fn malformed_session_ids_are_denied() {
        let client = TestClient::new();
        let token = client.register("a@x.com").await;

        let traversal = "/ai/sessions/..%2F..%2Fvictim%2Fsessions%2Fs1/messages";
        let (status, body) = client.get(traversal, Some(&token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Access denied or session not found");
        let (status, _) = client.send("DELETE", traversal, Some(&token), Value::Null).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = client
            .send("DELETE", "/ai/sessions/a%20b", Some(&token), Value::Null)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = client
            .post(
                "/ai/assist",
                Some(&token),
                json!({ "message": "hi", "session_id": "../other/sessions/x" }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(client.agent.last_prompt().is_none());

        let long = "s".repeat(129);
        let (status, _) = client
            .post("/ai/assist", Some(&token), json!({ "message": "hi", "session_id": long }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn sessions_are_private_and_clearable() {
        let client = TestClient::new();
        let alice = client.register("a@x.com").await;
        let bob = client.register("b@x.com").await;
        let (_, body) = client
            .post("/ai/assist", Some(&alice), json!({ "message": "hi" }))
            .await;
        let sid = body["session_id"].as_str().unwrap().to_string();
        let messages_uri = format!("/ai/sessions/{}/messages", sid);

        let (status, denied) = client.get(&messages_uri, Some(&bob)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(denied["detail"], "Access denied or session not found");
        let (status, _) = client
            .send("DELETE", &format!("/ai/sessions/{}", sid), Some(&bob), Value::Null)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = client
            .send("DELETE", &messages_uri, Some(&alice), Value::Null)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (_, messages) = client.get(&messages_uri, Some(&alice)).await;
        assert!(messages.as_array().unwrap().is_empty());

        let (status, _) = client
            .send("DELETE", &format!("/ai/sessions/{}", sid), Some(&alice), Value::Null)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = client.get(&messages_uri, Some(&alice)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
