//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `GET  /v1/tools`       : The tool catalog and what this deployment allows
//! - `GET  /v1/chats`       : List the caller's chats
//! - `POST /v1/chats`       : Create a chat from a first message
//! - `GET  /v1/chats/{id}`  : One chat with its messages
//! - `POST /v1/chats/{id}`  : Run a turn, streamed as SSE
//!
//! The caller is identified by the `x-user-id` header. An optional
//! `x-github-token` header carries the caller's own GitHub token.

use axum::{
    Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use repolens_agent::{AgentStreamEvent, Caller, TurnError, TurnHandle, TurnRequest};
use repolens_core::error::StoreError;
use repolens_core::message::{Conversation, ConversationId, ConversationSummary, Message};
use repolens_core::tool::ToolName;

use crate::SharedState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const GITHUB_TOKEN_HEADER: &str = "x-github-token";

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/tools", get(list_tools_handler))
        .route(
            "/chats",
            get(list_chats_handler).post(create_chat_handler),
        )
        .route(
            "/chats/{id}",
            get(get_chat_handler).post(chat_turn_handler),
        )
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing x-user-id header")]
    Unauthorized,

    #[error(transparent)]
    Turn(#[from] TurnError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Turn(TurnError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Turn(TurnError::Validation(_)) => (StatusCode::BAD_REQUEST, "validation"),
            ApiError::Turn(TurnError::Configuration(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration")
            }
            // Only reachable for callers that await the turn task.
            ApiError::Turn(TurnError::Model(_)) => (StatusCode::BAD_GATEWAY, "model"),
            ApiError::Turn(TurnError::Persistence(_)) | ApiError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            warn!(error = %self, kind, "v1 request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                kind: kind.to_string(),
            }),
        )
            .into_response()
    }
}

// ── Caller ────────────────────────────────────────────────────────────────

/// The caller, taken from request headers.
pub struct SessionCaller(pub Caller);

impl<S> FromRequestParts<S> for SessionCaller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let user_id = header(USER_ID_HEADER).ok_or(ApiError::Unauthorized)?;
        Ok(SessionCaller(Caller {
            user_id,
            username: header(USER_NAME_HEADER),
            github_token: header(GITHUB_TOKEN_HEADER),
        }))
    }
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateChatRequest {
    message: String,
}

#[derive(Deserialize)]
struct TurnPayload {
    #[serde(default)]
    model: Option<String>,
    messages: Vec<Message>,
}

#[derive(Serialize, Deserialize)]
pub struct ChatListResponse {
    pub chats: Vec<ConversationSummary>,
}

#[derive(Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDto>,
    pub count: usize,
}

#[derive(Serialize, Deserialize)]
pub struct ToolDto {
    pub name: String,
    pub description: String,
    pub write: bool,
    pub requires_approval: bool,
    pub enabled: bool,
    pub parameters: serde_json::Value,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let allow = state.config.tools.selection.allow_list();
    let policy = &state.config.tools.require_approval;

    let tools: Vec<ToolDto> = ToolName::ALL
        .into_iter()
        .map(|name| {
            let tool = state.catalog.get(name);
            ToolDto {
                name: name.as_str().to_string(),
                description: tool.description().to_string(),
                write: name.is_write(),
                requires_approval: policy.needs_approval(name),
                enabled: allow
                    .as_ref()
                    .is_none_or(|names| names.iter().any(|n| n == name.as_str())),
                parameters: tool.parameters_schema(),
            }
        })
        .collect();

    Json(ToolListResponse {
        count: tools.len(),
        tools,
    })
}

async fn list_chats_handler(
    State(state): State<SharedState>,
    SessionCaller(caller): SessionCaller,
) -> Result<Json<ChatListResponse>, ApiError> {
    let chats = state.turns.store().list_conversations(&caller.user_id).await?;
    Ok(Json(ChatListResponse { chats }))
}

async fn create_chat_handler(
    State(state): State<SharedState>,
    SessionCaller(caller): SessionCaller,
    Json(payload): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let conversation = state
        .turns
        .create_chat(&caller.user_id, &payload.message)
        .await?;
    info!(conversation_id = %conversation.id, user_id = %caller.user_id, "Chat created");
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn get_chat_handler(
    State(state): State<SharedState>,
    SessionCaller(caller): SessionCaller,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = state
        .turns
        .store()
        .find_conversation(&ConversationId::from(&id), &caller.user_id)
        .await?
        .ok_or(TurnError::NotFound(id))?;
    Ok(Json(conversation))
}

/// `POST /v1/chats/{id}`: run one turn and stream its events.
///
/// Each SSE event is named after the event's `type`. The turn keeps running
/// (and persists) if the client disconnects. Errors returned here are the
/// ones found before the stream opens; model failures always arrive as an
/// `error` event of kind `model`.
async fn chat_turn_handler(
    State(state): State<SharedState>,
    SessionCaller(caller): SessionCaller,
    Path(id): Path<String>,
    Json(payload): Json<TurnPayload>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    info!(
        conversation_id = %id,
        user_id = %caller.user_id,
        messages = payload.messages.len(),
        "v1/chats turn request"
    );

    let TurnHandle { events, .. } = state
        .turns
        .start(TurnRequest {
            conversation_id: ConversationId::from(&id),
            caller,
            messages: payload.messages,
            model: payload.model,
        })
        .await?;

    let stream = ReceiverStream::new(events).map(|event: AgentStreamEvent| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GatewayState, github_tool_factory};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use repolens_config::AppConfig;
    use repolens_core::error::ProviderError;
    use repolens_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
    use repolens_core::tool::Preset;
    use repolens_store::InMemoryStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Lightweight mock provider for gateway tests.
    struct MockProvider {
        response_text: String,
        fail: bool,
    }

    impl MockProvider {
        fn new(text: &str) -> Self {
            Self {
                response_text: text.to_string(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                response_text: String::new(),
                fail: true,
            }
        }
    }

    #[async_trait::async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "gateway_mock"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            if self.fail {
                return Err(ProviderError::ApiError {
                    status_code: 503,
                    message: "model overloaded".into(),
                });
            }
            Ok(ProviderResponse {
                text: self.response_text.clone(),
                tool_calls: vec![],
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: "mock-model".into(),
            })
        }
    }

    fn test_state_with(config: AppConfig) -> SharedState {
        state_with_provider(config, MockProvider::new("Mock response"))
    }

    fn state_with_provider(config: AppConfig, provider: MockProvider) -> SharedState {
        Arc::new(
            GatewayState::new(
                config,
                Arc::new(provider),
                Arc::new(InMemoryStore::new()),
                github_tool_factory("http://127.0.0.1:9".into()),
            )
            .unwrap(),
        )
    }

    fn test_state() -> SharedState {
        test_state_with(AppConfig::default())
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn post_json(uri: &str, user: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_as(uri: &str, user: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(USER_ID_HEADER, user)
            .body(Body::empty())
            .unwrap()
    }

    async fn create_chat(state: &SharedState, user: &str, message: &str) -> Conversation {
        let response = v1_router(state.clone())
            .oneshot(post_json(
                "/chats",
                Some(user),
                serde_json::json!({ "message": message }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    #[tokio::test]
    async fn list_tools() {
        let app = v1_router(test_state());

        let req = Request::builder()
            .uri("/tools")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: ToolListResponse = body_json(response).await;
        assert_eq!(json.count, 18);
        let get_repo = json.tools.iter().find(|t| t.name == "getRepository").unwrap();
        assert!(!get_repo.write && !get_repo.requires_approval && get_repo.enabled);
        let create_issue = json.tools.iter().find(|t| t.name == "createIssue").unwrap();
        assert!(create_issue.write && create_issue.requires_approval);
    }

    #[tokio::test]
    async fn list_tools_marks_selection() {
        let mut config = AppConfig::default();
        config.tools.selection.presets = vec![Preset::RepoExplorer];
        let app = v1_router(test_state_with(config));

        let response = app
            .oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json: ToolListResponse = body_json(response).await;
        let enabled: Vec<&str> = json
            .tools
            .iter()
            .filter(|t| t.enabled)
            .map(|t| t.name.as_str())
            .collect();
        assert!(enabled.contains(&"searchCode"));
        assert!(!enabled.contains(&"mergePullRequest"));
    }

    #[tokio::test]
    async fn missing_user_header_is_unauthorized() {
        let app = v1_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/chats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_and_list_chats() {
        let state = test_state();
        let created = create_chat(&state, "alice", "What is in octo/hello?").await;
        assert_eq!(created.owner_id, "alice");
        assert_eq!(created.messages.len(), 1);

        let response = v1_router(state.clone())
            .oneshot(get_as("/chats", "alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let list: ChatListResponse = body_json(response).await;
        assert_eq!(list.chats.len(), 1);
        assert_eq!(list.chats[0].id, created.id);

        // Another user sees nothing.
        let response = v1_router(state).oneshot(get_as("/chats", "bob")).await.unwrap();
        let list: ChatListResponse = body_json(response).await;
        assert!(list.chats.is_empty());
    }

    #[tokio::test]
    async fn empty_first_message_is_rejected() {
        let app = v1_router(test_state());
        let response = app
            .oneshot(post_json(
                "/chats",
                Some("alice"),
                serde_json::json!({ "message": "  " }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = body_json(response).await;
        assert_eq!(err.kind, "validation");
    }

    #[tokio::test]
    async fn other_users_chat_is_not_found() {
        let state = test_state();
        let created = create_chat(&state, "alice", "hello").await;

        let response = v1_router(state)
            .oneshot(get_as(&format!("/chats/{}", created.id), "bob"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn turn_streams_sse_and_persists() {
        let state = test_state();
        let created = create_chat(&state, "alice", "hello").await;

        let response = v1_router(state.clone())
            .oneshot(post_json(
                &format!("/chats/{}", created.id),
                Some("alice"),
                serde_json::json!({ "messages": created.messages }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let body = body_text(response).await;
        assert!(body.contains("event: start"));
        assert!(body.contains("event: text-delta"));
        assert!(body.contains("Mock response"));
        assert!(body.contains("event: finish"));

        let response = v1_router(state)
            .oneshot(get_as(&format!("/chats/{}", created.id), "alice"))
            .await
            .unwrap();
        let chat: Conversation = body_json(response).await;
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[1].text(), "Mock response");
        assert_eq!(chat.title.as_deref(), Some("Mock response"));
    }

    #[tokio::test]
    async fn model_failure_arrives_as_stream_error() {
        let state = state_with_provider(AppConfig::default(), MockProvider::failing());
        let created = create_chat(&state, "alice", "hello").await;

        let response = v1_router(state.clone())
            .oneshot(post_json(
                &format!("/chats/{}", created.id),
                Some("alice"),
                serde_json::json!({ "messages": created.messages }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_text(response).await;
        assert!(body.contains("event: error"));
        assert!(body.contains(r#""kind":"model""#));
        assert!(!body.contains("event: finish"));

        let response = v1_router(state)
            .oneshot(get_as(&format!("/chats/{}", created.id), "alice"))
            .await
            .unwrap();
        let chat: Conversation = body_json(response).await;
        assert_eq!(chat.messages.len(), 1);
    }

    #[tokio::test]
    async fn turn_on_unknown_chat_is_not_found() {
        let app = v1_router(test_state());
        let response = app
            .oneshot(post_json(
                "/chats/does-not-exist",
                Some("alice"),
                serde_json::json!({ "messages": [{ "role": "user", "parts": [{ "type": "text", "text": "hi" }] }] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn turn_with_empty_history_is_bad_request() {
        let state = test_state();
        let created = create_chat(&state, "alice", "hello").await;
        let response = v1_router(state)
            .oneshot(post_json(
                &format!("/chats/{}", created.id),
                Some("alice"),
                serde_json::json!({ "messages": [] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn error_kinds_map_to_statuses() {
        let cases = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                ApiError::Turn(TurnError::Validation("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Turn(TurnError::Configuration(
                    repolens_core::error::ConfigurationError::UnknownTool("x".into()),
                )),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Store(StoreError::QueryFailed("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_and_kind().0, status);
        }
    }
}
