//! HTTP API gateway for RepoLens.
//!
//! Exposes the health check and the v1 API: chat CRUD, the tool catalog, and
//! the streaming chat turn endpoint.
//!
//! Built on Axum. Each turn runs in its own spawned task, so a client that
//! goes away stops receiving events but never stops persistence.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use repolens_agent::{ToolFactory, TurnService};
use repolens_config::{AppConfig, StoreConfig};
use repolens_core::error::{ConfigurationError, StoreError};
use repolens_core::provider::Provider;
use repolens_core::store::ConversationStore;
use repolens_core::tool::ToolRegistry;
use repolens_store::InMemoryStore;
use repolens_tools::GithubClient;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: Arc<AppConfig>,
    pub turns: TurnService,
    /// The full catalog, built with the configured token, for listing.
    pub catalog: ToolRegistry,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    /// Wire the turn service and check the tool selection up front.
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn Provider>,
        store: Arc<dyn ConversationStore>,
        tools: Arc<dyn ToolFactory>,
    ) -> Result<Self, ConfigurationError> {
        let catalog = tools.registry(config.github.token.as_deref())?;
        let allow = config.tools.selection.allow_list();
        catalog.resolve(allow.as_deref())?;
        config.tools.require_approval.validate()?;

        let config = Arc::new(config);
        let turns = TurnService::new(config.clone(), provider, store, tools);
        Ok(Self {
            config,
            turns,
            catalog,
        })
    }
}

/// A tool factory that talks to the GitHub API at `api_url`.
///
/// Without a token, requests go out unauthenticated.
pub fn github_tool_factory(api_url: String) -> Arc<dyn ToolFactory> {
    Arc::new(move |token: Option<&str>| {
        let client = GithubClient::new(&api_url, token.unwrap_or_default())
            .map_err(|e| ConfigurationError::Invalid(format!("GitHub client: {e}")))?;
        repolens_tools::default_registry(Arc::new(client))
    })
}

/// Open the configured conversation store.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn ConversationStore>, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "sqlite" => {
            let path = config.database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
                })?;
            }
            let store = repolens_store::SqliteStore::new(&path.to_string_lossy()).await?;
            Ok(Arc::new(store))
        }
        other => Err(StoreError::Storage(format!("unknown store backend '{other}'"))),
    }
}

/// Build the full router.
///
/// Layers applied:
/// - CORS for a local UI
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(HeaderValue::from_static(
            "http://localhost:8080",
        )))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(api_v1::USER_ID_HEADER),
            HeaderName::from_static(api_v1::USER_NAME_HEADER),
            HeaderName::from_static(api_v1::GITHUB_TOKEN_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = repolens_providers::build_from_config(&config.provider)?;
    let store = open_store(&config.store).await?;
    let tools = github_tool_factory(config.github.api_url.clone());
    let state = Arc::new(GatewayState::new(config, provider, store.clone(), tools)?);

    let app = build_router(state);

    info!(addr = %addr, store = store.name(), "Gateway starting with v1 API");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down gateway");
        })
        .await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use repolens_core::tool::Preset;
    use tower::ServiceExt;

    fn offline_tools() -> Arc<dyn ToolFactory> {
        github_tool_factory("http://127.0.0.1:9".into())
    }

    fn provider() -> Arc<dyn Provider> {
        let config = repolens_config::ProviderConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        repolens_providers::build_from_config(&config).unwrap()
    }

    fn test_state() -> SharedState {
        Arc::new(
            GatewayState::new(
                AppConfig::default(),
                provider(),
                Arc::new(InMemoryStore::new()),
                offline_tools(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state());

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn unknown_allow_list_name_fails_at_startup() {
        let mut config = AppConfig::default();
        config.tools.selection.allow = vec!["deleteRepository".into()];
        let err = GatewayState::new(
            config,
            provider(),
            Arc::new(InMemoryStore::new()),
            offline_tools(),
        )
        .err()
        .unwrap();
        assert_eq!(err, ConfigurationError::UnknownTool("deleteRepository".into()));
    }

    #[test]
    fn preset_selection_is_accepted() {
        let mut config = AppConfig::default();
        config.tools.selection.presets = vec![Preset::RepoExplorer];
        assert!(
            GatewayState::new(
                config,
                provider(),
                Arc::new(InMemoryStore::new()),
                offline_tools()
            )
            .is_ok()
        );
    }

    #[tokio::test]
    async fn memory_backend_opens() {
        let config = StoreConfig {
            backend: "memory".into(),
            path: None,
        };
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[tokio::test]
    async fn sqlite_backend_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            backend: "sqlite".into(),
            path: Some(dir.path().join("nested").join("chats.db")),
        };
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.name(), "sqlite");
        assert!(dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let config = StoreConfig {
            backend: "mongo".into(),
            path: None,
        };
        assert!(open_store(&config).await.is_err());
    }
}
