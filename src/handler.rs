use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::Method,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::cards::{AnthropicGenerator, MochiExporter};
use crate::config::Config;
use crate::db::Database;
use crate::messages::{Request, Response};
use crate::router::MessageRouter;
use crate::tabs;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<MessageRouter<Database>>,
    pub cfg: Arc<Config>,
    pub generator: Arc<AnthropicGenerator>,
    pub exporter: Arc<MochiExporter>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(cfg: Config, db: Arc<Database>, shutdown: CancellationToken) -> Self {
        AppState {
            router: Arc::new(MessageRouter::new(db, cfg.app.event_buffer)),
            generator: Arc::new(AnthropicGenerator::new(&cfg.ai)),
            exporter: Arc::new(MochiExporter::new(&cfg.mochi)),
            cfg: Arc::new(cfg),
            shutdown,
        }
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(Health { status: "ok" })
}

/// Every request gets an answer; failures come back as `{success: false, error}`.
pub async fn post_message(State(state): State<AppState>, Json(request): Json<Request>) -> Json<Response> {
    Json(state.router.handle(request).await)
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(healthcheck))
        .route("/messages", post(post_message))
        .nest("/tabs", tabs::routes())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{body, body::Body, http};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    pub(crate) async fn test_state() -> AppState {
        let db = Arc::new(Database::in_memory().await.unwrap());
        AppState::new(Config::default(), db, CancellationToken::new())
    }

    pub(crate) async fn body_json(response: axum::response::Response) -> Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, payload: Value) -> http::Request<Body> {
        http::Request::post(uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_healthcheck() {
        let response = app(test_state().await)
            .oneshot(http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_message_round_trip() {
        let app = app(test_state().await);

        let added = app
            .clone()
            .oneshot(post_json(
                "/messages",
                json!({"type": "ADD_HIGHLIGHT", "tabId": 3, "id": "h1", "text": "hello", "url": "https://a"}),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(added).await, json!({"success": true}));

        let state = app
            .oneshot(post_json("/messages", json!({"type": "GET_STATE", "tabId": 3})))
            .await
            .unwrap();
        let state = body_json(state).await;
        assert_eq!(state["isActive"], json!(false));
        assert_eq!(state["highlights"][0]["id"], json!("h1"));
        assert_eq!(state["cards"], json!([]));
    }

    #[tokio::test]
    async fn test_failure_is_reported_in_body() {
        let response = app(test_state().await)
            .oneshot(post_json("/messages", json!({"type": "REMOVE_CARD", "tabId": 1, "index": 4})))
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].as_str().unwrap().contains("CardIndexOutOfRange"));
    }

    #[tokio::test]
    async fn test_unknown_message_type_rejected() {
        let response = app(test_state().await)
            .oneshot(post_json("/messages", json!({"type": "OPEN_SIDE_PANEL", "tabId": 1})))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
