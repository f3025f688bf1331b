use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::cards::{markdown::MARKDOWN_FILE_NAME, obsidian_link};
use crate::db::Database;
use crate::error::{RelayError, ServiceError, SurfaceError};
use crate::handler::AppState;
use crate::messages::Audience;
use crate::router::MessageRouter;
use crate::store::{Flashcard, TabId};
use crate::surface::{Status, StatusKind, Surface};

type TabSurface = Surface<Arc<MessageRouter<Database>>>;

#[derive(Debug, Deserialize)]
pub struct EventParams {
    pub audience: Audience,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct Generated<'a> {
    generated: usize,
    cards: &'a [Flashcard],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Exported<'a> {
    exported: usize,
    status: Option<&'a Status>,
    needs_credential: bool,
}

#[derive(Debug, Serialize)]
struct Link {
    link: String,
}

fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse { data })).into_response()
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

fn surface_error(err: &SurfaceError) -> Response {
    let status = match err {
        SurfaceError::Relay(RelayError::Rejected(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        SurfaceError::Relay(_) => StatusCode::SERVICE_UNAVAILABLE,
        SurfaceError::Service(e) => match e {
            ServiceError::MissingCredential(_) | ServiceError::EmptyInput(_) | ServiceError::NotConfigured(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::InvalidCredential => StatusCode::UNAUTHORIZED,
            ServiceError::AccessDenied => StatusCode::FORBIDDEN,
            ServiceError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Failed(_) | ServiceError::MalformedResponse(_) | ServiceError::Transport(_) => {
                StatusCode::BAD_GATEWAY
            }
        },
    };
    error_response(status, &err.to_string())
}

async fn open_surface(state: &AppState, tab_id: TabId) -> Result<TabSurface, Response> {
    let mut surface = Surface::new(tab_id, state.router.clone(), state.cfg.app.request_timeout());
    surface.open().await.map_err(|e| surface_error(&e))?;
    Ok(surface)
}

/// Notifications for one tab and one audience, as server-sent events.
///
/// A slow client that falls behind the broadcast buffer silently loses the skipped
/// notifications and is expected to refresh with `GET_STATE`.
pub async fn tab_events(
    State(state): State<AppState>,
    Path(tab_id): Path<TabId>,
    Query(params): Query<EventParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let audience = params.audience;
    let rx = state.router.subscribe();
    let shutdown = state.shutdown.clone();
    tracing::info!(tab_id, ?audience, "event stream opened");

    let events = stream::unfold((rx, shutdown), move |(mut rx, shutdown)| async move {
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => return None,
                received = rx.recv() => received,
            };

            match received {
                Ok(envelope) if envelope.tab_id == tab_id && envelope.audience == audience => {
                    match Event::default().json_data(&envelope.notification) {
                        Ok(event) => return Some((Ok(event), (rx, shutdown))),
                        Err(e) => tracing::warn!(tab_id, error = %e, "failed to encode notification"),
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(tab_id, skipped, "event stream lagged, notifications dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

pub async fn close_tab(State(state): State<AppState>, Path(tab_id): Path<TabId>) -> Response {
    match state.router.close_tab(tab_id).await {
        Ok(()) => success(tab_id),
        Err(e) => {
            let reason = crate::unpack_error(&e);
            tracing::error!(tab_id, error = %reason, "failed to close tab");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &reason)
        }
    }
}

pub async fn generate_cards(State(state): State<AppState>, Path(tab_id): Path<TabId>) -> Response {
    let mut surface = match open_surface(&state, tab_id).await {
        Ok(surface) => surface,
        Err(response) => return response,
    };

    match surface.generate_cards(state.generator.as_ref()).await {
        Ok(generated) => success(Generated {
            generated,
            cards: surface.cards(),
        }),
        Err(e) => surface_error(&e),
    }
}

pub async fn export_mochi(State(state): State<AppState>, Path(tab_id): Path<TabId>) -> Response {
    let mut surface = match open_surface(&state, tab_id).await {
        Ok(surface) => surface,
        Err(response) => return response,
    };

    let exported = match surface.export(state.exporter.as_ref()).await {
        Ok(exported) => exported,
        Err(e) => return surface_error(&e),
    };

    let status = if surface.needs_credential() {
        StatusCode::UNAUTHORIZED
    } else if surface.status().is_some_and(|s| s.kind == StatusKind::Error) {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    let body = Exported {
        exported,
        status: surface.status(),
        needs_credential: surface.needs_credential(),
    };
    (status, Json(ApiResponse { data: body })).into_response()
}

pub async fn export_markdown(State(state): State<AppState>, Path(tab_id): Path<TabId>) -> Response {
    let mut surface = match open_surface(&state, tab_id).await {
        Ok(surface) => surface,
        Err(response) => return response,
    };

    match surface.export_markdown(chrono::Local::now().date_naive()) {
        Ok(markdown) => (
            [
                (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", MARKDOWN_FILE_NAME),
                ),
            ],
            markdown,
        )
            .into_response(),
        Err(e) => surface_error(&e),
    }
}

pub async fn export_obsidian(State(state): State<AppState>, Path(tab_id): Path<TabId>) -> Response {
    let mut surface = match open_surface(&state, tab_id).await {
        Ok(surface) => surface,
        Err(response) => return response,
    };

    let link = surface
        .export_markdown(chrono::Local::now().date_naive())
        .and_then(|markdown| obsidian_link(&state.cfg.obsidian, &markdown).map_err(SurfaceError::from));
    match link {
        Ok(link) => success(Link { link }),
        Err(e) => surface_error(&e),
    }
}
