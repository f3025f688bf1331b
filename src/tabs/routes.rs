use axum::{
    Router,
    routing::{delete, get, post},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:tab_id", delete(handler::close_tab))
        .route("/:tab_id/events", get(handler::tab_events))
        .route("/:tab_id/cards/generate", post(handler::generate_cards))
        .route("/:tab_id/export/mochi", post(handler::export_mochi))
        .route("/:tab_id/export/markdown", get(handler::export_markdown))
        .route("/:tab_id/export/obsidian", get(handler::export_obsidian))
}
