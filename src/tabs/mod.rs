//! Per-tab HTTP surface
//!
//! Everything here is addressed by tab id and sits next to `POST /messages`:
//!
//! - `GET /tabs/:tab_id/events?audience=content|surface` streams notifications as
//!   server-sent events until the client leaves or the service shuts down
//! - `DELETE /tabs/:tab_id` is the tab-closed signal
//! - `POST /tabs/:tab_id/cards/generate` turns the tab's highlights into cards
//! - `POST /tabs/:tab_id/export/mochi`, `GET /tabs/:tab_id/export/markdown` and
//!   `GET /tabs/:tab_id/export/obsidian` hand the tab's cards to outside tools
//!
//! Card and export routes drive a `Surface` over the in-process router, so they behave
//! exactly like the side panel does.

mod handler;
mod routes;

pub use routes::routes;
