//! Page-side adapter: turns selections into highlights and keeps page markup in step
//! with the router's notifications.

use std::time::Duration;

use crate::dom::{
    Document, Feedback, NodeId, Pointer, TextRange, clear_markup, compute_context, dematerialize,
    highlight_at, materialize,
};
use crate::error::RelayError;
use crate::messages::{Audience, Envelope, Notification, Request};
use crate::relay::{Relay, send_with_timeout};
use crate::store::{TabId, generate_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Inactive,
    InvalidRange,
    InsideHighlight,
    NotMaterialized,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Highlighted { highlight_id: String, feedback: Feedback },
    Ignored(IgnoreReason),
}

pub struct ContentScript<R: Relay> {
    tab_id: TabId,
    url: String,
    document: Document,
    relay: R,
    timeout: Duration,
    is_active: bool,
}

impl<R: Relay> ContentScript<R> {
    pub fn new(tab_id: TabId, url: &str, document: Document, relay: R, timeout: Duration) -> Self {
        ContentScript {
            tab_id,
            url: url.to_string(),
            document,
            relay,
            timeout,
            is_active: false,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Pulls the activation flag. Until this succeeds selections are ignored.
    pub async fn initialize(&mut self) -> Result<(), RelayError> {
        let response = send_with_timeout(&self.relay, Request::GetState { tab_id: self.tab_id }, self.timeout).await?;
        self.is_active = response.into_state().map(|s| s.is_active).unwrap_or(false);
        tracing::info!(tab_id = self.tab_id, is_active = self.is_active, "content script initialized");
        Ok(())
    }

    pub async fn handle_selection(
        &mut self,
        range: TextRange,
        pointer: Pointer,
    ) -> Result<SelectionOutcome, RelayError> {
        if !self.is_active {
            return Ok(SelectionOutcome::Ignored(IgnoreReason::Inactive));
        }

        let text = match range.text(&self.document) {
            Ok(text) if !range.is_collapsed() && !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::debug!(tab_id = self.tab_id, "ignoring empty selection");
                return Ok(SelectionOutcome::Ignored(IgnoreReason::InvalidRange));
            }
            Err(e) => {
                tracing::debug!(tab_id = self.tab_id, error = %e, "ignoring invalid selection");
                return Ok(SelectionOutcome::Ignored(IgnoreReason::InvalidRange));
            }
        };

        if highlight_at(&self.document, range.start.node).is_some() {
            return Ok(SelectionOutcome::Ignored(IgnoreReason::InsideHighlight));
        }

        let context = compute_context(&self.document, &range).unwrap_or_default();
        let highlight_id = generate_id(&text);
        if !materialize(&mut self.document, &range, &highlight_id) {
            return Ok(SelectionOutcome::Ignored(IgnoreReason::NotMaterialized));
        }

        let request = Request::AddHighlight {
            tab_id: self.tab_id,
            id: highlight_id.clone(),
            text,
            context,
            url: self.url.clone(),
        };
        if let Err(e) = send_with_timeout(&self.relay, request, self.timeout).await {
            // no record exists, so the markup must not outlive this call
            dematerialize(&mut self.document, &highlight_id);
            return Err(e);
        }

        Ok(SelectionOutcome::Highlighted {
            highlight_id,
            feedback: Feedback::at(pointer),
        })
    }

    /// Clicking a highlight deletes it. Returns whether the click hit one.
    pub async fn handle_click(&mut self, node: NodeId) -> Result<bool, RelayError> {
        let Some(id) = highlight_at(&self.document, node) else {
            return Ok(false);
        };

        let request = Request::RemoveHighlight {
            tab_id: self.tab_id,
            id: id.clone(),
        };
        send_with_timeout(&self.relay, request, self.timeout).await?;
        // the record is gone; the page notification may lag or never arrive
        dematerialize(&mut self.document, &id);
        Ok(true)
    }

    /// Applies an envelope addressed to this page; anything else is ignored.
    pub fn apply(&mut self, envelope: &Envelope) {
        if envelope.tab_id != self.tab_id || envelope.audience != Audience::Content {
            return;
        }
        self.handle_notification(&envelope.notification);
    }

    pub fn handle_notification(&mut self, notification: &Notification) {
        match notification {
            Notification::ActivationChanged { is_active } => {
                self.is_active = *is_active;
                tracing::info!(tab_id = self.tab_id, is_active, "activation changed");
            }
            Notification::RemoveHighlight { id } => {
                dematerialize(&mut self.document, id);
            }
            Notification::ClearHighlights => {
                let removed = clear_markup(&mut self.document);
                tracing::debug!(tab_id = self.tab_id, removed = removed.len(), "cleared page highlights");
            }
            Notification::HighlightsUpdated { .. } | Notification::CardsUpdated { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::HIGHLIGHT_ID_ATTR;
    use crate::router::MessageRouter;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn page(text: &str) -> (Document, NodeId, NodeId) {
        let doc = Document::parse(&format!("<!DOCTYPE html><html><body><p>{}</p></body></html>", text));
        let p = doc.children(doc.root())[0];
        let t = doc.children(p)[0];
        (doc, p, t)
    }

    fn router() -> Arc<MessageRouter<MemoryStorage>> {
        Arc::new(MessageRouter::new(Arc::new(MemoryStorage::new()), 64))
    }

    async fn active_script(
        router: &Arc<MessageRouter<MemoryStorage>>,
        text: &str,
    ) -> (ContentScript<Arc<MessageRouter<MemoryStorage>>>, NodeId, NodeId) {
        router.handle(Request::ToggleActivation { tab_id: 1 }).await;
        let (doc, p, t) = page(text);
        let mut script = ContentScript::new(1, "https://example.com/a", doc, router.clone(), TIMEOUT);
        script.initialize().await.unwrap();
        (script, p, t)
    }

    fn deliver(script: &mut ContentScript<Arc<MessageRouter<MemoryStorage>>>, rx: &mut broadcast::Receiver<Envelope>) {
        while let Ok(env) = rx.try_recv() {
            script.apply(&env);
        }
    }

    const POINTER: Pointer = Pointer { x: 1.0, y: 2.0 };

    #[tokio::test]
    async fn test_inactive_tab_produces_no_highlight() {
        let router = router();
        let (doc, p, t) = page("hello world");
        let mut script = ContentScript::new(1, "https://example.com", doc, router.clone(), TIMEOUT);
        script.initialize().await.unwrap();

        let outcome = script.handle_selection(TextRange::within(t, 0, 5), POINTER).await.unwrap();

        assert_eq!(outcome, SelectionOutcome::Ignored(IgnoreReason::Inactive));
        assert!(router.get_state(1).await.unwrap().highlights.is_empty());
        assert_eq!(script.document().to_markup(p), "<p>hello world</p>");
    }

    #[tokio::test]
    async fn test_selection_creates_record_and_markup() {
        let router = router();
        let (mut script, p, t) = active_script(&router, "hello world").await;

        let outcome = script.handle_selection(TextRange::within(t, 6, 11), POINTER).await.unwrap();

        let SelectionOutcome::Highlighted { highlight_id, feedback } = outcome else {
            panic!("expected a highlight");
        };
        assert_eq!((feedback.x, feedback.y), (11.0, 12.0));

        let state = router.get_state(1).await.unwrap();
        assert_eq!(state.highlights.len(), 1);
        let h = &state.highlights[0];
        assert_eq!(h.id, highlight_id);
        assert_eq!(h.text, "world");
        assert_eq!(h.context, "hello world");
        assert_eq!(h.url, "https://example.com/a");
        assert_eq!(script.document().find_by_attribute(HIGHLIGHT_ID_ATTR, &highlight_id).len(), 1);
        assert_eq!(script.document().text_content(p), "hello world");
    }

    #[tokio::test]
    async fn test_collapsed_selection_ignored() {
        let router = router();
        let (mut script, _, t) = active_script(&router, "hello").await;

        let outcome = script.handle_selection(TextRange::within(t, 2, 2), POINTER).await.unwrap();

        assert_eq!(outcome, SelectionOutcome::Ignored(IgnoreReason::InvalidRange));
        assert!(router.get_state(1).await.unwrap().highlights.is_empty());
    }

    #[tokio::test]
    async fn test_removal_and_clear_notifications_strip_markup() {
        let router = router();
        let (mut script, p, t) = active_script(&router, "one two three").await;
        let mut rx = router.subscribe();

        let first = script.handle_selection(TextRange::within(t, 0, 3), POINTER).await.unwrap();
        let SelectionOutcome::Highlighted { highlight_id, .. } = first else {
            panic!("expected a highlight");
        };
        let rest = script.document().children(p)[1];
        script.handle_selection(TextRange::within(rest, 5, 10), POINTER).await.unwrap();

        router.handle(Request::RemoveHighlight { tab_id: 1, id: highlight_id.clone() }).await;
        deliver(&mut script, &mut rx);
        assert!(script.document().find_by_attribute(HIGHLIGHT_ID_ATTR, &highlight_id).is_empty());
        assert_eq!(router.get_state(1).await.unwrap().highlights.len(), 1);

        router.handle(Request::ClearHighlights { tab_id: 1 }).await;
        deliver(&mut script, &mut rx);
        assert_eq!(script.document().to_markup(p), "<p>one two three</p>");
    }

    #[tokio::test]
    async fn test_activation_notification_toggles_capture() {
        let router = router();
        let (mut script, _, t) = active_script(&router, "hello world").await;
        let mut rx = router.subscribe();

        router.handle(Request::ToggleActivation { tab_id: 1 }).await;
        deliver(&mut script, &mut rx);

        assert!(!script.is_active());
        let outcome = script.handle_selection(TextRange::within(t, 0, 5), POINTER).await.unwrap();
        assert_eq!(outcome, SelectionOutcome::Ignored(IgnoreReason::Inactive));
    }

    #[tokio::test]
    async fn test_other_tab_notifications_ignored() {
        let router = router();
        let (mut script, _, _) = active_script(&router, "hello").await;

        script.apply(&Envelope {
            tab_id: 2,
            audience: Audience::Content,
            notification: Notification::ActivationChanged { is_active: false },
        });

        assert!(script.is_active());
    }

    #[tokio::test]
    async fn test_click_on_highlight_removes_it() {
        let router = router();
        let (mut script, p, t) = active_script(&router, "click me please").await;
        script.handle_selection(TextRange::within(t, 6, 8), POINTER).await.unwrap();
        let marker = script.document().children(p)[1];
        let inner = script.document().children(marker)[0];

        assert!(script.handle_click(inner).await.unwrap());
        assert!(!script.handle_click(t).await.unwrap());

        assert!(router.get_state(1).await.unwrap().highlights.is_empty());
        assert_eq!(script.document().to_markup(p), "<p>click me please</p>");
    }

    #[tokio::test]
    async fn test_failed_delivery_rolls_back_markup() {
        let router = router();
        let (mut script, p, t) = active_script(&router, "hello world").await;
        router.storage().set_fail_writes(true);

        let res = script.handle_selection(TextRange::within(t, 0, 5), POINTER).await;

        assert!(matches!(res, Err(RelayError::Rejected(_))));
        assert_eq!(script.document().to_markup(p), "<p>hello world</p>");
    }
}
