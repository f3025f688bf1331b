//! Message Router
//!
//! The single point of mediation between content scripts, the background service and
//! the UI surface. It owns the registry of tab states, persists every mutation before
//! acknowledging it and fans out change notifications.
//!
//! # Concurrency
//!
//! - each tab has its own async mutex, held for the whole read-modify-persist sequence,
//!   so there is exactly one writer per tab at any time
//! - the registry lock is only held to look up or insert a tab's slot
//! - notifications go out on a broadcast channel after the write; a missing or lagging
//!   listener loses them, and listeners recover with `GET_STATE`

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};

use crate::error::{RelayError, RouterError};
use crate::messages::{Audience, Envelope, Notification, Request, Response};
use crate::relay::Relay;
use crate::storage::TabStorage;
use crate::store::{Highlight, TabId, TabState, now_millis};
use crate::unpack_error;

#[derive(Default)]
struct TabSlot {
    state: Option<TabState>,
    closed: bool,
}

pub struct MessageRouter<S: TabStorage> {
    tabs: Mutex<HashMap<TabId, Arc<Mutex<TabSlot>>>>,
    storage: Arc<S>,
    events: broadcast::Sender<Envelope>,
}

impl<S: TabStorage> MessageRouter<S> {
    pub fn new(storage: Arc<S>, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        MessageRouter {
            tabs: Mutex::new(HashMap::new()),
            storage,
            events,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.events.subscribe()
    }

    #[cfg(test)]
    async fn open_tabs(&self) -> Vec<TabId> {
        let mut ids: Vec<TabId> = self.tabs.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn handle(&self, request: Request) -> Response {
        let kind = request.kind();
        let tab_id = request.tab_id();
        tracing::debug!(kind, tab_id, "received request");

        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                let reason = unpack_error(&e);
                tracing::error!(kind, tab_id, error = %reason, "request failed");
                Response::failed(reason)
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response, RouterError> {
        match request {
            Request::GetState { tab_id } => Ok(Response::State(self.get_state(tab_id).await?)),

            Request::ToggleActivation { tab_id } => {
                let (is_active, _) = self.mutate(tab_id, |s| Ok(s.toggle_active())).await?;
                tracing::info!(tab_id, is_active, "activation toggled");
                let changed = Notification::ActivationChanged { is_active };
                self.notify(tab_id, Audience::Content, changed.clone());
                self.notify(tab_id, Audience::Surface, changed);
                Ok(Response::ok())
            }

            Request::AddHighlight {
                tab_id,
                id,
                text,
                context,
                url,
            } => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Ok(Response::failed("empty highlight"));
                }
                let highlight = Highlight {
                    id,
                    text,
                    context,
                    url,
                    timestamp: now_millis(),
                };
                let (_, state) = self.mutate(tab_id, |s| s.insert_highlight(highlight)).await?;
                self.notify_highlights(tab_id, &state);
                Ok(Response::ok())
            }

            Request::RemoveHighlight { tab_id, id } => {
                let (removed, state) = self.mutate(tab_id, |s| Ok(s.remove_highlight(&id))).await?;
                if !removed {
                    tracing::debug!(tab_id, id = %id, "highlight already gone");
                }
                self.notify(tab_id, Audience::Content, Notification::RemoveHighlight { id });
                self.notify_highlights(tab_id, &state);
                Ok(Response::ok())
            }

            Request::ClearHighlights { tab_id } => {
                let (_, state) = self.mutate(tab_id, |s| Ok(s.clear_highlights())).await?;
                self.notify(tab_id, Audience::Content, Notification::ClearHighlights);
                self.notify_highlights(tab_id, &state);
                Ok(Response::ok())
            }

            Request::AddCards { tab_id, cards } => {
                let (added, state) = self.mutate(tab_id, |s| Ok(s.add_cards(cards))).await?;
                tracing::info!(tab_id, added, total = state.cards.len(), "cards added");
                self.notify_cards(tab_id, &state);
                Ok(Response::ok())
            }

            Request::RemoveCard { tab_id, index } => {
                let (_, state) = self.mutate(tab_id, |s| s.remove_card_at(index)).await?;
                self.notify_cards(tab_id, &state);
                Ok(Response::ok())
            }

            Request::RemoveCardById { tab_id, id } => {
                let (_, state) = self.mutate(tab_id, |s| Ok(s.remove_card(&id))).await?;
                self.notify_cards(tab_id, &state);
                Ok(Response::ok())
            }

            Request::ClearCards { tab_id } => {
                let (_, state) = self.mutate(tab_id, |s| Ok(s.clear_cards())).await?;
                self.notify_cards(tab_id, &state);
                Ok(Response::ok())
            }

            Request::CloseTab { tab_id } => {
                self.close_tab(tab_id).await?;
                Ok(Response::ok())
            }
        }
    }

    /// Locks the tab's slot, loading persisted state on first reference.
    async fn lock_tab(&self, tab_id: TabId) -> Result<OwnedMutexGuard<TabSlot>, RouterError> {
        loop {
            let slot = {
                let mut tabs = self.tabs.lock().await;
                tabs.entry(tab_id).or_default().clone()
            };

            let mut guard = slot.lock_owned().await;
            if guard.closed {
                // closed while we waited; the registry holds a fresh slot by now
                continue;
            }

            if guard.state.is_none() {
                let recovered = self.storage.load(tab_id).await?;
                if recovered.is_some() {
                    tracing::info!(tab_id, "recovered tab state from storage");
                }
                guard.state = Some(recovered.unwrap_or_default());
            }
            return Ok(guard);
        }
    }

    pub async fn get_state(&self, tab_id: TabId) -> Result<TabState, RouterError> {
        let guard = self.lock_tab(tab_id).await?;
        Ok(guard.state.clone().unwrap_or_default())
    }

    /// Applies `f` to a copy of the tab state and commits it only once it is persisted.
    async fn mutate<T>(
        &self,
        tab_id: TabId,
        f: impl FnOnce(&mut TabState) -> Result<T, RouterError>,
    ) -> Result<(T, TabState), RouterError> {
        let mut guard = self.lock_tab(tab_id).await?;
        let mut next = guard.state.clone().unwrap_or_default();
        let out = f(&mut next)?;

        self.storage.save(tab_id, &next).await?;
        guard.state = Some(next.clone());
        Ok((out, next))
    }

    /// Forgets the tab in memory and in storage. A later reference starts from scratch.
    pub async fn close_tab(&self, tab_id: TabId) -> Result<(), RouterError> {
        // registry stays locked until storage is gone, so nobody reloads the old record
        let mut tabs = self.tabs.lock().await;
        if let Some(slot) = tabs.remove(&tab_id) {
            let mut guard = slot.lock_owned().await;
            guard.closed = true;
            guard.state = None;
        }

        self.storage.remove(tab_id).await?;
        drop(tabs);
        tracing::info!(tab_id, "cleaned up data for closed tab");
        Ok(())
    }

    fn notify_highlights(&self, tab_id: TabId, state: &TabState) {
        self.notify(
            tab_id,
            Audience::Surface,
            Notification::HighlightsUpdated {
                highlights: state.highlights.clone(),
            },
        );
    }

    fn notify_cards(&self, tab_id: TabId, state: &TabState) {
        self.notify(
            tab_id,
            Audience::Surface,
            Notification::CardsUpdated {
                cards: state.cards.clone(),
            },
        );
    }

    /// Fire-and-forget. Nobody listening is not an error.
    fn notify(&self, tab_id: TabId, audience: Audience, notification: Notification) {
        let envelope = Envelope {
            tab_id,
            audience,
            notification,
        };
        if self.events.send(envelope).is_err() {
            tracing::debug!(tab_id, ?audience, "no listener for notification");
        }
    }
}

impl<S: TabStorage> Relay for MessageRouter<S> {
    async fn send(&self, request: Request) -> Result<Response, RelayError> {
        Ok(self.handle(request).await)
    }
}
