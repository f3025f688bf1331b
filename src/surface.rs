//! UI surface of a tab: a local snapshot of the router's state plus the user actions the
//! side panel offers.
//!
//! The snapshot is never authoritative. Every action goes to the router first and the
//! snapshot is then refreshed with `GET_STATE`; notifications only make it fresher sooner.

use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::cards::{CardExporter, CardGenerator, render_markdown};
use crate::error::{RelayError, ServiceError, SurfaceError};
use crate::messages::{Audience, Envelope, Notification, Request, Response};
use crate::relay::{Relay, send_with_timeout};
use crate::store::{Flashcard, Highlight, TabId, TabState};

pub const UNREACHABLE_MESSAGE: &str = "Please refresh the page to use the highlighter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Active,
    Inactive,
}

impl Activation {
    pub fn is_active(self) -> bool {
        self == Activation::Active
    }

    fn flipped(self) -> Self {
        match self {
            Activation::Active => Activation::Inactive,
            Activation::Inactive => Activation::Active,
        }
    }
}

impl From<bool> for Activation {
    fn from(active: bool) -> Self {
        if active { Activation::Active } else { Activation::Inactive }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub kind: StatusKind,
    pub message: String,
}

pub struct Surface<R: Relay> {
    tab_id: TabId,
    relay: R,
    timeout: Duration,
    highlights: Vec<Highlight>,
    cards: Vec<Flashcard>,
    activation: Activation,
    status: Option<Status>,
    credential_prompt: bool,
}

impl<R: Relay> Surface<R> {
    pub fn new(tab_id: TabId, relay: R, timeout: Duration) -> Self {
        Surface {
            tab_id,
            relay,
            timeout,
            highlights: Vec::new(),
            cards: Vec::new(),
            activation: Activation::Inactive,
            status: None,
            credential_prompt: false,
        }
    }

    pub fn highlights(&self) -> &[Highlight] {
        &self.highlights
    }

    pub fn cards(&self) -> &[Flashcard] {
        &self.cards
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn needs_credential(&self) -> bool {
        self.credential_prompt
    }

    /// Called once the user has entered a new key.
    pub fn credential_entered(&mut self) {
        self.credential_prompt = false;
        self.set_status(StatusKind::Success, "API key saved successfully!");
    }

    pub async fn open(&mut self) -> Result<(), SurfaceError> {
        self.reconcile().await.inspect_err(|e| self.report(e))
    }

    async fn reconcile(&mut self) -> Result<(), SurfaceError> {
        let response = self.send(Request::GetState { tab_id: self.tab_id }).await?;
        let state = response
            .into_state()
            .ok_or_else(|| RelayError::Rejected("GET_STATE answered without state".to_string()))?;
        self.replace_snapshot(state);
        Ok(())
    }

    fn replace_snapshot(&mut self, state: TabState) {
        self.activation = Activation::from(state.is_active);
        self.highlights = state.highlights;
        self.cards = state.cards;
    }

    async fn send(&self, request: Request) -> Result<Response, RelayError> {
        send_with_timeout(&self.relay, request, self.timeout).await
    }

    /// Applies an envelope addressed to this tab's surface; anything else is ignored.
    pub fn apply(&mut self, envelope: &Envelope) {
        if envelope.tab_id != self.tab_id || envelope.audience != Audience::Surface {
            return;
        }
        match &envelope.notification {
            Notification::ActivationChanged { is_active } => self.activation = Activation::from(*is_active),
            Notification::HighlightsUpdated { highlights } => self.highlights = highlights.clone(),
            Notification::CardsUpdated { cards } => self.cards = cards.clone(),
            Notification::RemoveHighlight { .. } | Notification::ClearHighlights => {}
        }
    }

    /// Flips the switch right away, then settles on whatever the router reports.
    pub async fn toggle(&mut self) -> Result<Activation, SurfaceError> {
        let before = self.activation;
        self.activation = before.flipped();

        if let Err(e) = self.send(Request::ToggleActivation { tab_id: self.tab_id }).await {
            self.activation = before;
            let e = SurfaceError::from(e);
            self.report(&e);
            return Err(e);
        }

        if let Err(e) = self.reconcile().await {
            // the toggle itself went through; keep the optimistic value until the next refresh
            tracing::warn!(tab_id = self.tab_id, error = %e, "could not confirm activation");
        }
        Ok(self.activation)
    }

    pub async fn remove_highlight(&mut self, id: &str) -> Result<(), SurfaceError> {
        let request = Request::RemoveHighlight {
            tab_id: self.tab_id,
            id: id.to_string(),
        };
        self.run(request).await
    }

    pub async fn clear_highlights(&mut self) -> Result<(), SurfaceError> {
        self.run(Request::ClearHighlights { tab_id: self.tab_id }).await
    }

    pub async fn remove_card(&mut self, id: &str) -> Result<(), SurfaceError> {
        let request = Request::RemoveCardById {
            tab_id: self.tab_id,
            id: id.to_string(),
        };
        self.run(request).await
    }

    pub async fn clear_cards(&mut self) -> Result<(), SurfaceError> {
        self.run(Request::ClearCards { tab_id: self.tab_id }).await
    }

    async fn run(&mut self, request: Request) -> Result<(), SurfaceError> {
        let result = match self.send(request).await {
            Ok(_) => self.reconcile().await,
            Err(e) => Err(e.into()),
        };
        result.inspect_err(|e| self.report(e))
    }

    /// Generates cards for every highlight in the snapshot and stores them with the router.
    pub async fn generate_cards<G: CardGenerator>(&mut self, generator: &G) -> Result<usize, SurfaceError> {
        let result = self.try_generate(generator).await;
        match &result {
            Ok(count) => self.set_status(StatusKind::Success, &format!("Generated {} flashcards", count)),
            Err(e) => self.report(e),
        }
        result
    }

    async fn try_generate<G: CardGenerator>(&mut self, generator: &G) -> Result<usize, SurfaceError> {
        if self.highlights.is_empty() {
            return Err(ServiceError::EmptyInput("No highlights to generate flashcards from").into());
        }

        let drafts = generator.generate(&self.highlights).await?;
        let count = drafts.len();
        self.send(Request::AddCards {
            tab_id: self.tab_id,
            cards: drafts,
        })
        .await?;
        self.reconcile().await?;
        Ok(count)
    }

    /// Pushes the snapshot's cards to an outside tool. Returns how many made it.
    pub async fn export<E: CardExporter>(&mut self, exporter: &E) -> Result<usize, SurfaceError> {
        if self.cards.is_empty() {
            let e = SurfaceError::from(ServiceError::EmptyInput("No cards to export!"));
            self.report(&e);
            return Err(e);
        }

        let report = match exporter.export(&self.cards).await {
            Ok(report) => report,
            Err(e) => {
                let e = SurfaceError::from(e);
                self.report(&e);
                return Err(e);
            }
        };

        if report.needs_credential() {
            self.credential_prompt = true;
        }
        match report.first_error() {
            None if report.is_complete() => {
                self.set_status(StatusKind::Success, "Successfully exported cards!");
            }
            None => {}
            Some(e) => {
                let message = format!("Exported {} of {} cards: {}", report.exported(), self.cards.len(), e);
                self.set_status(StatusKind::Error, &message);
            }
        }
        Ok(report.exported())
    }

    /// Note for the snapshot, or an error when there is nothing to write.
    pub fn export_markdown(&mut self, updated: NaiveDate) -> Result<String, SurfaceError> {
        if self.highlights.is_empty() && self.cards.is_empty() {
            let e = SurfaceError::from(ServiceError::EmptyInput("Nothing to export"));
            self.report(&e);
            return Err(e);
        }
        let state = TabState {
            highlights: self.highlights.clone(),
            cards: self.cards.clone(),
            is_active: self.activation.is_active(),
        };
        self.set_status(StatusKind::Success, "Successfully exported markdown file");
        Ok(render_markdown(&state, updated))
    }

    fn set_status(&mut self, kind: StatusKind, message: &str) {
        self.status = Some(Status {
            kind,
            message: message.to_string(),
        });
    }

    fn report(&mut self, error: &SurfaceError) {
        let message = match error {
            SurfaceError::Relay(RelayError::Unreachable(_) | RelayError::Timeout) => UNREACHABLE_MESSAGE.to_string(),
            SurfaceError::Relay(RelayError::Rejected(reason)) => reason.clone(),
            SurfaceError::Service(e) => {
                if e.needs_credential() {
                    self.credential_prompt = true;
                }
                e.to_string()
            }
        };
        tracing::warn!(tab_id = self.tab_id, error = %message, "surface action failed");
        self.set_status(StatusKind::Error, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{ExportOutcome, ExportReport};
    use crate::router::MessageRouter;
    use crate::storage::MemoryStorage;
    use crate::store::FlashcardDraft;
    use std::sync::Arc;

    type TestRouter = Arc<MessageRouter<MemoryStorage>>;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn router() -> TestRouter {
        Arc::new(MessageRouter::new(Arc::new(MemoryStorage::new()), 64))
    }

    fn add(id: &str, text: &str) -> Request {
        Request::AddHighlight {
            tab_id: 1,
            id: id.to_string(),
            text: text.to_string(),
            context: "ctx".to_string(),
            url: "https://example.com".to_string(),
        }
    }

    struct EchoGenerator;

    impl CardGenerator for EchoGenerator {
        async fn generate(&self, highlights: &[Highlight]) -> Result<Vec<FlashcardDraft>, ServiceError> {
            Ok(highlights
                .iter()
                .map(|h| FlashcardDraft::new(&format!("What is {}?", h.text), &h.context))
                .collect())
        }
    }

    struct KeylessGenerator;

    impl CardGenerator for KeylessGenerator {
        async fn generate(&self, _highlights: &[Highlight]) -> Result<Vec<FlashcardDraft>, ServiceError> {
            Err(ServiceError::MissingCredential("Claude"))
        }
    }

    struct RejectingExporter;

    impl CardExporter for RejectingExporter {
        async fn export(&self, cards: &[Flashcard]) -> Result<ExportReport, ServiceError> {
            Ok(ExportReport {
                outcomes: vec![ExportOutcome {
                    card_id: cards[0].id.clone(),
                    result: Err(ServiceError::InvalidCredential),
                }],
                skipped: cards.len() - 1,
            })
        }
    }

    struct AcceptingExporter;

    impl CardExporter for AcceptingExporter {
        async fn export(&self, cards: &[Flashcard]) -> Result<ExportReport, ServiceError> {
            Ok(ExportReport {
                outcomes: cards
                    .iter()
                    .map(|c| ExportOutcome {
                        card_id: c.id.clone(),
                        result: Ok(()),
                    })
                    .collect(),
                skipped: 0,
            })
        }
    }

    struct Unreachable;

    impl Relay for Unreachable {
        async fn send(&self, _request: Request) -> Result<Response, RelayError> {
            Err(RelayError::Unreachable("no receiver".to_string()))
        }
    }

    #[tokio::test]
    async fn test_open_reconciles_snapshot() {
        let router = router();
        router.handle(add("a", "first")).await;
        router.handle(Request::ToggleActivation { tab_id: 1 }).await;

        let mut surface = Surface::new(1, router.clone(), TIMEOUT);
        surface.open().await.unwrap();

        assert_eq!(surface.activation(), Activation::Active);
        assert_eq!(surface.highlights().len(), 1);
        assert!(surface.status().is_none());
    }

    #[tokio::test]
    async fn test_toggle_settles_on_router_answer() {
        let router = router();
        let mut surface = Surface::new(1, router.clone(), TIMEOUT);
        surface.open().await.unwrap();

        assert_eq!(surface.toggle().await.unwrap(), Activation::Active);
        assert!(router.get_state(1).await.unwrap().is_active);
        assert_eq!(surface.toggle().await.unwrap(), Activation::Inactive);
        assert!(!router.get_state(1).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn test_toggle_reverts_when_unreachable() {
        let mut surface = Surface::new(1, Unreachable, TIMEOUT);

        assert!(surface.toggle().await.is_err());

        assert_eq!(surface.activation(), Activation::Inactive);
        let status = surface.status().unwrap();
        assert_eq!(status.kind, StatusKind::Error);
        assert_eq!(status.message, UNREACHABLE_MESSAGE);
    }

    #[tokio::test]
    async fn test_failed_toggle_persist_reverts() {
        let router = router();
        let mut surface = Surface::new(1, router.clone(), TIMEOUT);
        router.storage().set_fail_writes(true);

        assert!(surface.toggle().await.is_err());
        assert_eq!(surface.activation(), Activation::Inactive);
    }

    #[tokio::test]
    async fn test_notifications_update_snapshot() {
        let router = router();
        let mut surface = Surface::new(1, router.clone(), TIMEOUT);
        let mut rx = router.subscribe();

        router.handle(add("a", "first")).await;
        router.handle(Request::ToggleActivation { tab_id: 1 }).await;
        router.handle(Request::ToggleActivation { tab_id: 2 }).await;
        while let Ok(env) = rx.try_recv() {
            surface.apply(&env);
        }

        assert_eq!(surface.highlights()[0].id, "a");
        assert_eq!(surface.activation(), Activation::Active);
    }

    #[tokio::test]
    async fn test_remove_and_clear_actions() {
        let router = router();
        router.handle(add("a", "first")).await;
        router.handle(add("b", "second")).await;
        let mut surface = Surface::new(1, router.clone(), TIMEOUT);
        surface.open().await.unwrap();

        surface.remove_highlight("a").await.unwrap();
        assert_eq!(surface.highlights().len(), 1);

        surface.clear_highlights().await.unwrap();
        assert!(surface.highlights().is_empty());
        assert!(router.get_state(1).await.unwrap().highlights.is_empty());
    }

    #[tokio::test]
    async fn test_generate_then_remove_card_by_id() {
        let router = router();
        router.handle(add("a", "ATP")).await;
        router.handle(add("b", "ADP")).await;
        let mut surface = Surface::new(1, router.clone(), TIMEOUT);
        surface.open().await.unwrap();

        assert_eq!(surface.generate_cards(&EchoGenerator).await.unwrap(), 2);
        assert_eq!(surface.cards()[0].front, "What is ATP?");
        assert_eq!(surface.status().unwrap().kind, StatusKind::Success);

        let first = surface.cards()[0].id.clone();
        surface.remove_card(&first).await.unwrap();
        assert_eq!(surface.cards().len(), 1);
        assert_eq!(surface.cards()[0].front, "What is ADP?");

        surface.clear_cards().await.unwrap();
        assert!(router.get_state(1).await.unwrap().cards.is_empty());
    }

    #[tokio::test]
    async fn test_generate_without_highlights() {
        let router = router();
        let mut surface = Surface::new(1, router.clone(), TIMEOUT);
        surface.open().await.unwrap();

        assert!(surface.generate_cards(&EchoGenerator).await.is_err());
        assert_eq!(
            surface.status().unwrap().message,
            "No highlights to generate flashcards from"
        );
    }

    #[tokio::test]
    async fn test_missing_key_prompts_for_credential() {
        let router = router();
        router.handle(add("a", "ATP")).await;
        let mut surface = Surface::new(1, router.clone(), TIMEOUT);
        surface.open().await.unwrap();

        assert!(surface.generate_cards(&KeylessGenerator).await.is_err());

        assert!(surface.needs_credential());
        assert_eq!(surface.status().unwrap().message, "Please enter your Claude API key");
        surface.credential_entered();
        assert!(!surface.needs_credential());
    }

    #[tokio::test]
    async fn test_export_unauthorized_reprompts() {
        let router = router();
        router
            .handle(Request::AddCards { tab_id: 1, cards: vec![FlashcardDraft::new("Q", "A")] })
            .await;
        let mut surface = Surface::new(1, router.clone(), TIMEOUT);
        surface.open().await.unwrap();

        assert_eq!(surface.export(&RejectingExporter).await.unwrap(), 0);

        assert!(surface.needs_credential());
        assert_eq!(surface.status().unwrap().kind, StatusKind::Error);
        assert!(surface.status().unwrap().message.ends_with("Invalid API key"));
    }

    #[tokio::test]
    async fn test_export_requires_cards() {
        let router = router();
        let mut surface = Surface::new(1, router.clone(), TIMEOUT);
        surface.open().await.unwrap();

        assert!(surface.export(&AcceptingExporter).await.is_err());
        assert_eq!(surface.status().unwrap().message, "No cards to export!");
    }

    #[tokio::test]
    async fn test_export_success() {
        let router = router();
        router
            .handle(Request::AddCards {
                tab_id: 1,
                cards: vec![FlashcardDraft::new("Q1", "A1"), FlashcardDraft::new("Q2", "A2")],
            })
            .await;
        let mut surface = Surface::new(1, router.clone(), TIMEOUT);
        surface.open().await.unwrap();

        assert_eq!(surface.export(&AcceptingExporter).await.unwrap(), 2);
        assert_eq!(surface.status().unwrap().kind, StatusKind::Success);
        assert!(!surface.needs_credential());
    }

    #[tokio::test]
    async fn test_export_markdown() {
        let router = router();
        let mut surface = Surface::new(1, router.clone(), TIMEOUT);
        surface.open().await.unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        assert!(surface.export_markdown(date).is_err());

        router.handle(add("a", "first")).await;
        surface.open().await.unwrap();
        let md = surface.export_markdown(date).unwrap();
        assert!(md.contains("updated: 2024-05-01"));
        assert!(md.contains("### Highlights\nfirst"));
    }
}
