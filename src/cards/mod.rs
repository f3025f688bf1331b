//! Flashcard collaborators: generation from highlights and export to outside tools.

pub mod generator;
pub mod markdown;
pub mod mochi;

use std::future::Future;

use crate::error::ServiceError;
use crate::store::{Flashcard, FlashcardDraft, Highlight};

pub use generator::{AnthropicGenerator, parse_cards};
pub use markdown::{obsidian_link, render_markdown};
pub use mochi::MochiExporter;

pub trait CardGenerator: Send + Sync {
    fn generate(
        &self,
        highlights: &[Highlight],
    ) -> impl Future<Output = Result<Vec<FlashcardDraft>, ServiceError>> + Send;
}

pub trait CardExporter: Send + Sync {
    fn export(&self, cards: &[Flashcard]) -> impl Future<Output = Result<ExportReport, ServiceError>> + Send;
}

#[derive(Debug)]
pub struct ExportOutcome {
    pub card_id: String,
    pub result: Result<(), ServiceError>,
}

/// One outcome per card that was attempted, in card order.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub outcomes: Vec<ExportOutcome>,
    pub skipped: usize,
}

impl ExportReport {
    pub fn exported(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.exported()
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0 && self.skipped == 0
    }

    pub fn first_error(&self) -> Option<&ServiceError> {
        self.outcomes.iter().find_map(|o| o.result.as_ref().err())
    }

    /// True when the remote side rejected the credential.
    pub fn needs_credential(&self) -> bool {
        self.first_error().is_some_and(ServiceError::is_unauthorized)
    }
}
