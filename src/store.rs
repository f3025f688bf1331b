//! Per-tab highlight store.
//!
//! `TabState` is the authoritative record of one tab: its highlights, the flashcards
//! derived from them and whether page selections are currently captured. Only the
//! router mutates it.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RouterError;

pub type TabId = i64;

pub const CARD_SEPARATOR: &str = "---";

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Opaque id, unique within this process.
pub fn generate_id(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(ID_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub url: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardDraft {
    pub front: String,
    pub back: String,
}

impl FlashcardDraft {
    pub fn new(front: &str, back: &str) -> Self {
        FlashcardDraft {
            front: front.to_string(),
            back: back.to_string(),
        }
    }

    /// `front---back`, the export wire form.
    pub fn to_wire(&self) -> String {
        format!("{}{}{}", self.front, CARD_SEPARATOR, self.back)
    }

    /// Parses the wire form. Text after a second separator stays in the back.
    pub fn parse(raw: &str) -> Option<Self> {
        let (front, back) = raw.split_once(CARD_SEPARATOR)?;
        let front = front.trim();
        if front.is_empty() {
            return None;
        }
        Some(FlashcardDraft::new(front, back.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: String,
    pub front: String,
    pub back: String,
}

impl Flashcard {
    pub fn to_wire(&self) -> String {
        format!("{}{}{}", self.front, CARD_SEPARATOR, self.back)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabState {
    #[serde(default)]
    pub highlights: Vec<Highlight>,
    #[serde(default)]
    pub cards: Vec<Flashcard>,
    #[serde(default)]
    pub is_active: bool,
}

impl TabState {
    pub fn add_highlight(&mut self, text: &str, context: &str, url: &str) -> Highlight {
        let highlight = Highlight {
            id: generate_id(text),
            text: text.trim().to_string(),
            context: context.to_string(),
            url: url.to_string(),
            timestamp: now_millis(),
        };
        self.highlights.push(highlight.clone());
        highlight
    }

    /// Appends a highlight whose id was chosen by the page.
    pub fn insert_highlight(&mut self, highlight: Highlight) -> Result<(), RouterError> {
        if self.highlight(&highlight.id).is_some() {
            return Err(RouterError::DuplicateHighlight(highlight.id));
        }
        self.highlights.push(highlight);
        Ok(())
    }

    pub fn highlight(&self, id: &str) -> Option<&Highlight> {
        self.highlights.iter().find(|h| h.id == id)
    }

    /// Returns whether anything was removed.
    pub fn remove_highlight(&mut self, id: &str) -> bool {
        let before = self.highlights.len();
        self.highlights.retain(|h| h.id != id);
        self.highlights.len() != before
    }

    pub fn clear_highlights(&mut self) {
        self.highlights.clear();
    }

    /// Appends drafts as cards with fresh ids. Never replaces existing cards.
    pub fn add_cards(&mut self, drafts: Vec<FlashcardDraft>) -> usize {
        let count = drafts.len();
        self.cards.extend(drafts.into_iter().map(|d| Flashcard {
            id: generate_id(&d.front),
            front: d.front,
            back: d.back,
        }));
        count
    }

    pub fn remove_card_at(&mut self, index: usize) -> Result<Flashcard, RouterError> {
        if index >= self.cards.len() {
            return Err(RouterError::CardIndexOutOfRange(index));
        }
        Ok(self.cards.remove(index))
    }

    pub fn remove_card(&mut self, id: &str) -> Option<Flashcard> {
        let index = self.cards.iter().position(|c| c.id == id)?;
        Some(self.cards.remove(index))
    }

    pub fn clear_cards(&mut self) {
        self.cards.clear();
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn toggle_active(&mut self) -> bool {
        self.is_active = !self.is_active;
        self.is_active
    }
}
