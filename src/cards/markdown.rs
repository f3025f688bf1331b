use chrono::NaiveDate;

use crate::config::Obsidian;
use crate::error::ServiceError;
use crate::store::TabState;

pub const MARKDOWN_FILE_NAME: &str = "cardmark_flashcards.md";

/// Renders a tab as a note: front matter, then highlights, then cards in wire form.
pub fn render_markdown(state: &TabState, updated: NaiveDate) -> String {
    let url = state.highlights.first().map(|h| h.url.as_str()).unwrap_or_default();
    let highlights: Vec<&str> = state.highlights.iter().map(|h| h.text.as_str()).collect();
    let cards: Vec<String> = state.cards.iter().map(|c| c.to_wire()).collect();

    format!(
        "---\nurl: {}\nupdated: {}\n---\n## Highlights and Flashcards\n\n### Highlights\n{}\n\n### Flashcards\n{}\n",
        url,
        updated.format("%Y-%m-%d"),
        highlights.join("\n"),
        cards.join("\n"),
    )
}

/// Deep link that asks Obsidian to create the note in the configured vault.
pub fn obsidian_link(cfg: &Obsidian, content: &str) -> Result<String, ServiceError> {
    if cfg.vault.trim().is_empty() {
        return Err(ServiceError::NotConfigured("Obsidian vault"));
    }
    Ok(format!(
        "obsidian://new?vault={}&file={}&content={}",
        urlencoding::encode(&cfg.vault),
        urlencoding::encode(&cfg.file_name),
        urlencoding::encode(content),
    ))
}
