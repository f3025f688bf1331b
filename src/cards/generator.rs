use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::CardGenerator;
use crate::config::Ai;
use crate::error::ServiceError;
use crate::store::{FlashcardDraft, Highlight};

/// Separates cards in a generated reply.
pub const REPLY_CARD_SEPARATOR: &str = "*****";

const API_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str =
    "You create perfect Anki flashcards, in accordance with the twenty rules of formulating knowledge";

const CARD_PROMPT: &str = "Turn the provided text into atomic flashcards for spaced repetition.
Each card asks one specific question in clear language and tests understanding rather than recognition.
Answers are concise, ideally no more than 10-15 words; for problem solving show the key steps.
Break complex ideas into several cards, avoid compound questions and enumerations, and add context
only when the text assumes background knowledge.

Write every card in this format:
Question
---
Answer
#topic tags

Separate cards with *****.
Do not say anything besides text that will appear in the flashcards.";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Splits a generated reply into drafts. Blocks without a front are dropped.
pub fn parse_cards(reply: &str) -> Vec<FlashcardDraft> {
    reply
        .split(REPLY_CARD_SEPARATOR)
        .filter_map(FlashcardDraft::parse)
        .collect()
}

pub struct AnthropicGenerator {
    client: Client,
    cfg: Ai,
}

impl AnthropicGenerator {
    pub fn new(cfg: &Ai) -> Self {
        AnthropicGenerator {
            client: Client::new(),
            cfg: cfg.clone(),
        }
    }

    async fn generate_one(&self, api_key: &str, highlight: &Highlight) -> Result<Vec<FlashcardDraft>, ServiceError> {
        let body = MessagesRequest {
            model: &self.cfg.model,
            max_tokens: self.cfg.max_tokens,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: format!("{}\n\nText: {}\nContext: {}", CARD_PROMPT, highlight.text, highlight.context),
            }],
        };

        let response = self
            .client
            .post(&self.cfg.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), detail = %detail, "card generation rejected");
            return Err(ServiceError::from_status(status.as_u16()));
        }

        let reply: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;
        let text = reply
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| ServiceError::MalformedResponse("reply has no text".to_string()))?;

        Ok(parse_cards(&text))
    }
}

impl CardGenerator for AnthropicGenerator {
    async fn generate(&self, highlights: &[Highlight]) -> Result<Vec<FlashcardDraft>, ServiceError> {
        let api_key = self
            .cfg
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ServiceError::MissingCredential("Claude"))?;
        if highlights.is_empty() {
            return Err(ServiceError::EmptyInput("No highlights to generate flashcards from"));
        }

        let mut drafts = Vec::new();
        for highlight in highlights {
            let cards = self.generate_one(api_key, highlight).await?;
            tracing::debug!(highlight_id = %highlight.id, cards = cards.len(), "generated cards");
            drafts.extend(cards);
        }

        tracing::info!(highlights = highlights.len(), cards = drafts.len(), "card generation finished");
        Ok(drafts)
    }
}
