//! Message contract between the page, the router and the UI surface.

use serde::{Deserialize, Serialize};

use crate::store::{Flashcard, FlashcardDraft, Highlight, TabId, TabState};

/// Requests accepted by the router. Every request names its tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Request {
    GetState {
        tab_id: TabId,
    },
    ToggleActivation {
        tab_id: TabId,
    },
    AddHighlight {
        tab_id: TabId,
        id: String,
        text: String,
        #[serde(default)]
        context: String,
        #[serde(default)]
        url: String,
    },
    RemoveHighlight {
        tab_id: TabId,
        id: String,
    },
    ClearHighlights {
        tab_id: TabId,
    },
    AddCards {
        tab_id: TabId,
        cards: Vec<FlashcardDraft>,
    },
    /// Positional removal; the index must come from an up-to-date snapshot.
    RemoveCard {
        tab_id: TabId,
        index: usize,
    },
    RemoveCardById {
        tab_id: TabId,
        id: String,
    },
    ClearCards {
        tab_id: TabId,
    },
    CloseTab {
        tab_id: TabId,
    },
}

impl Request {
    pub fn tab_id(&self) -> TabId {
        use Request::*;
        match self {
            GetState { tab_id }
            | ToggleActivation { tab_id }
            | AddHighlight { tab_id, .. }
            | RemoveHighlight { tab_id, .. }
            | ClearHighlights { tab_id }
            | AddCards { tab_id, .. }
            | RemoveCard { tab_id, .. }
            | RemoveCardById { tab_id, .. }
            | ClearCards { tab_id }
            | CloseTab { tab_id } => *tab_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        use Request::*;
        match self {
            GetState { .. } => "GET_STATE",
            ToggleActivation { .. } => "TOGGLE_ACTIVATION",
            AddHighlight { .. } => "ADD_HIGHLIGHT",
            RemoveHighlight { .. } => "REMOVE_HIGHLIGHT",
            ClearHighlights { .. } => "CLEAR_HIGHLIGHTS",
            AddCards { .. } => "ADD_CARDS",
            RemoveCard { .. } => "REMOVE_CARD",
            RemoveCardById { .. } => "REMOVE_CARD_BY_ID",
            ClearCards { .. } => "CLEAR_CARDS",
            CloseTab { .. } => "CLOSE_TAB",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Ack(Ack),
    State(TabState),
}

impl Response {
    pub fn ok() -> Self {
        Response::Ack(Ack {
            success: true,
            error: None,
        })
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Response::Ack(Ack {
            success: false,
            error: Some(msg.into()),
        })
    }

    pub fn is_success(&self) -> bool {
        match self {
            Response::Ack(ack) => ack.success,
            Response::State(_) => true,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Response::Ack(ack) => ack.error.as_deref(),
            Response::State(_) => None,
        }
    }

    pub fn into_state(self) -> Option<TabState> {
        match self {
            Response::State(state) => Some(state),
            Response::Ack(_) => None,
        }
    }
}

/// One-way change notifications. Delivery is at-most-once and best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Notification {
    ActivationChanged {
        is_active: bool,
    },
    #[serde(rename = "REMOVE_HIGHLIGHT_CONTENT_SCRIPT")]
    RemoveHighlight {
        id: String,
    },
    #[serde(rename = "CLEAR_HIGHLIGHTS_CONTENT_SCRIPT")]
    ClearHighlights,
    HighlightsUpdated {
        highlights: Vec<Highlight>,
    },
    CardsUpdated {
        cards: Vec<Flashcard>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    #[serde(alias = "content_script")]
    Content,
    Surface,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub tab_id: TabId,
    pub audience: Audience,
    pub notification: Notification,
}
