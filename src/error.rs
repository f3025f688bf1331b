use std::{error::Error, fmt};

use crate::dom::NodeId;

#[derive(Debug)]
pub enum RouterError {
    DuplicateHighlight(String),
    CardIndexOutOfRange(usize),
    StorageError(anyhow::Error),
}

impl std::error::Error for RouterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use RouterError::*;
        match self {
            StorageError(e) => Some(e.as_ref() as &dyn Error),
            _ => None,
        }
    }
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use RouterError::*;
        match self {
            DuplicateHighlight(id) => write!(f, "DuplicateHighlight: {}", id),
            CardIndexOutOfRange(i) => write!(f, "CardIndexOutOfRange: {}", i),
            StorageError(_) => write!(f, "StorageError"),
        }
    }
}

impl From<anyhow::Error> for RouterError {
    fn from(error: anyhow::Error) -> Self {
        RouterError::StorageError(error)
    }
}

/// Failure to get an answer from another context.
#[derive(Debug)]
pub enum RelayError {
    Unreachable(String),
    Timeout,
    Rejected(String),
}

impl std::error::Error for RelayError {}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use RelayError::*;
        match self {
            Unreachable(s) => write!(f, "Unreachable: {}", s),
            Timeout => write!(f, "Timeout"),
            Rejected(s) => write!(f, "Rejected: {}", s),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Please enter your {0} API key")]
    MissingCredential(&'static str),
    #[error("{0}")]
    EmptyInput(&'static str),
    #[error("Invalid API key")]
    InvalidCredential,
    #[error("Access denied. Please check your API key and try again.")]
    AccessDenied,
    #[error("Too many requests. Please try again later")]
    RateLimited,
    #[error("Request failed (HTTP {0})")]
    Failed(u16),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("unexpected response: {0}")]
    MalformedResponse(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ServiceError {
    /// Maps a non-success status to the user-facing category.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ServiceError::InvalidCredential,
            403 => ServiceError::AccessDenied,
            429 => ServiceError::RateLimited,
            other => ServiceError::Failed(other),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ServiceError::InvalidCredential)
    }

    /// Missing or rejected key; the user has to enter it again.
    pub fn needs_credential(&self) -> bool {
        matches!(self, ServiceError::InvalidCredential | ServiceError::MissingCredential(_))
    }
}

/// Failure of a user action started from the UI surface.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),
    #[error("node {0:?} is not a text node")]
    NotText(NodeId),
    #[error("node {0:?} has no parent")]
    Detached(NodeId),
    #[error("offset {offset} out of bounds for node {node:?} of length {len}")]
    OffsetOutOfBounds { node: NodeId, offset: usize, len: usize },
    #[error("invalid range: {0}")]
    InvalidRange(&'static str),
}
