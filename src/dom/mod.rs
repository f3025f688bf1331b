//! Page Document Module
//!
//! An engine-independent model of the page a content script runs in, and the
//! highlighter that marks user selections inside it.
//!
//! # Architecture
//!
//! - `Document` is a page parsed with html5ever into an `RcDom`, its nodes addressed by `NodeId`
//! - `TextRange` is a selection between two text-node boundaries
//! - `highlighter` wraps the selected sub-ranges in marker elements and unwraps them again
//! - `context` recovers the sentence surrounding a selection by walking siblings outward
//!
//! Markers carry the highlight id in `data-highlight-id`. The attribute is a lookup key
//! only: the highlight record lives in the tab store, not in the page.

mod context;
mod document;
mod highlighter;
mod range;

pub use context::{Direction, SiblingTree, compute_context, walk_outward};
pub use document::{Document, NodeId};
pub use highlighter::{
    Feedback, HIGHLIGHT_ID_ATTR, MARKER_CLASS, MARKER_TAG, Pointer, clear_markup, dematerialize,
    highlight_at, materialize,
};
pub use range::{Boundary, Segment, TextRange};
