use std::collections::BTreeSet;

use super::document::{Document, NodeId, char_len};
use super::range::{Segment, TextRange};
use crate::error::DomError;

pub const MARKER_TAG: &str = "mark";
pub const MARKER_CLASS: &str = "cardmark-highlight";
pub const HIGHLIGHT_ID_ATTR: &str = "data-highlight-id";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pointer {
    pub x: f64,
    pub y: f64,
}

/// Transient acknowledgment shown next to the pointer after a highlight is saved.
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub x: f64,
    pub y: f64,
    pub message: &'static str,
}

impl Feedback {
    const OFFSET: f64 = 10.0;

    pub fn at(pointer: Pointer) -> Self {
        Feedback {
            x: pointer.x + Self::OFFSET,
            y: pointer.y + Self::OFFSET,
            message: "✓ Highlight saved!",
        }
    }
}

/// Wraps every selected sub-range in its own marker element.
///
/// A node that fails to wrap is skipped; the call only fails when nothing was wrapped.
pub fn materialize(doc: &mut Document, range: &TextRange, highlight_id: &str) -> bool {
    if range.is_collapsed() {
        tracing::debug!(highlight_id, "collapsed range, nothing to highlight");
        return false;
    }

    let segments = match range.segments(doc) {
        Ok(segments) => segments,
        Err(e) => {
            tracing::warn!(highlight_id, error = %e, "cannot resolve selection range");
            return false;
        }
    };

    let mut wrapped = 0;
    for segment in &segments {
        match wrap_segment(doc, segment, highlight_id) {
            Ok(_) => wrapped += 1,
            Err(e) => {
                tracing::warn!(highlight_id, node = ?segment.node, error = %e, "failed to highlight node, skipping");
            }
        }
    }

    if wrapped < segments.len() {
        tracing::info!(highlight_id, wrapped, total = segments.len(), "partially highlighted selection");
    }
    wrapped > 0
}

fn wrap_segment(doc: &mut Document, segment: &Segment, highlight_id: &str) -> Result<NodeId, DomError> {
    let node = segment.node;
    let len = char_len(&doc.text(node).ok_or(DomError::NotText(node))?);
    if segment.start >= segment.end || segment.end > len {
        return Err(DomError::OffsetOutOfBounds {
            node,
            offset: segment.end,
            len,
        });
    }
    doc.parent(node).ok_or(DomError::Detached(node))?;

    if segment.end < len {
        doc.split_text(node, segment.end)?;
    }
    let target = if segment.start > 0 {
        doc.split_text(node, segment.start)?
    } else {
        node
    };

    let marker = doc.create_element(MARKER_TAG);
    doc.set_attribute(marker, "class", MARKER_CLASS)?;
    doc.set_attribute(marker, HIGHLIGHT_ID_ATTR, highlight_id)?;
    doc.replace_with(target, marker)?;
    doc.append_child(marker, target)?;
    Ok(marker)
}

/// Unwraps every marker carrying `highlight_id`, leaving its children in place. Markup
/// of other highlights inside it survives. Returns false when the page holds no such
/// marker.
pub fn dematerialize(doc: &mut Document, highlight_id: &str) -> bool {
    let markers = doc.find_by_attribute(HIGHLIGHT_ID_ATTR, highlight_id);
    if markers.is_empty() {
        tracing::debug!(highlight_id, "no markup found for highlight");
        return false;
    }

    for marker in markers {
        if let Err(e) = unwrap_marker(doc, marker) {
            tracing::warn!(highlight_id, error = %e, "failed to remove highlight markup");
        }
    }
    true
}

fn unwrap_marker(doc: &mut Document, marker: NodeId) -> Result<(), DomError> {
    let parent = doc.parent(marker).ok_or(DomError::Detached(marker))?;
    for child in doc.children(marker) {
        doc.insert_before(parent, child, Some(marker))?;
    }
    doc.detach(marker)?;
    doc.rejoin_split_text(parent)
}

/// Strips all highlight markup from the page, returning the ids that were removed.
pub fn clear_markup(doc: &mut Document) -> Vec<String> {
    let ids: BTreeSet<String> = doc
        .find_by_attribute("class", MARKER_CLASS)
        .into_iter()
        .filter_map(|m| doc.attribute(m, HIGHLIGHT_ID_ATTR))
        .collect();

    for id in &ids {
        dematerialize(doc, id);
    }
    ids.into_iter().collect()
}

/// Id of the highlight enclosing `node`, if any.
pub fn highlight_at(doc: &Document, node: NodeId) -> Option<String> {
    let mut current = Some(node);
    while let Some(n) = current {
        if doc.attribute(n, "class").as_deref() == Some(MARKER_CLASS) {
            return doc.attribute(n, HIGHLIGHT_ID_ATTR);
        }
        current = doc.parent(n);
    }
    None
}
