use super::document::{Document, NodeId, char_len, slice_chars};
use crate::error::DomError;

/// A position inside a text node, counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

/// The part of one text node covered by a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub node: NodeId,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRange {
    pub start: Boundary,
    pub end: Boundary,
}

impl TextRange {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        TextRange { start, end }
    }

    pub fn within(node: NodeId, start: usize, end: usize) -> Self {
        TextRange {
            start: Boundary { node, offset: start },
            end: Boundary { node, offset: end },
        }
    }

    pub fn between(start_node: NodeId, start: usize, end_node: NodeId, end: usize) -> Self {
        TextRange {
            start: Boundary {
                node: start_node,
                offset: start,
            },
            end: Boundary {
                node: end_node,
                offset: end,
            },
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    fn check_boundary(doc: &Document, b: &Boundary) -> Result<(), DomError> {
        let text = doc.text(b.node).ok_or(DomError::NotText(b.node))?;
        let len = char_len(&text);
        if b.offset > len {
            return Err(DomError::OffsetOutOfBounds {
                node: b.node,
                offset: b.offset,
                len,
            });
        }
        if !doc.is_attached(b.node) {
            return Err(DomError::Detached(b.node));
        }
        Ok(())
    }

    /// Every text node with a non-empty overlap, in document order. Nodes outside the
    /// range never appear.
    pub fn segments(&self, doc: &Document) -> Result<Vec<Segment>, DomError> {
        Self::check_boundary(doc, &self.start)?;
        Self::check_boundary(doc, &self.end)?;

        let order = doc.text_nodes();
        let first = order
            .iter()
            .position(|n| *n == self.start.node)
            .ok_or(DomError::Detached(self.start.node))?;
        let last = order
            .iter()
            .position(|n| *n == self.end.node)
            .ok_or(DomError::Detached(self.end.node))?;

        if first > last || (first == last && self.start.offset > self.end.offset) {
            return Err(DomError::InvalidRange("end precedes start"));
        }

        let segments = order[first..=last]
            .iter()
            .filter_map(|node| {
                let len = char_len(&doc.text(*node).unwrap_or_default());
                let start = if *node == self.start.node { self.start.offset } else { 0 };
                let end = if *node == self.end.node { self.end.offset } else { len };
                (start < end).then_some(Segment {
                    node: *node,
                    start,
                    end,
                })
            })
            .collect();

        Ok(segments)
    }

    /// Selected text, untrimmed.
    pub fn text(&self, doc: &Document) -> Result<String, DomError> {
        Ok(self
            .segments(doc)?
            .iter()
            .map(|s| slice_chars(&doc.text(s.node).unwrap_or_default(), s.start, s.end))
            .collect())
    }
}
