use super::document::{Document, NodeId, char_len, slice_chars};
use super::range::TextRange;
use crate::error::DomError;

/// Ordered-sibling view of a tree, enough to walk outward from a node.
pub trait SiblingTree {
    type Node: Copy;

    fn previous_sibling(&self, node: Self::Node) -> Option<Self::Node>;
    fn next_sibling(&self, node: Self::Node) -> Option<Self::Node>;
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;
    fn text_of(&self, node: Self::Node) -> String;
}

impl SiblingTree for Document {
    type Node = NodeId;

    fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        Document::previous_sibling(self, node)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        Document::next_sibling(self, node)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        Document::parent(self, node)
    }

    fn text_of(&self, node: NodeId) -> String {
        self.text_content(node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Forward,
}

/// Accumulates text moving away from `from`, starting with `seed`, until a piece
/// contains a boundary character or the siblings run out.
///
/// Backward keeps what follows the last boundary in the stopping piece; forward keeps
/// everything up to and including the first one.
pub fn walk_outward<T: SiblingTree>(
    tree: &T,
    from: T::Node,
    direction: Direction,
    seed: &str,
    is_boundary: impl Fn(char) -> bool,
) -> String {
    let mut acc = String::new();
    let mut piece = Some(seed.to_string());
    let mut current = from;

    while let Some(text) = piece {
        match direction {
            Direction::Backward => {
                if let Some(pos) = text.rfind(&is_boundary) {
                    let cut = pos + text[pos..].chars().next().map_or(0, char::len_utf8);
                    acc.insert_str(0, &text[cut..]);
                    break;
                }
                acc.insert_str(0, &text);
            }
            Direction::Forward => {
                if let Some(pos) = text.find(&is_boundary) {
                    let cut = pos + text[pos..].chars().next().map_or(0, char::len_utf8);
                    acc.push_str(&text[..cut]);
                    break;
                }
                acc.push_str(&text);
            }
        }

        let next = match direction {
            Direction::Backward => tree.previous_sibling(current),
            Direction::Forward => tree.next_sibling(current),
        };
        piece = next.map(|n| {
            current = n;
            tree.text_of(n)
        });
    }

    acc
}

fn is_sentence_end(c: char) -> bool {
    c == '.'
}

/// Sentence around the selection. Falls back to the parent element's full text when
/// the walk yields nothing.
pub fn compute_context(doc: &Document, range: &TextRange) -> Result<String, DomError> {
    let selected = range.text(doc)?;

    let start_text = doc.text(range.start.node).unwrap_or_default();
    let end_text = doc.text(range.end.node).unwrap_or_default();
    let before = slice_chars(&start_text, 0, range.start.offset);
    let after = slice_chars(&end_text, range.end.offset, char_len(&end_text));

    let leading = walk_outward(doc, range.start.node, Direction::Backward, &before, is_sentence_end);
    let trailing = walk_outward(doc, range.end.node, Direction::Forward, &after, is_sentence_end);

    let sentence = format!("{}{}{}", leading, selected, trailing).trim().to_string();
    if !sentence.is_empty() {
        return Ok(sentence);
    }

    let parent_text = doc
        .parent(range.start.node)
        .map(|p| doc.text_content(p))
        .unwrap_or_default();
    Ok(parent_text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_paragraph(text: &str) -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.append_child(doc.root(), p).unwrap();
        let t = doc.create_text(text);
        doc.append_child(p, t).unwrap();
        (doc, p, t)
    }

    #[test]
    fn test_no_punctuation_uses_full_parent_text() {
        let (doc, p, t) = single_paragraph("hello world");

        let context = compute_context(&doc, &TextRange::within(t, 6, 11)).unwrap();

        assert_eq!(context, doc.text_content(p));
        assert_eq!(context, "hello world");
    }

    #[test]
    fn test_bounded_by_sentence_terminators() {
        let (doc, _, t) = single_paragraph("One. Two three four. Five");

        let context = compute_context(&doc, &TextRange::within(t, 9, 14)).unwrap();

        assert_eq!(context, "Two three four.");
    }

    #[test]
    fn test_walks_across_siblings() {
        // <p>Intro. See <b>the bold</b> part here. Outro</p>
        let mut doc = Document::new();
        let p = doc.create_element("p");
        let b = doc.create_element("b");
        doc.append_child(doc.root(), p).unwrap();
        let lead = doc.create_text("Intro. See ");
        let bold = doc.create_text("the bold");
        let tail = doc.create_text(" part here. Outro");
        doc.append_child(p, lead).unwrap();
        doc.append_child(p, b).unwrap();
        doc.append_child(b, bold).unwrap();
        doc.append_child(p, tail).unwrap();

        let context = compute_context(&doc, &TextRange::between(lead, 7, tail, 5)).unwrap();

        assert_eq!(context, "See the bold part here.");
    }

    #[test]
    fn test_whitespace_selection_falls_back_to_parent() {
        let (doc, _, t) = single_paragraph("   ");

        let context = compute_context(&doc, &TextRange::within(t, 0, 3)).unwrap();

        assert_eq!(context, "");
    }

    #[test]
    fn test_walk_outward_without_boundary_exhausts_siblings() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        doc.append_child(doc.root(), p).unwrap();
        let a = doc.create_text("a ");
        let b = doc.create_text("b ");
        let c = doc.create_text("c");
        for n in [a, b, c] {
            doc.append_child(p, n).unwrap();
        }

        assert_eq!(walk_outward(&doc, c, Direction::Backward, "", |ch| ch == '.'), "a b ");
        assert_eq!(walk_outward(&doc, a, Direction::Forward, "", |ch| ch == '.'), "b c");
    }
}
