use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use html5ever::serialize::{SerializeOpts, TraversalScope, serialize};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, TreeSink};
use html5ever::{Attribute, LocalName, QualName, namespace_url, ns, parse_document};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};

use crate::error::DomError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A parsed page rooted at its `body`.
///
/// Nodes live in an `RcDom`; `NodeId`s index the handles this document has seen, so a
/// node keeps its id after it is detached. Text nodes produced by `split_text` remember
/// where they came from and only those are joined back by `rejoin_split_text`.
pub struct Document {
    dom: RcDom,
    root: NodeId,
    nodes: Vec<Handle>,
    ids: HashMap<*const Node, NodeId>,
    splits: HashMap<NodeId, NodeId>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty page.
    pub fn new() -> Self {
        Self::parse("")
    }

    pub fn parse(html: &str) -> Self {
        let mut dom = parse_document(RcDom::default(), Default::default()).one(html);
        let body = match find_element(&dom.document, "body") {
            Some(body) => body,
            None => {
                let body = dom.create_element(html_name("body"), Vec::new(), ElementFlags::default());
                dom.document.children.borrow_mut().push(body.clone());
                body.parent.set(Some(Rc::downgrade(&dom.document)));
                body
            }
        };

        let mut doc = Document {
            dom,
            root: NodeId(0),
            nodes: Vec::new(),
            ids: HashMap::new(),
            splits: HashMap::new(),
        };
        doc.root = doc.register_tree(&body);
        doc
    }

    fn register(&mut self, handle: Handle) -> NodeId {
        let key = Rc::as_ptr(&handle);
        if let Some(id) = self.ids.get(&key) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(handle);
        self.ids.insert(key, id);
        id
    }

    fn register_tree(&mut self, handle: &Handle) -> NodeId {
        let id = self.register(handle.clone());
        for child in handle.children.borrow().iter() {
            self.register_tree(child);
        }
        id
    }

    fn id_of(&self, handle: &Handle) -> Option<NodeId> {
        self.ids.get(&Rc::as_ptr(handle)).copied()
    }

    fn handle(&self, id: NodeId) -> Result<&Handle, DomError> {
        self.nodes.get(id.0).ok_or(DomError::UnknownNode(id))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let handle = self
            .dom
            .create_element(html_name(tag), Vec::new(), ElementFlags::default());
        self.register(handle)
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.register(Node::new(NodeData::Text {
            contents: std::cell::RefCell::new(StrTendril::from_slice(text)),
        }))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.handle(id).map(|h| &h.data), Ok(NodeData::Text { .. }))
    }

    fn is_element(&self, id: NodeId) -> bool {
        matches!(self.handle(id).map(|h| &h.data), Ok(NodeData::Element { .. }))
    }

    pub fn tag(&self, id: NodeId) -> Option<String> {
        match &self.handle(id).ok()?.data {
            NodeData::Element { name, .. } => Some(name.local.to_string()),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<String> {
        match &self.handle(id).ok()?.data {
            NodeData::Text { contents } => Some(contents.borrow().to_string()),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let parent = parent_handle(self.handle(id).ok()?)?;
        self.id_of(&parent)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match self.handle(id) {
            Ok(handle) => handle
                .children
                .borrow()
                .iter()
                .filter_map(|c| self.id_of(c))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn index_in_parent(&self, id: NodeId) -> Option<(Handle, usize)> {
        let handle = self.handle(id).ok()?;
        let parent = parent_handle(handle)?;
        let idx = parent
            .children
            .borrow()
            .iter()
            .position(|c| Rc::ptr_eq(c, handle))?;
        Some((parent, idx))
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, idx) = self.index_in_parent(id)?;
        let sibling = parent.children.borrow().get(idx.checked_sub(1)?).cloned()?;
        self.id_of(&sibling)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, idx) = self.index_in_parent(id)?;
        let sibling = parent.children.borrow().get(idx + 1).cloned()?;
        self.id_of(&sibling)
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        match &self.handle(id).ok()?.data {
            NodeData::Element { attrs, .. } => attrs
                .borrow()
                .iter()
                .find(|attr| attr.name.local.as_ref() == name)
                .map(|attr| attr.value.to_string()),
            _ => None,
        }
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let NodeData::Element { attrs, .. } = &self.handle(id)?.data else {
            return Err(DomError::InvalidRange("attributes require an element"));
        };
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|attr| attr.name.local.as_ref() == name) {
            Some(attr) => attr.value = StrTendril::from_slice(value),
            None => attrs.push(Attribute {
                name: QualName::new(None, ns!(), LocalName::from(name)),
                value: StrTendril::from_slice(value),
            }),
        }
        Ok(())
    }

    /// Concatenated text of the node and all its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Ok(handle) = self.handle(id) {
            collect_text(handle, &mut out);
        }
        out
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<(), DomError> {
        match &self.handle(id)?.data {
            NodeData::Text { contents } => {
                *contents.borrow_mut() = StrTendril::from_slice(text);
                Ok(())
            }
            _ => Err(DomError::NotText(id)),
        }
    }

    /// Removes the node from its parent. A detached node is left untouched.
    pub fn detach(&mut self, id: NodeId) -> Result<(), DomError> {
        let handle = self.handle(id)?.clone();
        if let Some(parent) = parent_handle(&handle) {
            parent.children.borrow_mut().retain(|c| !Rc::ptr_eq(c, &handle));
        }
        handle.parent.set(None);
        Ok(())
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.parent(node) {
                Some(p) => node = p,
                None => return false,
            }
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        if !self.is_element(parent) {
            return Err(DomError::NotText(parent));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(DomError::InvalidRange("cannot insert a node into itself"));
        }
        self.detach(child)?;

        let parent_handle = self.handle(parent)?.clone();
        let child_handle = self.handle(child)?.clone();
        let position = match reference {
            Some(r) => {
                let reference = self.handle(r)?;
                parent_handle
                    .children
                    .borrow()
                    .iter()
                    .position(|c| Rc::ptr_eq(c, reference))
                    .ok_or(DomError::Detached(r))?
            }
            None => parent_handle.children.borrow().len(),
        };
        parent_handle.children.borrow_mut().insert(position, child_handle.clone());
        child_handle.parent.set(Some(Rc::downgrade(&parent_handle)));
        Ok(())
    }

    /// Puts `replacement` where `old` was; `old` ends up detached.
    pub fn replace_with(&mut self, old: NodeId, replacement: NodeId) -> Result<(), DomError> {
        let parent = self.parent(old).ok_or(DomError::Detached(old))?;
        self.insert_before(parent, replacement, Some(old))?;
        self.detach(old)
    }

    /// Splits a text node at a character offset, like `Text.splitText`. The split
    /// node keeps the head, the returned node holds the tail and follows it.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId, DomError> {
        let text = self.text(id).ok_or(DomError::NotText(id))?;
        let len = char_len(&text);
        if offset > len {
            return Err(DomError::OffsetOutOfBounds { node: id, offset, len });
        }
        let parent = self.parent(id).ok_or(DomError::Detached(id))?;

        self.set_text(id, &slice_chars(&text, 0, offset))?;
        let tail = self.create_text(&slice_chars(&text, offset, len));
        let reference = self.next_sibling(id);
        self.insert_before(parent, tail, reference)?;
        self.splits.insert(tail, id);
        Ok(tail)
    }

    /// Joins each child of `parent` that `split_text` produced back into the text node it
    /// was split from, when the two are adjacent again.
    pub fn rejoin_split_text(&mut self, parent: NodeId) -> Result<(), DomError> {
        let mut head: Option<NodeId> = None;
        for child in self.children(parent) {
            let origin = self.splits.get(&child).copied();
            match head {
                Some(h) if origin == Some(h) && self.is_text(child) => {
                    let joined = format!(
                        "{}{}",
                        self.text(h).unwrap_or_default(),
                        self.text(child).unwrap_or_default()
                    );
                    self.set_text(h, &joined)?;
                    self.detach(child)?;
                    self.splits.remove(&child);
                    for origin in self.splits.values_mut() {
                        if *origin == child {
                            *origin = h;
                        }
                    }
                }
                _ => head = self.is_text(child).then_some(child),
            }
        }
        Ok(())
    }

    /// Pre-order descendants of `id`, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).into_iter().rev());
        }
        out
    }

    /// Text nodes under the root in document order.
    pub fn text_nodes(&self) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|n| self.is_text(*n))
            .collect()
    }

    pub fn find_by_attribute(&self, name: &str, value: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|n| self.attribute(*n, name).as_deref() == Some(value))
            .collect()
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.is_ancestor_or_self(self.root, id)
    }

    /// Serializes a subtree, the node included, as escaped HTML.
    pub fn to_markup(&self, id: NodeId) -> String {
        let Ok(handle) = self.handle(id) else {
            return String::new();
        };
        let opts = SerializeOpts {
            traversal_scope: TraversalScope::IncludeNode,
            ..Default::default()
        };
        let mut bytes = Vec::new();
        if let Err(e) = serialize(&mut bytes, &SerializableHandle::from(handle.clone()), opts) {
            tracing::warn!(node = ?id, error = %e, "failed to serialize markup");
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn html_name(tag: &str) -> QualName {
    QualName::new(None, ns!(html), LocalName::from(tag))
}

fn parent_handle(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

fn find_element(node: &Handle, tag: &str) -> Option<Handle> {
    if let NodeData::Element { name, .. } = &node.data {
        if name.local.as_ref() == tag {
            return Some(node.clone());
        }
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, tag))
}

fn collect_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
        }
    }
}

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

pub(crate) fn slice_chars(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}
