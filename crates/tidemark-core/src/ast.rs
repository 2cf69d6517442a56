//! The document tree. Nodes live in an arena owned by [`Tree`] and refer to
//! each other through [`NodeId`] indices; parent and sibling links are lookup
//! aids, never ownership. The source buffer is shared read-only with every
//! segment in the tree.

use std::fmt;

use crate::segment::{Segment, Segments};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeType {
    Block,
    Inline,
}

/// Every node carries one kind tag; renderers dispatch on it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NodeKind {
    Document,
    TextBlock,
    Paragraph,
    Heading,
    Blockquote,
    CodeBlock,
    FencedCodeBlock,
    HtmlBlock,
    List,
    ListItem,
    ThematicBreak,
    Text,
    Str,
    CodeSpan,
    Emphasis,
    Link,
    Image,
    AutoLink,
    RawHtml,
    // Extension kinds.
    Table,
    TableHeader,
    TableRow,
    TableCell,
    Strikethrough,
    TaskCheckBox,
    FootnoteReference,
    FootnoteDefinition,
    FootnoteBacklink,
    FootnoteList,
    DefinitionList,
    DefinitionTerm,
    DefinitionDescription,
    TypographicText,
    // Internal: emphasis/link delimiters, removed before the parse returns.
    Delimiter,
}

impl NodeKind {
    pub fn node_type(self) -> NodeType {
        match self {
            NodeKind::Document
            | NodeKind::TextBlock
            | NodeKind::Paragraph
            | NodeKind::Heading
            | NodeKind::Blockquote
            | NodeKind::CodeBlock
            | NodeKind::FencedCodeBlock
            | NodeKind::HtmlBlock
            | NodeKind::List
            | NodeKind::ListItem
            | NodeKind::ThematicBreak
            | NodeKind::Table
            | NodeKind::TableHeader
            | NodeKind::TableRow
            | NodeKind::TableCell
            | NodeKind::FootnoteDefinition
            | NodeKind::FootnoteList
            | NodeKind::DefinitionList
            | NodeKind::DefinitionTerm
            | NodeKind::DefinitionDescription => NodeType::Block,
            _ => NodeType::Inline,
        }
    }

    /// Raw blocks keep their lines verbatim and are skipped by the inline
    /// parsing phase.
    pub fn is_raw_block(self) -> bool {
        matches!(
            self,
            NodeKind::CodeBlock | NodeKind::FencedCodeBlock | NodeKind::HtmlBlock
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AutoLinkType {
    Email,
    Url,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Alignment {
    None,
    Left,
    Center,
    Right,
}

impl Alignment {
    pub fn as_str(self) -> Option<&'static str> {
        match self {
            Alignment::None => None,
            Alignment::Left => Some("left"),
            Alignment::Center => Some("center"),
            Alignment::Right => Some("right"),
        }
    }
}

/// The seven HTML block start conditions of CommonMark.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HtmlBlockType {
    /// `<script>`, `<pre>`, `<style>`, `<textarea>`; ends on the closing tag.
    Type1,
    /// `<!--`; ends on `-->`.
    Type2,
    /// `<?`; ends on `?>`.
    Type3,
    /// `<!LETTER`; ends on `>`.
    Type4,
    /// `<![CDATA[`; ends on `]]>`.
    Type5,
    /// A known block-level tag; ends on a blank line.
    Type6,
    /// Any complete tag alone on its line; ends on a blank line.
    Type7,
}

impl HtmlBlockType {
    pub fn ends_on_blank_line(self) -> bool {
        matches!(self, HtmlBlockType::Type6 | HtmlBlockType::Type7)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DelimiterData {
    pub char: u8,
    pub length: usize,
    pub original_length: usize,
    pub can_open: bool,
    pub can_close: bool,
    pub segment: Segment,
}

/// Per-kind payload. The kind tag drives dispatch; the payload carries the
/// fields that kind needs. A few kinds share a payload shape (`Link` and
/// `Image`; `Str` and `TypographicText`).
#[derive(Clone, Debug, PartialEq, Default)]
pub enum NodeData {
    #[default]
    None,
    Heading {
        level: u8,
    },
    FencedCodeBlock {
        info: Option<Segment>,
        fence_char: u8,
        fence_indent: usize,
        fence_length: usize,
    },
    HtmlBlock {
        html_type: HtmlBlockType,
        closure_line: Option<Segment>,
    },
    List {
        marker: u8,
        ordered: bool,
        start: usize,
        tight: bool,
    },
    ListItem {
        offset: usize,
        marker: u8,
    },
    Text {
        segment: Segment,
        soft_break: bool,
        hard_break: bool,
        raw: bool,
    },
    Str {
        value: Vec<u8>,
        raw: bool,
        code: bool,
    },
    Emphasis {
        level: u8,
    },
    Link {
        destination: Vec<u8>,
        title: Vec<u8>,
    },
    AutoLink {
        link_type: AutoLinkType,
        value: Segment,
    },
    RawHtml {
        segments: Segments,
    },
    Delimiter(DelimiterData),
    Table {
        alignments: Vec<Alignment>,
    },
    TableCell {
        alignment: Alignment,
    },
    TaskCheckBox {
        checked: bool,
    },
    FootnoteReference {
        label: Vec<u8>,
        index: usize,
    },
    FootnoteDefinition {
        label: Vec<u8>,
        index: usize,
    },
    FootnoteBacklink {
        index: usize,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    data: NodeData,
    parent: Option<NodeId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    lines: Segments,
    blank_previous_lines: bool,
    attributes: Vec<Attribute>,
}

/// Status returned from walker callbacks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WalkStatus {
    Continue,
    SkipChildren,
    Stop,
}

#[derive(Debug, Default)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: NodeKind, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            data,
            parent: None,
            prev: None,
            next: None,
            first_child: None,
            last_child: None,
            lines: Segments::new(),
            blank_previous_lines: false,
            attributes: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.node_mut(id).kind = kind;
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.node(id).data
    }

    pub fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.node_mut(id).data
    }

    pub fn set_data(&mut self, id: NodeId, data: NodeData) {
        self.node_mut(id).data = data;
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        self.node(id).first_child.is_some()
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).count()
    }

    pub fn children(&self, id: NodeId) -> ChildIter<'_> {
        ChildIter {
            tree: self,
            next: self.node(id).first_child,
        }
    }

    fn assert_block(&self, id: NodeId, what: &str) {
        if self.node(id).kind.node_type() != NodeType::Block {
            panic!("{} is block-only, called on inline {}", what, self.kind(id));
        }
    }

    /// Source lines of a block. Panics for inline nodes.
    pub fn lines(&self, id: NodeId) -> &Segments {
        self.assert_block(id, "lines");
        &self.node(id).lines
    }

    pub fn lines_mut(&mut self, id: NodeId) -> &mut Segments {
        self.assert_block(id, "lines");
        &mut self.node_mut(id).lines
    }

    pub fn set_lines(&mut self, id: NodeId, lines: Segments) {
        self.assert_block(id, "lines");
        self.node_mut(id).lines = lines;
    }

    /// True when a blank line preceded this block. Panics for inline nodes.
    pub fn has_blank_previous_lines(&self, id: NodeId) -> bool {
        self.assert_block(id, "blank_previous_lines");
        self.node(id).blank_previous_lines
    }

    pub fn set_blank_previous_lines(&mut self, id: NodeId, v: bool) {
        self.assert_block(id, "blank_previous_lines");
        self.node_mut(id).blank_previous_lines = v;
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        &self.node(id).attributes
    }

    pub fn attribute(&self, id: NodeId, name: &[u8]) -> Option<&[u8]> {
        self.node(id)
            .attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_slice())
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &[u8], value: Vec<u8>) {
        let node = self.node_mut(id);
        if let Some(attr) = node.attributes.iter_mut().find(|a| a.name == name) {
            attr.value = value;
        } else {
            node.attributes.push(Attribute {
                name: name.to_vec(),
                value,
            });
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        let last = self.node(parent).last_child;
        match last {
            Some(last) => {
                self.node_mut(last).next = Some(child);
                self.node_mut(child).prev = Some(last);
            }
            None => self.node_mut(parent).first_child = Some(child),
        }
        self.node_mut(parent).last_child = Some(child);
        self.node_mut(child).parent = Some(parent);
    }

    pub fn insert_before(&mut self, parent: NodeId, target: NodeId, node: NodeId) {
        self.detach(node);
        let prev = self.node(target).prev;
        self.node_mut(node).prev = prev;
        self.node_mut(node).next = Some(target);
        self.node_mut(target).prev = Some(node);
        match prev {
            Some(prev) => self.node_mut(prev).next = Some(node),
            None => self.node_mut(parent).first_child = Some(node),
        }
        self.node_mut(node).parent = Some(parent);
    }

    pub fn insert_after(&mut self, parent: NodeId, target: NodeId, node: NodeId) {
        self.detach(node);
        let next = self.node(target).next;
        self.node_mut(node).next = next;
        self.node_mut(node).prev = Some(target);
        self.node_mut(target).next = Some(node);
        match next {
            Some(next) => self.node_mut(next).prev = Some(node),
            None => self.node_mut(parent).last_child = Some(node),
        }
        self.node_mut(node).parent = Some(parent);
    }

    /// Detaches a node from its parent, keeping its own children.
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let n = self.node(id);
            (n.parent, n.prev, n.next)
        };
        if let Some(prev) = prev {
            self.node_mut(prev).next = next;
        } else if let Some(parent) = parent {
            self.node_mut(parent).first_child = next;
        }
        if let Some(next) = next {
            self.node_mut(next).prev = prev;
        } else if let Some(parent) = parent {
            self.node_mut(parent).last_child = prev;
        }
        let n = self.node_mut(id);
        n.parent = None;
        n.prev = None;
        n.next = None;
    }

    /// Replaces `old` with `new` at the same tree position. `old` keeps its
    /// children; they are not moved.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        let parent = self
            .parent(old)
            .expect("cannot replace a node without a parent");
        self.insert_before(parent, old, new);
        self.detach(old);
    }

    /// Moves every child of `from` to the end of `to`'s children.
    pub fn reparent_children(&mut self, from: NodeId, to: NodeId) {
        while let Some(child) = self.first_child(from) {
            self.append_child(to, child);
        }
    }

    /// Concatenated plain text of the node's descendants, materialized from
    /// the source. Used for image alt text and auto-generated heading IDs.
    pub fn text(&self, id: NodeId, source: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        self.collect_text(id, source, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, source: &[u8], out: &mut Vec<u8>) {
        match self.data(id) {
            NodeData::Text { segment, .. } => out.extend_from_slice(&segment.value(source)),
            NodeData::Str { value, .. } => out.extend_from_slice(value),
            NodeData::AutoLink { value, .. } => out.extend_from_slice(&value.value(source)),
            _ => {
                let mut child = self.first_child(id);
                while let Some(c) = child {
                    self.collect_text(c, source, out);
                    child = self.next_sibling(c);
                }
            }
        }
    }

    /// Appends a plain text segment to `parent`, merging into the previous
    /// text node when the ranges are contiguous on the same line.
    pub fn merge_or_append_text_segment(
        &mut self,
        parent: NodeId,
        segment: Segment,
        source: &[u8],
    ) {
        if let Some(last) = self.last_child(parent)
            && self.try_merge_text(last, &segment, false, source)
        {
            return;
        }
        let text = self.alloc(NodeKind::Text, text_data(segment));
        self.append_child(parent, text);
    }

    /// Turns `node` (in place) into a plain text node for `segment`, merging
    /// it into a contiguous preceding text node when possible.
    pub fn merge_or_replace_text_segment(&mut self, node: NodeId, segment: Segment, source: &[u8]) {
        if let Some(prev) = self.prev_sibling(node)
            && self.try_merge_text(prev, &segment, false, source)
        {
            self.detach(node);
            return;
        }
        self.set_kind(node, NodeKind::Text);
        self.set_data(node, text_data(segment));
    }

    fn try_merge_text(&mut self, into: NodeId, segment: &Segment, raw: bool, source: &[u8]) -> bool {
        if self.kind(into) != NodeKind::Text {
            return false;
        }
        if let NodeData::Text {
            segment: existing,
            soft_break,
            hard_break,
            raw: existing_raw,
        } = self.data(into)
        {
            if *soft_break
                || *hard_break
                || *existing_raw != raw
                || existing.stop != segment.start
                || segment.padding != 0
                || (existing.stop > 0 && source[existing.stop - 1] == b'\n')
            {
                return false;
            }
            let stop = segment.stop;
            if let NodeData::Text { segment, .. } = self.data_mut(into) {
                segment.stop = stop;
            }
            true
        } else {
            false
        }
    }
}

pub fn text_data(segment: Segment) -> NodeData {
    NodeData::Text {
        segment,
        soft_break: false,
        hard_break: false,
        raw: false,
    }
}

pub struct ChildIter<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl Iterator for ChildIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.next_sibling(id);
        Some(id)
    }
}

/// Walks the subtree rooted at `node` depth first, calling `f` once entering
/// and once leaving each node. `SkipChildren` from an entering call skips the
/// subtree, `Stop` aborts the whole walk; errors propagate immediately.
pub fn walk<E>(
    tree: &Tree,
    node: NodeId,
    f: &mut impl FnMut(&Tree, NodeId, bool) -> Result<WalkStatus, E>,
) -> Result<WalkStatus, E> {
    let status = f(tree, node, true)?;
    match status {
        WalkStatus::Stop => return Ok(WalkStatus::Stop),
        WalkStatus::SkipChildren => {}
        WalkStatus::Continue => {
            let mut child = tree.first_child(node);
            while let Some(c) = child {
                // Read the next link before the callback, which may not
                // mutate the tree but the order should not depend on it.
                child = tree.next_sibling(c);
                if walk(tree, c, f)? == WalkStatus::Stop {
                    return Ok(WalkStatus::Stop);
                }
            }
        }
    }
    if f(tree, node, false)? == WalkStatus::Stop {
        return Ok(WalkStatus::Stop);
    }
    Ok(WalkStatus::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_links_form_a_chain() {
        let mut tree = Tree::new();
        let doc = tree.alloc(NodeKind::Document, NodeData::None);
        let a = tree.alloc(NodeKind::Paragraph, NodeData::None);
        let b = tree.alloc(NodeKind::Paragraph, NodeData::None);
        let c = tree.alloc(NodeKind::Paragraph, NodeData::None);
        tree.append_child(doc, a);
        tree.append_child(doc, b);
        tree.append_child(doc, c);
        assert_eq!(tree.children(doc).collect::<Vec<_>>(), vec![a, b, c]);
        tree.detach(b);
        assert_eq!(tree.children(doc).collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(tree.prev_sibling(c), Some(a));
        tree.insert_after(doc, a, b);
        assert_eq!(tree.children(doc).collect::<Vec<_>>(), vec![a, b, c]);
    }

    #[test]
    #[should_panic(expected = "block-only")]
    fn inline_nodes_reject_block_accessors() {
        let mut tree = Tree::new();
        let text = tree.alloc(NodeKind::Text, text_data(Segment::new(0, 0)));
        let _ = tree.lines(text);
    }

    #[test]
    fn contiguous_text_segments_merge() {
        let source = b"hello world";
        let mut tree = Tree::new();
        let p = tree.alloc(NodeKind::Paragraph, NodeData::None);
        tree.merge_or_append_text_segment(p, Segment::new(0, 5), source);
        tree.merge_or_append_text_segment(p, Segment::new(5, 11), source);
        assert_eq!(tree.child_count(p), 1);
        let only = tree.first_child(p).unwrap();
        match tree.data(only) {
            NodeData::Text { segment, .. } => assert_eq!((segment.start, segment.stop), (0, 11)),
            other => panic!("expected text, got {:?}", other),
        }
    }
}
