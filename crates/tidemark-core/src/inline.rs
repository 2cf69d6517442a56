//! The default inline parsers: code span, autolink, raw HTML, link/image
//! with reference resolution, and the emphasis delimiter scanner.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::ast::{AutoLinkType, DelimiterData, NodeData, NodeId, NodeKind, Tree};
use crate::block::parse_html_tag_end;
use crate::parser::{
    clear_delimiters, process_delimiters, scan_delimiter, Context, DelimiterProcessor,
    InlineParser,
};
use crate::reader::BlockReader;
use crate::segment::{Segment, Segments};
use crate::util;

// ---------------------------------------------------------------------------
// Emphasis

pub struct EmphasisDelimiterProcessor;

impl DelimiterProcessor for EmphasisDelimiterProcessor {
    fn is_delimiter(&self, b: u8) -> bool {
        b == b'*' || b == b'_'
    }

    fn can_open_closer(&self, opener: &DelimiterData, closer: &DelimiterData) -> bool {
        opener.char == closer.char
    }

    fn on_match(&self, consumes: usize, tree: &mut Tree) -> NodeId {
        tree.alloc(
            NodeKind::Emphasis,
            NodeData::Emphasis {
                level: consumes as u8,
            },
        )
    }
}

pub struct EmphasisParser {
    processor: Arc<EmphasisDelimiterProcessor>,
}

impl EmphasisParser {
    pub fn new() -> Self {
        Self {
            processor: Arc::new(EmphasisDelimiterProcessor),
        }
    }
}

impl Default for EmphasisParser {
    fn default() -> Self {
        Self::new()
    }
}

impl InlineParser for EmphasisParser {
    fn trigger(&self) -> &'static [u8] {
        b"*_"
    }

    fn parse(
        &self,
        _parent: NodeId,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
    ) -> Option<NodeId> {
        let before = block.preceding_character();
        let (line, segment) = block.peek_line()?;
        let mut data = scan_delimiter(&line, before, 1, &*self.processor)?;
        data.segment = segment.with_stop(segment.start + data.original_length);
        block.advance(data.original_length);
        let node = pc
            .tree_mut()
            .alloc(NodeKind::Delimiter, NodeData::Delimiter(data));
        pc.push_delimiter(node, self.processor.clone());
        Some(node)
    }
}

// ---------------------------------------------------------------------------
// Code span

pub struct CodeSpanParser;

impl InlineParser for CodeSpanParser {
    fn trigger(&self) -> &'static [u8] {
        b"`"
    }

    fn parse(
        &self,
        _parent: NodeId,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
    ) -> Option<NodeId> {
        let (line, start_segment) = block.peek_line()?;
        let mut opener = 0;
        while opener < line.len() && line[opener] == b'`' {
            opener += 1;
        }
        block.advance(opener);
        let (saved_line, saved_position) = block.position();

        let node = pc.tree_mut().alloc(NodeKind::CodeSpan, NodeData::None);
        loop {
            let Some((line, segment)) = block.peek_line() else {
                // No closing run: the opener backticks are literal text and
                // the scanned content is handed back to the dispatch loop.
                block.set_position(saved_line, saved_position);
                while let Some(child) = pc.tree_mut().first_child(node) {
                    pc.tree_mut().detach(child);
                }
                pc.tree_mut().set_kind(node, NodeKind::Text);
                pc.tree_mut().set_data(
                    node,
                    crate::ast::text_data(
                        start_segment.with_stop(start_segment.start + opener),
                    ),
                );
                return Some(node);
            };
            let mut i = 0;
            let mut matched = false;
            while i < line.len() {
                if line[i] == b'`' {
                    let run_start = i;
                    while i < line.len() && line[i] == b'`' {
                        i += 1;
                    }
                    if i - run_start == opener {
                        let content = segment.with_stop(segment.start + run_start);
                        if !content.is_empty() {
                            let text = pc.tree_mut().alloc(
                                NodeKind::Text,
                                NodeData::Text {
                                    segment: content,
                                    soft_break: false,
                                    hard_break: false,
                                    raw: true,
                                },
                            );
                            pc.tree_mut().append_child(node, text);
                        }
                        block.advance(i);
                        matched = true;
                        break;
                    }
                    continue;
                }
                i += 1;
            }
            if matched {
                break;
            }
            let text = pc.tree_mut().alloc(
                NodeKind::Text,
                NodeData::Text {
                    segment,
                    soft_break: false,
                    hard_break: false,
                    raw: true,
                },
            );
            pc.tree_mut().append_child(node, text);
            block.advance_line();
        }

        trim_code_span(pc, node);
        Some(node)
    }
}

/// Strips one leading and one trailing space when both ends have one and the
/// content is not all spaces.
fn trim_code_span(pc: &mut Context<'_>, node: NodeId) {
    let source = pc.source();
    let tree = pc.tree();
    let Some(first) = tree.first_child(node) else {
        return;
    };
    let last = tree.last_child(node).unwrap_or(first);
    let edge = |id: NodeId, end: bool| -> Option<u8> {
        match tree.data(id) {
            NodeData::Text { segment, .. } if !segment.is_empty() => Some(if end {
                source[segment.stop - 1]
            } else {
                source[segment.start]
            }),
            _ => None,
        }
    };
    let space = |b: Option<u8>| matches!(b, Some(b' ') | Some(b'\n'));
    if !space(edge(first, false)) || !space(edge(last, true)) {
        return;
    }
    let all_blank = tree.children(node).all(|c| match tree.data(c) {
        NodeData::Text { segment, .. } => segment
            .value(source)
            .iter()
            .all(|&b| b == b' ' || b == b'\n'),
        _ => true,
    });
    if all_blank {
        return;
    }
    if let NodeData::Text { segment, .. } = pc.tree_mut().data_mut(first) {
        segment.start += 1;
    }
    if let NodeData::Text { segment, .. } = pc.tree_mut().data_mut(last) {
        segment.stop -= 1;
    }
}

// ---------------------------------------------------------------------------
// Autolink

static AUTOLINK_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]{1,31}:[^\x00-\x20<>]*$").unwrap());

static AUTOLINK_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .unwrap()
});

pub struct AutoLinkParser;

impl InlineParser for AutoLinkParser {
    fn trigger(&self) -> &'static [u8] {
        b"<"
    }

    fn parse(
        &self,
        _parent: NodeId,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
    ) -> Option<NodeId> {
        let (line, segment) = block.peek_line()?;
        let mut i = 1;
        while i < line.len() && line[i] != b'>' {
            if line[i] < 0x80 && (line[i].is_ascii_whitespace() || line[i] == b'<') {
                return None;
            }
            i += 1;
        }
        if i >= line.len() || line[i] != b'>' {
            return None;
        }
        let inner = &line[1..i];
        let link_type = if AUTOLINK_URL.is_match(inner) {
            AutoLinkType::Url
        } else if AUTOLINK_EMAIL.is_match(inner) {
            AutoLinkType::Email
        } else {
            return None;
        };
        let value = Segment::new(segment.start + 1, segment.start + i);
        let node = pc.tree_mut().alloc(
            NodeKind::AutoLink,
            NodeData::AutoLink { link_type, value },
        );
        block.advance(i + 1);
        Some(node)
    }
}

// ---------------------------------------------------------------------------
// Raw HTML

pub struct RawHtmlParser;

/// The block's remaining content flattened into one buffer, with the per
/// line mapping needed to translate match offsets back into segments.
struct RemainingLines {
    buf: Vec<u8>,
    /// (buffer offset, reader line index, segment)
    spans: Vec<(usize, usize, Segment)>,
}

fn collect_remaining(block: &mut BlockReader<'_>) -> RemainingLines {
    let saved = block.position();
    let mut rem = RemainingLines {
        buf: Vec::new(),
        spans: Vec::new(),
    };
    while let Some((_, segment)) = block.peek_line() {
        let (index, _) = block.position();
        rem.spans.push((rem.buf.len(), index, segment.clone()));
        rem.buf
            .extend_from_slice(&block.source()[segment.start..segment.stop]);
        block.advance_line();
    }
    block.set_position(saved.0, saved.1);
    rem
}

impl RemainingLines {
    /// Splits `self.buf[..=end]` into per-line segments and repositions the
    /// reader just past `end`.
    fn consume(&self, end: usize, block: &mut BlockReader<'_>) -> Segments {
        let mut segments = Segments::new();
        for (buf_start, index, segment) in &self.spans {
            if *buf_start > end {
                break;
            }
            let line_len = segment.stop - segment.start;
            let covered = (end + 1 - buf_start).min(line_len);
            segments.append(Segment::new(segment.start, segment.start + covered));
            if end < buf_start + line_len {
                block.set_position(
                    *index,
                    Segment::new(segment.start + covered, segment.stop),
                );
                return segments;
            }
        }
        // The match ended exactly at the end of the content.
        if let Some((_, index, segment)) = self.spans.last() {
            block.set_position(*index, Segment::new(segment.stop, segment.stop));
        }
        segments
    }
}

fn find_seq(buf: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if buf.len() < needle.len() {
        return None;
    }
    (from..=buf.len() - needle.len()).find(|&i| &buf[i..i + needle.len()] == needle)
}

impl InlineParser for RawHtmlParser {
    fn trigger(&self) -> &'static [u8] {
        b"<"
    }

    fn parse(
        &self,
        _parent: NodeId,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
    ) -> Option<NodeId> {
        let rem = collect_remaining(block);
        let buf = &rem.buf;
        if buf.len() < 3 || buf[0] != b'<' {
            return None;
        }
        let end = if buf.starts_with(b"<!-->") {
            Some(4)
        } else if buf.starts_with(b"<!--->") {
            Some(5)
        } else if buf.starts_with(b"<!--") {
            find_seq(buf, 4, b"-->").map(|i| i + 2)
        } else if buf.starts_with(b"<![CDATA[") {
            find_seq(buf, 9, b"]]>").map(|i| i + 2)
        } else if buf.starts_with(b"<?") {
            find_seq(buf, 2, b"?>").map(|i| i + 1)
        } else if buf.starts_with(b"<!") && matches!(buf.get(2), Some(b) if b.is_ascii_alphabetic())
        {
            buf.iter().position(|&b| b == b'>')
        } else {
            parse_html_tag_end(buf)
        };
        let end = end?;
        let segments = rem.consume(end, block);
        let node = pc
            .tree_mut()
            .alloc(NodeKind::RawHtml, NodeData::RawHtml { segments });
        Some(node)
    }
}

// ---------------------------------------------------------------------------
// Links and images

const BRACKETS_KEY: &str = "link.brackets";

#[derive(Clone, Copy, Debug)]
struct Bracket {
    node: NodeId,
    /// Source position just past the opener text, used for collapsed and
    /// shortcut reference labels.
    content_start: usize,
    image: bool,
    active: bool,
    /// Delimiter list length when the bracket was pushed.
    bottom: usize,
}

/// True while the link parser has an open bracket; extensions that must not
/// fire inside link labels check this.
pub(crate) fn in_link_label(pc: &Context<'_>) -> bool {
    pc.get::<Vec<Bracket>>(BRACKETS_KEY)
        .map(|b| !b.is_empty())
        .unwrap_or(false)
}

pub struct LinkParser;

impl InlineParser for LinkParser {
    fn trigger(&self) -> &'static [u8] {
        b"![]"
    }

    fn parse(
        &self,
        parent: NodeId,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
    ) -> Option<NodeId> {
        let (line, segment) = block.peek_line()?;
        match line[0] {
            b'!' => {
                if line.len() > 1 && line[1] == b'[' {
                    Some(self.push_opener(block, pc, &segment, true))
                } else {
                    None
                }
            }
            b'[' => Some(self.push_opener(block, pc, &segment, false)),
            b']' => self.close_bracket(parent, block, pc),
            _ => None,
        }
    }

    fn close_block(&self, _parent: NodeId, pc: &mut Context<'_>) {
        if let Some(brackets) = pc.get_mut::<Vec<Bracket>>(BRACKETS_KEY) {
            brackets.clear();
        }
    }
}

impl LinkParser {
    fn push_opener(
        &self,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
        segment: &Segment,
        image: bool,
    ) -> NodeId {
        let width = if image { 2 } else { 1 };
        let opener = Segment::new(segment.start, segment.start + width);
        let node = pc
            .tree_mut()
            .alloc(NodeKind::Text, crate::ast::text_data(opener));
        let bracket = Bracket {
            node,
            content_start: segment.start + width,
            image,
            active: true,
            bottom: pc.delimiters_len(),
        };
        if pc.get::<Vec<Bracket>>(BRACKETS_KEY).is_none() {
            pc.set(BRACKETS_KEY, Box::new(Vec::<Bracket>::new()));
        }
        pc.get_mut::<Vec<Bracket>>(BRACKETS_KEY)
            .expect("just inserted")
            .push(bracket);
        block.advance(width);
        node
    }

    fn close_bracket(
        &self,
        _parent: NodeId,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
    ) -> Option<NodeId> {
        let entry = {
            let brackets = pc.get_mut::<Vec<Bracket>>(BRACKETS_KEY)?;
            brackets.pop()?
        };
        if !entry.active || pc.tree().parent(entry.node).is_none() {
            return None;
        }
        let (_, closer_segment) = block.peek_line()?;
        let closer_pos = closer_segment.start;
        block.advance(1);

        let resolved = self.resolve(block, pc, &entry, closer_pos);
        let Some((destination, title)) = resolved else {
            // Leave the opener as literal text; the reader position is
            // restored by the dispatch loop.
            return None;
        };

        let kind = if entry.image {
            NodeKind::Image
        } else {
            NodeKind::Link
        };
        let link = pc
            .tree_mut()
            .alloc(kind, NodeData::Link { destination, title });
        process_delimiters(pc, entry.bottom);
        clear_delimiters(pc, entry.bottom);
        let tree = pc.tree_mut();
        let mut child = tree.next_sibling(entry.node);
        while let Some(c) = child {
            let next = tree.next_sibling(c);
            tree.append_child(link, c);
            child = next;
        }
        tree.detach(entry.node);

        if !entry.image {
            // Links may not nest: earlier link openers go inactive.
            if let Some(brackets) = pc.get_mut::<Vec<Bracket>>(BRACKETS_KEY) {
                for bracket in brackets.iter_mut() {
                    if !bracket.image {
                        bracket.active = false;
                    }
                }
            }
        }
        Some(link)
    }

    /// Resolves `](...)`, `][label]`, `][]` or a shortcut reference at the
    /// current position. On success the reader has consumed the syntax.
    fn resolve(
        &self,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
        entry: &Bracket,
        closer_pos: usize,
    ) -> Option<(Vec<u8>, Vec<u8>)> {
        let next = block
            .peek_line()
            .and_then(|(line, _)| line.first().copied());
        if next == Some(b'(') {
            if let Some(result) = parse_inline_destination(block) {
                return Some(result);
            }
        }
        if next == Some(b'[') {
            let rem = collect_remaining(block);
            if let Some(label_close) = util::find_closure(&rem.buf[1..], b'[', b']', false, false)
                && label_close <= 999
            {
                let label = rem.buf[1..1 + label_close].to_vec();
                let label = if label.is_empty() {
                    // Collapsed reference: the link text is the label.
                    pc.source()[entry.content_start..closer_pos].to_vec()
                } else {
                    label
                };
                if let Some(reference) = pc.reference(&label) {
                    let result = (reference.destination.clone(), reference.title.clone());
                    rem.consume(1 + label_close, block);
                    return Some(result);
                }
                return None;
            }
        }
        // Shortcut reference.
        let label = pc.source()[entry.content_start..closer_pos].to_vec();
        if label.is_empty() {
            return None;
        }
        let reference = pc.reference(&label)?;
        Some((reference.destination.clone(), reference.title.clone()))
    }
}

/// Parses `(destination "title")` starting at the `(`, possibly across
/// lines. Consumes through the closing parenthesis on success.
fn parse_inline_destination(block: &mut BlockReader<'_>) -> Option<(Vec<u8>, Vec<u8>)> {
    let rem = collect_remaining(block);
    let buf = &rem.buf;
    if buf.first() != Some(&b'(') {
        return None;
    }
    let mut i = 1;
    while i < buf.len() && util::is_space(buf[i]) {
        i += 1;
    }
    if i >= buf.len() {
        return None;
    }

    let destination;
    if buf[i] == b'<' {
        let mut j = i + 1;
        while j < buf.len() && buf[j] != b'>' {
            if buf[j] == b'\n' || buf[j] == b'<' {
                return None;
            }
            if buf[j] == b'\\' && j + 1 < buf.len() && util::is_punct(buf[j + 1]) {
                j += 1;
            }
            j += 1;
        }
        if j >= buf.len() {
            return None;
        }
        destination = buf[i + 1..j].to_vec();
        i = j + 1;
    } else {
        let start = i;
        let mut depth = 0i32;
        while i < buf.len() {
            let b = buf[i];
            if util::is_space(b) || b < 0x20 {
                break;
            }
            match b {
                b'\\' if i + 1 < buf.len() && util::is_punct(buf[i + 1]) => i += 1,
                b'(' => depth += 1,
                b')' => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            i += 1;
        }
        if depth != 0 {
            return None;
        }
        destination = buf[start..i].to_vec();
    }

    let ws_start = i;
    while i < buf.len() && util::is_space(buf[i]) {
        i += 1;
    }
    if i >= buf.len() {
        return None;
    }

    let mut title = Vec::new();
    if i > ws_start && matches!(buf[i], b'"' | b'\'' | b'(') {
        let open = buf[i];
        let close = if open == b'(' { b')' } else { open };
        let mut j = i + 1;
        let title_start = j;
        let mut ok = false;
        while j < buf.len() {
            let b = buf[j];
            if b == b'\\' && j + 1 < buf.len() && util::is_punct(buf[j + 1]) {
                j += 2;
                continue;
            }
            if b == close {
                ok = true;
                break;
            }
            if open == b'(' && b == b'(' {
                return None;
            }
            j += 1;
        }
        if !ok {
            return None;
        }
        title = buf[title_start..j].to_vec();
        i = j + 1;
        while i < buf.len() && util::is_space(buf[i]) {
            i += 1;
        }
        if i >= buf.len() {
            return None;
        }
    }

    if buf[i] != b')' {
        return None;
    }
    rem.consume(i, block);
    Some((destination, title))
}
