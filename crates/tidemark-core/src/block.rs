//! The default block parsers: paragraph, ATX and setext headings, thematic
//! break, fenced and indented code, blockquote, list and list item, HTML
//! block, plus the link-reference-definition paragraph transformer.

use crate::ast::{HtmlBlockType, NodeData, NodeId, NodeKind, Tree};
use crate::parser::{
    BlockParser, Context, ParagraphTransformer, ParserOptions, Reference, State,
};
use crate::reader::LineReader;
use crate::segment::{Segment, Segments};
use crate::util;

/// Maps an index into a peeked line back to a source byte position,
/// accounting for the synthetic padding spaces at the line head.
fn byte_pos(segment: &Segment, line_index: usize) -> usize {
    segment.start + line_index.saturating_sub(segment.padding)
}

// ---------------------------------------------------------------------------
// Paragraph

pub struct ParagraphParser;

fn paragraph_cont(node: NodeId, reader: &mut LineReader<'_>, pc: &mut Context<'_>) -> State {
    let Some((_, segment)) = reader.peek_line() else {
        return State::CLOSE;
    };
    let segment = segment.trim_left_space(pc.source());
    if segment.is_empty() {
        return State::CLOSE;
    }
    let advance = segment.len().saturating_sub(1);
    pc.tree_mut().lines_mut(node).append(segment);
    reader.advance(advance);
    State::CONTINUE | State::NO_CHILDREN
}

fn paragraph_close(node: NodeId, pc: &mut Context<'_>) {
    let source = pc.source();
    let lines = pc.tree_mut().lines_mut(node);
    if let Some(last) = lines.last().cloned() {
        let index = lines.len() - 1;
        lines.set(index, last.trim_right_space(source));
    }
    if lines.is_empty() {
        pc.tree_mut().detach(node);
    }
}

impl BlockParser for ParagraphParser {
    fn open(
        &self,
        _parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State) {
        let Some((_, segment)) = reader.peek_line() else {
            return (None, State::NO_CHILDREN);
        };
        let segment = segment.trim_left_space(pc.source());
        if segment.is_empty() {
            return (None, State::NO_CHILDREN);
        }
        let node = pc.tree_mut().alloc(NodeKind::Paragraph, NodeData::None);
        let advance = segment.len().saturating_sub(1);
        pc.tree_mut().lines_mut(node).append(segment);
        reader.advance(advance);
        (Some(node), State::NO_CHILDREN)
    }

    fn cont(&self, node: NodeId, reader: &mut LineReader<'_>, pc: &mut Context<'_>) -> State {
        paragraph_cont(node, reader, pc)
    }

    fn close(&self, node: NodeId, pc: &mut Context<'_>) {
        paragraph_close(node, pc);
    }

    fn can_interrupt_paragraph(&self) -> bool {
        false
    }

    fn can_accept_indented_line(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Setext heading

pub struct SetextHeadingParser {
    pub options: ParserOptions,
}

impl BlockParser for SetextHeadingParser {
    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b"-=")
    }

    fn open(
        &self,
        _parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State) {
        let Some(last) = pc.last_opened_block() else {
            return (None, State::NO_CHILDREN);
        };
        let paragraph = last.node;
        if pc.tree().kind(paragraph) != NodeKind::Paragraph
            || pc.tree().parent(paragraph).is_none()
        {
            return (None, State::NO_CHILDREN);
        }
        let Some((line, segment)) = reader.peek_line() else {
            return (None, State::NO_CHILDREN);
        };
        let pos = pc.block_offset();
        let marker = line[pos];
        if marker != b'=' && marker != b'-' {
            return (None, State::NO_CHILDREN);
        }
        let mut i = pos;
        while i < line.len() && line[i] == marker {
            i += 1;
        }
        while i < line.len() && matches!(line[i], b' ' | b'\t' | b'\r') {
            i += 1;
        }
        if i < line.len() && line[i] != b'\n' {
            return (None, State::NO_CHILDREN);
        }

        // Leading reference definitions belong to the document, not to the
        // heading text.
        strip_link_reference_definitions(pc, paragraph);
        if pc.tree().parent(paragraph).is_none() {
            // The whole paragraph was reference definitions; the underline
            // starts a fresh paragraph instead of a heading.
            let node = pc.tree_mut().alloc(NodeKind::Paragraph, NodeData::None);
            let line_segment = segment.trim_left_space(pc.source());
            let advance = segment.len().saturating_sub(1);
            pc.tree_mut().lines_mut(node).append(line_segment);
            reader.advance(advance);
            return (Some(node), State::NO_CHILDREN);
        }

        let level = if marker == b'=' { 1 } else { 2 };
        let source = pc.source();
        let mut lines = pc.tree().lines(paragraph).clone();
        if let Some(last_line) = lines.last().cloned() {
            let index = lines.len() - 1;
            lines.set(index, last_line.trim_right_space(source));
        }
        let heading = pc
            .tree_mut()
            .alloc(NodeKind::Heading, NodeData::Heading { level });
        pc.tree_mut().set_lines(heading, lines);
        pc.tree_mut().detach(paragraph);
        reader.advance(segment.len().saturating_sub(1));
        (Some(heading), State::NO_CHILDREN)
    }

    fn cont(&self, node: NodeId, reader: &mut LineReader<'_>, pc: &mut Context<'_>) -> State {
        // The open call degrades to a paragraph when the promoted text was
        // entirely reference definitions; such a node keeps paragraph
        // behavior.
        if pc.tree().kind(node) == NodeKind::Paragraph {
            return paragraph_cont(node, reader, pc);
        }
        State::CLOSE
    }

    fn close(&self, node: NodeId, pc: &mut Context<'_>) {
        if pc.tree().kind(node) == NodeKind::Paragraph {
            paragraph_close(node, pc);
            return;
        }
        if self.options.auto_heading_id {
            generate_auto_heading_id(node, pc);
        }
    }

    fn can_interrupt_paragraph(&self) -> bool {
        true
    }

    fn can_accept_indented_line(&self) -> bool {
        false
    }
}

fn generate_auto_heading_id(node: NodeId, pc: &mut Context<'_>) {
    if pc.tree().attribute(node, b"id").is_some() {
        return;
    }
    let value = match pc.tree().lines(node).last() {
        Some(segment) => segment.value(pc.source()).into_owned(),
        None => Vec::new(),
    };
    let id = pc.generate_id(&value, b"heading");
    pc.tree_mut().set_attribute(node, b"id", id);
}

// ---------------------------------------------------------------------------
// Thematic break

pub struct ThematicBreakParser;

pub(crate) fn is_thematic_break_line(line: &[u8], pos: usize) -> bool {
    let mut marker = 0u8;
    let mut count = 0;
    for &b in &line[pos..] {
        match b {
            b'-' | b'*' | b'_' => {
                if marker == 0 {
                    marker = b;
                } else if marker != b {
                    return false;
                }
                count += 1;
            }
            b' ' | b'\t' | b'\n' | b'\r' => {}
            _ => return false,
        }
    }
    count >= 3
}

impl BlockParser for ThematicBreakParser {
    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b"-*_")
    }

    fn open(
        &self,
        _parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State) {
        let Some((line, segment)) = reader.peek_line() else {
            return (None, State::NO_CHILDREN);
        };
        if !is_thematic_break_line(&line, pc.block_offset()) {
            return (None, State::NO_CHILDREN);
        }
        let node = pc.tree_mut().alloc(NodeKind::ThematicBreak, NodeData::None);
        reader.advance(segment.len().saturating_sub(1));
        (Some(node), State::NO_CHILDREN)
    }

    fn cont(&self, _node: NodeId, _reader: &mut LineReader<'_>, _pc: &mut Context<'_>) -> State {
        State::CLOSE
    }

    fn can_interrupt_paragraph(&self) -> bool {
        true
    }

    fn can_accept_indented_line(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// ATX heading

pub struct AtxHeadingParser {
    pub options: ParserOptions,
}

impl BlockParser for AtxHeadingParser {
    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b"#")
    }

    fn open(
        &self,
        _parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State) {
        let Some((line, segment)) = reader.peek_line() else {
            return (None, State::NO_CHILDREN);
        };
        let pos = pc.block_offset();
        let mut i = pos;
        while i < line.len() && line[i] == b'#' {
            i += 1;
        }
        let level = i - pos;
        if level == 0 || level > 6 {
            return (None, State::NO_CHILDREN);
        }
        let spaces = util::trim_left_space_length(&line[i..]);
        if spaces == 0 && i < line.len() {
            // A heading marker requires a space or the end of the line.
            return (None, State::NO_CHILDREN);
        }
        let start = i + spaces;
        let mut stop = line.len() - util::trim_right_space_length(&line);

        let node = pc.tree_mut().alloc(
            NodeKind::Heading,
            NodeData::Heading { level: level as u8 },
        );

        if self.options.attribute
            && let Some((attr_start, attributes)) = scan_trailing_attributes(&line[..stop], start)
        {
            for (name, value) in attributes {
                pc.tree_mut().set_attribute(node, &name, value);
            }
            stop = attr_start;
            while stop > start && util::is_space(line[stop - 1]) {
                stop -= 1;
            }
        }

        if stop <= start {
            // Empty headings like '##'.
            stop = start;
        } else {
            // Optional run of closing '#'s, separated from the text by a
            // space.
            let mut j = stop - 1;
            while j >= start && line[j] == b'#' {
                if j == 0 {
                    break;
                }
                j -= 1;
            }
            if j != stop - 1 && util::is_space(line[j]) {
                while j > start && util::is_space(line[j - 1]) {
                    j -= 1;
                }
                stop = j;
            }
        }

        if stop > start {
            pc.tree_mut().lines_mut(node).append(Segment::new(
                byte_pos(&segment, start),
                byte_pos(&segment, stop),
            ));
        }
        (Some(node), State::NO_CHILDREN)
    }

    fn cont(&self, _node: NodeId, _reader: &mut LineReader<'_>, _pc: &mut Context<'_>) -> State {
        State::CLOSE
    }

    fn close(&self, node: NodeId, pc: &mut Context<'_>) {
        if self.options.auto_heading_id {
            generate_auto_heading_id(node, pc);
        }
    }

    fn can_interrupt_paragraph(&self) -> bool {
        true
    }

    fn can_accept_indented_line(&self) -> bool {
        false
    }
}

/// Scans a trailing `{#id .class key=val}` attribute block. Returns the
/// index of the opening brace and the parsed attributes.
fn scan_trailing_attributes(
    line: &[u8],
    content_start: usize,
) -> Option<(usize, Vec<(Vec<u8>, Vec<u8>)>)> {
    if line.is_empty() || *line.last()? != b'}' {
        return None;
    }
    let mut brace = None;
    let mut i = line.len() - 1;
    while i > content_start {
        i -= 1;
        if line[i] == b'{' {
            brace = Some(i);
            break;
        }
    }
    let brace = brace?;
    let attributes = parse_attribute_list(&line[brace + 1..line.len() - 1])?;
    Some((brace, attributes))
}

/// Parses the inside of an attribute block: `#id`, `.class` and `key=value`
/// items separated by spaces. Classes accumulate into one attribute.
pub(crate) fn parse_attribute_list(inner: &[u8]) -> Option<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut out: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    let mut classes: Vec<u8> = Vec::new();
    let mut i = 0;
    while i < inner.len() {
        if inner[i] == b' ' || inner[i] == b'\t' {
            i += 1;
            continue;
        }
        match inner[i] {
            b'#' | b'.' => {
                let kind = inner[i];
                i += 1;
                let start = i;
                while i < inner.len() && !util::is_space(inner[i]) {
                    i += 1;
                }
                if i == start {
                    return None;
                }
                if kind == b'#' {
                    out.retain(|(name, _)| name != b"id");
                    out.push((b"id".to_vec(), inner[start..i].to_vec()));
                } else {
                    if !classes.is_empty() {
                        classes.push(b' ');
                    }
                    classes.extend_from_slice(&inner[start..i]);
                }
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let start = i;
                while i < inner.len()
                    && (inner[i].is_ascii_alphanumeric() || matches!(inner[i], b'_' | b'-' | b':'))
                {
                    i += 1;
                }
                if i >= inner.len() || inner[i] != b'=' {
                    return None;
                }
                let name = inner[start..i].to_vec();
                i += 1;
                let value = if i < inner.len() && (inner[i] == b'"' || inner[i] == b'\'') {
                    let quote = inner[i];
                    i += 1;
                    let vstart = i;
                    while i < inner.len() && inner[i] != quote {
                        i += 1;
                    }
                    if i >= inner.len() {
                        return None;
                    }
                    let v = inner[vstart..i].to_vec();
                    i += 1;
                    v
                } else {
                    let vstart = i;
                    while i < inner.len() && !util::is_space(inner[i]) {
                        i += 1;
                    }
                    inner[vstart..i].to_vec()
                };
                out.push((name, value));
            }
            _ => return None,
        }
    }
    if !classes.is_empty() {
        out.push((b"class".to_vec(), classes));
    }
    if out.is_empty() { None } else { Some(out) }
}

// ---------------------------------------------------------------------------
// Indented code block

pub struct CodeBlockParser;

impl BlockParser for CodeBlockParser {
    fn open(
        &self,
        _parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State) {
        let Some((line, _)) = reader.peek_line() else {
            return (None, State::NO_CHILDREN);
        };
        let (w, _) = util::indent_width(&line, 0);
        if w < 4 || util::is_blank(&line) {
            return (None, State::NO_CHILDREN);
        }
        let (pos, padding) = util::dedent_position(&line, 4);
        reader.advance_and_set_padding(pos, padding);
        let node = pc.tree_mut().alloc(NodeKind::CodeBlock, NodeData::None);
        if let Some((_, segment)) = reader.peek_line() {
            let advance = segment.len().saturating_sub(1);
            pc.tree_mut().lines_mut(node).append(segment);
            reader.advance(advance);
        }
        (Some(node), State::NO_CHILDREN)
    }

    fn cont(&self, node: NodeId, reader: &mut LineReader<'_>, pc: &mut Context<'_>) -> State {
        let Some((line, segment)) = reader.peek_line() else {
            return State::CLOSE;
        };
        if util::is_blank(&line) {
            let dedented = segment.trim_left_space_width(4, pc.source());
            let advance = segment.len().saturating_sub(1);
            pc.tree_mut().lines_mut(node).append(dedented);
            reader.advance(advance);
            return State::CONTINUE | State::NO_CHILDREN;
        }
        let (w, _) = util::indent_width(&line, 0);
        if w < 4 {
            return State::CLOSE;
        }
        let (pos, padding) = util::dedent_position(&line, 4);
        reader.advance_and_set_padding(pos, padding);
        if let Some((_, segment)) = reader.peek_line() {
            let advance = segment.len().saturating_sub(1);
            pc.tree_mut().lines_mut(node).append(segment);
            reader.advance(advance);
        }
        State::CONTINUE | State::NO_CHILDREN
    }

    fn close(&self, node: NodeId, pc: &mut Context<'_>) {
        // Trailing blank lines belong to the document, not the block.
        let source = pc.source();
        let lines = pc.tree().lines(node);
        let mut keep = lines.len();
        while keep > 0 {
            let value = lines.at(keep - 1).value(source).into_owned();
            if util::is_blank(&value) {
                keep -= 1;
            } else {
                break;
            }
        }
        if keep < lines.len() {
            let mut trimmed = Segments::new();
            for i in 0..keep {
                trimmed.append(lines.at(i));
            }
            pc.tree_mut().set_lines(node, trimmed);
        }
    }

    fn can_interrupt_paragraph(&self) -> bool {
        false
    }

    fn can_accept_indented_line(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Fenced code block

pub struct FencedCodeBlockParser;

impl BlockParser for FencedCodeBlockParser {
    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b"`~")
    }

    fn open(
        &self,
        _parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State) {
        let Some((line, segment)) = reader.peek_line() else {
            return (None, State::NO_CHILDREN);
        };
        let pos = pc.block_offset();
        let fence_char = line[pos];
        let mut i = pos;
        while i < line.len() && line[i] == fence_char {
            i += 1;
        }
        let fence_length = i - pos;
        if fence_length < 3 {
            return (None, State::NO_CHILDREN);
        }
        let rest = &line[i..];
        let info_trim_left = util::trim_left_space_length(rest);
        let info_trim_right = util::trim_right_space_length(rest);
        let info = if info_trim_left + info_trim_right >= rest.len() {
            None
        } else {
            let value = &rest[info_trim_left..rest.len() - info_trim_right];
            if fence_char == b'`' && value.contains(&b'`') {
                // An info string on a backtick fence cannot contain backticks.
                return (None, State::NO_CHILDREN);
            }
            Some(Segment::new(
                byte_pos(&segment, i + info_trim_left),
                byte_pos(&segment, rest.len() + i - info_trim_right),
            ))
        };
        let (fence_indent, _) = util::indent_width(&line, 0);
        let node = pc.tree_mut().alloc(
            NodeKind::FencedCodeBlock,
            NodeData::FencedCodeBlock {
                info,
                fence_char,
                fence_indent,
                fence_length,
            },
        );
        reader.advance(segment.len().saturating_sub(1));
        (Some(node), State::NO_CHILDREN)
    }

    fn cont(&self, node: NodeId, reader: &mut LineReader<'_>, pc: &mut Context<'_>) -> State {
        let Some((line, segment)) = reader.peek_line() else {
            return State::CLOSE;
        };
        let (fence_char, fence_indent, fence_length) = match pc.tree().data(node) {
            NodeData::FencedCodeBlock {
                fence_char,
                fence_indent,
                fence_length,
                ..
            } => (*fence_char, *fence_indent, *fence_length),
            _ => return State::CLOSE,
        };
        let (w, pos) = util::indent_width(&line, 0);
        if w <= 3 && pos < line.len() && line[pos] == fence_char {
            let mut i = pos;
            while i < line.len() && line[i] == fence_char {
                i += 1;
            }
            if i - pos >= fence_length && util::is_blank(&line[i..]) {
                reader.advance(segment.len().saturating_sub(1));
                return State::CLOSE;
            }
        }
        let dedented = segment.trim_left_space_width(fence_indent, pc.source());
        let advance = segment.len().saturating_sub(1);
        pc.tree_mut().lines_mut(node).append(dedented);
        reader.advance(advance);
        State::CONTINUE | State::NO_CHILDREN
    }

    fn can_interrupt_paragraph(&self) -> bool {
        true
    }

    fn can_accept_indented_line(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Blockquote

pub struct BlockquoteParser;

impl BlockquoteParser {
    /// Consumes the `>` marker and one following space, splitting a tab when
    /// only part of it belongs to the marker.
    fn process(&self, reader: &mut LineReader<'_>) -> bool {
        let Some((line, _)) = reader.peek_line() else {
            return false;
        };
        let (w, pos) = util::indent_width(&line, 0);
        if w > 3 || pos >= line.len() || line[pos] != b'>' {
            return false;
        }
        let mut i = pos + 1;
        let mut padding = 0;
        if i < line.len() {
            match line[i] {
                b' ' => i += 1,
                b'\t' => {
                    // One column of the tab serves as the marker's space.
                    padding = util::tab_width(w + 1) - 1;
                    i += 1;
                }
                _ => {}
            }
        }
        reader.advance_and_set_padding(i, padding);
        true
    }
}

impl BlockParser for BlockquoteParser {
    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b">")
    }

    fn open(
        &self,
        _parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State) {
        if !self.process(reader) {
            return (None, State::NO_CHILDREN);
        }
        let node = pc.tree_mut().alloc(NodeKind::Blockquote, NodeData::None);
        (Some(node), State::HAS_CHILDREN)
    }

    fn cont(&self, _node: NodeId, reader: &mut LineReader<'_>, _pc: &mut Context<'_>) -> State {
        if self.process(reader) {
            State::CONTINUE | State::HAS_CHILDREN
        } else {
            State::CLOSE
        }
    }

    fn can_interrupt_paragraph(&self) -> bool {
        true
    }

    fn can_accept_indented_line(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// List and list item

const LIST_TRIGGER: &[u8] = b"-+*0123456789";

pub(crate) struct ListMarker {
    pub ordered: bool,
    pub start: usize,
    pub marker: u8,
    /// Bytes from the line head through the post-marker whitespace.
    pub consumed_bytes: usize,
    /// Leftover columns of a tab split by the content boundary.
    pub padding: usize,
    /// Column where the item's content begins, including `base_col`.
    pub content_col: usize,
    pub empty: bool,
}

/// Parses a list item marker at up to three spaces of indentation. The line
/// begins at column `base_col` of the logical row, which anchors tab stops.
pub(crate) fn parse_list_item_marker(line: &[u8], base_col: usize) -> Option<ListMarker> {
    if is_thematic_break_line(line, 0) {
        return None;
    }
    let mut idx = 0;
    while idx < line.len() && idx < 3 && line[idx] == b' ' {
        idx += 1;
    }
    if idx < line.len() && line[idx] == b' ' {
        return None;
    }
    if idx >= line.len() {
        return None;
    }

    let (ordered, start, marker, marker_end) = match line[idx] {
        b'-' | b'+' | b'*' => (false, 0, line[idx], idx + 1),
        b'0'..=b'9' => {
            let digit_start = idx;
            let mut j = idx;
            while j < line.len() && line[j].is_ascii_digit() {
                j += 1;
            }
            if j - digit_start > 9 || j >= line.len() {
                return None;
            }
            let delimiter = line[j];
            if delimiter != b'.' && delimiter != b')' {
                return None;
            }
            let text = std::str::from_utf8(&line[digit_start..j]).ok()?;
            (true, text.parse::<usize>().ok()?, delimiter, j + 1)
        }
        _ => return None,
    };

    // All marker bytes are single-column ASCII, so columns equal bytes here.
    let col0 = base_col + marker_end;
    let mut ws_cols = 0usize;
    let mut has_content = false;
    {
        let mut col = col0;
        for &b in &line[marker_end..] {
            match b {
                b' ' => {
                    ws_cols += 1;
                    col += 1;
                }
                b'\t' => {
                    ws_cols += util::tab_width(col);
                    col = col0 + ws_cols;
                }
                b'\n' | b'\r' => break,
                _ => {
                    has_content = true;
                    break;
                }
            }
        }
    }

    if ws_cols == 0 && has_content {
        return None;
    }
    if !has_content {
        // An empty item: everything after the marker is whitespace.
        let mut consumed = marker_end;
        while consumed < line.len() && matches!(line[consumed], b' ' | b'\t') {
            consumed += 1;
        }
        return Some(ListMarker {
            ordered,
            start,
            marker,
            consumed_bytes: consumed,
            padding: 0,
            content_col: col0 + 1,
            empty: true,
        });
    }

    // Between one and four columns of whitespace separate the marker from
    // the content; five or more read as one space plus indented code.
    let take = if ws_cols >= 5 { 1 } else { ws_cols };
    let (delta, padding) = util::indent_position(&line[marker_end..], col0, take)
        .unwrap_or((ws_cols.min(line.len() - marker_end), 0));
    Some(ListMarker {
        ordered,
        start,
        marker,
        consumed_bytes: marker_end + delta,
        padding,
        content_col: col0 + take,
        empty: false,
    })
}

pub struct ListParser;

fn last_item_offset(tree: &Tree, list: NodeId) -> usize {
    tree.last_child(list)
        .and_then(|item| match tree.data(item) {
            NodeData::ListItem { offset, .. } => Some(*offset),
            _ => None,
        })
        .unwrap_or(0)
}

impl BlockParser for ListParser {
    fn trigger(&self) -> Option<&'static [u8]> {
        Some(LIST_TRIGGER)
    }

    fn open(
        &self,
        parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State) {
        // Inside an open list only the item parser may claim the line.
        if pc.tree().kind(parent) == NodeKind::List {
            return (None, State::NO_CHILDREN);
        }
        let Some((line, _)) = reader.peek_line() else {
            return (None, State::NO_CHILDREN);
        };
        let marker = match parse_list_item_marker(&line, reader.line_offset()) {
            Some(marker) => marker,
            None => return (None, State::NO_CHILDREN),
        };
        // An interrupting list item must be non-empty, and an ordered one
        // must start at 1.
        if let Some(last) = pc.last_opened_block()
            && pc.tree().kind(last.node) == NodeKind::Paragraph
            && pc.tree().parent(last.node).is_some()
            && (marker.empty || (marker.ordered && marker.start != 1))
        {
            return (None, State::NO_CHILDREN);
        }
        let node = pc.tree_mut().alloc(
            NodeKind::List,
            NodeData::List {
                marker: marker.marker,
                ordered: marker.ordered,
                start: marker.start,
                tight: true,
            },
        );
        (Some(node), State::HAS_CHILDREN)
    }

    fn cont(&self, node: NodeId, reader: &mut LineReader<'_>, pc: &mut Context<'_>) -> State {
        let Some((line, _)) = reader.peek_line() else {
            return State::CLOSE;
        };
        if util::is_blank(&line) {
            // A list item can begin with at most one blank line.
            if let Some(item) = pc.tree().last_child(node)
                && !pc.tree().has_children(item)
            {
                return State::CLOSE;
            }
            return State::CONTINUE | State::HAS_CHILDREN;
        }
        let base = reader.line_offset();
        let (indent, _) = util::indent_width(&line, base);
        let offset = last_item_offset(pc.tree(), node);
        if base + indent < offset {
            match parse_list_item_marker(&line, base) {
                Some(marker) => {
                    let compatible = match pc.tree().data(node) {
                        NodeData::List {
                            marker: list_marker,
                            ordered,
                            ..
                        } => marker.marker == *list_marker && marker.ordered == *ordered,
                        _ => false,
                    };
                    if compatible {
                        return State::CONTINUE | State::HAS_CHILDREN;
                    }
                    return State::CLOSE;
                }
                None => return State::CLOSE,
            }
        }
        State::CONTINUE | State::HAS_CHILDREN
    }

    fn close(&self, node: NodeId, pc: &mut Context<'_>) {
        // A list is loose when a blank line separates items or any item's
        // direct children.
        let tree = pc.tree();
        let mut tight = true;
        for (index, item) in tree.children(node).enumerate() {
            if index > 0 && tree.has_blank_previous_lines(item) {
                tight = false;
                break;
            }
            for (cindex, child) in tree.children(item).enumerate() {
                if cindex > 0 && tree.has_blank_previous_lines(child) {
                    tight = false;
                    break;
                }
            }
            if !tight {
                break;
            }
        }
        if let NodeData::List { tight: t, .. } = pc.tree_mut().data_mut(node) {
            *t = tight;
        }
        if tight {
            // Tight list items render their paragraphs without wrappers.
            let items: Vec<NodeId> = pc.tree().children(node).collect();
            for item in items {
                let children: Vec<NodeId> = pc.tree().children(item).collect();
                for child in children {
                    if pc.tree().kind(child) == NodeKind::Paragraph {
                        pc.tree_mut().set_kind(child, NodeKind::TextBlock);
                    }
                }
            }
        }
    }

    fn can_interrupt_paragraph(&self) -> bool {
        true
    }

    fn can_accept_indented_line(&self) -> bool {
        false
    }
}

pub struct ListItemParser;

impl BlockParser for ListItemParser {
    fn trigger(&self) -> Option<&'static [u8]> {
        Some(LIST_TRIGGER)
    }

    fn open(
        &self,
        parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State) {
        let (list_marker, list_ordered) = match pc.tree().data(parent) {
            NodeData::List {
                marker, ordered, ..
            } => (*marker, *ordered),
            _ => return (None, State::NO_CHILDREN),
        };
        let Some((line, _)) = reader.peek_line() else {
            return (None, State::NO_CHILDREN);
        };
        let marker = match parse_list_item_marker(&line, reader.line_offset()) {
            Some(marker) => marker,
            None => return (None, State::NO_CHILDREN),
        };
        if marker.marker != list_marker || marker.ordered != list_ordered {
            return (None, State::NO_CHILDREN);
        }
        let node = pc.tree_mut().alloc(
            NodeKind::ListItem,
            NodeData::ListItem {
                offset: marker.content_col,
                marker: marker.marker,
            },
        );
        reader.advance_and_set_padding(marker.consumed_bytes, marker.padding);
        (Some(node), State::HAS_CHILDREN)
    }

    fn cont(&self, node: NodeId, reader: &mut LineReader<'_>, pc: &mut Context<'_>) -> State {
        let Some((line, _)) = reader.peek_line() else {
            return State::CLOSE;
        };
        if util::is_blank(&line) {
            return State::CONTINUE | State::HAS_CHILDREN;
        }
        let offset = match pc.tree().data(node) {
            NodeData::ListItem { offset, .. } => *offset,
            _ => return State::CLOSE,
        };
        let base = reader.line_offset();
        let (indent, _) = util::indent_width(&line, base);
        if base + indent < offset {
            return State::CLOSE;
        }
        let need = offset.saturating_sub(base);
        if need > 0 {
            if let Some((pos, padding)) = util::indent_position(&line, base, need) {
                reader.advance_and_set_padding(pos, padding);
            }
        }
        State::CONTINUE | State::HAS_CHILDREN
    }

    fn can_interrupt_paragraph(&self) -> bool {
        true
    }

    fn can_accept_indented_line(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// HTML block

pub struct HtmlBlockParser;

const TYPE1_TAGS: &[&[u8]] = &[b"pre", b"script", b"style", b"textarea"];

const BLOCK_TAGS: &[&[u8]] = &[
    b"address",
    b"article",
    b"aside",
    b"base",
    b"basefont",
    b"blockquote",
    b"body",
    b"caption",
    b"center",
    b"col",
    b"colgroup",
    b"dd",
    b"details",
    b"dialog",
    b"dir",
    b"div",
    b"dl",
    b"dt",
    b"fieldset",
    b"figcaption",
    b"figure",
    b"footer",
    b"form",
    b"frame",
    b"frameset",
    b"h1",
    b"h2",
    b"h3",
    b"h4",
    b"h5",
    b"h6",
    b"head",
    b"header",
    b"hr",
    b"html",
    b"iframe",
    b"legend",
    b"li",
    b"link",
    b"main",
    b"menu",
    b"menuitem",
    b"nav",
    b"noframes",
    b"ol",
    b"optgroup",
    b"option",
    b"p",
    b"param",
    b"search",
    b"section",
    b"summary",
    b"table",
    b"tbody",
    b"td",
    b"tfoot",
    b"th",
    b"thead",
    b"title",
    b"tr",
    b"track",
    b"ul",
];

struct HtmlTag<'a> {
    name: &'a [u8],
    after: usize,
    closing: bool,
}

fn parse_html_tag_name(text: &[u8]) -> Option<HtmlTag<'_>> {
    if text.first()? != &b'<' {
        return None;
    }
    let mut idx = 1;
    let mut closing = false;
    if idx < text.len() && text[idx] == b'/' {
        closing = true;
        idx += 1;
    }
    if idx >= text.len() || !text[idx].is_ascii_alphabetic() {
        return None;
    }
    let start = idx;
    idx += 1;
    while idx < text.len() && (text[idx].is_ascii_alphanumeric() || text[idx] == b'-') {
        idx += 1;
    }
    Some(HtmlTag {
        name: &text[start..idx],
        after: idx,
        closing,
    })
}

fn is_tag_boundary(text: &[u8], idx: usize) -> bool {
    match text.get(idx) {
        None => true,
        Some(&b) => b.is_ascii_whitespace() || b == b'>' || b == b'/',
    }
}

fn is_type1_tag(name: &[u8]) -> bool {
    TYPE1_TAGS.iter().any(|t| name.eq_ignore_ascii_case(t))
}

fn match_type6(text: &[u8]) -> bool {
    let Some(tag) = parse_html_tag_name(text) else {
        return false;
    };
    if !is_tag_boundary(text, tag.after) {
        return false;
    }
    BLOCK_TAGS.iter().any(|t| tag.name.eq_ignore_ascii_case(t))
}

/// Scans a complete open or closing tag starting at `text[0] == '<'` and
/// returns the position of the final `>`.
pub(crate) fn parse_html_tag_end(text: &[u8]) -> Option<usize> {
    if text.len() < 2 || text[0] != b'<' {
        return None;
    }
    let tag = parse_html_tag_name(text)?;
    let mut i = tag.after;
    if tag.closing {
        while i < text.len() && text[i].is_ascii_whitespace() {
            i += 1;
        }
        return if i < text.len() && text[i] == b'>' {
            Some(i)
        } else {
            None
        };
    }
    loop {
        let before_ws = i;
        while i < text.len() && text[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= text.len() {
            return None;
        }
        if text[i] == b'>' {
            return Some(i);
        }
        if text[i] == b'/' && i + 1 < text.len() && text[i + 1] == b'>' {
            return Some(i + 1);
        }
        if before_ws == i {
            // Attributes must be separated by whitespace.
            return None;
        }
        if !(text[i].is_ascii_alphabetic() || text[i] == b'_' || text[i] == b':') {
            return None;
        }
        i += 1;
        while i < text.len()
            && (text[i].is_ascii_alphanumeric() || matches!(text[i], b'_' | b':' | b'.' | b'-'))
        {
            i += 1;
        }
        let after_name = i;
        let mut ws = i;
        while ws < text.len() && text[ws].is_ascii_whitespace() {
            ws += 1;
        }
        if ws < text.len() && text[ws] == b'=' {
            i = ws + 1;
            while i < text.len() && text[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= text.len() {
                return None;
            }
            let quote = text[i];
            if quote == b'"' || quote == b'\'' {
                i += 1;
                while i < text.len() && text[i] != quote {
                    i += 1;
                }
                if i >= text.len() {
                    return None;
                }
                i += 1;
            } else {
                let mut consumed = false;
                while i < text.len() {
                    let b = text[i];
                    if b.is_ascii_whitespace() || b == b'>' {
                        break;
                    }
                    if b == b'/' && i + 1 < text.len() && text[i + 1] == b'>' {
                        break;
                    }
                    if matches!(b, b'"' | b'\'' | b'=' | b'<' | b'`') {
                        return None;
                    }
                    consumed = true;
                    i += 1;
                }
                if !consumed {
                    return None;
                }
            }
        } else {
            i = after_name;
        }
    }
}

fn match_type7(text: &[u8]) -> bool {
    let Some(end) = parse_html_tag_end(text) else {
        return false;
    };
    if let Some(tag) = parse_html_tag_name(text)
        && is_type1_tag(tag.name)
    {
        return false;
    }
    text[end + 1..]
        .iter()
        .all(|&b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}

fn match_html_block_start(text: &[u8], interruption: bool) -> Option<HtmlBlockType> {
    if let Some(tag) = parse_html_tag_name(text)
        && !tag.closing
        && is_tag_boundary(text, tag.after)
        && is_type1_tag(tag.name)
    {
        return Some(HtmlBlockType::Type1);
    }
    if text.starts_with(b"<!--") {
        return Some(HtmlBlockType::Type2);
    }
    if text.starts_with(b"<?") {
        return Some(HtmlBlockType::Type3);
    }
    if text.starts_with(b"<![CDATA[") {
        return Some(HtmlBlockType::Type5);
    }
    if text.starts_with(b"<!")
        && matches!(text.get(2), Some(b) if b.is_ascii_alphabetic())
    {
        return Some(HtmlBlockType::Type4);
    }
    if match_type6(text) {
        return Some(HtmlBlockType::Type6);
    }
    if !interruption && match_type7(text) {
        return Some(HtmlBlockType::Type7);
    }
    None
}

fn contains_closing_tag(line: &[u8]) -> bool {
    let mut i = 0;
    while i < line.len() {
        if line[i] == b'<'
            && let Some(tag) = parse_html_tag_name(&line[i..])
            && tag.closing
            && is_type1_tag(tag.name)
        {
            return true;
        }
        i += 1;
    }
    false
}

fn contains_seq(line: &[u8], needle: &[u8]) -> bool {
    line.windows(needle.len()).any(|w| w == needle)
}

fn html_block_end(html_type: HtmlBlockType, line: &[u8]) -> bool {
    match html_type {
        HtmlBlockType::Type1 => contains_closing_tag(line),
        HtmlBlockType::Type2 => contains_seq(line, b"-->"),
        HtmlBlockType::Type3 => contains_seq(line, b"?>"),
        HtmlBlockType::Type4 => line.contains(&b'>'),
        HtmlBlockType::Type5 => contains_seq(line, b"]]>"),
        HtmlBlockType::Type6 | HtmlBlockType::Type7 => false,
    }
}

impl BlockParser for HtmlBlockParser {
    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b"<")
    }

    fn open(
        &self,
        _parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State) {
        let Some((line, segment)) = reader.peek_line() else {
            return (None, State::NO_CHILDREN);
        };
        let pos = pc.block_offset();
        let interrupting = pc
            .last_opened_block()
            .map(|b| pc.tree().kind(b.node) == NodeKind::Paragraph)
            .unwrap_or(false);
        let Some(html_type) = match_html_block_start(&line[pos..], interrupting) else {
            return (None, State::NO_CHILDREN);
        };
        let node = pc.tree_mut().alloc(
            NodeKind::HtmlBlock,
            NodeData::HtmlBlock {
                html_type,
                closure_line: None,
            },
        );
        if !html_type.ends_on_blank_line() && html_block_end(html_type, &line[pos..]) {
            if let NodeData::HtmlBlock { closure_line, .. } = pc.tree_mut().data_mut(node) {
                *closure_line = Some(segment.clone());
            }
        } else {
            pc.tree_mut().lines_mut(node).append(segment.clone());
        }
        reader.advance(segment.len().saturating_sub(1));
        (Some(node), State::NO_CHILDREN)
    }

    fn cont(&self, node: NodeId, reader: &mut LineReader<'_>, pc: &mut Context<'_>) -> State {
        let html_type = match pc.tree().data(node) {
            NodeData::HtmlBlock {
                html_type,
                closure_line,
            } => {
                if closure_line.is_some() {
                    return State::CLOSE;
                }
                *html_type
            }
            _ => return State::CLOSE,
        };
        let Some((line, segment)) = reader.peek_line() else {
            return State::CLOSE;
        };
        if html_type.ends_on_blank_line() {
            if util::is_blank(&line) {
                return State::CLOSE;
            }
            let advance = segment.len().saturating_sub(1);
            pc.tree_mut().lines_mut(node).append(segment);
            reader.advance(advance);
            return State::CONTINUE | State::NO_CHILDREN;
        }
        if html_block_end(html_type, &line) {
            if let NodeData::HtmlBlock { closure_line, .. } = pc.tree_mut().data_mut(node) {
                *closure_line = Some(segment.clone());
            }
            reader.advance(segment.len().saturating_sub(1));
            return State::CLOSE;
        }
        let advance = segment.len().saturating_sub(1);
        pc.tree_mut().lines_mut(node).append(segment);
        reader.advance(advance);
        State::CONTINUE | State::NO_CHILDREN
    }

    fn can_interrupt_paragraph(&self) -> bool {
        true
    }

    fn can_accept_indented_line(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Link reference definitions

pub struct LinkReferenceParagraphTransformer;

impl ParagraphTransformer for LinkReferenceParagraphTransformer {
    fn transform(&self, node: NodeId, pc: &mut Context<'_>) {
        strip_link_reference_definitions(pc, node);
    }
}

/// Strips leading link reference definitions from the paragraph's lines,
/// registering each with the context. Removes the paragraph entirely when
/// nothing remains.
pub(crate) fn strip_link_reference_definitions(pc: &mut Context<'_>, node: NodeId) {
    let source = pc.source();
    let lines = pc.tree().lines(node).clone();
    if lines.is_empty() {
        return;
    }
    let mut buf: Vec<u8> = Vec::new();
    let mut line_ends: Vec<usize> = Vec::new();
    for segment in lines.iter() {
        buf.extend_from_slice(&segment.value(source));
        if buf.last() != Some(&b'\n') {
            buf.push(b'\n');
        }
        line_ends.push(buf.len());
    }

    let mut offset = 0;
    while let Some((reference, next)) = parse_reference_definition(&buf, offset) {
        pc.add_reference(reference);
        offset = next;
        if offset >= buf.len() {
            break;
        }
    }
    if offset == 0 {
        return;
    }

    let consumed_lines = line_ends.iter().filter(|&&end| end <= offset).count();
    if consumed_lines >= lines.len() {
        pc.tree_mut().detach(node);
        return;
    }
    let mut remaining = Segments::new();
    for i in consumed_lines..lines.len() {
        remaining.append(lines.at(i));
    }
    pc.tree_mut().set_lines(node, remaining);
}

/// Parses one `[label]: destination "title"` definition starting at
/// `offset`; a successful parse always ends at a line boundary.
fn parse_reference_definition(buf: &[u8], offset: usize) -> Option<(Reference, usize)> {
    let mut i = offset;
    while i < buf.len() && matches!(buf[i], b' ' | b'\t') {
        i += 1;
    }
    if i >= buf.len() || buf[i] != b'[' {
        return None;
    }
    let label_close = util::find_closure(&buf[i + 1..], b'[', b']', false, false)?;
    if label_close > 999 {
        return None;
    }
    let label = &buf[i + 1..i + 1 + label_close];
    if util::is_blank(label) {
        return None;
    }
    i = i + 1 + label_close + 1;
    if i >= buf.len() || buf[i] != b':' {
        return None;
    }
    i += 1;

    i = skip_spaces_one_newline(buf, i)?;

    // Destination: <...> or a run of non-space characters with balanced
    // parentheses.
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
        while i < buf.len() && !util::is_space(buf[i]) {
            match buf[i] {
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
        if i == start || depth != 0 {
            return None;
        }
        destination = buf[start..i].to_vec();
    }

    // The definition is valid here if the rest of the line is blank.
    let end_without_title = blank_to_line_end(buf, i);

    // Optional title, separated by whitespace with at most one newline.
    let title_try = skip_spaces_one_newline(buf, i);
    if let Some(mut j) = title_try
        && j > i
        && j < buf.len()
        && matches!(buf[j], b'"' | b'\'' | b'(')
    {
        let open = buf[j];
        let close = if open == b'(' { b')' } else { open };
        j += 1;
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
                break;
            }
            if b == b'\n' && j + 1 < buf.len() && buf[j + 1] == b'\n' {
                // A title cannot span a blank line.
                break;
            }
            j += 1;
        }
        if ok {
            let title = buf[title_start..j].to_vec();
            if let Some(end) = blank_to_line_end(buf, j + 1) {
                return Some((
                    Reference {
                        label: label.to_vec(),
                        destination,
                        title,
                    },
                    end,
                ));
            }
        }
    }

    let end = end_without_title?;
    Some((
        Reference {
            label: label.to_vec(),
            destination,
            title: Vec::new(),
        },
        end,
    ))
}

/// Skips spaces and at most one newline; two newlines make a blank line and
/// fail the construct.
fn skip_spaces_one_newline(buf: &[u8], mut i: usize) -> Option<usize> {
    let mut newlines = 0;
    while i < buf.len() {
        match buf[i] {
            b' ' | b'\t' | b'\r' => i += 1,
            b'\n' => {
                newlines += 1;
                if newlines > 1 {
                    return None;
                }
                i += 1;
            }
            _ => break,
        }
    }
    if i >= buf.len() {
        return None;
    }
    Some(i)
}

/// If everything from `i` to the end of the line is blank, returns the
/// offset just past the newline.
fn blank_to_line_end(buf: &[u8], mut i: usize) -> Option<usize> {
    while i < buf.len() {
        match buf[i] {
            b' ' | b'\t' | b'\r' => i += 1,
            b'\n' => return Some(i + 1),
            _ => return None,
        }
    }
    Some(i)
}
