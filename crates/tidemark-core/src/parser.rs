//! The two-phase parser: a block scanner that builds a tree of container and
//! leaf blocks with their source segments, then an inline pass that replaces
//! each non-raw leaf's content with inline nodes. Block parsers, inline
//! parsers and transformers register with priorities; the registration lists
//! freeze on the first parse.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::ops::BitOr;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::ast::{self, DelimiterData, NodeData, NodeId, NodeKind, Tree};
use crate::label::normalize_link_label;
use crate::reader::{BlockReader, LineReader};
use crate::segment::Segment;
use crate::util;

/// Result states of block parser open/continue calls, combined as a bitset.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct State(u8);

impl State {
    pub const NONE: State = State(0);
    /// The parser consumed the line and stays open.
    pub const CONTINUE: State = State(1 << 1);
    /// The parser cannot parse any further.
    pub const CLOSE: State = State(1 << 2);
    /// The block is a container; try to open children on the same line.
    pub const HAS_CHILDREN: State = State(1 << 3);
    /// The block is a leaf.
    pub const NO_CHILDREN: State = State(1 << 4);

    pub fn contains(self, other: State) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for State {
    type Output = State;

    fn bitor(self, rhs: State) -> State {
        State(self.0 | rhs.0)
    }
}

/// A named link reference registered by a reference definition.
#[derive(Clone, Debug, PartialEq)]
pub struct Reference {
    pub label: Vec<u8>,
    pub destination: Vec<u8>,
    pub title: Vec<u8>,
}

/// Options consulted by the default parsers. Extensions carry their own
/// option structs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParserOptions {
    /// Generate `id` attributes for headings from their text.
    pub auto_heading_id: bool,
    /// Parse `{#id key=val}` attribute blocks after ATX headings.
    pub attribute: bool,
    /// A backslash-escaped space joins words: inline scanners must not
    /// treat it as a boundary. Set by the CJK extension.
    pub escaped_space: bool,
}

/// Parses one kind of block. `open` is tried against the current line in
/// priority order; `cont` keeps an already-open block alive line by line.
/// `open` and `cont` must not advance the reader beyond the current line;
/// violating this is a programmer error and panics.
pub trait BlockParser: Send + Sync {
    /// Bytes that may start this construct, checked against the first
    /// non-space byte of the line. `None` means the parser is always tried.
    fn trigger(&self) -> Option<&'static [u8]> {
        None
    }

    fn open(
        &self,
        parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State);

    fn cont(&self, node: NodeId, reader: &mut LineReader<'_>, pc: &mut Context<'_>) -> State;

    fn close(&self, _node: NodeId, _pc: &mut Context<'_>) {}

    fn can_interrupt_paragraph(&self) -> bool;

    fn can_accept_indented_line(&self) -> bool;
}

/// Parses one kind of inline element at a trigger byte. A parser may consume
/// beyond the current line. Returning `None` restores the reader position
/// and falls through to the next candidate.
pub trait InlineParser: Send + Sync {
    /// Trigger bytes; must be ASCII punctuation, or the space byte which
    /// also fires at the start of a line.
    fn trigger(&self) -> &'static [u8];

    fn parse(
        &self,
        parent: NodeId,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
    ) -> Option<NodeId>;

    /// Called once after a block's inline content has been parsed.
    fn close_block(&self, _parent: NodeId, _pc: &mut Context<'_>) {}
}

/// Runs when a paragraph closes; may replace or remove the paragraph.
pub trait ParagraphTransformer: Send + Sync {
    fn transform(&self, node: NodeId, pc: &mut Context<'_>);
}

/// Runs once over the finished document tree.
pub trait AstTransformer: Send + Sync {
    fn transform(&self, doc: NodeId, pc: &mut Context<'_>);
}

/// Drives pairing for one family of delimiter runs (`*`/`_`, `~`, quotes).
pub trait DelimiterProcessor: Send + Sync {
    fn is_delimiter(&self, b: u8) -> bool;

    fn can_open_closer(&self, opener: &DelimiterData, closer: &DelimiterData) -> bool;

    /// Builds the node that replaces a matched pair consuming `consumes`
    /// characters from each side.
    fn on_match(&self, consumes: usize, tree: &mut Tree) -> NodeId;
}

/// A registered value with its priority; smaller runs earlier.
pub struct Prioritized<T> {
    pub value: T,
    pub priority: i32,
}

pub fn prioritized<T>(value: T, priority: i32) -> Prioritized<T> {
    Prioritized { value, priority }
}

#[derive(Clone, Copy, Debug)]
pub struct OpenedBlock {
    pub node: NodeId,
    parser: usize,
}

pub(crate) struct DelimiterRef {
    pub node: NodeId,
    pub processor: Arc<dyn DelimiterProcessor>,
}

/// Per-parse state: the tree under construction, the reference table, the
/// opened-block stack, the delimiter list of the block being inline-parsed,
/// and a keyed store for extension state.
pub struct Context<'a> {
    source: &'a [u8],
    options: ParserOptions,
    tree: Tree,
    refs: HashMap<String, Reference>,
    store: HashMap<&'static str, Box<dyn Any>>,
    block_offset: usize,
    opened_blocks: Vec<OpenedBlock>,
    pub(crate) delimiters: Vec<DelimiterRef>,
    ids: HashSet<String>,
}

impl<'a> Context<'a> {
    pub fn new(source: &'a [u8], options: ParserOptions) -> Self {
        Self {
            source,
            options,
            tree: Tree::new(),
            refs: HashMap::new(),
            store: HashMap::new(),
            block_offset: 0,
            opened_blocks: Vec::new(),
            delimiters: Vec::new(),
            ids: HashSet::new(),
        }
    }

    pub fn source(&self) -> &'a [u8] {
        self.source
    }

    pub fn options(&self) -> ParserOptions {
        self.options
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub(crate) fn into_tree(self) -> Tree {
        self.tree
    }

    /// Registers a reference; the first registration for a label wins.
    pub fn add_reference(&mut self, reference: Reference) {
        let key = normalize_link_label(&reference.label);
        self.refs.entry(key).or_insert(reference);
    }

    /// Looks up a reference by raw label; the label is normalized the same
    /// way registration normalizes it.
    pub fn reference(&self, label: &[u8]) -> Option<&Reference> {
        self.refs.get(&normalize_link_label(label))
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.refs.values()
    }

    /// First non-space byte position on the current line. Valid only during
    /// `BlockParser::open`.
    pub fn block_offset(&self) -> usize {
        self.block_offset
    }

    pub fn set_block_offset(&mut self, v: usize) {
        self.block_offset = v;
    }

    pub fn opened_blocks(&self) -> &[OpenedBlock] {
        &self.opened_blocks
    }

    pub fn last_opened_block(&self) -> Option<OpenedBlock> {
        self.opened_blocks.last().copied()
    }

    /// Generates a document-unique id slug from the given text.
    pub fn generate_id(&mut self, value: &[u8], fallback: &[u8]) -> Vec<u8> {
        util::generate_link_id(value, fallback, &mut self.ids)
    }

    pub fn get<T: 'static>(&self, key: &'static str) -> Option<&T> {
        self.store.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn get_mut<T: 'static>(&mut self, key: &'static str) -> Option<&mut T> {
        self.store.get_mut(key).and_then(|v| v.downcast_mut())
    }

    pub fn set(&mut self, key: &'static str, value: Box<dyn Any>) {
        self.store.insert(key, value);
    }

    /// Appends a scanned delimiter node to the tail of the delimiter list.
    pub fn push_delimiter(&mut self, node: NodeId, processor: Arc<dyn DelimiterProcessor>) {
        self.delimiters.push(DelimiterRef { node, processor });
    }

    pub fn delimiters_len(&self) -> usize {
        self.delimiters.len()
    }
}

/// Scans a delimiter run at the head of `line` and computes its can-open /
/// can-close flags from the Unicode classes of the characters around it.
/// `before` is the character immediately preceding the run.
pub fn scan_delimiter(
    line: &[u8],
    before: char,
    min: usize,
    processor: &dyn DelimiterProcessor,
) -> Option<DelimiterData> {
    if line.is_empty() {
        return None;
    }
    let c = line[0];
    if !processor.is_delimiter(c) {
        return None;
    }
    let mut i = 0;
    while i < line.len() && line[i] == c {
        i += 1;
    }
    if i < min {
        return None;
    }
    let after = if i < line.len() {
        util::char_at(line, i)
    } else {
        '\n'
    };

    let before_is_space = util::is_unicode_space(before);
    let after_is_space = util::is_unicode_space(after);
    let before_is_punct = util::is_unicode_punct(before);
    let after_is_punct = util::is_unicode_punct(after);

    let left_flanking =
        !after_is_space && (!after_is_punct || before_is_space || before_is_punct);
    let right_flanking =
        !before_is_space && (!before_is_punct || after_is_space || after_is_punct);

    let (can_open, can_close) = if c == b'_' {
        // Intra-word underscores stay literal: each side additionally
        // requires class asymmetry.
        (
            left_flanking && (!right_flanking || before_is_punct),
            right_flanking && (!left_flanking || after_is_punct),
        )
    } else {
        (left_flanking, right_flanking)
    };

    Some(DelimiterData {
        char: c,
        length: i,
        original_length: i,
        can_open,
        can_close,
        segment: Segment::default(),
    })
}

fn delimiter_data(tree: &Tree, node: NodeId) -> DelimiterData {
    match tree.data(node) {
        NodeData::Delimiter(d) => d.clone(),
        other => panic!("expected delimiter data, found {:?}", other),
    }
}

/// Degrades one delimiter node: surviving characters splice back into the
/// parent as plain text, an empty delimiter disappears.
fn degrade_delimiter(tree: &mut Tree, node: NodeId, source: &[u8]) {
    let d = delimiter_data(tree, node);
    if d.length != 0 {
        tree.merge_or_replace_text_segment(node, d.segment, source);
    } else {
        tree.detach(node);
    }
}

/// Pairs delimiter openers and closers registered since `bottom`, building
/// the processor's nodes and moving the enclosed inlines under them. The
/// standard left-to-right stack walk of CommonMark 6.5, including the
/// rule of three for emphasis runs.
pub fn process_delimiters(pc: &mut Context<'_>, bottom: usize) {
    let source = pc.source();
    let mut i = bottom;
    while i < pc.delimiters.len() {
        let closer_node = pc.delimiters[i].node;
        let closer = delimiter_data(pc.tree(), closer_node);
        if !closer.can_close {
            i += 1;
            continue;
        }
        // Search backward for a compatible opener, stopping at the bottom.
        let mut opener_found = None;
        let mut j = i;
        while j > bottom {
            j -= 1;
            let opener_node = pc.delimiters[j].node;
            let opener = delimiter_data(pc.tree(), opener_node);
            if !opener.can_open || !pc.delimiters[j].processor.can_open_closer(&opener, &closer) {
                continue;
            }
            // Rule of three: when one side could serve both roles, run
            // lengths summing to a multiple of three cannot pair unless
            // both are themselves multiples of three.
            if (opener.can_close || closer.can_open)
                && (opener.original_length + closer.original_length) % 3 == 0
                && (opener.original_length % 3 != 0 || closer.original_length % 3 != 0)
            {
                continue;
            }
            opener_found = Some((j, opener_node, opener));
            break;
        }
        let Some((j, opener_node, opener)) = opener_found else {
            if let NodeData::Delimiter(d) = pc.tree_mut().data_mut(closer_node) {
                d.can_close = false;
            }
            continue;
        };

        let consumes = if opener.length >= 2 && closer.length >= 2 {
            2
        } else {
            1
        };
        let processor = pc.delimiters[j].processor.clone();
        let wrap = processor.on_match(consumes, pc.tree_mut());
        let tree = pc.tree_mut();
        let parent = tree
            .parent(opener_node)
            .expect("delimiter must be attached");
        let mut child = tree.next_sibling(opener_node);
        while let Some(c) = child {
            if c == closer_node {
                break;
            }
            let next = tree.next_sibling(c);
            tree.append_child(wrap, c);
            child = next;
        }
        tree.insert_after(parent, opener_node, wrap);

        // Delimiters between the pair moved inside the new node and can no
        // longer match anything outside it.
        for k in (j + 1..i).rev() {
            let stale = pc.delimiters.remove(k);
            degrade_delimiter(pc.tree_mut(), stale.node, source);
        }
        let mut ci = j + 1;

        // Shrink the opener from its end.
        let opener_len = opener.length - consumes;
        if opener_len == 0 {
            pc.tree_mut().detach(opener_node);
            pc.delimiters.remove(j);
            ci -= 1;
        } else if let NodeData::Delimiter(d) = pc.tree_mut().data_mut(opener_node) {
            d.length = opener_len;
            d.segment.stop -= consumes;
        }
        // Shrink the closer from its start.
        let closer_len = closer.length - consumes;
        if closer_len == 0 {
            pc.tree_mut().detach(closer_node);
            pc.delimiters.remove(ci);
        }
        if closer_len != 0 {
            if let NodeData::Delimiter(d) = pc.tree_mut().data_mut(closer_node) {
                d.length = closer_len;
                d.segment.start += consumes;
            }
        }
        // Re-examine from the closer's slot: a surviving closer may close
        // earlier openers; a removed one leaves the next entry in its place.
        i = ci;
    }
}

/// Degrades every delimiter registered since `bottom` to plain text and
/// truncates the list.
pub fn clear_delimiters(pc: &mut Context<'_>, bottom: usize) {
    let source = pc.source();
    while pc.delimiters.len() > bottom {
        let entry = pc.delimiters.pop().expect("checked non-empty");
        degrade_delimiter(pc.tree_mut(), entry.node, source);
    }
}

struct Frozen {
    block_order: Vec<usize>,
    inline_order: Vec<usize>,
    inline_trigger: Vec<Vec<usize>>,
    paragraph_order: Vec<usize>,
    ast_order: Vec<usize>,
}

/// The block/inline parser host. Registration is mutable until the first
/// `parse` call freezes the priority order; a frozen parser is shareable
/// across threads, with each parse owning its own context.
pub struct Parser {
    options: ParserOptions,
    block_parsers: Vec<Prioritized<Box<dyn BlockParser>>>,
    inline_parsers: Vec<Prioritized<Box<dyn InlineParser>>>,
    paragraph_transformers: Vec<Prioritized<Box<dyn ParagraphTransformer>>>,
    ast_transformers: Vec<Prioritized<Box<dyn AstTransformer>>>,
    frozen: OnceCell<Frozen>,
}

impl Parser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            block_parsers: Vec::new(),
            inline_parsers: Vec::new(),
            paragraph_transformers: Vec::new(),
            ast_transformers: Vec::new(),
            frozen: OnceCell::new(),
        }
    }

    pub fn options(&self) -> ParserOptions {
        self.options
    }

    /// Registers a block parser. No effect once the parser is frozen.
    pub fn add_block_parser(&mut self, parser: Box<dyn BlockParser>, priority: i32) {
        self.block_parsers.push(prioritized(parser, priority));
    }

    pub fn add_inline_parser(&mut self, parser: Box<dyn InlineParser>, priority: i32) {
        self.inline_parsers.push(prioritized(parser, priority));
    }

    pub fn add_paragraph_transformer(
        &mut self,
        transformer: Box<dyn ParagraphTransformer>,
        priority: i32,
    ) {
        self.paragraph_transformers
            .push(prioritized(transformer, priority));
    }

    pub fn add_ast_transformer(&mut self, transformer: Box<dyn AstTransformer>, priority: i32) {
        self.ast_transformers.push(prioritized(transformer, priority));
    }

    fn freeze(&self) -> &Frozen {
        self.frozen.get_or_init(|| {
            let order = |priorities: Vec<i32>| -> Vec<usize> {
                let mut idx: Vec<usize> = (0..priorities.len()).collect();
                idx.sort_by_key(|&i| priorities[i]);
                idx
            };
            let block_order = order(self.block_parsers.iter().map(|p| p.priority).collect());
            let inline_order = order(self.inline_parsers.iter().map(|p| p.priority).collect());
            let mut inline_trigger = vec![Vec::new(); 256];
            for &i in &inline_order {
                for &b in self.inline_parsers[i].value.trigger() {
                    inline_trigger[b as usize].push(i);
                }
            }
            Frozen {
                block_order,
                inline_order,
                inline_trigger,
                paragraph_order: order(
                    self.paragraph_transformers
                        .iter()
                        .map(|p| p.priority)
                        .collect(),
                ),
                ast_order: order(self.ast_transformers.iter().map(|p| p.priority).collect()),
            }
        })
    }

    /// Parses the reader's source into a document tree. The returned tree's
    /// root is the document node.
    pub fn parse(&self, reader: &mut LineReader<'_>) -> (Tree, NodeId) {
        let state = self.freeze();
        let mut pc = Context::new(reader.source(), self.options);
        let root = pc.tree_mut().alloc(NodeKind::Document, NodeData::None);
        self.parse_blocks(state, root, reader, &mut pc);

        // Inline phase: children before parents, so that transformers built
        // nested structures see finished inlines.
        let mut blocks = Vec::new();
        collect_post_order(pc.tree(), root, &mut blocks);
        for node in blocks {
            self.parse_node_inlines(state, node, &mut pc);
        }

        for &i in &state.ast_order {
            self.ast_transformers[i].value.transform(root, &mut pc);
        }
        (pc.into_tree(), root)
    }

    fn transform_paragraph(&self, state: &Frozen, node: NodeId, pc: &mut Context<'_>) {
        for &i in &state.paragraph_order {
            self.paragraph_transformers[i].value.transform(node, pc);
            if pc.tree().parent(node).is_none() {
                break;
            }
        }
    }

    fn close_one(&self, state: &Frozen, ob: OpenedBlock, pc: &mut Context<'_>) {
        if pc.tree().parent(ob.node).is_some() {
            self.block_parsers[ob.parser].value.close(ob.node, pc);
            if pc.tree().kind(ob.node) == NodeKind::Paragraph
                && pc.tree().parent(ob.node).is_some()
            {
                self.transform_paragraph(state, ob.node, pc);
            }
        }
    }

    fn close_blocks(&self, state: &Frozen, from: usize, to: usize, pc: &mut Context<'_>) {
        for i in (to..=from).rev() {
            let ob = pc.opened_blocks[i];
            self.close_one(state, ob, pc);
        }
        pc.opened_blocks.drain(to..=from);
    }

    /// Closes exactly the given stack entries, deepest first. Used after an
    /// open attempt, which may have dropped detached entries and pushed new
    /// ones, shifting plain indices.
    fn close_listed_blocks(&self, state: &Frozen, nodes: &[NodeId], pc: &mut Context<'_>) {
        for k in (0..pc.opened_blocks.len()).rev() {
            let ob = pc.opened_blocks[k];
            if !nodes.contains(&ob.node) {
                continue;
            }
            self.close_one(state, ob, pc);
            pc.opened_blocks.remove(k);
        }
    }

    fn open_blocks(
        &self,
        state: &Frozen,
        parent: NodeId,
        blank_line: bool,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> BlockOpenResult {
        let mut result = BlockOpenResult::NoBlocksOpened;
        let mut parent = parent;
        let last_block = pc.last_opened_block();
        let continuable = last_block
            .map(|b| pc.tree().kind(b.node) == NodeKind::Paragraph)
            .unwrap_or(false);

        'retry: loop {
            let mut should_peek = true;
            let mut current_line = 0usize;
            let mut indent = 0usize;
            let mut first_byte = b'\n';
            for &bi in &state.block_order {
                let parser = &self.block_parsers[bi].value;
                if should_peek {
                    current_line = reader.position().0;
                    let Some((line, _)) = reader.peek_line() else {
                        break;
                    };
                    if line[0] == b'\n' {
                        break;
                    }
                    let (w, pos) = util::indent_width(&line, 0);
                    indent = w;
                    pc.set_block_offset(pos);
                    first_byte = if pos < line.len() { line[pos] } else { b'\n' };
                    should_peek = false;
                }
                if continuable
                    && result == BlockOpenResult::NoBlocksOpened
                    && !parser.can_interrupt_paragraph()
                {
                    continue;
                }
                if indent > 3 && !parser.can_accept_indented_line() {
                    continue;
                }
                if let Some(trigger) = parser.trigger()
                    && !trigger.contains(&first_byte)
                {
                    continue;
                }
                let last = pc.last_opened_block().map(|b| b.node);
                let (node, open_state) = parser.open(parent, reader, pc);
                if reader.position().0 != current_line {
                    panic!("BlockParser::open must not advance position beyond the current line");
                }
                if let Some(node) = node {
                    should_peek = true;
                    pc.tree_mut().set_blank_previous_lines(node, blank_line);
                    if let Some(last) = last
                        && pc.tree().parent(last).is_none()
                    {
                        // The opener detached the previous block (setext
                        // headings do this); drop it without closing.
                        let last_pos = pc.opened_blocks.len() - 1;
                        pc.opened_blocks.drain(last_pos..=last_pos);
                    }
                    pc.tree_mut().append_child(parent, node);
                    result = BlockOpenResult::NewBlocksOpened;
                    pc.opened_blocks.push(OpenedBlock { node, parser: bi });
                    if open_state.contains(State::HAS_CHILDREN) {
                        parent = node;
                        continue 'retry;
                    }
                }
                if node.is_some() {
                    break;
                }
            }
            break;
        }

        if result == BlockOpenResult::NoBlocksOpened && continuable {
            let lb = last_block.expect("continuable implies a last block");
            let st = self.block_parsers[lb.parser].value.cont(lb.node, reader, pc);
            if st.contains(State::CONTINUE) {
                result = BlockOpenResult::ParagraphContinuation;
            }
        }
        result
    }

    fn parse_blocks(
        &self,
        state: &Frozen,
        parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) {
        let mut blank_lines: Vec<LineStat> = Vec::with_capacity(64);
        loop {
            // Blocks are separated by runs of blank lines; remember the
            // count for blank-previous-line flags.
            let Some(skipped) = reader.skip_blank_lines() else {
                return;
            };
            if self.open_blocks(state, parent, skipped != 0, reader, pc)
                != BlockOpenResult::NewBlocksOpened
            {
                return;
            }
            let line_num = reader.position().0 as isize;
            for i in 0..pc.opened_blocks.len() {
                blank_lines.push(LineStat {
                    line_num: line_num - 1,
                    level: i,
                    is_blank: skipped != 0,
                });
            }
            reader.advance_line();

            while !pc.opened_blocks.is_empty() {
                let last_index = pc.opened_blocks.len() - 1;
                let mut i = 0;
                while i < pc.opened_blocks.len() {
                    let be = pc.opened_blocks[i];
                    let Some((line, _)) = reader.peek_line() else {
                        self.close_blocks(state, last_index, 0, pc);
                        return;
                    };
                    let line_num = reader.position().0 as isize;
                    blank_lines.push(LineStat {
                        line_num,
                        level: i,
                        is_blank: util::is_blank(&line),
                    });
                    // Paragraph continuation is decided inside open_blocks,
                    // so open paragraphs are not continued here.
                    if pc.tree().kind(be.node) != NodeKind::Paragraph {
                        let st = self.block_parsers[be.parser].value.cont(be.node, reader, pc);
                        if st.contains(State::CONTINUE) {
                            // A continuing container at the top of the stack
                            // may open child blocks on this line.
                            if st.contains(State::HAS_CHILDREN) && i == last_index {
                                let blank = is_blank_line(line_num - 1, i, &mut blank_lines);
                                self.open_blocks(state, be.node, blank, reader, pc);
                                break;
                            }
                            i += 1;
                            continue;
                        }
                    }
                    // This block closes here, or the line is a lazy
                    // continuation of an inner paragraph.
                    let blank = is_blank_line(line_num - 1, i, &mut blank_lines);
                    let this_parent = if i == 0 {
                        parent
                    } else {
                        pc.opened_blocks[i - 1].node
                    };
                    let stale: Vec<NodeId> =
                        pc.opened_blocks[i..].iter().map(|b| b.node).collect();
                    let result = self.open_blocks(state, this_parent, blank, reader, pc);
                    if result != BlockOpenResult::ParagraphContinuation {
                        self.close_listed_blocks(state, &stale, pc);
                    }
                    break;
                }
                reader.advance_line();
            }
        }
    }

    /// Runs the inline phase over one block's collected lines.
    fn parse_node_inlines(&self, state: &Frozen, node: NodeId, pc: &mut Context<'_>) {
        let kind = pc.tree().kind(node);
        if kind.node_type() != ast::NodeType::Block
            || kind.is_raw_block()
            || pc.tree().lines(node).is_empty()
        {
            return;
        }
        let source = pc.source();
        let segments = pc.tree().lines(node).clone();
        let mut block = BlockReader::new(source, segments);
        let mut escaped = false;

        'lines: loop {
            let Some((line, _)) = block.peek_line() else {
                break;
            };
            let line_length = line.len();
            let (l, start_position) = block.position();
            let mut start_position = start_position;
            let mut n = 0usize;
            let mut soft_break = false;
            let mut i = 0usize;
            while i < line_length {
                let c = line[i];
                if c == b'\n' {
                    soft_break = true;
                    break;
                }
                let is_space = util::is_space(c);
                let is_punct = util::is_punct(c);
                if (is_punct && !escaped) || is_space || i == 0 {
                    // Space and start-of-line dispatch through the synthetic
                    // space trigger.
                    let parser_char = if is_space || (i == 0 && !is_punct) {
                        b' '
                    } else {
                        c
                    };
                    let candidates = &state.inline_trigger[parser_char as usize];
                    if !candidates.is_empty() {
                        block.advance(n);
                        n = 0;
                        let (saved_line, saved_position) = block.position();
                        if i != 0 {
                            let (_, current) = block.position();
                            pc.tree_mut().merge_or_append_text_segment(
                                node,
                                start_position.between(&current),
                                source,
                            );
                            start_position = block.position().1;
                        }
                        let mut inline_node = None;
                        for &pi in candidates {
                            inline_node = self.inline_parsers[pi].value.parse(node, &mut block, pc);
                            if inline_node.is_some() {
                                break;
                            }
                            block.set_position(saved_line, saved_position.clone());
                        }
                        if let Some(inline_node) = inline_node {
                            pc.tree_mut().append_child(node, inline_node);
                            continue 'lines;
                        }
                    }
                }
                if escaped {
                    escaped = false;
                    n += 1;
                    i += 1;
                    continue;
                }
                if c == b'\\' {
                    escaped = true;
                    n += 1;
                    i += 1;
                    continue;
                }
                escaped = false;
                n += 1;
                i += 1;
            }
            if n != 0 {
                block.advance(n);
            }
            let (current_l, current_position) = block.position();
            if l != current_l {
                // A parser consumed past the line end; restart on the new line.
                continue;
            }
            let diff = start_position.between(&current_position);
            let mut stop = diff.stop;
            let mut hard_break = false;
            if soft_break && line_length >= 2 {
                // The newline sits at line_length - 1; ignore a CR before it.
                let mut end = line_length - 1;
                if end > 0 && line[end - 1] == b'\r' {
                    end -= 1;
                }
                let mut backslashes = 0;
                while backslashes < end && line[end - 1 - backslashes] == b'\\' {
                    backslashes += 1;
                }
                if backslashes % 2 == 1 {
                    // A trailing (unescaped) backslash is a hard break and
                    // is excluded from the text.
                    hard_break = true;
                    stop = diff.stop - (line_length - end);
                } else if end >= 2 && line[end - 1] == b' ' && line[end - 2] == b' ' {
                    hard_break = true;
                }
            }
            let rest = diff.with_stop(stop).trim_right_space(source);
            let text = pc.tree_mut().alloc(
                NodeKind::Text,
                NodeData::Text {
                    segment: rest,
                    soft_break,
                    hard_break,
                    raw: false,
                },
            );
            pc.tree_mut().append_child(node, text);
            block.advance_line();
        }

        process_delimiters(pc, 0);
        clear_delimiters(pc, 0);
        for &i in &state.inline_order {
            self.inline_parsers[i].value.close_block(node, pc);
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BlockOpenResult {
    ParagraphContinuation,
    NewBlocksOpened,
    NoBlocksOpened,
}

#[derive(Clone, Copy)]
struct LineStat {
    line_num: isize,
    level: usize,
    is_blank: bool,
}

fn is_blank_line(line_num: isize, level: usize, stats: &mut Vec<LineStat>) -> bool {
    let mut ret = false;
    let mut i = stats.len() as isize - 1 - level as isize;
    while i >= 0 {
        let s = stats[i as usize];
        if s.line_num == line_num && s.level == level {
            ret = s.is_blank;
            i -= 1;
            continue;
        }
        if s.line_num < line_num {
            stats.drain(..i as usize);
            return ret;
        }
        i -= 1;
    }
    stats.clear();
    ret
}

fn collect_post_order(tree: &Tree, node: NodeId, out: &mut Vec<NodeId>) {
    let mut child = tree.first_child(node);
    while let Some(c) = child {
        collect_post_order(tree, c, out);
        child = tree.next_sibling(c);
    }
    out.push(node);
}
