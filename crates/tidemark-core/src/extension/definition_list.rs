//! Definition lists in the PHP Markdown Extra style:
//!
//! ```text
//! Apple
//! :   a fruit
//! ```

use std::io::Write;

use crate::ast::{NodeData, NodeId, NodeKind, WalkStatus};
use crate::html::{HtmlOptions, NodeRenderer, RenderContext, RenderResult};
use crate::parser::{BlockParser, Context, State};
use crate::reader::LineReader;
use crate::util;
use crate::{Extend, MarkdownBuilder};

fn is_description_line(line: &[u8], pos: usize) -> bool {
    pos < line.len()
        && line[pos] == b':'
        && matches!(line.get(pos + 1), Some(&b' ') | Some(&b'\t') | None)
}

pub struct DefinitionListParser;

impl BlockParser for DefinitionListParser {
    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b":")
    }

    fn open(
        &self,
        _parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State) {
        let Some((line, _)) = reader.peek_line() else {
            return (None, State::NO_CHILDREN);
        };
        if !is_description_line(&line, pc.block_offset()) {
            return (None, State::NO_CHILDREN);
        }
        // The terms are the lines of the paragraph right above.
        let Some(last) = pc.last_opened_block() else {
            return (None, State::NO_CHILDREN);
        };
        let paragraph = last.node;
        if pc.tree().kind(paragraph) != NodeKind::Paragraph
            || pc.tree().parent(paragraph).is_none()
        {
            return (None, State::NO_CHILDREN);
        }
        // A further group of terms continues the previous definition list.
        let list = match pc.tree().prev_sibling(paragraph) {
            Some(prev) if pc.tree().kind(prev) == NodeKind::DefinitionList => prev,
            _ => pc
                .tree_mut()
                .alloc(NodeKind::DefinitionList, NodeData::None),
        };
        let source = pc.source();
        let lines = pc.tree().lines(paragraph).clone();
        for i in 0..lines.len() {
            let term = pc
                .tree_mut()
                .alloc(NodeKind::DefinitionTerm, NodeData::None);
            pc.tree_mut()
                .lines_mut(term)
                .append(lines.at(i).trim_right_space(source));
            pc.tree_mut().append_child(list, term);
        }
        pc.tree_mut().detach(paragraph);
        (Some(list), State::HAS_CHILDREN)
    }

    fn cont(&self, _node: NodeId, reader: &mut LineReader<'_>, _pc: &mut Context<'_>) -> State {
        let Some((line, _)) = reader.peek_line() else {
            return State::CLOSE;
        };
        if util::is_blank(&line) {
            return State::CONTINUE | State::HAS_CHILDREN;
        }
        let (w, pos) = util::indent_width(&line, 0);
        if w <= 3 && is_description_line(&line, pos) {
            return State::CONTINUE | State::HAS_CHILDREN;
        }
        if w >= 4 {
            return State::CONTINUE | State::HAS_CHILDREN;
        }
        State::CLOSE
    }

    fn close(&self, node: NodeId, pc: &mut Context<'_>) {
        // Descriptions that directly follow their term render without
        // paragraph wrappers.
        let descriptions: Vec<NodeId> = pc
            .tree()
            .children(node)
            .filter(|&c| pc.tree().kind(c) == NodeKind::DefinitionDescription)
            .collect();
        for description in descriptions {
            if pc.tree().has_blank_previous_lines(description) {
                continue;
            }
            if pc.tree().child_count(description) != 1 {
                continue;
            }
            let only = pc.tree().first_child(description).expect("count is one");
            if pc.tree().kind(only) == NodeKind::Paragraph {
                pc.tree_mut().set_kind(only, NodeKind::TextBlock);
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

pub struct DefinitionDescriptionParser;

impl BlockParser for DefinitionDescriptionParser {
    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b":")
    }

    fn open(
        &self,
        parent: NodeId,
        reader: &mut LineReader<'_>,
        pc: &mut Context<'_>,
    ) -> (Option<NodeId>, State) {
        if pc.tree().kind(parent) != NodeKind::DefinitionList {
            return (None, State::NO_CHILDREN);
        }
        let Some((line, _)) = reader.peek_line() else {
            return (None, State::NO_CHILDREN);
        };
        let pos = pc.block_offset();
        if !is_description_line(&line, pos) {
            return (None, State::NO_CHILDREN);
        }
        // Consume the marker and following whitespace, up to four columns.
        let mut i = pos + 1;
        let mut cols = 0;
        while i < line.len() && cols < 4 && matches!(line[i], b' ' | b'\t') {
            cols += if line[i] == b'\t' { 4 } else { 1 };
            i += 1;
        }
        reader.advance(i);
        let node = pc
            .tree_mut()
            .alloc(NodeKind::DefinitionDescription, NodeData::None);
        (Some(node), State::HAS_CHILDREN)
    }

    fn cont(&self, _node: NodeId, reader: &mut LineReader<'_>, _pc: &mut Context<'_>) -> State {
        let Some((line, _)) = reader.peek_line() else {
            return State::CLOSE;
        };
        if util::is_blank(&line) {
            return State::CONTINUE | State::HAS_CHILDREN;
        }
        let (w, pos) = util::indent_width(&line, 0);
        if w <= 3 && is_description_line(&line, pos) {
            // The next description takes over.
            return State::CLOSE;
        }
        if w < 4 {
            return State::CLOSE;
        }
        if let Some((p, padding)) = util::indent_position(&line, 0, 4) {
            reader.advance_and_set_padding(p, padding);
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

pub struct DefinitionListHtmlRenderer;

impl NodeRenderer for DefinitionListHtmlRenderer {
    fn kinds(&self) -> Vec<NodeKind> {
        vec![
            NodeKind::DefinitionList,
            NodeKind::DefinitionTerm,
            NodeKind::DefinitionDescription,
        ]
    }

    fn render(
        &self,
        out: &mut dyn Write,
        ctx: &RenderContext<'_>,
        node: NodeId,
        entering: bool,
    ) -> RenderResult {
        match ctx.tree.kind(node) {
            NodeKind::DefinitionList => {
                if entering {
                    out.write_all(b"<dl>\n")?;
                } else {
                    out.write_all(b"</dl>\n")?;
                }
            }
            NodeKind::DefinitionTerm => {
                if entering {
                    out.write_all(b"<dt>")?;
                } else {
                    out.write_all(b"</dt>\n")?;
                }
            }
            NodeKind::DefinitionDescription => {
                if entering {
                    out.write_all(b"<dd>")?;
                    if let Some(fc) = ctx.tree.first_child(node)
                        && ctx.tree.kind(fc) != NodeKind::TextBlock
                    {
                        out.write_all(b"\n")?;
                    }
                } else {
                    out.write_all(b"</dd>\n")?;
                }
            }
            _ => {}
        }
        Ok(WalkStatus::Continue)
    }
}

/// The definition list extension.
pub struct DefinitionList;

impl Extend for DefinitionList {
    fn extend(&self, md: &mut MarkdownBuilder) {
        md.add_block_parser(Box::new(DefinitionListParser), 101);
        md.add_block_parser(Box::new(DefinitionDescriptionParser), 102);
        md.add_node_renderer(
            Box::new(|_: &HtmlOptions| -> Box<dyn NodeRenderer> {
                Box::new(DefinitionListHtmlRenderer)
            }),
            500,
        );
    }
}
