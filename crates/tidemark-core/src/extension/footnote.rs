//! Footnotes: `[^ref]` inline references, `[^ref]: ...` definition blocks,
//! and an AST transformer that numbers references and appends the footnote
//! list to the document.

use std::io::Write;

use crate::ast::{NodeData, NodeId, NodeKind, WalkStatus};
use crate::html::{HtmlOptions, NodeRenderer, RenderContext, RenderResult};
use crate::label::normalize_link_label;
use crate::parser::{AstTransformer, BlockParser, Context, InlineParser, State};
use crate::reader::{BlockReader, LineReader};
use crate::util;
use crate::{Extend, MarkdownBuilder};

/// Scans `[^label]` at the head of `line`; the label has at least one
/// character and contains no whitespace or brackets.
fn scan_footnote_label(line: &[u8]) -> Option<(usize, usize)> {
    if line.len() < 4 || line[0] != b'[' || line[1] != b'^' {
        return None;
    }
    let mut i = 2;
    while i < line.len() {
        match line[i] {
            b']' => {
                if i == 2 {
                    return None;
                }
                return Some((2, i));
            }
            b'[' | b'^' => return None,
            b if util::is_space(b) => return None,
            _ => i += 1,
        }
    }
    None
}

pub struct FootnoteBlockParser;

impl BlockParser for FootnoteBlockParser {
    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b"[")
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
        let pos = pc.block_offset();
        let Some((label_start, label_end)) = scan_footnote_label(&line[pos..]) else {
            return (None, State::NO_CHILDREN);
        };
        let after = pos + label_end + 1;
        if line.get(after) != Some(&b':') {
            return (None, State::NO_CHILDREN);
        }
        let label = line[pos + label_start..pos + label_end].to_vec();
        let mut consumed = after + 1;
        if matches!(line.get(consumed), Some(&b' ') | Some(&b'\t')) {
            consumed += 1;
        }
        reader.advance(consumed);
        let node = pc.tree_mut().alloc(
            NodeKind::FootnoteDefinition,
            NodeData::FootnoteDefinition { label, index: 0 },
        );
        (Some(node), State::HAS_CHILDREN)
    }

    fn cont(&self, _node: NodeId, reader: &mut LineReader<'_>, _pc: &mut Context<'_>) -> State {
        let Some((line, _)) = reader.peek_line() else {
            return State::CLOSE;
        };
        if util::is_blank(&line) {
            return State::CONTINUE | State::HAS_CHILDREN;
        }
        let (w, _) = util::indent_width(&line, reader.line_offset());
        if w < 4 {
            return State::CLOSE;
        }
        if let Some((pos, padding)) = util::indent_position(&line, reader.line_offset(), 4) {
            reader.advance_and_set_padding(pos, padding);
        }
        State::CONTINUE | State::HAS_CHILDREN
    }

    fn can_interrupt_paragraph(&self) -> bool {
        false
    }

    fn can_accept_indented_line(&self) -> bool {
        false
    }
}

pub struct FootnoteParser;

impl InlineParser for FootnoteParser {
    fn trigger(&self) -> &'static [u8] {
        b"["
    }

    fn parse(
        &self,
        _parent: NodeId,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
    ) -> Option<NodeId> {
        let (line, _) = block.peek_line()?;
        let (label_start, label_end) = scan_footnote_label(&line)?;
        let label = line[label_start..label_end].to_vec();
        block.advance(label_end + 1);
        let node = pc.tree_mut().alloc(
            NodeKind::FootnoteReference,
            NodeData::FootnoteReference { label, index: 0 },
        );
        Some(node)
    }
}

pub struct FootnoteAstTransformer;

impl AstTransformer for FootnoteAstTransformer {
    fn transform(&self, doc: NodeId, pc: &mut Context<'_>) {
        // Collect definitions and references in document order.
        let mut definitions = Vec::new();
        let mut references = Vec::new();
        collect(pc, doc, &mut definitions, &mut references);
        if references.is_empty() && definitions.is_empty() {
            return;
        }

        let mut next_index = 0usize;
        for reference in references {
            let label = match pc.tree().data(reference) {
                NodeData::FootnoteReference { label, .. } => label.clone(),
                _ => continue,
            };
            let key = normalize_link_label(&label);
            let definition = definitions.iter().copied().find(|&d| {
                matches!(pc.tree().data(d), NodeData::FootnoteDefinition { label, .. }
                    if normalize_link_label(label) == key)
            });
            let Some(definition) = definition else {
                // No matching definition: the reference reads literally.
                let mut literal = Vec::with_capacity(label.len() + 3);
                literal.extend_from_slice(b"[^");
                literal.extend_from_slice(&label);
                literal.push(b']');
                pc.tree_mut().set_kind(reference, NodeKind::Str);
                pc.tree_mut().set_data(
                    reference,
                    NodeData::Str {
                        value: literal,
                        raw: false,
                        code: false,
                    },
                );
                continue;
            };
            let index = match pc.tree().data(definition) {
                NodeData::FootnoteDefinition { index, .. } if *index != 0 => *index,
                _ => {
                    next_index += 1;
                    if let NodeData::FootnoteDefinition { index, .. } =
                        pc.tree_mut().data_mut(definition)
                    {
                        *index = next_index;
                    }
                    next_index
                }
            };
            if let NodeData::FootnoteReference { index: i, .. } =
                pc.tree_mut().data_mut(reference)
            {
                *i = index;
            }
        }

        let mut used: Vec<(usize, NodeId)> = definitions
            .iter()
            .filter_map(|&d| match pc.tree().data(d) {
                NodeData::FootnoteDefinition { index, .. } if *index != 0 => Some((*index, d)),
                _ => None,
            })
            .collect();
        for &d in &definitions {
            if matches!(pc.tree().data(d), NodeData::FootnoteDefinition { index, .. } if *index == 0)
            {
                pc.tree_mut().detach(d);
            }
        }
        if used.is_empty() {
            return;
        }
        used.sort_by_key(|&(index, _)| index);

        let list = pc.tree_mut().alloc(NodeKind::FootnoteList, NodeData::None);
        for (index, definition) in used {
            append_backlink(pc, definition, index);
            pc.tree_mut().append_child(list, definition);
        }
        pc.tree_mut().append_child(doc, list);
    }
}

fn collect(
    pc: &Context<'_>,
    node: NodeId,
    definitions: &mut Vec<NodeId>,
    references: &mut Vec<NodeId>,
) {
    let mut child = pc.tree().first_child(node);
    while let Some(c) = child {
        match pc.tree().kind(c) {
            NodeKind::FootnoteDefinition => definitions.push(c),
            NodeKind::FootnoteReference => references.push(c),
            _ => {}
        }
        collect(pc, c, definitions, references);
        child = pc.tree().next_sibling(c);
    }
}

/// Appends the return arrow to the end of the definition's last paragraph,
/// or as a trailing block when the definition ends with something else.
fn append_backlink(pc: &mut Context<'_>, definition: NodeId, index: usize) {
    let backlink = pc.tree_mut().alloc(
        NodeKind::FootnoteBacklink,
        NodeData::FootnoteBacklink { index },
    );
    let target = match pc.tree().last_child(definition) {
        Some(last)
            if matches!(
                pc.tree().kind(last),
                NodeKind::Paragraph | NodeKind::TextBlock
            ) =>
        {
            last
        }
        _ => {
            let block = pc.tree_mut().alloc(NodeKind::TextBlock, NodeData::None);
            pc.tree_mut().append_child(definition, block);
            block
        }
    };
    pc.tree_mut().append_child(target, backlink);
}

pub struct FootnoteHtmlRenderer {
    xhtml: bool,
}

impl NodeRenderer for FootnoteHtmlRenderer {
    fn kinds(&self) -> Vec<NodeKind> {
        vec![
            NodeKind::FootnoteReference,
            NodeKind::FootnoteDefinition,
            NodeKind::FootnoteBacklink,
            NodeKind::FootnoteList,
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
            NodeKind::FootnoteReference => {
                if entering
                    && let NodeData::FootnoteReference { index, .. } = ctx.tree.data(node)
                {
                    write!(
                        out,
                        "<sup id=\"fnref:{0}\"><a href=\"#fn:{0}\" class=\"footnote-ref\" role=\"doc-noteref\">{0}</a></sup>",
                        index
                    )?;
                }
            }
            NodeKind::FootnoteList => {
                if entering {
                    out.write_all(b"<div class=\"footnotes\" role=\"doc-endnotes\">\n")?;
                    if self.xhtml {
                        out.write_all(b"<hr />\n")?;
                    } else {
                        out.write_all(b"<hr>\n")?;
                    }
                    out.write_all(b"<ol>\n")?;
                } else {
                    out.write_all(b"</ol>\n</div>\n")?;
                }
            }
            NodeKind::FootnoteDefinition => {
                if entering {
                    if let NodeData::FootnoteDefinition { index, .. } = ctx.tree.data(node) {
                        write!(out, "<li id=\"fn:{}\" role=\"doc-endnote\">\n", index)?;
                    }
                } else {
                    out.write_all(b"</li>\n")?;
                }
            }
            NodeKind::FootnoteBacklink => {
                if entering
                    && let NodeData::FootnoteBacklink { index } = ctx.tree.data(node)
                {
                    write!(
                        out,
                        "&#160;<a href=\"#fnref:{}\" class=\"footnote-backref\" role=\"doc-backlink\">&#x21a9;&#xfe0e;</a>",
                        index
                    )?;
                }
            }
            _ => {}
        }
        Ok(WalkStatus::Continue)
    }
}

/// The footnote extension.
pub struct Footnote;

impl Extend for Footnote {
    fn extend(&self, md: &mut MarkdownBuilder) {
        md.add_block_parser(Box::new(FootnoteBlockParser), 999);
        md.add_inline_parser(Box::new(FootnoteParser), 101);
        md.add_ast_transformer(Box::new(FootnoteAstTransformer), 999);
        md.add_node_renderer(
            Box::new(|options: &HtmlOptions| -> Box<dyn NodeRenderer> {
                Box::new(FootnoteHtmlRenderer {
                    xhtml: options.xhtml,
                })
            }),
            500,
        );
    }
}
