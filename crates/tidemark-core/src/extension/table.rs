//! GFM tables. A paragraph transformer detects a header row followed by a
//! delimiter row and rebuilds the paragraph as a table; cells become blocks
//! whose lines go through the normal inline phase.

use std::io::Write;

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::ast::{Alignment, NodeData, NodeId, NodeKind, WalkStatus};
use crate::html::{HtmlOptions, NodeRenderer, RenderContext, RenderResult};
use crate::parser::{Context, ParagraphTransformer};
use crate::segment::Segment;
use crate::util;
use crate::{Extend, MarkdownBuilder};

static DELIM_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s\-|:]+$").unwrap());
static DELIM_LEFT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*:-+\s*$").unwrap());
static DELIM_RIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-+:\s*$").unwrap());
static DELIM_CENTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*:-+:\s*$").unwrap());
static DELIM_NONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-+\s*$").unwrap());

pub struct TableParagraphTransformer;

impl TableParagraphTransformer {
    fn parse_delimiter(&self, segment: &Segment, source: &[u8]) -> Option<Vec<Alignment>> {
        let line = segment.value(source);
        if !DELIM_ROW.is_match(&line) {
            return None;
        }
        let mut cols: Vec<&[u8]> = line.split(|&b| b == b'|').collect();
        if cols.first().is_some_and(|c| util::is_blank(c)) {
            cols.remove(0);
        }
        if cols.last().is_some_and(|c| util::is_blank(c)) {
            cols.pop();
        }
        let mut alignments = Vec::new();
        for col in cols {
            if DELIM_LEFT.is_match(col) {
                alignments.push(Alignment::Left);
            } else if DELIM_RIGHT.is_match(col) {
                alignments.push(Alignment::Right);
            } else if DELIM_CENTER.is_match(col) {
                alignments.push(Alignment::Center);
            } else if DELIM_NONE.is_match(col) {
                alignments.push(Alignment::None);
            } else {
                return None;
            }
        }
        if alignments.is_empty() {
            None
        } else {
            Some(alignments)
        }
    }

    /// Splits one source row into trimmed cell segments. Pipes inside code
    /// spans or behind backslashes do not split.
    fn parse_row_cells(&self, segment: &Segment, source: &[u8]) -> Vec<Segment> {
        let line = &source[segment.start..segment.stop];
        let mut pos = util::trim_left_space_length(line);
        let mut limit = line.len() - util::trim_right_space_length(line);
        if pos < limit && line[pos] == b'|' {
            pos += 1;
        }
        if limit > pos && line[limit - 1] == b'|' {
            limit -= 1;
        }
        let mut cells = Vec::new();
        while pos < limit {
            let closure = util::find_closure(&line[pos..limit], 0, b'|', true, false)
                .unwrap_or(limit - pos);
            let cell = Segment::new(segment.start + pos, segment.start + pos + closure);
            let cell = cell.trim_left_space(source).trim_right_space(source);
            cells.push(cell);
            pos += closure + 1;
        }
        cells
    }

    fn build_row(
        &self,
        pc: &mut Context<'_>,
        kind: NodeKind,
        cells: &[Segment],
        alignments: &[Alignment],
    ) -> NodeId {
        let row = pc.tree_mut().alloc(kind, NodeData::None);
        for (i, alignment) in alignments.iter().enumerate() {
            let cell = pc.tree_mut().alloc(
                NodeKind::TableCell,
                NodeData::TableCell {
                    alignment: *alignment,
                },
            );
            if let Some(segment) = cells.get(i)
                && !segment.is_empty()
            {
                pc.tree_mut().lines_mut(cell).append(segment.clone());
            }
            pc.tree_mut().append_child(row, cell);
        }
        row
    }
}

impl ParagraphTransformer for TableParagraphTransformer {
    fn transform(&self, node: NodeId, pc: &mut Context<'_>) {
        let lines = pc.tree().lines(node).clone();
        if lines.len() < 2 {
            return;
        }
        let source = pc.source();
        let Some(alignments) = self.parse_delimiter(&lines.at(1), source) else {
            return;
        };
        let header_cells = self.parse_row_cells(&lines.at(0), source);
        if header_cells.len() != alignments.len() {
            return;
        }
        let table = pc.tree_mut().alloc(
            NodeKind::Table,
            NodeData::Table {
                alignments: alignments.clone(),
            },
        );
        let header = self.build_row(pc, NodeKind::TableHeader, &header_cells, &alignments);
        pc.tree_mut().append_child(table, header);
        for i in 2..lines.len() {
            let cells = self.parse_row_cells(&lines.at(i), source);
            let row = self.build_row(pc, NodeKind::TableRow, &cells, &alignments);
            pc.tree_mut().append_child(table, row);
        }
        let parent = pc.tree().parent(node).expect("paragraph is attached");
        pc.tree_mut().insert_before(parent, node, table);
        pc.tree_mut().detach(node);
    }
}

pub struct TableHtmlRenderer;

impl NodeRenderer for TableHtmlRenderer {
    fn kinds(&self) -> Vec<NodeKind> {
        vec![
            NodeKind::Table,
            NodeKind::TableHeader,
            NodeKind::TableRow,
            NodeKind::TableCell,
        ]
    }

    fn render(
        &self,
        out: &mut dyn Write,
        ctx: &RenderContext<'_>,
        node: NodeId,
        entering: bool,
    ) -> RenderResult {
        let tree = ctx.tree;
        match tree.kind(node) {
            NodeKind::Table => {
                if entering {
                    out.write_all(b"<table>\n")?;
                } else {
                    out.write_all(b"</table>\n")?;
                }
            }
            NodeKind::TableHeader => {
                if entering {
                    out.write_all(b"<thead>\n<tr>\n")?;
                } else {
                    out.write_all(b"</tr>\n</thead>\n")?;
                    if tree.next_sibling(node).is_some() {
                        out.write_all(b"<tbody>\n")?;
                    }
                }
            }
            NodeKind::TableRow => {
                if entering {
                    out.write_all(b"<tr>\n")?;
                } else {
                    out.write_all(b"</tr>\n")?;
                    let parent = tree.parent(node);
                    if parent.is_some_and(|p| tree.last_child(p) == Some(node)) {
                        out.write_all(b"</tbody>\n")?;
                    }
                }
            }
            NodeKind::TableCell => {
                let in_header = tree
                    .parent(node)
                    .is_some_and(|p| tree.kind(p) == NodeKind::TableHeader);
                let tag: &[u8] = if in_header { b"th" } else { b"td" };
                if entering {
                    out.write_all(b"<")?;
                    out.write_all(tag)?;
                    if let NodeData::TableCell { alignment } = tree.data(node)
                        && let Some(value) = alignment.as_str()
                    {
                        write!(out, " align=\"{}\"", value)?;
                    }
                    out.write_all(b">")?;
                } else {
                    out.write_all(b"</")?;
                    out.write_all(tag)?;
                    out.write_all(b">\n")?;
                }
            }
            _ => {}
        }
        Ok(WalkStatus::Continue)
    }
}

/// The GFM table extension.
pub struct Table;

impl Extend for Table {
    fn extend(&self, md: &mut MarkdownBuilder) {
        md.add_paragraph_transformer(Box::new(TableParagraphTransformer), 200);
        md.add_node_renderer(
            Box::new(|_: &HtmlOptions| -> Box<dyn NodeRenderer> { Box::new(TableHtmlRenderer) }),
            500,
        );
    }
}
