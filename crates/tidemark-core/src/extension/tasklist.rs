//! GFM task lists: a `[ ]` / `[x]` marker at the start of a list item's
//! first paragraph becomes a disabled checkbox.

use std::io::Write;

use crate::ast::{NodeData, NodeId, NodeKind, WalkStatus};
use crate::html::{HtmlOptions, NodeRenderer, RenderContext, RenderResult};
use crate::parser::{Context, InlineParser};
use crate::reader::BlockReader;
use crate::{Extend, MarkdownBuilder};

pub struct TaskCheckBoxParser;

impl InlineParser for TaskCheckBoxParser {
    fn trigger(&self) -> &'static [u8] {
        b"["
    }

    fn parse(
        &self,
        parent: NodeId,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
    ) -> Option<NodeId> {
        // Only at the very start of the first block of a list item:
        //   ListItem > TextBlock/Paragraph > [x]
        if pc.tree().has_children(parent) {
            return None;
        }
        let item = pc.tree().parent(parent)?;
        if pc.tree().kind(item) != NodeKind::ListItem
            || pc.tree().first_child(item) != Some(parent)
        {
            return None;
        }
        let (line, _) = block.peek_line()?;
        if line.len() < 3 || line[0] != b'[' || line[2] != b']' {
            return None;
        }
        let checked = match line[1] {
            b' ' => false,
            b'x' | b'X' => true,
            _ => return None,
        };
        if let Some(&after) = line.get(3)
            && !matches!(after, b' ' | b'\t' | b'\n' | b'\r')
        {
            return None;
        }
        block.advance(3);
        let node = pc
            .tree_mut()
            .alloc(NodeKind::TaskCheckBox, NodeData::TaskCheckBox { checked });
        Some(node)
    }
}

pub struct TaskCheckBoxHtmlRenderer {
    xhtml: bool,
}

impl NodeRenderer for TaskCheckBoxHtmlRenderer {
    fn kinds(&self) -> Vec<NodeKind> {
        vec![NodeKind::TaskCheckBox]
    }

    fn render(
        &self,
        out: &mut dyn Write,
        ctx: &RenderContext<'_>,
        node: NodeId,
        entering: bool,
    ) -> RenderResult {
        if !entering {
            return Ok(WalkStatus::Continue);
        }
        let checked = matches!(
            ctx.tree.data(node),
            NodeData::TaskCheckBox { checked: true }
        );
        if checked {
            out.write_all(b"<input checked=\"\" disabled=\"\" type=\"checkbox\"")?;
        } else {
            out.write_all(b"<input disabled=\"\" type=\"checkbox\"")?;
        }
        if self.xhtml {
            out.write_all(b" />")?;
        } else {
            out.write_all(b">")?;
        }
        Ok(WalkStatus::Continue)
    }
}

/// The GFM task list extension.
pub struct TaskList;

impl Extend for TaskList {
    fn extend(&self, md: &mut MarkdownBuilder) {
        md.add_inline_parser(Box::new(TaskCheckBoxParser), 0);
        md.add_node_renderer(
            Box::new(|options: &HtmlOptions| -> Box<dyn NodeRenderer> {
                Box::new(TaskCheckBoxHtmlRenderer {
                    xhtml: options.xhtml,
                })
            }),
            500,
        );
    }
}
