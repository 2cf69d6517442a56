//! GFM strikethrough: `~` and `~~` runs through the delimiter machinery
//! with their own processor.

use std::io::Write;
use std::sync::Arc;

use crate::ast::{DelimiterData, NodeData, NodeId, NodeKind, Tree, WalkStatus};
use crate::html::{HtmlOptions, NodeRenderer, RenderContext, RenderResult};
use crate::parser::{scan_delimiter, Context, DelimiterProcessor, InlineParser};
use crate::reader::BlockReader;
use crate::{Extend, MarkdownBuilder};

pub struct StrikethroughDelimiterProcessor;

impl DelimiterProcessor for StrikethroughDelimiterProcessor {
    fn is_delimiter(&self, b: u8) -> bool {
        b == b'~'
    }

    fn can_open_closer(&self, opener: &DelimiterData, closer: &DelimiterData) -> bool {
        // Tildes pair only with a run of the same length.
        opener.char == closer.char && opener.original_length == closer.original_length
    }

    fn on_match(&self, _consumes: usize, tree: &mut Tree) -> NodeId {
        tree.alloc(NodeKind::Strikethrough, NodeData::None)
    }
}

pub struct StrikethroughParser {
    processor: Arc<StrikethroughDelimiterProcessor>,
}

impl StrikethroughParser {
    pub fn new() -> Self {
        Self {
            processor: Arc::new(StrikethroughDelimiterProcessor),
        }
    }
}

impl Default for StrikethroughParser {
    fn default() -> Self {
        Self::new()
    }
}

impl InlineParser for StrikethroughParser {
    fn trigger(&self) -> &'static [u8] {
        b"~"
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
        if data.original_length > 2 || before == '~' {
            return None;
        }
        data.segment = segment.with_stop(segment.start + data.original_length);
        block.advance(data.original_length);
        let node = pc
            .tree_mut()
            .alloc(NodeKind::Delimiter, NodeData::Delimiter(data));
        pc.push_delimiter(node, self.processor.clone());
        Some(node)
    }
}

pub struct StrikethroughHtmlRenderer;

impl NodeRenderer for StrikethroughHtmlRenderer {
    fn kinds(&self) -> Vec<NodeKind> {
        vec![NodeKind::Strikethrough]
    }

    fn render(
        &self,
        out: &mut dyn Write,
        _ctx: &RenderContext<'_>,
        _node: NodeId,
        entering: bool,
    ) -> RenderResult {
        if entering {
            out.write_all(b"<del>")?;
        } else {
            out.write_all(b"</del>")?;
        }
        Ok(WalkStatus::Continue)
    }
}

/// The GFM strikethrough extension.
pub struct Strikethrough;

impl Extend for Strikethrough {
    fn extend(&self, md: &mut MarkdownBuilder) {
        md.add_inline_parser(Box::new(StrikethroughParser::new()), 500);
        md.add_node_renderer(
            Box::new(|_: &HtmlOptions| -> Box<dyn NodeRenderer> {
                Box::new(StrikethroughHtmlRenderer)
            }),
            500,
        );
    }
}
