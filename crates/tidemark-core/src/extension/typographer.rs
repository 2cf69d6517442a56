//! The typographer: substitutes ASCII quotes, dashes, dots and angle quote
//! digraphs with configurable entity sequences.

use std::io::Write;

use crate::ast::{DelimiterData, NodeData, NodeId, NodeKind, Tree, WalkStatus};
use crate::html::{HtmlOptions, NodeRenderer, RenderContext, RenderResult};
use crate::parser::{scan_delimiter, Context, DelimiterProcessor, InlineParser};
use crate::reader::BlockReader;
use crate::{Extend, MarkdownBuilder};

/// Replacement sequences; a `None` disables that substitution.
#[derive(Clone, Debug)]
pub struct TypographicSubstitutions {
    pub left_single_quote: Option<Vec<u8>>,
    pub right_single_quote: Option<Vec<u8>>,
    pub left_double_quote: Option<Vec<u8>>,
    pub right_double_quote: Option<Vec<u8>>,
    pub en_dash: Option<Vec<u8>>,
    pub em_dash: Option<Vec<u8>>,
    pub ellipsis: Option<Vec<u8>>,
    pub left_angle_quote: Option<Vec<u8>>,
    pub right_angle_quote: Option<Vec<u8>>,
}

impl Default for TypographicSubstitutions {
    fn default() -> Self {
        Self {
            left_single_quote: Some(b"&lsquo;".to_vec()),
            right_single_quote: Some(b"&rsquo;".to_vec()),
            left_double_quote: Some(b"&ldquo;".to_vec()),
            right_double_quote: Some(b"&rdquo;".to_vec()),
            en_dash: Some(b"&ndash;".to_vec()),
            em_dash: Some(b"&mdash;".to_vec()),
            ellipsis: Some(b"&hellip;".to_vec()),
            left_angle_quote: Some(b"&laquo;".to_vec()),
            right_angle_quote: Some(b"&raquo;".to_vec()),
        }
    }
}

/// Probes quote flanking via the delimiter scanner; quotes never enter the
/// delimiter list, so a match is never requested.
struct QuoteProbeProcessor;

impl DelimiterProcessor for QuoteProbeProcessor {
    fn is_delimiter(&self, b: u8) -> bool {
        b == b'\'' || b == b'"'
    }

    fn can_open_closer(&self, _opener: &DelimiterData, _closer: &DelimiterData) -> bool {
        false
    }

    fn on_match(&self, _consumes: usize, _tree: &mut Tree) -> NodeId {
        unreachable!("quote probes are never paired")
    }
}

pub struct TypographerParser {
    substitutions: TypographicSubstitutions,
}

impl TypographerParser {
    pub fn new(substitutions: TypographicSubstitutions) -> Self {
        Self { substitutions }
    }

    fn emit(&self, pc: &mut Context<'_>, value: &[u8]) -> NodeId {
        pc.tree_mut().alloc(
            NodeKind::TypographicText,
            NodeData::Str {
                value: value.to_vec(),
                raw: true,
                code: true,
            },
        )
    }
}

impl InlineParser for TypographerParser {
    fn trigger(&self) -> &'static [u8] {
        b"'\"-.<>"
    }

    fn parse(
        &self,
        _parent: NodeId,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
    ) -> Option<NodeId> {
        let before = block.preceding_character();
        let (line, _) = block.peek_line()?;
        let c = line[0];
        let subs = &self.substitutions;
        if line.len() > 2 {
            if c == b'-'
                && line[1] == b'-'
                && line[2] == b'-'
                && let Some(em_dash) = &subs.em_dash
            {
                let node = self.emit(pc, em_dash);
                block.advance(3);
                return Some(node);
            }
            if c == b'.' {
                if line[1] == b'.'
                    && line[2] == b'.'
                    && let Some(ellipsis) = &subs.ellipsis
                {
                    let node = self.emit(pc, ellipsis);
                    block.advance(3);
                    return Some(node);
                }
                return None;
            }
        }
        if line.len() > 1 {
            if c == b'<' {
                if line[1] == b'<'
                    && let Some(left) = &subs.left_angle_quote
                {
                    let node = self.emit(pc, left);
                    block.advance(2);
                    return Some(node);
                }
                return None;
            }
            if c == b'>' {
                if line[1] == b'>'
                    && let Some(right) = &subs.right_angle_quote
                {
                    let node = self.emit(pc, right);
                    block.advance(2);
                    return Some(node);
                }
                return None;
            }
            if c == b'-'
                && line[1] == b'-'
                && let Some(en_dash) = &subs.en_dash
            {
                let node = self.emit(pc, en_dash);
                block.advance(2);
                return Some(node);
            }
        }
        if c == b'\'' || c == b'"' {
            let d = scan_delimiter(&line, before, 1, &QuoteProbeProcessor)?;
            let (left, right) = if c == b'\'' {
                (&subs.left_single_quote, &subs.right_single_quote)
            } else {
                (&subs.left_double_quote, &subs.right_double_quote)
            };
            if d.can_open && !d.can_close
                && let Some(left) = left
            {
                let node = self.emit(pc, left);
                block.advance(1);
                return Some(node);
            }
            if d.can_close && !d.can_open
                && let Some(right) = right
            {
                let node = self.emit(pc, right);
                block.advance(1);
                return Some(node);
            }
        }
        None
    }
}

pub struct TypographerHtmlRenderer;

impl NodeRenderer for TypographerHtmlRenderer {
    fn kinds(&self) -> Vec<NodeKind> {
        vec![NodeKind::TypographicText]
    }

    fn render(
        &self,
        out: &mut dyn Write,
        ctx: &RenderContext<'_>,
        node: NodeId,
        entering: bool,
    ) -> RenderResult {
        if entering
            && let NodeData::Str { value, .. } = ctx.tree.data(node)
        {
            out.write_all(value)?;
        }
        Ok(WalkStatus::Continue)
    }
}

/// The typographer extension.
#[derive(Default)]
pub struct Typographer {
    pub substitutions: TypographicSubstitutions,
}

impl Extend for Typographer {
    fn extend(&self, md: &mut MarkdownBuilder) {
        md.add_inline_parser(
            Box::new(TypographerParser::new(self.substitutions.clone())),
            9999,
        );
        md.add_node_renderer(
            Box::new(|_: &HtmlOptions| -> Box<dyn NodeRenderer> {
                Box::new(TypographerHtmlRenderer)
            }),
            500,
        );
    }
}
