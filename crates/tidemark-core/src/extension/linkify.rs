//! GFM autolink literals: bare `http(s)://`, `ftp://`, `www.` and email
//! addresses recognized on whitespace boundaries without angle brackets.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::ast::{AutoLinkType, NodeData, NodeId, NodeKind};
use crate::inline::in_link_label;
use crate::parser::{Context, InlineParser};
use crate::reader::BlockReader;
use crate::segment::Segment;
use crate::{Extend, MarkdownBuilder};

static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:http|https|ftp)://[-A-Za-z0-9+&@#/%?=~_|!:,.;]*[-A-Za-z0-9+&@#/%=~_|]")
        .unwrap()
});

static WWW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^www\.[-A-Za-z0-9+&@#/%?=~_|!:,.;]*[-A-Za-z0-9+&@#/%=~_|]").unwrap()
});

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+",
    )
    .unwrap()
});

pub struct LinkifyParser;

impl InlineParser for LinkifyParser {
    fn trigger(&self) -> &'static [u8] {
        b" *_~("
    }

    fn parse(
        &self,
        parent: NodeId,
        block: &mut BlockReader<'_>,
        pc: &mut Context<'_>,
    ) -> Option<NodeId> {
        if in_link_label(pc) {
            return None;
        }
        let (line, segment) = block.peek_line()?;
        let mut consumes = 0;
        let mut rest: &[u8] = &line;
        if matches!(line.first().copied(), Some(b' ' | b'*' | b'_' | b'~' | b'(')) {
            // An escaped space joins words; it is not a boundary.
            if line[0] == b' '
                && pc.options().escaped_space
                && block.preceding_character() == '\\'
            {
                return None;
            }
            consumes = 1;
            rest = &line[1..];
        } else if !matches!(block.preceding_character(), '\n' | ' ' | '\t') {
            // Without a boundary character this must be the start of a line.
            return None;
        }

        let (link_type, length) = if rest.starts_with(b"http://")
            || rest.starts_with(b"https://")
            || rest.starts_with(b"ftp://")
        {
            (AutoLinkType::Url, URL.find(rest)?.end())
        } else if rest.starts_with(b"www.") {
            (AutoLinkType::Url, WWW.find(rest)?.end())
        } else if rest.contains(&b'@') {
            let m = EMAIL.find(rest)?;
            // The match must start the remaining text and may not continue
            // with more address characters.
            if m.start() != 0 {
                return None;
            }
            if matches!(rest.get(m.end()), Some(b) if b.is_ascii_alphanumeric() || *b == b'-')
            {
                return None;
            }
            (AutoLinkType::Email, m.end())
        } else {
            return None;
        };

        if consumes != 0 {
            let source = pc.source();
            let boundary = segment.with_stop(segment.start + 1);
            pc.tree_mut()
                .merge_or_append_text_segment(parent, boundary, source);
        }
        let start = segment.start + consumes;
        let node = pc.tree_mut().alloc(
            NodeKind::AutoLink,
            NodeData::AutoLink {
                link_type,
                value: Segment::new(start, start + length),
            },
        );
        block.advance(consumes + length);
        Some(node)
    }
}

/// The GFM autolink-literal extension.
pub struct Linkify;

impl Extend for Linkify {
    fn extend(&self, md: &mut MarkdownBuilder) {
        md.add_inline_parser(Box::new(LinkifyParser), 999);
    }
}
