//! The (X)HTML renderer: a NodeKind-indexed dispatch table over registered
//! node renderers, an enter/leave tree walk, and writers implementing the
//! escaping, entity-resolution and dangerous-URL policies.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::ast::{
    self, AutoLinkType, NodeData, NodeId, NodeKind, Tree, WalkStatus,
};
use crate::parser::{prioritized, Prioritized};
use crate::util;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("RendererFunc not found for kind: {0}")]
    NoRendererFunc(NodeKind),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type RenderResult = Result<WalkStatus, RenderError>;

/// Soft line break handling between East Asian wide characters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EastAsianLineBreaks {
    #[default]
    Off,
    /// Drop the newline only when both sides are wide characters.
    BothSides,
    /// Drop the newline when either side is a wide character.
    EitherSide,
}

/// Writes textual content into the output sink.
pub trait TextWriter: Send + Sync {
    /// Emits bytes with HTML escaping only.
    fn raw_write(&self, out: &mut dyn Write, source: &[u8]) -> io::Result<()>;

    /// Emits bytes resolving backslash escapes and entity and numeric
    /// character references.
    fn write(&self, out: &mut dyn Write, source: &[u8]) -> io::Result<()>;
}

/// The default writer. With `escaped_space` set, a backslash-escaped space
/// disappears from semantic writes (used by the CJK extension).
#[derive(Default)]
pub struct DefaultWriter {
    pub escaped_space: bool,
}

impl TextWriter for DefaultWriter {
    fn raw_write(&self, out: &mut dyn Write, source: &[u8]) -> io::Result<()> {
        let mut n = 0;
        for (i, &b) in source.iter().enumerate() {
            if let Some(escaped) = util::escape_html_byte(b) {
                out.write_all(&source[n..i])?;
                out.write_all(escaped)?;
                n = i + 1;
            }
        }
        out.write_all(&source[n..])
    }

    fn write(&self, out: &mut dyn Write, source: &[u8]) -> io::Result<()> {
        let limit = source.len();
        let mut escaped = false;
        let mut n = 0;
        let mut i = 0;
        while i < limit {
            let c = source[i];
            if escaped {
                if self.escaped_space && c == b' ' {
                    // Drop both the backslash and the space.
                    self.raw_write(out, &source[n..i - 1])?;
                    n = i + 1;
                    escaped = false;
                    i += 1;
                    continue;
                }
                if util::is_punct(c) {
                    self.raw_write(out, &source[n..i - 1])?;
                    n = i;
                    escaped = false;
                    i += 1;
                    continue;
                }
            }
            if c == b'&' {
                if let Some((expansion, next)) = resolve_reference(source, i) {
                    self.raw_write(out, &source[n..i])?;
                    self.raw_write(out, &expansion)?;
                    n = next;
                    i = next;
                    escaped = false;
                    continue;
                }
            }
            if c == b'\\' {
                escaped = true;
                i += 1;
                continue;
            }
            escaped = false;
            i += 1;
        }
        self.raw_write(out, &source[n..])
    }
}

/// Resolves one `&...;` reference at `i`, returning the replacement bytes
/// and the position after the `;`.
fn resolve_reference(source: &[u8], i: usize) -> Option<(Vec<u8>, usize)> {
    let limit = source.len();
    let next = i + 1;
    if next >= limit {
        return None;
    }
    if source[next] == b'#' {
        let mut j = next + 1;
        let radix = if matches!(source.get(j), Some(&b'x') | Some(&b'X')) {
            j += 1;
            16
        } else {
            10
        };
        let digits_start = j;
        while j < limit
            && j - digits_start < 7
            && (if radix == 16 {
                util::is_hex_decimal(source[j])
            } else {
                util::is_numeric(source[j])
            })
        {
            j += 1;
        }
        if j == digits_start || j >= limit || source[j] != b';' {
            return None;
        }
        let text = std::str::from_utf8(&source[digits_start..j]).ok()?;
        let value = u32::from_str_radix(text, radix).unwrap_or(0);
        let mut buf = [0u8; 4];
        let rune = util::to_valid_char(value).encode_utf8(&mut buf);
        return Some((rune.as_bytes().to_vec(), j + 1));
    }
    let mut j = next;
    while j < limit && util::is_alpha_numeric(source[j]) {
        j += 1;
    }
    if j == next || j >= limit || source[j] != b';' {
        return None;
    }
    let name = std::str::from_utf8(&source[next..j]).ok()?;
    let expansion = crate::entities::lookup_named_entity(name)?;
    Some((expansion.as_bytes().to_vec(), j + 1))
}

/// True for destinations the renderer refuses to emit outside unsafe mode.
pub fn is_dangerous_url(url: &[u8]) -> bool {
    if url.starts_with(b"data:image/") {
        let rest = &url[11..];
        let safe = rest.starts_with(b"png;")
            || rest.starts_with(b"gif;")
            || rest.starts_with(b"jpeg;")
            || rest.starts_with(b"webp;");
        return !safe;
    }
    url.starts_with(b"javascript:")
        || url.starts_with(b"vbscript:")
        || url.starts_with(b"file:")
        || url.starts_with(b"data:")
}

/// Renderer configuration.
#[derive(Clone)]
pub struct HtmlOptions {
    /// Render soft line breaks as `<br>`.
    pub hard_wraps: bool,
    /// Self-close `hr`, `br` and `img` with ` />`.
    pub xhtml: bool,
    /// Emit raw HTML and dangerous URLs verbatim.
    pub unsafe_: bool,
    pub east_asian_line_breaks: EastAsianLineBreaks,
    pub writer: Arc<dyn TextWriter>,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            hard_wraps: false,
            xhtml: false,
            unsafe_: false,
            east_asian_line_breaks: EastAsianLineBreaks::Off,
            writer: Arc::new(DefaultWriter::default()),
        }
    }
}

pub struct RenderContext<'a> {
    pub tree: &'a Tree,
    pub source: &'a [u8],
}

/// Renders the node kinds it claims. Kinds registered by a higher-priority
/// renderer keep their claim.
pub trait NodeRenderer: Send + Sync {
    fn kinds(&self) -> Vec<NodeKind>;

    fn render(
        &self,
        out: &mut dyn Write,
        ctx: &RenderContext<'_>,
        node: NodeId,
        entering: bool,
    ) -> RenderResult;
}

/// The renderer walk host: dispatches each node to the registered renderer
/// for its kind, entering and leaving, short-circuiting on the first error.
pub struct Renderer {
    node_renderers: Vec<Prioritized<Box<dyn NodeRenderer>>>,
    frozen: OnceCell<HashMap<NodeKind, usize>>,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            node_renderers: Vec::new(),
            frozen: OnceCell::new(),
        }
    }

    pub fn add_node_renderer(&mut self, renderer: Box<dyn NodeRenderer>, priority: i32) {
        self.node_renderers.push(prioritized(renderer, priority));
    }

    fn freeze(&self) -> &HashMap<NodeKind, usize> {
        self.frozen.get_or_init(|| {
            let mut order: Vec<usize> = (0..self.node_renderers.len()).collect();
            order.sort_by_key(|&i| self.node_renderers[i].priority);
            let mut table = HashMap::new();
            for i in order {
                for kind in self.node_renderers[i].value.kinds() {
                    table.entry(kind).or_insert(i);
                }
            }
            table
        })
    }

    pub fn render(
        &self,
        out: &mut dyn Write,
        source: &[u8],
        tree: &Tree,
        root: NodeId,
    ) -> Result<(), RenderError> {
        let table = self.freeze();
        let ctx = RenderContext { tree, source };
        let mut buffered = io::BufWriter::new(out);
        ast::walk(tree, root, &mut |tree: &Tree, node: NodeId, entering| {
            let kind = tree.kind(node);
            let index = *table
                .get(&kind)
                .ok_or(RenderError::NoRendererFunc(kind))?;
            self.node_renderers[index]
                .value
                .render(&mut buffered, &ctx, node, entering)
        })?;
        buffered.flush()?;
        Ok(())
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// The HTML renderer for the core node kinds.
pub struct HtmlRenderer {
    pub options: HtmlOptions,
}

impl HtmlRenderer {
    pub fn new(options: HtmlOptions) -> Self {
        Self { options }
    }

    fn write_lines(
        &self,
        out: &mut dyn Write,
        ctx: &RenderContext<'_>,
        node: NodeId,
    ) -> io::Result<()> {
        let lines = ctx.tree.lines(node);
        for segment in lines.iter() {
            self.options
                .writer
                .raw_write(out, &segment.value(ctx.source))?;
        }
        Ok(())
    }

    fn write_attributes(
        &self,
        out: &mut dyn Write,
        ctx: &RenderContext<'_>,
        node: NodeId,
    ) -> io::Result<()> {
        for attr in ctx.tree.attributes(node) {
            out.write_all(b" ")?;
            out.write_all(&attr.name)?;
            out.write_all(b"=\"")?;
            out.write_all(&util::escape_html(&attr.value))?;
            out.write_all(b"\"")?;
        }
        Ok(())
    }

    fn write_href(&self, out: &mut dyn Write, destination: &[u8]) -> io::Result<()> {
        if self.options.unsafe_ || !is_dangerous_url(destination) {
            out.write_all(&util::escape_html(&util::url_escape(destination, true)))?;
        }
        Ok(())
    }

    fn line_break(&self) -> &'static [u8] {
        if self.options.xhtml {
            b"<br />\n"
        } else {
            b"<br>\n"
        }
    }

    fn render_text(
        &self,
        out: &mut dyn Write,
        ctx: &RenderContext<'_>,
        node: NodeId,
    ) -> io::Result<()> {
        let NodeData::Text {
            segment,
            soft_break,
            hard_break,
            raw,
        } = ctx.tree.data(node)
        else {
            return Ok(());
        };
        let value = segment.value(ctx.source);
        if *raw {
            return self.options.writer.raw_write(out, &value);
        }
        self.options.writer.write(out, &value)?;
        if *hard_break || (*soft_break && self.options.hard_wraps) {
            out.write_all(self.line_break())?;
        } else if *soft_break {
            if self.suppress_soft_break(ctx, node, segment.stop) {
                return Ok(());
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// East Asian line break filtering: a soft break between wide
    /// characters drops the newline entirely.
    fn suppress_soft_break(&self, ctx: &RenderContext<'_>, node: NodeId, stop: usize) -> bool {
        if self.options.east_asian_line_breaks == EastAsianLineBreaks::Off || stop == 0 {
            return false;
        }
        let Some(next) = ctx.tree.next_sibling(node) else {
            return false;
        };
        let NodeData::Text {
            segment: next_segment,
            ..
        } = ctx.tree.data(next)
        else {
            return false;
        };
        if next_segment.is_empty() {
            return false;
        }
        let before = util::char_ending_at(ctx.source, stop - 1);
        let after = util::char_at(ctx.source, next_segment.start);
        match self.options.east_asian_line_breaks {
            EastAsianLineBreaks::Off => false,
            EastAsianLineBreaks::BothSides => {
                util::is_east_asian_wide(before) && util::is_east_asian_wide(after)
            }
            EastAsianLineBreaks::EitherSide => {
                util::is_east_asian_wide(before) || util::is_east_asian_wide(after)
            }
        }
    }

    fn render_code_span(
        &self,
        out: &mut dyn Write,
        ctx: &RenderContext<'_>,
        node: NodeId,
    ) -> io::Result<()> {
        out.write_all(b"<code>")?;
        let mut child = ctx.tree.first_child(node);
        while let Some(c) = child {
            if let NodeData::Text { segment, .. } = ctx.tree.data(c) {
                let value = segment.value(ctx.source);
                if value.last() == Some(&b'\n') {
                    self.options
                        .writer
                        .raw_write(out, &value[..value.len() - 1])?;
                    if ctx.tree.next_sibling(c).is_some() {
                        self.options.writer.raw_write(out, b" ")?;
                    }
                } else {
                    self.options.writer.raw_write(out, &value)?;
                }
            }
            child = ctx.tree.next_sibling(c);
        }
        Ok(())
    }
}

impl NodeRenderer for HtmlRenderer {
    fn kinds(&self) -> Vec<NodeKind> {
        vec![
            NodeKind::Document,
            NodeKind::Heading,
            NodeKind::Blockquote,
            NodeKind::CodeBlock,
            NodeKind::FencedCodeBlock,
            NodeKind::HtmlBlock,
            NodeKind::List,
            NodeKind::ListItem,
            NodeKind::Paragraph,
            NodeKind::TextBlock,
            NodeKind::ThematicBreak,
            NodeKind::AutoLink,
            NodeKind::CodeSpan,
            NodeKind::Emphasis,
            NodeKind::Image,
            NodeKind::Link,
            NodeKind::RawHtml,
            NodeKind::Text,
            NodeKind::Str,
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
            NodeKind::Document => {}
            NodeKind::Heading => {
                let level = match tree.data(node) {
                    NodeData::Heading { level } => *level,
                    _ => 1,
                };
                if entering {
                    write!(out, "<h{}", level)?;
                    self.write_attributes(out, ctx, node)?;
                    out.write_all(b">")?;
                } else {
                    write!(out, "</h{}>\n", level)?;
                }
            }
            NodeKind::Blockquote => {
                if entering {
                    out.write_all(b"<blockquote>\n")?;
                } else {
                    out.write_all(b"</blockquote>\n")?;
                }
            }
            NodeKind::CodeBlock => {
                if entering {
                    out.write_all(b"<pre><code>")?;
                    self.write_lines(out, ctx, node)?;
                } else {
                    out.write_all(b"</code></pre>\n")?;
                }
            }
            NodeKind::FencedCodeBlock => {
                if entering {
                    out.write_all(b"<pre><code")?;
                    if let NodeData::FencedCodeBlock {
                        info: Some(info), ..
                    } = tree.data(node)
                    {
                        let value = info.value(ctx.source);
                        let language = value
                            .split(|&b| b == b' ' || b == b'\t')
                            .next()
                            .unwrap_or(&[]);
                        if !language.is_empty() {
                            out.write_all(b" class=\"language-")?;
                            self.options.writer.write(out, language)?;
                            out.write_all(b"\"")?;
                        }
                    }
                    out.write_all(b">")?;
                    self.write_lines(out, ctx, node)?;
                } else {
                    out.write_all(b"</code></pre>\n")?;
                }
            }
            NodeKind::HtmlBlock => {
                let closure = match tree.data(node) {
                    NodeData::HtmlBlock { closure_line, .. } => closure_line.clone(),
                    _ => None,
                };
                if entering {
                    if self.options.unsafe_ {
                        let lines = tree.lines(node);
                        for segment in lines.iter() {
                            out.write_all(&segment.value(ctx.source))?;
                        }
                    } else {
                        out.write_all(b"<!-- raw HTML omitted -->\n")?;
                    }
                } else if let Some(closure) = closure
                    && self.options.unsafe_
                {
                    out.write_all(&closure.value(ctx.source))?;
                }
            }
            NodeKind::List => {
                let (ordered, start) = match tree.data(node) {
                    NodeData::List { ordered, start, .. } => (*ordered, *start),
                    _ => (false, 1),
                };
                let tag: &[u8] = if ordered { b"ol" } else { b"ul" };
                if entering {
                    out.write_all(b"<")?;
                    out.write_all(tag)?;
                    if ordered && start != 1 {
                        write!(out, " start=\"{}\"", start)?;
                    }
                    out.write_all(b">\n")?;
                } else {
                    out.write_all(b"</")?;
                    out.write_all(tag)?;
                    out.write_all(b">\n")?;
                }
            }
            NodeKind::ListItem => {
                if entering {
                    out.write_all(b"<li>")?;
                    if let Some(fc) = tree.first_child(node)
                        && tree.kind(fc) != NodeKind::TextBlock
                    {
                        out.write_all(b"\n")?;
                    }
                } else {
                    out.write_all(b"</li>\n")?;
                }
            }
            NodeKind::Paragraph => {
                if entering {
                    out.write_all(b"<p>")?;
                } else {
                    out.write_all(b"</p>\n")?;
                }
            }
            NodeKind::TextBlock => {
                if !entering
                    && tree.next_sibling(node).is_some()
                    && tree.first_child(node).is_some()
                {
                    out.write_all(b"\n")?;
                }
            }
            NodeKind::ThematicBreak => {
                if entering {
                    if self.options.xhtml {
                        out.write_all(b"<hr />\n")?;
                    } else {
                        out.write_all(b"<hr>\n")?;
                    }
                }
            }
            NodeKind::AutoLink => {
                if entering
                    && let NodeData::AutoLink { link_type, value } = tree.data(node)
                {
                    let url = value.value(ctx.source);
                    out.write_all(b"<a href=\"")?;
                    if *link_type == AutoLinkType::Email
                        && !url.to_ascii_lowercase().starts_with(b"mailto:")
                    {
                        out.write_all(b"mailto:")?;
                    } else if *link_type == AutoLinkType::Url && url.starts_with(b"www.") {
                        // Bare www links from the linkify extension.
                        out.write_all(b"http://")?;
                    }
                    out.write_all(&util::escape_html(&util::url_escape(&url, false)))?;
                    out.write_all(b"\">")?;
                    out.write_all(&util::escape_html(&url))?;
                    out.write_all(b"</a>")?;
                }
            }
            NodeKind::CodeSpan => {
                if entering {
                    self.render_code_span(out, ctx, node)?;
                    return Ok(WalkStatus::SkipChildren);
                }
                out.write_all(b"</code>")?;
            }
            NodeKind::Emphasis => {
                let level = match tree.data(node) {
                    NodeData::Emphasis { level } => *level,
                    _ => 1,
                };
                let tag: &[u8] = if level == 2 { b"strong" } else { b"em" };
                out.write_all(if entering { b"<" } else { b"</" })?;
                out.write_all(tag)?;
                out.write_all(b">")?;
            }
            NodeKind::Link => {
                if let NodeData::Link { destination, title } = tree.data(node) {
                    if entering {
                        out.write_all(b"<a href=\"")?;
                        self.write_href(out, destination)?;
                        out.write_all(b"\"")?;
                        if !title.is_empty() {
                            out.write_all(b" title=\"")?;
                            self.options.writer.write(out, title)?;
                            out.write_all(b"\"")?;
                        }
                        out.write_all(b">")?;
                    } else {
                        out.write_all(b"</a>")?;
                    }
                }
            }
            NodeKind::Image => {
                if !entering {
                    return Ok(WalkStatus::Continue);
                }
                if let NodeData::Link { destination, title } = tree.data(node) {
                    out.write_all(b"<img src=\"")?;
                    self.write_href(out, destination)?;
                    out.write_all(b"\" alt=\"")?;
                    self.options
                        .writer
                        .raw_write(out, &tree.text(node, ctx.source))?;
                    out.write_all(b"\"")?;
                    if !title.is_empty() {
                        out.write_all(b" title=\"")?;
                        self.options.writer.write(out, title)?;
                        out.write_all(b"\"")?;
                    }
                    if self.options.xhtml {
                        out.write_all(b" />")?;
                    } else {
                        out.write_all(b">")?;
                    }
                }
                return Ok(WalkStatus::SkipChildren);
            }
            NodeKind::RawHtml => {
                if !entering {
                    return Ok(WalkStatus::SkipChildren);
                }
                if self.options.unsafe_ {
                    if let NodeData::RawHtml { segments } = tree.data(node) {
                        for segment in segments.iter() {
                            out.write_all(&segment.value(ctx.source))?;
                        }
                    }
                } else {
                    out.write_all(b"<!-- raw HTML omitted -->")?;
                }
                return Ok(WalkStatus::SkipChildren);
            }
            NodeKind::Text => {
                if entering {
                    self.render_text(out, ctx, node)?;
                }
            }
            NodeKind::Str => {
                if entering
                    && let NodeData::Str { value, raw, code } = tree.data(node)
                {
                    if *code {
                        out.write_all(value)?;
                    } else if *raw {
                        self.options.writer.raw_write(out, value)?;
                    } else {
                        self.options.writer.write(out, value)?;
                    }
                }
            }
            _ => {}
        }
        Ok(WalkStatus::Continue)
    }
}
