//! tidemark-core: an extensible CommonMark engine. Source bytes go through
//! a block phase that builds a tree of container and leaf blocks, an inline
//! phase that fills non-raw leaves with inline nodes, AST transformers, and
//! finally the HTML renderer walk.
//!
//! ```no_run
//! let mut out = Vec::new();
//! tidemark_core::convert(b"# Hello", &mut out).unwrap();
//! assert_eq!(out, b"<h1>Hello</h1>\n");
//! ```
//!
//! Extensions register block parsers, inline parsers, paragraph and AST
//! transformers and node renderers with priorities through [`Extend`]:
//!
//! ```no_run
//! use tidemark_core::{Markdown, extension};
//!
//! let md = Markdown::builder()
//!     .xhtml(true)
//!     .with_extension(&extension::Gfm)
//!     .build();
//! let mut out = Vec::new();
//! md.convert(b"~~hi~~", &mut out).unwrap();
//! ```

pub mod ast;
pub mod block;
mod entities;
pub mod extension;
pub mod html;
pub mod inline;
mod label;
pub mod parser;
pub mod reader;
pub mod segment;
pub mod util;

use std::io::Write;
use std::sync::Arc;

use once_cell::sync::Lazy;

pub use crate::ast::{NodeId, NodeKind, Tree, WalkStatus};
pub use crate::html::{
    EastAsianLineBreaks, HtmlOptions, HtmlRenderer, NodeRenderer, RenderError, Renderer,
    TextWriter,
};
pub use crate::label::normalize_link_label;
pub use crate::parser::{Parser, ParserOptions, Reference};
pub use crate::reader::LineReader;
pub use crate::segment::{Segment, Segments};

use crate::html::DefaultWriter;

/// An extension: registers parsers, transformers and renderers on the
/// builder, and may adjust its options.
pub trait Extend {
    fn extend(&self, md: &mut MarkdownBuilder);
}

type NodeRendererFactory = Box<dyn Fn(&HtmlOptions) -> Box<dyn html::NodeRenderer>>;

/// Configures and assembles a [`Markdown`] engine. The default block and
/// inline parsers are registered at build time with spaced-out priorities,
/// so extensions can slot in between them.
pub struct MarkdownBuilder {
    pub parser_options: ParserOptions,
    pub html_options: HtmlOptions,
    block_parsers: Vec<(Box<dyn parser::BlockParser>, i32)>,
    inline_parsers: Vec<(Box<dyn parser::InlineParser>, i32)>,
    paragraph_transformers: Vec<(Box<dyn parser::ParagraphTransformer>, i32)>,
    ast_transformers: Vec<(Box<dyn parser::AstTransformer>, i32)>,
    node_renderers: Vec<(NodeRendererFactory, i32)>,
}

impl MarkdownBuilder {
    pub fn new() -> Self {
        Self {
            parser_options: ParserOptions::default(),
            html_options: HtmlOptions::default(),
            block_parsers: Vec::new(),
            inline_parsers: Vec::new(),
            paragraph_transformers: Vec::new(),
            ast_transformers: Vec::new(),
            node_renderers: Vec::new(),
        }
    }

    pub fn hard_wraps(mut self, v: bool) -> Self {
        self.html_options.hard_wraps = v;
        self
    }

    pub fn xhtml(mut self, v: bool) -> Self {
        self.html_options.xhtml = v;
        self
    }

    /// Renders raw HTML and dangerous link destinations verbatim.
    pub fn unsafe_rendering(mut self, v: bool) -> Self {
        self.html_options.unsafe_ = v;
        self
    }

    pub fn auto_heading_id(mut self, v: bool) -> Self {
        self.parser_options.auto_heading_id = v;
        self
    }

    /// Enables `{#id key=val}` attribute blocks on headings.
    pub fn attribute(mut self, v: bool) -> Self {
        self.parser_options.attribute = v;
        self
    }

    pub fn writer(mut self, writer: Arc<dyn TextWriter>) -> Self {
        self.html_options.writer = writer;
        self
    }

    pub fn with_extension(mut self, extension: &dyn Extend) -> Self {
        extension.extend(&mut self);
        self
    }

    pub fn add_block_parser(&mut self, parser: Box<dyn parser::BlockParser>, priority: i32) {
        self.block_parsers.push((parser, priority));
    }

    pub fn add_inline_parser(&mut self, parser: Box<dyn parser::InlineParser>, priority: i32) {
        self.inline_parsers.push((parser, priority));
    }

    pub fn add_paragraph_transformer(
        &mut self,
        transformer: Box<dyn parser::ParagraphTransformer>,
        priority: i32,
    ) {
        self.paragraph_transformers.push((transformer, priority));
    }

    pub fn add_ast_transformer(
        &mut self,
        transformer: Box<dyn parser::AstTransformer>,
        priority: i32,
    ) {
        self.ast_transformers.push((transformer, priority));
    }

    /// Registers a node renderer built from the final HTML options, so
    /// option order relative to extensions does not matter.
    pub fn add_node_renderer(&mut self, factory: NodeRendererFactory, priority: i32) {
        self.node_renderers.push((factory, priority));
    }

    pub fn build(self) -> Markdown {
        let options = self.parser_options;
        let mut p = Parser::new(options);
        p.add_block_parser(Box::new(block::SetextHeadingParser { options }), 100);
        p.add_block_parser(Box::new(block::ThematicBreakParser), 200);
        p.add_block_parser(Box::new(block::ListParser), 300);
        p.add_block_parser(Box::new(block::ListItemParser), 400);
        p.add_block_parser(Box::new(block::CodeBlockParser), 500);
        p.add_block_parser(Box::new(block::AtxHeadingParser { options }), 600);
        p.add_block_parser(Box::new(block::FencedCodeBlockParser), 700);
        p.add_block_parser(Box::new(block::BlockquoteParser), 800);
        p.add_block_parser(Box::new(block::HtmlBlockParser), 900);
        p.add_block_parser(Box::new(block::ParagraphParser), 1000);
        p.add_inline_parser(Box::new(inline::CodeSpanParser), 100);
        p.add_inline_parser(Box::new(inline::LinkParser), 200);
        p.add_inline_parser(Box::new(inline::AutoLinkParser), 300);
        p.add_inline_parser(Box::new(inline::RawHtmlParser), 400);
        p.add_inline_parser(Box::new(inline::EmphasisParser::new()), 500);
        p.add_paragraph_transformer(Box::new(block::LinkReferenceParagraphTransformer), 100);
        for (bp, priority) in self.block_parsers {
            p.add_block_parser(bp, priority);
        }
        for (ip, priority) in self.inline_parsers {
            p.add_inline_parser(ip, priority);
        }
        for (pt, priority) in self.paragraph_transformers {
            p.add_paragraph_transformer(pt, priority);
        }
        for (at, priority) in self.ast_transformers {
            p.add_ast_transformer(at, priority);
        }

        let mut r = Renderer::new();
        r.add_node_renderer(
            Box::new(HtmlRenderer::new(self.html_options.clone())),
            1000,
        );
        for (factory, priority) in &self.node_renderers {
            r.add_node_renderer(factory(&self.html_options), *priority);
        }
        Markdown {
            parser: p,
            renderer: r,
        }
    }
}

impl Default for MarkdownBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A parser/renderer pair. Freezes its registrations on first use, after
/// which it can be shared between threads; each convert call owns its own
/// context.
pub struct Markdown {
    parser: Parser,
    renderer: Renderer,
}

impl Markdown {
    /// A CommonMark engine with the default options and no extensions.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MarkdownBuilder {
        MarkdownBuilder::new()
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Parses the source and renders it as HTML into the sink. Any byte
    /// sequence yields output; only sink errors and missing node renderers
    /// surface as errors.
    pub fn convert(&self, source: &[u8], out: &mut dyn Write) -> Result<(), RenderError> {
        let mut reader = LineReader::new(source);
        let (tree, root) = self.parser.parse(&mut reader);
        self.renderer.render(out, source, &tree, root)
    }

    /// Parses the source into a document tree without rendering.
    pub fn parse(&self, source: &[u8]) -> (Tree, NodeId) {
        let mut reader = LineReader::new(source);
        self.parser.parse(&mut reader)
    }
}

impl Default for Markdown {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT: Lazy<Markdown> = Lazy::new(Markdown::new);

/// Converts with the default CommonMark engine.
pub fn convert(source: &[u8], out: &mut dyn Write) -> Result<(), RenderError> {
    DEFAULT.convert(source, out)
}

/// A default writer with CJK escaped-space handling, for use with
/// [`MarkdownBuilder::writer`].
pub fn escaped_space_writer() -> Arc<dyn TextWriter> {
    Arc::new(DefaultWriter {
        escaped_space: true,
    })
}
