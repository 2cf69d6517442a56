//! Built-in extensions. Each registers some combination of block parsers,
//! inline parsers, paragraph transformers, AST transformers and node
//! renderers with the builder.

pub mod cjk;
pub mod definition_list;
pub mod footnote;
pub mod linkify;
pub mod strikethrough;
pub mod table;
pub mod tasklist;
pub mod typographer;

pub use cjk::Cjk;
pub use definition_list::DefinitionList;
pub use footnote::Footnote;
pub use linkify::Linkify;
pub use strikethrough::Strikethrough;
pub use table::Table;
pub use tasklist::TaskList;
pub use typographer::Typographer;

use crate::{Extend, MarkdownBuilder};

/// GitHub Flavored Markdown: linkify, tables, strikethrough and task lists.
pub struct Gfm;

impl Extend for Gfm {
    fn extend(&self, md: &mut MarkdownBuilder) {
        Linkify.extend(md);
        Table.extend(md);
        Strikethrough.extend(md);
        TaskList.extend(md);
    }
}
