//! CJK support: drops soft line breaks between East Asian wide characters
//! at render time, and makes backslash-escaped spaces disappear so inline
//! markup can touch CJK text.

use crate::escaped_space_writer;
use crate::html::EastAsianLineBreaks;
use crate::{Extend, MarkdownBuilder};

pub struct Cjk {
    pub east_asian_line_breaks: EastAsianLineBreaks,
    pub escaped_space: bool,
}

impl Cjk {
    /// Both features enabled, with the conservative both-sides-wide break
    /// style.
    pub fn new() -> Self {
        Self {
            east_asian_line_breaks: EastAsianLineBreaks::BothSides,
            escaped_space: true,
        }
    }
}

impl Default for Cjk {
    fn default() -> Self {
        Self::new()
    }
}

impl Extend for Cjk {
    fn extend(&self, md: &mut MarkdownBuilder) {
        md.html_options.east_asian_line_breaks = self.east_asian_line_breaks;
        if self.escaped_space {
            md.html_options.writer = escaped_space_writer();
            md.parser_options.escaped_space = true;
        }
    }
}
