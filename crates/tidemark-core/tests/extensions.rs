//! Option- and extension-dependent behavior that the plain case files
//! cannot express.

use tidemark_core::{extension, EastAsianLineBreaks, Markdown};

fn convert(md: &Markdown, source: &str) -> String {
    let mut out = Vec::new();
    md.convert(source.as_bytes(), &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn xhtml_hard_break_with_crlf() {
    let md = Markdown::builder().xhtml(true).build();
    assert_eq!(convert(&md, "a  \r\nb\n"), "<p>a<br />\nb</p>\n");
}

#[test]
fn xhtml_self_closing_tags() {
    let md = Markdown::builder().xhtml(true).build();
    assert_eq!(convert(&md, "***\n"), "<hr />\n");
    assert_eq!(
        convert(&md, "![x](/i)\n"),
        "<p><img src=\"/i\" alt=\"x\" /></p>\n"
    );
}

#[test]
fn unsafe_mode_keeps_raw_html_and_urls() {
    let md = Markdown::builder().unsafe_rendering(true).xhtml(true).build();
    assert_eq!(
        convert(&md, "[](./target.md)"),
        "<p><a href=\"./target.md\"></a></p>\n"
    );
    assert_eq!(convert(&md, "<div>\nhi\n</div>\n"), "<div>\nhi\n</div>\n");
    assert_eq!(
        convert(&md, "a <b>c</b>\n"),
        "<p>a <b>c</b></p>\n"
    );
    assert_eq!(
        convert(&md, "[a](javascript:x)\n"),
        "<p><a href=\"javascript:x\">a</a></p>\n"
    );
}

#[test]
fn hard_wraps_render_soft_breaks_as_br() {
    let md = Markdown::builder().hard_wraps(true).build();
    assert_eq!(convert(&md, "a\nb\n"), "<p>a<br>\nb</p>\n");
}

#[test]
fn auto_heading_ids_are_unique() {
    let md = Markdown::builder().auto_heading_id(true).build();
    assert_eq!(
        convert(&md, "# Foo Bar\n\n# Foo Bar\n"),
        "<h1 id=\"foo-bar\">Foo Bar</h1>\n<h1 id=\"foo-bar-1\">Foo Bar</h1>\n"
    );
}

#[test]
fn heading_attributes_require_the_option() {
    let with = Markdown::builder().attribute(true).build();
    assert_eq!(
        convert(&with, "# Foo {#bar}\n"),
        "<h1 id=\"bar\">Foo</h1>\n"
    );
    let without = Markdown::new();
    assert_eq!(
        convert(&without, "# Foo {#bar}\n"),
        "<h1>Foo {#bar}</h1>\n"
    );
}

#[test]
fn heading_attributes_with_classes_and_values() {
    let md = Markdown::builder().attribute(true).build();
    assert_eq!(
        convert(&md, "## T {#x .a .b k=v}\n"),
        "<h2 id=\"x\" k=\"v\" class=\"a b\">T</h2>\n"
    );
}

#[test]
fn cjk_line_breaks_and_escaped_spaces() {
    let md = Markdown::builder().with_extension(&extension::Cjk::new()).build();
    assert_eq!(
        convert(
            &md,
            "太郎は\\ **「こんにちわ」**\\ と言った\nんです\n"
        ),
        "<p>太郎は<strong>「こんにちわ」</strong>と言ったんです</p>\n"
    );
}

#[test]
fn cjk_one_side_style() {
    let md = Markdown::builder()
        .with_extension(&extension::Cjk {
            east_asian_line_breaks: EastAsianLineBreaks::EitherSide,
            escaped_space: false,
        })
        .build();
    // Wide character on one side only still joins.
    assert_eq!(convert(&md, "ワイド\nnarrow\n"), "<p>ワイドnarrow</p>\n");
    // Narrow on both sides keeps the newline.
    assert_eq!(convert(&md, "aa\nbb\n"), "<p>aa\nbb</p>\n");
}

#[test]
fn footnotes_render_a_list_at_document_end() {
    let md = Markdown::builder().with_extension(&extension::Footnote).build();
    let expected = concat!(
        "<p>foo<sup id=\"fnref:1\"><a href=\"#fn:1\" class=\"footnote-ref\" role=\"doc-noteref\">1</a></sup></p>\n",
        "<div class=\"footnotes\" role=\"doc-endnotes\">\n",
        "<hr>\n",
        "<ol>\n",
        "<li id=\"fn:1\" role=\"doc-endnote\">\n",
        "<p>bar&#160;<a href=\"#fnref:1\" class=\"footnote-backref\" role=\"doc-backlink\">&#x21a9;&#xfe0e;</a></p>\n",
        "</li>\n",
        "</ol>\n",
        "</div>\n",
    );
    assert_eq!(convert(&md, "foo[^1]\n\n[^1]: bar\n"), expected);
}

#[test]
fn footnote_without_definition_stays_literal() {
    let md = Markdown::builder().with_extension(&extension::Footnote).build();
    assert_eq!(convert(&md, "foo[^nope]\n"), "<p>foo[^nope]</p>\n");
}

#[test]
fn unreferenced_footnote_definition_disappears() {
    let md = Markdown::builder().with_extension(&extension::Footnote).build();
    assert_eq!(convert(&md, "foo\n\n[^a]: bar\n"), "<p>foo</p>\n");
}

#[test]
fn definition_lists() {
    let md = Markdown::builder()
        .with_extension(&extension::DefinitionList)
        .build();
    assert_eq!(
        convert(&md, "Apple\n: a fruit\n"),
        "<dl>\n<dt>Apple</dt>\n<dd>a fruit</dd>\n</dl>\n"
    );
    assert_eq!(
        convert(&md, "Term\n: one\n: two\n"),
        "<dl>\n<dt>Term</dt>\n<dd>one</dd>\n<dd>two</dd>\n</dl>\n"
    );
}

#[test]
fn typographer_substitutions() {
    let md = Markdown::builder()
        .with_extension(&extension::Typographer::default())
        .build();
    assert_eq!(
        convert(&md, "\"Hello\" -- world...\n"),
        "<p>&ldquo;Hello&rdquo; &ndash; world&hellip;</p>\n"
    );
    assert_eq!(
        convert(&md, "a --- b\n"),
        "<p>a &mdash; b</p>\n"
    );
    assert_eq!(
        convert(&md, "<<guillemets>>\n"),
        "<p>&laquo;guillemets&raquo;</p>\n"
    );
}

#[test]
fn gfm_bundle_composes() {
    let md = Markdown::builder().with_extension(&extension::Gfm).build();
    assert_eq!(
        convert(&md, "~~a~~ www.example.com\n"),
        "<p><del>a</del> <a href=\"http://www.example.com\">www.example.com</a></p>\n"
    );
}

#[test]
fn parse_and_render_are_usable_separately() {
    let md = Markdown::new();
    let source = b"# T\n\npara\n";
    let (tree, root) = md.parse(source);
    let mut first = Vec::new();
    md.renderer().render(&mut first, source, &tree, root).unwrap();
    let mut second = Vec::new();
    md.renderer().render(&mut second, source, &tree, root).unwrap();
    // Rendering the same tree twice yields identical bytes.
    assert_eq!(first, second);
    assert_eq!(first, b"<h1>T</h1>\n<p>para</p>\n");
}
