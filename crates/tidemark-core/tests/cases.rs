//! Runs the conformance-style case files under `tests/suite/`. One record:
//!
//! ```text
//! <N>[:description]
//! //- - - - - - - - -//
//! <markdown>
//! //- - - - - - - - -//
//! <expected html>
//! //= = = = = = = = = = = = = = = = = = = = = = = =//
//! ```
//!
//! An `OPTIONS: <json>` line between the header and the first separator
//! carries per-case flags (currently `{"trim": bool}`).

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tidemark_core::{extension, Markdown};

const ATTRIBUTE_SEPARATOR: &str = "//- - - - - - - - -//";
const CASE_SEPARATOR: &str = "//= = = = = = = = = = = = = = = = = = = = = = = =//";

#[derive(Debug, Default, Deserialize)]
struct CaseOptions {
    trim: Option<bool>,
}

#[derive(Debug)]
struct MarkdownTestCase {
    no: i64,
    description: String,
    options: CaseOptions,
    markdown: String,
    expected: String,
}

fn parse_case_file(path: &Path) -> Vec<MarkdownTestCase> {
    let text = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read {}: {}", path.display(), err));
    let mut lines = text.lines().peekable();
    let mut cases = Vec::new();
    let mut line_no = 0usize;

    loop {
        let header = loop {
            match lines.next() {
                None => return cases,
                Some(line) => {
                    line_no += 1;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
            }
        };
        let (no, description) = match header.split_once(':') {
            Some((no, description)) => (no.trim(), description.to_string()),
            None => (header.trim(), String::new()),
        };
        let no: i64 = no
            .parse()
            .unwrap_or_else(|_| panic!("{}: invalid case No at line {}", path.display(), line_no));

        let mut options = CaseOptions::default();
        let mut next = lines.next().map(|l| {
            line_no += 1;
            l
        });
        if let Some(line) = next
            && let Some(json) = line.strip_prefix("OPTIONS:")
        {
            options = serde_json::from_str(json.trim()).unwrap_or_else(|err| {
                panic!("{}: invalid OPTIONS at line {}: {}", path.display(), line_no, err)
            });
            next = lines.next().map(|l| {
                line_no += 1;
                l
            });
        }
        assert_eq!(
            next,
            Some(ATTRIBUTE_SEPARATOR),
            "{}: invalid separator at line {}",
            path.display(),
            line_no
        );

        let mut markdown = Vec::new();
        for line in lines.by_ref() {
            line_no += 1;
            if line == ATTRIBUTE_SEPARATOR {
                break;
            }
            markdown.push(line);
        }
        let mut expected = Vec::new();
        for line in lines.by_ref() {
            line_no += 1;
            if line == CASE_SEPARATOR {
                break;
            }
            expected.push(line);
        }
        let mut expected = expected.join("\n");
        if !expected.is_empty() {
            expected.push('\n');
        }
        cases.push(MarkdownTestCase {
            no,
            description,
            options,
            markdown: markdown.join("\n"),
            expected,
        });
    }
}

fn run_case_file(md: &Markdown, name: &str) {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/suite")
        .join(name);
    let cases = parse_case_file(&path);
    assert!(!cases.is_empty(), "{} has no cases", name);
    for case in cases {
        let mut out = Vec::new();
        md.convert(case.markdown.as_bytes(), &mut out)
            .unwrap_or_else(|err| panic!("case {} failed to render: {}", case.no, err));
        let actual = String::from_utf8_lossy(&out);
        let trim = case.options.trim.unwrap_or(true);
        let (actual, expected) = if trim {
            (actual.trim().to_string(), case.expected.trim().to_string())
        } else {
            (actual.to_string(), case.expected.clone())
        };
        assert_eq!(
            actual, expected,
            "case {}{} in {}\nMarkdown:\n{}\n",
            case.no,
            if case.description.is_empty() {
                String::new()
            } else {
                format!(": {}", case.description)
            },
            name,
            case.markdown
        );
    }
}

#[test]
fn core_cases() {
    run_case_file(&Markdown::new(), "core.txt");
}

#[test]
fn gfm_cases() {
    let md = Markdown::builder().with_extension(&extension::Gfm).build();
    run_case_file(&md, "gfm.txt");
}
