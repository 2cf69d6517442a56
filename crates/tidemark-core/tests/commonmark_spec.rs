//! Runs the canonical CommonMark conformance list when a `spec.json` is
//! present. Each entry is `{markdown, html, example, start_line, section}`;
//! both sides are compared after trimming.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tidemark_core::Markdown;

#[derive(Debug, Deserialize)]
struct SpecExample {
    markdown: String,
    html: String,
    example: u32,
    #[serde(default)]
    start_line: u32,
    section: String,
}

#[test]
fn commonmark_spec() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let spec_path = root.join("tests/commonmark/spec.json");

    if !spec_path.exists() {
        eprintln!("Warning: CommonMark spec.json not found at {:?}", spec_path);
        eprintln!("Skipping CommonMark spec tests.");
        return;
    }

    let spec_json = fs::read_to_string(&spec_path).expect("failed to read spec.json");
    let examples: Vec<SpecExample> =
        serde_json::from_str(&spec_json).expect("failed to parse spec.json");

    // Raw HTML passthrough is what the spec suite expects.
    let md = Markdown::builder().unsafe_rendering(true).build();

    let mut passed = 0;
    let mut failed = 0;
    let mut failures = Vec::new();

    for example in &examples {
        let mut out = Vec::new();
        if md.convert(example.markdown.as_bytes(), &mut out).is_err() {
            failed += 1;
            continue;
        }
        let actual = String::from_utf8_lossy(&out);
        if actual.trim() == example.html.trim() {
            passed += 1;
        } else {
            failed += 1;
            failures.push(example);
        }
    }

    let total = passed + failed;
    let pass_rate = if total > 0 {
        (passed as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    println!("\n=== CommonMark Spec Test Results ===");
    println!("Total examples: {}", total);
    println!("Passed: {}", passed);
    println!("Failed: {}", failed);
    println!("Pass rate: {:.1}%", pass_rate);
    println!("====================================\n");

    if !failures.is_empty() {
        println!("First 5 failures:");
        for failure in failures.iter().take(5) {
            println!(
                "  Example {} (line {}): {}",
                failure.example, failure.start_line, failure.section
            );
            println!("  Markdown: {:?}", failure.markdown);
        }
        let mut sections: std::collections::HashMap<&str, u32> = std::collections::HashMap::new();
        for failure in &failures {
            *sections.entry(failure.section.as_str()).or_insert(0) += 1;
        }
        let mut section_counts: Vec<_> = sections.into_iter().collect();
        section_counts.sort_by_key(|&(_, count)| std::cmp::Reverse(count));
        println!("Failures by section:");
        for (section, count) in section_counts {
            println!("  {}: {}", section, count);
        }
    }

    assert!(
        pass_rate >= 50.0,
        "CommonMark pass rate ({:.1}%) is below baseline (50%). Failed {} / {} examples.",
        pass_rate,
        failed,
        total
    );
}
