use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::process;

use tidemark_core::{extension, Extend, Markdown, MarkdownBuilder};

fn main() {
    let mut input: Option<String> = None;
    let mut xhtml = false;
    let mut hard_wraps = false;
    let mut unsafe_rendering = false;
    let mut auto_heading_id = false;
    let mut attribute = false;
    let mut sanitized = false;
    let mut extensions: Vec<String> = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return;
            }
            "--xhtml" => xhtml = true,
            "--hard-wraps" => hard_wraps = true,
            "--unsafe" => unsafe_rendering = true,
            "--auto-heading-id" => auto_heading_id = true,
            "--attribute" => attribute = true,
            "--sanitized" => sanitized = true,
            "--extension" | "-x" => {
                let Some(names) = args.next() else {
                    eprintln!("--extension expects a comma separated list");
                    print_usage();
                    process::exit(2);
                };
                extensions.extend(names.split(',').map(|s| s.trim().to_string()));
            }
            _ => {
                if input.is_none() {
                    input = Some(arg);
                } else {
                    eprintln!("unexpected argument: {}", arg);
                    print_usage();
                    process::exit(2);
                }
            }
        }
    }

    let source = match input {
        Some(path) => fs::read(&path).unwrap_or_else(|err| {
            eprintln!("failed to read {}: {}", path, err);
            process::exit(1);
        }),
        None => {
            let mut buffer = Vec::new();
            io::stdin().read_to_end(&mut buffer).unwrap_or_else(|err| {
                eprintln!("failed to read stdin: {}", err);
                process::exit(1);
            });
            buffer
        }
    };

    let mut builder = Markdown::builder()
        .xhtml(xhtml)
        .hard_wraps(hard_wraps)
        .unsafe_rendering(unsafe_rendering)
        .auto_heading_id(auto_heading_id)
        .attribute(attribute);
    for name in &extensions {
        builder = match apply_extension(builder, name) {
            Some(builder) => builder,
            None => {
                eprintln!("unknown extension: {}", name);
                print_usage();
                process::exit(2);
            }
        };
    }
    let md = builder.build();

    let mut html = Vec::new();
    if let Err(err) = md.convert(&source, &mut html) {
        eprintln!("render failed: {}", err);
        process::exit(1);
    }

    if sanitized {
        let text = String::from_utf8_lossy(&html);
        let clean = ammonia::Builder::default().clean(&text).to_string();
        print!("{}", clean);
        return;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(err) = out.write_all(&html) {
        eprintln!("failed to write output: {}", err);
        process::exit(1);
    }
}

fn apply_extension(builder: MarkdownBuilder, name: &str) -> Option<MarkdownBuilder> {
    let extension: Box<dyn Extend> = match name {
        "gfm" => Box::new(extension::Gfm),
        "table" => Box::new(extension::Table),
        "strikethrough" => Box::new(extension::Strikethrough),
        "tasklist" => Box::new(extension::TaskList),
        "linkify" => Box::new(extension::Linkify),
        "footnote" => Box::new(extension::Footnote),
        "definition-list" => Box::new(extension::DefinitionList),
        "typographer" => Box::new(extension::Typographer::default()),
        "cjk" => Box::new(extension::Cjk::new()),
        _ => return None,
    };
    Some(builder.with_extension(extension.as_ref()))
}

fn print_usage() {
    eprintln!(
        "Usage: tidemark [--xhtml] [--hard-wraps] [--unsafe] [--auto-heading-id] \
         [--attribute] [--sanitized] [--extension gfm,footnote,...] [input]"
    );
    eprintln!("Reads Markdown from a file or stdin and writes HTML to stdout.");
}
