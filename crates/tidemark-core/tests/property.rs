//! Deterministic random-input properties: conversion never panics, every
//! segment stays inside the source, and sibling links always form a
//! consistent doubly linked chain.

use std::panic;

use tidemark_core::{ast, extension, Markdown, NodeId, Tree};

const CASES: usize = 300;
const MAX_LEN: usize = 512;
const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 \
\n\t#@*`$[](){}!<>:+-_=.,;/\\\"'~|^&%?\r";

struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 16
    }

    fn gen_range(&mut self, lo: usize, hi: usize) -> usize {
        lo + (self.next() as usize) % (hi - lo)
    }
}

fn random_input(rng: &mut Lcg, len: usize) -> Vec<u8> {
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0, CHARSET.len())])
        .collect()
}

fn engine() -> Markdown {
    Markdown::builder()
        .with_extension(&extension::Gfm)
        .with_extension(&extension::Footnote)
        .with_extension(&extension::DefinitionList)
        .with_extension(&extension::Typographer::default())
        .build()
}

#[test]
fn convert_never_panics_on_random_input() {
    let md = engine();
    let mut rng = Lcg::new(0x7f4a_2d91_13b4_55a1);
    for case in 0..CASES {
        let len = rng.gen_range(0, MAX_LEN + 1);
        let source = random_input(&mut rng, len);
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let mut out = Vec::new();
            md.convert(&source, &mut out).unwrap();
            out
        }));
        assert!(
            result.is_ok(),
            "convert panicked for case {}: {:?}",
            case,
            String::from_utf8_lossy(&source)
        );
    }
}

#[test]
fn tree_invariants_hold_on_random_input() {
    let md = engine();
    let mut rng = Lcg::new(0x91d4_2f8e_c1a3_044f);
    for case in 0..CASES {
        let len = rng.gen_range(0, MAX_LEN + 1);
        let source = random_input(&mut rng, len);
        let (tree, root) = md.parse(&source);
        if let Err(message) = check_node(&tree, root, source.len()) {
            panic!(
                "invariant failed for case {}: {}\nSource:\n---\n{}\n---",
                case,
                message,
                String::from_utf8_lossy(&source)
            );
        }
    }
}

fn check_node(tree: &Tree, node: NodeId, source_len: usize) -> Result<(), String> {
    // The children reachable forward must be the reverse of the children
    // reachable backward, and every child must point at its parent.
    let forward: Vec<NodeId> = tree.children(node).collect();
    let mut backward = Vec::new();
    let mut child = tree.last_child(node);
    while let Some(c) = child {
        backward.push(c);
        child = tree.prev_sibling(c);
    }
    backward.reverse();
    if forward != backward {
        return Err(format!(
            "sibling chain mismatch under {:?}: {:?} vs {:?}",
            tree.kind(node),
            forward,
            backward
        ));
    }
    for &c in &forward {
        if tree.parent(c) != Some(node) {
            return Err(format!("child {:?} does not point back at its parent", c));
        }
    }
    if tree.kind(node).node_type() == ast::NodeType::Block {
        for segment in tree.lines(node).iter() {
            if segment.start > segment.stop || segment.stop > source_len {
                return Err(format!(
                    "segment {}..{} out of bounds for source length {}",
                    segment.start, segment.stop, source_len
                ));
            }
        }
    }
    for c in forward {
        check_node(tree, c, source_len)?;
    }
    Ok(())
}
