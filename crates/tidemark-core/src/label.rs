//! Link reference label normalization.

/// Normalizes a link label for reference table keys: trims the ends,
/// collapses internal whitespace runs to a single space, and casefolds to
/// lowercase. The same normalization is applied on registration and lookup,
/// and applying it twice yields the same string.
pub fn normalize_link_label(bytes: &[u8]) -> String {
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut last_space = false;
    for &b in bytes {
        if b.is_ascii_whitespace() {
            if !out.is_empty() && !last_space {
                out.push(b' ');
                last_space = true;
            }
            continue;
        }
        last_space = false;
        out.push(b);
    }
    if out.last() == Some(&b' ') {
        out.pop();
    }
    let collapsed = match String::from_utf8(out) {
        Ok(value) => value,
        Err(err) => String::from_utf8_lossy(&err.into_bytes()).to_string(),
    };
    let lowered = collapsed.to_lowercase();
    // Unicode case folding maps the sharp s to "ss"; to_lowercase does not.
    lowered.replace('ß', "ss").replace('ẞ', "ss")
}

#[cfg(test)]
mod tests {
    use super::normalize_link_label;

    #[test]
    fn collapses_and_folds() {
        assert_eq!(normalize_link_label(b"  Foo\n  Bar  "), "foo bar");
        assert_eq!(normalize_link_label("Stra\u{df}e".as_bytes()), "strasse");
    }

    #[test]
    fn idempotent() {
        let once = normalize_link_label("  A \t B\u{df} ".as_bytes());
        assert_eq!(normalize_link_label(once.as_bytes()), once);
    }
}
