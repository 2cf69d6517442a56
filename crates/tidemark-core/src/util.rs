//! Byte classification and escaping utilities shared by the parser and the
//! HTML renderer.

use std::collections::HashSet;

use crate::entities;

const SPACES: &[u8] = b" \t\n\x0b\x0c\r";

/// Characters preserved verbatim by `url_escape`:
/// `A-Za-z0-9` and `;/?:@&=+$,-_.!~*'()#`.
static URL_SAFE: [bool; 256] = build_url_safe();

const fn build_url_safe() -> [bool; 256] {
    let mut t = [false; 256];
    let mut c = 0usize;
    while c < 256 {
        let b = c as u8;
        t[c] = b.is_ascii_alphanumeric()
            || matches!(
                b,
                b';' | b'/'
                    | b'?'
                    | b':'
                    | b'@'
                    | b'&'
                    | b'='
                    | b'+'
                    | b'$'
                    | b','
                    | b'-'
                    | b'_'
                    | b'.'
                    | b'!'
                    | b'~'
                    | b'*'
                    | b'\''
                    | b'('
                    | b')'
                    | b'#'
            );
        c += 1;
    }
    t
}

pub fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r')
}

pub fn is_punct(b: u8) -> bool {
    b.is_ascii_punctuation()
}

pub fn is_numeric(b: u8) -> bool {
    b.is_ascii_digit()
}

pub fn is_hex_decimal(b: u8) -> bool {
    b.is_ascii_hexdigit()
}

pub fn is_alpha_numeric(b: u8) -> bool {
    b.is_ascii_alphanumeric()
}

/// True if the line consists of space characters only.
pub fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|&b| is_space(b))
}

/// Width of a tab that starts at the given column.
pub fn tab_width(column: usize) -> usize {
    4 - column % 4
}

/// Indent width and byte length of the leading whitespace of `line`, with the
/// line starting at `current_pos` columns.
pub fn indent_width(line: &[u8], current_pos: usize) -> (usize, usize) {
    let mut width = 0;
    let mut pos = 0;
    for &b in line {
        match b {
            b' ' => width += 1,
            b'\t' => width += tab_width(current_pos + width),
            _ => break,
        }
        pos += 1;
    }
    (width, pos)
}

/// Searches the byte position where `width` columns of indentation have been
/// consumed. If the cut lands inside a tab, the remaining columns are
/// returned as padding. Returns `None` when the line holds fewer columns.
pub fn indent_position(line: &[u8], current_pos: usize, width: usize) -> Option<(usize, usize)> {
    let mut w = 0;
    for (i, &b) in line.iter().enumerate() {
        match b {
            b' ' => w += 1,
            b'\t' => w += tab_width(current_pos + w),
            _ => break,
        }
        if w >= width {
            return Some((i + 1, w - width));
        }
    }
    None
}

/// Like `indent_position` with the line starting at column 0, but stops at
/// `width` even when more whitespace follows and never fails: dedenting a
/// line that is not indented that far simply consumes what is there.
pub fn dedent_position(line: &[u8], width: usize) -> (usize, usize) {
    let mut i = 0;
    let mut w = 0;
    while i < line.len() && w < width {
        match line[i] {
            b' ' => w += 1,
            b'\t' => w += 4,
            _ => break,
        }
        i += 1;
    }
    (i, w.saturating_sub(width))
}

pub fn first_non_space_position(line: &[u8]) -> Option<usize> {
    for (i, &b) in line.iter().enumerate() {
        match b {
            b' ' | b'\t' => continue,
            b'\n' => return None,
            _ => return Some(i),
        }
    }
    None
}

pub fn trim_left_space(source: &[u8]) -> &[u8] {
    &source[trim_left_space_length(source)..]
}

pub fn trim_right_space(source: &[u8]) -> &[u8] {
    &source[..source.len() - trim_right_space_length(source)]
}

pub fn trim_left_space_length(source: &[u8]) -> usize {
    source.iter().take_while(|&&b| SPACES.contains(&b)).count()
}

pub fn trim_right_space_length(source: &[u8]) -> usize {
    source
        .iter()
        .rev()
        .take_while(|&&b| SPACES.contains(&b))
        .count()
}

/// Finds the position closing the given opener, honoring backslash escapes.
/// With `code_span` set, closers inside backtick code spans are ignored.
/// With `allow_nesting`, balanced inner opener/closer pairs are skipped;
/// otherwise an inner opener aborts the search.
pub fn find_closure(
    bs: &[u8],
    opener: u8,
    closer: u8,
    code_span: bool,
    allow_nesting: bool,
) -> Option<usize> {
    let mut i = 0;
    let mut opened = 1;
    let mut code_span_opener = 0usize;
    while i < bs.len() {
        let c = bs[i];
        if code_span && code_span_opener != 0 && c == b'`' {
            let mut run = 0;
            while i < bs.len() && bs[i] == b'`' {
                run += 1;
                i += 1;
            }
            if run == code_span_opener {
                code_span_opener = 0;
            }
            continue;
        } else if c == b'\\' && i + 1 < bs.len() && is_punct(bs[i + 1]) {
            i += 2;
            continue;
        } else if code_span && code_span_opener == 0 && c == b'`' {
            while i < bs.len() && bs[i] == b'`' {
                code_span_opener += 1;
                i += 1;
            }
            continue;
        } else if code_span_opener == 0 || !code_span {
            if c == closer {
                opened -= 1;
                if opened == 0 {
                    return Some(i);
                }
            } else if c == opener {
                if !allow_nesting {
                    return None;
                }
                opened += 1;
            }
        }
        i += 1;
    }
    None
}

/// The entity replacement for a byte that must be escaped in HTML output,
/// or `None` when the byte passes through.
pub fn escape_html_byte(b: u8) -> Option<&'static [u8]> {
    match b {
        b'<' => Some(b"&lt;"),
        b'>' => Some(b"&gt;"),
        b'&' => Some(b"&amp;"),
        b'"' => Some(b"&quot;"),
        _ => None,
    }
}

/// Escapes `< > & "` in the given bytes.
pub fn escape_html(v: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() + 10);
    for &b in v {
        match escape_html_byte(b) {
            Some(e) => out.extend_from_slice(e),
            None => out.push(b),
        }
    }
    out
}

/// Replaces invalid or zero code points with U+FFFD.
pub fn to_valid_char(v: u32) -> char {
    if v == 0 {
        return '\u{FFFD}';
    }
    char::from_u32(v).unwrap_or('\u{FFFD}')
}

/// The character whose final byte sits at position `pos`, decoding backwards
/// across UTF-8 continuation bytes.
pub fn char_ending_at(source: &[u8], pos: usize) -> char {
    let mut i = pos;
    loop {
        if source[i] & 0b1100_0000 != 0b1000_0000 {
            break;
        }
        if i == 0 {
            break;
        }
        i -= 1;
    }
    char_at(source, i)
}

/// The character starting at byte position `pos`; invalid UTF-8 decodes as
/// U+FFFD.
pub fn char_at(source: &[u8], pos: usize) -> char {
    let tail = &source[pos..];
    match std::str::from_utf8(&tail[..tail.len().min(4)]) {
        Ok(s) => s.chars().next().unwrap_or('\u{FFFD}'),
        Err(e) if e.valid_up_to() > 0 => std::str::from_utf8(&tail[..e.valid_up_to()])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or('\u{FFFD}'),
        Err(_) => '\u{FFFD}',
    }
}

/// Unicode whitespace as the emphasis scanner sees it.
pub fn is_unicode_space(c: char) -> bool {
    c.is_whitespace()
}

/// Unicode punctuation (and symbols) as the emphasis scanner sees it.
pub fn is_unicode_punct(c: char) -> bool {
    c.is_ascii_punctuation() || (!c.is_ascii() && !c.is_alphanumeric() && !c.is_whitespace())
}

/// East Asian Wide and Fullwidth ranges of the Unicode EastAsianWidth data,
/// collapsed to the blocks that matter for line-break filtering.
const EAST_ASIAN_WIDE: &[(u32, u32)] = &[
    (0x1100, 0x115F),
    (0x2E80, 0x303E),
    (0x3041, 0x33FF),
    (0x3400, 0x4DBF),
    (0x4E00, 0x9FFF),
    (0xA000, 0xA4CF),
    (0xA960, 0xA97F),
    (0xAC00, 0xD7A3),
    (0xF900, 0xFAFF),
    (0xFE30, 0xFE4F),
    (0xFF00, 0xFF60),
    (0xFFE0, 0xFFE6),
    (0x1B000, 0x1B16F),
    (0x20000, 0x2FFFD),
    (0x30000, 0x3FFFD),
];

/// True when the character renders double width in East Asian typography.
pub fn is_east_asian_wide(c: char) -> bool {
    let v = c as u32;
    EAST_ASIAN_WIDE
        .iter()
        .any(|&(start, stop)| v >= start && v <= stop)
}

/// Unescapes backslash-escaped ASCII punctuation.
pub fn unescape_punctuations(v: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len());
    let mut i = 0;
    while i < v.len() {
        if v[i] == b'\\' && i + 1 < v.len() && is_punct(v[i + 1]) {
            out.push(v[i + 1]);
            i += 2;
            continue;
        }
        out.push(v[i]);
        i += 1;
    }
    out
}

/// Resolves numeric character references (`&#N;`, `&#xN;`) to UTF-8.
pub fn resolve_numeric_references(v: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len());
    let mut i = 0;
    while i < v.len() {
        if v[i] == b'&' && i + 2 < v.len() && v[i + 1] == b'#' {
            let (digits_start, radix) = if matches!(v[i + 2], b'x' | b'X') {
                (i + 3, 16)
            } else {
                (i + 2, 10)
            };
            let mut j = digits_start;
            while j < v.len()
                && j - digits_start < 7
                && (if radix == 16 {
                    is_hex_decimal(v[j])
                } else {
                    is_numeric(v[j])
                })
            {
                j += 1;
            }
            if j > digits_start && j < v.len() && v[j] == b';' {
                let text = std::str::from_utf8(&v[digits_start..j]).unwrap_or("0");
                let value = u32::from_str_radix(text, radix).unwrap_or(0);
                let mut buf = [0u8; 4];
                out.extend_from_slice(to_valid_char(value).encode_utf8(&mut buf).as_bytes());
                i = j + 1;
                continue;
            }
        }
        out.push(v[i]);
        i += 1;
    }
    out
}

/// Resolves named entity references (`&name;`) via the built-in table.
pub fn resolve_entity_names(v: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len());
    let mut i = 0;
    while i < v.len() {
        if v[i] == b'&' {
            let mut j = i + 1;
            while j < v.len() && is_alpha_numeric(v[j]) {
                j += 1;
            }
            if j > i + 1
                && j < v.len()
                && v[j] == b';'
                && let Ok(name) = std::str::from_utf8(&v[i + 1..j])
                && let Some(expansion) = entities::lookup_named_entity(name)
            {
                out.extend_from_slice(expansion.as_bytes());
                i = j + 1;
                continue;
            }
        }
        out.push(v[i]);
        i += 1;
    }
    out
}

/// Escapes a URL for an href/src attribute. Bytes in the safe set and
/// existing `%xx` sequences pass through; everything else is UTF-8
/// percent-encoded; space becomes `%20`. With `resolve_reference`,
/// backslash escapes and entity/numeric references are resolved first.
pub fn url_escape(v: &[u8], resolve_reference: bool) -> Vec<u8> {
    let resolved;
    let v = if resolve_reference {
        resolved = resolve_entity_names(&resolve_numeric_references(&unescape_punctuations(v)));
        &resolved[..]
    } else {
        v
    };
    let mut out = Vec::with_capacity(v.len() + 10);
    let mut i = 0;
    while i < v.len() {
        let c = v[i];
        if URL_SAFE[c as usize] {
            out.push(c);
            i += 1;
            continue;
        }
        if c == b'%' && i + 2 < v.len() && is_hex_decimal(v[i + 1]) && is_hex_decimal(v[i + 2]) {
            out.extend_from_slice(&v[i..i + 3]);
            i += 3;
            continue;
        }
        out.extend_from_slice(format!("%{:02X}", c).as_bytes());
        i += 1;
    }
    out
}

/// Generates a unique slug for a heading or link anchor. Alphanumeric bytes
/// are kept (lowercased), spaces become `-`, everything else is dropped;
/// an empty result falls back to `fallback` and collisions get a numeric
/// suffix.
pub fn generate_link_id(value: &[u8], fallback: &[u8], used: &mut HashSet<String>) -> Vec<u8> {
    let value = trim_right_space(trim_left_space(value));
    let mut result = String::new();
    for &b in value {
        if is_alpha_numeric(b) {
            result.push(b.to_ascii_lowercase() as char);
        } else if b == b' ' {
            result.push('-');
        }
    }
    if result.is_empty() {
        result.push_str(&String::from_utf8_lossy(fallback));
    }
    if used.insert(result.clone()) {
        return result.into_bytes();
    }
    let mut n = 1usize;
    loop {
        let candidate = format!("{}-{}", result, n);
        if used.insert(candidate.clone()) {
            return candidate.into_bytes();
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indent_width_expands_tabs() {
        assert_eq!(indent_width(b"\tfoo", 0), (4, 1));
        assert_eq!(indent_width(b" \tfoo", 0), (4, 2));
        assert_eq!(indent_width(b"  foo", 2), (2, 2));
    }

    #[test]
    fn indent_position_reports_tab_padding() {
        // Two columns into a tab leaves two columns of padding.
        assert_eq!(indent_position(b"\taaaa", 0, 2), Some((1, 2)));
        assert_eq!(indent_position(b"  aaaa", 0, 2), Some((2, 0)));
        assert_eq!(indent_position(b" aaaa", 0, 2), None);
    }

    #[test]
    fn url_escape_preserves_safe_set() {
        assert_eq!(
            url_escape(b"http://a.b/c?d=e&f=g#h", false),
            b"http://a.b/c?d=e&f=g#h".to_vec()
        );
        assert_eq!(url_escape(b"a b", false), b"a%20b".to_vec());
        assert_eq!(url_escape(b"%3F%zz", false), b"%3F%25zz".to_vec());
    }

    #[test]
    fn numeric_references_fold_invalid_to_replacement() {
        assert_eq!(resolve_numeric_references(b"&#35;"), b"#".to_vec());
        assert_eq!(
            resolve_numeric_references(b"&#0;"),
            "\u{FFFD}".as_bytes().to_vec()
        );
        assert_eq!(resolve_numeric_references(b"&#x22;"), b"\"".to_vec());
    }

    #[test]
    fn link_ids_are_unique() {
        let mut used = HashSet::new();
        assert_eq!(
            generate_link_id(b"Foo Bar", b"id", &mut used),
            b"foo-bar".to_vec()
        );
        assert_eq!(
            generate_link_id(b"Foo Bar", b"id", &mut used),
            b"foo-bar-1".to_vec()
        );
        assert_eq!(
            generate_link_id(b"!!!", b"heading", &mut used),
            b"heading".to_vec()
        );
    }
}
