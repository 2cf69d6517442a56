use std::borrow::Cow;

use crate::util;

/// A half-open byte range into the source buffer, plus a count of synthetic
/// leading spaces. Padding exists because a container block may consume only
/// part of a tab character; the leftover columns still belong to the inner
/// block and are materialized as spaces when the segment value is read.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Segment {
    pub start: usize,
    pub stop: usize,
    pub padding: usize,
    /// Original bytes the padding was carved out of (at most one tab plus
    /// spaces). Only consulted when `render_padding_tabs` is set.
    pub padding_bytes: Vec<u8>,
    /// Emit `padding_bytes` verbatim instead of expanded spaces, preserving
    /// tab round-trips for code block content. Off by default; everything
    /// renders with space expansion.
    pub render_padding_tabs: bool,
}

impl Segment {
    pub fn new(start: usize, stop: usize) -> Self {
        Self {
            start,
            stop,
            ..Self::default()
        }
    }

    pub fn with_padding(start: usize, stop: usize, padding: usize) -> Self {
        Self {
            start,
            stop,
            padding,
            ..Self::default()
        }
    }

    pub fn keep_padding_tabs(mut self, padding_bytes: Vec<u8>) -> Self {
        self.padding_bytes = padding_bytes;
        self.render_padding_tabs = true;
        self
    }

    /// Materializes the segment: `padding` spaces followed by
    /// `source[start..stop]`. Borrows when there is no padding.
    pub fn value<'a>(&self, source: &'a [u8]) -> Cow<'a, [u8]> {
        if self.padding == 0 {
            return Cow::Borrowed(&source[self.start..self.stop]);
        }
        let mut out = Vec::with_capacity(self.len());
        if self.render_padding_tabs && !self.padding_bytes.is_empty() {
            out.extend_from_slice(&self.padding_bytes);
        } else {
            out.resize(self.padding, b' ');
        }
        out.extend_from_slice(&source[self.start..self.stop]);
        Cow::Owned(out)
    }

    pub fn len(&self) -> usize {
        self.stop.saturating_sub(self.start) + self.padding
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.stop && self.padding == 0
    }

    /// The range consumed between this position and a later position on the
    /// same line. Both segments must share the same stop.
    pub fn between(&self, other: &Segment) -> Segment {
        debug_assert_eq!(self.stop, other.stop, "segments must share a stop");
        Segment::with_padding(
            self.start,
            other.start,
            self.padding.saturating_sub(other.padding),
        )
    }

    pub fn with_start(&self, start: usize) -> Segment {
        let mut s = self.clone();
        s.start = start;
        s
    }

    pub fn with_stop(&self, stop: usize) -> Segment {
        let mut s = self.clone();
        s.stop = stop;
        s
    }

    pub fn trim_right_space(&self, source: &[u8]) -> Segment {
        let v = &source[self.start..self.stop];
        let l = util::trim_right_space_length(v);
        if l == v.len() {
            return Segment::new(self.start, self.start);
        }
        let mut s = self.clone();
        s.stop -= l;
        s
    }

    /// Drops all leading spaces, padding included.
    pub fn trim_left_space(&self, source: &[u8]) -> Segment {
        let v = &source[self.start..self.stop];
        Segment::new(self.start + util::trim_left_space_length(v), self.stop)
    }

    /// Drops `width` columns of leading whitespace. A tab that straddles the
    /// cut is partially consumed and the remainder becomes padding.
    pub fn trim_left_space_width(&self, width: usize, source: &[u8]) -> Segment {
        let mut width = width;
        let mut padding = self.padding;
        while width > 0 && padding > 0 {
            padding -= 1;
            width -= 1;
        }
        if width == 0 {
            return Segment {
                start: self.start,
                stop: self.stop,
                padding,
                padding_bytes: Vec::new(),
                render_padding_tabs: false,
            };
        }
        let mut start = self.start;
        let mut over = 0isize;
        let mut padding_bytes = Vec::new();
        for &c in &source[self.start..self.stop] {
            if width == 0 {
                break;
            }
            match c {
                b' ' => {
                    width -= 1;
                    start += 1;
                }
                b'\t' => {
                    start += 1;
                    if 4 > width {
                        over = (4 - width) as isize;
                        padding_bytes.push(b'\t');
                        width = 0;
                    } else {
                        width -= 4;
                    }
                }
                _ => break,
            }
        }
        let mut s = Segment::with_padding(start, self.stop, padding + over as usize);
        if !padding_bytes.is_empty() {
            s.padding_bytes = padding_bytes;
        }
        s
    }

    /// Appends the padding of this segment as spaces to `buf`.
    pub fn concat_padding(&self, buf: &mut Vec<u8>) {
        for _ in 0..self.padding {
            buf.push(b' ');
        }
    }
}

/// An append-only ordered collection of segments, used to remember the source
/// lines contributed by a block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Segments {
    values: Vec<Segment>,
}

impl Segments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, segment: Segment) {
        self.values.push(segment);
    }

    pub fn append_all(&mut self, other: &Segments) {
        self.values.extend(other.values.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn at(&self, index: usize) -> Segment {
        self.values[index].clone()
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.values.get(index)
    }

    pub fn set(&mut self, index: usize, segment: Segment) {
        self.values[index] = segment;
    }

    pub fn first(&self) -> Option<&Segment> {
        self.values.first()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.values.last()
    }

    pub fn unshift(&mut self, segment: Segment) {
        self.values.insert(0, segment);
    }

    pub fn remove_first(&mut self) -> Option<Segment> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.remove(0))
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_materializes_padding() {
        let source = b"\tfoo\n";
        let seg = Segment::with_padding(1, 4, 2);
        assert_eq!(seg.value(source).as_ref(), b"  foo");
        assert_eq!(seg.len(), 5);
    }

    #[test]
    fn trim_left_space_width_splits_tabs() {
        // "\tbar": a tab at column 0 is 4 wide; trimming 2 columns leaves
        // 2 columns of padding in front of "bar".
        let source = b"\tbar\n";
        let seg = Segment::new(0, 4);
        let trimmed = seg.trim_left_space_width(2, source);
        assert_eq!(trimmed.start, 1);
        assert_eq!(trimmed.padding, 2);
        assert_eq!(trimmed.value(source).as_ref(), b"  bar");
    }

    #[test]
    fn between_subtracts_padding() {
        let a = Segment::with_padding(4, 10, 2);
        let b = Segment::new(6, 10);
        let between = a.between(&b);
        assert_eq!((between.start, between.stop, between.padding), (4, 6, 2));
    }
}
