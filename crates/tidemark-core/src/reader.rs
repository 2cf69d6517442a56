//! Cursors over the source buffer. [`LineReader`] drives the block phase
//! over the whole source; [`BlockReader`] drives the inline phase over the
//! segments a block collected. Both expose the same line-oriented operation
//! set; tab columns consumed by containers surface as segment padding.

use std::borrow::Cow;

use crate::segment::{Segment, Segments};
use crate::util;

fn line_stop(source: &[u8], from: usize) -> usize {
    match source[from..].iter().position(|&b| b == b'\n') {
        Some(i) => from + i + 1,
        None => source.len(),
    }
}

fn peeked<'a>(source: &'a [u8], pos: usize, stop: usize, padding: usize) -> Cow<'a, [u8]> {
    if padding == 0 {
        Cow::Borrowed(&source[pos..stop])
    } else {
        let mut line = vec![b' '; padding];
        line.extend_from_slice(&source[pos..stop]);
        Cow::Owned(line)
    }
}

fn preceding(source: &[u8], pos: usize, padding: usize) -> char {
    if padding != 0 {
        return ' ';
    }
    if pos == 0 {
        return '\n';
    }
    util::char_ending_at(source, pos - 1)
}

/// A cursor over the physical lines of the source.
pub struct LineReader<'a> {
    source: &'a [u8],
    line: usize,
    head: usize,
    pos: usize,
    stop: usize,
    padding: usize,
}

impl<'a> LineReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            line: 0,
            head: 0,
            pos: 0,
            stop: line_stop(source, 0),
            padding: 0,
        }
    }

    pub fn source(&self) -> &'a [u8] {
        self.source
    }

    /// The rest of the current line (newline included) and the segment that
    /// addresses it, or `None` at end of input. Pending padding materializes
    /// as leading spaces.
    pub fn peek_line(&self) -> Option<(Cow<'a, [u8]>, Segment)> {
        if self.pos >= self.source.len() {
            return None;
        }
        let segment = Segment::with_padding(self.pos, self.stop, self.padding);
        Some((
            peeked(self.source, self.pos, self.stop, self.padding),
            segment,
        ))
    }

    /// Consumes `n` units within the current line, padding first.
    pub fn advance(&mut self, mut n: usize) {
        while n > 0 {
            if self.padding > 0 {
                self.padding -= 1;
            } else {
                self.pos += 1;
            }
            n -= 1;
        }
    }

    /// Consumes a prefix whose tab-expanded width is already known and
    /// records the leftover columns of a partially consumed tab as padding.
    pub fn advance_and_set_padding(&mut self, n: usize, padding: usize) {
        self.advance(n);
        self.padding = padding;
    }

    pub fn advance_line(&mut self) {
        self.pos = self.stop;
        self.head = self.pos;
        self.padding = 0;
        self.line += 1;
        if self.pos < self.source.len() {
            self.stop = line_stop(self.source, self.pos);
        } else {
            self.stop = self.source.len();
        }
    }

    /// Current line number and the segment for the unconsumed remainder of
    /// the line.
    pub fn position(&self) -> (usize, Segment) {
        (
            self.line,
            Segment::with_padding(self.pos, self.stop, self.padding),
        )
    }

    pub fn set_position(&mut self, line: usize, segment: Segment) {
        self.line = line;
        self.pos = segment.start;
        self.stop = segment.stop;
        self.padding = segment.padding;
        self.head = match self.source[..self.pos.min(self.source.len())]
            .iter()
            .rposition(|&b| b == b'\n')
        {
            Some(i) => i + 1,
            None => 0,
        };
    }

    /// The character just before the cursor; a consumed-into tab reads as a
    /// space and the start of input as a newline.
    pub fn preceding_character(&self) -> char {
        preceding(self.source, self.pos, self.padding)
    }

    pub fn two_preceding_character(&self) -> char {
        two_preceding(self.source, self.pos, self.padding)
    }

    /// Columns between the physical line head and the cursor, counting the
    /// expanded width of tabs and excluding pending padding.
    pub fn line_offset(&self) -> usize {
        let mut v = 0;
        for &b in &self.source[self.head..self.pos] {
            if b == b'\t' {
                v += util::tab_width(v);
            } else {
                v += 1;
            }
        }
        v.saturating_sub(self.padding)
    }

    /// Skips blank lines, returning how many were skipped, or `None` once
    /// the input is exhausted.
    pub fn skip_blank_lines(&mut self) -> Option<usize> {
        let mut skipped = 0;
        loop {
            let (line, _) = self.peek_line()?;
            if util::is_blank(&line) {
                self.advance_line();
                skipped += 1;
                continue;
            }
            return Some(skipped);
        }
    }
}

fn two_preceding(source: &[u8], pos: usize, padding: usize) -> char {
    // Step back over the immediately preceding character first.
    if padding >= 2 {
        return ' ';
    }
    let mut pos = pos;
    if padding == 1 {
        // One pending padding column; the character before it is at pos-1.
        if pos == 0 {
            return '\n';
        }
        pos -= 1;
        return util::char_ending_at(source, pos);
    }
    if pos == 0 {
        return '\n';
    }
    let first = util::char_ending_at(source, pos - 1);
    let width = first.len_utf8();
    if pos < width + 1 {
        return '\n';
    }
    util::char_ending_at(source, pos - width - 1)
}

/// A reader restricted to the segments collected by one block, used during
/// inline parsing. Each segment reads as one line.
pub struct BlockReader<'a> {
    source: &'a [u8],
    segments: Segments,
    index: usize,
    pos: usize,
    stop: usize,
    padding: usize,
}

impl<'a> BlockReader<'a> {
    pub fn new(source: &'a [u8], segments: Segments) -> Self {
        let mut r = Self {
            source,
            segments,
            index: 0,
            pos: 0,
            stop: 0,
            padding: 0,
        };
        r.load(0);
        r
    }

    fn load(&mut self, index: usize) {
        self.index = index;
        match self.segments.get(index) {
            Some(seg) => {
                self.pos = seg.start;
                self.stop = seg.stop;
                self.padding = seg.padding;
            }
            None => {
                self.pos = self.source.len();
                self.stop = self.source.len();
                self.padding = 0;
            }
        }
    }

    pub fn source(&self) -> &'a [u8] {
        self.source
    }

    pub fn peek_line(&self) -> Option<(Cow<'a, [u8]>, Segment)> {
        if self.index >= self.segments.len() {
            return None;
        }
        let segment = Segment::with_padding(self.pos, self.stop, self.padding);
        Some((
            peeked(self.source, self.pos, self.stop, self.padding),
            segment,
        ))
    }

    pub fn advance(&mut self, mut n: usize) {
        while n > 0 {
            if self.padding > 0 {
                self.padding -= 1;
            } else if self.pos < self.stop {
                self.pos += 1;
            } else {
                // Crossed the segment boundary.
                self.load(self.index + 1);
                continue;
            }
            n -= 1;
        }
    }

    pub fn advance_line(&mut self) {
        self.load(self.index + 1);
    }

    pub fn position(&self) -> (usize, Segment) {
        (
            self.index,
            Segment::with_padding(self.pos, self.stop, self.padding),
        )
    }

    pub fn set_position(&mut self, index: usize, segment: Segment) {
        self.index = index;
        self.pos = segment.start;
        self.stop = segment.stop;
        self.padding = segment.padding;
    }

    pub fn preceding_character(&self) -> char {
        preceding(self.source, self.pos, self.padding)
    }

    pub fn two_preceding_character(&self) -> char {
        two_preceding(self.source, self.pos, self.padding)
    }

    pub fn line_offset(&self) -> usize {
        let head = match self.segments.get(self.index) {
            Some(seg) => seg.start,
            None => return 0,
        };
        let mut v = 0;
        for &b in &self.source[head..self.pos] {
            if b == b'\t' {
                v += util::tab_width(v);
            } else {
                v += 1;
            }
        }
        v.saturating_sub(self.padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_and_advance_lines() {
        let mut r = LineReader::new(b"one\ntwo\n");
        let (line, seg) = r.peek_line().unwrap();
        assert_eq!(line.as_ref(), b"one\n");
        assert_eq!((seg.start, seg.stop), (0, 4));
        r.advance_line();
        let (line, _) = r.peek_line().unwrap();
        assert_eq!(line.as_ref(), b"two\n");
        r.advance_line();
        assert!(r.peek_line().is_none());
    }

    #[test]
    fn padding_counts_as_line_prefix() {
        let mut r = LineReader::new(b"\tcode\n");
        // A list-like container consumed two of the tab's four columns.
        r.advance_and_set_padding(1, 2);
        let (line, seg) = r.peek_line().unwrap();
        assert_eq!(line.as_ref(), b"  code\n");
        assert_eq!(seg.padding, 2);
        assert_eq!(r.preceding_character(), ' ');
        r.advance(1);
        assert_eq!(r.position().1.padding, 1);
    }

    #[test]
    fn skip_blank_lines_counts() {
        let mut r = LineReader::new(b"\n  \n\nfoo\n");
        assert_eq!(r.skip_blank_lines(), Some(3));
        let (line, _) = r.peek_line().unwrap();
        assert_eq!(line.as_ref(), b"foo\n");
        r.advance_line();
        assert_eq!(r.skip_blank_lines(), None);
    }

    #[test]
    fn block_reader_walks_segments() {
        let source = b"> abc\n> def\n";
        let mut segments = Segments::new();
        segments.append(Segment::new(2, 6));
        segments.append(Segment::new(8, 12));
        let mut r = BlockReader::new(source, segments);
        let (line, _) = r.peek_line().unwrap();
        assert_eq!(line.as_ref(), b"abc\n");
        assert_eq!(r.preceding_character(), ' ');
        r.advance_line();
        let (line, _) = r.peek_line().unwrap();
        assert_eq!(line.as_ref(), b"def\n");
        r.advance_line();
        assert!(r.peek_line().is_none());
    }
}
