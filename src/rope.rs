// Copyright 2018 The Cord Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A rope data structure with newline, UTF-16, Unicode scalar, and
//! extended grapheme cluster metrics.

use std::borrow::Cow;
use std::cmp::{max, min};
use std::fmt;
use std::iter::once;
use std::ops::Add;
use std::str::{self, FromStr};
use std::string::ParseError;

use memchr::{memchr, memrchr};
use unicode_segmentation::UnicodeSegmentation;

use crate::graphemes;
use crate::interval::{Interval, IntervalBounds};
use crate::tree::{
    Cursor, DefaultMetric, Leaf, Metric, MetricKind, Node, NodeInfo, TreeBuilder,
};

pub(crate) const MIN_LEAF: usize = 511;
pub(crate) const MAX_LEAF: usize = 1023;

/// The main rope data structure. It is implemented as a b-tree with
/// [`Chunk`] as the leaf type. The base metric counts UTF-8 code units
/// (bytes) and has boundaries at code points.
///
/// A rope is a value: editing methods replace the root, and clones made
/// before an edit keep seeing the old text through shared subtrees.
pub type Rope = Node<RopeInfo>;

/// A contiguous chunk of UTF-8 text, together with enough bookkeeping to
/// place extended grapheme cluster boundaries without looking at the
/// neighboring chunks.
///
/// `prefix_len` bytes at the front continue a cluster that started in an
/// earlier chunk, and `suffix_len` bytes at the back start a cluster that
/// finishes in a later chunk. Both always sit on scalar boundaries, and
/// `prefix_len + suffix_len <= text.len()`. A chunk that is entirely the
/// interior of one cluster has `prefix_len == text.len()` and
/// `suffix_len == 0`.
#[derive(Clone, Debug, Default)]
pub struct Chunk {
    text: String,
    prefix_len: usize,
    suffix_len: usize,
}

impl Chunk {
    pub(crate) fn new(text: String) -> Chunk {
        debug_assert!(text.len() <= MAX_LEAF);
        Chunk { text, prefix_len: 0, suffix_len: 0 }
    }

    /// The chunk's text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    pub(crate) fn suffix_len(&self) -> usize {
        self.suffix_len
    }

    /// Byte offset of the first cluster boundary in this chunk, when it
    /// has one; `text.len()` otherwise.
    fn first_break(&self) -> usize {
        self.prefix_len
    }

    /// Byte offset of the last cluster boundary in this chunk.
    fn last_break(&self) -> usize {
        self.text.len() - self.suffix_len
    }

    /// The slice between the first and last cluster boundaries. Clusters
    /// in here are complete, so they can be measured without consulting
    /// the neighboring chunks.
    fn complete_region(&self) -> &str {
        &self.text[self.prefix_len..self.text.len() - self.suffix_len]
    }

    /// True when the chunk is the interior of a single cluster and
    /// carries no boundary at all.
    fn is_cluster_interior(&self) -> bool {
        self.prefix_len == self.text.len() && !self.text.is_empty()
    }

    pub(crate) fn set_boundaries(&mut self, prefix_len: usize, suffix_len: usize) {
        debug_assert!(prefix_len + suffix_len <= self.text.len());
        debug_assert!(self.text.is_char_boundary(prefix_len));
        debug_assert!(self.text.is_char_boundary(self.text.len() - suffix_len));
        self.prefix_len = prefix_len;
        self.suffix_len = suffix_len;
    }

    /// The number of clusters that start in this chunk: the complete
    /// clusters of the region, plus the straddling cluster that begins at
    /// the last break and finishes in a later chunk, if there is one.
    fn grapheme_count(&self) -> usize {
        let mut count = self.complete_region().graphemes(true).count();
        if self.suffix_len > 0 {
            count += 1;
        }
        count
    }
}

impl Leaf for Chunk {
    fn len(&self) -> usize {
        self.text.len()
    }

    fn is_ok_child(&self) -> bool {
        self.text.len() >= MIN_LEAF
    }

    fn push_maybe_split(&mut self, other: &Chunk, iv: Interval) -> Option<Chunk> {
        let (start, end) = iv.start_end();
        if start == end {
            return None;
        }
        self.text.push_str(&other.text[start..end]);
        // Everything after the old last break is suspect now. The
        // metadata is restored by the resync pass of the enclosing edit.
        self.suffix_len = 0;
        if self.text.len() <= MAX_LEAF {
            None
        } else {
            let splitpoint = find_leaf_split_for_merge(&self.text);
            let right_str = self.text[splitpoint..].to_owned();
            self.text.truncate(splitpoint);
            self.text.shrink_to_fit();
            self.prefix_len = min(self.prefix_len, self.text.len());
            Some(Chunk::new(right_str))
        }
    }
}

/// The summary of a subtree: every per-chunk statistic the metrics need,
/// accumulated additively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RopeInfo {
    lines: usize,
    utf16_size: usize,
    scalars: usize,
    graphemes: usize,
}

impl NodeInfo for RopeInfo {
    type L = Chunk;

    fn accumulate(&mut self, other: &Self) {
        self.lines += other.lines;
        self.utf16_size += other.utf16_size;
        self.scalars += other.scalars;
        self.graphemes += other.graphemes;
    }

    fn compute_info(l: &Chunk) -> Self {
        RopeInfo {
            lines: count_newlines(&l.text),
            utf16_size: str_indices::utf16::count(&l.text),
            scalars: str_indices::chars::count(&l.text),
            graphemes: l.grapheme_count(),
        }
    }

    fn identity() -> Self {
        RopeInfo { lines: 0, utf16_size: 0, scalars: 0, graphemes: 0 }
    }
}

impl DefaultMetric for RopeInfo {
    type DefaultMetric = BaseMetric;
}

pub(crate) fn count_newlines(s: &str) -> usize {
    bytecount::count(s.as_bytes(), b'\n')
}

fn find_leaf_split_for_bulk(s: &str) -> usize {
    find_leaf_split(s, MIN_LEAF)
}

fn find_leaf_split_for_merge(s: &str) -> usize {
    find_leaf_split(s, max(MIN_LEAF, s.len() - MAX_LEAF))
}

// Try to split at newline boundary (leaning left), if not, then split at codepoint
fn find_leaf_split(s: &str, minsplit: usize) -> usize {
    let mut splitpoint = min(MAX_LEAF, s.len() - MIN_LEAF);
    match memrchr(b'\n', &s.as_bytes()[minsplit - 1..splitpoint]) {
        Some(pos) => minsplit + pos,
        None => {
            while !s.is_char_boundary(splitpoint) {
                splitpoint -= 1;
            }
            splitpoint
        }
    }
}

pub fn len_utf8_from_first_byte(b: u8) -> usize {
    match b {
        b if b < 0x80 => 1,
        b if b < 0xe0 => 2,
        b if b < 0xf0 => 3,
        _ => 4,
    }
}

fn next_codepoint(l: &Chunk, offset: usize) -> Option<usize> {
    if offset == l.text.len() {
        // I think it's a precondition that this will never be called
        // with offset == len, but be defensive.
        None
    } else {
        let b = l.text.as_bytes()[offset];
        Some(offset + len_utf8_from_first_byte(b))
    }
}

fn prev_codepoint(l: &Chunk, offset: usize) -> Option<usize> {
    if offset == 0 {
        // I think it's a precondition that this will never be called
        // with offset == 0, but be defensive.
        None
    } else {
        let mut len = 1;
        while !l.text.is_char_boundary(offset - len) {
            len += 1;
        }
        Some(offset - len)
    }
}

/// This metric lets us walk utf8 text by code point.
///
/// Both its measured unit and its base unit are the utf8 code unit.
/// Offsets that do not correspond to codepoint boundaries are invalid;
/// navigation steps over whole code points.
pub struct BaseMetric(());

impl Metric<RopeInfo> for BaseMetric {
    fn measure(_: &RopeInfo, len: usize) -> usize {
        len
    }

    fn to_base_units(_: &Chunk, in_measured_units: usize) -> usize {
        in_measured_units
    }

    fn from_base_units(_: &Chunk, in_base_units: usize) -> usize {
        in_base_units
    }

    fn is_boundary(l: &Chunk, offset: usize) -> bool {
        l.text.is_char_boundary(offset)
    }

    fn prev(l: &Chunk, offset: usize) -> Option<usize> {
        prev_codepoint(l, offset)
    }

    fn next(l: &Chunk, offset: usize) -> Option<usize> {
        next_codepoint(l, offset)
    }

    fn can_fragment() -> bool {
        false
    }

    fn kind() -> MetricKind {
        MetricKind::Atomic
    }
}

/// Measured unit is the UTF-16 code unit.
///
/// Boundaries are codepoint boundaries: a surrogate pair is never split,
/// so an offset in the middle of one converts to the offset of the
/// codepoint it belongs to.
pub struct Utf16Metric(());

impl Metric<RopeInfo> for Utf16Metric {
    fn measure(info: &RopeInfo, _: usize) -> usize {
        info.utf16_size
    }

    fn to_base_units(l: &Chunk, in_measured_units: usize) -> usize {
        str_indices::utf16::to_byte_idx(&l.text, in_measured_units)
    }

    fn from_base_units(l: &Chunk, in_base_units: usize) -> usize {
        str_indices::utf16::from_byte_idx(&l.text, in_base_units)
    }

    fn is_boundary(l: &Chunk, offset: usize) -> bool {
        l.text.is_char_boundary(offset)
    }

    fn prev(l: &Chunk, offset: usize) -> Option<usize> {
        prev_codepoint(l, offset)
    }

    fn next(l: &Chunk, offset: usize) -> Option<usize> {
        next_codepoint(l, offset)
    }

    fn can_fragment() -> bool {
        false
    }

    fn kind() -> MetricKind {
        MetricKind::Atomic
    }
}

/// Measured unit is the Unicode scalar value (a Rust `char`).
pub struct ScalarMetric(());

impl Metric<RopeInfo> for ScalarMetric {
    fn measure(info: &RopeInfo, _: usize) -> usize {
        info.scalars
    }

    fn to_base_units(l: &Chunk, in_measured_units: usize) -> usize {
        str_indices::chars::to_byte_idx(&l.text, in_measured_units)
    }

    fn from_base_units(l: &Chunk, in_base_units: usize) -> usize {
        str_indices::chars::from_byte_idx(&l.text, in_base_units)
    }

    fn is_boundary(l: &Chunk, offset: usize) -> bool {
        l.text.is_char_boundary(offset)
    }

    fn prev(l: &Chunk, offset: usize) -> Option<usize> {
        prev_codepoint(l, offset)
    }

    fn next(l: &Chunk, offset: usize) -> Option<usize> {
        next_codepoint(l, offset)
    }

    fn can_fragment() -> bool {
        false
    }

    fn kind() -> MetricKind {
        MetricKind::Atomic
    }
}

/// Measured unit is the extended grapheme cluster.
///
/// A cluster is counted at the chunk containing its first scalar, and a
/// cluster can straddle chunks, so this metric fragments. The boundaries
/// within a chunk are exactly the breaks recorded by the chunk's
/// `prefix_len`/`suffix_len` bookkeeping, which edits keep up to date.
pub struct GraphemeMetric(());

impl Metric<RopeInfo> for GraphemeMetric {
    fn measure(info: &RopeInfo, _: usize) -> usize {
        info.graphemes
    }

    fn to_base_units(l: &Chunk, in_measured_units: usize) -> usize {
        // the position where the n-th cluster of this chunk starts: the
        // first break, then one complete cluster at a time. When the
        // chunk ends with a straddling cluster, its start at the last
        // break is the final addressable unit.
        let mut pos = l.first_break();
        let mut remaining = in_measured_units;
        for g in l.complete_region().graphemes(true) {
            if remaining == 0 {
                break;
            }
            pos += g.len();
            remaining -= 1;
        }
        debug_assert_eq!(remaining, 0, "measured offset beyond the chunk's clusters");
        pos
    }

    fn from_base_units(l: &Chunk, in_base_units: usize) -> usize {
        if in_base_units <= l.first_break() || l.is_cluster_interior() {
            return 0;
        }
        let rel = in_base_units - l.first_break();
        let mut count = 0;
        let mut pos = 0;
        for g in l.complete_region().graphemes(true) {
            pos += g.len();
            if pos <= rel {
                count += 1;
            } else {
                break;
            }
        }
        count
    }

    fn is_boundary(l: &Chunk, offset: usize) -> bool {
        if l.is_cluster_interior() || offset < l.first_break() || offset > l.last_break() {
            false
        } else {
            graphemes::is_grapheme_boundary(l.complete_region(), offset - l.first_break())
        }
    }

    fn prev(l: &Chunk, offset: usize) -> Option<usize> {
        if l.is_cluster_interior() || offset <= l.first_break() {
            return None;
        }
        let last = l.last_break();
        if offset > last {
            return Some(last);
        }
        let rel = offset - l.first_break();
        Some(l.first_break() + graphemes::prev_grapheme_boundary(l.complete_region(), rel))
    }

    fn next(l: &Chunk, offset: usize) -> Option<usize> {
        if l.is_cluster_interior() || offset >= l.last_break() {
            return None;
        }
        if offset < l.first_break() {
            return Some(l.first_break());
        }
        let rel = offset - l.first_break();
        Some(l.first_break() + graphemes::next_grapheme_boundary(l.complete_region(), rel))
    }

    fn can_fragment() -> bool {
        true
    }

    fn kind() -> MetricKind {
        MetricKind::Atomic
    }
}

/// Measured unit is the newline.
///
/// The boundary is trailing: it sits just past each `\n` byte, so offset
/// 0 is never a boundary and the end of the text is a boundary only when
/// the text ends in a newline.
pub struct LinesMetric(usize); // number of lines

impl Metric<RopeInfo> for LinesMetric {
    fn measure(info: &RopeInfo, _: usize) -> usize {
        info.lines
    }

    fn to_base_units(l: &Chunk, in_measured_units: usize) -> usize {
        let mut offset = 0;
        for _ in 0..in_measured_units {
            match memchr(b'\n', &l.text.as_bytes()[offset..]) {
                Some(pos) => offset += pos + 1,
                _ => panic!("to_base_units called with arg too large"),
            }
        }
        offset
    }

    fn from_base_units(l: &Chunk, in_base_units: usize) -> usize {
        bytecount::count(&l.text.as_bytes()[..in_base_units], b'\n')
    }

    fn is_boundary(l: &Chunk, offset: usize) -> bool {
        if offset == 0 {
            // shouldn't be called with this, but be defensive
            false
        } else {
            l.text.as_bytes()[offset - 1] == b'\n'
        }
    }

    fn prev(l: &Chunk, offset: usize) -> Option<usize> {
        debug_assert!(offset > 0, "caller is responsible for validating input");
        memrchr(b'\n', &l.text.as_bytes()[..offset - 1]).map(|pos| pos + 1)
    }

    fn next(l: &Chunk, offset: usize) -> Option<usize> {
        memchr(b'\n', &l.text.as_bytes()[offset..]).map(|pos| offset + pos + 1)
    }

    fn can_fragment() -> bool {
        true
    }

    fn kind() -> MetricKind {
        MetricKind::Trailing
    }
}

impl TreeBuilder<RopeInfo> {
    /// Push a string on the accumulating tree.
    ///
    /// Splits the provided string into chunks that fit in a leaf and
    /// pushes the leaves one by one onto the tree.
    pub fn push_str(&mut self, mut s: &str) {
        if s.len() <= MAX_LEAF {
            if !s.is_empty() {
                self.push_leaf(Chunk::new(s.to_owned()));
            }
            return;
        }
        while !s.is_empty() {
            let splitpoint =
                if s.len() > MAX_LEAF { find_leaf_split_for_bulk(s) } else { s.len() };
            self.push_leaf(Chunk::new(s[..splitpoint].to_owned()));
            s = &s[splitpoint..];
        }
    }
}

impl Rope {
    /// Edit the rope, replacing the byte range given by `iv` with `new`.
    ///
    /// Both ends of the range must be on codepoint boundaries; cluster
    /// bookkeeping around the edit is reconciled before returning.
    ///
    /// Time complexity: O(log n), plus the resync walk, which is
    /// proportional to the size of the edit in practice.
    pub fn edit_str<T: IntervalBounds>(&mut self, iv: T, new: &str) {
        let iv = iv.into_interval(self.len());
        self.validate_interval(iv);
        let mut b = TreeBuilder::new();
        b.push_str(new);
        self.edit(iv, b.build());
        graphemes::resync(self, iv.start, iv.start + new.len());
    }

    /// Insert `new` at the given byte offset.
    pub fn insert(&mut self, offset: usize, new: &str) {
        self.edit_str(offset..offset, new);
    }

    /// Remove the given byte range.
    pub fn remove<T: IntervalBounds>(&mut self, iv: T) {
        self.edit_str(iv, "");
    }

    /// Append `new` to the rope.
    pub fn push_str(&mut self, new: &str) {
        let len = self.len();
        self.edit_str(len..len, new);
    }

    /// Returns a new rope with the contents of the provided byte range.
    ///
    /// Both ends of the range must be on codepoint boundaries. When the
    /// range covers the whole rope, the result shares the root.
    pub fn slice<T: IntervalBounds>(&self, iv: T) -> Rope {
        let iv = iv.into_interval(self.len());
        self.validate_interval(iv);
        let mut rope = self.subseq(iv);
        graphemes::resync(&mut rope, 0, 0);
        let len = rope.len();
        graphemes::resync(&mut rope, len, len);
        rope
    }

    fn validate_interval(&self, iv: Interval) {
        assert!(iv.end <= self.len(), "interval {} out of range for length {}", iv, self.len());
        assert!(
            self.is_codepoint_boundary(iv.start),
            "interval start not on a codepoint boundary"
        );
        assert!(self.is_codepoint_boundary(iv.end), "interval end not on a codepoint boundary");
    }

    /// Whether the offset is on a codepoint boundary. The total length of
    /// the rope is a boundary.
    pub fn is_codepoint_boundary(&self, offset: usize) -> bool {
        offset <= self.len() && {
            let cursor = Cursor::new(self, offset);
            let (leaf, offset_in_leaf) = cursor.get_leaf().unwrap();
            leaf.text.is_char_boundary(offset_in_leaf)
        }
    }

    /// The number of UTF-16 code units the text would occupy.
    pub fn utf16_count(&self) -> usize {
        self.measure::<Utf16Metric>()
    }

    /// The number of Unicode scalar values in the text.
    pub fn scalar_count(&self) -> usize {
        self.measure::<ScalarMetric>()
    }

    /// The number of extended grapheme clusters in the text.
    pub fn grapheme_count(&self) -> usize {
        self.measure::<GraphemeMetric>()
    }

    /// The number of newline bytes in the text.
    pub fn newline_count(&self) -> usize {
        self.measure::<LinesMetric>()
    }

    /// Return the line number corresponding to the byte index `offset`.
    ///
    /// The line number is 0-based, thus this is equivalent to the count of
    /// newlines in the slice up to `offset`.
    ///
    /// Time complexity: O(log n)
    pub fn line_of_offset(&self, offset: usize) -> usize {
        self.count::<LinesMetric>(offset)
    }

    /// Return the byte offset corresponding to the line number `line`.
    /// If `line` is equal to one plus the current number of lines,
    /// this returns the offset of the end of the rope. Arguments higher
    /// than this will panic.
    ///
    /// The line number is 0-based.
    ///
    /// Time complexity: O(log n)
    pub fn offset_of_line(&self, line: usize) -> usize {
        let max_line = self.measure::<LinesMetric>() + 1;
        match line.cmp(&max_line) {
            std::cmp::Ordering::Greater => {
                panic!("line number {} beyond last line {}", line, max_line)
            }
            std::cmp::Ordering::Equal => self.len(),
            std::cmp::Ordering::Less => self.count_base_units::<LinesMetric>(line),
        }
    }

    /// Return the offset of the codepoint before `offset`.
    pub fn prev_codepoint_offset(&self, offset: usize) -> Option<usize> {
        let mut cursor = Cursor::new(self, offset);
        cursor.prev::<BaseMetric>()
    }

    /// Return the offset of the codepoint after `offset`.
    pub fn next_codepoint_offset(&self, offset: usize) -> Option<usize> {
        let mut cursor = Cursor::new(self, offset);
        cursor.next::<BaseMetric>()
    }

    /// Return the offset of the extended grapheme cluster boundary
    /// before `offset`.
    pub fn prev_grapheme_offset(&self, offset: usize) -> Option<usize> {
        let mut cursor = Cursor::new(self, offset);
        cursor.prev::<GraphemeMetric>()
    }

    /// Return the offset of the extended grapheme cluster boundary
    /// after `offset`.
    pub fn next_grapheme_offset(&self, offset: usize) -> Option<usize> {
        let mut cursor = Cursor::new(self, offset);
        cursor.next::<GraphemeMetric>()
    }

    /// The previous boundary of the metric, strictly before `offset`.
    pub fn prev_boundary<M: Metric<RopeInfo>>(&self, offset: usize) -> Option<usize> {
        let mut cursor = Cursor::new(self, offset);
        cursor.prev::<M>()
    }

    /// The next boundary of the metric, strictly after `offset`.
    pub fn next_boundary<M: Metric<RopeInfo>>(&self, offset: usize) -> Option<usize> {
        let mut cursor = Cursor::new(self, offset);
        cursor.next::<M>()
    }

    /// Round an arbitrary position down to the nearest boundary of the
    /// metric at or before it.
    pub fn at_or_prev_boundary<M: Metric<RopeInfo>>(&self, offset: usize) -> Option<usize> {
        let mut cursor = Cursor::new(self, offset);
        if cursor.is_boundary::<M>() {
            Some(offset)
        } else {
            cursor.prev::<M>()
        }
    }

    /// Move `distance` boundaries of the metric forward (positive) or
    /// backward (negative) from `offset`.
    ///
    /// Returns `None` when the walk runs off either end of the rope, or
    /// crosses `limit` when one is given.
    pub fn offset_by<M: Metric<RopeInfo>>(
        &self,
        offset: usize,
        distance: isize,
        limit: Option<usize>,
    ) -> Option<usize> {
        let mut cursor = Cursor::new(self, offset);
        let mut pos = offset;
        for _ in 0..distance.abs() {
            pos = if distance > 0 { cursor.next::<M>()? } else { cursor.prev::<M>()? };
            if let Some(limit) = limit {
                if (distance > 0 && pos > limit) || (distance < 0 && pos < limit) {
                    return None;
                }
            }
        }
        Some(pos)
    }

    /// The byte at the given offset.
    pub fn byte_at(&self, offset: usize) -> u8 {
        assert!(offset < self.len(), "offset out of range");
        let cursor = Cursor::new(self, offset);
        let (leaf, pos) = cursor.get_leaf().unwrap();
        leaf.text.as_bytes()[pos]
    }

    /// The codepoint starting at the given offset, which must be a
    /// codepoint boundary.
    pub fn char_at(&self, offset: usize) -> char {
        assert!(offset < self.len(), "offset out of range");
        let cursor = Cursor::new(self, offset);
        let (leaf, pos) = cursor.get_leaf().unwrap();
        leaf.text[pos..].chars().next().unwrap()
    }

    /// A copy of the extended grapheme cluster at the given offset,
    /// rounded down to the previous cluster boundary.
    pub fn grapheme_at(&self, offset: usize) -> String {
        assert!(offset < self.len(), "offset out of range");
        let start = self
            .at_or_prev_boundary::<GraphemeMetric>(offset)
            .expect("no cluster boundary before a valid offset");
        let end = self
            .next_boundary::<GraphemeMetric>(start)
            .expect("no cluster boundary after a valid offset");
        String::from(self.slice_to_cow(start..end))
    }

    /// The contents of the given line, including its trailing newline if
    /// it has one.
    pub fn line(&self, line: usize) -> Cow<str> {
        let max_line = self.measure::<LinesMetric>() + 1;
        assert!(line < max_line, "line number out of range");
        let start = self.offset_of_line(line);
        let end = self.offset_of_line(min(line + 1, max_line));
        self.slice_to_cow(start..end)
    }

    /// An efficient copy of the given range as a `Cow`: borrowed whenever
    /// the range lies within a single chunk.
    pub fn slice_to_cow<T: IntervalBounds>(&self, range: T) -> Cow<str> {
        let mut iter = self.iter_chunks(range);
        let first = iter.next();
        let second = iter.next();

        match (first, second) {
            (None, None) => Cow::from(""),
            (Some(s), None) => Cow::from(s),
            (Some(one), Some(two)) => {
                let mut result = [one, two].concat();
                for chunk in iter {
                    result.push_str(chunk);
                }
                Cow::from(result)
            }
            (None, Some(_)) => unreachable!(),
        }
    }

    /// An iterator over `&str` chunks of the given range of the rope.
    ///
    /// The size of the chunks is indeterminate, but for large strings
    /// they will generally be in the range of 511-1023 bytes.
    pub fn iter_chunks<T: IntervalBounds>(&self, range: T) -> ChunkIter {
        ChunkIter::new(self, range)
    }

    /// An iterator over the bytes of the given range.
    pub fn bytes<T: IntervalBounds>(&self, range: T) -> Bytes {
        Bytes { inner: self.iter_chunks(range), current: "".bytes() }
    }

    /// An iterator over the Unicode scalar values of the given range.
    pub fn chars<T: IntervalBounds>(&self, range: T) -> Chars {
        Chars { inner: self.iter_chunks(range), current: "".chars() }
    }

    /// An iterator over the UTF-16 code units of the given range.
    pub fn utf16_units<T: IntervalBounds>(&self, range: T) -> Utf16Units {
        Utf16Units { inner: self.chars(range), trailing: None }
    }

    /// An iterator over the extended grapheme clusters of the given
    /// range. Clusters straddling chunks come back as owned strings.
    pub fn graphemes<T: IntervalBounds>(&self, range: T) -> Graphemes {
        let iv = range.into_interval(self.len());
        Graphemes { rope: self, cursor: Cursor::new(self, iv.start), end: iv.end }
    }

    /// An iterator over the raw lines of the given range. The lines,
    /// except the last, include the terminating newline.
    ///
    /// The return type is a `Cow<str>`, and in most cases the lines are
    /// slices borrowed from the rope.
    pub fn lines_raw<T: IntervalBounds>(&self, range: T) -> LinesRaw {
        LinesRaw { inner: self.iter_chunks(range), fragment: "" }
    }

    /// An iterator over the lines of the given range.
    ///
    /// Lines are ended with either Unix (`\n`) or MS-DOS (`\r\n`) style
    /// line endings. The line ending is stripped from the resulting
    /// string. The final line ending is optional.
    ///
    /// The semantics are intended to match `str::lines()`.
    pub fn lines<T: IntervalBounds>(&self, range: T) -> Lines {
        Lines { inner: self.lines_raw(range) }
    }

    /// Walk the whole tree checking every structural invariant, panicking
    /// on the first violation. Meant to be called from tests.
    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.assert_node_invariants(true);
        assert!(
            graphemes::compute_fixups(self, 0, self.len()).is_empty(),
            "stale cluster boundary metadata"
        );
    }

    fn assert_node_invariants(&self, is_root: bool) {
        if self.height() == 0 {
            let l = self.get_leaf();
            assert!(l.text.len() <= MAX_LEAF, "leaf over max size");
            assert!(is_root || l.is_ok_child(), "leaf under min size");
            assert!(
                l.prefix_len + l.suffix_len <= l.text.len(),
                "cluster fragments overlap in chunk"
            );
            assert!(l.text.is_char_boundary(l.prefix_len), "prefix not scalar aligned");
            assert!(
                l.text.is_char_boundary(l.text.len() - l.suffix_len),
                "suffix not scalar aligned"
            );
            assert_eq!(*self.info(), RopeInfo::compute_info(l), "leaf summary out of date");
        } else {
            let children = self.get_children();
            assert!(children.len() <= crate::tree::MAX_CHILDREN, "too many children");
            let min = if is_root { 2 } else { crate::tree::MIN_CHILDREN };
            assert!(children.len() >= min, "too few children");
            let mut len = 0;
            let mut info = RopeInfo::identity();
            for child in children {
                assert_eq!(child.height() + 1, self.height(), "child height mismatch");
                child.assert_node_invariants(false);
                len += child.len();
                info.accumulate(child.info());
            }
            assert_eq!(len, self.len(), "node length out of date");
            assert_eq!(info, *self.info(), "node summary out of date");
        }
    }
}

impl FromStr for Rope {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Rope, Self::Err> {
        let mut b = TreeBuilder::new();
        b.push_str(s);
        let mut rope = b.build();
        let len = rope.len();
        graphemes::resync(&mut rope, 0, len);
        Ok(rope)
    }
}

impl<'a> From<&'a str> for Rope {
    fn from(s: &'a str) -> Rope {
        s.parse().unwrap()
    }
}

impl From<String> for Rope {
    fn from(s: String) -> Rope {
        s.as_str().into()
    }
}

impl From<Rope> for String {
    fn from(r: Rope) -> String {
        String::from(&r)
    }
}

impl<'a> From<&'a Rope> for String {
    fn from(r: &Rope) -> String {
        let mut result = String::new();
        for chunk in r.iter_chunks(..) {
            result.push_str(chunk);
        }
        result
    }
}

impl Add for Rope {
    type Output = Rope;
    /// Concatenate two ropes, sharing as much of both trees as balance
    /// allows. Concatenating with an empty rope reuses the other root
    /// unchanged.
    fn add(self, rhs: Rope) -> Rope {
        let seam = self.len();
        let mut rope = Node::concat(self, rhs);
        graphemes::resync(&mut rope, seam, seam);
        rope
    }
}

impl<'a> Add<&'a str> for Rope {
    type Output = Rope;
    fn add(mut self, rhs: &str) -> Rope {
        self.push_str(rhs);
        self
    }
}

impl fmt::Display for Rope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for chunk in self.iter_chunks(..) {
            f.write_str(chunk)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Rope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            write!(f, "{}", self)
        } else {
            write!(f, "Rope({:?})", &self.slice_to_cow(..))
        }
    }
}

// Equality and related

fn eq_chunks<'a, T, U>(mut a: T, mut b: U) -> bool
where
    T: Iterator<Item = &'a str>,
    U: Iterator<Item = &'a str>,
{
    let mut a_chunk = &b""[..];
    let mut b_chunk = &b""[..];
    loop {
        if a_chunk.is_empty() {
            if let Some(s) = a.next() {
                a_chunk = s.as_bytes();
            }
        }
        if b_chunk.is_empty() {
            if let Some(s) = b.next() {
                b_chunk = s.as_bytes();
            }
        }
        let len = min(a_chunk.len(), b_chunk.len());
        if len == 0 {
            return a_chunk.is_empty() && b_chunk.is_empty();
        }
        if a_chunk[..len] != b_chunk[..len] {
            return false;
        }
        a_chunk = &a_chunk[len..];
        b_chunk = &b_chunk[len..];
    }
}

impl PartialEq for Rope {
    fn eq(&self, rhs: &Rope) -> bool {
        self.len() == rhs.len() && eq_chunks(self.iter_chunks(..), rhs.iter_chunks(..))
    }
}

impl Eq for Rope {}

impl PartialEq<str> for Rope {
    fn eq(&self, rhs: &str) -> bool {
        self.len() == rhs.len() && eq_chunks(self.iter_chunks(..), once(rhs))
    }
}

impl<'a> PartialEq<&'a str> for Rope {
    fn eq(&self, rhs: &&str) -> bool {
        self.len() == rhs.len() && eq_chunks(self.iter_chunks(..), once(*rhs))
    }
}

impl PartialEq<String> for Rope {
    fn eq(&self, rhs: &String) -> bool {
        self.len() == rhs.len() && eq_chunks(self.iter_chunks(..), once(rhs.as_str()))
    }
}

impl<'a> PartialEq<Cow<'a, str>> for Rope {
    fn eq(&self, rhs: &Cow<'a, str>) -> bool {
        self.len() == rhs.len() && eq_chunks(self.iter_chunks(..), once(&**rhs))
    }
}

impl PartialEq<Rope> for str {
    fn eq(&self, rhs: &Rope) -> bool {
        rhs == self
    }
}

impl<'a> PartialEq<Rope> for &'a str {
    fn eq(&self, rhs: &Rope) -> bool {
        rhs == self
    }
}

impl PartialEq<Rope> for String {
    fn eq(&self, rhs: &Rope) -> bool {
        rhs == self
    }
}

impl<'a> PartialEq<Rope> for Cow<'a, str> {
    fn eq(&self, rhs: &Rope) -> bool {
        rhs == self
    }
}

// chunk iterator

pub struct ChunkIter<'a> {
    cursor: Cursor<'a, RopeInfo>,
    end: usize,
}

impl<'a> ChunkIter<'a> {
    fn new<T: IntervalBounds>(rope: &'a Rope, range: T) -> ChunkIter<'a> {
        let iv = range.into_interval(rope.len());
        ChunkIter { cursor: Cursor::new(rope, iv.start), end: iv.end }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.cursor.pos() >= self.end {
            return None;
        }
        let (leaf, start_pos) = self.cursor.get_leaf().unwrap();
        let len = min(self.end - self.cursor.pos(), leaf.len() - start_pos);
        let result = &leaf.text[start_pos..start_pos + len];
        self.cursor.set(self.cursor.pos() + len);
        Some(result)
    }
}

/// An iterator over the bytes of a rope range.
pub struct Bytes<'a> {
    inner: ChunkIter<'a>,
    current: str::Bytes<'a>,
}

impl<'a> Iterator for Bytes<'a> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        loop {
            if let Some(b) = self.current.next() {
                return Some(b);
            }
            self.current = self.inner.next()?.bytes();
        }
    }
}

/// An iterator over the Unicode scalar values of a rope range.
pub struct Chars<'a> {
    inner: ChunkIter<'a>,
    current: str::Chars<'a>,
}

impl<'a> Iterator for Chars<'a> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        loop {
            if let Some(c) = self.current.next() {
                return Some(c);
            }
            self.current = self.inner.next()?.chars();
        }
    }
}

/// An iterator over the UTF-16 code units of a rope range.
pub struct Utf16Units<'a> {
    inner: Chars<'a>,
    trailing: Option<u16>,
}

impl<'a> Iterator for Utf16Units<'a> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        if let Some(unit) = self.trailing.take() {
            return Some(unit);
        }
        let c = self.inner.next()?;
        let mut buf = [0u16; 2];
        let units = c.encode_utf16(&mut buf);
        if units.len() == 2 {
            self.trailing = Some(units[1]);
        }
        Some(units[0])
    }
}

/// An iterator over the extended grapheme clusters of a rope range.
pub struct Graphemes<'a> {
    rope: &'a Rope,
    cursor: Cursor<'a, RopeInfo>,
    end: usize,
}

impl<'a> Iterator for Graphemes<'a> {
    type Item = Cow<'a, str>;

    fn next(&mut self) -> Option<Cow<'a, str>> {
        let start = self.cursor.pos();
        if start >= self.end {
            return None;
        }
        let end = min(self.cursor.next::<GraphemeMetric>().unwrap_or(self.end), self.end);
        Some(self.rope.slice_to_cow(start..end))
    }
}

// line iterators

pub struct LinesRaw<'a> {
    inner: ChunkIter<'a>,
    fragment: &'a str,
}

fn cow_append<'a>(a: Cow<'a, str>, b: &'a str) -> Cow<'a, str> {
    if a.is_empty() {
        Cow::from(b)
    } else {
        Cow::from(a.into_owned() + b)
    }
}

impl<'a> Iterator for LinesRaw<'a> {
    type Item = Cow<'a, str>;

    fn next(&mut self) -> Option<Cow<'a, str>> {
        let mut result = Cow::from("");
        loop {
            if self.fragment.is_empty() {
                match self.inner.next() {
                    Some(chunk) => self.fragment = chunk,
                    None => {
                        return if result.is_empty() { None } else { Some(result) };
                    }
                }
                if self.fragment.is_empty() {
                    // can only happen on empty input
                    return None;
                }
            }
            match memchr(b'\n', self.fragment.as_bytes()) {
                Some(i) => {
                    result = cow_append(result, &self.fragment[..=i]);
                    self.fragment = &self.fragment[i + 1..];
                    return Some(result);
                }
                None => {
                    result = cow_append(result, self.fragment);
                    self.fragment = "";
                }
            }
        }
    }
}

pub struct Lines<'a> {
    inner: LinesRaw<'a>,
}

impl<'a> Iterator for Lines<'a> {
    type Item = Cow<'a, str>;

    fn next(&mut self) -> Option<Cow<'a, str>> {
        match self.inner.next() {
            Some(Cow::Borrowed(mut s)) => {
                if s.ends_with('\n') {
                    s = &s[..s.len() - 1];
                    if s.ends_with('\r') {
                        s = &s[..s.len() - 1];
                    }
                }
                Some(Cow::from(s))
            }
            Some(Cow::Owned(mut s)) => {
                if s.ends_with('\n') {
                    let _ = s.pop();
                    if s.ends_with('\r') {
                        let _ = s.pop();
                    }
                }
                Some(Cow::from(s))
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk_boundaries<M: Metric<RopeInfo>>(r: &Rope) -> Vec<usize> {
        let mut cursor = Cursor::new(r, 0);
        let mut v = Vec::new();
        while let Some(pos) = cursor.next::<M>() {
            v.push(pos);
        }
        v
    }

    #[test]
    fn empty_rope() {
        let r = Rope::default();
        assert_eq!(0, r.len());
        assert_eq!(0, r.scalar_count());
        assert_eq!(0, r.utf16_count());
        assert_eq!(0, r.grapheme_count());
        assert_eq!(0, r.newline_count());
        assert_eq!(0, r.lines(..).count());
        assert_eq!("", String::from(&r));
        r.assert_invariants();
    }

    #[test]
    fn concat_with_empty_reuses_root() {
        let r = Rope::from("Hello, world!");
        let from_left = Rope::default() + r.clone();
        assert!(from_left.ptr_eq(&r));
        assert_eq!("Hello, world!", String::from(&from_left));
        let from_right = r.clone() + Rope::default();
        assert!(from_right.ptr_eq(&r));
    }

    #[test]
    fn split_after_concat() {
        let a = Rope::from("Hello, ") + Rope::from("world!");
        assert_eq!("Hello, world!", String::from(&a));
        let left = a.slice(..5);
        let right = a.slice(5..);
        assert_eq!("Hello", String::from(&left));
        assert_eq!(", world!", String::from(&right));
        assert!(!left.ptr_eq(&a));
        assert!(!right.ptr_eq(&a));
        left.assert_invariants();
        right.assert_invariants();
    }

    #[test]
    fn insert_mid() {
        let mut r = Rope::from("abcefg");
        r.insert(3, "d");
        assert_eq!("abcdefg", String::from(&r));
        assert_eq!(7, r.scalar_count());
        r.assert_invariants();
    }

    #[test]
    fn replace_word() {
        let mut r = Rope::from("Hello, Earth!");
        r.edit_str(7..12, "Moon");
        assert_eq!("Hello, Moon!", String::from(&r));
        r.assert_invariants();
    }

    #[test]
    fn combining_mark_across_chunk_seam() {
        let left = "a".repeat(600) + "e";
        let right = "\u{0301}".to_string() + &"b".repeat(600);
        let naive = Rope::from(left.as_str()).grapheme_count()
            + Rope::from(right.as_str()).grapheme_count();
        let rope = Rope::from(left.as_str()) + Rope::from(right.as_str());
        assert_eq!(naive - 1, rope.grapheme_count());
        let clusters: Vec<String> =
            rope.graphemes(..).map(|c| String::from(c)).collect();
        assert_eq!("e\u{0301}", clusters[600]);
        assert_eq!("e\u{0301}", rope.grapheme_at(600));
        rope.assert_invariants();
    }

    #[test]
    fn large_rope_repeated_edits() {
        let n = 1 << 20;
        let mut r = Rope::from("a".repeat(n).as_str());
        assert_eq!(n, r.len());
        for i in 0..60 {
            r.edit_str(0..1, if i % 2 == 0 { "b" } else { "a" });
            assert_eq!(n, r.len());
        }
        assert_eq!(n, r.scalar_count());
        assert_eq!(n, r.utf16_count());
        assert_eq!(n, r.grapheme_count());
        assert_eq!(0, r.newline_count());
        // depth stays logarithmic in the text size
        assert!(r.height() <= 8, "height {} too deep", r.height());
        r.assert_invariants();
    }

    #[test]
    fn slice_of_whole_rope_reuses_root() {
        let r = Rope::from("x".repeat(4000).as_str());
        let s = r.slice(..);
        assert!(s.ptr_eq(&r));
    }

    #[test]
    fn split_concat_round_trip() {
        let text = "ab\ncd".repeat(500);
        let r = Rope::from(text.as_str());
        for &i in &[0, 1, 517, 1024, 2048, text.len()] {
            let rejoined = r.slice(..i) + r.slice(i..);
            assert!(rejoined == r, "mismatch splitting at {}", i);
            rejoined.assert_invariants();
        }
    }

    #[test]
    fn concat_is_associative() {
        let a = Rope::from("aa\n".repeat(400).as_str());
        let b = Rope::from("b".repeat(700).as_str());
        let c = Rope::from("ccc".repeat(600).as_str());
        let left = (a.clone() + b.clone()) + c.clone();
        let right = a + (b + c);
        assert!(left == right);
        left.assert_invariants();
        right.assert_invariants();
    }

    #[test]
    fn replace_with_same_text_is_identity() {
        let text = "lorem ipsum\n".repeat(300);
        let r = Rope::from(text.as_str());
        let mut edited = r.clone();
        let sub = String::from(r.slice_to_cow(600..1200));
        edited.edit_str(600..1200, &sub);
        assert!(edited == r);
        edited.assert_invariants();
    }

    #[test]
    fn bulk_chunking_respects_size_window() {
        let text = "word ".repeat(1000);
        let r = Rope::from(text.as_str());
        assert!(r == text.as_str());
        let chunks: Vec<&str> = r.iter_chunks(..).collect();
        for chunk in &chunks {
            assert!(chunk.len() >= MIN_LEAF && chunk.len() <= MAX_LEAF);
        }
        assert_eq!(text.len(), chunks.iter().map(|c| c.len()).sum::<usize>());
        r.assert_invariants();
    }

    #[test]
    fn edits_around_chunk_seams() {
        let mut s = String::new();
        for i in 0..400 {
            s.push_str(&format!("{:04}\n", i));
        }
        let mut r = Rope::from(s.as_str());
        r.edit_str(1000..1100, "");
        s.replace_range(1000..1100, "");
        assert!(r == s.as_str());
        r.assert_invariants();
        let block = "x".repeat(3000);
        r.edit_str(500..500, &block);
        s.insert_str(500, &block);
        assert!(r == s.as_str());
        r.assert_invariants();
        assert_eq!(count_newlines(&s), r.newline_count());
        for &off in &[0, 499, 500, 3500, s.len()] {
            assert_eq!(count_newlines(&s[..off]), r.line_of_offset(off));
        }
    }

    #[test]
    fn line_of_offset_small() {
        let a = Rope::from("a\nb\nc");
        assert_eq!(0, a.line_of_offset(0));
        assert_eq!(0, a.line_of_offset(1));
        assert_eq!(1, a.line_of_offset(2));
        assert_eq!(1, a.line_of_offset(3));
        assert_eq!(2, a.line_of_offset(4));
        assert_eq!(2, a.line_of_offset(5));
        let b = a.slice(2..4);
        assert_eq!(0, b.line_of_offset(0));
        assert_eq!(0, b.line_of_offset(1));
        assert_eq!(1, b.line_of_offset(2));
    }

    #[test]
    fn offset_of_line_small() {
        let a = Rope::from("a\nb\nc");
        assert_eq!(0, a.offset_of_line(0));
        assert_eq!(2, a.offset_of_line(1));
        assert_eq!(4, a.offset_of_line(2));
        assert_eq!(5, a.offset_of_line(3));
        let b = a.slice(2..4);
        assert_eq!(0, b.offset_of_line(0));
        assert_eq!(2, b.offset_of_line(1));
    }

    #[test]
    #[should_panic]
    fn offset_of_line_panics_past_last() {
        let a = Rope::from("a\nb\nc");
        let _ = a.offset_of_line(4);
    }

    #[test]
    fn lines_raw_small() {
        let a = Rope::from("a\nb\nc");
        assert_eq!(vec!["a\n", "b\n", "c"], a.lines_raw(..).collect::<Vec<_>>());

        let a = Rope::from("a\nb\n");
        assert_eq!(vec!["a\n", "b\n"], a.lines_raw(..).collect::<Vec<_>>());

        let a = Rope::from("\n");
        assert_eq!(vec!["\n"], a.lines_raw(..).collect::<Vec<_>>());

        let a = Rope::from("");
        assert_eq!(0, a.lines_raw(..).count());
    }

    #[test]
    fn lines_small() {
        let a = Rope::from("a\nb\nc");
        assert_eq!(vec!["a", "b", "c"], a.lines(..).collect::<Vec<_>>());
        assert_eq!(
            String::from(&a).lines().collect::<Vec<_>>(),
            a.lines(..).collect::<Vec<_>>()
        );

        let a = Rope::from("a\nb\n");
        assert_eq!(vec!["a", "b"], a.lines(..).collect::<Vec<_>>());

        let a = Rope::from("\n");
        assert_eq!(vec![""], a.lines(..).collect::<Vec<_>>());

        let a = Rope::from("");
        assert_eq!(0, a.lines(..).count());

        let a = Rope::from("a\r\nb\r\nc");
        assert_eq!(vec!["a", "b", "c"], a.lines(..).collect::<Vec<_>>());

        let a = Rope::from("a\rb\rc");
        assert_eq!(vec!["a\rb\rc"], a.lines(..).collect::<Vec<_>>());
    }

    #[test]
    fn lines_med() {
        let mut a = String::new();
        let mut b = String::new();
        let line_len = MAX_LEAF + MIN_LEAF - 1;
        for _ in 0..line_len {
            a.push('a');
            b.push('b');
        }
        a.push('\n');
        b.push('\n');
        let r = Rope::from(&a[..MAX_LEAF]);
        let r = r + Rope::from(String::from(&a[MAX_LEAF..]) + &b[..MIN_LEAF]);
        let r = r + Rope::from(&b[MIN_LEAF..]);
        r.assert_invariants();

        assert_eq!(vec![a.as_str(), b.as_str()], r.lines_raw(..).collect::<Vec<_>>());
        assert_eq!(vec![&a[..line_len], &b[..line_len]], r.lines(..).collect::<Vec<_>>());
        assert_eq!(String::from(&r).lines().collect::<Vec<_>>(), r.lines(..).collect::<Vec<_>>());

        assert_eq!(a.len(), r.offset_of_line(1));
        assert_eq!(r.len(), r.offset_of_line(2));
        assert_eq!(0, r.line_of_offset(a.len() - 1));
        assert_eq!(1, r.line_of_offset(a.len()));
        assert_eq!(1, r.line_of_offset(r.len() - 1));
        assert_eq!(2, r.line_of_offset(r.len()));
    }

    #[test]
    fn line_subscript_includes_newline() {
        let r = Rope::from("aa\nbb\ncc");
        assert_eq!("aa\n", r.line(0));
        assert_eq!("bb\n", r.line(1));
        assert_eq!("cc", r.line(2));
        let r = Rope::from("x\n");
        assert_eq!("x\n", r.line(0));
        assert_eq!("", r.line(1));
    }

    #[test]
    fn append_large() {
        let mut a = Rope::from("");
        let mut b = String::new();
        for i in 0..5_000 {
            let c = i.to_string() + "\n";
            b.push_str(&c);
            a = a + c.as_str();
        }
        assert_eq!(b, String::from(&a));
        a.assert_invariants();
    }

    #[test]
    fn eq_small() {
        let a = Rope::from("a");
        let a2 = Rope::from("a");
        let b = Rope::from("b");
        let empty = Rope::from("");
        assert!(a == a2);
        assert!(a != b);
        assert!(a != empty);
        assert!(empty == empty);
        assert!(a.slice(0..0) == empty);
    }

    #[test]
    fn eq_med() {
        let mut a = String::new();
        let mut b = String::new();
        let line_len = MAX_LEAF + MIN_LEAF - 1;
        for _ in 0..line_len {
            a.push('a');
            b.push('b');
        }
        a.push('\n');
        b.push('\n');
        let r = Rope::from(&a[..MAX_LEAF]);
        let r = r + Rope::from(String::from(&a[MAX_LEAF..]) + &b[..MIN_LEAF]);
        let r = r + Rope::from(&b[MIN_LEAF..]);

        let a_rope = Rope::from(a.as_str());
        let b_rope = Rope::from(b.as_str());
        assert!(r != a_rope);
        assert!(r.slice(..a.len()) == a_rope);
        assert!(r.slice(a.len()..) == b_rope);
        assert!(r == a_rope.clone() + b_rope.clone());
        assert!(r != b_rope + a_rope);
    }

    #[test]
    fn prev_codepoint_offset_small() {
        let a = Rope::from("a\u{00A1}\u{4E00}\u{1F4A9}");
        assert_eq!(Some(6), a.prev_codepoint_offset(10));
        assert_eq!(Some(3), a.prev_codepoint_offset(6));
        assert_eq!(Some(1), a.prev_codepoint_offset(3));
        assert_eq!(Some(0), a.prev_codepoint_offset(1));
        assert_eq!(None, a.prev_codepoint_offset(0));
        let b = a.slice(1..10);
        assert_eq!(Some(5), b.prev_codepoint_offset(9));
        assert_eq!(Some(2), b.prev_codepoint_offset(5));
        assert_eq!(Some(0), b.prev_codepoint_offset(2));
        assert_eq!(None, b.prev_codepoint_offset(0));
    }

    #[test]
    fn next_codepoint_offset_small() {
        let a = Rope::from("a\u{00A1}\u{4E00}\u{1F4A9}");
        assert_eq!(Some(10), a.next_codepoint_offset(6));
        assert_eq!(Some(6), a.next_codepoint_offset(3));
        assert_eq!(Some(3), a.next_codepoint_offset(1));
        assert_eq!(Some(1), a.next_codepoint_offset(0));
        assert_eq!(None, a.next_codepoint_offset(10));
        let b = a.slice(1..10);
        assert_eq!(Some(9), b.next_codepoint_offset(5));
        assert_eq!(Some(5), b.next_codepoint_offset(2));
        assert_eq!(Some(2), b.next_codepoint_offset(0));
        assert_eq!(None, b.next_codepoint_offset(9));
    }

    #[test]
    fn grapheme_offsets() {
        let a = Rope::from("e\u{0301}e\u{0301}x");
        assert_eq!(Some(3), a.next_grapheme_offset(0));
        assert_eq!(Some(6), a.next_grapheme_offset(3));
        assert_eq!(Some(7), a.next_grapheme_offset(6));
        assert_eq!(None, a.next_grapheme_offset(7));
        assert_eq!(Some(6), a.prev_grapheme_offset(7));
        assert_eq!(Some(3), a.prev_grapheme_offset(6));
        assert_eq!(Some(0), a.prev_grapheme_offset(3));
        assert_eq!(None, a.prev_grapheme_offset(0));
        // from inside a cluster, both directions snap to its edges
        assert_eq!(Some(3), a.next_grapheme_offset(1));
        assert_eq!(Some(0), a.prev_grapheme_offset(1));
    }

    #[test]
    fn scalar_metric_conversions() {
        let text = "\u{03B1}".repeat(1000);
        let r = Rope::from(text.as_str());
        assert_eq!(1000, r.scalar_count());
        let boundaries = walk_boundaries::<ScalarMetric>(&r);
        assert_eq!(1000, boundaries.len());
        assert_eq!((1..=1000).map(|i| 2 * i).collect::<Vec<_>>(), boundaries);
        for k in (0..=1000).step_by(97) {
            assert_eq!(2 * k, r.count_base_units::<ScalarMetric>(k));
            assert_eq!(k, r.count::<ScalarMetric>(2 * k));
        }
    }

    #[test]
    fn utf16_metric_conversions() {
        let text = "\u{10348}".repeat(700);
        let r = Rope::from(text.as_str());
        assert_eq!(1400, r.utf16_count());
        assert_eq!(700, r.scalar_count());
        for k in (0..=700).step_by(83) {
            assert_eq!(4 * k, r.count_base_units::<Utf16Metric>(2 * k));
            assert_eq!(2 * k, r.count::<Utf16Metric>(4 * k));
        }
        // boundaries are scalar boundaries: surrogate pairs do not split
        let boundaries = walk_boundaries::<Utf16Metric>(&r);
        assert_eq!(700, boundaries.len());
    }

    #[test]
    fn grapheme_metric_walk() {
        let r = Rope::from("e\u{0301}\u{00E9}\u{1F916}x");
        assert_eq!(4, r.grapheme_count());
        assert_eq!(vec![3, 5, 9, 10], walk_boundaries::<GraphemeMetric>(&r));
    }

    #[test]
    fn grapheme_metric_conversions() {
        // cluster boundaries at 0, 3, 4, 7, 8
        let r = Rope::from("e\u{0301}xe\u{0301}x");
        assert_eq!(0, r.count::<GraphemeMetric>(0));
        // positions inside a cluster round down to the clusters
        // completed before it
        assert_eq!(0, r.count::<GraphemeMetric>(1));
        assert_eq!(0, r.count::<GraphemeMetric>(2));
        assert_eq!(1, r.count::<GraphemeMetric>(3));
        assert_eq!(2, r.count::<GraphemeMetric>(4));
        assert_eq!(2, r.count::<GraphemeMetric>(5));
        assert_eq!(3, r.count::<GraphemeMetric>(7));
        assert_eq!(4, r.count::<GraphemeMetric>(8));
        for k in 0..=4 {
            let b = r.count_base_units::<GraphemeMetric>(k);
            assert_eq!(k, r.count::<GraphemeMetric>(b));
        }
    }

    #[test]
    fn grapheme_metric_conversions_across_seam() {
        let left = "a".repeat(600) + "e";
        let right = "\u{0301}".to_string() + &"b".repeat(600);
        let rope = Rope::from(left.as_str()) + Rope::from(right.as_str());
        // the cluster starting at 600 runs through the seam to 603
        assert_eq!(599, rope.count::<GraphemeMetric>(599));
        assert_eq!(600, rope.count::<GraphemeMetric>(600));
        assert_eq!(601, rope.count::<GraphemeMetric>(603));
        assert_eq!(602, rope.count::<GraphemeMetric>(604));
        assert_eq!(600, rope.count_base_units::<GraphemeMetric>(600));
        assert_eq!(603, rope.count_base_units::<GraphemeMetric>(601));
        assert_eq!(604, rope.count_base_units::<GraphemeMetric>(602));
    }

    #[test]
    fn lines_metric_walk() {
        let r = Rope::from("a\nb\nc");
        assert_eq!(vec![2, 4], walk_boundaries::<LinesMetric>(&r));
        let r = Rope::from("a\nb\n");
        assert_eq!(vec![2, 4], walk_boundaries::<LinesMetric>(&r));
        // a newline-free prefix chunk is skipped by descent, not scanned
        let text = "x".repeat(4000) + "\nrest";
        let r = Rope::from(text.as_str());
        assert_eq!(vec![4001], walk_boundaries::<LinesMetric>(&r));
        let mut cursor = Cursor::new(&r, r.len());
        assert_eq!(Some(4001), cursor.prev::<LinesMetric>());
        assert_eq!(None, cursor.prev::<LinesMetric>());
    }

    #[test]
    fn line_boundary_kind_is_trailing() {
        let r = Rope::from("a\nb");
        let mut cursor = Cursor::new(&r, 0);
        assert!(!cursor.is_boundary::<LinesMetric>());
        cursor.set(2);
        assert!(cursor.is_boundary::<LinesMetric>());
        cursor.set(0);
        assert!(cursor.is_boundary::<BaseMetric>());
        assert!(cursor.is_boundary::<GraphemeMetric>());
    }

    #[test]
    fn offset_by_metric() {
        let r = Rope::from("abc");
        assert_eq!(Some(2), r.offset_by::<BaseMetric>(0, 2, None));
        assert_eq!(Some(0), r.offset_by::<BaseMetric>(2, -2, None));
        assert_eq!(Some(1), r.offset_by::<BaseMetric>(1, 0, None));
        assert_eq!(None, r.offset_by::<BaseMetric>(0, 4, None));
        assert_eq!(None, r.offset_by::<BaseMetric>(0, 3, Some(2)));
        assert_eq!(Some(3), r.offset_by::<BaseMetric>(0, 3, Some(3)));
        assert_eq!(None, r.offset_by::<BaseMetric>(3, -3, Some(1)));
    }

    #[test]
    fn rounding_down() {
        let r = Rope::from("e\u{0301}x");
        assert_eq!(Some(0), r.at_or_prev_boundary::<GraphemeMetric>(0));
        assert_eq!(Some(0), r.at_or_prev_boundary::<GraphemeMetric>(1));
        assert_eq!(Some(3), r.at_or_prev_boundary::<GraphemeMetric>(3));
        assert_eq!("e\u{0301}", r.grapheme_at(1));
        assert_eq!("x", r.grapheme_at(3));
    }

    #[test]
    fn reads() {
        let r = Rope::from("a\u{03B2}c");
        assert_eq!(b'a', r.byte_at(0));
        assert_eq!(0xCE, r.byte_at(1));
        assert_eq!('a', r.char_at(0));
        assert_eq!('\u{03B2}', r.char_at(1));
        assert_eq!('c', r.char_at(3));
    }

    #[test]
    fn byte_and_char_iterators() {
        let text = "0123456789\n".repeat(200);
        let r = Rope::from(text.as_str());
        assert!(r.bytes(..).eq(text.bytes()));
        assert!(r.chars(..).eq(text.chars()));
        assert!(r.bytes(11..44).eq(text[11..44].bytes()));
    }

    #[test]
    fn utf16_units_iterator() {
        let r = Rope::from("a\u{10348}");
        let units: Vec<u16> = r.utf16_units(..).collect();
        assert_eq!(vec![0x61, 0xD800, 0xDF48], units);
        let text = "\u{1F4A9}x".repeat(400);
        let r = Rope::from(text.as_str());
        assert!(r.utf16_units(..).eq(text.encode_utf16()));
    }

    #[test]
    fn graphemes_iterator() {
        let r = Rope::from("e\u{0301}\u{1F916}x");
        let clusters: Vec<String> = r.graphemes(..).map(String::from).collect();
        assert_eq!(vec!["e\u{0301}", "\u{1F916}", "x"], clusters);
    }

    #[test]
    fn slice_to_cow_borrows_within_chunk() {
        let text = "y".repeat(3000);
        let r = Rope::from(text.as_str());
        assert!(matches!(r.slice_to_cow(10..20), Cow::Borrowed(_)));
        assert!(matches!(r.slice_to_cow(..), Cow::Owned(_)));
    }

    #[test]
    fn display_and_debug() {
        let r = Rope::from("hi\nthere");
        assert_eq!("hi\nthere", format!("{}", r));
        assert_eq!("Rope(\"hi\\nthere\")", format!("{:?}", r));
        assert_eq!("hi\nthere", format!("{:#?}", r));
    }

    #[test]
    fn cursor_comparison() {
        let r = Rope::from("hello");
        let a = Cursor::new(&r, 2);
        let b = Cursor::new(&r, 2);
        let c = Cursor::new(&r, 4);
        assert!(a == b);
        assert!(a < c);
    }

    #[test]
    #[should_panic]
    fn cursor_comparison_across_ropes_panics() {
        let r1 = Rope::from("hello");
        let r2 = Rope::from("hello");
        let a = Cursor::new(&r1, 2);
        let b = Cursor::new(&r2, 2);
        let _ = a == b;
    }

    #[test]
    #[should_panic]
    fn edit_out_of_range_panics() {
        let mut r = Rope::from("abc");
        r.edit_str(2..9, "x");
    }

    #[test]
    #[should_panic]
    fn edit_inside_codepoint_panics() {
        let mut r = Rope::from("\u{00E9}");
        r.edit_str(1..2, "x");
    }

    #[test]
    #[should_panic]
    fn byte_at_end_panics() {
        let r = Rope::from("abc");
        let _ = r.byte_at(3);
    }

    #[test]
    #[should_panic]
    fn cursor_out_of_range_panics() {
        let r = Rope::from("abc");
        let _ = Cursor::new(&r, 4);
    }
}
