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

//! Extended grapheme cluster machinery that crosses chunk boundaries:
//! boundary queries within one chunk, a scanner over the whole rope, and
//! the reconciliation pass that keeps per-chunk boundary bookkeeping
//! exact after an edit.

use std::cmp::min;

use unicode_segmentation::{GraphemeCursor, GraphemeIncomplete};

use crate::rope::{Rope, RopeInfo, MAX_LEAF};
use crate::tree::Cursor;

/// Whether `byte_idx` is a cluster boundary of `text` taken as a
/// standalone string.
pub(crate) fn is_grapheme_boundary(text: &str, byte_idx: usize) -> bool {
    debug_assert!(byte_idx <= text.len());
    if byte_idx == 0 || byte_idx == text.len() {
        true
    } else if !text.is_char_boundary(byte_idx) {
        false
    } else {
        GraphemeCursor::new(byte_idx, text.len(), true).is_boundary(text, 0).unwrap()
    }
}

/// The first cluster boundary of `text` after `byte_idx`. Must not be
/// called at the end of the text.
pub(crate) fn next_grapheme_boundary(text: &str, byte_idx: usize) -> usize {
    debug_assert!(byte_idx < text.len());
    let mut boundary_idx = byte_idx;
    while !text.is_char_boundary(boundary_idx) {
        boundary_idx += 1;
    }
    let mut gc = GraphemeCursor::new(boundary_idx, text.len(), true);
    if byte_idx < boundary_idx && gc.is_boundary(text, 0).unwrap() {
        boundary_idx
    } else {
        gc.next_boundary(text, 0).unwrap().unwrap()
    }
}

/// The last cluster boundary of `text` before `byte_idx`. Must not be
/// called at offset 0.
pub(crate) fn prev_grapheme_boundary(text: &str, byte_idx: usize) -> usize {
    debug_assert!(byte_idx > 0 && byte_idx <= text.len());
    let mut boundary_idx = byte_idx;
    while !text.is_char_boundary(boundary_idx) {
        boundary_idx -= 1;
    }
    let mut gc = GraphemeCursor::new(boundary_idx, text.len(), true);
    if boundary_idx < byte_idx && gc.is_boundary(text, 0).unwrap() {
        boundary_idx
    } else {
        gc.prev_boundary(text, 0).unwrap().unwrap()
    }
}

/// A scanner yielding the cluster boundaries of the whole rope, in
/// order. It wraps a [`GraphemeCursor`] and feeds it chunks on demand,
/// including the preceding chunks the cursor asks for when it cannot
/// decide a boundary from local data. It can be seeded at any position,
/// not just a known boundary.
pub(crate) struct RopeBreaker<'a> {
    rope: &'a Rope,
    cursor: Cursor<'a, RopeInfo>,
    gc: GraphemeCursor,
}

impl<'a> RopeBreaker<'a> {
    pub(crate) fn new(rope: &'a Rope, pos: usize) -> RopeBreaker<'a> {
        RopeBreaker {
            rope,
            cursor: Cursor::new(rope, pos),
            gc: GraphemeCursor::new(pos, rope.len(), true),
        }
    }

    /// The next boundary strictly after the current scan position, or
    /// `None` past the end of the rope.
    pub(crate) fn next_break(&mut self) -> Option<usize> {
        loop {
            let (leaf, offset_in_leaf) = self.cursor.get_leaf()?;
            let chunk_start = self.cursor.pos() - offset_in_leaf;
            match self.gc.next_boundary(leaf.text(), chunk_start) {
                Ok(Some(b)) => {
                    self.cursor.set(b);
                    return Some(b);
                }
                Ok(None) => return None,
                Err(GraphemeIncomplete::NextChunk) => {
                    self.cursor.next_leaf()?;
                }
                Err(GraphemeIncomplete::PreContext(idx)) => {
                    let (ctx, ctx_start) = self.context_chunk(idx);
                    self.gc.provide_context(ctx, ctx_start);
                }
                _ => unreachable!("unexpected grapheme cursor state"),
            }
        }
    }

    /// Whether `pos` is a cluster boundary. Re-seeds the scan at `pos`.
    pub(crate) fn is_break(&mut self, pos: usize) -> bool {
        self.gc.set_cursor(pos);
        self.cursor.set(pos);
        loop {
            let (leaf, offset_in_leaf) = match self.cursor.get_leaf() {
                Some(l) => l,
                None => return true,
            };
            let chunk_start = self.cursor.pos() - offset_in_leaf;
            match self.gc.is_boundary(leaf.text(), chunk_start) {
                Ok(b) => return b,
                Err(GraphemeIncomplete::PreContext(idx)) => {
                    let (ctx, ctx_start) = self.context_chunk(idx);
                    self.gc.provide_context(ctx, ctx_start);
                }
                _ => unreachable!("unexpected grapheme cursor state"),
            }
        }
    }

    /// The chunk ending at `idx`, for pre-context requests.
    fn context_chunk(&self, idx: usize) -> (&'a str, usize) {
        debug_assert!(idx > 0);
        let cursor = Cursor::new(self.rope, idx - 1);
        let (leaf, offset_in_leaf) = cursor.get_leaf().unwrap();
        let chunk_start = cursor.pos() - offset_in_leaf;
        (&leaf.text()[..idx - chunk_start], chunk_start)
    }
}

/// How far past the edited region rebuilt leaves can reach: slicing and
/// re-merging around a seam only ever rewrites leaves within a couple of
/// maximum chunk lengths of it.
const RESYNC_WINDOW: usize = 2 * MAX_LEAF;

pub(crate) struct Fixup {
    leaf_start: usize,
    prefix_len: usize,
    suffix_len: usize,
}

/// Scan the chunks around the edited byte region `[start, end]` and
/// compute corrected boundary bookkeeping for every chunk whose stored
/// values disagree with the actual cluster boundaries of the text.
///
/// The scan starts one chunk before the chunk containing `start` and
/// keeps going until a chunk beyond every possibly-rebuilt leaf needs no
/// correction. Such a chunk's stored first and last breaks both match
/// the scanner, so the stored and actual boundary streams have agreed on
/// two consecutive breaks and everything downstream is already exact.
pub(crate) fn compute_fixups(rope: &Rope, start: usize, end: usize) -> Vec<Fixup> {
    let mut fixups = Vec::new();
    if rope.is_empty() {
        return fixups;
    }
    let start = min(start, rope.len());
    let end = min(end, rope.len());

    // position the walk at the start of the leaf before the one
    // containing `start`
    let mut walk = Cursor::new(rope, start);
    let (_, offset_in_leaf) = walk.get_leaf().unwrap();
    let leaf_start = walk.pos() - offset_in_leaf;
    walk.set(leaf_start);
    if leaf_start > 0 {
        walk.prev_leaf();
    }
    let scan_start = walk.pos();

    let mut breaker = RopeBreaker::new(rope, scan_start);
    let mut upcoming =
        if breaker.is_break(scan_start) { Some(scan_start) } else { breaker.next_break() };

    loop {
        let (leaf, offset_in_leaf) = match walk.get_leaf() {
            Some(l) => l,
            None => break,
        };
        debug_assert_eq!(offset_in_leaf, 0);
        let s = walk.pos();
        let e = s + leaf.text().len();
        let (new_prefix, new_suffix) = match upcoming {
            Some(b) if b <= e => {
                debug_assert!(b >= s);
                let new_prefix = b - s;
                let mut last = b;
                loop {
                    if last == e {
                        upcoming = Some(e);
                        break;
                    }
                    match breaker.next_break() {
                        Some(nb) if nb <= e => last = nb,
                        Some(nb) => {
                            upcoming = Some(nb);
                            break;
                        }
                        None => {
                            upcoming = None;
                            break;
                        }
                    }
                }
                (new_prefix, e - last)
            }
            // no break at all in this chunk: it is the interior of one
            // cluster
            _ => (leaf.text().len(), 0),
        };
        if new_prefix == leaf.prefix_len() && new_suffix == leaf.suffix_len() {
            if s >= end.saturating_add(RESYNC_WINDOW) {
                break;
            }
        } else {
            fixups.push(Fixup { leaf_start: s, prefix_len: new_prefix, suffix_len: new_suffix });
        }
        if walk.next_leaf().is_none() {
            break;
        }
    }
    fixups
}

/// Reconcile chunk boundary bookkeeping with the text after an edit
/// touching the byte region `[start, end]`. Chunks whose stored values
/// already match are not rewritten, so unaffected subtrees stay shared.
pub(crate) fn resync(rope: &mut Rope, start: usize, end: usize) {
    let fixups = compute_fixups(rope, start, end);
    for fixup in fixups {
        rope.update_leaf_at(fixup.leaf_start, |leaf| {
            leaf.set_boundaries(fixup.prefix_len, fixup.suffix_len);
        });
    }
}
