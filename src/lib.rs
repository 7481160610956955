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

//! A persistent text rope built on a copy-on-write b-tree of UTF-8
//! chunks.
//!
//! Editing operations (insert, remove, replace, concatenate, slice) are
//! O(log n) and share unchanged subtrees with earlier revisions, so
//! cheap clones behave as snapshots. Positions can be addressed and
//! navigated in several views of the same text: UTF-8 bytes, UTF-16
//! code units, Unicode scalar values, extended grapheme clusters, and
//! lines. The metric machinery is generic, so the same tree engine can
//! back other sequence-like structures.

pub mod interval;
pub mod rope;
pub mod tree;

mod graphemes;
mod serde_impls;

pub use crate::interval::{Interval, IntervalBounds};
pub use crate::rope::{
    BaseMetric, Bytes, Chars, Chunk, ChunkIter, GraphemeMetric, Graphemes, Lines, LinesMetric,
    LinesRaw, Rope, RopeInfo, ScalarMetric, Utf16Metric, Utf16Units,
};
pub use crate::tree::{
    Cursor, DefaultMetric, Leaf, Metric, MetricKind, Node, NodeInfo, TreeBuilder,
};
