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

//! A general b-tree structure suitable for ropes and the like.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::interval::{Interval, IntervalBounds};

pub(crate) const MIN_CHILDREN: usize = 4;
pub(crate) const MAX_CHILDREN: usize = 8;

pub trait NodeInfo: Clone {
    /// The type of the leaf.
    ///
    /// A given `NodeInfo` is for exactly one type of leaf. That is why
    /// the leaf type is an associated type rather than a type parameter.
    type L: Leaf;

    /// An operator that combines info from two subtrees. It is intended
    /// (but not strictly enforced) that this operator be associative and
    /// obey an identity property. In mathematical terms, the accumulate
    /// method is the sum operation of a monoid.
    fn accumulate(&mut self, other: &Self);

    /// A mapping from a leaf into the info type. It is intended (but
    /// not strictly enforced) that applying the accumulate method to
    /// the info derived from two leaves gives the same result as
    /// deriving the info from the concatenation of the two leaves. In
    /// mathematical terms, the compute_info method is a monoid
    /// homomorphism.
    fn compute_info(l: &Self::L) -> Self;

    /// The identity of the monoid. Need not be implemented because it
    /// can be computed from the leaf default.
    fn identity() -> Self {
        Self::compute_info(&Self::L::default())
    }

    /// The interval covered by the first `len` base units of this node.
    /// The default impl is sufficient for most types, but interval trees
    /// may need to override it.
    fn interval(&self, len: usize) -> Interval {
        Interval::new(0, len)
    }
}

/// A trait indicating the default metric of a NodeInfo.
///
/// Adds quality of life functions to
/// [`Node`](struct.Node.html)s, allowing conversion between the default
/// metric of a node and other metrics.
pub trait DefaultMetric: NodeInfo {
    type DefaultMetric: Metric<Self>;
}

pub trait Leaf: Sized + Clone + Default {
    /// Measurement of leaf in base units.
    fn len(&self) -> usize;

    /// Generally a minimum size requirement for leaves.
    fn is_ok_child(&self) -> bool;

    /// Combine the part of `other` bounded by `iv` into `self`, splitting
    /// if necessary.
    ///
    /// Interval is in "base units". Generally implements a maximum size.
    ///
    /// # Invariants:
    ///
    /// - If one or the other input is empty, then no split.
    /// - If either input satisfies `is_ok_child`, then, on return, `self`
    ///   satisfies this, as does the optional split.
    fn push_maybe_split(&mut self, other: &Self, iv: Interval) -> Option<Self>;

    /// Same meaning as `push_maybe_split` starting from an empty
    /// leaf, but maybe can be implemented more efficiently?
    ///
    /// TODO: remove if it doesn't pull its weight
    fn subseq(&self, iv: Interval) -> Self {
        let mut result = Self::default();
        if result.push_maybe_split(self, iv).is_some() {
            panic!("unexpected split");
        }
        result
    }
}

/// A b-tree node storing leaves at the bottom, and with info
/// retained at each node. It is implemented with atomic reference counting
/// and copy-on-write semantics, so an immutable clone is a very cheap
/// operation, and nodes can be shared across threads. Even so, it is
/// designed to be updated in place, with efficiency similar to a mutable
/// data structure, using uniqueness of reference count to detect when
/// this operation is safe.
///
/// When the leaf is a string, this is a rope data structure (a persistent
/// rope in functional programming jargon). However, it is not restricted
/// to strings, and it is expected to be the basis for a number of data
/// structures useful for text processing.
#[derive(Clone)]
pub struct Node<N: NodeInfo>(Arc<NodeBody<N>>);

#[derive(Clone)]
struct NodeBody<N: NodeInfo> {
    height: usize,
    len: usize,
    info: N,
    /// Bumped on every in-place mutation, so that cursors can detect
    /// that the revision they were created against is gone.
    generation: u64,
    val: NodeVal<N>,
}

#[derive(Clone)]
enum NodeVal<N: NodeInfo> {
    Leaf(N::L),
    Internal(Vec<Node<N>>),
}

/// Which side of a measured unit a metric's boundaries sit on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    /// A boundary at the start of each unit.
    Leading,
    /// A boundary just past the end of each unit.
    Trailing,
    /// Every complete unit edge is a boundary.
    Atomic,
}

/// A trait for quickly processing attributes of a
/// [`NodeInfo`](trait.NodeInfo.html).
///
/// For the conceptual background see the
/// [blog post, Rope science, part 2: metrics](https://xi-editor.io/docs/rope_science_02.html).
pub trait Metric<N: NodeInfo> {
    /// Return the number of boundaries in the provided node info,
    /// possibly using the base length as a convenience.
    fn measure(info: &N, len: usize) -> usize;

    /// Returns the smallest offset, in base units, for an offset in
    /// measured units.
    fn to_base_units(l: &N::L, in_measured_units: usize) -> usize;

    /// Returns the smallest offset in measured units corresponding to an
    /// offset in base units.
    fn from_base_units(l: &N::L, in_base_units: usize) -> usize;

    // The next three methods work in base units.

    // These methods must indicate a boundary at the end of a leaf,
    // if present. A boundary at the beginning of a leaf is optional
    // (the previous leaf will be queried).

    /// Return whether the offset in base units is a boundary of this
    /// metric.
    fn is_boundary(l: &N::L, offset: usize) -> bool;

    /// Returns the largest boundary less than the given offset, if it
    /// exists in this leaf. Will be called with `offset > 0`.
    fn prev(l: &N::L, offset: usize) -> Option<usize>;

    /// Returns the smallest boundary greater than the given offset, if
    /// it exists in this leaf.
    fn next(l: &N::L, offset: usize) -> Option<usize>;

    /// Returns true if the boundaries of this metric can land in the
    /// interior of a unit of another leaf, that is, if a unit can
    /// straddle leaves. When this is false, the ends of leaves are
    /// always considered to be boundaries. More formally:
    /// `!can_fragment -> to_base_units(measure) = leaf.len`.
    fn can_fragment() -> bool;

    /// Where a boundary sits relative to the unit it delimits. Among
    /// other things this decides whether offset 0 is a boundary: it is
    /// for every kind except `Trailing`.
    fn kind() -> MetricKind;
}

impl<N: NodeInfo> Node<N> {
    pub fn from_leaf(l: N::L) -> Node<N> {
        let len = l.len();
        let info = N::compute_info(&l);
        Node(Arc::new(NodeBody { height: 0, len, info, generation: 0, val: NodeVal::Leaf(l) }))
    }

    /// Create a node from a vec of nodes.
    ///
    /// The input must satisfy the following balancing requirements:
    /// * The length of `nodes` must be <= MAX_CHILDREN and > 1.
    /// * All the nodes are the same height.
    /// * All the nodes must satisfy is_ok_child.
    fn from_nodes(nodes: Vec<Node<N>>) -> Node<N> {
        debug_assert!(nodes.len() > 1 && nodes.len() <= MAX_CHILDREN);
        let height = nodes[0].0.height + 1;
        let mut len = nodes[0].0.len;
        let mut info = nodes[0].0.info.clone();
        for child in &nodes[1..] {
            debug_assert_eq!(child.height() + 1, height);
            len += child.0.len;
            info.accumulate(&child.0.info);
        }
        Node(Arc::new(NodeBody { height, len, info, generation: 0, val: NodeVal::Internal(nodes) }))
    }

    /// The number of base units in this node.
    pub fn len(&self) -> usize {
        self.0.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The height of the tree; leaves are at height 0.
    pub fn height(&self) -> usize {
        self.0.height
    }

    /// The revision counter of this node. It changes whenever the node is
    /// mutated in place, which only ever happens through a uniquely owned
    /// handle.
    pub fn generation(&self) -> u64 {
        self.0.generation
    }

    /// Whether two handles point at the very same node.
    pub fn ptr_eq(&self, other: &Node<N>) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn info(&self) -> &N {
        &self.0.info
    }

    fn is_leaf(&self) -> bool {
        self.0.height == 0
    }

    fn interval(&self) -> Interval {
        self.0.info.interval(self.0.len)
    }

    /// Access for mutation. Clones the body first if it is shared, so the
    /// write never reaches another handle's revision; either way the
    /// generation is bumped to invalidate cursors.
    fn body_mut(&mut self) -> &mut NodeBody<N> {
        let body = Arc::make_mut(&mut self.0);
        body.generation += 1;
        body
    }

    pub(crate) fn get_children(&self) -> &[Node<N>] {
        if let NodeVal::Internal(ref v) = self.0.val {
            v
        } else {
            panic!("get_children called on leaf node");
        }
    }

    pub(crate) fn get_leaf(&self) -> &N::L {
        if let NodeVal::Leaf(ref l) = self.0.val {
            l
        } else {
            panic!("get_leaf called on internal node");
        }
    }

    /// Append `other` into this node's leaf, splitting if it overflows.
    /// `self` must be a leaf node.
    fn leaf_push_maybe_split(&mut self, other: &N::L) -> Option<N::L> {
        let iv = Interval::new(0, other.len());
        let body = self.body_mut();
        if let NodeVal::Leaf(ref mut l) = body.val {
            let new = l.push_maybe_split(other, iv);
            body.len = l.len();
            body.info = N::compute_info(l);
            new
        } else {
            panic!("leaf_push_maybe_split called on internal node");
        }
    }

    fn is_ok_child(&self) -> bool {
        match self.0.val {
            NodeVal::Leaf(ref l) => l.is_ok_child(),
            NodeVal::Internal(ref nodes) => nodes.len() >= MIN_CHILDREN,
        }
    }

    /// Glue two same-height child sequences together: one node a level
    /// up when they fit, otherwise an even two-way split wrapped by a
    /// second level.
    fn join_child_lists(left: &[Node<N>], right: &[Node<N>]) -> Node<N> {
        let total = left.len() + right.len();
        let mut combined = Vec::with_capacity(total);
        combined.extend_from_slice(left);
        combined.extend_from_slice(right);
        if total <= MAX_CHILDREN {
            Node::from_nodes(combined)
        } else {
            let tail = combined.split_off(total / 2);
            Node::from_nodes(vec![Node::from_nodes(combined), Node::from_nodes(tail)])
        }
    }

    /// Join two leaf nodes, merging their contents when either is
    /// undersized.
    fn join_leaves(left: Node<N>, right: Node<N>) -> Node<N> {
        debug_assert!(left.is_leaf() && right.is_leaf());

        if left.is_ok_child() && right.is_ok_child() {
            return Node::from_nodes(vec![left, right]);
        }
        let mut merged = left;
        match merged.leaf_push_maybe_split(right.get_leaf()) {
            Some(spilled) => Node::from_nodes(vec![merged, Node::from_leaf(spilled)]),
            None => merged,
        }
    }

    /// Concatenate two trees into one balanced tree, sharing as much of
    /// both as the balance invariants allow. Concatenation with an empty
    /// tree returns the other tree's root untouched.
    pub fn concat(left: Node<N>, right: Node<N>) -> Node<N> {
        if left.is_empty() {
            return right;
        }
        if right.is_empty() {
            return left;
        }

        let left_height = left.height();
        let right_height = right.height();

        if left_height == right_height {
            if left.is_ok_child() && right.is_ok_child() {
                return Node::from_nodes(vec![left, right]);
            }
            if left_height == 0 {
                return Node::join_leaves(left, right);
            }
            return Node::join_child_lists(left.get_children(), right.get_children());
        }

        if left_height < right_height {
            // graft the shorter tree into the taller one's first subtree
            let right_children = right.get_children();
            if left_height == right_height - 1 && left.is_ok_child() {
                return Node::join_child_lists(&[left], right_children);
            }
            let grafted = Node::concat(left, right_children[0].clone());
            if grafted.height() == right_height - 1 {
                Node::join_child_lists(&[grafted], &right_children[1..])
            } else {
                Node::join_child_lists(grafted.get_children(), &right_children[1..])
            }
        } else {
            // mirror image, grafting into the taller left tree's last
            // subtree. The recursion writes through that child, so it is
            // given its own handle first, keeping the write out of any
            // shared revision.
            let left_children = left.get_children();
            let last = left_children.len() - 1;
            if right_height == left_height - 1 && right.is_ok_child() {
                return Node::join_child_lists(left_children, &[right]);
            }
            let grafted = Node::concat(left_children[last].clone(), right);
            if grafted.height() == left_height - 1 {
                Node::join_child_lists(&left_children[..last], &[grafted])
            } else {
                Node::join_child_lists(&left_children[..last], grafted.get_children())
            }
        }
    }

    pub fn measure<M: Metric<N>>(&self) -> usize {
        M::measure(&self.0.info, self.0.len)
    }

    /// Push the part of this node bounded by `iv` onto a builder, sharing
    /// whole subtrees with the source tree wherever the range covers them.
    pub fn push_subseq(&self, b: &mut TreeBuilder<N>, iv: Interval) {
        if iv.is_empty() {
            return;
        }
        if iv == self.interval() {
            b.push(self.clone());
            return;
        }
        match self.0.val {
            NodeVal::Leaf(ref l) => {
                b.push_leaf_slice(l, iv);
            }
            NodeVal::Internal(ref v) => {
                let mut offset = 0;
                for child in v {
                    if iv.is_before(offset) {
                        break;
                    }
                    let child_iv = child.interval();
                    // easier just to use signed ints?
                    let rec_iv = iv.intersect(child_iv.translate(offset)).translate_neg(offset);
                    child.push_subseq(b, rec_iv);
                    offset += child.len();
                }
            }
        }
    }

    pub fn subseq<T: IntervalBounds>(&self, iv: T) -> Node<N> {
        let iv = iv.into_interval(self.len());
        let mut b = TreeBuilder::new();
        self.push_subseq(&mut b, iv);
        b.build()
    }

    /// Replace the given range with a new node, rebuilding the tree
    /// around it.
    pub fn edit<T: IntervalBounds>(&mut self, iv: T, new: Node<N>) {
        let iv = iv.into_interval(self.len());
        let mut b = TreeBuilder::new();
        let self_iv = self.interval();
        self.push_subseq(&mut b, self_iv.prefix(iv));
        if !new.is_empty() {
            b.push(new);
        }
        self.push_subseq(&mut b, self_iv.suffix(iv));
        *self = b.build();
    }

    /// Rewrite the leaf containing `offset` in place, recomputing lengths
    /// and info on the spine above it. This is the one write path that
    /// reaches into a shared tree; sharing is handled per-node by
    /// clone-on-write.
    pub(crate) fn update_leaf_at<F>(&mut self, offset: usize, f: F)
    where
        F: FnOnce(&mut N::L),
    {
        let body = self.body_mut();
        match body.val {
            NodeVal::Leaf(ref mut l) => {
                debug_assert!(offset <= l.len());
                f(l);
                body.len = l.len();
                body.info = N::compute_info(l);
            }
            NodeVal::Internal(ref mut v) => {
                let mut running = 0;
                let mut i = 0;
                while i + 1 < v.len() && offset >= running + v[i].len() {
                    running += v[i].len();
                    i += 1;
                }
                v[i].update_leaf_at(offset - running, f);
                let mut len = v[0].0.len;
                let mut info = v[0].0.info.clone();
                for child in &v[1..] {
                    len += child.0.len;
                    info.accumulate(&child.0.info);
                }
                body.len = len;
                body.info = info;
            }
        }
    }

    /// Converts a measurement in one metric to a measurement in another.
    /// Does not deal with the endpoint; callers that need `m1 ==
    /// measure::<M1>()` handle it specially.
    pub fn convert_metrics<M1: Metric<N>, M2: Metric<N>>(&self, mut m1: usize) -> usize {
        if m1 == 0 {
            return 0;
        }
        // A trailing fragmenting metric's m1-th boundary sits at the end
        // of its unit, inside the leaf whose measure reaches m1, so ties
        // must land there. For every other kind the boundary opens a
        // unit, so a tie belongs to the next leaf with a unit start.
        let m1_fudge =
            if M1::can_fragment() && M1::kind() == MetricKind::Trailing { 1 } else { 0 };
        let mut m2 = 0;
        let mut node = self;
        while node.height() > 0 {
            for child in node.get_children() {
                let child_m1 = child.measure::<M1>();
                if m1 < child_m1 + m1_fudge {
                    node = child;
                    break;
                }
                m2 += child.measure::<M2>();
                m1 -= child_m1;
            }
        }
        let l = node.get_leaf();
        let base = M1::to_base_units(l, m1);
        m2 + M2::from_base_units(l, base)
    }
}

impl<N: DefaultMetric> Node<N> {
    /// Measures the length of the text from the start up to `offset`
    /// (exclusive), which is given in base units, in the given metric.
    pub fn count<M: Metric<N>>(&self, offset: usize) -> usize {
        assert!(offset <= self.len(), "offset out of range");
        if offset == self.len() {
            self.measure::<M>()
        } else {
            self.convert_metrics::<N::DefaultMetric, M>(offset)
        }
    }

    /// Measures the length of the text from the start up to `measured`
    /// units of the given metric, in base units.
    pub fn count_base_units<M: Metric<N>>(&self, measured: usize) -> usize {
        assert!(measured <= self.measure::<M>(), "measure out of range");
        // for every non-trailing metric the boundary one past the last
        // unit start is the end of the sequence
        if measured == self.measure::<M>() && M::kind() != MetricKind::Trailing {
            self.len()
        } else {
            self.convert_metrics::<M, N::DefaultMetric>(measured)
        }
    }
}

impl<N: NodeInfo> Default for Node<N> {
    fn default() -> Node<N> {
        Node::from_leaf(N::L::default())
    }
}

/// A builder for creating new trees. Nodes of arbitrary heights are
/// pushed in left-to-right order; building is amortized O(n) in the
/// total size pushed.
pub struct TreeBuilder<N: NodeInfo> {
    // A stack of partially built trees. These are kept in order of
    // strictly descending height, and all vectors have a length less
    // than MAX_CHILDREN and greater than zero.
    //
    // In addition, there is a balancing invariant: for each vector
    // of length greater than one, all elements satisfy `is_ok_child`.
    stack: Vec<Vec<Node<N>>>,
}

impl<N: NodeInfo> TreeBuilder<N> {
    /// A new, empty builder.
    pub fn new() -> TreeBuilder<N> {
        TreeBuilder { stack: Vec::new() }
    }

    /// Append a node to the tree being built.
    pub fn push(&mut self, mut n: Node<N>) {
        loop {
            let ord = match self.stack.last() {
                Some(last) => last.last().unwrap().height().cmp(&n.height()),
                None => Ordering::Greater,
            };
            match ord {
                Ordering::Less => {
                    n = Node::concat(self.pop(), n);
                }
                Ordering::Equal => {
                    let tos = self.stack.last_mut().unwrap();
                    if tos.last().unwrap().is_ok_child() && n.is_ok_child() {
                        tos.push(n);
                    } else if n.height() == 0 {
                        let mut last = tos.pop().unwrap();
                        let split = last.leaf_push_maybe_split(n.get_leaf());
                        tos.push(last);
                        if let Some(split) = split {
                            tos.push(Node::from_leaf(split));
                        }
                    } else {
                        // same child-list merge as concatenation, except
                        // the halves stay on the slot instead of being
                        // wrapped by a parent
                        let last = tos.pop().unwrap();
                        let mut combined = last.get_children().to_vec();
                        combined.extend_from_slice(n.get_children());
                        if combined.len() <= MAX_CHILDREN {
                            tos.push(Node::from_nodes(combined));
                        } else {
                            let tail = combined.split_off(combined.len() / 2);
                            tos.push(Node::from_nodes(combined));
                            tos.push(Node::from_nodes(tail));
                        }
                    }
                    if self.stack.last().unwrap().len() < MAX_CHILDREN {
                        break;
                    }
                    n = self.pop();
                }
                Ordering::Greater => {
                    self.stack.push(vec![n]);
                    break;
                }
            }
        }
    }

    /// Append a sequence of leaves.
    pub fn push_leaves(&mut self, leaves: impl IntoIterator<Item = N::L>) {
        for leaf in leaves {
            self.push(Node::from_leaf(leaf));
        }
    }

    pub fn push_leaf(&mut self, l: N::L) {
        self.push(Node::from_leaf(l))
    }

    pub fn push_leaf_slice(&mut self, l: &N::L, iv: Interval) {
        self.push(Node::from_leaf(l.subseq(iv)))
    }

    /// Build the final tree.
    ///
    /// The tree is the concatenation of all the nodes and leaves that
    /// have been pushed on the builder, in order. An empty builder
    /// yields an empty leaf.
    pub fn build(mut self) -> Node<N> {
        if self.stack.is_empty() {
            Node::from_leaf(N::L::default())
        } else {
            let mut n = self.pop();
            while !self.stack.is_empty() {
                n = Node::concat(self.pop(), n);
            }
            n
        }
    }

    fn pop(&mut self) -> Node<N> {
        let nodes = self.stack.pop().unwrap();
        if nodes.len() == 1 {
            nodes.into_iter().next().unwrap()
        } else {
            Node::from_nodes(nodes)
        }
    }
}

impl<N: NodeInfo> Default for TreeBuilder<N> {
    fn default() -> TreeBuilder<N> {
        TreeBuilder::new()
    }
}

const CURSOR_CACHE_SIZE: usize = 4;

/// A data structure for traversing boundaries in a tree.
///
/// It is designed to be efficient both for random access and for iteration. The
/// cursor itself is agnostic to which [`Metric`] is used to determine boundaries, but
/// the methods to find boundaries are parametrized on the [`Metric`].
///
/// A cursor is valid only against the revision of the tree it was created
/// against: it captures the root's generation and fails loudly if used after
/// the root was mutated out from under it (in safe Rust this is already
/// prevented by the borrow, so the check mostly guards cursor comparisons).
///
/// [`Metric`]: trait.Metric.html
pub struct Cursor<'a, N: 'a + NodeInfo> {
    /// The tree being traversed by this cursor.
    root: &'a Node<N>,
    /// The revision of `root` this cursor was created against.
    generation: u64,
    /// The current position of the cursor.
    ///
    /// It is always less than or equal to the tree length.
    position: usize,
    /// The cursor's bounded path cache: the nodes up the tree from the
    /// current leaf, lowest levels first, and the child index taken in
    /// each. Levels above the cache are recovered by re-descending.
    cache: [Option<(&'a Node<N>, usize)>; CURSOR_CACHE_SIZE],
    /// The leaf containing the current position, when the cursor is
    /// valid.
    ///
    /// The cursor is almost always valid, except between the time
    /// a metric-driven scan fails and the next descend.
    leaf: Option<&'a N::L>,
    /// The offset of `leaf` within the tree.
    offset_of_leaf: usize,
}

impl<'a, N: NodeInfo> Cursor<'a, N> {
    /// Create a new cursor at the given position.
    pub fn new(n: &'a Node<N>, position: usize) -> Cursor<'a, N> {
        assert!(position <= n.len(), "position out of range");
        let mut result = Cursor {
            root: n,
            generation: n.generation(),
            position,
            cache: [None; CURSOR_CACHE_SIZE],
            leaf: None,
            offset_of_leaf: 0,
        };
        result.descend();
        result
    }

    /// The length of the tree.
    pub fn total_len(&self) -> usize {
        self.root.len()
    }

    /// Return a reference to the root node of the tree.
    pub fn root(&self) -> &'a Node<N> {
        self.root
    }

    /// Get the current leaf of the cursor.
    ///
    /// If the cursor is valid, returns the leaf containing the current
    /// position, and the offset of the current position within the leaf.
    /// That offset is equal to the leaf length only at the end, otherwise
    /// it is less than the leaf length.
    pub fn get_leaf(&self) -> Option<(&'a N::L, usize)> {
        self.assert_current_revision();
        self.leaf.map(|l| (l, self.position - self.offset_of_leaf))
    }

    /// Set the position of the cursor.
    ///
    /// The cursor is valid after this call.
    ///
    /// Precondition: `position` is less than or equal to the length of the
    /// tree.
    pub fn set(&mut self, position: usize) {
        assert!(position <= self.root.len(), "position out of range");
        self.assert_current_revision();
        self.position = position;
        if let Some(l) = self.leaf {
            if self.position >= self.offset_of_leaf && self.position < self.offset_of_leaf + l.len()
            {
                return;
            }
        }
        // TODO: walk up tree to find leaf if nearby
        self.descend();
    }

    /// The current position of the cursor.
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Determine whether the current position is a boundary.
    ///
    /// Note: the beginning and end of the tree may or may not be boundaries,
    /// depending on the metric. If the metric is not `can_fragment`, then the
    /// beginning of every leaf is a boundary.
    pub fn is_boundary<M: Metric<N>>(&mut self) -> bool {
        self.assert_current_revision();
        if self.leaf.is_none() {
            // not at a valid position
            return false;
        }
        if self.position == 0 {
            // the start of the sequence opens a unit for every kind of
            // boundary except one that trails its unit
            return M::kind() != MetricKind::Trailing;
        }
        if self.position == self.offset_of_leaf && !M::can_fragment() {
            return true;
        }
        if self.position > self.offset_of_leaf {
            return M::is_boundary(self.leaf.unwrap(), self.position - self.offset_of_leaf);
        }
        // tricky case, at beginning of leaf, need to query end of previous
        // leaf; TODO: would be nice if we could do it another way that didn't
        // make the method &mut self.
        let l = self.prev_leaf().unwrap().0;
        let result = M::is_boundary(l, l.len());
        let _ = self.next_leaf();
        result
    }

    /// Moves the cursor to the previous boundary.
    ///
    /// When there is no previous boundary, returns `None` and the cursor
    /// becomes invalid at position 0.
    pub fn prev<M: Metric<N>>(&mut self) -> Option<usize> {
        self.assert_current_revision();
        if self.position == 0 || self.leaf.is_none() {
            self.leaf = None;
            return None;
        }
        let orig_pos = self.position;
        let offset_in_leaf = orig_pos - self.offset_of_leaf;
        if offset_in_leaf > 0 {
            let l = self.leaf.unwrap();
            if let Some(offset_in_leaf) = M::prev(l, offset_in_leaf) {
                self.position = self.offset_of_leaf + offset_in_leaf;
                return Some(self.position);
            }
        }
        // not in same leaf, need to scan backwards
        self.prev_leaf()?;
        if let Some(offset) = self.last_inside_leaf::<M>(orig_pos) {
            return Some(offset);
        }
        // Not found in the previous leaf; find the leaf with the last
        // boundary before the position with a top-down descent in the
        // metric. This handles metrics whose boundaries can skip whole
        // leaves.
        let measure = self.measure_leaf::<M>(self.position);
        if measure == 0 {
            // No boundary, saturate at the front.
            self.leaf = None;
            self.position = 0;
            self.offset_of_leaf = 0;
            return None;
        }
        self.descend_metric::<M>(measure);
        self.last_inside_leaf::<M>(orig_pos)
    }

    /// Moves the cursor to the next boundary.
    ///
    /// When there is no next boundary, returns `None` and the cursor
    /// becomes invalid at the end position.
    pub fn next<M: Metric<N>>(&mut self) -> Option<usize> {
        self.assert_current_revision();
        if self.position >= self.root.len() || self.leaf.is_none() {
            self.leaf = None;
            return None;
        }
        if let Some(offset) = self.next_inside_leaf::<M>() {
            return Some(offset);
        }
        self.next_leaf()?;
        if let Some(offset) = self.next_inside_leaf::<M>() {
            return Some(offset);
        }
        // Leaf is 0-measure at this point; find the leaf with the next
        // boundary with a top-down descent in the metric.
        let measure = self.measure_leaf::<M>(self.position);
        self.descend_metric::<M>(measure + 1);
        if let Some(offset) = self.next_inside_leaf::<M>() {
            return Some(offset);
        }
        // Not found, properly invalidate cursor.
        self.position = self.root.len();
        self.leaf = None;
        None
    }

    /// Returns the last boundary before `orig_pos` in the current leaf,
    /// treating the leaf end as a candidate.
    #[inline]
    fn last_inside_leaf<M: Metric<N>>(&mut self, orig_pos: usize) -> Option<usize> {
        let l = self.leaf.expect("inconsistent, shouldn't get here");
        let len = l.len();
        if self.offset_of_leaf + len < orig_pos && M::is_boundary(l, len) {
            let _ = self.next_leaf();
            return Some(self.position);
        }
        let offset_in_leaf = M::prev(l, len)?;
        self.position = self.offset_of_leaf + offset_in_leaf;
        Some(self.position)
    }

    #[inline]
    fn next_inside_leaf<M: Metric<N>>(&mut self) -> Option<usize> {
        let l = self.leaf.expect("inconsistent, shouldn't get here");
        let offset_in_leaf = self.position - self.offset_of_leaf;
        let offset_in_leaf = M::next(l, offset_in_leaf)?;
        if offset_in_leaf == l.len() && self.offset_of_leaf + offset_in_leaf != self.root.len() {
            // bump to the start of the next leaf, so the invariant that
            // only the last leaf is addressed at its end holds
            let _ = self.next_leaf();
        } else {
            self.position = self.offset_of_leaf + offset_in_leaf;
        }
        Some(self.position)
    }

    /// Move to beginning of next leaf.
    ///
    /// Return value: same as [`get_leaf`](#method.get_leaf).
    pub fn next_leaf(&mut self) -> Option<(&'a N::L, usize)> {
        self.assert_current_revision();
        let leaf = self.leaf?;
        self.position = self.offset_of_leaf + leaf.len();
        for i in 0..CURSOR_CACHE_SIZE {
            if self.cache[i].is_none() {
                // this means the tree ends below the cache, so we're done
                self.leaf = None;
                return None;
            }
            let (node, j) = self.cache[i].unwrap();
            if j + 1 < node.get_children().len() {
                self.cache[i] = Some((node, j + 1));
                let mut node_down = &node.get_children()[j + 1];
                for k in (0..i).rev() {
                    self.cache[k] = Some((node_down, 0));
                    node_down = &node_down.get_children()[0];
                }
                self.leaf = Some(node_down.get_leaf());
                self.offset_of_leaf = self.position;
                return self.get_leaf();
            }
        }
        if self.offset_of_leaf + self.leaf.unwrap().len() == self.root.len() {
            self.leaf = None;
            return None;
        }
        // the cache doesn't reach the root; ascend by re-descending
        self.descend();
        self.get_leaf()
    }

    /// Move to beginning of previous leaf.
    ///
    /// Return value: same as [`get_leaf`](#method.get_leaf).
    pub fn prev_leaf(&mut self) -> Option<(&'a N::L, usize)> {
        self.assert_current_revision();
        if self.offset_of_leaf == 0 {
            self.leaf = None;
            self.position = 0;
            return None;
        }
        if self.leaf.is_none() {
            // saturated at the end; re-descend to the last leaf
            self.position = self.root.len();
            self.descend();
            self.position = self.offset_of_leaf;
            return self.get_leaf();
        }
        for i in 0..CURSOR_CACHE_SIZE {
            if self.cache[i].is_none() {
                self.leaf = None;
                return None;
            }
            let (node, j) = self.cache[i].unwrap();
            if j > 0 {
                self.cache[i] = Some((node, j - 1));
                let mut node_down = &node.get_children()[j - 1];
                for k in (0..i).rev() {
                    let last_ix = node_down.get_children().len() - 1;
                    self.cache[k] = Some((node_down, last_ix));
                    node_down = &node_down.get_children()[last_ix];
                }
                let leaf = node_down.get_leaf();
                self.leaf = Some(leaf);
                self.offset_of_leaf -= leaf.len();
                self.position = self.offset_of_leaf;
                return self.get_leaf();
            }
        }
        self.position = self.offset_of_leaf - 1;
        self.descend();
        self.position = self.offset_of_leaf;
        self.get_leaf()
    }

    /// Go to the leaf containing the current position.
    ///
    /// Sets `leaf` to the leaf containing `position`, and updates `cache`
    /// and `offset_of_leaf` to be consistent.
    fn descend(&mut self) {
        let mut node = self.root;
        let mut offset = 0;
        while node.height() > 0 {
            let children = node.get_children();
            let mut i = 0;
            loop {
                if i + 1 == children.len() {
                    break;
                }
                let nextoff = offset + children[i].len();
                if nextoff > self.position {
                    break;
                }
                offset = nextoff;
                i += 1;
            }
            let cache_ix = node.height() - 1;
            if cache_ix < CURSOR_CACHE_SIZE {
                self.cache[cache_ix] = Some((node, i));
            }
            node = &children[i];
        }
        self.leaf = Some(node.get_leaf());
        self.offset_of_leaf = offset;
    }

    /// Returns the measure at the beginning of the leaf containing `pos`.
    ///
    /// This method is O(log n) no matter the current cursor state.
    fn measure_leaf<M: Metric<N>>(&self, mut pos: usize) -> usize {
        let mut node = self.root;
        let mut metric = 0;
        while node.height() > 0 {
            for child in node.get_children() {
                let len = child.len();
                if pos < len {
                    node = child;
                    break;
                }
                pos -= len;
                metric += child.measure::<M>();
            }
        }
        metric
    }

    /// Find the leaf having the given measure.
    ///
    /// This function sets `self.position` to the beginning of the leaf
    /// containing the smallest offset with the given measure, and also updates
    /// state as if [`descend`](#method.descend) was called.
    fn descend_metric<M: Metric<N>>(&mut self, mut measure: usize) {
        let mut node = self.root;
        let mut offset = 0;
        while node.height() > 0 {
            let children = node.get_children();
            let mut i = 0;
            loop {
                if i + 1 == children.len() {
                    break;
                }
                let child = &children[i];
                let child_m = child.measure::<M>();
                if child_m >= measure {
                    break;
                }
                offset += child.len();
                measure -= child_m;
                i += 1;
            }
            let cache_ix = node.height() - 1;
            if cache_ix < CURSOR_CACHE_SIZE {
                self.cache[cache_ix] = Some((node, i));
            }
            node = &children[i];
        }
        self.leaf = Some(node.get_leaf());
        self.position = offset;
        self.offset_of_leaf = offset;
    }

    #[inline]
    fn assert_current_revision(&self) {
        assert_eq!(
            self.generation,
            self.root.generation(),
            "cursor used against a mutated revision"
        );
    }
}

/// Cursors compare by position; comparing cursors into different trees, or
/// different revisions of one tree, is a programmer error.
impl<'a, N: NodeInfo> PartialEq for Cursor<'a, N> {
    fn eq(&self, other: &Cursor<'a, N>) -> bool {
        assert!(
            self.root.ptr_eq(other.root) && self.generation == other.generation,
            "cursors compared across unrelated trees"
        );
        self.position == other.position
    }
}

impl<'a, N: NodeInfo> PartialOrd for Cursor<'a, N> {
    fn partial_cmp(&self, other: &Cursor<'a, N>) -> Option<Ordering> {
        assert!(
            self.root.ptr_eq(other.root) && self.generation == other.generation,
            "cursors compared across unrelated trees"
        );
        Some(self.position.cmp(&other.position))
    }
}
