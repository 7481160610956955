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

//! Closed-open intervals, the interval equivalent of `Range<usize>`.

use std::cmp::{max, min};
use std::fmt;
use std::ops::{Range, RangeFrom, RangeFull, RangeInclusive, RangeTo, RangeToInclusive};

/// A contiguous range of base units, closed at the start and open at
/// the end.
///
/// It is an invariant that `start <= end`. An interval where `end < start`
/// cannot be constructed; an attempt to do so yields the empty interval
/// at `start`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

impl Interval {
    pub fn new(start: usize, end: usize) -> Interval {
        Interval { start, end: max(start, end) }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn start_end(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    // The following three methods define a trisection; exactly one is true.
    // (similar to std::cmp::Ordering, but "Equal" is not the same as "contains")

    /// The interval is before the point (the point is after the interval).
    pub fn is_before(&self, val: usize) -> bool {
        self.end <= val
    }

    /// The point is inside the interval.
    pub fn contains(&self, val: usize) -> bool {
        self.start <= val && val < self.end
    }

    /// The interval is after the point (the point is before the interval).
    pub fn is_after(&self, val: usize) -> bool {
        self.start > val
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    // impl BitAnd would be completely valid for this
    pub fn intersect(&self, other: Interval) -> Interval {
        let start = max(self.start, other.start);
        let end = min(self.end, other.end);
        Interval { start, end: max(start, end) }
    }

    /// The smallest interval enclosing both inputs; if the inputs are
    /// disjoint, fills in the hole.
    pub fn union(&self, other: Interval) -> Interval {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return *self;
        }
        let start = min(self.start, other.start);
        let end = max(self.end, other.end);
        Interval { start, end }
    }

    /// The part of self that precedes other.
    pub fn prefix(&self, other: Interval) -> Interval {
        Interval { start: min(self.start, other.start), end: min(self.end, other.start) }
    }

    /// The part of self that follows other.
    pub fn suffix(&self, other: Interval) -> Interval {
        Interval { start: max(self.start, other.end), end: max(self.end, other.end) }
    }

    // could impl Add trait, but that's probably too cute
    pub fn translate(&self, amount: usize) -> Interval {
        Interval { start: self.start + amount, end: self.end + amount }
    }

    // as above for Sub trait
    pub fn translate_neg(&self, amount: usize) -> Interval {
        debug_assert!(self.start >= amount);
        Interval { start: self.start - amount, end: self.end - amount }
    }

    pub fn size(&self) -> usize {
        self.end - self.start
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {})", self.start(), self.end())
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A trait for types that represent unbounded ranges; they need an explicit
/// upper bound in order to be converted to `Interval`s.
///
/// This exists so that the various `Range` types in `std::ops`, as well as
/// `Interval` itself, can all be passed to interval-taking methods.
pub trait IntervalBounds {
    fn into_interval(self, upper_bound: usize) -> Interval;
}

impl IntervalBounds for Interval {
    fn into_interval(self, _upper_bound: usize) -> Interval {
        self
    }
}

impl IntervalBounds for Range<usize> {
    fn into_interval(self, _upper_bound: usize) -> Interval {
        Interval::new(self.start, self.end)
    }
}

impl IntervalBounds for RangeTo<usize> {
    fn into_interval(self, _upper_bound: usize) -> Interval {
        Interval::new(0, self.end)
    }
}

impl IntervalBounds for RangeFrom<usize> {
    fn into_interval(self, upper_bound: usize) -> Interval {
        Interval::new(self.start, upper_bound)
    }
}

impl IntervalBounds for RangeFull {
    fn into_interval(self, upper_bound: usize) -> Interval {
        Interval::new(0, upper_bound)
    }
}

impl IntervalBounds for RangeInclusive<usize> {
    fn into_interval(self, upper_bound: usize) -> Interval {
        Interval::new(*self.start(), self.end().saturating_add(1).min(upper_bound))
    }
}

impl IntervalBounds for RangeToInclusive<usize> {
    fn into_interval(self, upper_bound: usize) -> Interval {
        Interval::new(0, self.end.saturating_add(1).min(upper_bound))
    }
}
