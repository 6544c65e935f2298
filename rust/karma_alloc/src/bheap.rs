// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Min-heap with a broadcast offset.
//!
//! Water-filling repeatedly lowers every remaining demand by the same
//! amount. Rather than touching each entry, the heap keeps a single
//! `offset` that is added to every stored key on the way out, so
//! `add_all()` is O(1) and the relative order of entries never changes.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Default)]
pub(crate) struct BroadcastHeap {
    // Stored keys are `value - offset` at insertion time.
    heap: BinaryHeap<Reverse<(i64, u32)>>,
    offset: i64,
}

impl BroadcastHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: u32, value: i64) {
        self.heap.push(Reverse((value - self.offset, id)));
    }

    /// Remove the entry with the smallest value. Equal values pop in
    /// ascending ID order.
    pub fn pop(&mut self) -> Option<(u32, i64)> {
        self.heap
            .pop()
            .map(|Reverse((key, id))| (id, key + self.offset))
    }

    pub fn peek_min(&self) -> Option<i64> {
        self.heap.peek().map(|Reverse((key, _))| key + self.offset)
    }

    /// Shift every entry currently in the heap by `delta`.
    pub fn add_all(&mut self, delta: i64) {
        self.offset += delta;
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
