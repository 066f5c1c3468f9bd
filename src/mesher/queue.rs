// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Priority queue of elements violating the refinement criteria

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone)]
struct Entry<T> {
    severity: f64,
    /// Sorted vertex ids of the element; smaller ids win ties
    key: [usize; 4],
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity
            .total_cmp(&other.severity)
            .then_with(|| other.key.cmp(&self.key))
    }
}

/// Max-heap keyed by violation severity with a deterministic tie-break
///
/// Entries may go stale when the element they refer to is destroyed;
/// callers validate popped items.
#[derive(Debug, Clone)]
pub struct WorkQueue<T> {
    heap: BinaryHeap<Entry<T>>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self { heap: BinaryHeap::new() }
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, severity: f64, key: [usize; 4], item: T) {
        self.heap.push(Entry { severity, key, item });
    }

    /// Worst element first
    pub fn pop(&mut self) -> Option<(f64, T)> {
        self.heap.pop().map(|e| (e.severity, e.item))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_first() {
        let mut queue = WorkQueue::new();
        queue.push(1.5, [0, 1, 2, 3], "mild");
        queue.push(4.0, [5, 6, 7, 8], "severe");
        queue.push(2.0, [1, 2, 3, 4], "medium");
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some((4.0, "severe")));
        assert_eq!(queue.pop(), Some((2.0, "medium")));
        assert_eq!(queue.pop(), Some((1.5, "mild")));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_ties_break_on_vertex_ids() {
        let mut queue = WorkQueue::new();
        queue.push(2.0, [4, 5, 6, 7], 'b');
        queue.push(2.0, [1, 5, 6, 7], 'a');
        queue.push(2.0, [4, 5, 6, 9], 'c');
        let order: Vec<char> = std::iter::from_fn(|| queue.pop().map(|(_, c)| c)).collect();
        assert_eq!(order, vec!['a', 'b', 'c']);
        assert!(queue.is_empty());
    }
}
