/*
* Licensed to Elasticsearch B.V. under one or more contributor
* license agreements. See the NOTICE file distributed with
* this work for additional information regarding copyright
* ownership. Elasticsearch B.V. licenses this file to you under
* the Apache License, Version 2.0 (the "License"); you may
* not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
*  http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing,
* software distributed under the License is distributed on an
* "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
* KIND, either express or implied.  See the License for the
* specific language governing permissions and limitations
* under the License.
*/

//! Tools and data structures for assisting forest queries.

use fxhash::FxBuildHasher;
use hashbrown::HashSet;
use std::collections::BinaryHeap;
use std::f32;

use super::query_items::{QueryNode, QuerySingleton};
use super::*;

/// The heaps for a forest KNN query. There are 2 heaps, the node max-heap and the distance max-heap.
/// The node heap holds the tree nodes we have not descended into yet, keyed by how far on the query's side
/// of every hyperplane above them they are. Popping it walks all the trees at once, best first.
///
/// The distance heap is for the output KNN, each point that's pushed onto the heap is pushed onto this distance heap.
/// If the heap grows past K it's popped off. The oracle uses only this half of the struct.
///
/// The same point sits in a leaf of every tree, so we also have a HashSet of visited points. The forest only
/// computes the distance to a point the first time it's visited, and the search budget counts distinct points.
#[derive(Debug)]
pub struct KnnQueryHeap {
    node_heap: BinaryHeap<QueryNode>,
    known_indexes: HashSet<usize, FxBuildHasher>,
    dist_heap: BinaryHeap<QuerySingleton>,
    k: usize,
}

impl SingletonQueryHeap for KnnQueryHeap {
    /// Shove a bunch of single points onto the heap
    fn push_outliers(&mut self, indexes: &[usize], dists: &[f32]) {
        for (i, d) in indexes.iter().zip(dists) {
            match self.dist_heap.peek() {
                Some(my_dist) => {
                    if !(my_dist.dist < *d && self.dist_heap.len() >= self.k) {
                        self.dist_heap.push(QuerySingleton::new(*i, *d));
                    }
                }
                None => self.dist_heap.push(QuerySingleton::new(*i, *d)),
            };
            while self.dist_heap.len() > self.k {
                self.dist_heap.pop();
            }
        }
    }
}

impl KnnQueryHeap {
    /// Creates a new KNN heap that keeps the `k` closest points.
    pub fn new(k: usize) -> KnnQueryHeap {
        KnnQueryHeap {
            node_heap: BinaryHeap::new(),
            known_indexes: HashSet::default(),
            dist_heap: BinaryHeap::with_capacity(k + 1),
            k,
        }
    }

    /// Queues a tree node to be explored.
    pub(crate) fn push_node(&mut self, priority: f32, tree: usize, node: usize) {
        self.node_heap.push(QueryNode {
            priority,
            tree,
            node,
        });
    }

    /// The queued node the query is deepest inside of. This pops that node.
    pub(crate) fn closest_unvisited_node(&mut self) -> Option<(f32, usize, usize)> {
        self.node_heap.pop().map(|n| (n.priority, n.tree, n.node))
    }

    /// Marks a point as visited. Returns false if it was already visited.
    pub fn visit(&mut self, index: usize) -> bool {
        self.known_indexes.insert(index)
    }

    /// Number of distinct points visited so far
    pub fn visited_len(&self) -> usize {
        self.known_indexes.len()
    }

    /// The current number of points on the distance heap
    pub fn len(&self) -> usize {
        self.dist_heap.len()
    }

    /// If the distance heap is empty
    pub fn is_empty(&self) -> bool {
        self.dist_heap.is_empty()
    }

    /// The current number of tree nodes still queued
    pub fn node_len(&self) -> usize {
        self.node_heap.len()
    }

    /// The current maximum distance to the query point. If the distance heap isn't full it returns the maximum float value.
    pub fn max_dist(&self) -> f32 {
        if self.len() < self.k {
            f32::MAX
        } else {
            self.dist_heap.peek().map(|x| x.dist).unwrap_or(f32::MAX)
        }
    }

    /// Unpacks the distance heap, closest first. This consumes the query heap.
    pub fn unpack(self) -> Vec<(f32, usize)> {
        self.dist_heap
            .into_sorted_vec()
            .into_iter()
            .map(|el| (el.dist, el.index))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn unpacking_has_correct_order() {
        let mut heap = KnnQueryHeap::new(4);
        heap.push_outliers(&[2, 4, 6, 8], &[0.2, 0.4, 0.6, 0.8]);
        heap.push_outliers(&[1, 3, 5, 7], &[0.1, 0.3, 0.5, 0.7]);
        assert_eq!(heap.len(), 4);
        assert_approx_eq!(heap.max_dist(), 0.4);
        let unpack = heap.unpack();

        for i in 1..5 {
            assert_eq!(unpack[i - 1].1, i);
        }
    }

    #[test]
    fn max_dist_is_open_until_full() {
        let mut heap = KnnQueryHeap::new(3);
        heap.push_outliers(&[0, 1], &[0.5, 0.25]);
        assert_eq!(heap.max_dist(), f32::MAX);
        heap.push_outliers(&[2], &[1.0]);
        assert_approx_eq!(heap.max_dist(), 1.0);
    }

    #[test]
    fn visits_are_counted_once() {
        let mut heap = KnnQueryHeap::new(1);
        assert!(heap.visit(3));
        assert!(!heap.visit(3));
        assert!(heap.visit(4));
        assert_eq!(heap.visited_len(), 2);
    }

    #[test]
    fn nodes_come_out_best_first() {
        let mut heap = KnnQueryHeap::new(1);
        heap.push_node(f32::INFINITY, 0, 0);
        heap.push_node(0.5, 1, 3);
        heap.push_node(-0.5, 1, 4);
        assert_eq!(heap.node_len(), 3);
        assert_eq!(heap.closest_unvisited_node().map(|n| n.1), Some(0));
        assert_eq!(heap.closest_unvisited_node().map(|n| n.2), Some(3));
        assert_eq!(heap.closest_unvisited_node().map(|n| n.2), Some(4));
        assert!(heap.closest_unvisited_node().is_none());
    }
}
