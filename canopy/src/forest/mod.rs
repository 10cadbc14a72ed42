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

//! # Random Projection Forest
//! The ANN index being calibrated. A forest is a set of independent random projection trees over the
//! same slice; more trees means more chances for a query's true neighbors to share a leaf with it,
//! at the cost of build time and ram.
//!
//! ## Parameter Guide
//! `n_trees` is the parameter canopy calibrates. The `leaf_cutoff` controls how many points a leaf is
//! allowed to hold, a smaller value gives deeper trees. The `search_k_multiplier` controls how many
//! distinct points a query looks at before ranking them exactly, `k * n_trees * search_k_multiplier`.
//! Once that budget covers the whole slice a query is exact.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{CanopyError, CanopyResult};
use vectorcloud::*;

pub mod builders;
pub use builders::ForestBuilder;

pub mod query_tools;
use query_tools::{KnnQueryHeap, SingletonQueryHeap};

mod tree;
use tree::{RpTree, TreeNode, ROOT};

/// Container for the parameters governing the construction and the queries of a forest
#[derive(Debug, Clone)]
pub struct ForestParameters {
    /// Number of trees
    pub n_trees: usize,
    /// If a node covers less than or equal to this number of points, it becomes a leaf.
    pub leaf_cutoff: usize,
    /// Scales the number of distinct points a query looks at
    pub search_k_multiplier: usize,
    /// The seed to use for deterministic trees. This is xor-ed with the tree index to create a seed for `rand::rngs::SmallRng`.
    ///
    /// Pass in None if you want to use the host os's entropy instead.
    pub rng_seed: Option<u64>,
    /// Above 1 the build shows a progress bar
    pub verbosity: u32,
    /// Builds and queries fail once this instant has passed
    pub deadline: Option<Instant>,
    /// The time allowed, only used for reporting a timeout
    pub timeout: Option<Duration>,
}

impl ForestParameters {
    /// Errors with `Timeout` once the deadline has passed.
    pub fn check_deadline(&self) -> CanopyResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(CanopyError::Timeout {
                limit_secs: self.timeout.map(|t| t.as_secs()).unwrap_or(0),
            }),
            _ => Ok(()),
        }
    }

    /// Distinct points a query for `k` neighbors looks at
    pub fn search_k(&self, k: usize) -> usize {
        k.saturating_mul(self.n_trees)
            .saturating_mul(self.search_k_multiplier.max(1))
    }
}

/// A built forest. Immutable, so it can be queried from many threads at once.
#[derive(Debug)]
pub struct Forest<M: Metric> {
    parameters: Arc<ForestParameters>,
    data: DataRam<M>,
    trees: Vec<RpTree>,
}

impl<M: Metric> Forest<M> {
    /// The parameters this forest was built with
    pub fn parameters(&self) -> &Arc<ForestParameters> {
        &self.parameters
    }

    /// The indexed slice
    pub fn data(&self) -> &DataRam<M> {
        &self.data
    }

    /// Number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of indexed points
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// If nothing is indexed. A built forest is never empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Total number of tree nodes, a proxy for the memory the trees take
    pub fn node_count(&self) -> usize {
        self.trees.iter().map(|t| t.nodes.len()).sum()
    }

    /// Approximate `k` nearest neighbors of the point, closest first, as `(distance, index)`.
    pub fn knn(&self, point: &[f32], k: usize) -> CanopyResult<Vec<(f32, PointIndex)>> {
        self.parameters.check_deadline()?;
        if point.len() != self.data.dim() {
            return Err(CanopyError::QueryError(format!(
                "the query has dimension {} but the forest indexes dimension {}",
                point.len(),
                self.data.dim()
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        // Nothing is left to find once every point was seen
        let search_k = self.parameters.search_k(k).min(self.data.len());
        let mut query_heap = KnnQueryHeap::new(k);
        for tree in 0..self.trees.len() {
            query_heap.push_node(f32::INFINITY, tree, ROOT);
        }
        let mut candidates = Vec::with_capacity(search_k);
        while query_heap.visited_len() < search_k {
            let (priority, tree, node) = match query_heap.closest_unvisited_node() {
                Some(next) => next,
                None => break,
            };
            match &self.trees[tree].nodes[node] {
                TreeNode::Leaf(indexes) => {
                    for i in indexes {
                        if query_heap.visit(*i) {
                            candidates.push(*i);
                        }
                    }
                }
                TreeNode::Split {
                    normal,
                    offset,
                    children,
                } => {
                    let margin = TreeNode::margin(normal, *offset, point);
                    query_heap.push_node(priority.min(margin), tree, children[0]);
                    query_heap.push_node(priority.min(-margin), tree, children[1]);
                }
            }
        }
        let dists = self.data.distances_to_point(point, &candidates)?;
        query_heap.push_outliers(&candidates, &dists);
        Ok(query_heap.unpack())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn line(n: usize) -> DataRam<L2> {
        let data: Vec<f32> = (0..n).flat_map(|i| vec![i as f32, 0.5]).collect();
        DataRam::new(data, 2).unwrap()
    }

    #[test]
    fn exhaustive_budget_is_exact() {
        let data = line(200);
        let forest = ForestBuilder::new()
            .set_n_trees(4)
            .set_leaf_cutoff(8)
            .set_rng_seed(0)
            .build(data)
            .unwrap();
        // 60 * 4 > 200, every point is looked at
        let knn = forest.knn(&[100.2, 0.5], 60).unwrap();
        assert_eq!(knn.len(), 60);
        assert_eq!(knn[0].1, 100);
        assert_eq!(knn[1].1, 101);
        for pair in knn.windows(2) {
            assert!(pair[0].0 <= pair[1].0);
        }
    }

    #[test]
    fn small_budget_finds_the_obvious_neighbor() {
        let data = line(1000);
        let forest = ForestBuilder::new()
            .set_n_trees(8)
            .set_leaf_cutoff(16)
            .set_rng_seed(1)
            .build(data)
            .unwrap();
        // The first leaf reached holds the query's cell, so its best point is one of the two around it
        let knn = forest.knn(&[500.25, 0.5], 1).unwrap();
        assert_eq!(knn.len(), 1);
        assert!(knn[0].0 <= 1.0);
    }

    #[test]
    fn query_dimension_is_checked() {
        let forest = ForestBuilder::new()
            .set_n_trees(2)
            .set_rng_seed(0)
            .build(line(50))
            .unwrap();
        match forest.knn(&[1.0, 2.0, 3.0], 5) {
            Err(CanopyError::QueryError(..)) => (),
            other => panic!("expected a query error, got {:?}", other),
        }
        assert!(forest.knn(&[1.0, 2.0], 0).unwrap().is_empty());
    }

    #[test]
    fn passed_deadline_times_out() {
        let mut parameters = ForestParameters {
            n_trees: 1,
            leaf_cutoff: 32,
            search_k_multiplier: 1,
            rng_seed: Some(0),
            verbosity: 0,
            deadline: Some(Instant::now()),
            timeout: Some(Duration::from_secs(0)),
        };
        match parameters.check_deadline() {
            Err(CanopyError::Timeout { limit_secs }) => assert_eq!(limit_secs, 0),
            other => panic!("expected a timeout, got {:?}", other),
        }
        parameters.deadline = None;
        assert!(parameters.check_deadline().is_ok());
        assert_eq!(parameters.search_k(10), 10);
    }
}
