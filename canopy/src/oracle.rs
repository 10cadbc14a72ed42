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

//! Exact nearest neighbors by brute force. This is what recall is measured against, so it is computed
//! once per slice and shared by every tree count swept on that slice.

use log::debug;
use rayon::prelude::*;
use std::time::Instant;

use crate::errors::{CanopyError, CanopyResult};
use crate::forest::query_tools::{KnnQueryHeap, SingletonQueryHeap};
use vectorcloud::*;

/// The exact `k` nearest neighbors of every query, in query order.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    k: usize,
    neighbors: Vec<Vec<PointIndex>>,
}

impl GroundTruth {
    /// Computes the exact neighbors of each query in parallel.
    pub fn compute<M: Metric>(
        corpus: &DataRam<M>,
        queries: &DataRam<M>,
        k: usize,
    ) -> CanopyResult<GroundTruth> {
        if corpus.dim() != queries.dim() {
            return Err(CanopyError::QueryError(format!(
                "the queries have dimension {} but the corpus has dimension {}",
                queries.dim(),
                corpus.dim()
            )));
        }
        let now = Instant::now();
        let indexes = corpus.reference_indexes();
        let neighbors = queries
            .iter()
            .collect::<Vec<&[f32]>>()
            .par_iter()
            .map(|query| {
                let dists = corpus.distances_to_point(query, &indexes)?;
                let mut heap = KnnQueryHeap::new(k);
                heap.push_outliers(&indexes, &dists);
                Ok(heap.unpack().into_iter().map(|(_, i)| i).collect())
            })
            .collect::<CanopyResult<Vec<Vec<PointIndex>>>>()?;
        debug!(
            "Ground truth of {} queries over {} points took {:?}",
            queries.len(),
            corpus.len(),
            now.elapsed()
        );
        Ok(GroundTruth { k, neighbors })
    }

    /// The `k` this was computed for
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of queries
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// If there are no queries
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Exact neighbors of a query, closest first. Fewer than `k` when the corpus is smaller than `k`.
    pub fn neighbors(&self, query: usize) -> Option<&[PointIndex]> {
        self.neighbors.get(query).map(|n| n.as_slice())
    }

    /// Fraction of the exact neighbors of `query` that the approximate answer found.
    /// The denominator is the number of exact neighbors, `k` unless the corpus is smaller.
    pub fn recall(&self, query: usize, approximate: &[PointIndex]) -> Option<f32> {
        let exact = self.neighbors(query)?;
        if exact.is_empty() {
            return Some(1.0);
        }
        let found = exact.iter().filter(|i| approximate.contains(i)).count();
        Some(found as f32 / exact.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_neighbors_on_a_line() {
        let corpus: DataRam<L2> = DataRam::new((0..100).map(|i| i as f32).collect(), 1).unwrap();
        let queries: DataRam<L2> = DataRam::new(vec![10.1, 98.9], 1).unwrap();
        let truth = GroundTruth::compute(&corpus, &queries, 3).unwrap();
        assert_eq!(truth.len(), 2);
        assert_eq!(truth.neighbors(0).unwrap(), &[10, 11, 9]);
        assert_eq!(truth.neighbors(1).unwrap(), &[99, 98, 97]);
        assert!(truth.neighbors(2).is_none());
    }

    #[test]
    fn recall_counts_the_overlap() {
        let corpus: DataRam<L2> = DataRam::new((0..10).map(|i| i as f32).collect(), 1).unwrap();
        let queries: DataRam<L2> = DataRam::new(vec![0.0], 1).unwrap();
        let truth = GroundTruth::compute(&corpus, &queries, 4).unwrap();
        assert_approx_eq!(truth.recall(0, &[0, 1, 2, 3]).unwrap(), 1.0);
        assert_approx_eq!(truth.recall(0, &[3, 2, 9, 8]).unwrap(), 0.5);
        assert_approx_eq!(truth.recall(0, &[]).unwrap(), 0.0);
    }

    #[test]
    fn small_corpus_shrinks_k() {
        let corpus: DataRam<L2> = DataRam::new(vec![0.0, 1.0], 1).unwrap();
        let queries: DataRam<L2> = DataRam::new(vec![0.0], 1).unwrap();
        let truth = GroundTruth::compute(&corpus, &queries, 10).unwrap();
        assert_eq!(truth.neighbors(0).unwrap().len(), 2);
        assert_approx_eq!(truth.recall(0, &[1, 0]).unwrap(), 1.0);
    }

    #[test]
    fn mismatched_queries_are_rejected() {
        let corpus: DataRam<L2> = DataRam::new(vec![0.0; 4], 2).unwrap();
        let queries: DataRam<L2> = DataRam::new(vec![0.0; 3], 3).unwrap();
        assert!(GroundTruth::compute(&corpus, &queries, 1).is_err());
    }
}
