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

//! # Benchmark Runner
//! One run builds a forest with the configured number of trees over the corpus, asks it for the `k`
//! nearest neighbors of every query and compares them with the exact ones. A failed run becomes an
//! errored sample; it never takes the rest of the sweep down.

use log::debug;
use rayon::prelude::*;
use std::time::{Duration, Instant};

use crate::config::CalibrationConfig;
use crate::errors::{CanopyError, CanopyResult};
use crate::forest::ForestBuilder;
use crate::oracle::GroundTruth;
use crate::store::{BuildMetrics, RecallSample};
use core_canopy::SampleKey;
use vectorcloud::*;

/// The point in the calibration space a run measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BenchmarkConfig {
    /// Number of corpus vectors indexed, `n`
    pub corpus_size: usize,
    /// Dimensionality of the vectors, `d`
    pub dimensions: usize,
    /// Number of trees in the forest
    pub tree_count: usize,
    /// The metric the forest and the oracle use
    pub metric: MetricKind,
}

impl BenchmarkConfig {
    /// A configuration
    pub fn new(
        corpus_size: usize,
        dimensions: usize,
        tree_count: usize,
        metric: MetricKind,
    ) -> BenchmarkConfig {
        BenchmarkConfig {
            corpus_size,
            dimensions,
            tree_count,
            metric,
        }
    }

    /// The key its sample is stored under. Fails if a field does not fit the key.
    pub fn key(&self) -> CanopyResult<SampleKey> {
        SampleKey::try_new(self.dimensions, self.corpus_size, self.tree_count).ok_or_else(|| {
            CanopyError::InvalidConfig(format!(
                "d={} n={} t={} does not fit in a sample key",
                self.dimensions, self.corpus_size, self.tree_count
            ))
        })
    }
}

/// Recall of a run and what its forest cost to build
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Mean recall over the queries
    pub recall: f32,
    /// Build time and size of the forest
    pub build: BuildMetrics,
}

/// Measures recall. Deterministic for a fixed seed, which every sample records.
#[derive(Debug, Clone)]
pub struct BenchmarkRunner {
    k: usize,
    leaf_cutoff: usize,
    search_k_multiplier: usize,
    rng_seed: u64,
    timeout: Option<Duration>,
}

impl BenchmarkRunner {
    /// A runner using the forest parameters, the seed and the timeout of the configuration
    pub fn new(config: &CalibrationConfig) -> BenchmarkRunner {
        BenchmarkRunner {
            k: config.k,
            leaf_cutoff: config.leaf_cutoff,
            search_k_multiplier: config.search_k_multiplier,
            rng_seed: config.rng_seed,
            timeout: config.run_timeout,
        }
    }

    /// The seed every forest is built from
    pub fn seed(&self) -> u64 {
        self.rng_seed
    }

    /// The number of neighbors recall is computed over
    pub fn k(&self) -> usize {
        self.k
    }

    /// Runs one configuration against a corpus and queries, computing the exact neighbors first.
    pub fn run<M: Metric>(
        &self,
        config: &BenchmarkConfig,
        dataset: &str,
        corpus: &DataRam<M>,
        queries: &DataRam<M>,
    ) -> CanopyResult<RecallSample> {
        let key = config.key()?;
        let outcome = GroundTruth::compute(corpus, queries, self.k)
            .and_then(|truth| self.measure(config, corpus, queries, &truth));
        Ok(self.sample(dataset, key, outcome))
    }

    /// Runs one configuration with exact neighbors computed beforehand.
    pub fn run_with_truth<M: Metric>(
        &self,
        config: &BenchmarkConfig,
        dataset: &str,
        corpus: &DataRam<M>,
        queries: &DataRam<M>,
        truth: &GroundTruth,
    ) -> CanopyResult<RecallSample> {
        let key = config.key()?;
        let outcome = self.measure(config, corpus, queries, truth);
        Ok(self.sample(dataset, key, outcome))
    }

    fn sample(
        &self,
        dataset: &str,
        key: SampleKey,
        outcome: CanopyResult<Measurement>,
    ) -> RecallSample {
        match outcome {
            Ok(m) => {
                RecallSample::measured(dataset, key, self.rng_seed, m.recall).with_build(m.build)
            }
            Err(e) => RecallSample::errored(dataset, key, self.rng_seed, e),
        }
    }

    /// Mean recall over the queries of a forest built for the configuration, with the cost of the build.
    pub fn measure<M: Metric>(
        &self,
        config: &BenchmarkConfig,
        corpus: &DataRam<M>,
        queries: &DataRam<M>,
        truth: &GroundTruth,
    ) -> CanopyResult<Measurement> {
        if config.metric != M::kind() {
            return Err(CanopyError::IndexBuildError(format!(
                "the run asks for {} but the data is measured with {}",
                config.metric,
                M::name()
            )));
        }
        if corpus.dim() != config.dimensions {
            return Err(CanopyError::IndexBuildError(format!(
                "the corpus has dimension {} instead of {}",
                corpus.dim(),
                config.dimensions
            )));
        }
        if queries.dim() != corpus.dim() {
            return Err(CanopyError::QueryError(format!(
                "the queries have dimension {} but the corpus has dimension {}",
                queries.dim(),
                corpus.dim()
            )));
        }
        if truth.len() != queries.len() {
            return Err(CanopyError::QueryError(format!(
                "{} queries but exact neighbors for {}",
                queries.len(),
                truth.len()
            )));
        }
        if queries.is_empty() {
            return Err(CanopyError::QueryError("there are no queries".to_string()));
        }

        let now = Instant::now();
        let mut builder = ForestBuilder::new();
        builder
            .set_n_trees(config.tree_count)
            .set_leaf_cutoff(self.leaf_cutoff)
            .set_search_k_multiplier(self.search_k_multiplier)
            .set_rng_seed(self.rng_seed);
        if let Some(timeout) = self.timeout {
            builder.set_timeout(timeout);
        }
        let forest = builder.build(corpus.clone())?;
        let build = BuildMetrics {
            build_millis: now.elapsed().as_millis() as u64,
            node_count: forest.node_count(),
        };

        let recalls = queries
            .iter()
            .collect::<Vec<&[f32]>>()
            .par_iter()
            .enumerate()
            .map(|(i, query)| {
                let found: Vec<PointIndex> = forest
                    .knn(query, self.k)?
                    .into_iter()
                    .map(|(_, index)| index)
                    .collect();
                truth.recall(i, &found).ok_or_else(|| {
                    CanopyError::QueryError(format!("no exact neighbors for query {}", i))
                })
            })
            .collect::<CanopyResult<Vec<f32>>>()?;
        let recall = recalls.iter().sum::<f32>() / recalls.len() as f32;
        debug!(
            "n={} d={} t={} recall {:.4}, built {} nodes in {}ms, queried in {:?}",
            config.corpus_size,
            config.dimensions,
            config.tree_count,
            recall,
            build.node_count,
            build.build_millis,
            now.elapsed()
        );
        Ok(Measurement { recall, build })
    }
}
