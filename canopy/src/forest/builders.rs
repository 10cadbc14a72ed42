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

//! Builds the trees of a forest in parallel, one seeded rng per tree.

use super::tree::RpTree;
use super::*;
use log::debug;
use pbr::ProgressBar;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::Mutex;

/// A construction object for a forest. See [`ForestParameters`] for docs
#[derive(Debug, Clone)]
pub struct ForestBuilder {
    pub(crate) n_trees: usize,
    pub(crate) leaf_cutoff: usize,
    pub(crate) search_k_multiplier: usize,
    pub(crate) verbosity: u32,
    pub(crate) rng_seed: Option<u64>,
    pub(crate) timeout: Option<Duration>,
}

impl Default for ForestBuilder {
    fn default() -> ForestBuilder {
        ForestBuilder {
            n_trees: 1,
            leaf_cutoff: 32,
            search_k_multiplier: 1,
            verbosity: 0,
            rng_seed: None,
            timeout: None,
        }
    }
}

impl ForestBuilder {
    /// Creates a new builder with sensible defaults.
    pub fn new() -> ForestBuilder {
        ForestBuilder::default()
    }

    /// See [`ForestParameters`] for docs
    pub fn set_n_trees(&mut self, x: usize) -> &mut Self {
        self.n_trees = x;
        self
    }
    /// See [`ForestParameters`] for docs
    pub fn set_leaf_cutoff(&mut self, x: usize) -> &mut Self {
        self.leaf_cutoff = x;
        self
    }
    /// See [`ForestParameters`] for docs
    pub fn set_search_k_multiplier(&mut self, x: usize) -> &mut Self {
        self.search_k_multiplier = x;
        self
    }
    /// See [`ForestParameters`] for docs
    pub fn set_verbosity(&mut self, x: u32) -> &mut Self {
        self.verbosity = x;
        self
    }
    /// See [`ForestParameters`] for docs
    pub fn set_rng_seed(&mut self, x: u64) -> &mut Self {
        self.rng_seed = Some(x);
        self
    }
    /// The time the build and every query afterwards may take, counted from the call to `build`.
    pub fn set_timeout(&mut self, x: Duration) -> &mut Self {
        self.timeout = Some(x);
        self
    }

    /// Builds the trees in parallel over the slice.
    pub fn build<M: Metric>(&self, data: DataRam<M>) -> CanopyResult<Forest<M>> {
        if data.is_empty() {
            return Err(CanopyError::IndexBuildError(format!(
                "{} holds no vectors",
                data.name()
            )));
        }
        if self.n_trees == 0 {
            return Err(CanopyError::IndexBuildError(
                "a forest needs at least one tree".to_string(),
            ));
        }
        let now = Instant::now();
        let parameters = Arc::new(ForestParameters {
            n_trees: self.n_trees,
            leaf_cutoff: self.leaf_cutoff.max(1),
            search_k_multiplier: self.search_k_multiplier.max(1),
            rng_seed: self.rng_seed,
            verbosity: self.verbosity,
            deadline: self.timeout.map(|t| now + t),
            timeout: self.timeout,
        });

        let pb = if parameters.verbosity > 1 {
            let mut pb = ProgressBar::new(parameters.n_trees as u64);
            pb.format("╢▌▌░╟");
            Some(Mutex::new(pb))
        } else {
            None
        };

        let trees = (0..parameters.n_trees)
            .into_par_iter()
            .map(|tree| {
                parameters.check_deadline()?;
                let mut small_rng: SmallRng = match parameters.rng_seed {
                    Some(seed) => SmallRng::seed_from_u64(seed ^ tree as u64),
                    None => SmallRng::from_entropy(),
                };
                let tree = RpTree::build(&data, parameters.leaf_cutoff, &mut small_rng)?;
                if let Some(pb) = &pb {
                    if let Ok(mut pb) = pb.lock() {
                        pb.inc();
                    }
                }
                Ok(tree)
            })
            .collect::<CanopyResult<Vec<RpTree>>>()?;

        if let Some(pb) = pb {
            if let Ok(mut pb) = pb.into_inner() {
                pb.finish();
            }
        }
        debug!(
            "Built {} trees over {} points of {} in {:?}",
            trees.len(),
            data.len(),
            data.name(),
            now.elapsed()
        );
        Ok(Forest {
            parameters,
            data,
            trees,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::line;
    use super::*;

    #[test]
    fn empty_corpus_is_a_build_error() {
        let empty = DataRam::<L2>::new(Vec::new(), 4).unwrap();
        match ForestBuilder::new().set_n_trees(3).build(empty) {
            Err(CanopyError::IndexBuildError(..)) => (),
            other => panic!("expected a build error, got {:?}", other),
        }
    }

    #[test]
    fn zero_trees_is_a_build_error() {
        match ForestBuilder::new().set_n_trees(0).build(line(10)) {
            Err(CanopyError::IndexBuildError(..)) => (),
            other => panic!("expected a build error, got {:?}", other),
        }
    }

    #[test]
    fn builds_the_requested_trees() {
        let forest = ForestBuilder::new()
            .set_n_trees(5)
            .set_leaf_cutoff(4)
            .set_rng_seed(38)
            .build(line(100))
            .unwrap();
        assert_eq!(forest.n_trees(), 5);
        assert_eq!(forest.len(), 100);
        assert!(forest.node_count() >= 5 * (2 * 100 / 4 - 1) / 2);
    }

    #[test]
    fn seeded_forests_answer_alike() {
        let mut builder = ForestBuilder::new();
        builder.set_n_trees(3).set_leaf_cutoff(4).set_rng_seed(5);
        let a = builder.build(line(300)).unwrap();
        let b = builder.build(line(300)).unwrap();
        assert_eq!(
            a.knn(&[42.3, 0.5], 5).unwrap(),
            b.knn(&[42.3, 0.5], 5).unwrap()
        );
    }

    #[test]
    fn expired_timeout_fails_the_build() {
        match ForestBuilder::new()
            .set_n_trees(2)
            .set_timeout(Duration::from_secs(0))
            .build(line(100))
        {
            Err(CanopyError::Timeout { .. }) => (),
            other => panic!("expected a timeout, got {:?}", other),
        }
    }
}
