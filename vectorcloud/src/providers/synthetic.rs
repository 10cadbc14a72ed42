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

use log::debug;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::*;

/// Gaussian blobs around random centers. Embeddings cluster, uniform noise does not, so this is closer to
/// what a real corpus does to a random projection tree.
///
/// The same `(seed, dimensions)` always produces the same vectors, and a larger `count` extends a smaller one.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    name: String,
    clusters: usize,
    spread: f32,
    query_count: usize,
    seed: u64,
}

impl Default for SyntheticProvider {
    fn default() -> SyntheticProvider {
        SyntheticProvider {
            name: "synthetic".to_string(),
            clusters: 32,
            spread: 0.35,
            query_count: 100,
            seed: 38,
        }
    }
}

impl SyntheticProvider {
    /// Creates a new provider with sensible defaults.
    pub fn new() -> SyntheticProvider {
        SyntheticProvider::default()
    }
    /// Number of gaussian blobs, at least 1
    pub fn set_clusters(&mut self, x: usize) -> &mut Self {
        self.clusters = x.max(1);
        self
    }
    /// Standard deviation of each blob around its center. The centers have unit variance.
    pub fn set_spread(&mut self, x: f32) -> &mut Self {
        self.spread = x.abs();
        self
    }
    /// Number of queries handed out with each corpus
    pub fn set_query_count(&mut self, x: usize) -> &mut Self {
        self.query_count = x;
        self
    }
    /// Seed of every generated vector
    pub fn set_seed(&mut self, x: u64) -> &mut Self {
        self.seed = x;
        self
    }

    fn centers(&self, dimensions: usize) -> Vec<Vec<f32>> {
        let mut rng = SmallRng::seed_from_u64(self.seed ^ (dimensions as u64).rotate_left(32));
        (0..self.clusters)
            .map(|_| {
                (0..dimensions)
                    .map(|_| rng.sample::<f32, _>(StandardNormal))
                    .collect()
            })
            .collect()
    }

    fn generate(&self, centers: &[Vec<f32>], count: usize, stream: u64) -> Vec<f32> {
        let dimensions = centers.first().map(|c| c.len()).unwrap_or(0);
        let mut rng = SmallRng::seed_from_u64(self.seed ^ stream);
        let mut data = Vec::with_capacity(count * dimensions);
        for _ in 0..count {
            let center = &centers[rng.gen_range(0..centers.len())];
            data.extend(
                center
                    .iter()
                    .map(|c| c + self.spread * rng.sample::<f32, _>(StandardNormal)),
            );
        }
        data
    }
}

impl<M: Metric> DatasetProvider<M> for SyntheticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, dimensions: usize, count: usize) -> CloudResult<Dataset<M>> {
        if dimensions == 0 {
            return Err(CloudError::unavailable(
                self.name.clone(),
                "zero dimensional vectors were requested",
            ));
        }
        debug!(
            "Generating {} vectors and {} queries of dimension {}",
            count, self.query_count, dimensions
        );
        let centers = self.centers(dimensions);
        let corpus = self.generate(&centers, count, dimensions as u64);
        let queries = self.generate(&centers, self.query_count, !(dimensions as u64));
        Dataset::new(
            DataRam::new(corpus, dimensions)?.named(format!("{}-{}", self.name, dimensions)),
            DataRam::new(queries, dimensions)?
                .named(format!("{}-{}-queries", self.name, dimensions)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::L2;

    #[test]
    fn generation_is_deterministic() {
        let provider = SyntheticProvider::new();
        let a: Dataset<L2> = provider.load(8, 100).unwrap();
        let b: Dataset<L2> = provider.load(8, 100).unwrap();
        assert_eq!(a.corpus.len(), 100);
        assert_eq!(a.queries.len(), 100);
        assert_eq!(a.dim(), 8);
        assert!(a.corpus.iter().zip(b.corpus.iter()).all(|(x, y)| x == y));
    }

    #[test]
    fn larger_corpus_extends_smaller() {
        let provider = SyntheticProvider::new();
        let small: Dataset<L2> = provider.load(4, 10).unwrap();
        let large: Dataset<L2> = provider.load(4, 50).unwrap();
        for i in 0..10 {
            assert_eq!(small.corpus.point(i).unwrap(), large.corpus.point(i).unwrap());
        }
    }

    #[test]
    fn zero_dimensions_are_unavailable() {
        let provider = SyntheticProvider::new();
        let res: CloudResult<Dataset<L2>> = provider.load(0, 10);
        assert!(res.unwrap_err().is_unavailable());
    }

    #[test]
    fn setters_apply() {
        let mut provider = SyntheticProvider::new();
        provider.set_query_count(7).set_clusters(0).set_seed(1);
        let data: Dataset<L2> = provider.load(3, 20).unwrap();
        assert_eq!(data.queries.len(), 7);
        assert_eq!(provider.clusters, 1);
    }
}
