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

//! Dataset providers and a trait to uniformly ask them for a corpus and its queries.
//! Downloading, retrying and decompressing archives is the provider's concern, the callers only see
//! a loaded [`Dataset`] or a [`CloudError::DatasetUnavailable`].

use rand::rngs::SmallRng;
use rand::seq::index::sample;
use rand::SeedableRng;

use crate::distances::Metric;
use crate::errors::*;
use crate::DataRam;

mod raw_files;
pub use raw_files::*;
mod synthetic;
pub use synthetic::*;

/// A corpus and the queries to run against it. Both have the same dimensionality.
#[derive(Debug, Clone)]
pub struct Dataset<M: Metric> {
    /// The vectors that get indexed
    pub corpus: DataRam<M>,
    /// The vectors that get searched for
    pub queries: DataRam<M>,
}

impl<M: Metric> Dataset<M> {
    /// Pairs a corpus with its queries, checking they agree on the dimension.
    pub fn new(corpus: DataRam<M>, queries: DataRam<M>) -> CloudResult<Dataset<M>> {
        if corpus.dim() != queries.dim() {
            return Err(CloudError::DimensionMismatch {
                expected: corpus.dim(),
                found: queries.dim(),
            });
        }
        Ok(Dataset { corpus, queries })
    }

    /// The dimensionality of the vectors
    pub fn dim(&self) -> usize {
        self.corpus.dim()
    }
}

/// The trait for anything that can hand out embedding datasets.
pub trait DatasetProvider<M: Metric>: Send + Sync {
    /// Identifier of the dataset, recorded with every sample
    fn name(&self) -> &str;
    /// Loads at most `count` corpus vectors of dimension `dimensions` and the matching query set.
    /// A provider that has less than `count` vectors returns what it has.
    fn load(&self, dimensions: usize, count: usize) -> CloudResult<Dataset<M>>;
}

/// Picks `count` distinct vectors of the corpus as queries, deterministically for a seed.
pub fn sample_queries<M: Metric>(
    corpus: &DataRam<M>,
    count: usize,
    seed: u64,
) -> CloudResult<DataRam<M>> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let amount = count.min(corpus.len());
    let mut indexes = sample(&mut rng, corpus.len(), amount).into_vec();
    indexes.sort_unstable();
    corpus.select(&indexes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::L2;

    #[test]
    fn sampled_queries_are_distinct_corpus_vectors() {
        let data: Vec<f32> = (0..50).map(|i| i as f32).collect();
        let corpus = DataRam::<L2>::new(data, 1).unwrap();
        let queries = sample_queries(&corpus, 10, 38).unwrap();
        assert_eq!(queries.len(), 10);
        let mut values: Vec<i64> = queries.iter().map(|q| q[0] as i64).collect();
        values.dedup();
        assert_eq!(values.len(), 10);
        let again = sample_queries(&corpus, 10, 38).unwrap();
        assert!(queries.iter().zip(again.iter()).all(|(a, b)| a == b));
        assert_eq!(sample_queries(&corpus, 100, 38).unwrap().len(), 50);
    }

    #[test]
    fn dataset_dimensions_must_agree() {
        let corpus = DataRam::<L2>::new(vec![0.0; 6], 3).unwrap();
        let queries = DataRam::<L2>::new(vec![0.0; 6], 2).unwrap();
        assert!(Dataset::new(corpus, queries).is_err());
    }
}
