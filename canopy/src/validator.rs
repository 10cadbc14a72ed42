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

//! # Validator
//! Closes the loop: for every `(n, d)` it asks a formula for a tree count, measures the recall of a forest
//! with that many trees and checks it against the band. A failing pair means the formula should be fitted
//! again, nothing here corrects it.

use log::{debug, warn};
use rayon::prelude::*;
use std::fmt;

use crate::benchmark::{BenchmarkConfig, BenchmarkRunner};
use crate::config::CalibrationConfig;
use crate::estimator::EstimatorFormula;
use crate::store::SampleOutcome;
use core_canopy::ToleranceBand;
use vectorcloud::*;

/// Whether the recall at the estimated tree count is acceptable
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// In the band, or at or above its floor for a small corpus
    Pass,
    /// Outside of it
    Fail,
    /// The run could not be measured
    Errored(String),
}

/// One validated pair
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// The configuration that ran, with the estimated tree count
    pub config: BenchmarkConfig,
    /// The recall, `None` if the run errored
    pub observed_recall: Option<f32>,
    /// The verdict
    pub verdict: Verdict,
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let recall = match self.observed_recall {
            Some(r) => format!("{:.3}", r),
            None => "--".to_string(),
        };
        let verdict = match &self.verdict {
            Verdict::Pass => "pass".to_string(),
            Verdict::Fail => "FAIL".to_string(),
            Verdict::Errored(reason) => format!("errored: {}", reason),
        };
        write!(
            f,
            "d={} n={} t={} recall={} {}",
            self.config.dimensions, self.config.corpus_size, self.config.tree_count, recall, verdict
        )
    }
}

/// Counts of a validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    /// Pairs in the band
    pub passed: usize,
    /// Pairs out of it
    pub failed: usize,
    /// Pairs that could not be measured
    pub errored: usize,
}

impl ValidationSummary {
    /// Adds an outcome
    pub fn add(&mut self, outcome: &ValidationOutcome) {
        match outcome.verdict {
            Verdict::Pass => self.passed += 1,
            Verdict::Fail => self.failed += 1,
            Verdict::Errored(..) => self.errored += 1,
        }
    }

    /// Number of pairs
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored
    }

    /// Share of the pairs that passed. Errored pairs count against it, an empty validation is 0.
    pub fn pass_ratio(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.passed as f64 / total as f64,
        }
    }

    /// If at least `ratio` of the pairs passed
    pub fn meets(&self, ratio: f64) -> bool {
        self.total() > 0 && self.pass_ratio() >= ratio
    }
}

impl<'o> std::iter::FromIterator<&'o ValidationOutcome> for ValidationSummary {
    fn from_iter<I: IntoIterator<Item = &'o ValidationOutcome>>(iter: I) -> Self {
        let mut summary = ValidationSummary::default();
        for outcome in iter {
            summary.add(outcome);
        }
        summary
    }
}

impl fmt::Display for ValidationSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} errored ({:.1}% pass)",
            self.passed,
            self.failed,
            self.errored,
            100.0 * self.pass_ratio()
        )
    }
}

/// Validates a formula against loaded datasets, one per dimensionality.
#[derive(Debug)]
pub struct Validator<'a, M: Metric> {
    runner: BenchmarkRunner,
    formula: EstimatorFormula,
    band: ToleranceBand,
    small_corpus_threshold: usize,
    query_count: usize,
    dataset: String,
    datasets: &'a [Dataset<M>],
}

impl<'a, M: Metric> Validator<'a, M> {
    /// A validator measuring with the configuration's runner settings and band.
    pub fn new<S: Into<String>>(
        config: &CalibrationConfig,
        formula: EstimatorFormula,
        dataset: S,
        datasets: &'a [Dataset<M>],
    ) -> Validator<'a, M> {
        Validator {
            runner: BenchmarkRunner::new(config),
            formula,
            band: config.band,
            small_corpus_threshold: config.small_corpus_threshold,
            query_count: config.query_count,
            dataset: dataset.into(),
            datasets,
        }
    }

    /// Every `(n, d)` pair of the configuration's progressions
    pub fn grid(config: &CalibrationConfig) -> Vec<(usize, usize)> {
        config
            .dimensions
            .iter()
            .flat_map(|d| config.corpus_sizes.iter().map(move |n| (*n, *d)))
            .collect()
    }

    /// The formula under test
    pub fn formula(&self) -> &EstimatorFormula {
        &self.formula
    }

    fn judge(&self, corpus_size: usize, recall: f32) -> Verdict {
        let acceptable = if corpus_size < self.small_corpus_threshold {
            self.band.reached(recall)
        } else {
            self.band.contains(recall)
        };
        if acceptable {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    fn errored(config: BenchmarkConfig, reason: String) -> ValidationOutcome {
        warn!(
            "Validation of d={} n={} errored: {}",
            config.dimensions, config.corpus_size, reason
        );
        ValidationOutcome {
            config,
            observed_recall: None,
            verdict: Verdict::Errored(reason),
        }
    }

    /// Measures one `(n, d)` pair at the tree count the formula gives it.
    pub fn validate_one(&self, corpus_size: usize, dimensions: usize) -> ValidationOutcome {
        let config = BenchmarkConfig::new(
            corpus_size,
            dimensions,
            self.formula.evaluate(corpus_size, dimensions),
            M::kind(),
        );
        let dataset = match self.datasets.iter().find(|d| d.dim() == dimensions) {
            Some(dataset) => dataset,
            None => {
                return Validator::<M>::errored(
                    config,
                    format!("no dataset of dimension {}", dimensions),
                )
            }
        };
        let slices = dataset.corpus.prefix(corpus_size).and_then(|corpus| {
            let queries = dataset
                .queries
                .prefix(self.query_count.min(dataset.queries.len()))?;
            Ok((corpus, queries))
        });
        let (corpus, queries) = match slices {
            Ok(slices) => slices,
            Err(e) => return Validator::<M>::errored(config, e.to_string()),
        };
        let sample = match self.runner.run(&config, &self.dataset, &corpus, &queries) {
            Ok(sample) => sample,
            Err(e) => return Validator::<M>::errored(config, e.to_string()),
        };
        match sample.outcome {
            SampleOutcome::Measured(recall) => {
                let verdict = self.judge(corpus_size, recall);
                if verdict == Verdict::Fail {
                    warn!(
                        "d={} n={} t={} has recall {:.3}, outside of {}",
                        dimensions, corpus_size, config.tree_count, recall, self.band
                    );
                } else {
                    debug!(
                        "d={} n={} t={} has recall {:.3}",
                        dimensions, corpus_size, config.tree_count, recall
                    );
                }
                ValidationOutcome {
                    config,
                    observed_recall: Some(recall),
                    verdict,
                }
            }
            SampleOutcome::Errored(reason) => Validator::<M>::errored(config, reason),
        }
    }

    /// Lazily validates the `(n, d)` pairs in order. Nothing runs until the iterator is advanced.
    pub fn validate<'v>(&'v self, pairs: &[(usize, usize)]) -> ValidationIter<'v, 'a, M> {
        ValidationIter {
            validator: self,
            pairs: pairs.to_vec(),
            position: 0,
        }
    }

    /// Validates every pair at once on the rayon pool, outcomes in the order of the pairs.
    pub fn validate_parallel(&self, pairs: &[(usize, usize)]) -> Vec<ValidationOutcome> {
        pairs
            .par_iter()
            .map(|(n, d)| self.validate_one(*n, *d))
            .collect()
    }
}

/// The lazy sequence of [`Validator::validate`]. Cloning it, or calling `restart`, runs the pairs again.
#[derive(Debug, Clone)]
pub struct ValidationIter<'v, 'a, M: Metric> {
    validator: &'v Validator<'a, M>,
    pairs: Vec<(usize, usize)>,
    position: usize,
}

impl<'v, 'a, M: Metric> ValidationIter<'v, 'a, M> {
    /// Starts over from the first pair
    pub fn restart(&mut self) {
        self.position = 0;
    }
}

impl<'v, 'a, M: Metric> Iterator for ValidationIter<'v, 'a, M> {
    type Item = ValidationOutcome;

    fn next(&mut self) -> Option<ValidationOutcome> {
        let (n, d) = *self.pairs.get(self.position)?;
        self.position += 1;
        Some(self.validator.validate_one(n, d))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.pairs.len() - self.position;
        (left, Some(left))
    }
}

impl<'v, 'a, M: Metric> ExactSizeIterator for ValidationIter<'v, 'a, M> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn datasets() -> Vec<Dataset<L2>> {
        let mut provider = SyntheticProvider::new();
        provider.set_query_count(20);
        vec![provider.load(8, 512).unwrap()]
    }

    fn config() -> CalibrationConfig {
        let mut config = CalibrationConfig::default();
        config
            .set_dimensions(vec![8])
            .set_corpus_sizes(vec![256, 512])
            .set_query_count(20);
        config
    }

    #[test]
    fn enough_trees_pass() {
        let datasets = datasets();
        let config = config();
        // Every pair gets the largest tree count, which searches the whole corpus
        let mut formula = EstimatorFormula::reference(config.max_tree_count());
        formula.low_offset = -20.0;
        let validator = Validator::new(&config, formula, "synthetic", &datasets);
        let outcomes: Vec<ValidationOutcome> = validator.validate(&Validator::<L2>::grid(&config)).collect();
        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert_eq!(outcome.config.tree_count, 4096);
            assert_eq!(outcome.observed_recall, Some(1.0));
            // Small corpora only need the floor
            assert_eq!(outcome.verdict, Verdict::Pass);
        }
        let summary: ValidationSummary = outcomes.iter().collect();
        assert!(summary.meets(0.95));
    }

    #[test]
    fn large_corpora_above_the_band_fail() {
        let datasets = datasets();
        let mut config = config();
        config.set_small_corpus_threshold(0);
        let mut formula = EstimatorFormula::reference(config.max_tree_count());
        formula.branch_threshold = usize::MAX;
        formula.low_offset = -20.0;
        let validator = Validator::new(&config, formula, "synthetic", &datasets);
        let outcome = validator.validate_one(512, 8);
        assert_eq!(outcome.observed_recall, Some(1.0));
        assert_eq!(outcome.verdict, Verdict::Fail);
    }

    #[test]
    fn missing_data_is_errored() {
        let datasets = datasets();
        let config = config();
        let validator = Validator::new(
            &config,
            EstimatorFormula::reference(4096),
            "synthetic",
            &datasets,
        );
        let outcomes = validator.validate_parallel(&[(1024, 8), (256, 16)]);
        assert!(matches!(outcomes[0].verdict, Verdict::Errored(..)));
        assert!(matches!(outcomes[1].verdict, Verdict::Errored(..)));
        let summary: ValidationSummary = outcomes.iter().collect();
        assert_eq!(summary.errored, 2);
        assert!(!summary.meets(0.5));
    }

    #[test]
    fn lazy_and_restartable() {
        let datasets = datasets();
        let config = config();
        let validator = Validator::new(
            &config,
            EstimatorFormula::reference(4096),
            "synthetic",
            &datasets,
        );
        let mut iter = validator.validate(&[(256, 8), (512, 8)]);
        assert_eq!(iter.len(), 2);
        let first = iter.next().unwrap();
        let second = iter.next().unwrap();
        assert!(iter.next().is_none());
        iter.restart();
        assert_eq!(iter.next().unwrap().config, first.config);
        assert_eq!(iter.clone().count(), 1);
        assert_eq!(second.config.corpus_size, 512);
    }

    #[test]
    fn summary_ratios() {
        let summary = ValidationSummary {
            passed: 19,
            failed: 1,
            errored: 0,
        };
        assert_approx_eq!(summary.pass_ratio(), 0.95);
        assert!(summary.meets(0.95));
        assert!(!ValidationSummary::default().meets(0.0));
        assert_eq!(summary.to_string(), "19 passed, 1 failed, 0 errored (95.0% pass)");
    }
}
