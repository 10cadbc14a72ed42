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

//! # Sweep
//! Measures the recall of every `(d, n, tree count)` of a configuration. Per dimensionality the provider is
//! asked once for the largest corpus, smaller corpora are prefixes of it. Per `(d, n)` the exact neighbors
//! are computed once, then every tree count runs as its own job on a dedicated pool and reports back over a
//! channel. The driver records the samples as they arrive and only moves to the next pair once every tree
//! count of the current one is in the store.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{info, warn};
use pbr::ProgressBar;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::benchmark::{BenchmarkConfig, BenchmarkRunner};
use crate::config::CalibrationConfig;
use crate::errors::{CanopyError, CanopyResult};
use crate::estimator::Estimator;
use crate::fitting::{CurveFitter, FitReport};
use crate::oracle::GroundTruth;
use crate::store::{RecallSample, ResultStore};
use crate::threshold::{ExtractedThreshold, ThresholdExtractor};
use vectorcloud::*;

type JobResult = (BenchmarkConfig, CanopyResult<RecallSample>);

/// What a sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Samples written to the store
    pub recorded: usize,
    /// How many of them errored
    pub errored: usize,
    /// Wall time
    pub elapsed: Duration,
}

/// Drives a sweep over a provider's datasets.
pub struct Sweep<'p, M: Metric> {
    config: CalibrationConfig,
    provider: &'p dyn DatasetProvider<M>,
    runner: BenchmarkRunner,
}

impl<'p, M: Metric> Sweep<'p, M> {
    /// A sweep of the configuration's progressions. The configuration is checked here.
    pub fn new(
        config: &CalibrationConfig,
        provider: &'p dyn DatasetProvider<M>,
    ) -> CanopyResult<Sweep<'p, M>> {
        config.validate()?;
        let sweep = Sweep {
            config: config.clone(),
            provider,
            runner: BenchmarkRunner::new(config),
        };
        for c in sweep.configs() {
            c.key()?;
        }
        Ok(sweep)
    }

    /// Every configuration the sweep runs, in `(d, n, tree count)` order
    pub fn configs(&self) -> Vec<BenchmarkConfig> {
        let mut configs = Vec::with_capacity(
            self.config.dimensions.len()
                * self.config.corpus_sizes.len()
                * self.config.tree_counts.len(),
        );
        for d in &self.config.dimensions {
            for n in &self.config.corpus_sizes {
                for t in &self.config.tree_counts {
                    configs.push(BenchmarkConfig::new(*n, *d, *t, M::kind()));
                }
            }
        }
        configs
    }

    fn pool(&self) -> CanopyResult<ThreadPool> {
        ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| CanopyError::InvalidConfig(format!("unable to start the worker pool: {}", e)))
    }

    /// Runs every configuration, recording each sample in the store as it completes.
    pub fn run(&self, store: &ResultStore) -> CanopyResult<SweepSummary> {
        let now = Instant::now();
        let pool = self.pool()?;
        let total = self.configs().len();
        let mut progress: Option<ProgressBar<Stdout>> = if self.config.verbosity > 1 {
            let mut pb = ProgressBar::new(total as u64);
            pb.format("╢▌▌░╟");
            Some(pb)
        } else {
            None
        };
        info!(
            "Sweeping {} configurations of {} on {} threads",
            total,
            self.provider.name(),
            pool.current_num_threads()
        );

        let mut summary = SweepSummary::default();
        let max_corpus_size = self.config.max_corpus_size();
        for d in &self.config.dimensions {
            let dataset = match self.provider.load(*d, max_corpus_size) {
                Ok(dataset) => dataset,
                Err(e) => {
                    warn!("d={} is skipped, {}", d, e);
                    for n in &self.config.corpus_sizes {
                        self.record_errored(store, *d, *n, &e, &mut summary, &mut progress)?;
                    }
                    continue;
                }
            };
            let query_count = self.config.query_count.min(dataset.queries.len());
            let queries = dataset.queries.prefix(query_count)?;
            for n in &self.config.corpus_sizes {
                if *n > dataset.corpus.len() {
                    let reason = format!(
                        "{} only provided {} vectors of dimension {}",
                        self.provider.name(),
                        dataset.corpus.len(),
                        d
                    );
                    self.record_errored(store, *d, *n, &reason, &mut summary, &mut progress)?;
                    continue;
                }
                let corpus = dataset.corpus.prefix(*n)?;
                let k = self.config.k;
                let truth = match pool.install(|| GroundTruth::compute(&corpus, &queries, k)) {
                    Ok(truth) => Arc::new(truth),
                    Err(e) => {
                        self.record_errored(store, *d, *n, &e, &mut summary, &mut progress)?;
                        continue;
                    }
                };
                self.run_pair(
                    &pool,
                    store,
                    (*d, *n),
                    (&corpus, &queries, truth),
                    &mut summary,
                    &mut progress,
                )?;
            }
            info!("d={} is done, {} samples recorded so far", d, summary.recorded);
        }

        if let Some(pb) = progress.as_mut() {
            pb.finish_println("");
        }
        summary.elapsed = now.elapsed();
        info!(
            "Sweep finished in {:?}, {} samples, {} errored",
            summary.elapsed, summary.recorded, summary.errored
        );
        Ok(summary)
    }

    /// Every tree count of one `(d, n)` pair, waiting for all of them.
    fn run_pair(
        &self,
        pool: &ThreadPool,
        store: &ResultStore,
        (d, n): (usize, usize),
        (corpus, queries, truth): (&DataRam<M>, &DataRam<M>, Arc<GroundTruth>),
        summary: &mut SweepSummary,
        progress: &mut Option<ProgressBar<Stdout>>,
    ) -> CanopyResult<()> {
        let (sender, receiver): (Sender<JobResult>, Receiver<JobResult>) = unbounded();
        for t in &self.config.tree_counts {
            let config = BenchmarkConfig::new(n, d, *t, M::kind());
            let runner = self.runner.clone();
            let dataset = self.provider.name().to_string();
            let corpus = corpus.clone();
            let queries = queries.clone();
            let truth = Arc::clone(&truth);
            let sender = sender.clone();
            pool.spawn(move || {
                let result = runner.run_with_truth(&config, &dataset, &corpus, &queries, &truth);
                // The driver only hangs up on an error of its own
                let _ = sender.send((config, result));
            });
        }
        drop(sender);

        for _ in &self.config.tree_counts {
            let (config, result) = receiver.recv().map_err(|_| {
                CanopyError::QueryError(format!("a job of d={} n={} vanished", d, n))
            })?;
            let sample = match result {
                Ok(sample) => sample,
                Err(e) => RecallSample::errored(self.provider.name(), config.key()?, self.runner.seed(), e),
            };
            if sample.is_errored() {
                summary.errored += 1;
            }
            store.record(sample)?;
            summary.recorded += 1;
            if let Some(pb) = progress.as_mut() {
                pb.inc();
            }
        }
        Ok(())
    }

    fn record_errored<R: std::fmt::Display>(
        &self,
        store: &ResultStore,
        d: usize,
        n: usize,
        reason: &R,
        summary: &mut SweepSummary,
        progress: &mut Option<ProgressBar<Stdout>>,
    ) -> CanopyResult<()> {
        for t in &self.config.tree_counts {
            let key = BenchmarkConfig::new(n, d, *t, M::kind()).key()?;
            store.record(RecallSample::errored(
                self.provider.name(),
                key,
                self.runner.seed(),
                reason,
            ))?;
            summary.recorded += 1;
            summary.errored += 1;
            if let Some(pb) = progress.as_mut() {
                pb.inc();
            }
        }
        Ok(())
    }
}

/// Extracts the threshold of every `(d, n)` pair in the store, ordered by `(d, n)`.
pub fn extract_store(config: &CalibrationConfig, store: &ResultStore) -> Vec<ExtractedThreshold> {
    let extractor = ThresholdExtractor::new(config);
    store
        .dimensions()
        .into_iter()
        .flat_map(|d| extractor.extract_all(&store.matrix_for(d)))
        .collect()
}

/// The outcome of a full calibration
#[derive(Debug, Clone)]
pub struct Calibration {
    /// What the sweep did
    pub sweep: SweepSummary,
    /// Thresholds of every pair, unattainable ones included
    pub thresholds: Vec<ExtractedThreshold>,
    /// The fit
    pub report: FitReport,
}

impl Calibration {
    /// An estimator holding the fitted formula under the band it was fitted for
    pub fn estimator(&self, config: &CalibrationConfig) -> Estimator {
        Estimator::new(config.band, self.report.formula)
    }
}

/// Sweeps, extracts every pair once the sweep is over, and fits a formula to them.
pub fn calibrate<M: Metric>(
    config: &CalibrationConfig,
    provider: &dyn DatasetProvider<M>,
    store: &ResultStore,
) -> CanopyResult<Calibration> {
    let sweep = Sweep::new(config, provider)?.run(store)?;
    let thresholds = extract_store(config, store);
    let report = CurveFitter::new(config).fit(&thresholds)?;
    Ok(Calibration {
        sweep,
        thresholds,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SampleOutcome;

    fn config() -> CalibrationConfig {
        let mut config = CalibrationConfig::default();
        config
            .set_dimensions(vec![8])
            .set_corpus_sizes(vec![128, 256])
            .set_tree_counts(vec![1, 8, 64])
            .set_k(5)
            .set_query_count(10)
            .set_threads(2);
        config
    }

    /// Never hands out more than `cap` vectors, nothing at all for dimension 16.
    struct Capped {
        inner: SyntheticProvider,
        cap: usize,
    }

    impl DatasetProvider<L2> for Capped {
        fn name(&self) -> &str {
            "capped"
        }
        fn load(&self, dimensions: usize, count: usize) -> CloudResult<Dataset<L2>> {
            if dimensions == 16 {
                return Err(CloudError::unavailable("capped", "no such file"));
            }
            self.inner.load(dimensions, count.min(self.cap))
        }
    }

    #[test]
    fn configs_are_in_sweep_order() {
        let config = config();
        let provider = SyntheticProvider::new();
        let sweep: Sweep<L2> = Sweep::new(&config, &provider).unwrap();
        let configs = sweep.configs();
        assert_eq!(configs.len(), 6);
        assert_eq!(
            configs
                .iter()
                .map(|c| (c.corpus_size, c.tree_count))
                .collect::<Vec<_>>(),
            vec![(128, 1), (128, 8), (128, 64), (256, 1), (256, 8), (256, 64)]
        );
    }

    #[test]
    fn small_sweep_fills_the_store() {
        let config = config();
        let provider = SyntheticProvider::new();
        let store = ResultStore::new();
        let summary = Sweep::<L2>::new(&config, &provider).unwrap().run(&store).unwrap();
        assert_eq!(summary.recorded, 6);
        assert_eq!(summary.errored, 0);
        assert_eq!(store.len(), 6);
        for sample in store.samples() {
            let recall = sample.recall().unwrap();
            assert!((0.0..=1.0).contains(&recall));
            assert_eq!(sample.dataset, "synthetic");
            assert_eq!(sample.seed, config.rng_seed);
        }
        // 64 trees look at 5 * 64 candidates, more than the corpus holds
        assert_eq!(store.matrix_for(8).recall(128, 64), Some(1.0));
        assert_eq!(store.matrix_for(8).recall(256, 64), Some(1.0));
    }

    #[test]
    fn missing_data_is_errored_not_fatal() {
        let mut config = config();
        config.set_dimensions(vec![8, 16]);
        let provider = Capped {
            inner: SyntheticProvider::new(),
            cap: 200,
        };
        let store = ResultStore::new();
        let summary = Sweep::<L2>::new(&config, &provider)
            .unwrap()
            .run(&store)
            .unwrap();
        assert_eq!(summary.recorded, 12);
        // n=256 of d=8 and everything of d=16
        assert_eq!(summary.errored, 9);
        assert_eq!(store.errored().len(), 9);
        assert_eq!(store.matrix_for(8).corpus_sizes(), vec![128]);
        assert!(store.matrix_for(16).is_empty());
        let key = BenchmarkConfig::new(256, 8, 1, MetricKind::L2).key().unwrap();
        match store.get(key).unwrap().outcome {
            SampleOutcome::Errored(reason) => assert!(reason.contains("200")),
            other => panic!("expected an errored sample, got {:?}", other),
        }
    }

    #[test]
    fn calibration_end_to_end() {
        let config = config();
        let provider = SyntheticProvider::new();
        let store = ResultStore::new();
        let calibration = calibrate::<L2>(&config, &provider, &store).unwrap();
        assert_eq!(calibration.thresholds.len(), 2);
        // Small corpora always reach the band with enough trees
        for threshold in &calibration.thresholds {
            assert!(threshold.threshold.tree_count().is_some());
        }
        let estimator = calibration.estimator(&config);
        let t = estimator.recommended_tree_count(128, 8, None).unwrap();
        assert!(t >= 1 && t <= 64);
    }
}
