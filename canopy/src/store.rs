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

//! # Result Store
//! Every recall sample of a calibration, keyed by `(dimensions, corpus size, tree count)`. Recording a key
//! again replaces the earlier sample, there is no merging. Errored runs are kept next to the measured ones
//! so nothing disappears from the record, but they never make it into a [`RecallMatrix`].
//!
//! Only the write path takes a lock, and only for the one insert.
//!
//! The store holds one dataset's samples; the dataset name is carried on every record for the sample log.

use fxhash::FxBuildHasher;
use hashbrown::HashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::{Mutex, RwLock};

use crate::errors::*;
use core_canopy::{KeysToVec, SampleKey};

/// What came out of a run
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// Mean recall over the queries
    Measured(f32),
    /// The run failed, with the reason
    Errored(String),
}

/// What building the forest of a run cost. Recall is traded against these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildMetrics {
    /// Wall clock time of the build, in milliseconds
    pub build_millis: u64,
    /// Nodes over every tree of the forest
    pub node_count: usize,
}

/// The outcome of one benchmark configuration, with the seed the trees were built from.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallSample {
    /// `(dimensions, corpus size, tree count)`
    pub key: SampleKey,
    /// Identifier of the dataset the corpus came from
    pub dataset: String,
    /// Seed of the forest
    pub seed: u64,
    /// Recall or the reason there is none
    pub outcome: SampleOutcome,
    /// Cost of the build, `None` when the run errored or the sample predates it
    pub build: Option<BuildMetrics>,
}

impl RecallSample {
    /// A successful run
    pub fn measured<S: Into<String>>(dataset: S, key: SampleKey, seed: u64, recall: f32) -> Self {
        RecallSample {
            key,
            dataset: dataset.into(),
            seed,
            outcome: SampleOutcome::Measured(recall),
            build: None,
        }
    }

    /// Attaches the cost of the build
    pub fn with_build(mut self, build: BuildMetrics) -> Self {
        self.build = Some(build);
        self
    }

    /// A failed run
    pub fn errored<S: Into<String>, R: fmt::Display>(
        dataset: S,
        key: SampleKey,
        seed: u64,
        reason: R,
    ) -> Self {
        RecallSample {
            key,
            dataset: dataset.into(),
            seed,
            outcome: SampleOutcome::Errored(reason.to_string()),
            build: None,
        }
    }

    /// The recall, `None` if the run errored
    pub fn recall(&self) -> Option<f32> {
        match self.outcome {
            SampleOutcome::Measured(recall) => Some(recall),
            SampleOutcome::Errored(..) => None,
        }
    }

    /// If the run errored
    pub fn is_errored(&self) -> bool {
        matches!(self.outcome, SampleOutcome::Errored(..))
    }
}

/// A flat row of the sample log
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SampleRow {
    dataset: String,
    dimensionality: usize,
    n: usize,
    tree_count: usize,
    recall: Option<f32>,
    status: String,
    seed: u64,
    #[serde(default)]
    build_millis: Option<u64>,
    #[serde(default)]
    node_count: Option<usize>,
}

const STATUS_OK: &str = "ok";
const STATUS_ERRORED: &str = "errored: ";

impl From<&RecallSample> for SampleRow {
    fn from(sample: &RecallSample) -> SampleRow {
        let (recall, status) = match &sample.outcome {
            SampleOutcome::Measured(recall) => (Some(*recall), STATUS_OK.to_string()),
            SampleOutcome::Errored(reason) => (None, format!("{}{}", STATUS_ERRORED, reason)),
        };
        SampleRow {
            dataset: sample.dataset.clone(),
            dimensionality: sample.key.dimensions(),
            n: sample.key.corpus_size(),
            tree_count: sample.key.tree_count(),
            recall,
            status,
            seed: sample.seed,
            build_millis: sample.build.map(|b| b.build_millis),
            node_count: sample.build.map(|b| b.node_count),
        }
    }
}

impl SampleRow {
    fn into_sample(self, file_name: &str, line_number: usize) -> CanopyResult<RecallSample> {
        let malformed = |key: &str| {
            CanopyError::ParsingError(ParsingError::CSVReadError {
                file_name: file_name.to_string(),
                line_number,
                key: key.to_string(),
            })
        };
        let key = SampleKey::try_new(self.dimensionality, self.n, self.tree_count)
            .ok_or_else(|| malformed("dimensionality,n,tree_count"))?;
        let outcome = if self.status == STATUS_OK {
            SampleOutcome::Measured(self.recall.ok_or_else(|| malformed("recall"))?)
        } else if let Some(reason) = self.status.strip_prefix(STATUS_ERRORED) {
            SampleOutcome::Errored(reason.to_string())
        } else {
            return Err(malformed("status"));
        };
        let build = match (self.build_millis, self.node_count) {
            (Some(build_millis), Some(node_count)) => Some(BuildMetrics {
                build_millis,
                node_count,
            }),
            _ => None,
        };
        Ok(RecallSample {
            key,
            dataset: self.dataset,
            seed: self.seed,
            outcome,
            build,
        })
    }
}

/// The samples of one dimensionality, ordered by `(corpus size, tree count)`. Errored samples are left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecallMatrix {
    dimensions: usize,
    keys: Vec<SampleKey>,
    recalls: Vec<f32>,
}

impl RecallMatrix {
    /// Builds a matrix from `(corpus size, tree count, recall)` cells, which get sorted.
    pub fn from_cells(dimensions: usize, cells: &[(usize, usize, f32)]) -> RecallMatrix {
        let mut pairs: Vec<(SampleKey, f32)> = cells
            .iter()
            .filter_map(|(n, t, r)| SampleKey::try_new(dimensions, *n, *t).map(|k| (k, *r)))
            .collect();
        pairs.sort_by_key(|(k, _)| *k);
        pairs.dedup_by_key(|(k, _)| *k);
        RecallMatrix {
            dimensions,
            keys: pairs.iter().map(|(k, _)| *k).collect(),
            recalls: pairs.iter().map(|(_, r)| *r).collect(),
        }
    }

    /// The dimensionality this matrix is about
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of measured cells
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// If nothing was measured
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The distinct corpus sizes, ascending
    pub fn corpus_sizes(&self) -> Vec<usize> {
        let mut sizes = self.keys.to_corpus_sizes();
        sizes.dedup();
        sizes
    }

    /// The distinct tree counts over all rows, ascending
    pub fn tree_counts(&self) -> Vec<usize> {
        let mut counts = self.keys.to_tree_counts();
        counts.sort_unstable();
        counts.dedup();
        counts
    }

    /// The `(tree count, recall)` cells of a corpus size, tree count ascending
    pub fn row(&self, corpus_size: usize) -> Vec<(usize, f32)> {
        self.keys
            .iter()
            .zip(&self.recalls)
            .filter(|(k, _)| k.corpus_size() == corpus_size)
            .map(|(k, r)| (k.tree_count(), *r))
            .collect()
    }

    /// The recall of a cell, if it was measured
    pub fn recall(&self, corpus_size: usize, tree_count: usize) -> Option<f32> {
        let key = SampleKey::try_new(self.dimensions, corpus_size, tree_count)?;
        self.keys
            .binary_search(&key)
            .ok()
            .map(|i| self.recalls[i])
    }

    /// Every cell as `(corpus size, tree count, recall)`, in order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.keys
            .iter()
            .zip(&self.recalls)
            .map(|(k, r)| (k.corpus_size(), k.tree_count(), *r))
    }
}

/// A grid with a row per corpus size and a column per tree count. `--` marks a missing cell.
impl fmt::Display for RecallMatrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let tree_counts = self.tree_counts();
        write!(f, "d={:<7}", self.dimensions)?;
        for t in &tree_counts {
            write!(f, " {:>6}", t)?;
        }
        writeln!(f)?;
        for n in self.corpus_sizes() {
            write!(f, "n={:<7}", n)?;
            for t in &tree_counts {
                match self.recall(n, *t) {
                    Some(r) => write!(f, " {:>6.3}", r)?,
                    None => write!(f, " {:>6}", "--")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Where the samples of a calibration live.
#[derive(Default)]
pub struct ResultStore {
    samples: RwLock<HashMap<SampleKey, RecallSample, FxBuildHasher>>,
    log: Option<Mutex<csv::Writer<File>>>,
}

impl fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResultStore")
            .field("samples", &self.len())
            .field("logging", &self.log.is_some())
            .finish()
    }
}

impl ResultStore {
    /// An in memory store
    pub fn new() -> ResultStore {
        ResultStore::default()
    }

    /// A store that also appends every record to a CSV sample log. The header is written if the file is new.
    pub fn with_log<P: AsRef<Path>>(path: P) -> CanopyResult<ResultStore> {
        let is_new = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        Ok(ResultStore {
            samples: RwLock::new(HashMap::default()),
            log: Some(Mutex::new(writer)),
        })
    }

    /// Reads a CSV sample log. Later rows replace earlier rows with the same key.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> CanopyResult<ResultStore> {
        let file_name = path.as_ref().to_string_lossy().to_string();
        let mut reader = csv::Reader::from_path(&path)?;
        let store = ResultStore::new();
        for (i, row) in reader.deserialize::<SampleRow>().enumerate() {
            // The header is line 1
            store.record(row?.into_sample(&file_name, i + 2)?)?;
        }
        debug!("Loaded {} samples from {}", store.len(), file_name);
        Ok(store)
    }

    /// Writes every sample, ordered by key, to a new CSV file.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> CanopyResult<()> {
        let mut writer = csv::Writer::from_path(&path)?;
        for sample in self.samples() {
            writer.serialize(SampleRow::from(&sample))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Stores a sample, replacing any earlier sample with the same key.
    pub fn record(&self, sample: RecallSample) -> CanopyResult<()> {
        match &sample.outcome {
            SampleOutcome::Measured(recall) => debug!("{} recall {:.4}", sample.key, recall),
            SampleOutcome::Errored(reason) => warn!("{} errored: {}", sample.key, reason),
        }
        if let Some(log) = &self.log {
            let mut writer = log.lock().map_err(|_| {
                CanopyError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "the sample log lock is poisoned",
                ))
            })?;
            writer.serialize(SampleRow::from(&sample))?;
            writer.flush()?;
        }
        let mut samples = match self.samples.write() {
            Ok(samples) => samples,
            Err(poisoned) => poisoned.into_inner(),
        };
        samples.insert(sample.key, sample);
        Ok(())
    }

    /// The sample recorded for a key
    pub fn get(&self, key: SampleKey) -> Option<RecallSample> {
        self.read().get(&key).cloned()
    }

    /// Number of samples, errored ones included
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// If nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Every sample, ordered by key
    pub fn samples(&self) -> Vec<RecallSample> {
        let mut samples: Vec<RecallSample> = self.read().values().cloned().collect();
        samples.sort_by_key(|s| s.key);
        samples
    }

    /// The errored samples, ordered by key
    pub fn errored(&self) -> Vec<RecallSample> {
        let mut samples: Vec<RecallSample> = self
            .read()
            .values()
            .filter(|s| s.is_errored())
            .cloned()
            .collect();
        samples.sort_by_key(|s| s.key);
        samples
    }

    /// The dimensionalities with at least one sample, ascending
    pub fn dimensions(&self) -> Vec<usize> {
        let mut dims: Vec<usize> = self.read().keys().map(|k| k.dimensions()).collect();
        dims.sort_unstable();
        dims.dedup();
        dims
    }

    /// The measured samples of a dimensionality
    pub fn matrix_for(&self, dimensions: usize) -> RecallMatrix {
        let cells: Vec<(usize, usize, f32)> = self
            .read()
            .values()
            .filter(|s| s.key.dimensions() == dimensions)
            .filter_map(|s| s.recall().map(|r| (s.key.corpus_size(), s.key.tree_count(), r)))
            .collect();
        RecallMatrix::from_cells(dimensions, &cells)
    }

    fn read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<SampleKey, RecallSample, FxBuildHasher>> {
        match self.samples.read() {
            Ok(samples) => samples,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
