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

//! The configuration injected into the runner, the extractor, the fitter and the sweep.
//!
//! Every value has a default so an empty yaml file gives the standard calibration:
//! ```yaml
//! ---
//! band_low: 0.8
//! band_high: 0.9
//! small_corpus_threshold: 10000
//! branch_threshold: 10000
//! corpus_sizes: [512, 1024, 2048]
//! tree_counts: [1, 8, 32, 64, 128]
//! dimensions: [768, 1536]
//! k: 10
//! query_count: 100
//! rng_seed: 38
//! run_timeout_secs: 600
//! leaf_cutoff: 32
//! search_k_multiplier: 1
//! threads: 0
//! verbosity: 1
//! ```

use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;
use yaml_rust::{Yaml, YamlLoader};

use crate::errors::*;
use core_canopy::{ToleranceBand, MAX_CORPUS_SIZE, MAX_DIMENSIONS, MAX_TREE_COUNT};

/// Tree counts swept by default.
pub const DEFAULT_TREE_COUNTS: [usize; 10] = [1, 8, 32, 64, 128, 256, 512, 1024, 2048, 4096];
/// Dimensionalities swept by default.
pub const DEFAULT_DIMENSIONS: [usize; 3] = [768, 1536, 3072];
/// Seed used for the trees and the sampled queries when none is given.
pub const DEFAULT_RNG_SEED: u64 = 38;
/// Corpus size where the estimator switches from its small corpus branch when none is given.
pub const DEFAULT_BRANCH_THRESHOLD: usize = 10_000;

/// Corpus sizes swept by default, the powers of two from 512 to 2^20.
pub fn default_corpus_sizes() -> Vec<usize> {
    (9..=20).map(|p| 1usize << p).collect()
}

/// The parameters of a calibration. Build it once and share it, nothing mutates it during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfig {
    /// Recall band a tree count should land in
    pub band: ToleranceBand,
    /// Corpora smaller than this target the top of the band
    pub small_corpus_threshold: usize,
    /// Corpus size where the estimator switches branch, the reference curve's and the fitter's starting point
    pub branch_threshold: usize,
    /// Corpus sizes to sweep, kept sorted
    pub corpus_sizes: Vec<usize>,
    /// Tree counts to sweep, kept sorted. The last one is the largest tree count any estimator returns.
    pub tree_counts: Vec<usize>,
    /// Dimensionalities to sweep, kept sorted
    pub dimensions: Vec<usize>,
    /// Number of neighbors recall is measured over
    pub k: usize,
    /// Number of queries per run
    pub query_count: usize,
    /// Seed of the trees, recorded with every sample
    pub rng_seed: u64,
    /// A run that takes longer than this is marked errored. `None` waits forever.
    pub run_timeout: Option<Duration>,
    /// Maximum number of points a forest leaf holds
    pub leaf_cutoff: usize,
    /// Candidates looked at per query are `k * n_trees * search_k_multiplier`
    pub search_k_multiplier: usize,
    /// Size of the worker pool, 0 uses every core
    pub threads: usize,
    /// Above 1 progress bars are shown
    pub verbosity: u32,
}

impl Default for CalibrationConfig {
    fn default() -> CalibrationConfig {
        CalibrationConfig {
            band: ToleranceBand::default(),
            small_corpus_threshold: 10_000,
            branch_threshold: DEFAULT_BRANCH_THRESHOLD,
            corpus_sizes: default_corpus_sizes(),
            tree_counts: DEFAULT_TREE_COUNTS.to_vec(),
            dimensions: DEFAULT_DIMENSIONS.to_vec(),
            k: 10,
            query_count: 100,
            rng_seed: DEFAULT_RNG_SEED,
            run_timeout: None,
            leaf_cutoff: 32,
            search_k_multiplier: 1,
            threads: 0,
            verbosity: 0,
        }
    }
}

fn yaml_usize(params: &Yaml, field: &str, file_name: &str) -> CanopyResult<Option<usize>> {
    match &params[field] {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::Integer(i) if *i >= 0 => Ok(Some(*i as usize)),
        _ => Err(malformed(field, file_name)),
    }
}

fn yaml_f32(params: &Yaml, field: &str, file_name: &str) -> CanopyResult<Option<f32>> {
    match &params[field] {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::Integer(i) => Ok(Some(*i as f32)),
        value => match value.as_f64() {
            Some(f) => Ok(Some(f as f32)),
            None => Err(malformed(field, file_name)),
        },
    }
}

fn yaml_list(params: &Yaml, field: &str, file_name: &str) -> CanopyResult<Option<Vec<usize>>> {
    match &params[field] {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::Array(values) => values
            .iter()
            .map(|v| match v.as_i64() {
                Some(i) if i >= 0 => Ok(i as usize),
                _ => Err(malformed(field, file_name)),
            })
            .collect::<CanopyResult<Vec<usize>>>()
            .map(Some),
        _ => Err(malformed(field, file_name)),
    }
}

fn malformed(field: &str, file_name: &str) -> CanopyError {
    CanopyError::ParsingError(ParsingError::MalformedYamlError {
        file_name: file_name.to_string(),
        field: field.to_string(),
    })
}

/// Parses a comma separated list of numbers, like `--count 512,1024`. Blank entries are skipped.
pub fn parse_list(list: &str) -> Result<Vec<usize>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.replace('_', "")
                .parse::<usize>()
                .map_err(|_| format!("`{}` is not a positive integer", s))
        })
        .collect()
}

impl CalibrationConfig {
    /// Creates the standard calibration
    pub fn new() -> CalibrationConfig {
        CalibrationConfig::default()
    }

    /// Reads overrides from a yaml file. Missing fields keep their defaults.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> CanopyResult<CalibrationConfig> {
        let file_name = path.as_ref().to_string_lossy().to_string();
        let config = read_to_string(&path)?;
        let params_files =
            YamlLoader::load_from_str(&config).map_err(|_| malformed("document", &file_name))?;
        let mut cfg = CalibrationConfig::default();
        let params = match params_files.get(0) {
            Some(params) => params,
            None => return Ok(cfg),
        };

        let low = yaml_f32(params, "band_low", &file_name)?.unwrap_or(cfg.band.low);
        let high = yaml_f32(params, "band_high", &file_name)?.unwrap_or(cfg.band.high);
        cfg.band = ToleranceBand { low, high };
        if let Some(x) = yaml_usize(params, "small_corpus_threshold", &file_name)? {
            cfg.small_corpus_threshold = x;
        }
        if let Some(x) = yaml_usize(params, "branch_threshold", &file_name)? {
            cfg.branch_threshold = x;
        }
        if let Some(x) = yaml_list(params, "corpus_sizes", &file_name)? {
            cfg.set_corpus_sizes(x);
        }
        if let Some(x) = yaml_list(params, "tree_counts", &file_name)? {
            cfg.set_tree_counts(x);
        }
        if let Some(x) = yaml_list(params, "dimensions", &file_name)? {
            cfg.set_dimensions(x);
        }
        if let Some(x) = yaml_usize(params, "k", &file_name)? {
            cfg.k = x;
        }
        if let Some(x) = yaml_usize(params, "query_count", &file_name)? {
            cfg.query_count = x;
        }
        if let Some(x) = params["rng_seed"].as_i64() {
            cfg.rng_seed = x as u64;
        }
        if let Some(x) = yaml_usize(params, "run_timeout_secs", &file_name)? {
            cfg.run_timeout = Some(Duration::from_secs(x as u64));
        }
        if let Some(x) = yaml_usize(params, "leaf_cutoff", &file_name)? {
            cfg.leaf_cutoff = x;
        }
        if let Some(x) = yaml_usize(params, "search_k_multiplier", &file_name)? {
            cfg.search_k_multiplier = x;
        }
        if let Some(x) = yaml_usize(params, "threads", &file_name)? {
            cfg.threads = x;
        }
        if let Some(x) = yaml_usize(params, "verbosity", &file_name)? {
            cfg.verbosity = x as u32;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects configurations no calibration can run with.
    pub fn validate(&self) -> CanopyResult<()> {
        if ToleranceBand::new(self.band.low, self.band.high).is_none() {
            return Err(CanopyError::InvalidConfig(format!(
                "the band {} must satisfy 0 <= low <= high <= 1",
                self.band
            )));
        }
        if self.corpus_sizes.is_empty() || self.tree_counts.is_empty() || self.dimensions.is_empty()
        {
            return Err(CanopyError::InvalidConfig(
                "corpus sizes, tree counts and dimensions all need at least one value".to_string(),
            ));
        }
        if self.k == 0 {
            return Err(CanopyError::InvalidConfig("k must be positive".to_string()));
        }
        if self.query_count == 0 {
            return Err(CanopyError::InvalidConfig(
                "query_count must be positive".to_string(),
            ));
        }
        if self.branch_threshold == 0 {
            return Err(CanopyError::InvalidConfig(
                "branch_threshold must be positive".to_string(),
            ));
        }
        if self.leaf_cutoff == 0 || self.search_k_multiplier == 0 {
            return Err(CanopyError::InvalidConfig(
                "leaf_cutoff and search_k_multiplier must be positive".to_string(),
            ));
        }
        if self.tree_counts[0] == 0 || self.max_tree_count() > MAX_TREE_COUNT {
            return Err(CanopyError::InvalidConfig(format!(
                "tree counts must lie in [1, {}]",
                MAX_TREE_COUNT
            )));
        }
        if self.corpus_sizes[0] == 0 || self.corpus_sizes[self.corpus_sizes.len() - 1] > MAX_CORPUS_SIZE
        {
            return Err(CanopyError::InvalidConfig(format!(
                "corpus sizes must lie in [1, {}]",
                MAX_CORPUS_SIZE
            )));
        }
        if self.dimensions[0] == 0 || self.dimensions[self.dimensions.len() - 1] > MAX_DIMENSIONS {
            return Err(CanopyError::InvalidConfig(format!(
                "dimensions must lie in [1, {}]",
                MAX_DIMENSIONS
            )));
        }
        Ok(())
    }

    /// The largest tree count swept
    pub fn max_tree_count(&self) -> usize {
        self.tree_counts.last().cloned().unwrap_or(1)
    }

    /// The largest corpus size swept
    pub fn max_corpus_size(&self) -> usize {
        self.corpus_sizes.last().cloned().unwrap_or(0)
    }

    /// If a corpus of this size targets the top of the band
    pub fn is_small_corpus(&self, corpus_size: usize) -> bool {
        corpus_size < self.small_corpus_threshold
    }

    /// Sets the band
    pub fn set_band(&mut self, band: ToleranceBand) -> &mut Self {
        self.band = band;
        self
    }
    /// Sets the corpus sizes, sorting and deduplicating them
    pub fn set_corpus_sizes(&mut self, mut x: Vec<usize>) -> &mut Self {
        x.sort_unstable();
        x.dedup();
        self.corpus_sizes = x;
        self
    }
    /// Sets the tree counts, sorting and deduplicating them
    pub fn set_tree_counts(&mut self, mut x: Vec<usize>) -> &mut Self {
        x.sort_unstable();
        x.dedup();
        self.tree_counts = x;
        self
    }
    /// Sets the dimensionalities, sorting and deduplicating them
    pub fn set_dimensions(&mut self, mut x: Vec<usize>) -> &mut Self {
        x.sort_unstable();
        x.dedup();
        self.dimensions = x;
        self
    }
    /// Sets k
    pub fn set_k(&mut self, x: usize) -> &mut Self {
        self.k = x;
        self
    }
    /// Sets the number of queries per run
    pub fn set_query_count(&mut self, x: usize) -> &mut Self {
        self.query_count = x;
        self
    }
    /// Sets the seed
    pub fn set_rng_seed(&mut self, x: u64) -> &mut Self {
        self.rng_seed = x;
        self
    }
    /// Sets the per run timeout
    pub fn set_run_timeout(&mut self, x: Duration) -> &mut Self {
        self.run_timeout = Some(x);
        self
    }
    /// Sets the small corpus threshold
    pub fn set_small_corpus_threshold(&mut self, x: usize) -> &mut Self {
        self.small_corpus_threshold = x;
        self
    }
    /// Sets the corpus size where the estimator switches branch
    pub fn set_branch_threshold(&mut self, x: usize) -> &mut Self {
        self.branch_threshold = x;
        self
    }
    /// Sets the leaf cutoff of the forests
    pub fn set_leaf_cutoff(&mut self, x: usize) -> &mut Self {
        self.leaf_cutoff = x;
        self
    }
    /// Sets the search multiplier of the forests
    pub fn set_search_k_multiplier(&mut self, x: usize) -> &mut Self {
        self.search_k_multiplier = x;
        self
    }
    /// Sets the size of the worker pool
    pub fn set_threads(&mut self, x: usize) -> &mut Self {
        self.threads = x;
        self
    }
    /// Sets the verbosity
    pub fn set_verbosity(&mut self, x: u32) -> &mut Self {
        self.verbosity = x;
        self
    }
}
