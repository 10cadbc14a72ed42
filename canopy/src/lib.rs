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

#![warn(missing_docs)]

//! # Canopy
//! Calibrates the number of trees a random projection forest should build for a corpus of `n` vectors of
//! dimensionality `d`, so that the recall of its `k` nearest neighbor queries stays in a target band.
//!
//! ## Pipeline
//! A [`Sweep`] builds forests over a grid of corpus sizes, dimensionalities and tree counts and measures
//! their recall against exact neighbors, writing every sample to a [`ResultStore`]. The
//! [`ThresholdExtractor`] reduces the recall surface of each dimensionality to the smallest tree count that
//! reaches the band and stays there. The [`CurveFitter`] fits the constants of an [`EstimatorFormula`] to
//! those thresholds, and the [`Validator`] checks the fitted formula by measuring recall at the tree counts
//! it returns.
//!
//! ## Parameter Guide
//! The band defaults to a recall between 0.8 and 0.9. Below it the forest misses neighbors, above it the
//! extra trees cost build time and ram for little gain. Corpora under the small corpus threshold, 10000
//! vectors by default, aim for the top of the band since their trees are cheap.
//!
//! The corpus sizes and tree counts swept should be powers of two. The estimator only returns powers of two
//! and extraction never extrapolates past the largest tree count swept, so a pair that does not reach the
//! band there is reported as unattainable and left out of the fit.

#[cfg(test)]
#[macro_use]
extern crate assert_approx_eq;

pub mod errors;
pub use errors::{CanopyError, CanopyResult};

pub mod config;
pub use config::CalibrationConfig;

pub mod forest;
pub use forest::{Forest, ForestBuilder};

pub mod oracle;
pub use oracle::GroundTruth;

pub mod benchmark;
pub use benchmark::{BenchmarkConfig, BenchmarkRunner, Measurement};

pub mod store;
pub use store::{BuildMetrics, RecallMatrix, RecallSample, ResultStore, SampleOutcome};

pub mod threshold;
pub use threshold::{ExtractedThreshold, ExtractionPolicy, Threshold, ThresholdExtractor};

pub mod estimator;
pub use estimator::{evaluate, Estimator, EstimatorFormula, RoundingPolicy};

pub mod fitting;
pub use fitting::{CurveFitter, FitReport};

pub mod validator;
pub use validator::{ValidationOutcome, ValidationSummary, Validator, Verdict};

pub mod sweep;
pub use sweep::{calibrate, extract_store, Calibration, Sweep, SweepSummary};

pub mod utils;

pub use core_canopy::*;
