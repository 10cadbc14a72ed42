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

//! # Curve fitting
//! Searches the constants of an [`EstimatorFormula`] over a grid, scoring each candidate against the
//! extracted thresholds in progression steps: the residual of a pair is `log2(estimated) - log2(extracted)`,
//! so one step up or down the power of two lattice counts 1.
//!
//! Candidates are ranked, in order, by the number of under provisioned pairs, the summed absolute residual,
//! and the distance of their constants to the reference curve. A candidate that drops when `n` crosses the
//! branch threshold is only picked when no candidate is continuous there.

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::config::CalibrationConfig;
use crate::errors::{CanopyError, CanopyResult};
use crate::estimator::{EstimatorFormula, RoundingPolicy};
use crate::threshold::ExtractedThreshold;
use stats_canopy::{mean_confidence_interval, ConfidenceInterval, Moments};

/// Level of the interval reported around the mean residual
pub const RESIDUAL_CONFIDENCE: f64 = 0.95;

/// Distance of a pair's estimate to its extracted threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Residual {
    /// Dimensionality
    pub dimensions: usize,
    /// Corpus size
    pub corpus_size: usize,
    /// Extracted threshold
    pub extracted: usize,
    /// What the formula returns
    pub estimated: usize,
    /// `log2(estimated) - log2(extracted)`, negative when under provisioned
    pub log2_residual: f64,
}

impl Residual {
    fn new(formula: &EstimatorFormula, dimensions: usize, corpus_size: usize, extracted: usize) -> Self {
        let estimated = formula.evaluate(corpus_size, dimensions);
        Residual {
            dimensions,
            corpus_size,
            extracted,
            estimated,
            log2_residual: (estimated as f64).log2() - (extracted.max(1) as f64).log2(),
        }
    }

    /// If the formula builds fewer trees than the pair needs
    pub fn is_under_provisioned(&self) -> bool {
        self.estimated < self.extracted
    }
}

/// How a set of residuals looks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualSummary {
    /// Number of under provisioned pairs
    pub under_provisioned: usize,
    /// Sum of the absolute residuals
    pub total_abs: f64,
    /// Moments of the signed residuals
    pub moments: Moments,
    /// Interval around the mean signed residual, `None` with fewer than two pairs
    pub interval: Option<ConfidenceInterval>,
}

impl ResidualSummary {
    fn new(residuals: &[Residual]) -> ResidualSummary {
        let moments: Moments = residuals.iter().map(|r| r.log2_residual).collect();
        ResidualSummary {
            under_provisioned: residuals.iter().filter(|r| r.is_under_provisioned()).count(),
            total_abs: residuals.iter().map(|r| r.log2_residual.abs()).sum(),
            interval: mean_confidence_interval(&moments, RESIDUAL_CONFIDENCE),
            moments,
        }
    }
}

/// The fitted formula with how it, and the reference curve, sit against the extracted thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// The fitted formula
    pub formula: EstimatorFormula,
    /// The reference curve
    pub baseline: EstimatorFormula,
    /// Per pair residuals of the fitted formula, ordered by `(d, n)`
    pub residuals: Vec<Residual>,
    /// Per pair residuals of the reference curve
    pub baseline_residuals: Vec<Residual>,
    /// Summary of the fitted residuals
    pub summary: ResidualSummary,
    /// Summary of the reference residuals
    pub baseline_summary: ResidualSummary,
    /// Unattainable pairs left out of the fit
    pub excluded: usize,
    /// If the fitted formula does not drop across the branch threshold
    pub continuous: bool,
}

impl fmt::Display for FitReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "fitted:    {}", self.formula)?;
        writeln!(f, "reference: {}", self.baseline)?;
        writeln!(
            f,
            "{:>6} {:>9} {:>9} {:>9} {:>9} {:>9}",
            "d", "n", "extracted", "fitted", "reference", "residual"
        )?;
        for (fitted, baseline) in self.residuals.iter().zip(&self.baseline_residuals) {
            writeln!(
                f,
                "{:>6} {:>9} {:>9} {:>9} {:>9} {:>+9.1}",
                fitted.dimensions,
                fitted.corpus_size,
                fitted.extracted,
                fitted.estimated,
                baseline.estimated,
                fitted.log2_residual
            )?;
        }
        write!(
            f,
            "under provisioned: {} fitted, {} reference. mean residual {:.3}, rms {:.3}",
            self.summary.under_provisioned,
            self.baseline_summary.under_provisioned,
            self.summary.moments.mean(),
            self.summary.moments.rms()
        )?;
        if let Some(interval) = &self.summary.interval {
            write!(
                f,
                " ({:.0}% interval [{:.3}, {:.3}])",
                interval.level * 100.0,
                interval.lower,
                interval.upper
            )?;
        }
        if self.excluded > 0 {
            write!(f, ". {} unattainable pairs excluded", self.excluded)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Score {
    discontinuous: bool,
    under_provisioned: usize,
    total_abs: f64,
    distance: f64,
    index: usize,
}

impl Score {
    fn cmp(&self, other: &Score) -> Ordering {
        self.discontinuous
            .cmp(&other.discontinuous)
            .then(self.under_provisioned.cmp(&other.under_provisioned))
            .then(
                self.total_abs
                    .partial_cmp(&other.total_abs)
                    .unwrap_or(Ordering::Equal),
            )
            .then(
                self.distance
                    .partial_cmp(&other.distance)
                    .unwrap_or(Ordering::Equal),
            )
            .then(self.index.cmp(&other.index))
    }
}

/// Fits formulas to extracted thresholds.
#[derive(Debug, Clone)]
pub struct CurveFitter {
    baseline: EstimatorFormula,
    branch_threshold: usize,
    continuity_dimensions: Vec<usize>,
    rounding: RoundingPolicy,
    low_offsets: Vec<f64>,
    reference_dimensions: Vec<f64>,
    dimension_powers: Vec<f64>,
}

impl CurveFitter {
    /// A fitter over the default grid, capped at the configuration's largest tree count.
    pub fn new(config: &CalibrationConfig) -> CurveFitter {
        CurveFitter {
            baseline: EstimatorFormula::reference_for(config),
            branch_threshold: config.branch_threshold,
            continuity_dimensions: config.dimensions.clone(),
            rounding: RoundingPolicy::default(),
            low_offsets: (0..=24).map(|i| i as f64 * 0.5).collect(),
            reference_dimensions: vec![
                128.0, 192.0, 256.0, 384.0, 512.0, 640.0, 768.0, 1024.0, 1280.0, 1536.0, 2048.0,
                3072.0, 4096.0,
            ],
            dimension_powers: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0],
        }
    }

    /// Rounding of the fitted formula
    pub fn set_rounding(&mut self, x: RoundingPolicy) -> &mut Self {
        self.rounding = x;
        self
    }
    /// Candidate low offsets
    pub fn set_low_offsets(&mut self, x: Vec<f64>) -> &mut Self {
        self.low_offsets = x;
        self
    }
    /// Candidate reference dimensionalities
    pub fn set_reference_dimensions(&mut self, x: Vec<f64>) -> &mut Self {
        self.reference_dimensions = x;
        self
    }
    /// Candidate dimension powers
    pub fn set_dimension_powers(&mut self, x: Vec<f64>) -> &mut Self {
        self.dimension_powers = x;
        self
    }

    /// The reference curve, rounded like the fitted one
    pub fn baseline(&self) -> EstimatorFormula {
        self.baseline.with_rounding(self.rounding)
    }

    fn candidates(&self, thresholds: &[(usize, usize, usize)]) -> Vec<EstimatorFormula> {
        let mut branches: Vec<usize> = thresholds.iter().map(|(_, n, _)| *n).collect();
        branches.push(self.branch_threshold);
        branches.sort_unstable();
        branches.dedup();

        let mut candidates = Vec::with_capacity(
            branches.len()
                * self.low_offsets.len()
                * self.reference_dimensions.len()
                * self.dimension_powers.len(),
        );
        for branch_threshold in &branches {
            for low_offset in &self.low_offsets {
                for reference_dimensions in &self.reference_dimensions {
                    for dimension_power in &self.dimension_powers {
                        candidates.push(EstimatorFormula {
                            low_offset: *low_offset,
                            reference_dimensions: *reference_dimensions,
                            dimension_power: *dimension_power,
                            branch_threshold: *branch_threshold,
                            max_tree_count: self.baseline.max_tree_count,
                            rounding: self.rounding,
                        });
                    }
                }
            }
        }
        candidates
    }

    fn distance_to_reference(&self, formula: &EstimatorFormula) -> f64 {
        let baseline = self.baseline();
        (formula.low_offset - baseline.low_offset).abs()
            + (formula.reference_dimensions / baseline.reference_dimensions)
                .log2()
                .abs()
            + (formula.dimension_power - baseline.dimension_power).abs()
            + (formula.branch_threshold.max(1) as f64 / baseline.branch_threshold as f64)
                .log10()
                .abs()
    }

    fn residuals(formula: &EstimatorFormula, thresholds: &[(usize, usize, usize)]) -> Vec<Residual> {
        thresholds
            .iter()
            .map(|(d, n, t)| Residual::new(formula, *d, *n, *t))
            .collect()
    }

    /// Fits a formula to the attainable thresholds. Fails with `EmptyFittingSet` when there are none.
    pub fn fit(&self, extracted: &[ExtractedThreshold]) -> CanopyResult<FitReport> {
        let mut thresholds: Vec<(usize, usize, usize)> = extracted
            .iter()
            .filter_map(|e| {
                e.threshold
                    .tree_count()
                    .map(|t| (e.dimensions, e.corpus_size, t))
            })
            .collect();
        thresholds.sort_unstable();
        let excluded = extracted.len() - thresholds.len();
        if thresholds.is_empty() {
            return Err(CanopyError::EmptyFittingSet);
        }

        let mut dimensions = self.continuity_dimensions.clone();
        dimensions.extend(thresholds.iter().map(|(d, _, _)| *d));
        dimensions.sort_unstable();
        dimensions.dedup();

        let candidates = self.candidates(&thresholds);
        info!(
            "Fitting {} pairs over {} candidate formulas, {} unattainable pairs excluded",
            thresholds.len(),
            candidates.len(),
            excluded
        );
        let best = candidates
            .par_iter()
            .enumerate()
            .map(|(index, formula)| {
                let mut under_provisioned = 0;
                let mut total_abs = 0.0;
                for (d, n, t) in &thresholds {
                    let residual = Residual::new(formula, *d, *n, *t);
                    if residual.is_under_provisioned() {
                        under_provisioned += 1;
                    }
                    total_abs += residual.log2_residual.abs();
                }
                Score {
                    discontinuous: !formula.is_continuous_at_branch(&dimensions),
                    under_provisioned,
                    total_abs,
                    distance: self.distance_to_reference(formula),
                    index,
                }
            })
            .min_by(|a, b| a.cmp(b))
            .ok_or(CanopyError::EmptyFittingSet)?;

        let formula = candidates[best.index];
        if best.discontinuous {
            warn!(
                "No candidate keeps the tree count from dropping at the branch, using {}",
                formula
            );
        }
        let baseline = self.baseline();
        let residuals = CurveFitter::residuals(&formula, &thresholds);
        let baseline_residuals = CurveFitter::residuals(&baseline, &thresholds);
        let report = FitReport {
            formula,
            baseline,
            summary: ResidualSummary::new(&residuals),
            baseline_summary: ResidualSummary::new(&baseline_residuals),
            residuals,
            baseline_residuals,
            excluded,
            continuous: !best.discontinuous,
        };
        info!(
            "Fitted {}, {} under provisioned pairs against {} for the reference",
            report.formula,
            report.summary.under_provisioned,
            report.baseline_summary.under_provisioned
        );
        Ok(report)
    }
}
