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

//! # Estimator
//! A closed form for the tree count of a corpus of `n` vectors of dimension `d`, piecewise in `n`:
//!
//! * below the branch threshold the exponent is `log2(n) - low_offset`,
//! * at or above it the exponent is `log10(n) + (reference_dimensions / d)^dimension_power`,
//!
//! and the tree count is `2^exponent` put on the power of two lattice `1, 2, 4, ..., max` by a rounding policy.
//! Every swept tree count above 1 is a power of two, so every value the sweep measured can come out.
//!
//! An [`Estimator`] keeps one formula per tolerance band, so a caller can ask for a stricter or looser band
//! than the default one as long as it was calibrated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::{CalibrationConfig, DEFAULT_BRANCH_THRESHOLD};
use crate::errors::{CanopyError, CanopyResult};
use core_canopy::ToleranceBand;

/// Exponents this close under an integer round up to that integer, not the next one
const CEIL_EPSILON: f64 = 1e-9;

/// How an exponent is put on the lattice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundingPolicy {
    /// Next power of two, never under provisions relative to the curve
    Ceil,
    /// Closest power of two in log space
    Nearest,
    /// Previous power of two
    Floor,
}

impl Default for RoundingPolicy {
    fn default() -> RoundingPolicy {
        RoundingPolicy::Ceil
    }
}

impl RoundingPolicy {
    fn apply(&self, exponent: f64) -> f64 {
        match self {
            RoundingPolicy::Ceil => (exponent - CEIL_EPSILON).ceil(),
            RoundingPolicy::Nearest => exponent.round(),
            RoundingPolicy::Floor => (exponent + CEIL_EPSILON).floor(),
        }
    }
}

/// The named constants of the closed form. Immutable once fitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorFormula {
    /// Subtracted from `log2(n)` under the branch threshold
    pub low_offset: f64,
    /// The dimensionality where the dimension term is 1
    pub reference_dimensions: f64,
    /// Exponent of the dimension term
    pub dimension_power: f64,
    /// Corpus size where the formula switches branch
    pub branch_threshold: usize,
    /// Largest tree count returned, rounded down to a power of two
    pub max_tree_count: usize,
    /// How exponents are rounded
    pub rounding: RoundingPolicy,
}

impl Default for EstimatorFormula {
    fn default() -> EstimatorFormula {
        EstimatorFormula::reference(4096)
    }
}

impl fmt::Display for EstimatorFormula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "n < {}: 2^(log2(n) - {}), otherwise 2^(log10(n) + ({} / d)^{}), {:?} to a power of two in [1, {}]",
            self.branch_threshold,
            self.low_offset,
            self.reference_dimensions,
            self.dimension_power,
            self.rounding,
            self.max_exponent_value()
        )
    }
}

impl EstimatorFormula {
    /// The hand crafted curve everything is compared against.
    pub fn reference(max_tree_count: usize) -> EstimatorFormula {
        EstimatorFormula {
            low_offset: 6.0,
            reference_dimensions: 768.0,
            dimension_power: 4.0,
            branch_threshold: DEFAULT_BRANCH_THRESHOLD,
            max_tree_count,
            rounding: RoundingPolicy::Ceil,
        }
    }

    /// The reference curve capped at the largest tree count a configuration sweeps, switching branch at
    /// the configuration's branch threshold.
    pub fn reference_for(config: &CalibrationConfig) -> EstimatorFormula {
        EstimatorFormula {
            branch_threshold: config.branch_threshold,
            ..EstimatorFormula::reference(config.max_tree_count())
        }
    }

    /// Same formula with another rounding policy
    pub fn with_rounding(mut self, rounding: RoundingPolicy) -> EstimatorFormula {
        self.rounding = rounding;
        self
    }

    /// The exponent before rounding. A corpus of 0 is treated as 1 vector, a dimensionality of 0 as 1.
    pub fn exponent(&self, corpus_size: usize, dimensions: usize) -> f64 {
        let n = corpus_size.max(1) as f64;
        if corpus_size < self.branch_threshold {
            n.log2() - self.low_offset
        } else {
            let d = dimensions.max(1) as f64;
            n.log10() + (self.reference_dimensions / d).powf(self.dimension_power)
        }
    }

    /// Largest exponent on the lattice
    fn max_exponent(&self) -> u32 {
        let max = self.max_tree_count.max(1);
        usize::BITS - 1 - max.leading_zeros()
    }

    fn max_exponent_value(&self) -> usize {
        1usize << self.max_exponent()
    }

    /// The tree count for `n` vectors of dimension `d`. Always a power of two in `[1, max_tree_count]`.
    pub fn evaluate(&self, corpus_size: usize, dimensions: usize) -> usize {
        let exponent = self.rounding.apply(self.exponent(corpus_size, dimensions));
        let max_exponent = self.max_exponent();
        let clamped = if exponent.is_nan() || exponent <= 0.0 {
            0
        } else if exponent >= max_exponent as f64 {
            max_exponent
        } else {
            exponent as u32
        };
        1usize << clamped
    }

    /// Every tree count the formula can return, ascending
    pub fn lattice(&self) -> Vec<usize> {
        (0..=self.max_exponent()).map(|e| 1usize << e).collect()
    }

    /// If the tree count does not drop when `n` crosses the branch threshold, for every given dimensionality.
    pub fn is_continuous_at_branch(&self, dimensions: &[usize]) -> bool {
        if self.branch_threshold == 0 {
            return true;
        }
        dimensions.iter().all(|d| {
            self.evaluate(self.branch_threshold - 1, *d) <= self.evaluate(self.branch_threshold, *d)
        })
    }
}

/// Evaluates a formula, see [`EstimatorFormula::evaluate`].
pub fn evaluate(formula: &EstimatorFormula, corpus_size: usize, dimensions: usize) -> usize {
    formula.evaluate(corpus_size, dimensions)
}

/// A formula and the band it was fitted for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedFormula {
    /// The band
    pub band: ToleranceBand,
    /// The formula
    pub formula: EstimatorFormula,
}

/// The formulas calibrated so far, one per band. This is what gets persisted and what callers ask for a
/// tree count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimator {
    default_band: ToleranceBand,
    formulas: BTreeMap<String, CalibratedFormula>,
}

impl Estimator {
    /// An estimator with a single formula, which is also the default.
    pub fn new(band: ToleranceBand, formula: EstimatorFormula) -> Estimator {
        let mut estimator = Estimator {
            default_band: band,
            formulas: BTreeMap::new(),
        };
        estimator.insert(band, formula);
        estimator
    }

    /// The reference curve for the configuration's band
    pub fn reference(config: &CalibrationConfig) -> Estimator {
        Estimator::new(config.band, EstimatorFormula::reference_for(config))
    }

    /// Adds or replaces the formula of a band
    pub fn insert(&mut self, band: ToleranceBand, formula: EstimatorFormula) -> &mut Self {
        self.formulas
            .insert(band.label(), CalibratedFormula { band, formula });
        self
    }

    /// The band used when none is asked for
    pub fn default_band(&self) -> ToleranceBand {
        self.default_band
    }

    /// Every calibrated band
    pub fn bands(&self) -> Vec<ToleranceBand> {
        self.formulas.values().map(|c| c.band).collect()
    }

    /// The formula of a band, the default band if `None`
    pub fn formula_for(&self, band: Option<ToleranceBand>) -> CanopyResult<&EstimatorFormula> {
        let band = band.unwrap_or(self.default_band);
        self.formulas
            .get(&band.label())
            .map(|c| &c.formula)
            .ok_or_else(|| CanopyError::UncalibratedBand(band.to_string()))
    }

    /// The tree count to build for `n` vectors of dimension `d`, under an optional band override.
    pub fn recommended_tree_count(
        &self,
        corpus_size: usize,
        dimensions: usize,
        band: Option<ToleranceBand>,
    ) -> CanopyResult<usize> {
        Ok(self.formula_for(band)?.evaluate(corpus_size, dimensions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_scenarios() {
        let formula = EstimatorFormula::reference(4096);
        assert_eq!(formula.evaluate(1024, 768), 16);
        assert_eq!(formula.evaluate(100_000, 768), 64);
        assert_eq!(formula.evaluate(1_000_000, 1536), 128);
    }

    #[test]
    fn rounding_policies() {
        let formula = EstimatorFormula::reference(4096);
        // log10(1e6) + 0.5^4 = 6.0625
        assert_eq!(
            formula.with_rounding(RoundingPolicy::Floor).evaluate(1_000_000, 1536),
            64
        );
        assert_eq!(
            formula
                .with_rounding(RoundingPolicy::Nearest)
                .evaluate(1_000_000, 1536),
            64
        );
        // Exact powers are not pushed up by float noise
        assert_eq!(formula.evaluate(1000, 768), 16);
        assert_eq!(formula.evaluate(100_000, 768), 64);
    }

    #[test]
    fn always_on_the_lattice() {
        let formula = EstimatorFormula::reference(1000);
        let lattice = formula.lattice();
        assert_eq!(lattice.last(), Some(&512));
        for n in &[0, 1, 2, 63, 64, 9_999, 10_000, 1 << 20, usize::MAX >> 8] {
            for d in &[0, 1, 64, 768, 1536, 3072, 100_000] {
                let t = formula.evaluate(*n, *d);
                assert!(lattice.contains(&t), "n={} d={} gave {}", n, d, t);
                assert!(t >= 1 && t <= 1000);
            }
        }
        assert_eq!(formula.evaluate(0, 768), 1);
        assert_eq!(formula.evaluate(1 << 20, 1), 512);
    }

    #[test]
    fn monotone_within_branches() {
        let formula = EstimatorFormula::reference(4096);
        let mut last = 0;
        for n in (512..10_000).step_by(97) {
            let t = formula.evaluate(n, 768);
            assert!(t >= last);
            last = t;
        }
        let mut last = 0;
        for n in (10_000..2_000_000).step_by(9_973) {
            let t = formula.evaluate(n, 1536);
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn reference_drops_at_the_branch() {
        let formula = EstimatorFormula::reference(4096);
        assert_eq!(formula.evaluate(9_999, 768), 256);
        assert_eq!(formula.evaluate(10_000, 768), 32);
        assert!(!formula.is_continuous_at_branch(&[768]));
    }

    #[test]
    fn reference_follows_the_configured_branch() {
        let mut config = CalibrationConfig::default();
        assert_eq!(EstimatorFormula::reference_for(&config).evaluate(15_000, 768), 64);
        config.set_branch_threshold(20_000);
        let formula = EstimatorFormula::reference_for(&config);
        assert_eq!(formula.branch_threshold, 20_000);
        // log2(15000) - 6 rounds up to 8
        assert_eq!(formula.evaluate(15_000, 768), 256);
        assert_eq!(formula.evaluate(20_000, 768), 64);
    }

    #[test]
    fn band_override() {
        let default_band = ToleranceBand::default();
        let strict = ToleranceBand::new(0.9, 0.95).unwrap();
        let mut estimator = Estimator::new(default_band, EstimatorFormula::reference(4096));
        let mut strict_formula = EstimatorFormula::reference(4096);
        strict_formula.low_offset = 5.0;
        estimator.insert(strict, strict_formula);

        assert_eq!(estimator.recommended_tree_count(1024, 768, None).unwrap(), 16);
        assert_eq!(
            estimator
                .recommended_tree_count(1024, 768, Some(strict))
                .unwrap(),
            32
        );
        let unknown = ToleranceBand::new(0.5, 0.6).unwrap();
        match estimator.recommended_tree_count(1024, 768, Some(unknown)) {
            Err(CanopyError::UncalibratedBand(..)) => (),
            other => panic!("expected an uncalibrated band, got {:?}", other),
        }
        assert_eq!(estimator.bands().len(), 2);
    }

    #[test]
    fn json_round_trip() {
        let estimator = Estimator::reference(&CalibrationConfig::default());
        let json = serde_json::to_string(&estimator).unwrap();
        let back: Estimator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, estimator);
    }
}
