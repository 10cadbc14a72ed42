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

//! # Threshold Extraction
//! Reduces a row of a recall matrix, the recalls of one `(d, n)` pair over the swept tree counts, to the
//! smallest tree count that satisfies the band.
//!
//! Recall is only roughly monotone in the tree count. A single lucky forest can spike into the band and the
//! next tree count can fall back out of it, so the default policy only accepts a tree count once recall
//! stays at or above the floor for every larger tree count measured. Nothing is extrapolated: if no measured
//! tree count reaches the floor the pair is [`Threshold::Unattainable`].

use log::{debug, warn};
use std::fmt::Debug;

use crate::config::CalibrationConfig;
use crate::store::RecallMatrix;
use core_canopy::ToleranceBand;

/// The outcome of an extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// The smallest satisfying tree count
    Attained(usize),
    /// No swept tree count reaches the floor of the band
    Unattainable,
}

impl Threshold {
    /// The tree count, if one was found
    pub fn tree_count(&self) -> Option<usize> {
        match self {
            Threshold::Attained(t) => Some(*t),
            Threshold::Unattainable => None,
        }
    }
}

/// The threshold of one `(d, n)` pair, with the recall measured there.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedThreshold {
    /// Dimensionality
    pub dimensions: usize,
    /// Corpus size
    pub corpus_size: usize,
    /// The extracted tree count
    pub threshold: Threshold,
    /// The recall at the extracted tree count
    pub recall: Option<f32>,
    /// If the pair targeted the top of the band
    pub small_corpus: bool,
}

/// The rule picking a tree count out of a row. Rows are `(tree count, recall)`, tree count ascending.
pub trait ExtractionPolicy: Debug + Send + Sync {
    /// Picks the tree count with `floor` as the lowest acceptable recall and `ceiling` as the recall
    /// above which trees are wasted. `None` if no tree count is acceptable.
    fn select(&self, row: &[(usize, f32)], floor: f32, ceiling: f32) -> Option<(usize, f32)>;
}

/// Once recovered, stays recovered. A tree count qualifies when its recall and the recall of every larger
/// tree count measured are at or above the floor. Among those the smallest one at or under the ceiling is
/// picked, otherwise the smallest one.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaysRecovered;

impl ExtractionPolicy for StaysRecovered {
    fn select(&self, row: &[(usize, f32)], floor: f32, ceiling: f32) -> Option<(usize, f32)> {
        let start = row
            .iter()
            .rposition(|(_, r)| *r < floor)
            .map(|i| i + 1)
            .unwrap_or(0);
        let qualifying = &row[start..];
        qualifying
            .iter()
            .find(|(_, r)| *r <= ceiling)
            .or_else(|| qualifying.first())
            .cloned()
    }
}

/// The first tree count whose recall lands in `[floor, ceiling]`, otherwise the first one at or above
/// the floor. Sensitive to noise, kept to compare against.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstInBand;

impl ExtractionPolicy for FirstInBand {
    fn select(&self, row: &[(usize, f32)], floor: f32, ceiling: f32) -> Option<(usize, f32)> {
        row.iter()
            .find(|(_, r)| floor <= *r && *r <= ceiling)
            .or_else(|| row.iter().find(|(_, r)| *r >= floor))
            .cloned()
    }
}

/// Applies an extraction policy with the band and the small corpus rule of a configuration.
#[derive(Debug, Clone)]
pub struct ThresholdExtractor<P: ExtractionPolicy = StaysRecovered> {
    band: ToleranceBand,
    small_corpus_threshold: usize,
    policy: P,
}

impl ThresholdExtractor<StaysRecovered> {
    /// An extractor with the default policy
    pub fn new(config: &CalibrationConfig) -> ThresholdExtractor<StaysRecovered> {
        ThresholdExtractor::with_policy(config, StaysRecovered)
    }
}

impl<P: ExtractionPolicy> ThresholdExtractor<P> {
    /// An extractor with another policy
    pub fn with_policy(config: &CalibrationConfig, policy: P) -> ThresholdExtractor<P> {
        ThresholdExtractor {
            band: config.band,
            small_corpus_threshold: config.small_corpus_threshold,
            policy,
        }
    }

    /// The band thresholds are extracted for
    pub fn band(&self) -> ToleranceBand {
        self.band
    }

    /// Same extractor for another band
    pub fn set_band(&mut self, band: ToleranceBand) -> &mut Self {
        self.band = band;
        self
    }

    /// If this corpus size targets the top of the band
    pub fn is_small_corpus(&self, corpus_size: usize) -> bool {
        corpus_size < self.small_corpus_threshold
    }

    /// Picks the tree count of a row. Small corpora first try to stay at or above the top of the band and
    /// fall back to the plain band when no tree count gets there.
    pub fn select(&self, row: &[(usize, f32)], corpus_size: usize) -> Option<(usize, f32)> {
        if self.is_small_corpus(corpus_size) {
            if let Some(pick) = self.policy.select(row, self.band.high, self.band.high) {
                return Some(pick);
            }
            debug!(
                "n={} never stays at {:.2}, falling back to the band {}",
                corpus_size, self.band.high, self.band
            );
        }
        self.policy.select(row, self.band.low, self.band.high)
    }

    /// The minimum tree count of a `(d, n)` pair of the matrix.
    pub fn minimum_tree_count(&self, matrix: &RecallMatrix, corpus_size: usize) -> Threshold {
        match self.select(&matrix.row(corpus_size), corpus_size) {
            Some((t, _)) => Threshold::Attained(t),
            None => Threshold::Unattainable,
        }
    }

    /// Extracts every corpus size of the matrix, in order. Unattainable pairs are kept and logged.
    pub fn extract_all(&self, matrix: &RecallMatrix) -> Vec<ExtractedThreshold> {
        matrix
            .corpus_sizes()
            .into_iter()
            .map(|n| {
                let pick = self.select(&matrix.row(n), n);
                let threshold = match pick {
                    Some((t, _)) => Threshold::Attained(t),
                    None => {
                        warn!(
                            "d={} n={} never reaches {:.2}, it is unattainable",
                            matrix.dimensions(),
                            n,
                            self.band.low
                        );
                        Threshold::Unattainable
                    }
                };
                ExtractedThreshold {
                    dimensions: matrix.dimensions(),
                    corpus_size: n,
                    threshold,
                    recall: pick.map(|(_, r)| r),
                    small_corpus: self.is_small_corpus(n),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ThresholdExtractor {
        ThresholdExtractor::new(&CalibrationConfig::default())
    }

    fn matrix(n: usize, row: &[(usize, f32)]) -> RecallMatrix {
        let cells: Vec<(usize, usize, f32)> = row.iter().map(|(t, r)| (n, *t, *r)).collect();
        RecallMatrix::from_cells(768, &cells)
    }

    #[test]
    fn smallest_tree_count_in_band() {
        let m = matrix(
            100_000,
            &[(1, 0.2), (8, 0.5), (32, 0.75), (64, 0.84), (128, 0.93), (256, 0.97)],
        );
        assert_eq!(
            extractor().minimum_tree_count(&m, 100_000),
            Threshold::Attained(64)
        );
    }

    #[test]
    fn noisy_spike_is_not_selected() {
        let m = matrix(
            100_000,
            &[
                (1, 0.0),
                (8, 0.85),
                (32, 0.6),
                (64, 0.7),
                (128, 0.82),
                (4096, 0.95),
            ],
        );
        let threshold = extractor().minimum_tree_count(&m, 100_000);
        assert_eq!(threshold, Threshold::Attained(128));
        // The naive policy takes the spike
        let naive = ThresholdExtractor::with_policy(&CalibrationConfig::default(), FirstInBand);
        assert_eq!(naive.minimum_tree_count(&m, 100_000), Threshold::Attained(8));
    }

    #[test]
    fn recall_never_reaching_the_floor_is_unattainable() {
        let m = matrix(1 << 20, &[(1, 0.01), (64, 0.3), (4096, 0.79)]);
        assert_eq!(
            extractor().minimum_tree_count(&m, 1 << 20),
            Threshold::Unattainable
        );
        let all = extractor().extract_all(&m);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].threshold, Threshold::Unattainable);
        assert_eq!(all[0].recall, None);
    }

    #[test]
    fn overshoot_is_accepted_when_nothing_lands_in_band() {
        let m = matrix(50_000, &[(1, 0.5), (8, 0.95), (32, 0.99)]);
        assert_eq!(
            extractor().minimum_tree_count(&m, 50_000),
            Threshold::Attained(8)
        );
    }

    #[test]
    fn small_corpora_target_the_top_of_the_band() {
        let m = matrix(1024, &[(1, 0.5), (8, 0.82), (32, 0.88), (64, 0.93), (128, 0.99)]);
        let all = extractor().extract_all(&m);
        assert_eq!(all[0].threshold, Threshold::Attained(64));
        assert!(all[0].small_corpus);
        assert!(all[0].recall.unwrap() >= 0.8);
    }

    #[test]
    fn small_corpora_fall_back_to_the_band() {
        let m = matrix(1024, &[(1, 0.5), (8, 0.82), (32, 0.88)]);
        assert_eq!(
            extractor().minimum_tree_count(&m, 1024),
            Threshold::Attained(8)
        );
    }

    #[test]
    fn extracted_counts_stay_recovered() {
        let rows: Vec<Vec<(usize, f32)>> = vec![
            vec![(1, 0.9), (8, 0.7), (32, 0.85), (64, 0.81)],
            vec![(1, 0.1), (8, 0.95), (32, 0.79), (64, 0.91), (128, 0.88)],
            vec![(1, 0.81), (8, 0.83), (32, 0.85)],
        ];
        let band = ToleranceBand::default();
        for row in rows {
            let m = matrix(20_000, &row);
            let t = extractor()
                .minimum_tree_count(&m, 20_000)
                .tree_count()
                .unwrap();
            let recall = m.recall(20_000, t).unwrap();
            assert!(band.contains(recall));
            for (later, r) in m.row(20_000) {
                if later > t {
                    assert!(r >= band.low);
                }
            }
        }
    }
}
