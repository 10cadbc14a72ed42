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

use canopy::*;
use vectorcloud::*;

use tempdir::TempDir;

fn small_config() -> CalibrationConfig {
    let mut config = CalibrationConfig::default();
    config
        .set_dimensions(vec![16])
        .set_corpus_sizes(vec![256, 512])
        .set_tree_counts(vec![1, 4, 16, 64])
        .set_k(5)
        .set_query_count(16)
        .set_leaf_cutoff(8);
    config
}

#[test]
fn reference_scenarios() {
    let estimator = Estimator::reference(&CalibrationConfig::default());
    assert_eq!(estimator.recommended_tree_count(1024, 768, None).unwrap(), 16);
    assert_eq!(estimator.recommended_tree_count(100_000, 768, None).unwrap(), 64);
    assert_eq!(estimator.recommended_tree_count(1_000_000, 1536, None).unwrap(), 128);
}

#[test]
fn noisy_spike_is_not_selected() {
    let config = CalibrationConfig::default();
    let n = 100_000;
    let cells: Vec<(usize, usize, f32)> = vec![
        (n, 1, 0.0),
        (n, 8, 0.85),
        (n, 32, 0.4),
        (n, 64, 0.7),
        (n, 128, 0.82),
        (n, 256, 0.88),
        (n, 512, 0.91),
        (n, 1024, 0.93),
        (n, 2048, 0.94),
        (n, 4096, 0.95),
    ];
    let matrix = RecallMatrix::from_cells(768, &cells);
    let extractor = ThresholdExtractor::new(&config);
    assert_eq!(
        extractor.minimum_tree_count(&matrix, n),
        Threshold::Attained(128)
    );
    let extracted = extractor.extract_all(&matrix);
    assert_eq!(extracted.len(), 1);
    assert_eq!(extracted[0].recall, Some(0.82));
    // Every larger tree count stays at or above the floor
    for (t, r) in matrix.row(n) {
        if t > 128 {
            assert!(config.band.reached(r));
        }
    }
}

#[test]
fn noisy_spike_on_a_small_corpus() {
    let config = CalibrationConfig::default();
    let n = 512;
    let cells: Vec<(usize, usize, f32)> = vec![
        (n, 1, 0.0),
        (n, 8, 0.93),
        (n, 32, 0.7),
        (n, 64, 0.85),
        (n, 128, 0.91),
        (n, 4096, 0.95),
    ];
    let matrix = RecallMatrix::from_cells(768, &cells);
    let extractor = ThresholdExtractor::new(&config);
    assert!(extractor.is_small_corpus(n));
    let threshold = extractor.minimum_tree_count(&matrix, n);
    assert_ne!(threshold, Threshold::Attained(1));
    assert_ne!(threshold, Threshold::Attained(8));
    // Small corpora target the top of the band, 64 only reaches its bottom
    assert_eq!(threshold, Threshold::Attained(128));
    let extracted = extractor.extract_all(&matrix);
    assert_eq!(extracted.len(), 1);
    assert!(extracted[0].small_corpus);
    assert_eq!(extracted[0].recall, Some(0.91));
}

#[test]
fn evaluate_stays_on_the_progression() {
    let config = CalibrationConfig::default();
    let formula = EstimatorFormula::reference_for(&config);
    for n in config.corpus_sizes.iter() {
        for d in [64usize, 128, 768, 1536, 3072, 8192].iter() {
            let t = evaluate(&formula, *n, *d);
            assert!(t.is_power_of_two());
            assert!(t >= 1 && t <= config.max_tree_count());
        }
    }
}

#[test]
fn sweep_log_round_trip() {
    let dir = TempDir::new("calibration").unwrap();
    let log = dir.path().join("samples.csv");
    let config = small_config();
    let provider = SyntheticProvider::new();
    {
        let store = ResultStore::with_log(&log).unwrap();
        let summary = Sweep::<L2>::new(&config, &provider)
            .unwrap()
            .run(&store)
            .unwrap();
        assert_eq!(summary.recorded, 8);
        assert_eq!(summary.errored, 0);
    }
    let reloaded = ResultStore::load_csv(&log).unwrap();
    assert_eq!(reloaded.len(), 8);
    for sample in reloaded.samples() {
        let build = sample.build.unwrap();
        assert!(build.node_count >= sample.key.tree_count());
    }
    let matrix = reloaded.matrix_for(16);
    assert_eq!(matrix.corpus_sizes(), vec![256, 512]);
    assert_eq!(matrix.tree_counts(), vec![1, 4, 16, 64]);
    // 64 trees look at 320 candidates, the whole smaller corpus
    assert_eq!(matrix.recall(256, 64), Some(1.0));

    let thresholds = extract_store(&config, &reloaded);
    assert_eq!(thresholds.len(), 2);
    let report = CurveFitter::new(&config).fit(&thresholds).unwrap();
    assert_eq!(report.residuals.len() + report.excluded, 2);
}

#[test]
fn calibrate_then_validate() {
    let config = small_config();
    let provider = SyntheticProvider::new();
    let store = ResultStore::new();
    let calibration = calibrate::<L2>(&config, &provider, &store).unwrap();
    assert_eq!(calibration.sweep.recorded, 8);

    let mut loaded = SyntheticProvider::new();
    loaded.set_query_count(config.query_count);
    let datasets: Vec<Dataset<L2>> = vec![loaded.load(16, 512).unwrap()];
    let estimator = calibration.estimator(&config);
    let formula = estimator.formula_for(None).unwrap();
    let validator = Validator::new(&config, *formula, "synthetic", &datasets);
    let outcomes: Vec<ValidationOutcome> = validator
        .validate(&Validator::<L2>::grid(&config))
        .collect();
    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert_eq!(
            outcome.config.tree_count,
            formula.evaluate(outcome.config.corpus_size, 16)
        );
        assert!(outcome.observed_recall.is_some());
    }
    let summary: ValidationSummary = outcomes.iter().collect();
    assert_eq!(summary.total(), 2);
    assert_eq!(summary.errored, 0);
}

#[test]
fn band_override_needs_calibration() {
    let estimator = Estimator::reference(&CalibrationConfig::default());
    let strict = ToleranceBand::new(0.95, 0.99).unwrap();
    match estimator.recommended_tree_count(1024, 768, Some(strict)) {
        Err(CanopyError::UncalibratedBand(band)) => assert_eq!(band, strict.to_string()),
        other => panic!("expected an uncalibrated band, got {:?}", other),
    }
}
