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

//! Utility functions for i/o

use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::errors::CanopyResult;
use crate::estimator::Estimator;

/// Writes an estimator as JSON, overwriting the file.
pub fn save_estimator<P: AsRef<Path>>(estimator: &Estimator, path: P) -> CanopyResult<()> {
    save_json(estimator, path)
}

/// Reads an estimator written by [`save_estimator`].
pub fn load_estimator<P: AsRef<Path>>(path: P) -> CanopyResult<Estimator> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Writes anything serializable as pretty JSON, fit reports for instance.
pub fn save_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> CanopyResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalibrationConfig;
    use crate::errors::CanopyError;
    use crate::estimator::EstimatorFormula;
    use core_canopy::ToleranceBand;
    use std::fs;
    use tempdir::TempDir;

    #[test]
    fn estimator_round_trip() {
        let dir = TempDir::new("estimator").unwrap();
        let path = dir.path().join("estimator.json");
        let mut estimator = Estimator::reference(&CalibrationConfig::default());
        let mut strict = EstimatorFormula::reference(4096);
        strict.low_offset = 4.5;
        estimator.insert(ToleranceBand::new(0.9, 0.95).unwrap(), strict);

        save_estimator(&estimator, &path).unwrap();
        let reloaded = load_estimator(&path).unwrap();
        assert_eq!(reloaded, estimator);
        assert_eq!(reloaded.recommended_tree_count(100_000, 768, None).unwrap(), 64);
    }

    #[test]
    fn garbage_is_a_parsing_error() {
        let dir = TempDir::new("estimator_garbage").unwrap();
        let path = dir.path().join("estimator.json");
        fs::write(&path, "{\"default_band\": 3}").unwrap();
        match load_estimator(&path) {
            Err(CanopyError::ParsingError(..)) => (),
            other => panic!("expected a parsing error, got {:?}", other),
        }
        match load_estimator(dir.path().join("missing.json")) {
            Err(CanopyError::IoError(..)) => (),
            other => panic!("expected an io error, got {:?}", other),
        }
    }
}
