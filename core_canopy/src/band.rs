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

use serde::{Deserialize, Serialize};
use std::fmt;

/// The recall range a tree count is calibrated to hit. Both ends are inclusive.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToleranceBand {
    /// Lowest acceptable recall
    pub low: f32,
    /// Recall above this wastes trees
    pub high: f32,
}

impl Default for ToleranceBand {
    fn default() -> ToleranceBand {
        ToleranceBand {
            low: 0.8,
            high: 0.9,
        }
    }
}

impl fmt::Display for ToleranceBand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:.2}, {:.2}]", self.low, self.high)
    }
}

impl ToleranceBand {
    /// Returns `None` unless `0 <= low <= high <= 1`.
    pub fn new(low: f32, high: f32) -> Option<ToleranceBand> {
        if (0.0..=1.0).contains(&low) && (0.0..=1.0).contains(&high) && low <= high {
            Some(ToleranceBand { low, high })
        } else {
            None
        }
    }

    /// If the recall lies in `[low, high]`
    #[inline]
    pub fn contains(&self, recall: f32) -> bool {
        self.low <= recall && recall <= self.high
    }

    /// If the recall clears the bottom of the band
    #[inline]
    pub fn reached(&self, recall: f32) -> bool {
        recall >= self.low
    }

    /// The band used when data is scarce: the floor is lifted to `high`.
    pub fn upper(&self) -> ToleranceBand {
        ToleranceBand {
            low: self.high,
            high: self.high,
        }
    }

    /// Stable identifier used to key bands in persisted estimators, e.g. `0.80-0.90`.
    pub fn label(&self) -> String {
        format!("{:.2}-{:.2}", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_band() {
        let band = ToleranceBand::default();
        assert!(band.contains(0.8));
        assert!(band.contains(0.9));
        assert!(!band.contains(0.95));
        assert!(band.reached(0.95));
        assert!(!band.reached(0.79));
        assert_eq!(band.label(), "0.80-0.90");
    }

    #[test]
    fn inverted_band_is_rejected() {
        assert!(ToleranceBand::new(0.9, 0.8).is_none());
        assert!(ToleranceBand::new(-0.1, 0.8).is_none());
        assert!(ToleranceBand::new(0.5, 1.1).is_none());
        assert!(ToleranceBand::new(0.5, 0.5).is_some());
    }

    #[test]
    fn upper_band_targets_high() {
        let upper = ToleranceBand::default().upper();
        assert!(!upper.reached(0.85));
        assert!(upper.reached(0.9));
    }
}
