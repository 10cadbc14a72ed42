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
/// Tracks the first two moments of a stream of residuals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Moments {
    /// The number of residuals seen
    pub count: u64,
    /// The first moment, use this with the `count` to get the mean
    pub moment1: f64,
    /// The second moment, use this with the `count` and first moment to get the variance
    pub moment2: f64,
}

impl Moments {
    /// Mean of what was added, 0 when empty
    pub fn mean(&self) -> f64 {
        if self.count > 0 {
            self.moment1 / self.count as f64
        } else {
            0.0
        }
    }

    /// Population variance, 0 when empty
    pub fn var(&self) -> f64 {
        if self.count > 0 {
            let m = self.moment1 / self.count as f64;
            (self.moment2 / self.count as f64 - m * m).max(0.0)
        } else {
            0.0
        }
    }

    /// Bessel corrected variance, `None` with fewer than 2 values
    pub fn sample_var(&self) -> Option<f64> {
        if self.count > 1 {
            let n = self.count as f64;
            Some(self.var() * n / (n - 1.0))
        } else {
            None
        }
    }

    /// Root of the mean of the squares
    pub fn rms(&self) -> f64 {
        if self.count > 0 {
            (self.moment2 / self.count as f64).sqrt()
        } else {
            0.0
        }
    }

    /// Adds a residual
    pub fn add(&mut self, new_stat: f64) {
        self.count += 1;
        self.moment1 += new_stat;
        self.moment2 += new_stat * new_stat;
    }
}

impl std::iter::FromIterator<f64> for Moments {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut moments = Moments::default();
        for x in iter {
            moments.add(x);
        }
        moments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_variance() {
        let moments: Moments = vec![1.0, 2.0, 3.0, 4.0].into_iter().collect();
        assert_eq!(moments.count, 4);
        assert_approx_eq!(moments.mean(), 2.5);
        assert_approx_eq!(moments.var(), 1.25);
        assert_approx_eq!(moments.sample_var().unwrap(), 5.0 / 3.0);
        assert_approx_eq!(moments.rms(), 7.5f64.sqrt());
    }

    #[test]
    fn empty_is_zero() {
        let moments = Moments::default();
        assert_eq!(moments.mean(), 0.0);
        assert_eq!(moments.var(), 0.0);
        assert!(moments.sample_var().is_none());
    }

    #[test]
    fn equal_streams_compare_equal() {
        let a: Moments = vec![0.5, -1.0, 2.0].into_iter().collect();
        let b: Moments = vec![0.5, -1.0, 2.0].into_iter().collect();
        let c: Moments = vec![0.5, -1.0].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
