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

//! Student t intervals over the mean of a set of residuals.

use crate::Moments;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// A two sided interval around a mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// The confidence level, e.g. 0.95
    pub level: f64,
    /// Lower end
    pub lower: f64,
    /// Upper end
    pub upper: f64,
}

impl ConfidenceInterval {
    /// If the interval covers `x`
    pub fn contains(&self, x: f64) -> bool {
        self.lower <= x && x <= self.upper
    }

    /// Half the width of the interval
    pub fn half_width(&self) -> f64 {
        (self.upper - self.lower) / 2.0
    }
}

/// Confidence interval of the mean of the values summarised by `moments`.
///
/// Returns `None` with fewer than 2 values or a level outside of `(0, 1)`. A zero variance collapses the
/// interval onto the mean.
pub fn mean_confidence_interval(moments: &Moments, level: f64) -> Option<ConfidenceInterval> {
    if !(level > 0.0 && level < 1.0) {
        return None;
    }
    let sample_var = moments.sample_var()?;
    let mean = moments.mean();
    let standard_error = (sample_var / moments.count as f64).sqrt();
    if standard_error == 0.0 {
        return Some(ConfidenceInterval {
            level,
            lower: mean,
            upper: mean,
        });
    }
    let freedom = (moments.count - 1) as f64;
    let t = StudentsT::new(0.0, 1.0, freedom).ok()?;
    let critical = t.inverse_cdf(0.5 + level / 2.0);
    Some(ConfidenceInterval {
        level,
        lower: mean - critical * standard_error,
        upper: mean + critical * standard_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_centered_on_the_mean() {
        let moments: Moments = vec![1.0, 2.0, 3.0, 4.0, 5.0].into_iter().collect();
        let ci = mean_confidence_interval(&moments, 0.95).unwrap();
        assert_approx_eq!((ci.lower + ci.upper) / 2.0, 3.0);
        // t_{0.975, 4} = 2.776, standard error = sqrt(2.5 / 5)
        assert_approx_eq!(ci.half_width(), 2.776 * 0.5f64.sqrt(), 1e-2);
        assert!(ci.contains(3.0));
    }

    #[test]
    fn wider_for_higher_levels() {
        let moments: Moments = vec![0.5, -0.25, 1.0, 0.0, 0.75, -0.5].into_iter().collect();
        let narrow = mean_confidence_interval(&moments, 0.8).unwrap();
        let wide = mean_confidence_interval(&moments, 0.99).unwrap();
        assert!(wide.half_width() > narrow.half_width());
    }

    #[test]
    fn degenerate_inputs() {
        let single: Moments = vec![1.0].into_iter().collect();
        assert!(mean_confidence_interval(&single, 0.95).is_none());
        let constant: Moments = vec![2.0, 2.0, 2.0].into_iter().collect();
        let ci = mean_confidence_interval(&constant, 0.95).unwrap();
        assert_approx_eq!(ci.lower, 2.0);
        assert_approx_eq!(ci.upper, 2.0);
        assert!(mean_confidence_interval(&constant, 1.0).is_none());
    }
}
