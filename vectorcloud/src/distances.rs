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

//! Supported distances

use crate::errors::*;
use std::fmt;
use std::fmt::Debug;
use std::str::FromStr;

/// The trait that enables a metric
pub trait Metric: 'static + Send + Sync + Debug + Clone + Default {
    /// Angular metrics only look at directions. Trees split normalised vectors with hyperplanes through the origin.
    const ANGULAR: bool = false;
    /// Dense calculation
    fn dense(x: &[f32], y: &[f32]) -> f32;
    /// The norm, dense(x,0)
    fn norm(x: &[f32]) -> f32;
    /// Short name, used in sample records
    fn name() -> &'static str;
    /// The runtime tag of this metric
    fn kind() -> MetricKind;
    /// Checked calculation
    fn dist(x: &[f32], y: &[f32]) -> CloudResult<f32> {
        if x.len() != y.len() {
            return Err(CloudError::DimensionMismatch {
                expected: x.len(),
                found: y.len(),
            });
        }
        Ok((Self::dense)(x, y))
    }
}

/// Plain dot product
#[inline]
pub fn dot(x: &[f32], y: &[f32]) -> f32 {
    x.iter().zip(y).map(|(xi, yi)| xi * yi).sum()
}

/// L2 norm, the square root of the sum of squares
#[derive(Debug, Clone, Default)]
pub struct L2 {}

impl Metric for L2 {
    #[inline]
    fn dense(x: &[f32], y: &[f32]) -> f32 {
        x.iter()
            .zip(y)
            .map(|(xi, yi)| (xi - yi) * (xi - yi))
            .sum::<f32>()
            .sqrt()
    }

    #[inline]
    fn norm(x: &[f32]) -> f32 {
        dot(x, x).sqrt()
    }

    fn name() -> &'static str {
        "l2"
    }

    fn kind() -> MetricKind {
        MetricKind::L2
    }
}

/// L1 norm, the sum of absolute values
#[derive(Debug, Clone, Default)]
pub struct L1 {}

impl Metric for L1 {
    #[inline]
    fn dense(x: &[f32], y: &[f32]) -> f32 {
        x.iter().zip(y).map(|(xi, yi)| (xi - yi).abs()).sum()
    }

    #[inline]
    fn norm(x: &[f32]) -> f32 {
        x.iter().map(|xi| xi.abs()).sum()
    }

    fn name() -> &'static str {
        "l1"
    }

    fn kind() -> MetricKind {
        MetricKind::L1
    }
}

/// Cosine distance, `1 - cos(x, y)`. Lies in `[0, 2]`.
#[derive(Debug, Clone, Default)]
pub struct Cosine {}

impl Metric for Cosine {
    const ANGULAR: bool = true;

    #[inline]
    fn dense(x: &[f32], y: &[f32]) -> f32 {
        let norms = L2::norm(x) * L2::norm(y);
        if norms == 0.0 {
            // Two zero vectors are the same point, a zero vector has no angle to anything else.
            if L2::norm(x) == L2::norm(y) {
                return 0.0;
            }
            return 1.0;
        }
        (1.0 - dot(x, y) / norms).max(0.0)
    }

    #[inline]
    fn norm(x: &[f32]) -> f32 {
        L2::norm(x)
    }

    fn name() -> &'static str {
        "cosine"
    }

    fn kind() -> MetricKind {
        MetricKind::Cosine
    }
}

/// Runtime choice of metric, for command lines and sample records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// [`L2`]
    L2,
    /// [`L1`]
    L1,
    /// [`Cosine`]
    Cosine,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetricKind::L2 => write!(f, "{}", L2::name()),
            MetricKind::L1 => write!(f, "{}", L1::name()),
            MetricKind::Cosine => write!(f, "{}", Cosine::name()),
        }
    }
}

impl FromStr for MetricKind {
    type Err = String;
    fn from_str(s: &str) -> Result<MetricKind, String> {
        match s.trim().to_lowercase().as_str() {
            "l2" | "euclidean" => Ok(MetricKind::L2),
            "l1" | "manhattan" => Ok(MetricKind::L1),
            "cosine" | "angular" => Ok(MetricKind::Cosine),
            other => Err(format!(
                "unknown metric `{}`, expected one of cosine, l2, l1",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_distance() {
        let x = [0.0, 3.0, 0.0];
        let y = [4.0, 0.0, 0.0];
        assert_approx_eq!(L2::dense(&x, &y), 5.0);
        assert_approx_eq!(L2::norm(&x), 3.0);
    }

    #[test]
    fn l1_distance() {
        let x = [1.0, -2.0, 0.5];
        let y = [0.0, 2.0, 0.5];
        assert_approx_eq!(L1::dense(&x, &y), 5.0);
        assert_approx_eq!(L1::norm(&x), 3.5);
    }

    #[test]
    fn cosine_distance() {
        let x = [1.0, 0.0];
        let y = [0.0, 2.0];
        let z = [3.0, 0.0];
        assert_approx_eq!(Cosine::dense(&x, &y), 1.0);
        assert_approx_eq!(Cosine::dense(&x, &z), 0.0);
        assert_approx_eq!(Cosine::dense(&x, &[-1.0, 0.0]), 2.0);
        assert_approx_eq!(Cosine::dense(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_approx_eq!(Cosine::dense(&x, &[0.0, 0.0]), 1.0);
    }

    #[test]
    fn checked_distance_rejects_mismatch() {
        match L2::dist(&[1.0, 2.0], &[1.0]) {
            Err(CloudError::DimensionMismatch { expected, found }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("expected a dimension mismatch, got {:?}", other),
        }
    }

    #[test]
    fn metric_kind_parsing() {
        assert_eq!("Cosine".parse::<MetricKind>().unwrap(), MetricKind::Cosine);
        assert_eq!("euclidean".parse::<MetricKind>().unwrap(), MetricKind::L2);
        assert_eq!("manhattan".parse::<MetricKind>().unwrap(), MetricKind::L1);
        assert!("hamming".parse::<MetricKind>().is_err());
        assert_eq!(MetricKind::Cosine.to_string(), "cosine");
        assert_eq!(Cosine::kind(), MetricKind::Cosine);
        assert_eq!(L1::kind().to_string(), L1::name());
    }
}
