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

//! The errors that can occur while calibrating. Dataset problems are floated up from `vectorcloud`,
//! everything about a single run is an [`CanopyError::IndexBuildError`], [`CanopyError::QueryError`]
//! or [`CanopyError::Timeout`] and only ever marks that one sample as errored.

use std::error::Error;
use std::fmt;
use std::io;
use vectorcloud::CloudError;

pub use vectorcloud::ParsingError;

/// Helper type for a call that could go wrong.
pub type CanopyResult<T> = Result<T, CanopyError>;

/// Error type for canopy.
#[derive(Debug)]
pub enum CanopyError {
    /// Errors from the data layer, `DatasetUnavailable` among them
    Cloud(CloudError),
    /// The forest could not be built, the corpus is empty or the tree count is zero
    IndexBuildError(String),
    /// A query could not be answered, usually a dimension mismatch
    QueryError(String),
    /// The run went past its deadline
    Timeout {
        /// How long the run was allowed to take, in seconds
        limit_secs: u64,
    },
    /// Fitting was asked to fit nothing, every pair was unattainable or errored
    EmptyFittingSet,
    /// The estimator has no formula for the requested band
    UncalibratedBand(String),
    /// A configuration value is out of range
    InvalidConfig(String),
    /// IO error when opening files
    IoError(io::Error),
    /// Parsing error when loading a config, a sample log or an estimator
    ParsingError(ParsingError),
}

impl fmt::Display for CanopyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CanopyError::Cloud(ref e) => write!(f, "{}", e),
            CanopyError::IoError(ref e) => write!(f, "{}", e),
            CanopyError::ParsingError(ref e) => write!(f, "{}", e),
            CanopyError::IndexBuildError(ref msg) => write!(f, "unable to build the index: {}", msg),
            CanopyError::QueryError(ref msg) => write!(f, "unable to query the index: {}", msg),
            CanopyError::Timeout { limit_secs } => {
                write!(f, "the run took longer than {} seconds", limit_secs)
            }
            CanopyError::EmptyFittingSet => {
                write!(f, "there are no attainable thresholds to fit a formula to")
            }
            CanopyError::UncalibratedBand(ref band) => {
                write!(f, "no formula was calibrated for the band {}", band)
            }
            CanopyError::InvalidConfig(ref msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

#[allow(deprecated)]
impl Error for CanopyError {
    fn description(&self) -> &str {
        match *self {
            CanopyError::Cloud(ref e) => e.description(),
            CanopyError::IoError(ref e) => e.description(),
            CanopyError::ParsingError(ref e) => e.description(),
            CanopyError::IndexBuildError(..) => "unable to build the index",
            CanopyError::QueryError(..) => "unable to query the index",
            CanopyError::Timeout { .. } => "the run took too long",
            CanopyError::EmptyFittingSet => "there is nothing to fit",
            CanopyError::UncalibratedBand(..) => "the band was never calibrated",
            CanopyError::InvalidConfig(..) => "invalid configuration",
        }
    }

    fn cause(&self) -> Option<&dyn Error> {
        match *self {
            CanopyError::Cloud(ref e) => Some(e),
            CanopyError::IoError(ref e) => Some(e),
            CanopyError::ParsingError(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<CloudError> for CanopyError {
    fn from(err: CloudError) -> Self {
        CanopyError::Cloud(err)
    }
}

impl From<io::Error> for CanopyError {
    fn from(err: io::Error) -> Self {
        CanopyError::IoError(err)
    }
}

impl From<ParsingError> for CanopyError {
    fn from(err: ParsingError) -> Self {
        CanopyError::ParsingError(err)
    }
}

impl From<csv::Error> for CanopyError {
    fn from(err: csv::Error) -> Self {
        let line_number = err.position().map(|p| p.line() as usize).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(e) => CanopyError::IoError(e),
            csv::ErrorKind::Deserialize { err, .. } => {
                CanopyError::ParsingError(ParsingError::CSVReadError {
                    file_name: "sample log".to_string(),
                    line_number,
                    key: err.field().map(|f| f.to_string()).unwrap_or_default(),
                })
            }
            _ => CanopyError::ParsingError(ParsingError::CSVReadError {
                file_name: "sample log".to_string(),
                line_number,
                key: "record".to_string(),
            }),
        }
    }
}

impl From<serde_json::Error> for CanopyError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            CanopyError::IoError(err.into())
        } else {
            CanopyError::ParsingError(ParsingError::RegularParsingError(
                "unable to parse the estimator json",
            ))
        }
    }
}

impl From<CanopyError> for io::Error {
    fn from(err: CanopyError) -> Self {
        match err {
            CanopyError::IoError(e) => e,
            e => io::Error::new(io::ErrorKind::Other, Box::new(e)),
        }
    }
}

impl CanopyError {
    /// If this error is the dataset being unavailable
    pub fn is_unavailable(&self) -> bool {
        match self {
            CanopyError::Cloud(e) => e.is_unavailable(),
            _ => false,
        }
    }
}
