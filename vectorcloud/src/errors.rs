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

//! The errors that can occur when a dataset is loading or being read
use std::error::Error;
use std::fmt;
use std::io;
use std::str;

/// Helper type for a call that could go wrong.
pub type CloudResult<T> = Result<T, CloudError>;

/// Error type for the vector cloud
#[derive(Debug)]
pub enum CloudError {
    /// The provider could not hand out the dataset. Fatal to every configuration that needs it.
    DatasetUnavailable {
        /// Identifier of the dataset
        dataset: String,
        /// Why it could not be provided
        reason: String,
    },
    /// A vector does not have the dimensionality of the cloud it is used with
    DimensionMismatch {
        /// The cloud's dimensionality
        expected: usize,
        /// The offending vector's length
        found: usize,
    },
    /// Unable to retrieve some data point (given by index) in a slice (slice name)
    DataAccessError {
        /// Index of access error
        index: usize,
        /// Slice that had the access error
        slice_name: String,
    },
    /// IO error when opening files
    IoError(io::Error),
    /// Parsing error when loading a dataset description
    ParsingError(ParsingError),
}

impl fmt::Display for CloudError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CloudError::IoError(e) => write!(f, "{}", e),
            CloudError::ParsingError(e) => write!(f, "{}", e),
            CloudError::DatasetUnavailable { dataset, reason } => {
                write!(f, "dataset {} is unavailable: {}", dataset, reason)
            }
            CloudError::DimensionMismatch { expected, found } => write!(
                f,
                "expected a vector of dimension {}, got one of dimension {}",
                expected, found
            ),
            CloudError::DataAccessError { index, slice_name } => write!(
                f,
                "there was an issue grabbing point {} from {}",
                index, slice_name
            ),
        }
    }
}

#[allow(deprecated)]
impl Error for CloudError {
    fn description(&self) -> &str {
        match self {
            CloudError::IoError(e) => e.description(),
            CloudError::ParsingError(e) => e.description(),
            CloudError::DatasetUnavailable { .. } => "the dataset is unavailable",
            CloudError::DimensionMismatch { .. } => "a vector has the wrong dimension",
            CloudError::DataAccessError { .. } => {
                "there was an issue grabbing a data point"
            }
        }
    }

    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CloudError::IoError(e) => Some(e),
            CloudError::ParsingError(e) => Some(e),
            CloudError::DatasetUnavailable { .. } => None,
            CloudError::DimensionMismatch { .. } => None,
            CloudError::DataAccessError { .. } => None,
        }
    }
}

impl From<io::Error> for CloudError {
    fn from(err: io::Error) -> Self {
        CloudError::IoError(err)
    }
}

impl From<ParsingError> for CloudError {
    fn from(err: ParsingError) -> Self {
        CloudError::ParsingError(err)
    }
}

impl From<CloudError> for io::Error {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::IoError(e) => e,
            e => io::Error::new(io::ErrorKind::Other, Box::new(e)),
        }
    }
}

impl CloudError {
    /// If we can't get an element from a loaded slice, gives the i and the slice's name
    pub fn data_access(index: usize, slice_name: String) -> CloudError {
        CloudError::DataAccessError { index, slice_name }
    }

    /// The provider could not load the dataset
    pub fn unavailable<S: Into<String>, R: fmt::Display>(dataset: S, reason: R) -> CloudError {
        CloudError::DatasetUnavailable {
            dataset: dataset.into(),
            reason: reason.to_string(),
        }
    }

    /// If this is the dataset being unavailable
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CloudError::DatasetUnavailable { .. })
    }
}

/// A parsing error occored while doing something with text
#[derive(Debug)]
pub enum ParsingError {
    /// Yaml was messed up
    MalformedYamlError {
        /// The file that was messed up
        file_name: String,
        /// The value that was messed up
        field: String,
    },
    /// A needed field was missing from the file.
    MissingYamlError {
        /// The file
        file_name: String,
        /// The missing field
        field: String,
    },
    /// An error reading a CSV row
    CSVReadError {
        /// The file that the error occored in
        file_name: String,
        /// The line that was messed up
        line_number: usize,
        /// The column name that was messed up
        key: String,
    },
    /// Something else happened parsing a string
    RegularParsingError(&'static str),
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParsingError::MalformedYamlError { file_name, field } => {
                write!(f, "malformed yaml entry {} in {}", field, file_name)
            }
            ParsingError::MissingYamlError { file_name, field } => {
                write!(f, "missing yaml entry {} in {}", field, file_name)
            }
            ParsingError::CSVReadError {
                file_name,
                line_number,
                key,
            } => write!(
                f,
                "issue reading the CSV entry {} on line {} of {}",
                key, line_number, file_name
            ),
            ParsingError::RegularParsingError(msg) => write!(f, "error parsing a string: {}", msg),
        }
    }
}

#[allow(deprecated)]
impl Error for ParsingError {
    fn description(&self) -> &str {
        match self {
            ParsingError::MalformedYamlError { .. } => "there is a error reading a yaml entry",
            ParsingError::MissingYamlError { .. } => "not all message fields set",
            ParsingError::CSVReadError { .. } => "issue reading a CSV entry",
            ParsingError::RegularParsingError(..) => "Error parsing a string",
        }
    }
}
