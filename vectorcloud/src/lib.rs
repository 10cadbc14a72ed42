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
//! # Vector Cloud
//! Immutable, dimensioned embedding data and the providers that hand it out.
//!
//! A [`DataRam`] owns a flat blob of `f32` and knows its dimensionality. Taking a prefix of it for a smaller
//! corpus size shares the blob, so a sweep over many corpus sizes only holds the largest one in ram.
//! The distance between two vectors is decided by the [`Metric`] the cloud is typed with.

#![warn(missing_docs)]

#[cfg(test)]
#[macro_use]
extern crate assert_approx_eq;

mod distances;
pub use distances::*;
pub mod errors;
pub use errors::{CloudError, CloudResult, ParsingError};

mod data_ram;
pub use data_ram::DataRam;

pub mod providers;
pub use providers::{sample_queries, Dataset, DatasetProvider, RawFileProvider, SyntheticProvider};

/// To make things more obvious, we type the point index.
pub type PointIndex = usize;
