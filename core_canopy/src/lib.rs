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

//! Bitpacks a u64 with the dimensionality, the corpus size and the tree count of a benchmark configuration.
//! The dimensionality is stored in the top 16 bits, the corpus size in the next 32 and the tree count in the
//! bottom 16. Because of that order, sorting the raw u64 sorts by `(dimensions, corpus size, tree count)`,
//! which is the order recall matrices are read in.
use serde::{Deserialize, Serialize};
use std::convert::From;
use std::fmt;

mod band;
pub use band::ToleranceBand;

const DMASK_U64: u64 = 0b1111111111111111000000000000000000000000000000000000000000000000;
const NMASK_U64: u64 = 0b0000000000000000111111111111111111111111111111110000000000000000;
const TMASK_U64: u64 = 0b0000000000000000000000000000000000000000000000001111111111111111;

const DSHIFT: u64 = 48;
const NSHIFT: u64 = 16;

/// Largest dimensionality a key can hold.
pub const MAX_DIMENSIONS: usize = u16::MAX as usize;
/// Largest corpus size a key can hold.
pub const MAX_CORPUS_SIZE: usize = u32::MAX as usize;
/// Largest tree count a key can hold.
pub const MAX_TREE_COUNT: usize = u16::MAX as usize;

/// The bitpacked key of a recall sample
#[derive(Copy, Clone, Serialize, Deserialize, PartialEq, Eq, std::hash::Hash, PartialOrd, Ord)]
pub struct SampleKey {
    key: u64,
}

impl From<(usize, usize, usize)> for SampleKey {
    /// Packs `(dimensions, corpus_size, tree_count)`. Panics if a field overflows its bits.
    fn from(k: (usize, usize, usize)) -> SampleKey {
        match SampleKey::try_new(k.0, k.1, k.2) {
            Some(key) => key,
            None => panic!(
                "Sample key out of range: dimensions {} (max {}), corpus size {} (max {}), tree count {} (max {})",
                k.0, MAX_DIMENSIONS, k.1, MAX_CORPUS_SIZE, k.2, MAX_TREE_COUNT
            ),
        }
    }
}

impl From<SampleKey> for (usize, usize, usize) {
    fn from(k: SampleKey) -> (usize, usize, usize) {
        k.unpack()
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "(d: {}, n: {}, trees: {})",
            self.dimensions(),
            self.corpus_size(),
            self.tree_count()
        )
    }
}

impl fmt::Debug for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SampleKey")
            .field("dimensions", &self.dimensions())
            .field("corpus_size", &self.corpus_size())
            .field("tree_count", &self.tree_count())
            .finish()
    }
}

impl fmt::Binary for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#066b}", self.key)
    }
}

impl SampleKey {
    /// Packs the three fields, returns `None` if any of them does not fit.
    #[inline]
    pub fn try_new(dimensions: usize, corpus_size: usize, tree_count: usize) -> Option<SampleKey> {
        if dimensions > MAX_DIMENSIONS
            || corpus_size > MAX_CORPUS_SIZE
            || tree_count > MAX_TREE_COUNT
        {
            return None;
        }
        Some(SampleKey {
            key: (dimensions as u64) << DSHIFT
                | (corpus_size as u64) << NSHIFT
                | tree_count as u64,
        })
    }
    /// The underlying u64
    pub fn raw(&self) -> u64 {
        self.key
    }
    /// Rebuilds a key from its raw representation.
    #[inline]
    pub fn from_u64(key: u64) -> SampleKey {
        SampleKey { key }
    }
    /// Borrowed unpack into `(dimensions, corpus_size, tree_count)`
    pub fn unpack(&self) -> (usize, usize, usize) {
        (self.dimensions(), self.corpus_size(), self.tree_count())
    }
    /// The dimensionality of the vectors
    #[inline]
    pub fn dimensions(&self) -> usize {
        ((self.key & DMASK_U64) >> DSHIFT) as usize
    }
    /// The number of vectors indexed
    #[inline]
    pub fn corpus_size(&self) -> usize {
        ((self.key & NMASK_U64) >> NSHIFT) as usize
    }
    /// The number of trees in the forest
    #[inline]
    pub fn tree_count(&self) -> usize {
        (self.key & TMASK_U64) as usize
    }
    /// The `(dimensions, corpus_size)` pair this key belongs to, with the tree count zeroed.
    /// Every key of a recall matrix row shares it.
    #[inline]
    pub fn row(&self) -> SampleKey {
        SampleKey {
            key: self.key & !TMASK_U64,
        }
    }
}

/// Helper trait that cleans up code.
pub trait KeysToVec {
    /// All the corpus sizes, in order
    fn to_corpus_sizes(&self) -> Vec<usize>;
    /// All the tree counts, in order
    fn to_tree_counts(&self) -> Vec<usize>;
}

impl KeysToVec for [SampleKey] {
    fn to_corpus_sizes(&self) -> Vec<usize> {
        self.iter().map(|k| k.corpus_size()).collect()
    }
    fn to_tree_counts(&self) -> Vec<usize> {
        self.iter().map(|k| k.tree_count()).collect()
    }
}
