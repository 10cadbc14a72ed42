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

//! Ram allocated data.

use rayon::prelude::*;
use std::cmp::min;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::distances::*;
use crate::errors::*;
use crate::PointIndex;

#[inline]
fn chunk(data_dim: usize) -> usize {
    min(15000 / data_dim.max(1), 20).max(1)
}

/// The data stored in ram. Cloning or taking a prefix shares the underlying blob.
#[derive(Debug)]
pub struct DataRam<M = L2> {
    name: String,
    data: Arc<Vec<f32>>,
    dim: usize,
    len: usize,
    metric: PhantomData<M>,
}

impl<M> Clone for DataRam<M> {
    fn clone(&self) -> Self {
        DataRam {
            name: self.name.clone(),
            data: Arc::clone(&self.data),
            dim: self.dim,
            len: self.len,
            metric: PhantomData,
        }
    }
}

impl<M: Metric> DataRam<M> {
    /// Consumes your vec and dimension and gives a dimensioned blob.
    pub fn new(data: Vec<f32>, dim: usize) -> CloudResult<DataRam<M>> {
        if dim == 0 {
            return Err(CloudError::DimensionMismatch {
                expected: 1,
                found: 0,
            });
        }
        if data.len() % dim != 0 {
            return Err(CloudError::DimensionMismatch {
                expected: dim,
                found: data.len() % dim,
            });
        }
        let len = data.len() / dim;
        Ok(DataRam {
            name: "RAM".to_string(),
            data: Arc::new(data),
            dim,
            len,
            metric: PhantomData,
        })
    }

    /// Packs rows that all have to share the dimension `dim`.
    pub fn from_rows(rows: &[Vec<f32>], dim: usize) -> CloudResult<DataRam<M>> {
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            if row.len() != dim {
                return Err(CloudError::DimensionMismatch {
                    expected: dim,
                    found: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        DataRam::new(data, dim)
    }

    /// Renames this slice. The name shows up in errors and sample records.
    pub fn named<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// The name of this slice
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of vectors
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// If there are no vectors
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The dimension of the vectors
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Indexes used for access
    pub fn reference_indexes(&self) -> Vec<PointIndex> {
        (0..self.len).collect()
    }

    /// Gets a vector from this slice
    #[inline]
    pub fn point(&self, i: PointIndex) -> CloudResult<&[f32]> {
        if i < self.len {
            Ok(&self.data[i * self.dim..(i + 1) * self.dim])
        } else {
            Err(CloudError::data_access(i, self.name.clone()))
        }
    }

    /// Iterates over the vectors in order
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.data[..self.len * self.dim].chunks_exact(self.dim)
    }

    /// The first `n` vectors, sharing this slice's storage.
    pub fn prefix(&self, n: usize) -> CloudResult<DataRam<M>> {
        if n > self.len {
            return Err(CloudError::data_access(n, self.name.clone()));
        }
        Ok(DataRam {
            name: format!("{}[..{}]", self.name, n),
            data: Arc::clone(&self.data),
            dim: self.dim,
            len: n,
            metric: PhantomData,
        })
    }

    /// Copies the given vectors into a new slice.
    pub fn select(&self, indexes: &[PointIndex]) -> CloudResult<DataRam<M>> {
        let mut data = Vec::with_capacity(indexes.len() * self.dim);
        for i in indexes {
            data.extend_from_slice(self.point(*i)?);
        }
        Ok(DataRam::new(data, self.dim)?.named(format!("{}[selection]", self.name)))
    }

    /// Checks that an outside vector can be compared with this slice.
    #[inline]
    pub fn check_dim(&self, point: &[f32]) -> CloudResult<()> {
        if point.len() == self.dim {
            Ok(())
        } else {
            Err(CloudError::DimensionMismatch {
                expected: self.dim,
                found: point.len(),
            })
        }
    }

    /// Distance from one of our vectors to an outside vector.
    #[inline]
    pub fn distance_to_point(&self, i: PointIndex, point: &[f32]) -> CloudResult<f32> {
        self.check_dim(point)?;
        Ok((M::dense)(self.point(i)?, point))
    }

    /// The main distance function. This paralizes if there are more than a few chunks of points.
    pub fn distances_to_point(
        &self,
        point: &[f32],
        indexes: &[PointIndex],
    ) -> CloudResult<Vec<f32>> {
        self.check_dim(point)?;
        let chunk = chunk(self.dim);
        let len = indexes.len();
        if len > chunk * 3 {
            let mut dists: Vec<f32> = vec![0.0; len];
            let dist_iter = dists.par_chunks_mut(chunk);
            let indexes_iter = indexes.par_chunks(chunk);
            let error: Mutex<CloudResult<()>> = Mutex::new(Ok(()));
            dist_iter
                .zip(indexes_iter)
                .for_each(|(chunk_dists, chunk_indexes)| {
                    for (d, i) in chunk_dists.iter_mut().zip(chunk_indexes) {
                        match self.point(*i) {
                            Ok(y) => *d = (M::dense)(point, y),
                            Err(e) => {
                                if let Ok(mut guard) = error.lock() {
                                    *guard = Err(e);
                                }
                            }
                        }
                    }
                });
            match error.into_inner() {
                Ok(result) => result?,
                Err(poisoned) => poisoned.into_inner()?,
            }
            Ok(dists)
        } else {
            indexes
                .iter()
                .map(|i| Ok((M::dense)(point, self.point(*i)?)))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> DataRam<L2> {
        let data: Vec<f32> = (0..n).flat_map(|i| vec![i as f32, 0.0]).collect();
        DataRam::new(data, 2).unwrap()
    }

    #[test]
    fn dimensions_are_checked() {
        assert!(DataRam::<L2>::new(vec![0.0; 5], 2).is_err());
        assert!(DataRam::<L2>::new(vec![0.0; 4], 0).is_err());
        let rows = vec![vec![1.0, 2.0], vec![1.0]];
        match DataRam::<L2>::from_rows(&rows, 2) {
            Err(CloudError::DimensionMismatch { expected, found }) => {
                assert_eq!((expected, found), (2, 1))
            }
            other => panic!("expected a dimension mismatch, got {:?}", other),
        }
    }

    #[test]
    fn prefix_shares_storage() {
        let data = line(10);
        let prefix = data.prefix(4).unwrap();
        assert_eq!(prefix.len(), 4);
        assert_eq!(prefix.point(3).unwrap(), &[3.0, 0.0]);
        assert!(prefix.point(4).is_err());
        assert!(Arc::ptr_eq(&data.data, &prefix.data));
        assert!(data.prefix(11).is_err());
        assert_eq!(prefix.iter().count(), 4);
    }

    #[test]
    fn select_copies_rows() {
        let data = line(10);
        let selected = data.select(&[7, 2]).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected.point(0).unwrap(), &[7.0, 0.0]);
        assert_eq!(selected.point(1).unwrap(), &[2.0, 0.0]);
    }

    #[test]
    fn parallel_distances_match_serial() {
        let data = line(500);
        let query = [10.0, 0.0];
        let indexes = data.reference_indexes();
        let dists = data.distances_to_point(&query, &indexes).unwrap();
        for (i, d) in dists.iter().enumerate() {
            assert_approx_eq!(*d, (i as f32 - 10.0).abs());
        }
        let few = data.distances_to_point(&query, &[0, 20]).unwrap();
        assert_approx_eq!(few[0], 10.0);
        assert_approx_eq!(few[1], 10.0);
    }

    #[test]
    fn distances_report_bad_access() {
        let data = line(500);
        let mut indexes = data.reference_indexes();
        indexes.push(1000);
        assert!(data.distances_to_point(&[0.0, 0.0], &indexes).is_err());
        assert!(data.distances_to_point(&[0.0], &[0]).is_err());
    }
}
