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

use flate2::read::GzDecoder;
use log::info;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use yaml_rust::YamlLoader;

use super::*;

const DEFAULT_QUERY_COUNT: usize = 100;
const DEFAULT_QUERY_SEED: u64 = 38;

#[derive(Debug, Clone)]
struct RawFiles {
    data_path: PathBuf,
    query_path: Option<PathBuf>,
}

/// Datasets already on disk as little endian `f32` blobs, one file per dimensionality.
/// Files ending in `.gz` are decompressed on the fly.
///
/// When a dimensionality has no query file, queries are sampled from its corpus.
#[derive(Debug, Clone)]
pub struct RawFileProvider {
    name: String,
    files: BTreeMap<usize, RawFiles>,
    query_count: usize,
    seed: u64,
}

impl RawFileProvider {
    /// An empty provider, add files with [`RawFileProvider::add`].
    pub fn new<S: Into<String>>(name: S) -> RawFileProvider {
        RawFileProvider {
            name: name.into(),
            files: BTreeMap::new(),
            query_count: DEFAULT_QUERY_COUNT,
            seed: DEFAULT_QUERY_SEED,
        }
    }

    /// Registers the corpus (and optionally the queries) of a dimensionality.
    pub fn add<P: Into<PathBuf>>(
        &mut self,
        dimensions: usize,
        data_path: P,
        query_path: Option<P>,
    ) -> &mut Self {
        self.files.insert(
            dimensions,
            RawFiles {
                data_path: data_path.into(),
                query_path: query_path.map(|p| p.into()),
            },
        );
        self
    }

    /// Number of queries sampled when a dimensionality has no query file
    pub fn set_query_count(&mut self, x: usize) -> &mut Self {
        self.query_count = x;
        self
    }

    /// The dimensionalities this provider knows about
    pub fn dimensions(&self) -> Vec<usize> {
        self.files.keys().cloned().collect()
    }

    /// Given a yaml file on disk, it builds a provider. Relative paths are relative to the yaml file.
    /// ```yaml
    /// ---
    /// name: wikipedia
    /// query_count: 100
    /// rng_seed: 38
    /// datasets:
    ///   - data_dim: 768
    ///     data_path: wiki-768.f32.gz
    ///     query_path: wiki-768-queries.f32
    ///   - data_dim: 1536
    ///     data_path: wiki-1536.f32
    /// ```
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> CloudResult<RawFileProvider> {
        let path = path.as_ref();
        let file_name = path.to_string_lossy().to_string();
        let config = fs::read_to_string(path)?;
        let params_files = YamlLoader::load_from_str(&config).map_err(|_| {
            ParsingError::MalformedYamlError {
                file_name: file_name.clone(),
                field: "document".to_string(),
            }
        })?;
        let params = params_files.get(0).ok_or(ParsingError::MissingYamlError {
            file_name: file_name.clone(),
            field: "document".to_string(),
        })?;

        let name = params["name"].as_str().map(|s| s.to_string()).unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "raw".to_string())
        });
        let mut provider = RawFileProvider::new(name);
        if let Some(count) = params["query_count"].as_i64() {
            provider.query_count = count.max(0) as usize;
        }
        if let Some(seed) = params["rng_seed"].as_i64() {
            provider.seed = seed as u64;
        }

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let datasets = params["datasets"]
            .as_vec()
            .ok_or(ParsingError::MissingYamlError {
                file_name: file_name.clone(),
                field: "datasets".to_string(),
            })?;
        for entry in datasets {
            let dim = entry["data_dim"]
                .as_i64()
                .filter(|d| *d > 0)
                .ok_or(ParsingError::MalformedYamlError {
                    file_name: file_name.clone(),
                    field: "data_dim".to_string(),
                })?;
            let data_path = entry["data_path"]
                .as_str()
                .ok_or(ParsingError::MissingYamlError {
                    file_name: file_name.clone(),
                    field: "data_path".to_string(),
                })?;
            let query_path = entry["query_path"].as_str().map(|q| base.join(q));
            provider.add(dim as usize, base.join(data_path), query_path);
        }
        Ok(provider)
    }

    fn unavailable<R: std::fmt::Display>(&self, reason: R) -> CloudError {
        CloudError::unavailable(self.name.clone(), reason)
    }
}

/// Reads at most `count` vectors of dimension `dim` from a raw little endian `f32` file.
pub fn read_raw_f32<P: AsRef<Path>>(path: P, dim: usize, count: usize) -> CloudResult<Vec<f32>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    let limit = (count.saturating_mul(dim).saturating_mul(4)) as u64;
    let mut bytes = Vec::new();
    reader.take(limit).read_to_end(&mut bytes)?;
    let whole = bytes.len() / (4 * dim) * dim;
    Ok(bytes
        .chunks_exact(4)
        .take(whole)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

impl<M: Metric> DatasetProvider<M> for RawFileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, dimensions: usize, count: usize) -> CloudResult<Dataset<M>> {
        let files = self
            .files
            .get(&dimensions)
            .ok_or_else(|| self.unavailable(format!("no file for dimension {}", dimensions)))?;
        info!(
            "Loading up to {} vectors of dimension {} from {:?}",
            count, dimensions, files.data_path
        );
        let data = read_raw_f32(&files.data_path, dimensions, count)
            .map_err(|e| self.unavailable(format!("{:?}: {}", files.data_path, e)))?;
        if data.is_empty() {
            return Err(self.unavailable(format!("{:?} holds no vectors", files.data_path)));
        }
        let corpus = DataRam::new(data, dimensions)?.named(format!("{}-{}", self.name, dimensions));
        let queries = match &files.query_path {
            Some(query_path) => {
                let queries = read_raw_f32(query_path, dimensions, usize::MAX / 4)
                    .map_err(|e| self.unavailable(format!("{:?}: {}", query_path, e)))?;
                DataRam::new(queries, dimensions)?
                    .named(format!("{}-{}-queries", self.name, dimensions))
            }
            None => sample_queries(&corpus, self.query_count, self.seed)?,
        };
        Dataset::new(corpus, queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::L2;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempdir::TempDir;

    fn write_raw(path: &Path, values: &[f32]) {
        let mut file = File::create(path).unwrap();
        for v in values {
            file.write_all(&v.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn reads_plain_and_gzip_files() {
        let dir = TempDir::new("raw_files").unwrap();
        let values: Vec<f32> = (0..12).map(|i| i as f32).collect();
        let plain = dir.path().join("data.f32");
        write_raw(&plain, &values);

        let gz = dir.path().join("data.f32.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        for v in &values {
            encoder.write_all(&v.to_le_bytes()).unwrap();
        }
        encoder.finish().unwrap();

        assert_eq!(read_raw_f32(&plain, 3, 100).unwrap(), values);
        assert_eq!(read_raw_f32(&gz, 3, 100).unwrap(), values);
        assert_eq!(read_raw_f32(&plain, 3, 2).unwrap(), values[..6].to_vec());
        // A trailing partial vector is dropped
        assert_eq!(read_raw_f32(&plain, 5, 100).unwrap(), values[..10].to_vec());
    }

    #[test]
    fn yaml_description_is_loaded() {
        let dir = TempDir::new("raw_yaml").unwrap();
        let values: Vec<f32> = (0..40).map(|i| i as f32).collect();
        write_raw(&dir.path().join("d4.f32"), &values);
        let yaml = dir.path().join("dataset.yml");
        fs::write(
            &yaml,
            "---\nname: tiny\nquery_count: 3\ndatasets:\n  - data_dim: 4\n    data_path: d4.f32\n",
        )
        .unwrap();

        let provider = RawFileProvider::from_yaml(&yaml).unwrap();
        assert_eq!(DatasetProvider::<L2>::name(&provider), "tiny");
        assert_eq!(provider.dimensions(), vec![4]);
        let data: Dataset<L2> = provider.load(4, 8).unwrap();
        assert_eq!(data.corpus.len(), 8);
        assert_eq!(data.queries.len(), 3);

        let missing: CloudResult<Dataset<L2>> = provider.load(8, 8);
        assert!(missing.unwrap_err().is_unavailable());
    }

    #[test]
    fn missing_file_is_unavailable() {
        let mut provider = RawFileProvider::new("ghost");
        provider.add(2, "/nonexistent/ghost.f32", None);
        let res: CloudResult<Dataset<L2>> = provider.load(2, 10);
        assert!(res.unwrap_err().is_unavailable());
    }

    #[test]
    fn malformed_yaml_is_a_parsing_error() {
        let dir = TempDir::new("raw_bad_yaml").unwrap();
        let yaml = dir.path().join("dataset.yml");
        fs::write(&yaml, "---\nname: broken\ndatasets:\n  - data_path: x.f32\n").unwrap();
        match RawFileProvider::from_yaml(&yaml) {
            Err(CloudError::ParsingError(ParsingError::MalformedYamlError { field, .. })) => {
                assert_eq!(field, "data_dim")
            }
            other => panic!("expected a parsing error, got {:?}", other),
        }
    }
}
