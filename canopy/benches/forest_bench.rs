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

use canopy::*;
use vectorcloud::*;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn corpus() -> Dataset<Cosine> {
    let mut provider = SyntheticProvider::new();
    provider.set_query_count(16);
    provider.load(128, 4096).unwrap()
}

fn forest_build(c: &mut Criterion) {
    let data = corpus();
    let mut group = c.benchmark_group("forest_build");
    group.sample_size(10);
    for n_trees in [1usize, 8, 32].iter() {
        let mut builder = ForestBuilder::new();
        builder.set_n_trees(*n_trees).set_rng_seed(38);
        group.bench_with_input(BenchmarkId::from_parameter(n_trees), &builder, |b, builder| {
            b.iter(|| builder.build(data.corpus.clone()).unwrap());
        });
    }
    group.finish();
}

fn forest_knn(c: &mut Criterion) {
    let data = corpus();
    let mut group = c.benchmark_group("forest_knn");
    for n_trees in [1usize, 8, 32].iter() {
        let mut builder = ForestBuilder::new();
        builder.set_n_trees(*n_trees).set_rng_seed(38);
        let forest = builder.build(data.corpus.clone()).unwrap();
        let query = data.queries.point(0).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n_trees), &forest, |b, forest| {
            b.iter(|| forest.knn(black_box(query), 10).unwrap());
        });
    }
    group.finish();
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let data = corpus();
    c.bench_function("Exact neighbors 16 queries", |b| {
        b.iter(|| GroundTruth::compute(&data.corpus, &data.queries, 10).unwrap())
    });
    let formula = EstimatorFormula::default();
    c.bench_function("Evaluate 100000 768", |b| {
        b.iter(|| formula.evaluate(black_box(100_000), black_box(768)))
    });
}

criterion_group!(benches, criterion_benchmark, forest_build, forest_knn);
criterion_main!(benches);
