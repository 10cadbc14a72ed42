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

//! Command line front end of the calibration pipeline.
//!
//! ```text
//! calibrate sweep --dimensions 768,1536 --count 512,1024 --nb-trees 1,8,32 --samples samples.csv
//! calibrate fit --samples samples.csv --output estimator.json
//! calibrate validate --estimator estimator.json --dimensions 768 --count 4096,65536
//! calibrate estimate --estimator estimator.json -n 100000 -d 768
//! ```

use canopy::utils::{load_estimator, save_estimator, save_json};
use canopy::*;
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{error, info, warn, LevelFilter};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use vectorcloud::*;

/// A comma separated list of numbers, `512,1024,2_048`
#[derive(Debug, Clone)]
struct NumberList(Vec<usize>);

impl FromStr for NumberList {
    type Err = String;
    fn from_str(s: &str) -> Result<NumberList, String> {
        config::parse_list(s).map(NumberList)
    }
}

#[derive(Parser, Debug)]
#[command(name = "calibrate", version, about = "Calibrates the tree count of a random projection forest")]
struct Cli {
    /// More output, -vv shows progress bars
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Measures recall over the grid and appends every sample to a CSV log
    Sweep {
        #[command(flatten)]
        data: DataArgs,
        /// The sample log, appended to
        #[arg(long, default_value = "samples.csv")]
        samples: PathBuf,
    },
    /// Extracts thresholds from a sample log and fits a formula to them
    Fit {
        /// Calibration config, for the band and the small corpus threshold
        #[arg(long)]
        config: Option<PathBuf>,
        /// The sample log
        #[arg(long, default_value = "samples.csv")]
        samples: PathBuf,
        /// Estimator file. The fitted band is added to it if it exists.
        #[arg(long, default_value = "estimator.json")]
        output: PathBuf,
        /// Also write the full fit report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Measures recall at the tree counts an estimator returns
    Validate {
        #[command(flatten)]
        data: DataArgs,
        /// Estimator file
        #[arg(long, default_value = "estimator.json")]
        estimator: PathBuf,
    },
    /// Prints the tree count for a corpus size and dimensionality
    Estimate {
        /// Estimator file, the reference curve if not given
        #[arg(long)]
        estimator: Option<PathBuf>,
        /// Corpus size
        #[arg(short = 'n', long)]
        corpus_size: usize,
        /// Dimensionality
        #[arg(short = 'd', long)]
        dimensions: usize,
        #[command(flatten)]
        band: BandArgs,
    },
}

#[derive(Args, Debug)]
struct BandArgs {
    /// Lowest acceptable recall, overrides the config or the estimator's default band
    #[arg(long, requires = "band_high")]
    band_low: Option<f32>,
    /// Recall above which trees are wasted
    #[arg(long, requires = "band_low")]
    band_high: Option<f32>,
}

impl BandArgs {
    fn band(&self) -> CanopyResult<Option<ToleranceBand>> {
        match (self.band_low, self.band_high) {
            (Some(low), Some(high)) => ToleranceBand::new(low, high).map(Some).ok_or_else(|| {
                CanopyError::InvalidConfig(format!("[{}, {}] is not a recall band", low, high))
            }),
            _ => Ok(None),
        }
    }
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Calibration config in yaml, command line values override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Dimensionalities
    #[arg(long)]
    dimensions: Option<NumberList>,
    /// Corpus sizes
    #[arg(long)]
    count: Option<NumberList>,
    /// Tree counts
    #[arg(long)]
    nb_trees: Option<NumberList>,
    /// `synthetic` or a yaml file describing raw f32 datasets
    #[arg(long, default_value = "synthetic")]
    dataset: String,
    /// Distance the forest and the exact neighbors use
    #[arg(long, default_value = "cosine")]
    metric: MetricKind,
    /// Worker threads, 0 uses every core
    #[arg(long)]
    threads: Option<usize>,
    #[command(flatten)]
    band: BandArgs,
}

enum Provider {
    Synthetic(SyntheticProvider),
    Raw(RawFileProvider),
}

impl Provider {
    fn as_dyn<M: Metric>(&self) -> &dyn DatasetProvider<M> {
        match self {
            Provider::Synthetic(p) => p,
            Provider::Raw(p) => p,
        }
    }
}

impl DataArgs {
    fn config(&self, verbosity: u32) -> CanopyResult<CalibrationConfig> {
        let mut config = match &self.config {
            Some(path) => CalibrationConfig::from_yaml(path)?,
            None => CalibrationConfig::default(),
        };
        if let Some(NumberList(x)) = &self.dimensions {
            config.set_dimensions(x.clone());
        }
        if let Some(NumberList(x)) = &self.count {
            config.set_corpus_sizes(x.clone());
        }
        if let Some(NumberList(x)) = &self.nb_trees {
            config.set_tree_counts(x.clone());
        }
        if let Some(x) = self.threads {
            config.set_threads(x);
        }
        if let Some(band) = self.band.band()? {
            config.set_band(band);
        }
        config.set_verbosity(verbosity);
        config.validate()?;
        Ok(config)
    }

    fn provider(&self, config: &CalibrationConfig) -> CanopyResult<Provider> {
        if self.dataset == "synthetic" {
            let mut provider = SyntheticProvider::new();
            provider
                .set_query_count(config.query_count)
                .set_seed(config.rng_seed);
            Ok(Provider::Synthetic(provider))
        } else {
            let mut provider = RawFileProvider::from_yaml(&self.dataset)?;
            provider.set_query_count(config.query_count);
            Ok(Provider::Raw(provider))
        }
    }
}

fn sweep<M: Metric>(
    config: &CalibrationConfig,
    provider: &dyn DatasetProvider<M>,
    samples: &PathBuf,
) -> CanopyResult<()> {
    let store = ResultStore::with_log(samples)?;
    let summary = Sweep::new(config, provider)?.run(&store)?;
    for d in store.dimensions() {
        println!("{}", store.matrix_for(d));
    }
    for sample in store.errored() {
        warn!("{} errored: {:?}", sample.key, sample.outcome);
    }
    info!(
        "{} samples written to {:?}, {} errored",
        summary.recorded, samples, summary.errored
    );
    Ok(())
}

fn fit(
    config: Option<&PathBuf>,
    samples: &PathBuf,
    output: &PathBuf,
    report_path: Option<&PathBuf>,
) -> CanopyResult<()> {
    let config = match config {
        Some(path) => CalibrationConfig::from_yaml(path)?,
        None => CalibrationConfig::default(),
    };
    let store = ResultStore::load_csv(samples)?;
    info!("Loaded {} samples from {:?}", store.len(), samples);
    let thresholds = extract_store(&config, &store);
    for threshold in &thresholds {
        match threshold.threshold {
            Threshold::Attained(t) => info!(
                "d={} n={} needs {} trees",
                threshold.dimensions, threshold.corpus_size, t
            ),
            Threshold::Unattainable => warn!(
                "d={} n={} is unattainable",
                threshold.dimensions, threshold.corpus_size
            ),
        }
    }
    let report = CurveFitter::new(&config).fit(&thresholds)?;
    println!("{}", report);

    let mut estimator = if output.exists() {
        load_estimator(output)?
    } else {
        Estimator::new(config.band, report.formula)
    };
    estimator.insert(config.band, report.formula);
    save_estimator(&estimator, output)?;
    info!("Estimator for {} written to {:?}", config.band, output);
    if let Some(path) = report_path {
        save_json(&report, path)?;
    }
    Ok(())
}

fn validate<M: Metric>(
    config: &CalibrationConfig,
    provider: &dyn DatasetProvider<M>,
    estimator: &Estimator,
) -> CanopyResult<()> {
    let formula = estimator.formula_for(Some(config.band))?;
    let mut datasets = Vec::with_capacity(config.dimensions.len());
    for d in &config.dimensions {
        match provider.load(*d, config.max_corpus_size()) {
            Ok(dataset) => datasets.push(dataset),
            Err(e) => warn!("d={} cannot be validated, {}", d, e),
        }
    }
    let validator = Validator::new(config, *formula, provider.name(), &datasets);
    let outcomes = validator.validate_parallel(&Validator::<M>::grid(config));
    for outcome in &outcomes {
        println!("{}", outcome);
    }
    let summary: ValidationSummary = outcomes.iter().collect();
    println!("{}", summary);
    if !summary.meets(0.95) {
        warn!("Less than 95% of the grid is in the band, the formula should be fitted again");
    }
    Ok(())
}

fn run(cli: Cli) -> CanopyResult<()> {
    let verbosity = cli.verbose as u32;
    match cli.command {
        Command::Sweep { data, samples } => {
            let config = data.config(verbosity)?;
            let provider = data.provider(&config)?;
            match data.metric {
                MetricKind::L2 => sweep::<L2>(&config, provider.as_dyn(), &samples),
                MetricKind::L1 => sweep::<L1>(&config, provider.as_dyn(), &samples),
                MetricKind::Cosine => sweep::<Cosine>(&config, provider.as_dyn(), &samples),
            }
        }
        Command::Fit {
            config,
            samples,
            output,
            report,
        } => fit(config.as_ref(), &samples, &output, report.as_ref()),
        Command::Validate { data, estimator } => {
            let mut config = data.config(verbosity)?;
            let estimator = load_estimator(&estimator)?;
            if data.band.band()?.is_none() {
                config.set_band(estimator.default_band());
            }
            let provider = data.provider(&config)?;
            match data.metric {
                MetricKind::L2 => validate::<L2>(&config, provider.as_dyn(), &estimator),
                MetricKind::L1 => validate::<L1>(&config, provider.as_dyn(), &estimator),
                MetricKind::Cosine => validate::<Cosine>(&config, provider.as_dyn(), &estimator),
            }
        }
        Command::Estimate {
            estimator,
            corpus_size,
            dimensions,
            band,
        } => {
            let estimator = match estimator {
                Some(path) => load_estimator(path)?,
                None => Estimator::reference(&CalibrationConfig::default()),
            };
            let trees = estimator.recommended_tree_count(corpus_size, dimensions, band.band()?)?;
            println!("{}", trees);
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();

    if let Err(e) = run(cli) {
        error!("{}", e);
        process::exit(1);
    }
}
