//! gmm CLI - Gaussian Mixture Model trainer
//!
//! Command-line interface for fitting, sampling and scoring mixtures.

use clap::{Parser, Subcommand};
use gmm::dataset::{load_dense_dataset, parse_sparse_line, save_dense_dataset, sparse_dataset_to_dense};
use gmm::synth::{random_mixture, three_blobs};
use gmm::{Config, CovarianceType, Gmm, GmmError, Random, Result};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use log::error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "gmm")]
#[command(version)]
#[command(about = "Gaussian Mixture Model trainer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a mixture to a dataset file
    Train {
        /// Input dataset (one sample per line, space-separated values)
        #[arg(short, long)]
        input: PathBuf,

        /// Output model file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of mixture components
        #[arg(short = 'k', long)]
        components: usize,

        /// Number of E-step workers (0 = all cores)
        #[arg(short = 'w', long, default_value = "1")]
        workers: usize,

        /// Covariance type (diagonal or full)
        #[arg(long)]
        covariance: Option<CovarianceType>,

        /// Maximum number of EM iterations
        #[arg(long)]
        max_iter: Option<usize>,

        /// Log-likelihood improvement threshold
        #[arg(long)]
        threshold: Option<f64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Number of restarts, the best one is kept
        #[arg(long)]
        n_init: Option<usize>,

        /// JSON configuration file; command-line options take precedence
        #[arg(long)]
        config: Option<PathBuf>,

        /// Input lines are sparse `index:value` pairs
        #[arg(long)]
        sparse: bool,

        /// Write a binary snapshot instead of the text dump
        #[arg(long)]
        binary: bool,
    },

    /// Write a synthetic dataset
    Generate {
        /// Output dataset file
        #[arg(short, long)]
        output: PathBuf,

        /// Samples per Gaussian
        #[arg(short = 'n', long, default_value = "100")]
        points: usize,

        /// Dimension of random Gaussians (three 2-D blobs when omitted)
        #[arg(short, long)]
        dim: Option<usize>,

        /// Number of random Gaussians
        #[arg(short, long, default_value = "3")]
        gaussians: usize,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Evaluate a fitted model on a dataset
    Score {
        /// Model file
        #[arg(short, long)]
        model: PathBuf,

        /// Dataset to score
        #[arg(short, long)]
        input: PathBuf,

        /// Model file is a binary snapshot
        #[arg(long)]
        binary: bool,

        /// Also print the most likely component of every sample
        #[arg(long)]
        predict: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let result = match cli.command {
        Commands::Train {
            input,
            output,
            components,
            workers,
            covariance,
            max_iter,
            threshold,
            seed,
            n_init,
            config,
            sparse,
            binary,
        } => {
            let options = TrainOptions {
                components,
                workers,
                covariance,
                max_iter,
                threshold,
                seed,
                n_init,
                config,
            };
            train(input, output, options, sparse, binary)
        }

        Commands::Generate {
            output,
            points,
            dim,
            gaussians,
            seed,
        } => generate(output, points, dim, gaussians, seed),

        Commands::Score {
            model,
            input,
            binary,
            predict,
        } => score(model, input, binary, predict),
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

struct TrainOptions {
    components: usize,
    workers: usize,
    covariance: Option<CovarianceType>,
    max_iter: Option<usize>,
    threshold: Option<f64>,
    seed: Option<u64>,
    n_init: Option<usize>,
    config: Option<PathBuf>,
}

impl TrainOptions {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        config.model.n_components = self.components;
        config.trainer.concurrency = self.workers;
        if let Some(covariance) = self.covariance {
            config.model.covariance_type = covariance;
        }
        if let Some(max_iter) = self.max_iter {
            config.trainer.max_iterations = max_iter;
        }
        if let Some(threshold) = self.threshold {
            config.trainer.threshold = threshold;
        }
        if self.seed.is_some() {
            config.trainer.seed = self.seed;
        }
        if let Some(n_init) = self.n_init {
            config.trainer.n_init = n_init;
        }

        config.validate()?;
        Ok(config)
    }
}

fn spinner(message: &str) -> ProgressBar {
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());

    let pb = ProgressBar::new_spinner();
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn load_sparse_dataset(path: &Path) -> Result<Vec<Vec<f64>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut samples = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        samples.push(parse_sparse_line(&line, i + 1)?);
    }
    Ok(sparse_dataset_to_dense(&samples))
}

fn train(input: PathBuf, output: PathBuf, options: TrainOptions, sparse: bool, binary: bool) -> Result<()> {
    let start_time = Instant::now();
    let config = options.into_config()?;

    println!("gmm {}", gmm::VERSION);
    println!("   Training on: {}", input.display());
    println!();

    // Step 1: Load dataset
    let pb = spinner("Loading dataset...");
    let data = if sparse {
        load_sparse_dataset(&input)?
    } else {
        load_dense_dataset(&input)?
    };
    pb.finish_and_clear();

    let dim = data.first().map(|x| x.len()).unwrap_or(0);
    println!("✓ Loaded {} samples ({} dimensions)", format_number(data.len()), dim);

    // Step 2: Fit
    let mut model = Gmm::from_config(&config)?;
    let pb = spinner(&format!(
        "Fitting {} {} components with {} workers...",
        config.model.n_components, config.model.covariance_type, config.trainer.concurrency
    ));
    let fit_start = Instant::now();
    let fitted = model.fit(&data);
    pb.finish_and_clear();
    fitted?;

    if let Some(report) = model.report() {
        println!(
            "✓ {} after {} iterations in {} (log-likelihood {:.6})",
            report.state,
            report.iterations,
            HumanDuration(fit_start.elapsed()),
            report.log_likelihood
        );
        if !report.reinitialized.is_empty() {
            println!("  {} component reinitializations", report.reinitialized.len());
        }
    }

    // Step 3: Save
    if binary {
        model.save(&output)?;
    } else {
        let mut writer = BufWriter::new(File::create(&output)?);
        model.dump(&mut writer)?;
        writer.flush()?;
    }

    println!("✓ Saved model to {}", output.display());
    println!();
    println!("Done in {}", HumanDuration(start_time.elapsed()));

    Ok(())
}

fn generate(output: PathBuf, points: usize, dim: Option<usize>, gaussians: usize, seed: Option<u64>) -> Result<()> {
    let mut rng = Random::new(seed);

    let data = match dim {
        Some(dim) => random_mixture(&mut rng, dim, gaussians, points)?.0,
        None => three_blobs(&mut rng, points)?,
    };

    save_dense_dataset(&output, &data)?;
    println!("✓ Wrote {} samples to {}", format_number(data.len()), output.display());

    Ok(())
}

fn score(model_path: PathBuf, input: PathBuf, binary: bool, predict: bool) -> Result<()> {
    let model = if binary {
        Gmm::load(&model_path)?
    } else {
        Gmm::load_dump(BufReader::new(File::open(&model_path)?))?
    };
    let data = load_dense_dataset(&input)?;
    if data.is_empty() {
        return Err(GmmError::EmptyDataset);
    }

    let total = model.log_likelihood(&data)?;

    println!("Model: {:?}", model_path);
    println!("  Components: {}", model.n_components());
    println!("  Covariance: {}", model.covariance_type());
    println!("  Weights: {:?}", model.weights());
    println!("  Samples: {}", format_number(data.len()));
    println!("  Log-likelihood: {:.6}", total);
    println!("  Mean log-likelihood: {:.6}", total / data.len() as f64);

    if predict {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for x in &data {
            writeln!(out, "{}", model.predict(x)?)?;
        }
    }

    Ok(())
}

fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
