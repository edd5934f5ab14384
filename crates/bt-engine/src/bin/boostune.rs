//! Boostune command-line interface.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use bt_data::{generate_imbalanced, write_csv, write_predictions, CsvLoader, SyntheticConfig};
use bt_engine::{GradientBoostedClassifier, Tuner, TunerConfig};

#[derive(Parser)]
#[command(name = "boostune")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Gradient-boosted trees tuned by Bayesian optimization over stratified CV AUC")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tune hyperparameters on a labelled CSV and save the final model
    Tune {
        /// Input CSV with a header row
        #[arg(short, long)]
        data: PathBuf,

        /// Label column name
        #[arg(short, long, default_value = "label")]
        label: String,

        /// Output model file (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Tuner configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Trial budget, overrides the config file
        #[arg(short = 'n', long)]
        trials: Option<usize>,

        /// Random seed, overrides the config file
        #[arg(long)]
        seed: Option<u64>,

        /// Train cross-validation folds in parallel
        #[arg(long)]
        parallel_folds: bool,

        /// Write the full trial history (JSON) here
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Predict positive-class probabilities with a saved model
    Predict {
        /// Trained model file
        #[arg(short, long)]
        model: PathBuf,

        /// Input CSV with a header row; a label column is ignored
        #[arg(short, long)]
        data: PathBuf,

        /// Label column name to skip if present
        #[arg(short, long, default_value = "label")]
        label: String,

        /// Output CSV; probabilities go to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a synthetic imbalanced dataset as CSV
    Synth {
        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = "1000")]
        rows: usize,

        #[arg(long, default_value = "10")]
        features: usize,

        /// Fraction of positive rows
        #[arg(long, default_value = "0.05")]
        positive_rate: f64,

        /// Probability of a missing cell
        #[arg(long, default_value = "0.0")]
        missing_rate: f64,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boostune=info,bt_engine=info,bt_optimizer=info,bt_data=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tune {
            data,
            label,
            output,
            config,
            trials,
            seed,
            parallel_folds,
            history,
        } => {
            let mut tuner_config = match config {
                Some(path) => TunerConfig::from_json_file(&path)
                    .with_context(|| format!("loading tuner config {}", path.display()))?,
                None => TunerConfig::default(),
            };
            if let Some(n) = trials {
                tuner_config = tuner_config.with_n_trials(n);
            }
            if let Some(seed) = seed {
                tuner_config = tuner_config.with_seed(seed);
            }
            if parallel_folds {
                tuner_config = tuner_config.with_parallel_folds(true);
            }
            cmd_tune(&data, &label, &output, tuner_config, history.as_deref())?;
        }
        Commands::Predict {
            model,
            data,
            label,
            output,
        } => {
            cmd_predict(&model, &data, &label, output.as_deref())?;
        }
        Commands::Synth {
            output,
            rows,
            features,
            positive_rate,
            missing_rate,
            seed,
        } => {
            let config = SyntheticConfig::new(rows, features, positive_rate)
                .with_missing_rate(missing_rate)
                .with_seed(seed);
            cmd_synth(&output, &config)?;
        }
    }

    Ok(())
}

fn cmd_tune(
    data: &Path,
    label: &str,
    output: &Path,
    config: TunerConfig,
    history: Option<&Path>,
) -> anyhow::Result<()> {
    let dataset = CsvLoader::new()
        .with_label_column(label)
        .load(data)
        .with_context(|| format!("loading dataset {}", data.display()))?;

    let outcome = Tuner::new(config).run(&dataset)?;
    outcome.model.save_json(output)?;

    if let Some(path) = history {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating history file {}", path.display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &outcome.status)?;
        info!("Wrote trial history to {}", path.display());
    }

    println!("best cv auc: {:.4}", outcome.best_trial.objective);
    println!("best params: {}", outcome.best_params);
    let mut importance = outcome.model.feature_importance();
    importance.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (name, gain) in importance.iter().take(10) {
        println!("  {name:<24} {gain:.4}");
    }
    println!("model: {}", output.display());
    Ok(())
}

fn cmd_predict(model_path: &Path, data: &Path, label: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let model = GradientBoostedClassifier::load_json(model_path)
        .with_context(|| format!("loading model {}", model_path.display()))?;
    let table = CsvLoader::new()
        .with_label_column(label)
        .load_features(data)
        .with_context(|| format!("loading features {}", data.display()))?;

    if table.feature_names != model.feature_names() {
        tracing::warn!(
            "feature names differ from training ({:?} vs {:?}); matching by position",
            table.feature_names,
            model.feature_names()
        );
    }
    let probabilities = model.predict_proba(&table.rows)?;

    match output {
        Some(path) => {
            write_predictions(path, &probabilities)?;
            info!("Wrote {} predictions to {}", probabilities.len(), path.display());
        }
        None => {
            for p in &probabilities {
                println!("{p}");
            }
        }
    }
    Ok(())
}

fn cmd_synth(output: &Path, config: &SyntheticConfig) -> anyhow::Result<()> {
    let dataset = generate_imbalanced(config)?;
    write_csv(output, &dataset, bt_data::DEFAULT_LABEL_COLUMN)?;
    println!(
        "wrote {} rows ({} positive) to {}",
        dataset.n_rows(),
        dataset.class_counts().positive,
        output.display()
    );
    Ok(())
}
