//! Image Classifier CLI
//!
//! Entry point for training, re-evaluating and plotting runs of the
//! directory-backed CNN classifier.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use image_classifier::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use image_classifier::dataset::{DirectoryDataset, Split};
use image_classifier::pipeline::{evaluate_run, run_pipeline};
use image_classifier::training::TrainingHistory;
use image_classifier::utils::logging::{init_logging, LogConfig, LogLevel};
use image_classifier::{plot_train_history, PipelineConfig, VERSION};

/// Train a CNN image classifier on a class-per-directory dataset
#[derive(Parser, Debug)]
#[command(name = "image_classifier")]
#[command(version)]
#[command(about = "Directory-backed CNN image classifier with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace); `--verbose` forces debug
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train, reload the best checkpoint, evaluate all splits and plot history
    Train {
        /// JSON run configuration (defaults are used for missing fields)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the epoch ceiling
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Dataset root containing train/, val/ and test/
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Where checkpoint, history, reports and charts are written
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Override the random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Evaluate the best checkpoint of a finished run on all splits
    Evaluate {
        /// Output directory of the run
        #[arg(short, long, default_value = "artifacts")]
        run_dir: PathBuf,
    },

    /// Render accuracy/loss charts from a saved history
    Plot {
        /// Path to history.json
        #[arg(long, default_value = "artifacts/history.json")]
        history: PathBuf,

        /// Directory for the SVG files (defaults to the history's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show per-class image counts of every split
    Stats {
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig {
            level: LogLevel::from_name(&cli.log_level),
            ..LogConfig::default()
        }
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train {
            config,
            epochs,
            data_dir,
            output_dir,
            seed,
        } => {
            let mut run_config = match config {
                Some(path) => PipelineConfig::load(&path)
                    .with_context(|| format!("Failed to read config {:?}", path))?,
                None => PipelineConfig::default(),
            };
            if let Some(epochs) = epochs {
                run_config.training.epochs = epochs;
            }
            if let Some(dir) = data_dir {
                run_config.data.set_root(&dir);
            }
            if let Some(dir) = output_dir {
                run_config.output_dir = dir;
            }
            if let Some(seed) = seed {
                run_config.seed = seed;
            }
            cmd_train(&run_config)?;
        }

        Commands::Evaluate { run_dir } => {
            cmd_evaluate(&run_dir)?;
        }

        Commands::Plot {
            history,
            output_dir,
        } => {
            cmd_plot(&history, output_dir.as_deref())?;
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════╗
 ║   Image Classifier                                       ║
 ║   Directory-backed CNN training with Burn + Rust         ║
 ╚══════════════════════════════════════════════════════════╝
  "#
        .green()
    );
    println!("  v{}\n", VERSION);
}

fn cmd_train(config: &PipelineConfig) -> Result<()> {
    println!("  Backend: {}", backend_name());
    println!("  Train:   {:?}", config.data.train_dir);
    println!("  Output:  {:?}", config.output_dir);
    println!(
        "  Epochs:  up to {} (early stop: patience {}, from epoch {})",
        config.training.epochs, config.training.patience, config.training.start_from_epoch
    );
    println!();

    let device = default_device();
    let summary = run_pipeline::<TrainingBackend>(config, &device)?;

    info!(
        "Run finished: {} after {} epochs",
        summary.outcome.phase, summary.outcome.epochs_run
    );
    println!("\n{}", "Training complete!".green().bold());
    Ok(())
}

fn cmd_evaluate(run_dir: &Path) -> Result<()> {
    println!("{}", format!("Evaluating run in {:?}", run_dir).cyan());

    let device = default_device();
    let reports = evaluate_run::<DefaultBackend>(run_dir, &device)?;

    println!("\n{}", "Summary".green().bold());
    for report in &reports {
        println!(
            "  {:<6} loss {:>8.4}  accuracy {:>6.2}%",
            report.split,
            report.loss,
            report.accuracy() * 100.0
        );
    }
    Ok(())
}

fn cmd_plot(history_path: &Path, output_dir: Option<&Path>) -> Result<()> {
    let history = TrainingHistory::load(history_path)?;
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => history_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let files = plot_train_history(&history, &dir)?;
    for file in files {
        println!("  {} {:?}", "Wrote".green(), file);
    }
    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    for split in Split::ALL {
        let dir = data_dir.join(split.as_str());
        println!("{}", format!("{} ({:?})", split, dir).cyan().bold());
        match DirectoryDataset::scan(&dir) {
            Ok(dataset) => dataset.get_stats().print(),
            Err(e) => println!("  {} {}", "Error:".red(), e),
        }
        println!();
    }
    Ok(())
}
