#![forbid(unsafe_code)]
//! # Syntactic Similarity CLI
//!
//! Runs the whole pipeline or any single stage of it.
//!
//! ## Example
//! ```bash
//! cargo run --release -- run --config pipeline.json
//! cargo run --release -- measure work/inverted work/measures --totals work/totals
//! ```
//!
//! Set `RUST_LOG=info` to see per-stage counters.

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use syntactic_similarity::{ExecutorConfig, PipelineConfig, Result, arff, pipeline};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Executor flags shared by every stage.
#[derive(Args, Clone, Copy)]
struct ExecutorArgs {
    /// Number of reduce partitions (output files per stage)
    #[arg(long)]
    partitions: Option<usize>,

    /// Worker threads (0 = one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Input lines per map task
    #[arg(long)]
    split_lines: Option<usize>,
}

impl ExecutorArgs {
    fn apply(self, mut executor: ExecutorConfig) -> ExecutorConfig {
        if let Some(partitions) = self.partitions {
            executor.partitions = partitions;
        }
        if let Some(threads) = self.threads {
            executor.threads = threads;
        }
        if let Some(split_lines) = self.split_lines {
            executor.split_lines = split_lines;
        }
        executor
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run all four stages, optionally followed by an ARFF export
    Run {
        /// JSON configuration file; flags below override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Corpus file or directory
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Gold-standard file (`word1 word2 label` per line)
        #[arg(long)]
        gold: Option<PathBuf>,

        /// Directory for intermediate outputs and the totals record
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Directory for the final similarity vectors
        #[arg(long)]
        output: Option<PathBuf>,

        /// Also export an ARFF file (timestamped name in the output directory)
        #[arg(long, default_value_t = false)]
        arff: bool,

        #[command(flatten)]
        executor: ExecutorArgs,
    },
    /// Stage A: count lexemes, features and pairs
    Count {
        corpus: PathBuf,
        output: PathBuf,
        /// Where to store the L/F totals record
        #[arg(long)]
        totals: PathBuf,
        #[command(flatten)]
        executor: ExecutorArgs,
    },
    /// Stage B: join pair counts with their marginals
    Invert {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        executor: ExecutorArgs,
    },
    /// Stage C: compute association measures
    Measure {
        input: PathBuf,
        output: PathBuf,
        /// Totals record written by `count`
        #[arg(long)]
        totals: PathBuf,
        #[command(flatten)]
        executor: ExecutorArgs,
    },
    /// Stage D: score gold-standard pairs
    Join {
        input: PathBuf,
        output: PathBuf,
        /// Gold-standard file
        #[arg(long)]
        gold: PathBuf,
        #[command(flatten)]
        executor: ExecutorArgs,
    },
    /// Convert final vectors into a Weka ARFF file
    Arff {
        input: PathBuf,
        /// Target file (default: timestamped file next to the input)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn run_pipeline(
    config: Option<PathBuf>,
    corpus: Option<PathBuf>,
    gold: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    output: Option<PathBuf>,
    arff: bool,
    executor: ExecutorArgs,
) -> Result<()> {
    let mut cfg = match config {
        Some(path) => PipelineConfig::load(&path)?,
        None => PipelineConfig::default(),
    };
    if let Some(corpus) = corpus {
        cfg.corpus = corpus;
    }
    if let Some(gold) = gold {
        cfg.gold_standard = gold;
    }
    if let Some(work_dir) = work_dir {
        cfg.work_dir = work_dir;
    }
    if let Some(output) = output {
        cfg.output_dir = output;
    }
    cfg.arff |= arff;
    cfg.executor = executor.apply(cfg.executor);

    let report = pipeline::run(&cfg)?;
    for stage in &report.stages {
        info!("{}: {} records ({})", stage.stage, stage.records, stage.counters);
    }
    if let Some(path) = report.arff {
        println!("{}", path.display());
    }
    println!("{}", cfg.output_dir.display());
    Ok(())
}

fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Run {
            config,
            corpus,
            gold,
            work_dir,
            output,
            arff,
            executor,
        } => run_pipeline(config, corpus, gold, work_dir, output, arff, executor),
        Command::Count {
            corpus,
            output,
            totals,
            executor,
        } => {
            let executor = executor.apply(ExecutorConfig::default());
            let pool = executor.thread_pool()?;
            let report = pipeline::count(&executor, &pool, &corpus, &output, &totals)?;
            println!("{}", report.output.display());
            Ok(())
        }
        Command::Invert {
            input,
            output,
            executor,
        } => {
            let executor = executor.apply(ExecutorConfig::default());
            let pool = executor.thread_pool()?;
            let report = pipeline::invert(&executor, &pool, &input, &output)?;
            println!("{}", report.output.display());
            Ok(())
        }
        Command::Measure {
            input,
            output,
            totals,
            executor,
        } => {
            let executor = executor.apply(ExecutorConfig::default());
            let pool = executor.thread_pool()?;
            let report = pipeline::measure(&executor, &pool, &input, &output, &totals)?;
            println!("{}", report.output.display());
            Ok(())
        }
        Command::Join {
            input,
            output,
            gold,
            executor,
        } => {
            let executor = executor.apply(ExecutorConfig::default());
            let pool = executor.thread_pool()?;
            let report = pipeline::join(&executor, &pool, &input, &output, &gold)?;
            println!("{}", report.output.display());
            Ok(())
        }
        Command::Arff { input, output } => {
            let output = output.unwrap_or_else(|| {
                let dir = if input.is_dir() {
                    input.clone()
                } else {
                    input.parent().map(PathBuf::from).unwrap_or_default()
                };
                arff::default_arff_path(&dir)
            });
            arff::export(&input, &output)?;
            println!("{}", output.display());
            Ok(())
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli.command) {
        error!("Error: {}", e);
        process::exit(1);
    }
}
