//! Stage drivers: read a stage's input, run its job, persist its output.
//!
//! Each stage can be run on its own (the CLI subcommands do this) or chained
//! by [`run`], which wires the work directory layout together.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::ThreadPool;

use crate::arff;
use crate::association;
use crate::config::{ExecutorConfig, PipelineConfig};
use crate::counting;
use crate::error::{PipelineError, Result};
use crate::files::{is_complete, read_splits, write_partitions};
use crate::gold::GoldStandardIndex;
use crate::inversion;
use crate::mapreduce::{Counters, JobOutput};
use crate::similarity;
use crate::stem::WordStemmer;
use crate::totals::TotalCounters;

/// What a finished stage left behind.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: &'static str,
    pub records: usize,
    pub counters: Counters,
    pub output: PathBuf,
}

fn persist<O: std::fmt::Display>(
    stage: &'static str,
    output: JobOutput<O>,
    dir: &Path,
) -> Result<StageReport> {
    let files = write_partitions(dir, &output.partitions)?;
    let records = output.records().count();
    info!(
        "[{stage}] wrote {records} records to {} ({} files)",
        dir.display(),
        files.len()
    );
    Ok(StageReport {
        stage,
        records,
        counters: output.counters,
        output: dir.to_path_buf(),
    })
}

fn read_input(input: &Path, executor: &ExecutorConfig) -> Result<Vec<Vec<String>>> {
    if input.is_dir() && !is_complete(input) {
        warn!("{} has no success marker; reading it anyway", input.display());
    }
    read_splits(input, executor.split_lines)
}

/// Stage A. Writes the counts to `output`, then the totals record to
/// `totals`. The totals are only stored once the counts are on disk.
pub fn count(
    executor: &ExecutorConfig,
    pool: &ThreadPool,
    corpus: &Path,
    output: &Path,
    totals: &Path,
) -> Result<StageReport> {
    let splits = read_input(corpus, executor)?;
    let stemmer = WordStemmer::english();
    let counted = counting::run(&executor.job("count", pool), splits, &stemmer)?;
    let totals_record = counted.totals;
    let report = persist("count", counted.output, output)?;
    totals_record.store(totals)?;
    Ok(report)
}

/// Stage B.
pub fn invert(
    executor: &ExecutorConfig,
    pool: &ThreadPool,
    input: &Path,
    output: &Path,
) -> Result<StageReport> {
    let splits = read_input(input, executor)?;
    let out = inversion::run(&executor.job("invert", pool), splits)?;
    persist("invert", out, output)
}

/// Stage C. Fails before reading any input when the totals are unavailable.
pub fn measure(
    executor: &ExecutorConfig,
    pool: &ThreadPool,
    input: &Path,
    output: &Path,
    totals: &Path,
) -> Result<StageReport> {
    let totals = TotalCounters::load(totals)?;
    info!("[measure] using totals L={} F={}", totals.lexemes, totals.features);
    let splits = read_input(input, executor)?;
    let out = association::run(&executor.job("measure", pool), splits, totals)?;
    persist("measure", out, output)
}

/// Stage D.
pub fn join(
    executor: &ExecutorConfig,
    pool: &ThreadPool,
    input: &Path,
    output: &Path,
    gold_standard: &Path,
) -> Result<StageReport> {
    let index = GoldStandardIndex::load(gold_standard, &WordStemmer::english())?;
    if index.is_empty() {
        warn!("gold standard {} is empty", gold_standard.display());
    }
    let splits = read_input(input, executor)?;
    let out = similarity::run(&executor.job("join", pool), splits, &index)?;
    persist("join", out, output)
}

fn require_complete(report: &StageReport) -> Result<()> {
    if is_complete(&report.output) {
        Ok(())
    } else {
        Err(PipelineError::StageFailed {
            stage: report.stage,
            reason: format!("no success marker in {}", report.output.display()),
        })
    }
}

/// Reports of all stages of a full run, in execution order.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
    pub arff: Option<PathBuf>,
}

/// Runs stages A to D, then the optional ARFF export.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport> {
    let executor = &config.executor;
    let pool = executor.thread_pool()?;
    info!(
        "running pipeline on {} with {} partitions, {} threads",
        config.corpus.display(),
        executor.partitions,
        pool.current_num_threads()
    );
    if let Ok(resolved) = serde_json::to_string(config) {
        debug!("resolved configuration: {resolved}");
    }

    let mut stages = Vec::with_capacity(4);

    let counted = count(
        executor,
        &pool,
        &config.corpus,
        &config.counts_dir(),
        &config.totals_path(),
    )?;
    require_complete(&counted)?;
    stages.push(counted);

    let inverted = invert(executor, &pool, &config.counts_dir(), &config.inverted_dir())?;
    require_complete(&inverted)?;
    stages.push(inverted);

    let measured = measure(
        executor,
        &pool,
        &config.inverted_dir(),
        &config.measures_dir(),
        &config.totals_path(),
    )?;
    require_complete(&measured)?;
    stages.push(measured);

    let joined = join(
        executor,
        &pool,
        &config.measures_dir(),
        &config.output_dir,
        &config.gold_standard,
    )?;
    require_complete(&joined)?;
    stages.push(joined);

    let arff = if config.arff {
        let path = config
            .arff_path
            .clone()
            .unwrap_or_else(|| arff::default_arff_path(&config.output_dir));
        arff::export(&config.output_dir, &path)?;
        Some(path)
    } else {
        None
    };

    Ok(PipelineReport { stages, arff })
}
