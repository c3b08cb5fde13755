//! Pipeline configuration, read from JSON.
//!
//! Every field has a default, so a config file only has to name what differs.
//! Command-line flags are applied on top of the loaded values.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::mapreduce::Job;

/// Settings of the local executor shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Reduce partitions, i.e. `part-r-*` files per stage.
    pub partitions: usize,
    /// Worker threads; 0 lets rayon decide.
    pub threads: usize,
    /// Input lines per map task.
    pub split_lines: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            partitions: 4,
            threads: 0,
            split_lines: 50_000,
        }
    }
}

impl ExecutorConfig {
    pub fn thread_pool(&self) -> Result<ThreadPool> {
        Ok(ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("similarity-worker-{i}"))
            .build()?)
    }

    pub fn job<'p>(&self, name: &'static str, pool: &'p ThreadPool) -> Job<'p> {
        Job::new(name, self.partitions, pool)
    }
}

/// Inputs, outputs and executor settings of a full pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// File or directory of syntactic n-gram lines (`.gz` allowed).
    pub corpus: PathBuf,
    /// `word1 word2 label` file.
    pub gold_standard: PathBuf,
    /// Holds the intermediate stage outputs and the totals record.
    pub work_dir: PathBuf,
    /// Receives the final similarity vectors.
    pub output_dir: PathBuf,
    /// Also export the final vectors as an ARFF dataset.
    pub arff: bool,
    /// Where to write the ARFF file; a timestamped name in `output_dir` if unset.
    pub arff_path: Option<PathBuf>,
    #[serde(flatten)]
    pub executor: ExecutorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            corpus: PathBuf::from("corpus"),
            gold_standard: PathBuf::from("gold_standard.txt"),
            work_dir: PathBuf::from("work"),
            output_dir: PathBuf::from("output"),
            arff: false,
            arff_path: None,
            executor: ExecutorConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| PipelineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn counts_dir(&self) -> PathBuf {
        self.work_dir.join("counts")
    }

    pub fn totals_path(&self) -> PathBuf {
        self.work_dir.join("totals")
    }

    pub fn inverted_dir(&self) -> PathBuf {
        self.work_dir.join("inverted")
    }

    pub fn measures_dir(&self) -> PathBuf {
        self.work_dir.join("measures")
    }
}
