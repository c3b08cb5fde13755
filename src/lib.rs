#![forbid(unsafe_code)]
//! # Syntactic Similarity
//!
//! Turns a corpus of syntactic n-grams into one similarity feature vector per
//! gold-standard word pair. The work is split into four map/reduce stages that
//! run on an in-process executor:
//!
//! 1. [`counting`]: lexeme, feature and lexeme/feature counts plus the global
//!    totals L and F.
//! 2. [`inversion`]: every lexeme/feature count joined with the marginals of
//!    both endpoints.
//! 3. [`association`]: frequency, probability, PMI and t-test per pair.
//! 4. [`similarity`]: a 4×6 matrix of distances and similarities per gold
//!    pair, flattened to 24 values.
//!
//! Every stage reads line-oriented text and writes `part-r-NNNNN` files plus a
//! `_SUCCESS` marker, so stages can be run one by one or chained through
//! [`pipeline::run`].
//!
//! ## Example
//! ```no_run
//! use syntactic_similarity::{PipelineConfig, pipeline};
//!
//! let config = PipelineConfig::load("pipeline.json".as_ref())?;
//! let report = pipeline::run(&config)?;
//! for stage in &report.stages {
//!     println!("{}: {} records", stage.stage, stage.records);
//! }
//! # Ok::<(), syntactic_similarity::PipelineError>(())
//! ```

pub mod arff;
pub mod association;
pub mod config;
pub mod counting;
pub mod error;
pub mod files;
pub mod gold;
pub mod inversion;
pub mod mapreduce;
pub mod pipeline;
pub mod similarity;
pub mod stem;
pub mod totals;

pub use association::AssociationVector;
pub use config::{ExecutorConfig, PipelineConfig};
pub use error::{PipelineError, Result};
pub use gold::GoldStandardIndex;
pub use similarity::{DiffAccumulator, SimilarityVector};
pub use stem::WordStemmer;
pub use totals::TotalCounters;
