//! Stage D: join association vectors against the gold standard and score
//! every gold word pair.
//!
//! Map output is keyed by a [`CompositeKey`]: records are partitioned on the
//! ordered pair alone, sorted by `(pair, label, feature)` and grouped by
//! `(pair, label)`. One reduce call therefore sees every feature either word
//! of the pair was observed with, in feature order. The reduce walks that
//! stream once, pairs up features both words share, zero-fills the rest and
//! folds every aligned pair into a fresh [`DiffAccumulator`].

use std::fmt;
use std::hash::{Hash, Hasher};

use log::trace;

use crate::association::{AssociationVector, MeasureRecord};
use crate::error::Result;
use crate::gold::GoldStandardIndex;
use crate::mapreduce::{Emitter, Job, JobOutput, ReduceContext, ShuffleKey};

pub const DROPPED_LINES: &str = "dropped_lines";
pub const DROPPED_GOLD_LINES: &str = "dropped_gold_lines";
pub const UNMATCHED: &str = "unmatched";
pub const MATCHED: &str = "matched";
pub const PAIRS: &str = "pairs";

/// Number of association measures per vector.
pub const MEASURES: usize = 4;
/// Number of distance/similarity metrics per measure.
pub const METRICS: usize = 6;
/// Length of the flattened output vector.
pub const VECTOR_LEN: usize = MEASURES * METRICS;

/// Short measure names used in exported attribute names.
pub const MEASURE_LABELS: [&str; MEASURES] = ["freq", "prob", "PMI", "t-test"];
/// Metric names, in output order.
pub const METRIC_LABELS: [&str; METRICS] = [
    "distManhattan",
    "distEuclidean",
    "simCosine",
    "simJaccard",
    "simDice",
    "simJS",
];

/// `measure_metric` names of the 24 output values, measure-major.
pub fn attribute_names() -> Vec<String> {
    MEASURE_LABELS
        .iter()
        .flat_map(|m| METRIC_LABELS.iter().map(move |d| format!("{m}_{d}")))
        .collect()
}

/// Shuffle key of the join.
///
/// Field order gives the sort order. Partitioning hashes `pair_key` only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompositeKey {
    /// `"w1 w2"` in the gold file's order.
    pub pair_key: String,
    pub label: String,
    pub feature: String,
}

impl ShuffleKey for CompositeKey {
    fn same_group(&self, other: &Self) -> bool {
        self.pair_key == other.pair_key && self.label == other.label
    }

    fn partition_hash<H: Hasher>(&self, state: &mut H) {
        self.pair_key.hash(state);
    }
}

/// An association vector tagged with the lexeme that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedFeature {
    pub feature: String,
    pub lexeme: String,
    pub vector: AssociationVector,
}

/// Map task: looks every lexeme up in the gold index and emits one record per
/// gold pair it takes part in.
pub fn join_split(
    lines: Vec<String>,
    index: &GoldStandardIndex,
    emitter: &mut Emitter<CompositeKey, MatchedFeature>,
) {
    for line in lines {
        let Some((lexeme, feature, vector)) = MeasureRecord::parse_measures(&line) else {
            trace!("dropping measure line {line:?}");
            emitter.increment(DROPPED_LINES, 1);
            continue;
        };
        if !index.contains(&lexeme) {
            emitter.increment(UNMATCHED, 1);
            continue;
        }
        for entry in index.lookup(&lexeme) {
            let (w1, w2) = entry.orient(&lexeme);
            let key = CompositeKey {
                pair_key: format!("{w1} {w2}"),
                label: entry.label.clone(),
                feature: feature.clone(),
            };
            emitter.increment(MATCHED, 1);
            emitter.emit(
                key,
                MatchedFeature {
                    feature: feature.clone(),
                    lexeme: lexeme.clone(),
                    vector,
                },
            );
        }
    }
}

fn zero_filled(w1: &str, record: MatchedFeature) -> (AssociationVector, AssociationVector) {
    if record.lexeme == w1 {
        (record.vector, AssociationVector::ZERO)
    } else {
        (AssociationVector::ZERO, record.vector)
    }
}

/// Turns a feature-sorted stream into `(vector of w1, vector of w2)` pairs.
///
/// Two consecutive records with the same feature are matched; a record whose
/// feature has no partner is paired with the zero vector on the missing side.
pub fn align_features<I>(w1: &str, records: I) -> Vec<(AssociationVector, AssociationVector)>
where
    I: IntoIterator<Item = MatchedFeature>,
{
    let mut aligned = Vec::new();
    let mut pending: Option<MatchedFeature> = None;
    for current in records {
        match pending.take() {
            None => pending = Some(current),
            Some(previous) if previous.feature == current.feature => {
                if previous.lexeme == w1 {
                    aligned.push((previous.vector, current.vector));
                } else {
                    aligned.push((current.vector, previous.vector));
                }
            }
            Some(previous) => {
                aligned.push(zero_filled(w1, previous));
                pending = Some(current);
            }
        }
    }
    if let Some(previous) = pending {
        aligned.push(zero_filled(w1, previous));
    }
    aligned
}

/// Running sums for the 4×6 diff-matrix of one word pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffAccumulator {
    pub manhattan: [f64; MEASURES],
    /// Sum of `(v1 + v2)²`, not of the squared difference.
    pub euclidean_sq: [f64; MEASURES],
    /// `[dot, norm1², norm2²]`
    pub cosine: [[f64; 3]; MEASURES],
    /// `[Σmin, Σmax]`
    pub jaccard: [[f64; 2]; MEASURES],
    /// `[Σmin, Σ(v1 + v2)]`
    pub dice: [[f64; 2]; MEASURES],
    /// `[term1, term2]`
    pub js: [[f64; 2]; MEASURES],
}

impl DiffAccumulator {
    /// Folds every aligned pair into a new accumulator.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (AssociationVector, AssociationVector)>,
    {
        let mut acc = DiffAccumulator::default();
        for (v1, v2) in pairs {
            acc.add(&v1, &v2);
        }
        acc
    }

    pub fn add(&mut self, v1: &AssociationVector, v2: &AssociationVector) {
        let (a, b) = (v1.to_array(), v2.to_array());
        for i in 0..MEASURES {
            let (x, y) = (a[i], b[i]);
            self.manhattan[i] += (x - y).abs();
            self.euclidean_sq[i] += (x + y).powi(2);

            self.cosine[i][0] += x * y;
            self.cosine[i][1] += x * x;
            self.cosine[i][2] += y * y;

            self.jaccard[i][0] += x.min(y);
            self.jaccard[i][1] += x.max(y);

            self.dice[i][0] += x.min(y);
            self.dice[i][1] += x + y;

            let mean = (x + y) / 2.0;
            if x > 0.0 {
                self.js[i][0] += x * (x / mean).ln();
            }
            if y > 0.0 {
                self.js[i][1] += y * (y / mean).ln();
            }
        }
    }

    /// Final 4×6 matrix. Similarities with a zero denominator become 0,
    /// distances and divergences that went NaN become +∞.
    pub fn finalize(&self) -> [[f64; METRICS]; MEASURES] {
        let mut matrix = [[0.0; METRICS]; MEASURES];
        for (i, row) in matrix.iter_mut().enumerate() {
            row[0] = distance(self.manhattan[i]);
            row[1] = if self.euclidean_sq[i] < 0.0 {
                f64::INFINITY
            } else {
                distance(self.euclidean_sq[i].sqrt())
            };

            let [dot, norm1, norm2] = self.cosine[i];
            row[2] = if norm1 <= 0.0 || norm2 <= 0.0 {
                0.0
            } else {
                similarity(dot / (norm1.sqrt() * norm2.sqrt()))
            };

            let [min, max] = self.jaccard[i];
            row[3] = if max == 0.0 { 0.0 } else { similarity(min / max) };

            let [min, sum] = self.dice[i];
            row[4] = if sum == 0.0 {
                0.0
            } else {
                similarity(2.0 * min / sum)
            };

            row[5] = distance(self.js[i][0] + self.js[i][1]);
        }
        matrix
    }
}

fn distance(value: f64) -> f64 {
    if value.is_nan() { f64::INFINITY } else { value }
}

fn similarity(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value }
}

/// The terminal record: `w1 w2 label \t [v0, ..., v23]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityVector {
    pub w1: String,
    pub w2: String,
    pub label: String,
    pub values: [f64; VECTOR_LEN],
}

impl SimilarityVector {
    pub fn from_matrix(
        w1: String,
        w2: String,
        label: String,
        matrix: [[f64; METRICS]; MEASURES],
    ) -> Self {
        let mut values = [0.0; VECTOR_LEN];
        for (slot, value) in values.iter_mut().zip(matrix.iter().flatten()) {
            *slot = *value;
        }
        SimilarityVector {
            w1,
            w2,
            label,
            values,
        }
    }

    /// Value of `metric` for `measure`, both indices zero-based.
    pub fn get(&self, measure: usize, metric: usize) -> f64 {
        self.values[measure * METRICS + metric]
    }

    /// Parses a line of the final output.
    pub fn parse(line: &str) -> Option<Self> {
        let (key, vector) = line.split_once('\t')?;
        let fields: Vec<&str> = key.split_whitespace().collect();
        let [w1, w2, label] = fields.as_slice() else {
            return None;
        };
        let body = vector.trim().strip_prefix('[')?.strip_suffix(']')?;

        let mut values = [0.0; VECTOR_LEN];
        let mut parts = body.split(',');
        for slot in values.iter_mut() {
            *slot = parts.next()?.trim().parse().ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(SimilarityVector {
            w1: w1.to_string(),
            w2: w2.to_string(),
            label: label.to_string(),
            values,
        })
    }
}

/// Formats a value the way the downstream classifier reads it: `2.0` rather
/// than `2`, `Infinity` for +∞.
pub fn format_value(value: f64) -> String {
    if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        format!("{value:?}")
    }
}

impl fmt::Display for SimilarityVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\t[", self.w1, self.w2, self.label)?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&format_value(*value))?;
        }
        f.write_str("]")
    }
}

/// Scores one `(pair, label)` group. All state lives in this call.
pub fn score_group(group: Vec<(CompositeKey, MatchedFeature)>) -> Option<SimilarityVector> {
    let first = group.first()?;
    let Some((w1, w2)) = first.0.pair_key.split_once(' ') else {
        trace!("malformed pair key {:?}", first.0.pair_key);
        return None;
    };
    let (w1, w2, label) = (w1.to_string(), w2.to_string(), first.0.label.clone());

    let aligned = align_features(&w1, group.into_iter().map(|(_, record)| record));
    let matrix = DiffAccumulator::from_pairs(aligned).finalize();
    Some(SimilarityVector::from_matrix(w1, w2, label, matrix))
}

pub fn score_pairs(
    group: Vec<(CompositeKey, MatchedFeature)>,
    ctx: &mut ReduceContext<SimilarityVector>,
) {
    if let Some(vector) = score_group(group) {
        ctx.increment(PAIRS, 1);
        ctx.write(vector);
    }
}

/// Runs stage D against an already built gold index.
pub fn run(
    job: &Job<'_>,
    splits: Vec<Vec<String>>,
    index: &GoldStandardIndex,
) -> Result<JobOutput<SimilarityVector>> {
    let mut out = job.run(splits, |split, em| join_split(split, index, em), score_pairs)?;
    out.counters.increment(DROPPED_GOLD_LINES, index.dropped_lines() as u64);
    Ok(out)
}
