//! Stage C: association measures for every lexeme/feature pair.

use std::fmt;
use std::hash::{Hash, Hasher};

use log::trace;

use crate::error::Result;
use crate::inversion::{InvertedRecord, Marginal};
use crate::mapreduce::{Emitter, Job, JobOutput, ReduceContext, ShuffleKey};
use crate::totals::TotalCounters;

pub const DROPPED_LINES: &str = "dropped_lines";
pub const INSUFFICIENT_EVIDENCE: &str = "insufficient_evidence";

/// Names of the four measures, in vector order.
pub const MEASURE_NAMES: [&str; 4] = ["assoc_freq", "assoc_prob", "assoc_PMI", "assoc_t_test"];

/// The four association measures of one lexeme/feature pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AssociationVector {
    pub freq: f64,
    pub prob: f64,
    pub pmi: f64,
    pub t_test: f64,
}

impl AssociationVector {
    pub const ZERO: AssociationVector = AssociationVector {
        freq: 0.0,
        prob: 0.0,
        pmi: 0.0,
        t_test: 0.0,
    };

    /// Computes the measures from raw counts and the global totals.
    ///
    /// Returns `None` when any of the counts is zero.
    pub fn compute(pair: u64, lexeme: u64, feature: u64, totals: TotalCounters) -> Option<Self> {
        if pair == 0 || lexeme == 0 || feature == 0 {
            return None;
        }
        let lf = pair as f64;
        let l = lexeme as f64;
        let f = feature as f64;
        let big_l = totals.lexemes as f64;
        let big_f = totals.features as f64;

        let expected = (l / big_l) * (f / big_f);
        Some(AssociationVector {
            freq: lf,
            prob: lf / l,
            pmi: (big_f * lf) / (l * f),
            t_test: ((lf / big_l) - expected) / expected.sqrt(),
        })
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.freq, self.prob, self.pmi, self.t_test]
    }

    /// Parses the four `name=value` tokens in vector order.
    pub fn parse_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let mut values = [0.0; 4];
        let mut tokens = tokens.into_iter();
        for (slot, name) in values.iter_mut().zip(MEASURE_NAMES) {
            let (key, value) = tokens.next()?.split_once('=')?;
            if key != name {
                return None;
            }
            *slot = value.parse().ok()?;
        }
        if tokens.next().is_some() {
            return None;
        }
        let [freq, prob, pmi, t_test] = values;
        Some(AssociationVector {
            freq,
            prob,
            pmi,
            t_test,
        })
    }
}

impl fmt::Display for AssociationVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.to_array();
        for (i, (name, value)) in MEASURE_NAMES.iter().zip(values).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// `(lexeme, feature)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LexemeFeature {
    pub lexeme: String,
    pub feature: String,
}

impl ShuffleKey for LexemeFeature {
    fn same_group(&self, other: &Self) -> bool {
        self == other
    }

    fn partition_hash<H: Hasher>(&self, state: &mut H) {
        self.hash(state);
    }
}

/// One line of stage C output.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasureRecord {
    Measures {
        lexeme: String,
        feature: String,
        vector: AssociationVector,
    },
    /// Placeholder for pairs lacking a pair count or a marginal.
    InsufficientEvidence {
        lexeme: String,
        feature: String,
        lexeme_count: u64,
        feature_count: u64,
        pair_count: u64,
    },
}

impl MeasureRecord {
    /// Parses a measure line; error placeholders and malformed lines give `None`.
    pub fn parse_measures(line: &str) -> Option<(String, String, AssociationVector)> {
        let mut fields = line.split_whitespace();
        let lexeme = fields.next()?;
        let feature = fields.next()?;
        let vector = AssociationVector::parse_tokens(fields)?;
        Some((lexeme.to_string(), feature.to_string(), vector))
    }
}

impl fmt::Display for MeasureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureRecord::Measures {
                lexeme,
                feature,
                vector,
            } => write!(f, "{lexeme} {feature}\t{vector}"),
            MeasureRecord::InsufficientEvidence {
                lexeme,
                feature,
                lexeme_count,
                feature_count,
                pair_count,
            } => write!(
                f,
                "{lexeme} {feature}\tError! l={lexeme_count} f={feature_count} lf={pair_count}"
            ),
        }
    }
}

pub fn regroup_split(lines: Vec<String>, emitter: &mut Emitter<LexemeFeature, (u64, Marginal)>) {
    for line in lines {
        let Some(record) = InvertedRecord::parse(&line) else {
            trace!("dropping inverted line {line:?}");
            emitter.increment(DROPPED_LINES, 1);
            continue;
        };
        emitter.emit(
            LexemeFeature {
                lexeme: record.lexeme,
                feature: record.feature,
            },
            (record.pair_count, record.marginal),
        );
    }
}

/// Reduce: combines the pair count with both marginals and scores the pair.
pub fn score_pair(
    totals: TotalCounters,
    group: Vec<(LexemeFeature, (u64, Marginal))>,
    ctx: &mut ReduceContext<MeasureRecord>,
) {
    let Some(key) = group.first().map(|(k, _)| k.clone()) else {
        return;
    };

    let (mut lf, mut l, mut f) = (0u64, 0u64, 0u64);
    for (_, (pair_count, marginal)) in group {
        if pair_count != 0 {
            lf = pair_count;
        }
        match marginal {
            Marginal::Lexeme(n) => l += n,
            Marginal::Feature(n) => f += n,
        }
    }

    let LexemeFeature { lexeme, feature } = key;
    match AssociationVector::compute(lf, l, f, totals) {
        Some(vector) => ctx.write(MeasureRecord::Measures {
            lexeme,
            feature,
            vector,
        }),
        None => {
            ctx.increment(INSUFFICIENT_EVIDENCE, 1);
            ctx.write(MeasureRecord::InsufficientEvidence {
                lexeme,
                feature,
                lexeme_count: l,
                feature_count: f,
                pair_count: lf,
            });
        }
    }
}

/// Runs stage C. The totals must already be loaded.
pub fn run(
    job: &Job<'_>,
    splits: Vec<Vec<String>>,
    totals: TotalCounters,
) -> Result<JobOutput<MeasureRecord>> {
    job.run(splits, regroup_split, |group, ctx| score_pair(totals, group, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOTALS: TotalCounters = TotalCounters {
        lexemes: 100,
        features: 200,
    };

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn measures_follow_formulas() {
        let v = AssociationVector::compute(4, 10, 8, TOTALS).unwrap();
        assert_eq!(v.freq, 4.0);
        assert!(close(v.prob, 0.4));
        assert!(close(v.pmi, 200.0 * 4.0 / 80.0));
        let expected = (10.0 / 100.0) * (8.0 / 200.0);
        assert!(close(v.t_test, (0.04 - expected) / f64::sqrt(expected)));
    }

    #[test]
    fn zero_count_has_no_measures() {
        assert!(AssociationVector::compute(0, 10, 8, TOTALS).is_none());
        assert!(AssociationVector::compute(4, 0, 8, TOTALS).is_none());
        assert!(AssociationVector::compute(4, 10, 0, TOTALS).is_none());
    }

    #[test]
    fn score_pair_combines_both_marginals() {
        let key = LexemeFeature {
            lexeme: "chase".to_string(),
            feature: "cat-dobj".to_string(),
        };
        let mut ctx = ReduceContext::new();
        score_pair(
            TOTALS,
            vec![
                (key.clone(), (4, Marginal::Feature(8))),
                (key.clone(), (4, Marginal::Lexeme(10))),
            ],
            &mut ctx,
        );
        let (out, _) = ctx.into_parts();
        assert_eq!(
            out,
            vec![MeasureRecord::Measures {
                lexeme: "chase".to_string(),
                feature: "cat-dobj".to_string(),
                vector: AssociationVector::compute(4, 10, 8, TOTALS).unwrap(),
            }]
        );
    }

    #[test]
    fn missing_marginal_yields_placeholder() {
        let key = LexemeFeature {
            lexeme: "chase".to_string(),
            feature: "cat-dobj".to_string(),
        };
        let mut ctx = ReduceContext::new();
        score_pair(TOTALS, vec![(key, (4, Marginal::Lexeme(10)))], &mut ctx);
        let (out, counters) = ctx.into_parts();
        assert_eq!(counters.get(INSUFFICIENT_EVIDENCE), 1);
        assert_eq!(out[0].to_string(), "chase cat-dobj\tError! l=10 f=0 lf=4");
        assert!(MeasureRecord::parse_measures(&out[0].to_string()).is_none());
    }

    #[test]
    fn measure_line_round_trips_for_the_join() {
        let rec = MeasureRecord::Measures {
            lexeme: "cat".to_string(),
            feature: "chase-dobj".to_string(),
            vector: AssociationVector {
                freq: 5.0,
                prob: 0.2,
                pmi: 1.3,
                t_test: -0.9,
            },
        };
        let line = rec.to_string();
        assert_eq!(
            line,
            "cat chase-dobj\tassoc_freq=5 assoc_prob=0.2 assoc_PMI=1.3 assoc_t_test=-0.9"
        );
        let (lexeme, feature, vector) = MeasureRecord::parse_measures(&line).unwrap();
        assert_eq!(lexeme, "cat");
        assert_eq!(feature, "chase-dobj");
        assert_eq!(vector.t_test, -0.9);
    }

    #[test]
    fn measure_tokens_must_be_complete_and_named() {
        assert!(MeasureRecord::parse_measures("a b assoc_freq=1 assoc_prob=1 assoc_PMI=1").is_none());
        assert!(
            MeasureRecord::parse_measures("a b assoc_prob=1 assoc_freq=1 assoc_PMI=1 assoc_t_test=1")
                .is_none()
        );
        assert!(
            MeasureRecord::parse_measures("a b assoc_freq=x assoc_prob=1 assoc_PMI=1 assoc_t_test=1")
                .is_none()
        );
    }
}
