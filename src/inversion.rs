//! Stage B: regroup counts by word so every lexeme/feature pair meets the
//! marginal totals of both of its endpoints.

use std::fmt;
use std::hash::{Hash, Hasher};

use log::trace;

use crate::counting::{CountKey, CountRecord};
use crate::error::Result;
use crate::mapreduce::{Emitter, Job, JobOutput, ReduceContext, ShuffleKey};

pub const DROPPED_LINES: &str = "dropped_lines";
pub const UNMATCHED_PAIRS: &str = "unmatched_pairs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    Lexeme,
    Feature,
    Pair,
}

/// `(word, type)`; partitioned and grouped on the word alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct InversionKey {
    pub word: String,
    pub kind: RecordKind,
}

impl ShuffleKey for InversionKey {
    fn same_group(&self, other: &Self) -> bool {
        self.word == other.word
    }

    fn partition_hash<H: Hasher>(&self, state: &mut H) {
        self.word.hash(state);
    }
}

/// Marginal total of one endpoint of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marginal {
    Lexeme(u64),
    Feature(u64),
}

impl Marginal {
    fn parse(token: &str) -> Option<Self> {
        let (name, value) = token.split_once('=')?;
        let value = value.parse().ok()?;
        match name {
            "l" => Some(Marginal::Lexeme(value)),
            "f" => Some(Marginal::Feature(value)),
            _ => None,
        }
    }
}

impl fmt::Display for Marginal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marginal::Lexeme(n) => write!(f, "l={n}"),
            Marginal::Feature(n) => write!(f, "f={n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InversionValue {
    Marginal(Marginal),
    Pair {
        lexeme: String,
        feature: String,
        count: u64,
    },
}

/// A pair count joined with one of its marginals: `lex feat \t lf=<n> l=<n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvertedRecord {
    pub lexeme: String,
    pub feature: String,
    pub pair_count: u64,
    pub marginal: Marginal,
}

impl InvertedRecord {
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [lexeme, feature, pair, marginal] = fields.as_slice() else {
            return None;
        };
        let pair_count = pair.strip_prefix("lf=")?.parse().ok()?;
        Some(InvertedRecord {
            lexeme: lexeme.to_string(),
            feature: feature.to_string(),
            pair_count,
            marginal: Marginal::parse(marginal)?,
        })
    }
}

impl fmt::Display for InvertedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}\tlf={} {}",
            self.lexeme, self.feature, self.pair_count, self.marginal
        )
    }
}

/// Map task: re-keys counts by word. Pair counts go out twice, once under
/// each endpoint.
pub fn rekey_split(lines: Vec<String>, emitter: &mut Emitter<InversionKey, InversionValue>) {
    for line in lines {
        let Some(CountRecord { key, count }) = CountRecord::parse(&line) else {
            trace!("dropping count line {line:?}");
            emitter.increment(DROPPED_LINES, 1);
            continue;
        };
        match key {
            CountKey::Lexeme(word) => emitter.emit(
                InversionKey {
                    word,
                    kind: RecordKind::Lexeme,
                },
                InversionValue::Marginal(Marginal::Lexeme(count)),
            ),
            CountKey::Feature(word) => emitter.emit(
                InversionKey {
                    word,
                    kind: RecordKind::Feature,
                },
                InversionValue::Marginal(Marginal::Feature(count)),
            ),
            CountKey::Pair { lexeme, feature } => {
                let value = InversionValue::Pair {
                    lexeme: lexeme.clone(),
                    feature: feature.clone(),
                    count,
                };
                emitter.emit(
                    InversionKey {
                        word: lexeme,
                        kind: RecordKind::Pair,
                    },
                    value.clone(),
                );
                emitter.emit(
                    InversionKey {
                        word: feature,
                        kind: RecordKind::Pair,
                    },
                    value,
                );
            }
        }
    }
}

/// Reduce: buffers a word's whole group, reads its marginals first, then
/// joins every pair against the marginal of the side the word plays.
///
/// Arrival order inside the group does not matter.
pub fn join_marginals(
    group: Vec<(InversionKey, InversionValue)>,
    ctx: &mut ReduceContext<InvertedRecord>,
) {
    let Some(word) = group.first().map(|(k, _)| k.word.clone()) else {
        return;
    };

    let mut lexeme_total: Option<u64> = None;
    let mut feature_total: Option<u64> = None;
    let mut pairs = Vec::new();
    for (_, value) in group {
        match value {
            InversionValue::Marginal(Marginal::Lexeme(n)) => {
                lexeme_total = Some(lexeme_total.unwrap_or(0) + n)
            }
            InversionValue::Marginal(Marginal::Feature(n)) => {
                feature_total = Some(feature_total.unwrap_or(0) + n)
            }
            InversionValue::Pair {
                lexeme,
                feature,
                count,
            } => pairs.push((lexeme, feature, count)),
        }
    }

    for (lexeme, feature, pair_count) in pairs {
        let mut sides = Vec::with_capacity(1);
        if lexeme == word {
            sides.push(lexeme_total.map(Marginal::Lexeme));
        }
        if feature == word {
            sides.push(feature_total.map(Marginal::Feature));
        }
        for side in sides {
            match side {
                Some(marginal) => ctx.write(InvertedRecord {
                    lexeme: lexeme.clone(),
                    feature: feature.clone(),
                    pair_count,
                    marginal,
                }),
                None => {
                    trace!("no marginal for {word:?} in pair ({lexeme}, {feature})");
                    ctx.increment(UNMATCHED_PAIRS, 1);
                }
            }
        }
    }
}

pub fn run(job: &Job<'_>, splits: Vec<Vec<String>>) -> Result<JobOutput<InvertedRecord>> {
    job.run(splits, rekey_split, join_marginals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn key(word: &str, kind: RecordKind) -> InversionKey {
        InversionKey {
            word: word.to_string(),
            kind,
        }
    }

    fn pair(lexeme: &str, feature: &str, count: u64) -> InversionValue {
        InversionValue::Pair {
            lexeme: lexeme.to_string(),
            feature: feature.to_string(),
            count,
        }
    }

    fn reduce(group: Vec<(InversionKey, InversionValue)>) -> (Vec<InvertedRecord>, u64) {
        let mut ctx = ReduceContext::new();
        join_marginals(group, &mut ctx);
        let (out, counters) = ctx.into_parts();
        (out, counters.get(UNMATCHED_PAIRS))
    }

    #[test]
    fn pair_before_marginal_still_joins() {
        let (out, unmatched) = reduce(vec![
            (key("chase", RecordKind::Pair), pair("chase", "cat-dobj", 4)),
            (key("chase", RecordKind::Lexeme), InversionValue::Marginal(Marginal::Lexeme(10))),
        ]);
        assert_eq!(
            out,
            vec![InvertedRecord {
                lexeme: "chase".to_string(),
                feature: "cat-dobj".to_string(),
                pair_count: 4,
                marginal: Marginal::Lexeme(10),
            }]
        );
        assert_eq!(unmatched, 0);
    }

    #[test]
    fn pair_without_marginal_is_dropped() {
        let (out, unmatched) =
            reduce(vec![(key("chase", RecordKind::Pair), pair("chase", "cat-dobj", 4))]);
        assert!(out.is_empty());
        assert_eq!(unmatched, 1);
    }

    #[test]
    fn rekey_sends_pairs_to_both_endpoints() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let job = Job::new("inversion", 4, &pool);
        let out = run(
            &job,
            vec![
                lines(&["lf chase cat-dobj\t4", "l chase\t10"]),
                lines(&["f cat-dobj\t6", "bogus line"]),
            ],
        )
        .unwrap();
        assert_eq!(out.counters.get(DROPPED_LINES), 1);

        let mut records: Vec<String> = out.records().map(|r| r.to_string()).collect();
        records.sort();
        assert_eq!(
            records,
            vec!["chase cat-dobj\tlf=4 f=6", "chase cat-dobj\tlf=4 l=10"]
        );
    }

    #[test]
    fn inverted_record_text_form() {
        let rec = InvertedRecord::parse("chase cat-dobj\tlf=4 f=6").unwrap();
        assert_eq!(rec.marginal, Marginal::Feature(6));
        assert_eq!(rec.pair_count, 4);
        assert!(InvertedRecord::parse("chase cat-dobj lf=4").is_none());
        assert!(InvertedRecord::parse("chase cat-dobj lf=4 x=6").is_none());
        assert!(InvertedRecord::parse("chase cat-dobj 4 l=6").is_none());
    }
}
