//! Stage A: lexeme, feature and lexeme/feature counts from syntactic n-grams.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use log::trace;

use crate::error::Result;
use crate::mapreduce::{Emitter, Job, JobOutput, ReduceContext, ShuffleKey};
use crate::stem::WordStemmer;
use crate::totals::{FEATURE_TOTAL, LEXEME_TOTAL, TotalCounters};

pub const DROPPED_LINES: &str = "dropped_lines";
pub const DROPPED_TOKENS: &str = "dropped_tokens";

/// What a count is about. Decided once, at parse time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CountKey {
    Lexeme(String),
    Feature(String),
    Pair { lexeme: String, feature: String },
}

impl ShuffleKey for CountKey {
    fn same_group(&self, other: &Self) -> bool {
        self == other
    }

    fn partition_hash<H: Hasher>(&self, state: &mut H) {
        self.hash(state);
    }
}

/// One reduced count, as written between stage A and stage B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountRecord {
    pub key: CountKey,
    pub count: u64,
}

impl CountRecord {
    /// Parses `l <lex> <n>`, `f <feat> <n>` or `lf <lex> <feat> <n>`.
    ///
    /// Tabs and spaces are both accepted as separators.
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (key, count) = match fields.as_slice() {
            ["l", lexeme, count] => (CountKey::Lexeme(lexeme.to_string()), count),
            ["f", feature, count] => (CountKey::Feature(feature.to_string()), count),
            ["lf", lexeme, feature, count] => (
                CountKey::Pair {
                    lexeme: lexeme.to_string(),
                    feature: feature.to_string(),
                },
                count,
            ),
            _ => return None,
        };
        let count = count.parse().ok()?;
        Some(CountRecord { key, count })
    }
}

impl fmt::Display for CountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            CountKey::Lexeme(lexeme) => write!(f, "l {lexeme}\t{}", self.count),
            CountKey::Feature(feature) => write!(f, "f {feature}\t{}", self.count),
            CountKey::Pair { lexeme, feature } => {
                write!(f, "lf {lexeme} {feature}\t{}", self.count)
            }
        }
    }
}

/// A head/dependent relation found in one n-gram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub lexeme: String,
    pub feature: String,
}

/// The relations of one corpus line, each weighted by the line's total count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgramLine {
    pub count: u64,
    pub relations: Vec<Relation>,
    /// Tokens skipped for wrong arity or a bad governor pointer.
    pub dropped_tokens: u64,
}

struct Token {
    word: String,
    deprel: String,
    governor: usize,
}

fn parse_token(raw: &str, stemmer: &WordStemmer) -> Option<Token> {
    let parts: Vec<&str> = raw.split('/').collect();
    let [word, _pos, deprel, governor] = parts.as_slice() else {
        return None;
    };
    Some(Token {
        word: stemmer.stem(word),
        deprel: deprel.to_string(),
        governor: governor.parse().ok()?,
    })
}

/// Parses `head_word \t syntactic_ngram \t total_count \t per_year_counts`.
///
/// Returns `None` for lines with fewer than four fields or a non-numeric
/// total. Bad tokens inside an otherwise good line only drop themselves.
pub fn parse_ngram_line(line: &str, stemmer: &WordStemmer) -> Option<NgramLine> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 4 {
        return None;
    }
    let count: u64 = fields[2].trim().parse().ok()?;

    let tokens: Vec<Option<Token>> = fields[1]
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| parse_token(t, stemmer))
        .collect();

    let mut relations = Vec::new();
    let mut dropped_tokens = 0;
    for token in &tokens {
        let Some(token) = token else {
            dropped_tokens += 1;
            continue;
        };
        if token.governor == 0 {
            continue;
        }
        match tokens.get(token.governor - 1) {
            Some(Some(head)) => relations.push(Relation {
                lexeme: head.word.clone(),
                feature: format!("{}-{}", token.word, token.deprel),
            }),
            _ => dropped_tokens += 1,
        }
    }

    Some(NgramLine {
        count,
        relations,
        dropped_tokens,
    })
}

/// Map task: parses a split and emits combined counts.
///
/// L and F are tallied per emission, before any combining, so the job
/// counters always equal the sum of every `l` and `f` emission.
pub fn count_split(lines: Vec<String>, stemmer: &WordStemmer, emitter: &mut Emitter<CountKey, u64>) {
    let mut combined: HashMap<CountKey, u64> = HashMap::new();
    for line in &lines {
        let Some(parsed) = parse_ngram_line(line, stemmer) else {
            trace!("dropping corpus line {line:?}");
            emitter.increment(DROPPED_LINES, 1);
            continue;
        };
        emitter.increment(DROPPED_TOKENS, parsed.dropped_tokens);

        for Relation { lexeme, feature } in parsed.relations {
            let count = parsed.count;
            *combined.entry(CountKey::Lexeme(lexeme.clone())).or_insert(0) += count;
            *combined.entry(CountKey::Feature(feature.clone())).or_insert(0) += count;
            *combined
                .entry(CountKey::Pair { lexeme, feature })
                .or_insert(0) += count;
            emitter.increment(LEXEME_TOTAL, count);
            emitter.increment(FEATURE_TOTAL, count);
        }
    }

    for (key, count) in combined {
        emitter.emit(key, count);
    }
}

/// Reduce: sums all counts of a key.
pub fn sum_counts(group: Vec<(CountKey, u64)>, ctx: &mut ReduceContext<CountRecord>) {
    let mut records = group.into_iter();
    let Some((key, first)) = records.next() else {
        return;
    };
    let count = records.fold(first, |acc, (_, n)| acc + n);
    ctx.write(CountRecord { key, count });
}

/// Output of a successful counting run.
pub struct Counted {
    pub output: JobOutput<CountRecord>,
    pub totals: TotalCounters,
}

/// Runs stage A over corpus splits.
pub fn run(job: &Job<'_>, splits: Vec<Vec<String>>, stemmer: &WordStemmer) -> Result<Counted> {
    let output = job.run(splits, |split, em| count_split(split, stemmer, em), sum_counts)?;
    let totals = TotalCounters::from_counters(&output.counters);
    Ok(Counted { output, totals })
}
