use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use log::{debug, info};

use crate::error::Result;
use crate::files::read_lines;
use crate::stem::WordStemmer;

/// Which slot of the source edge the *indexed* word occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// The indexed word was `word2`; serialised as `0`.
    Second,
    /// The indexed word was `word1`; serialised as `1`.
    First,
}

/// One relation reachable from an indexed word.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoldEntry {
    pub related: String,
    pub role: Role,
    pub label: String,
}

impl GoldEntry {
    /// The pair `(w1, w2)` in the gold file's original order, given the
    /// indexed word `lexeme`.
    pub fn orient<'a>(&'a self, lexeme: &'a str) -> (&'a str, &'a str) {
        match self.role {
            Role::Second => (self.related.as_str(), lexeme),
            Role::First => (lexeme, self.related.as_str()),
        }
    }
}

/// Symmetric, read-only lookup from a stemmed word to its gold relations.
///
/// Built once before the join runs and shared by every map task afterwards.
#[derive(Debug, Default)]
pub struct GoldStandardIndex {
    entries: HashMap<String, BTreeSet<GoldEntry>>,
    edges: usize,
    dropped_lines: usize,
}

impl GoldStandardIndex {
    /// Builds the index from `word1 word2 label` lines. Lines without exactly
    /// three whitespace-separated fields are skipped.
    pub fn from_lines<I, S>(lines: I, stemmer: &WordStemmer) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = GoldStandardIndex::default();
        for line in lines {
            let line = line.as_ref();
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [word1, word2, label] = fields.as_slice() else {
                debug!("skipping gold line {line:?}");
                index.dropped_lines += 1;
                continue;
            };
            let word1 = stemmer.stem(word1);
            let word2 = stemmer.stem(word2);
            index.insert(
                word1.clone(),
                GoldEntry {
                    related: word2.clone(),
                    role: Role::First,
                    label: label.to_string(),
                },
            );
            index.insert(
                word2,
                GoldEntry {
                    related: word1,
                    role: Role::Second,
                    label: label.to_string(),
                },
            );
            index.edges += 1;
        }
        index
    }

    pub fn load(path: &Path, stemmer: &WordStemmer) -> Result<Self> {
        let index = Self::from_lines(read_lines(path)?, stemmer);
        info!(
            "loaded gold standard {}: {} edges, {} words, {} skipped lines",
            path.display(),
            index.edges,
            index.entries.len(),
            index.dropped_lines
        );
        Ok(index)
    }

    fn insert(&mut self, word: String, entry: GoldEntry) {
        self.entries.entry(word).or_default().insert(entry);
    }

    /// Relations of `word`, in a stable order. Empty for unknown words.
    pub fn lookup<'a>(&'a self, word: &str) -> impl Iterator<Item = &'a GoldEntry> + use<'a> {
        self.entries.get(word).into_iter().flatten()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.entries.contains_key(word)
    }

    /// Number of indexed words.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dropped_lines(&self) -> usize {
        self.dropped_lines
    }
}
