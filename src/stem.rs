use rust_stemmers::{Algorithm, Stemmer};

/// Deterministic word stemmer shared by the counting stage and the gold-standard index.
///
/// Only purely alphabetic words are stemmed; anything containing a digit,
/// punctuation or other non-letter is returned untouched.
pub struct WordStemmer {
    inner: Stemmer,
}

impl WordStemmer {
    pub fn english() -> Self {
        WordStemmer {
            inner: Stemmer::create(Algorithm::English),
        }
    }

    pub fn stem(&self, word: &str) -> String {
        if is_alphabetic(word) {
            self.inner.stem(word).into_owned()
        } else {
            word.to_string()
        }
    }
}

impl Default for WordStemmer {
    fn default() -> Self {
        Self::english()
    }
}

fn is_alphabetic(word: &str) -> bool {
    !word.is_empty() && word.chars().all(char::is_alphabetic)
}
