//! Stop-word filtering contract.
//!
//! Text consumers built on top of the datasource layer strip stop words
//! before tokenizing. The word lists themselves belong to the caller; this
//! module only fixes the calling shape and provides a regex-backed filter
//! built from a supplied list.

use crate::error::{DatasourceError, Result};
use regex::{Regex, RegexBuilder};

/// Removes stop words from text.
pub trait StopwordFilter {
    /// Returns `text` with every stop word removed.
    fn remove_stopwords(&self, text: &str) -> String;

    /// Applies `remove_stopwords` to each element, keeping the shape.
    fn remove_stopwords_all<S: AsRef<str>>(&self, texts: &[S]) -> Vec<String>
    where
        Self: Sized,
    {
        texts
            .iter()
            .map(|text| self.remove_stopwords(text.as_ref()))
            .collect()
    }

    /// Characters per n-gram used when tokenizing this locale.
    fn chars_per_gram(&self) -> usize;
}

/// A stop-word filter applying one case-insensitive regex substitution.
#[derive(Debug, Clone)]
pub struct RegexStopwords {
    pattern: Regex,
    chars_per_gram: usize,
}

impl RegexStopwords {
    /// Builds a filter matching any of `words` as a whole word.
    pub fn new<S: AsRef<str>>(words: &[S], chars_per_gram: usize) -> Result<Self> {
        if words.is_empty() {
            return Err(DatasourceError::config("stop-word list is empty"));
        }

        let alternation = words
            .iter()
            .map(|w| whole_word(w.as_ref()))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = RegexBuilder::new(&format!("(?:{alternation})"))
            .case_insensitive(true)
            .build()
            .map_err(|e| DatasourceError::config(format!("invalid stop-word list: {e}")))?;

        Ok(Self {
            pattern,
            chars_per_gram,
        })
    }
}

/// Pattern matching `word` only where it is not part of a longer word.
///
/// `\b` only holds next to a word character, so edges made of punctuation
/// (as in `c++`) are anchored with `\B` instead.
fn whole_word(word: &str) -> String {
    let anchor = |ch: Option<char>| match ch {
        Some(c) if c.is_alphanumeric() || c == '_' => r"\b",
        _ => r"\B",
    };
    format!(
        "{}{}{}",
        anchor(word.chars().next()),
        regex::escape(word),
        anchor(word.chars().next_back())
    )
}

impl StopwordFilter for RegexStopwords {
    fn remove_stopwords(&self, text: &str) -> String {
        self.pattern.replace_all(text, "").into_owned()
    }

    fn chars_per_gram(&self) -> usize {
        self.chars_per_gram
    }
}
