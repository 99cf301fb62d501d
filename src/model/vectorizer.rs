//! TF-IDF feature extraction over a closed, pre-fitted vocabulary.
//!
//! Tokenisation mirrors the common word-n-gram TF-IDF recipe: tokens are
//! runs of two or more word characters, stop words are removed *before*
//! n-grams are formed, and n-grams are the tokens joined by a single space.
//! Term frequencies are raw counts (or `1 + ln(tf)` when sublinear), scaled
//! by the fitted idf weights and normalised.

use crate::pipeline::normalize::NormalizedText;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").unwrap());

/// Row normalisation applied to the weighted counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Norm {
    #[default]
    L2,
    L1,
    None,
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_true() -> bool {
    true
}

/// A fitted TF-IDF vectoriser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    /// Term → column index. Indices are `0..vocabulary.len()` without gaps.
    pub vocabulary: HashMap<String, usize>,
    /// Inverse document frequency per column.
    pub idf: Vec<f64>,
    /// Inclusive (min, max) word n-gram sizes.
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    /// Words dropped before n-grams are built.
    #[serde(default)]
    pub stop_words: BTreeSet<String>,
    /// Lowercase before tokenising.
    #[serde(default = "default_true")]
    pub lowercase: bool,
    /// Use `1 + ln(tf)` instead of raw counts.
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default)]
    pub norm: Norm,
}

/// Sparse feature vector with strictly increasing indices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureVector {
    dimension: usize,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// The all-zero vector of the given dimension.
    pub fn zeros(dimension: usize) -> Self {
        Self {
            dimension,
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build from `(index, value)` pairs. Zero values are dropped and
    /// duplicate indices are summed.
    pub fn from_pairs(dimension: usize, pairs: impl IntoIterator<Item = (usize, f64)>) -> Self {
        let mut acc: BTreeMap<usize, f64> = BTreeMap::new();
        for (i, v) in pairs {
            *acc.entry(i).or_insert(0.0) += v;
        }
        let (indices, values): (Vec<usize>, Vec<f64>) =
            acc.into_iter().filter(|(_, v)| *v != 0.0).unzip();
        Self {
            dimension,
            indices,
            values,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_zero(&self) -> bool {
        self.indices.is_empty()
    }

    /// Value at column `index`, zero when absent.
    pub fn get(&self, index: usize) -> f64 {
        self.indices
            .binary_search(&index)
            .map(|pos| self.values[pos])
            .unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Dot product with a dense row. Columns past the row's end count as 0.
    pub fn dot(&self, dense: &[f64]) -> f64 {
        self.iter()
            .filter_map(|(i, v)| dense.get(i).map(|w| w * v))
            .sum()
    }

    pub fn l2_norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }
}

impl TfidfVectorizer {
    /// Number of columns in produced vectors.
    pub fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    /// Check internal consistency. Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        let n = self.vocabulary.len();
        if n == 0 {
            return Err("vectoriser vocabulary is empty".into());
        }
        if self.idf.len() != n {
            return Err(format!(
                "vectoriser has {} vocabulary terms but {} idf weights",
                n,
                self.idf.len()
            ));
        }
        let mut seen = vec![false; n];
        for (term, &index) in &self.vocabulary {
            if index >= n {
                return Err(format!(
                    "vocabulary term '{}' has index {} outside 0..{}",
                    term, index, n
                ));
            }
            if std::mem::replace(&mut seen[index], true) {
                return Err(format!("vocabulary index {} is assigned twice", index));
            }
        }
        if let Some(bad) = self.idf.iter().position(|w| !w.is_finite() || *w <= 0.0) {
            return Err(format!(
                "idf weight at column {} is not a positive finite number",
                bad
            ));
        }
        let (lo, hi) = self.ngram_range;
        if lo == 0 || lo > hi {
            return Err(format!("invalid n-gram range ({}, {})", lo, hi));
        }
        Ok(())
    }

    /// Split text into tokens, dropping stop words.
    pub fn tokenize<'a>(&self, text: &'a str) -> Vec<&'a str> {
        RE_TOKEN
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|t| !self.stop_words.contains(*t))
            .collect()
    }

    /// Encode normalised text as a TF-IDF vector.
    ///
    /// Terms outside the vocabulary are ignored; text with no known terms
    /// yields the zero vector.
    pub fn transform(&self, text: &NormalizedText) -> FeatureVector {
        let lowered;
        let source = if self.lowercase {
            lowered = text.as_str().to_lowercase();
            lowered.as_str()
        } else {
            text.as_str()
        };
        let tokens = self.tokenize(source);

        let mut counts: HashMap<usize, f64> = HashMap::new();
        let (lo, hi) = self.ngram_range;
        for n in lo..=hi.min(tokens.len()) {
            for window in tokens.windows(n) {
                let gram = window.join(" ");
                if let Some(&index) = self.vocabulary.get(&gram) {
                    *counts.entry(index).or_insert(0.0) += 1.0;
                }
            }
        }

        let weighted = counts.into_iter().map(|(index, tf)| {
            let tf = if self.sublinear_tf { 1.0 + tf.ln() } else { tf };
            (index, tf * self.idf.get(index).copied().unwrap_or(0.0))
        });
        let mut vector = FeatureVector::from_pairs(self.dimension(), weighted);

        let scale = match self.norm {
            Norm::L2 => vector.l2_norm(),
            Norm::L1 => vector.values.iter().map(|v| v.abs()).sum(),
            Norm::None => 1.0,
        };
        if scale > 0.0 {
            for v in &mut vector.values {
                *v /= scale;
            }
        }
        vector
    }

    /// Terms of the vocabulary, ordered by column.
    pub fn feature_names(&self) -> Vec<&str> {
        let mut names = vec![""; self.vocabulary.len()];
        for (term, &index) in &self.vocabulary {
            if let Some(slot) = names.get_mut(index) {
                *slot = term.as_str();
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::{normalize, NormalizerConfig};

    fn vectorizer(terms: &[&str], ngram_range: (usize, usize)) -> TfidfVectorizer {
        TfidfVectorizer {
            vocabulary: terms
                .iter()
                .enumerate()
                .map(|(i, t)| (t.to_string(), i))
                .collect(),
            idf: vec![1.0; terms.len()],
            ngram_range,
            stop_words: ["the", "of"].iter().map(|s| s.to_string()).collect(),
            lowercase: true,
            sublinear_tf: false,
            norm: Norm::L2,
        }
    }

    fn text(s: &str) -> NormalizedText {
        normalize(s, &NormalizerConfig::default())
    }

    #[test]
    fn unigrams_and_bigrams_are_counted() {
        let v = vectorizer(&["total", "amount", "total amount", "due"], (1, 2));
        let x = v.transform(&text("Total amount due"));
        assert_eq!(x.nnz(), 4);
        assert!((x.l2_norm() - 1.0).abs() < 1e-12);
        assert!((x.get(0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn stop_words_are_removed_before_ngrams() {
        // "statement of account" becomes "statement account" once "of" is gone.
        let v = vectorizer(&["statement account"], (2, 2));
        let x = v.transform(&text("Statement of Account"));
        assert_eq!(x.nnz(), 1);
        assert!((x.get(0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_character_tokens_are_ignored() {
        let v = vectorizer(&["a", "ab"], (1, 1));
        let x = v.transform(&text("a ab a"));
        assert_eq!(x.get(0), 0.0);
        assert!(x.get(1) > 0.0);
    }

    #[test]
    fn unknown_terms_give_zero_vector() {
        let v = vectorizer(&["invoice"], (1, 2));
        let x = v.transform(&text("completely unrelated words"));
        assert!(x.is_zero());
        assert_eq!(x.dimension(), 1);
        assert_eq!(x.l2_norm(), 0.0);
    }

    #[test]
    fn repeated_terms_weigh_by_count_and_idf() {
        let mut v = vectorizer(&["bank", "deposit"], (1, 1));
        v.idf = vec![1.0, 2.0];
        v.norm = Norm::None;
        let x = v.transform(&text("bank bank deposit"));
        assert_eq!(x.get(0), 2.0);
        assert_eq!(x.get(1), 2.0);

        v.sublinear_tf = true;
        let x = v.transform(&text("bank bank deposit"));
        assert!((x.get(0) - (1.0 + 2f64.ln())).abs() < 1e-12);
    }

    #[test]
    fn validate_catches_inconsistencies() {
        let mut v = vectorizer(&["a1", "b2"], (1, 2));
        assert!(v.validate().is_ok());

        v.idf.pop();
        assert!(v.validate().unwrap_err().contains("idf"));

        let mut v = vectorizer(&["a1", "b2"], (1, 2));
        v.vocabulary.insert("b2".into(), 0);
        assert!(v.validate().unwrap_err().contains("twice"));

        let mut v = vectorizer(&["a1"], (2, 1));
        assert!(v.validate().unwrap_err().contains("n-gram"));
        v.ngram_range = (1, 1);
        v.idf = vec![0.0];
        assert!(v.validate().is_err());
    }

    #[test]
    fn dot_ignores_columns_past_row_end() {
        let x = FeatureVector::from_pairs(3, [(0, 1.0), (2, 2.0), (0, 1.0), (1, 0.0)]);
        assert_eq!(x.nnz(), 2);
        assert_eq!(x.dot(&[1.0, 5.0, 3.0]), 8.0);
        assert_eq!(x.dot(&[1.0]), 2.0);
    }

    #[test]
    fn feature_names_follow_column_order() {
        let v = vectorizer(&["zeta", "alpha"], (1, 1));
        assert_eq!(v.feature_names(), vec!["zeta", "alpha"]);
    }
}
