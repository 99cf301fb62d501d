//! Text normalisation: one deterministic cleanup shared by inference and
//! dataset building.
//!
//! ## Why does the artifact carry the normaliser settings?
//!
//! A vocabulary fitted on lowercased, stemmed, letters-only text matches
//! almost nothing when fed raw OCR output. The settings travel inside the
//! [`crate::model::ModelArtifact`] so inference always repeats exactly the
//! cleanup the training corpus went through.
//!
//! ## Rule Order
//!
//! Non-letters are removed before whitespace is collapsed (removal can leave
//! double spaces behind), lowercasing happens before stemming (the stemmer
//! expects lowercase input), and stemming runs last, word by word.
//!
//! ## Idempotence
//!
//! `normalize(normalize(x)) == normalize(x)` for every configuration. Porter2
//! alone does not guarantee it ("licensed" → "licens" → "licen"), so each
//! word is stemmed until it stops changing. Dataset rows can then be fed
//! through the same normaliser again by training tooling without drifting
//! away from what inference produces.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Optional normalisation steps. Whitespace collapsing always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Drop every character that is not an ASCII letter or whitespace.
    pub strip_non_alpha: bool,
    /// Lowercase the text.
    pub lowercase: bool,
    /// Reduce every word to its English (Porter2) stem.
    pub stem: bool,
}

impl NormalizerConfig {
    /// Settings used by the bundled training tooling: letters only,
    /// lowercase, stemmed.
    pub fn training() -> Self {
        Self {
            strip_non_alpha: true,
            lowercase: true,
            stem: true,
        }
    }
}

/// Text that has been through [`normalize`].
///
/// Contains no leading/trailing whitespace and no whitespace runs longer
/// than a single space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of whitespace-separated words.
    pub fn word_count(&self) -> usize {
        self.0.split(' ').filter(|w| !w.is_empty()).count()
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalise `text` according to `config`.
///
/// Steps (applied in order, optional ones only when enabled):
/// 1. Strip non-letters
/// 2. Collapse whitespace runs to one space and trim
/// 3. Lowercase
/// 4. Stem each word
pub fn normalize(text: &str, config: &NormalizerConfig) -> NormalizedText {
    let s = if config.strip_non_alpha {
        strip_non_alpha(text)
    } else {
        text.to_string()
    };
    let s = collapse_whitespace(&s);
    let s = if config.lowercase { s.to_lowercase() } else { s };
    let s = if config.stem { stem_words(&s) } else { s };
    NormalizedText(s)
}

// ── Rule 1: Strip non-letters ────────────────────────────────────────────────

static RE_NON_ALPHA: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z\s]").unwrap());

fn strip_non_alpha(input: &str) -> String {
    RE_NON_ALPHA.replace_all(input, "").into_owned()
}

// ── Rule 2: Collapse whitespace ──────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Replace every run of Unicode whitespace with a single space and trim.
pub fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input, " ").trim().to_string()
}

// ── Rule 4: Stem words ───────────────────────────────────────────────────────

static STEMMER: Lazy<Stemmer> = Lazy::new(|| Stemmer::create(Algorithm::English));

/// Upper bound on re-stemming passes; real words settle within two or three.
const MAX_STEM_PASSES: usize = 8;

/// Stem `word` until the stemmer leaves it unchanged.
fn stem_fixpoint(word: &str) -> String {
    let mut current = word.to_string();
    for _ in 0..MAX_STEM_PASSES {
        let next = STEMMER.stem(&current).into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn stem_words(input: &str) -> String {
    input
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(stem_fixpoint)
        .collect::<Vec<_>>()
        .join(" ")
}
