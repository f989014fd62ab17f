// FORUM LEDGER: MODERATION WORD SET
// Policy words whose use in a post gets the author banned.
//
// SAFETY INVARIANTS:
// 1. Words are normalised on entry, so every replica compares the same strings
// 2. Iteration order is sorted, so payloads and logs are byte-identical across replicas
// 3. The set only grows; nothing here removes a word

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Separator between words in a vote-extension payload.
pub const WORD_DELIMITER: char = '|';

/// Most distinct words a vote extension may carry. Fixed so every replica
/// reaches the same verdict on a peer's extension.
pub const MAX_EXTENSION_WORDS: usize = 256;

/// Words every chain starts with.
pub const STARTER_WORDS: [&str; 4] = ["fuck", "shit", "asshole", "bitch"];

/// Normalise a candidate policy word.
///
/// Lower-cases first, then requires every char of the result to be
/// alphanumeric, so a normalised word always normalises to itself. Returns
/// `None` for words that could never match a post token.
pub fn normalize_word(word: &str) -> Option<String> {
    let word = word.trim().to_lowercase();
    if word.is_empty() || !word.chars().all(char::is_alphanumeric) {
        return None;
    }
    Some(word)
}

/// Alphanumeric tokens of the lower-cased post body, in order.
fn tokens(body: &str) -> Vec<String> {
    body.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationWordSet {
    words: BTreeSet<String>,
}

impl ModerationWordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed set seeded at chain init.
    pub fn starter() -> Self {
        Self::from_words(STARTER_WORDS)
    }

    /// Build a set, silently dropping words that fail normalisation.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .filter_map(|w| normalize_word(w.as_ref()))
            .collect();
        ModerationWordSet { words }
    }

    /// Parse a delimiter-joined payload. Repeated words collapse to one.
    pub fn from_payload(payload: &str) -> Self {
        Self::from_words(payload.split(WORD_DELIMITER))
    }

    /// Serialise as a delimiter-joined payload in sorted order.
    pub fn to_payload(&self) -> String {
        let mut out = String::new();
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                out.push(WORD_DELIMITER);
            }
            out.push_str(word);
        }
        out
    }

    /// Insert a word; returns true if it was new.
    pub fn insert(&mut self, word: &str) -> bool {
        match normalize_word(word) {
            Some(w) => self.words.insert(w),
            None => false,
        }
    }

    pub fn extend(&mut self, other: &ModerationWordSet) {
        self.words.extend(other.words.iter().cloned());
    }

    pub fn union(&self, other: &ModerationWordSet) -> ModerationWordSet {
        let mut out = self.clone();
        out.extend(other);
        out
    }

    pub fn contains(&self, word: &str) -> bool {
        normalize_word(word).map_or(false, |w| self.words.contains(&w))
    }

    /// First token of `body` that is a policy word, if any.
    pub fn find_match(&self, body: &str) -> Option<String> {
        tokens(body).into_iter().find(|t| self.words.contains(t))
    }

    pub fn matches(&self, body: &str) -> bool {
        self.find_match(body).is_some()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.words.iter()
    }
}

impl fmt::Display for ModerationWordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.to_payload())
    }
}
