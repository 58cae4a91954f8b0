//! Text helpers shared by extractors and scoring.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::Span;

lazy_static! {
    // Sentence terminators followed by whitespace or end of text, or a line break.
    static ref SENTENCE_BREAK: Regex = Regex::new(r"[.!?]+(?:\s+|$)|\n+").unwrap();
}

/// Sentence boundaries of a text, for "same sentence" checks.
#[derive(Debug, Clone)]
pub struct SentenceIndex {
    sentences: Vec<Span>,
}

impl SentenceIndex {
    pub fn new(text: &str) -> Self {
        let mut sentences = Vec::new();
        let mut start = 0;
        for boundary in SENTENCE_BREAK.find_iter(text) {
            if boundary.end() > start {
                sentences.push(Span { start, end: boundary.end() });
            }
            start = boundary.end();
        }
        if start < text.len() {
            sentences.push(Span { start, end: text.len() });
        }
        Self { sentences }
    }

    pub fn sentences(&self) -> &[Span] {
        &self.sentences
    }

    /// Index of the sentence containing byte offset `position`.
    pub fn sentence_of(&self, position: usize) -> Option<usize> {
        self.sentences
            .iter()
            .position(|s| s.start <= position && position < s.end)
    }

    pub fn same_sentence(&self, a: usize, b: usize) -> bool {
        match (self.sentence_of(a), self.sentence_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}

/// Whether `c` counts as a word character for whole-word matching.
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
