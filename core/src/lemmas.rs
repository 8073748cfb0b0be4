use crate::morphology::Morphology;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref NON_LETTER: Regex = Regex::new(r"[^а-яё]+").expect("valid regex");
}

/// Split text into lower-cased words of the target alphabet (NFKC normalized, everything else is a separator).
pub fn words(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    NON_LETTER
        .replace_all(&normalized, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// A single whitespace-delimited token reduced to its lower-cased letters ("Кошка," -> "кошка").
pub fn bare_word(token: &str) -> String {
    let lowered = token.nfkc().collect::<String>().to_lowercase();
    NON_LETTER.replace_all(&lowered, "").into_owned()
}

/// Turns text into lemma occurrence counts using a morphological analyzer.
#[derive(Clone)]
pub struct LemmaExtractor {
    morphology: Arc<dyn Morphology>,
}

impl LemmaExtractor {
    pub fn new(morphology: Arc<dyn Morphology>) -> Self {
        Self { morphology }
    }

    /// Lemma -> number of tokens of `text` that normalize to it. Function words are dropped.
    pub fn extract(&self, text: &str) -> HashMap<String, u32> {
        let mut cache: HashMap<String, Option<String>> = HashMap::new();
        let mut lemmas = HashMap::new();
        for word in words(text) {
            let lemma = match cache.get(&word) {
                Some(hit) => hit.clone(),
                None => {
                    let resolved = self.content_lemma(&word);
                    cache.insert(word, resolved.clone());
                    resolved
                }
            };
            if let Some(lemma) = lemma {
                *lemmas.entry(lemma).or_insert(0) += 1;
            }
        }
        lemmas
    }

    /// Primary normal form of a single token, without function-word filtering.
    pub fn lemma_of(&self, token: &str) -> Option<String> {
        self.morphology.normal_forms(token).into_iter().next()
    }

    fn content_lemma(&self, word: &str) -> Option<String> {
        let tags = self.morphology.tags(word);
        if !tags.is_empty() && tags.iter().all(|t| t.is_functional()) {
            let codes: Vec<&str> = tags.iter().map(|t| t.code()).collect();
            trace!(word, tags = %codes.join(" "), "function word dropped");
            return None;
        }
        self.lemma_of(word)
    }
}
