use crate::html::page_text;
use crate::lemmas::{bare_word, LemmaExtractor};
use std::collections::HashSet;

/// Upper bound on the characters of the words a snippet carries.
pub const SNIPPET_LENGTH: usize = 200;

/// Text excerpt starting at the first word whose lemma is in `query_lemmas`,
/// with every such word wrapped in `<b>`. Empty when no query lemma occurs.
pub fn generate_snippet(html: &str, query_lemmas: &HashSet<String>, lemmas: &LemmaExtractor) -> String {
    let text = page_text(html);
    let mut budget = SNIPPET_LENGTH;
    let mut parts: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let bare = bare_word(word);
        if bare.is_empty() {
            continue;
        }
        let hit = lemmas
            .lemma_of(&bare)
            .is_some_and(|lemma| query_lemmas.contains(&lemma));
        if parts.is_empty() && !hit {
            continue;
        }
        let token = if hit { format!("<b>{word}</b>") } else { word.to_string() };
        let len = token.chars().count();
        if len >= budget {
            break;
        }
        budget -= len;
        parts.push(token);
    }
    parts.join(" ")
}
