//! Morphological analyzer seam.
//!
//! The lemma extractor only needs two answers about a token: which parts of
//! speech it can be, and its dictionary form(s).

use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartOfSpeech {
    Noun,
    Adjective,
    Verb,
    Adverb,
    Pronoun,
    Numeral,
    Conjunction,
    Preposition,
    Particle,
    Interjection,
    Unknown,
}

impl PartOfSpeech {
    pub fn code(self) -> &'static str {
        match self {
            PartOfSpeech::Noun => "С",
            PartOfSpeech::Adjective => "П",
            PartOfSpeech::Verb => "Г",
            PartOfSpeech::Adverb => "Н",
            PartOfSpeech::Pronoun => "МС",
            PartOfSpeech::Numeral => "ЧИСЛ",
            PartOfSpeech::Conjunction => "СОЮЗ",
            PartOfSpeech::Preposition => "ПРЕДЛ",
            PartOfSpeech::Particle => "ЧАСТ",
            PartOfSpeech::Interjection => "МЕЖД",
            PartOfSpeech::Unknown => "?",
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "С" => PartOfSpeech::Noun,
            "П" => PartOfSpeech::Adjective,
            "Г" => PartOfSpeech::Verb,
            "Н" => PartOfSpeech::Adverb,
            "МС" => PartOfSpeech::Pronoun,
            "ЧИСЛ" => PartOfSpeech::Numeral,
            "СОЮЗ" => PartOfSpeech::Conjunction,
            "ПРЕДЛ" => PartOfSpeech::Preposition,
            "ЧАСТ" => PartOfSpeech::Particle,
            "МЕЖД" => PartOfSpeech::Interjection,
            _ => PartOfSpeech::Unknown,
        }
    }

    /// Word classes that carry no search-relevant meaning.
    pub fn is_functional(self) -> bool {
        matches!(
            self,
            PartOfSpeech::Conjunction
                | PartOfSpeech::Preposition
                | PartOfSpeech::Particle
                | PartOfSpeech::Interjection
        )
    }
}

pub trait Morphology: Send + Sync {
    /// Every part of speech the token can be read as.
    fn tags(&self, token: &str) -> Vec<PartOfSpeech>;
    /// Candidate normal forms, most likely first. May be empty. Any stable
    /// form works as long as all inflections of a word agree on it.
    fn normal_forms(&self, token: &str) -> Vec<String>;
}

/// Function-word lexicon: `<tag codes>: <words>`. A word listed again on a
/// later line takes that line's tags, so ambiguous words come last.
const LEXICON: &str = "\
СОЮЗ: и а но или да либо чтобы если хотя зато однако будто словно ибо причем притом итак тоже также потому поэтому пока едва
ПРЕДЛ: в во на с со к ко по о об обо от ото до из изо у за над надо под подо про для без безо через при перед передо между среди около возле кроме вокруг сквозь вдоль мимо ради вне
ЧАСТ: не ни же ли бы б вот вон даже лишь ведь разве неужели пусть пускай ка таки нибудь де мол
МЕЖД: ах ох ой эх ух увы ура ага ау эй ого фу тьфу ай алло браво
СОЮЗ МС: что
СОЮЗ Н: как когда
ЧАСТ Н: только уже
МЕЖД ЧАСТ: ну
СОЮЗ ЧАСТ МС: то";

/// Parses lexicon lines into word -> tags.
pub fn parse_lexicon(raw: &str) -> HashMap<String, Vec<PartOfSpeech>> {
    let mut words = HashMap::new();
    for line in raw.lines() {
        let Some((codes, list)) = line.split_once(':') else { continue };
        let tags: Vec<PartOfSpeech> = codes.split_whitespace().map(PartOfSpeech::from_code).collect();
        for word in list.split_whitespace() {
            words.insert(word.to_string(), tags.clone());
        }
    }
    words
}

lazy_static! {
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::Russian);
    static ref FUNCTION_WORDS: HashMap<String, Vec<PartOfSpeech>> = parse_lexicon(LEXICON);
}

/// Russian analyzer bundled with the engine: function words come from a
/// fixed lexicon, all other words normalize to their Snowball stem.
///
/// Stems are not dictionary forms ("кошка" -> "кошк"), so stored Lemma rows
/// hold stems. Plug in a dictionary-backed [`Morphology`] for real lemmas.
#[derive(Debug, Default, Clone, Copy)]
pub struct StemmerMorphology;

impl StemmerMorphology {
    pub fn russian() -> Self { Self }
}

impl Morphology for StemmerMorphology {
    fn tags(&self, token: &str) -> Vec<PartOfSpeech> {
        match FUNCTION_WORDS.get(token) {
            Some(tags) => tags.clone(),
            None => vec![PartOfSpeech::Unknown],
        }
    }

    fn normal_forms(&self, token: &str) -> Vec<String> {
        if token.is_empty() {
            return Vec::new();
        }
        if FUNCTION_WORDS.contains_key(token) {
            return vec![token.to_string()];
        }
        vec![STEMMER.stem(token).into_owned()]
    }
}
