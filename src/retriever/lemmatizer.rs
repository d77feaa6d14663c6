//! French query normalization for BM25 parity with the indexed text.
//!
//! The ingestion pipeline lemmatizes every chunk before writing it to the
//! lexical index and exports its form-to-lemma table as a JSON lexicon. At
//! query time we apply the same markdown cleanup and the same table so the
//! query vocabulary coincides with the index vocabulary.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use anyhow::Context;
use regex::Regex;

pub struct Lemmatizer {
    lexicon: HashMap<String, String>,
    warned_empty: AtomicBool,
}

impl Lemmatizer {
    /// Load the lexicon exported by the ingestion pipeline. A missing or
    /// unreadable lexicon is fatal at startup; per-query processing never
    /// fails afterwards.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("lemma lexicon not found at {}", path.display()))?;
        let raw: HashMap<String, String> = serde_json::from_str(&contents)
            .with_context(|| format!("invalid lemma lexicon {}", path.display()))?;

        let mut lexicon = HashMap::with_capacity(raw.len() * 2);
        for (form, lemma) in raw {
            let form = form.to_lowercase();
            let lemma = lemma.to_lowercase();
            lexicon.insert(form, lemma.clone());
            // Close the table under application: a lemma maps to itself, so
            // lemmatization is idempotent.
            lexicon.entry(lemma.clone()).or_insert(lemma);
        }

        tracing::info!("Loaded lemma lexicon ({} entries)", lexicon.len());
        Ok(Self {
            lexicon,
            warned_empty: AtomicBool::new(false),
        })
    }

    /// A lexicon-less normalizer: cleanup and lowercasing only.
    pub fn passthrough() -> Self {
        Self {
            lexicon: HashMap::new(),
            warned_empty: AtomicBool::new(true),
        }
    }

    /// Normalize a query: strip markdown, lowercase, tokenize, map each token
    /// through the lexicon. Unknown tokens pass through unchanged.
    pub fn lemmatize(&self, text: &str) -> String {
        let cleaned = clean_markdown(text);

        if self.lexicon.is_empty() {
            if !self.warned_empty.swap(true, Ordering::Relaxed) {
                tracing::warn!("Lemma lexicon is empty; queries fall back to lowercased text");
            }
            return cleaned;
        }

        let mut lemmas: Vec<&str> = Vec::new();
        for raw in cleaned.split(|c: char| c.is_whitespace() || c == '\'' || c == '\u{2019}') {
            let token = raw.trim_matches(|c: char| !c.is_alphanumeric());
            if token.is_empty() {
                continue;
            }
            match self.lexicon.get(token) {
                Some(lemma) => lemmas.push(lemma),
                None => lemmas.push(token),
            }
        }
        lemmas.join(" ")
    }
}

/// Strip markdown structure and normalize whitespace, mirroring the cleanup
/// applied at indexing time.
fn clean_markdown(text: &str) -> String {
    static CLEANERS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let cleaners = CLEANERS.get_or_init(|| {
        vec![
            (Regex::new(r"(?s)```.*?```").unwrap(), " "),
            (Regex::new(r"!\[[^\]]*\]\([^)]+\)").unwrap(), " "),
            (Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap(), "$1"),
            (Regex::new(r"#+\s*").unwrap(), " "),
            (Regex::new(r"`([^`]*)`").unwrap(), "$1"),
            (Regex::new(r"[*_]{1,3}").unwrap(), " "),
            (Regex::new(r"(?m)^\s*[-+]\s+").unwrap(), " "),
            (Regex::new(r"(?m)^\s*>\s*").unwrap(), " "),
            (Regex::new(r"\|.*\|").unwrap(), " "),
            (Regex::new(r"[-*_]{3,}").unwrap(), " "),
            (Regex::new(r"[{}\[\]]").unwrap(), " "),
            (Regex::new(r"<[^>]+>").unwrap(), " "),
            (Regex::new(r"\s+").unwrap(), " "),
        ]
    });

    let mut cleaned = text.to_string();
    for (pattern, replacement) in cleaners {
        cleaned = pattern.replace_all(&cleaned, *replacement).into_owned();
    }
    cleaned.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lemmatizer() -> Lemmatizer {
        let mut lexicon = HashMap::new();
        for (form, lemma) in [
            ("chats", "chat"),
            ("chat", "chat"),
            ("mangent", "manger"),
            ("manger", "manger"),
            ("les", "le"),
            ("le", "le"),
        ] {
            lexicon.insert(form.to_string(), lemma.to_string());
        }
        Lemmatizer {
            lexicon,
            warned_empty: AtomicBool::new(false),
        }
    }

    #[test]
    fn maps_forms_to_lemmas() {
        let lem = lemmatizer();
        assert_eq!(lem.lemmatize("Les chats mangent"), "le chat manger");
    }

    #[test]
    fn unknown_tokens_pass_through() {
        let lem = lemmatizer();
        assert_eq!(lem.lemmatize("chats croquettes"), "chat croquettes");
    }

    #[test]
    fn is_idempotent() {
        let lem = lemmatizer();
        let once = lem.lemmatize("Les **chats** mangent!");
        let twice = lem.lemmatize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn strips_markdown_structure() {
        let lem = Lemmatizer::passthrough();
        let out = lem.lemmatize("# Titre\n\nVoir [le lien](http://x) et `du code`.");
        assert!(!out.contains('#'));
        assert!(!out.contains("http"));
        assert!(out.contains("le lien"));
        assert!(out.contains("du code"));
    }

    #[test]
    fn drops_punctuation_tokens() {
        let lem = lemmatizer();
        assert_eq!(lem.lemmatize("chats , mangent !?"), "chat manger");
    }

    #[test]
    fn splits_elisions() {
        let lem = lemmatizer();
        assert_eq!(lem.lemmatize("l'chat"), "l chat");
    }

    #[test]
    fn deterministic_for_identical_input() {
        let lem = lemmatizer();
        let input = "Les chats mangent des croquettes.";
        assert_eq!(lem.lemmatize(input), lem.lemmatize(input));
    }

    #[test]
    fn empty_lexicon_falls_back_to_cleaned_text() {
        let lem = Lemmatizer::passthrough();
        assert_eq!(lem.lemmatize("Les CHATS mangent"), "les chats mangent");
    }
}
