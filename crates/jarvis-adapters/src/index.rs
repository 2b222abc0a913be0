//! Full-text index over the address book: phrase match OR'd with a fuzzy
//! match of edit distance one.

use std::fs;
use std::path::Path;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use jarvis_core::{AddressBookEntry, AddressMatch, PortError};

const PHRASE_BONUS: f64 = 2.0;
const EXACT_TERM: f64 = 1.0;
const FUZZY_TERM: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Document {
    address: Address,
    description: String,
    terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressIndex {
    /// Hash of the sources this index was built from.
    pub source_hash: String,
    documents: Vec<Document>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Levenshtein distance, capped: anything above `max` is reported as `max + 1`.
pub fn edit_distance(a: &str, b: &str, max: usize) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return max + 1;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        row[0] = i;
        let mut best = row[0];
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            row[j] = (prev[j] + 1).min(row[j - 1] + 1).min(prev[j - 1] + cost);
            best = best.min(row[j]);
        }
        if best > max {
            return max + 1;
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()].min(max + 1)
}

fn contains_phrase(terms: &[String], phrase: &[String]) -> bool {
    !phrase.is_empty() && terms.windows(phrase.len()).any(|w| w == phrase)
}

impl AddressIndex {
    pub fn build(source_hash: String, entries: &[AddressBookEntry]) -> Self {
        let documents = entries
            .iter()
            .map(|e| {
                let text = format!("{}_{}", e.description, e.address).replace(' ', "_");
                Document {
                    address: e.address,
                    description: e.description.clone(),
                    terms: tokenize(&text),
                }
            })
            .collect();
        Self {
            source_hash,
            documents,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn describe(&self, address: Address) -> Option<String> {
        self.documents
            .iter()
            .find(|d| d.address == address)
            .map(|d| d.description.clone())
    }

    /// Matches ranked by score, best first.
    pub fn search(&self, query: &str) -> Vec<AddressMatch> {
        let words = tokenize(query);
        if words.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<(f64, usize, &Document)> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let mut score = 0.0;
                for word in &words {
                    let best = doc
                        .terms
                        .iter()
                        .map(|t| edit_distance(word, t, 1))
                        .min()
                        .unwrap_or(2);
                    score += match best {
                        0 => EXACT_TERM,
                        1 => FUZZY_TERM,
                        _ => 0.0,
                    };
                }
                let phrase = contains_phrase(&doc.terms, &words);
                if phrase {
                    score += PHRASE_BONUS * words.len() as f64;
                }
                (score > 0.0).then_some((score, doc.terms.len(), doc))
            })
            .collect();
        hits.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then(a.2.description.cmp(&b.2.description))
        });
        hits.into_iter()
            .map(|(score, _, doc)| AddressMatch {
                address: doc.address,
                description: doc.description.clone(),
                score,
            })
            .collect()
    }

    pub fn load(path: &Path) -> Option<Self> {
        let raw = fs::read(path).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    pub fn save(&self, path: &Path) -> Result<(), PortError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| PortError::Cache(format!("create {}: {e}", dir.display())))?;
        }
        let body = serde_json::to_vec(self)
            .map_err(|e| PortError::Cache(format!("serialize index: {e}")))?;
        fs::write(path, body)
            .map_err(|e| PortError::Cache(format!("write {}: {e}", path.display())))
    }
}
