//! Hand-rolled BM25 text similarity over tokenized incident bodies.
//! See DESIGN.md for why this is implemented directly rather than pulled
//! in from a search-engine crate.

use std::collections::HashMap;

const K1: f64 = 1.2;
const B: f64 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

/// A small BM25 corpus scorer: build once over the candidate documents
/// (commit messages, block names) and score a query (issue title + body)
/// against each.
pub struct Corpus {
    docs: Vec<Vec<String>>,
    doc_freq: HashMap<String, usize>,
    avg_len: f64,
}

impl Corpus {
    pub fn new(documents: &[String]) -> Self {
        let docs: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in &docs {
            let unique: std::collections::HashSet<&String> = doc.iter().collect();
            for term in unique {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            docs.iter().map(|d| d.len()).sum::<usize>() as f64 / docs.len() as f64
        };
        Self {
            docs,
            doc_freq,
            avg_len,
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25 score of `query` against document `index`.
    pub fn score(&self, query: &str, index: usize) -> f64 {
        let doc = &self.docs[index];
        let doc_len = doc.len() as f64;
        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        for term in doc {
            *term_freq.entry(term.as_str()).or_insert(0) += 1;
        }

        tokenize(query)
            .iter()
            .map(|term| {
                let tf = *term_freq.get(term.as_str()).unwrap_or(&0) as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                let idf = self.idf(term);
                let denom = tf + K1 * (1.0 - B + B * doc_len / self.avg_len.max(1.0));
                idf * (tf * (K1 + 1.0)) / denom
            })
            .sum()
    }

    /// Scores `query` against every document, returning `(index, score)`
    /// pairs sorted by descending score.
    pub fn rank(&self, query: &str) -> Vec<(usize, f64)> {
        let mut scored: Vec<(usize, f64)> = (0..self.docs.len())
            .map(|i| (i, self.score(query, i)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }
}
