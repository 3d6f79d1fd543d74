//! Long-term memory recall backends for Parley.
//!
//! Every backend scores snippets with [`term_overlap`] so similarity values
//! are comparable across backends and fall in `[0, 1]`.

pub mod in_memory;
pub mod noop;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryBackend;
pub use noop::NoopMemory;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

/// Lowercased alphanumeric terms of a text, deduplicated, in order.
pub(crate) fn terms(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if word.is_empty() {
            continue;
        }
        let word = word.to_lowercase();
        if !out.contains(&word) {
            out.push(word);
        }
    }
    out
}

/// Fraction of the query's terms that occur in `text`.
pub fn term_overlap(query: &str, text: &str) -> f32 {
    let query_terms = terms(query);
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_terms = terms(text);
    let hits = query_terms
        .iter()
        .filter(|q| text_terms.iter().any(|t| t.starts_with(q.as_str())))
        .count();
    hits as f32 / query_terms.len() as f32
}
