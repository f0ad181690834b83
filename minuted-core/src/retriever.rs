//! Selects the most relevant transcript chunks for a question.
//!
//! Scoring is lexical: term frequency over normalized text, weighted by how
//! many distinct query terms a chunk covers. When nothing matches (or there
//! is no query) selection degrades to the chronological start of the
//! transcript instead of returning nothing, so a meeting chat always gets
//! some context while chunks exist.

use crate::types::Chunk;

/// Select up to `limit` chunks for `query`.
///
/// With a non-empty query, chunks are ranked by [`score`] descending (ties
/// broken by ascending position). If no chunk scores above zero, or the query
/// is empty or absent, the first `limit` chunks by position are returned.
pub fn select(chunks: &[Chunk], query: Option<&str>, limit: usize) -> Vec<Chunk> {
    let query = query.map(str::trim).filter(|q| !q.is_empty());

    if let Some(q) = query {
        let terms = tokenize(q);
        if !terms.is_empty() {
            let mut scored: Vec<(f64, &Chunk)> = chunks
                .iter()
                .map(|c| (score(&c.content, &terms), c))
                .filter(|(s, _)| *s > 0.0)
                .collect();

            if !scored.is_empty() {
                scored.sort_by(|a, b| {
                    b.0.partial_cmp(&a.0)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.1.position.cmp(&b.1.position))
                });
                return scored.into_iter().take(limit).map(|(_, c)| c.clone()).collect();
            }
        }
    }

    // Fallback: chronological start of the transcript.
    let mut positional: Vec<&Chunk> = chunks.iter().collect();
    positional.sort_by_key(|c| c.position);
    positional.into_iter().take(limit).cloned().collect()
}

/// Join selected chunks into the single context block the prompt builder
/// consumes.
pub fn context_block(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Relevance of free text to a query. Used by the stores' cross-meeting
/// chunk search so tool-facing search ranks the same way chat retrieval does.
pub fn relevance(content: &str, query: &str) -> f64 {
    let terms = tokenize(query);
    if terms.is_empty() {
        return 0.0;
    }
    score(content, &terms)
}

/// Term-frequency/coverage score of `content` against the query `terms`.
///
/// Each term contributes its occurrence count; the sum is weighted by the
/// fraction of distinct terms the chunk covers, so a chunk touching most of
/// the question outranks one repeating a single word.
fn score(content: &str, terms: &[String]) -> f64 {
    let content_tokens = tokenize(content);
    if content_tokens.is_empty() {
        return 0.0;
    }

    let mut occurrences = 0usize;
    let mut covered = 0usize;
    for term in terms {
        let count = content_tokens.iter().filter(|t| *t == term).count();
        if count > 0 {
            covered += 1;
        }
        occurrences += count;
    }

    if covered == 0 {
        return 0.0;
    }

    occurrences as f64 * (covered as f64 / terms.len() as f64)
}

/// Lowercased alphanumeric tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
