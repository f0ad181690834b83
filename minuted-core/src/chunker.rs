//! Splits a transcript into chunks suitable for retrieval.
//!
//! Chunks respect segment boundaries (a segment is never split) and include
//! a one-segment overlap between consecutive chunks for context continuity.
//! Chunk content uses the same `"Speaker [HH:MM:SS]: text"` format the rest
//! of the system renders transcripts with.
//!
//! Pure and deterministic: the same segments and budget always yield the
//! same chunk sequence.

use crate::config::ChunkerConfig;
use crate::types::{Chunk, Segment};

/// Format a single segment as it appears inside chunk content.
pub fn format_segment(segment: &Segment) -> String {
    format!(
        "{} [{}]: {}",
        segment.speaker,
        format_timestamp(segment.start_time),
        segment.text
    )
}

/// Render seconds as `HH:MM:SS`; a missing timestamp renders `00:00:00`.
pub fn format_timestamp(seconds: Option<f64>) -> String {
    let total = seconds.unwrap_or(0.0).max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Group ordered segments into token-bounded, overlapping chunks.
///
/// The budget is `config.max_tokens * config.chars_per_token` characters of
/// formatted text. Accumulation is greedy; when adding the next segment would
/// exceed the budget and the current chunk already holds something, the chunk
/// is closed and the next one is seeded with the closed chunk's last segment.
/// A single segment larger than the whole budget still becomes its own chunk.
pub fn chunk(segments: &[Segment], config: &ChunkerConfig) -> Vec<Chunk> {
    let max_chars = config.max_tokens * config.chars_per_token;
    if segments.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<&Segment> = Vec::new();
    let mut current_len = 0usize;

    for segment in segments {
        let formatted_len = format_segment(segment).len();

        if !current.is_empty() && current_len + formatted_len > max_chars {
            chunks.push(build_chunk(&current, chunks.len() as i64));

            // Overlap: start the next chunk with the last segment of the
            // previous chunk.
            let overlap = *current.last().expect("current is non-empty");
            current = vec![overlap];
            current_len = format_segment(overlap).len();
        }

        current.push(segment);
        current_len += formatted_len;
    }

    if !current.is_empty() {
        chunks.push(build_chunk(&current, chunks.len() as i64));
    }

    chunks
}

fn build_chunk(segments: &[&Segment], position: i64) -> Chunk {
    let content = segments
        .iter()
        .map(|s| format_segment(s))
        .collect::<Vec<_>>()
        .join("\n\n");

    Chunk {
        content,
        start_time: segments.first().and_then(|s| s.start_time),
        end_time: segments.last().and_then(|s| s.end_time),
        position,
        embedding: None,
    }
}
