//! Recursive, overlap-aware text segmentation.
//!
//! The splitter works on characters. It splits at the highest-priority separator that
//! produces pieces within the budget, recurses into oversized pieces with the remaining
//! separators, then merges adjacent small pieces so each chunk approaches `chunk_size`
//! without exceeding it. Consecutive chunks carry the last `chunk_overlap` characters of
//! the previous chunk as a prefix. An atomic piece larger than the budget is emitted
//! unsplit.

use crate::pipeline::{Item, ItemPatch, ProcessorError, RunContext};
use crate::processors::Processor;
use async_trait::async_trait;
use std::collections::VecDeque;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits `clean_text` into ordered chunks.
pub struct ChunkProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkProcessor {
    /// Build a splitter with the given character budget and overlap.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }
}

#[async_trait]
impl Processor for ChunkProcessor {
    fn name(&self) -> &'static str {
        "chunk"
    }

    fn order(&self) -> i32 {
        30
    }

    async fn process(&self, item: &Item, _ctx: &RunContext) -> Result<ItemPatch, ProcessorError> {
        let text = item.clean_text.as_deref().unwrap_or_default();
        if text.is_empty() {
            return Ok(ItemPatch {
                chunks: Some(Vec::new()),
                ..ItemPatch::default()
            });
        }

        let chunks = split_text(text, &SEPARATORS, self.chunk_size, self.chunk_overlap);
        tracing::debug!(
            file_name = %item.file_name,
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            overlap = self.chunk_overlap,
            "Text segmented"
        );

        Ok(ItemPatch {
            chunks: Some(chunks),
            ..ItemPatch::default()
        })
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` recursively and merge the resulting pieces into bounded chunks.
fn split_text(
    text: &str,
    separators: &[&'static str],
    chunk_size: usize,
    overlap: usize,
) -> Vec<String> {
    // Highest-priority separator that actually occurs; "" always matches last.
    let mut separator: &'static str = separators.last().copied().unwrap_or("");
    let mut remaining: &[&'static str] = &[];
    for (index, candidate) in separators.iter().enumerate() {
        if candidate.is_empty() {
            separator = "";
            remaining = &[];
            break;
        }
        if text.contains(candidate) {
            separator = candidate;
            remaining = &separators[index + 1..];
            break;
        }
    }

    let pieces: Vec<String> = if separator.is_empty() {
        text.chars().map(|c| c.to_string()).collect()
    } else {
        text.split(separator).map(str::to_string).collect()
    };

    let mut output = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    for piece in pieces {
        if char_len(&piece) < chunk_size {
            pending.push(piece);
            continue;
        }
        if !pending.is_empty() {
            output.extend(merge_pieces(&pending, separator, chunk_size, overlap));
            pending.clear();
        }
        if remaining.is_empty() {
            // Atomic oversized piece; emitted as-is.
            output.push(piece);
        } else {
            output.extend(split_text(&piece, remaining, chunk_size, overlap));
        }
    }
    if !pending.is_empty() {
        output.extend(merge_pieces(&pending, separator, chunk_size, overlap));
    }

    output
        .into_iter()
        .map(|chunk| chunk.trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

/// Greedily pack pieces into chunks near `chunk_size`, retaining an overlap-sized tail
/// of pieces between consecutive chunks.
fn merge_pieces(
    pieces: &[String],
    separator: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: VecDeque<String> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let piece_len = char_len(piece);
        let join_cost = if window.is_empty() { 0 } else { sep_len };
        if total + piece_len + join_cost > chunk_size && !window.is_empty() {
            if let Some(chunk) = join_window(&window, separator) {
                chunks.push(chunk);
            }
            // Shed leading pieces until the retained tail fits the overlap budget
            // and the incoming piece fits the chunk budget.
            while total > overlap
                || (total + piece_len + if window.is_empty() { 0 } else { sep_len } > chunk_size
                    && total > 0)
            {
                let dropped = window.pop_front().expect("window drained unexpectedly");
                total -= char_len(&dropped) + if window.is_empty() { 0 } else { sep_len };
            }
        }
        let join_cost = if window.is_empty() { 0 } else { sep_len };
        window.push_back(piece.clone());
        total += piece_len + join_cost;
    }

    if let Some(chunk) = join_window(&window, separator) {
        chunks.push(chunk);
    }
    chunks
}

fn join_window(window: &VecDeque<String>, separator: &str) -> Option<String> {
    let joined = window
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
