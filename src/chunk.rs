//! Recursive character text splitter with overlap.
//!
//! Splits text into [`Chunk`]s of at most `chunk_chars` characters. Split
//! points are chosen from a separator hierarchy (paragraph, line, sentence,
//! word) before falling back to a hard character cut, and consecutive chunks
//! share up to `overlap_chars` characters of trailing context.
//!
//! Each chunk receives a random UUID and a SHA-256 hash of its text.
//! Sizes are counted in `char`s, so multi-byte text never splits inside a
//! code point.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Separators tried in order, coarsest first.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Split text into overlapping chunks.
/// Returns chunks with contiguous indices starting at 0, or nothing for
/// blank input.
pub fn chunk_text(text: &str, chunk_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    split_text(text, chunk_chars, overlap_chars)
        .iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(i as i64, piece))
        .collect()
}

/// Split text into overlapping pieces without wrapping them in [`Chunk`]s.
pub fn split_text(text: &str, chunk_chars: usize, overlap_chars: usize) -> Vec<String> {
    let chunk_chars = chunk_chars.max(1);
    let overlap_chars = overlap_chars.min(chunk_chars.saturating_sub(1));

    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut atoms = Vec::new();
    split_recursive(text, chunk_chars, 0, &mut atoms);
    merge_atoms(&atoms, chunk_chars, overlap_chars)
}

/// Break `text` into atoms no longer than `max_chars`, keeping each
/// separator attached to the piece it ends.
fn split_recursive(text: &str, max_chars: usize, level: usize, out: &mut Vec<String>) {
    if char_len(text) <= max_chars {
        out.push(text.to_string());
        return;
    }

    let Some(&sep) = SEPARATORS.get(level) else {
        // Hard cut
        let chars: Vec<char> = text.chars().collect();
        for piece in chars.chunks(max_chars) {
            out.push(piece.iter().collect());
        }
        return;
    };

    if !text.contains(sep) {
        split_recursive(text, max_chars, level + 1, out);
        return;
    }

    for piece in text.split_inclusive(sep) {
        if char_len(piece) <= max_chars {
            out.push(piece.to_string());
        } else {
            split_recursive(piece, max_chars, level + 1, out);
        }
    }
}

/// Greedily pack atoms into chunks, carrying trailing atoms forward as
/// overlap when a chunk is flushed.
fn merge_atoms(atoms: &[String], chunk_chars: usize, overlap_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut window_len = 0usize;

    for atom in atoms {
        let atom_len = char_len(atom);

        if window_len + atom_len > chunk_chars && !window.is_empty() {
            push_trimmed(&mut chunks, &window.concat());

            // Drop from the front until the carried tail fits the overlap and
            // leaves room for the incoming atom.
            while !window.is_empty()
                && (window_len > overlap_chars || window_len + atom_len > chunk_chars)
            {
                window_len -= char_len(window[0]);
                window.remove(0);
            }
        }

        window.push(atom);
        window_len += atom_len;
    }

    if !window.is_empty() {
        push_trimmed(&mut chunks, &window.concat());
    }

    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
