//! Markdown document loading and recursive chunking.
//!
//! Documents are split on the largest structural separator first (section
//! headers), falling back to paragraphs, lines, words, and finally single
//! characters for pieces that are still too large.  Adjacent chunks from the
//! same document share an overlap window.

use std::{collections::VecDeque, path::Path};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// Target chunk size, in characters.
pub const CHUNK_SIZE: usize = 1000;

/// Characters shared between consecutive chunks of the same document.
pub const CHUNK_OVERLAP: usize = 200;

/// Split boundaries, from most to least structural.
pub const SEPARATORS: &[&str] = &["\n## ", "\n### ", "\n\n", "\n", " ", ""];

/// Only files with this extension are indexed.
pub const DOCUMENT_EXTENSION: &str = "md";

// Types.

/// A contiguous span of a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub content: String,
    /// Path of the originating document.
    pub source: String,
    /// Position across the whole output of one loading run.
    pub chunk_index: usize,
}

/// Recursive character splitter.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &'static [&'static str],
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(CHUNK_SIZE, CHUNK_OVERLAP)
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size),
            separators: SEPARATORS,
        }
    }

    /// Split `text` into chunks of at most `chunk_size` characters where possible.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Pick the first separator present in the text; the empty separator always matches.
        let (separator, remaining) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(i, sep)| (*sep, &separators[i + 1..]))
            .unwrap_or(("", &[]));

        let mut chunks = Vec::new();
        let mut small = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }

            if !small.is_empty() {
                chunks.extend(self.merge_splits(&small));
                small.clear();
            }

            if remaining.is_empty() {
                chunks.push(piece.trim().to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !small.is_empty() {
            chunks.extend(self.merge_splits(&small));
        }

        chunks.retain(|chunk| !chunk.is_empty());
        chunks
    }

    /// Greedily pack small pieces into chunks, carrying up to `chunk_overlap` characters into the next one.
    fn merge_splits(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window);

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front);
                }
            }

            window.push_back(piece);
            total += len;
        }

        push_trimmed(&mut chunks, &window);

        chunks
    }
}

// Operations.

/// Load every markdown document under `directory` (recursively) and chunk it.
///
/// A missing directory or an empty one yields no chunks.
#[instrument(name = "chunker::load_and_chunk", skip_all, fields(directory = %directory.display()))]
pub fn load_and_chunk(directory: &Path, splitter: &TextSplitter) -> Vec<DocumentChunk> {
    if !directory.is_dir() {
        warn!("Document directory `{}` does not exist.", directory.display());
        return Vec::new();
    }

    let mut paths = WalkDir::new(directory)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION))
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();

    // Sort for deterministic ordering.
    paths.sort();

    if paths.is_empty() {
        warn!("No `*.{DOCUMENT_EXTENSION}` documents found in `{}`.", directory.display());
        return Vec::new();
    }

    let mut chunks = Vec::new();

    for path in &paths {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping `{}`: {e}", path.display());
                continue;
            }
        };

        let source = path.to_string_lossy().to_string();
        let pieces = splitter.split_text(&text);

        debug!("Split `{source}` into {} chunks.", pieces.len());

        for content in pieces {
            chunks.push(DocumentChunk {
                content,
                source: source.clone(),
                chunk_index: chunks.len(),
            });
        }
    }

    info!("Loaded {} documents into {} chunks.", paths.len(), chunks.len());

    chunks
}

// Helpers.

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn push_trimmed(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let chunk = window.iter().copied().collect::<String>();
    let chunk = chunk.trim();

    if !chunk.is_empty() {
        chunks.push(chunk.to_string());
    }
}

/// Split `text` on `separator`, keeping each separator at the start of the piece that follows it.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;

    for (index, _) in text.match_indices(separator) {
        if index > start {
            pieces.push(&text[start..index]);
        }
        start = index;
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

// Tests.
