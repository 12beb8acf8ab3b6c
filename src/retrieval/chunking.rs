//! Character chunking of text and markdown files.

use std::path::{Path, PathBuf};

use super::memory::Passage;
use super::RetrievalError;

/// Default chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1200;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// File extensions picked up by [`chunk_dir`] (compared lowercase).
pub const CHUNKED_EXTENSIONS: &[&str] = &["txt", "md"];

/// Split `text` into overlapping character windows.
///
/// Returns `(char_offset, chunk)` pairs. The stride is
/// `max(1, chunk_size - overlap)`, so a degenerate overlap still advances.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let size = chunk_size.max(1);
    let stride = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push((start, chars[start..end].iter().collect()));
        start += stride;
    }
    chunks
}

/// Chunk every `.txt`/`.md` file under `root`, in sorted path order.
///
/// Passage ids are `"<file name>:<char offset>"`. Invalid UTF-8 is replaced
/// rather than rejected.
pub fn chunk_dir(
    root: &Path,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Passage>, RetrievalError> {
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    let mut passages = Vec::new();
    for path in files {
        let bytes = std::fs::read(&path)?;
        let text = String::from_utf8_lossy(&bytes);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for (offset, chunk) in chunk_text(&text, chunk_size, overlap) {
            passages.push(Passage::new(format!("{name}:{offset}"), chunk));
        }
    }

    tracing::debug!(root = %root.display(), passages = passages.len(), "chunked directory");
    Ok(passages)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RetrievalError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if has_chunked_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn has_chunked_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| CHUNKED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
