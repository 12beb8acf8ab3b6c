//! Passage normalization and content digests.
//!
//! ```text
//! passage_digest(text) = hex(SHA256(UTF-8(trim(normalize_newlines(text)))))
//! ```
//!
//! Two chunks whose text differs only in line endings or surrounding
//! whitespace share a digest, so the passage store can suppress duplicates
//! coming from overlapping chunks or copied files.

use sha2::{Digest, Sha256};

/// Normalize passage text: CRLF and lone CR become LF, then trim.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// SHA-256 of the normalized text as 64 lowercase hex digits.
pub fn passage_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).as_bytes());
    hex::encode(hasher.finalize())
}

/// Lowercased alphanumeric terms of `text`.
pub fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}
