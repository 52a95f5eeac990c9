//! Existence resolver — the idempotency check that prevents re-downloading
//! items already materialized on disk, tolerating minor title drift between
//! enumeration passes via fuzzy keyword matching.

use std::path::{Path, PathBuf};

use crate::download::paths::{entry_stem, ordinal_prefix, sanitize_title};

/// Extensions an entry may already exist under, in preference order.
const ACCEPTED_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "webm", "opus"];

/// Fraction of keywords that must match before a fuzzy candidate is
/// accepted. Tolerates punctuation and minor title edits without matching
/// unrelated items.
const KEYWORD_MATCH_RATIO: f64 = 0.7;

/// A file already materialized for an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingFile {
    pub path: PathBuf,
    /// Uppercased extension, or `UNKNOWN` for an extensionless match.
    pub format_label: String,
}

/// Determine whether the entry at `ordinal` was already downloaded into
/// `dir` in any acceptable format.
///
/// Exact candidate stems (sanitized and raw title) are checked first across
/// all accepted extensions; failing that, a fuzzy keyword pass runs over the
/// files sharing the entry's ordinal prefix. Never fails: filesystem errors
/// during the fuzzy phase count as "no match".
pub fn resolve_existing(dir: &Path, ordinal: usize, title: &str) -> Option<ExistingFile> {
    let sanitized = sanitize_title(title);

    let mut stems = vec![entry_stem(ordinal, &sanitized)];
    if title != sanitized {
        stems.push(entry_stem(ordinal, title));
    }

    for stem in &stems {
        for ext in ACCEPTED_EXTENSIONS {
            let candidate = dir.join(format!("{stem}.{ext}"));
            if candidate.is_file() {
                return Some(ExistingFile {
                    path: candidate,
                    format_label: ext.to_uppercase(),
                });
            }
        }
    }

    fuzzy_match(dir, ordinal, &sanitized)
}

/// Fuzzy pass: accept a file with the right ordinal prefix when its stem
/// shares enough keywords with the title.
///
/// The match ratio is symmetric — matched keywords are divided by the larger
/// of the two keyword sets — so a one-word title cannot claim an unrelated
/// file that merely contains that word (the substring direction alone would).
fn fuzzy_match(dir: &Path, ordinal: usize, sanitized_title: &str) -> Option<ExistingFile> {
    let title_keywords = significant_keywords(sanitized_title);
    if title_keywords.is_empty() {
        return None;
    }

    let prefix = ordinal_prefix(ordinal);
    let entries = std::fs::read_dir(dir).ok()?;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(&prefix) {
            continue;
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        let stem_keywords = significant_keywords(&stem);

        let matched = title_keywords
            .iter()
            .filter(|kw| stem.contains(kw.as_str()))
            .count();
        let denominator = title_keywords.len().max(stem_keywords.len());

        if denominator > 0 && (matched as f64) >= (denominator as f64) * KEYWORD_MATCH_RATIO {
            let format_label = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_uppercase())
                .unwrap_or_else(|| "UNKNOWN".to_string());
            return Some(ExistingFile { path, format_label });
        }
    }

    None
}

/// Derive the significant keywords of a title: strip non-word characters,
/// lowercase, split on whitespace, keep tokens longer than 2 characters.
/// The 2-character cutoff also drops zero-padded ordinal prefixes from file
/// stems.
fn significant_keywords(text: &str) -> Vec<String> {
    let stripped: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    stripped
        .split_whitespace()
        .filter(|token| token.chars().count() > 2)
        .map(|token| token.to_string())
        .collect()
}
