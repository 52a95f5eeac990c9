use std::path::{Path, PathBuf};

/// Longest sanitized title kept before the truncation marker is appended.
const MAX_TITLE_LEN: usize = 200;

/// Marker appended when a title is truncated.
const TRUNCATION_MARKER: &str = "...";

/// Sanitize a media title into a filesystem-safe filename component.
///
/// Replaces characters that are invalid on common filesystems
/// (`< > : " / \ | ? *`) with `_`, collapses whitespace runs into a single
/// space, trims, and truncates to 200 characters (appending `...` when
/// truncation happened). Total and idempotent.
pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| {
            if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') {
                '_'
            } else {
                c
            }
        })
        .collect();

    let collapsed: String = replaced.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() > MAX_TITLE_LEN {
        let mut truncated: String = collapsed.chars().take(MAX_TITLE_LEN).collect();
        truncated.push_str(TRUNCATION_MARKER);
        truncated
    } else {
        collapsed
    }
}

/// Build the ordinal-qualified filename stem for a playlist entry,
/// e.g. `"01 - Some Title"`.
pub fn entry_stem(ordinal: usize, title: &str) -> String {
    format!("{:02} - {}", ordinal, title)
}

/// Ordinal prefix shared by every file belonging to an entry, e.g. `"01 -"`.
/// Bounds the fuzzy existence search to a single entry's files.
pub fn ordinal_prefix(ordinal: usize) -> String {
    format!("{:02} -", ordinal)
}

/// Build the output template handed to the transfer engine for one playlist
/// entry. The title and extension placeholders are expanded by the engine,
/// which knows the final title and container only after extraction.
pub fn entry_output_template(playlist_dir: &Path, ordinal: usize) -> PathBuf {
    playlist_dir.join(format!("{:02} - %(title)s.%(ext)s", ordinal))
}

/// Output template for single-video mode: no ordinal prefix.
pub fn single_output_template(output_root: &Path) -> PathBuf {
    output_root.join("%(title)s.%(ext)s")
}
