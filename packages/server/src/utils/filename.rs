use std::path::Path;

const MAX_FILE_NAME_CHARS: usize = 255;

/// Reduce a client-supplied file name to a displayable base name.
///
/// Directory components (either separator) and control characters are
/// dropped. Falls back to `"file"` when nothing usable remains.
pub fn display_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "file".into()
    } else {
        cleaned.to_string()
    }
}

/// Guess a MIME type from a file name, defaulting to `application/octet-stream`.
pub fn guess_mime(file_name: &str) -> String {
    mime_guess::from_path(Path::new(file_name))
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
