//! Name-path addressing for uploaded artifacts.
//!
//! A name path arrives as a canonical string, a legacy slash-delimited string,
//! or a serialized JSON list. All of them normalize to one canonical form.

/// Canonical node separator.
pub const SEPARATOR: char = '\u{FFFD}';
/// Separator used by older name paths.
pub const LEGACY_SEPARATOR: char = '/';

/// Rewrite `raw` into the canonical separator form without a trailing separator.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    if raw.contains(SEPARATOR) {
        return trim_trailing_separator(raw).to_string();
    }
    if let Ok(segments) = serde_json::from_str::<Vec<String>>(raw) {
        return from_segments(&segments);
    }
    let replaced = raw.replace(LEGACY_SEPARATOR, &SEPARATOR.to_string());
    trim_trailing_separator(&replaced).to_string()
}

/// List form: every segment is prefixed by the separator.
pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push(SEPARATOR);
        out.push_str(segment.as_ref());
    }
    out
}

/// Name path for one artifact: the normalized prefix joined with its file name.
pub fn for_artifact(prefix: Option<&str>, file_name: &str) -> String {
    match prefix.map(str::trim).filter(|value| !value.is_empty()) {
        Some(prefix) => {
            let mut path = normalize(prefix);
            path.push(SEPARATOR);
            path.push_str(file_name);
            path
        }
        None => file_name.to_string(),
    }
}

fn trim_trailing_separator(path: &str) -> &str {
    path.strip_suffix(SEPARATOR).unwrap_or(path)
}
