//! URL list loading: positional arguments, plain-text files, and JSON
//! array files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Reads the target URL list from a file.
///
/// Files named `*.json` (case-insensitive) are parsed as a JSON array of
/// strings; entries are trimmed and empties dropped, order preserved. If
/// the content is not a JSON array, the file falls back to line-oriented
/// parsing. Every other extension is treated as one URL per line.
pub fn load_urls_from_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading url list {}", path.display()))?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Array(items)) => {
                let urls: Vec<String> = items
                    .iter()
                    .filter_map(|item| item.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                debug!(count = urls.len(), path = %path.display(), "loaded JSON url list");
                return Ok(urls);
            }
            Ok(_) | Err(_) => {
                debug!(path = %path.display(), "json url list not an array, falling back to lines");
            }
        }
    }

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    debug!(count = urls.len(), path = %path.display(), "loaded line-oriented url list");
    Ok(urls)
}

/// Resolves the final URL list from CLI inputs.
///
/// An explicit file flag wins. Otherwise a single positional argument
/// naming an existing file is read as a list; anything else is taken as
/// literal URLs.
pub fn resolve_urls(urls_file: Option<&Path>, urls: &[String]) -> Result<Vec<String>> {
    if let Some(path) = urls_file {
        return load_urls_from_file(path);
    }
    if let [single] = urls {
        let candidate = Path::new(single);
        if candidate.is_file() {
            return load_urls_from_file(candidate);
        }
    }
    Ok(urls.to_vec())
}
