//! URL list input

use crate::error::{Error, Result};
use std::path::Path;

/// Split a URL list into one URL per non-blank line
///
/// Surrounding whitespace is trimmed and a leading byte-order mark is ignored.
/// Order and duplicates are preserved.
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read and parse a URL list file
pub async fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read URL list '{}': {}", path.display(), e),
        ))
    })?;

    let urls = parse_url_list(&text);
    tracing::debug!(path = %path.display(), count = urls.len(), "Loaded URL list");
    Ok(urls)
}
