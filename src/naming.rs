//! Destination naming: URL to safe leaf filename, then to a collision-free path
//!
//! Names handed out by a [`NameResolver`] are reserved for the rest of the run, so
//! two workers resolving at the same time never receive the same destination.

use crate::error::NameResolutionError;
use crate::types::{Destination, PART_SUFFIX};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use xxhash_rust::xxh64::xxh64;

/// Maximum number of numbered variants tried when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Extension given to synthesized names
const FALLBACK_EXTENSION: &str = "pdf";

/// Derive a filesystem-safe leaf filename from a URL
///
/// Takes the last path segment, drops any query string, percent-decodes it and
/// replaces path separators with `_`. URLs without a usable segment get a name
/// built from a stable hash of the whole URL (see [`fallback_filename`]).
///
/// # Examples
///
/// ```
/// use bulk_dl::naming::filename_from_url;
///
/// assert_eq!(filename_from_url("https://example.com/docs/annual%20report.pdf?v=2"), "annual report.pdf");
/// assert_eq!(filename_from_url("https://example.com/a%2Fb.pdf"), "a_b.pdf");
/// assert!(filename_from_url("https://example.com/").starts_with("file_"));
/// ```
pub fn filename_from_url(url: &str) -> String {
    let segment = last_path_segment(url).unwrap_or_default();
    let segment = segment.split('?').next().unwrap_or_default();

    let decoded = urlencoding::decode_binary(segment.as_bytes());
    let name: String = String::from_utf8_lossy(&decoded)
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();

    if name.is_empty() || name == "." || name == ".." {
        return fallback_filename(url);
    }
    name
}

/// Synthesized name for URLs whose path has no usable last segment
///
/// `file_<xxh64(url)>.pdf`, with the XXH64 (seed 0) digest of the URL's UTF-8
/// bytes as 16 lowercase hex digits. Identical URLs always map to the same name.
pub fn fallback_filename(url: &str) -> String {
    format!(
        "file_{:016x}.{}",
        xxh64(url.as_bytes(), 0),
        FALLBACK_EXTENSION
    )
}

fn last_path_segment(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    segments.next_back().map(str::to_string)
}

/// Split a filename into stem and extension the way collisions are numbered
///
/// A leading dot (hidden file) or trailing dot does not start an extension.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Numbered variant of a filename: `report.pdf` becomes `report_<n>.pdf`
fn numbered_name(name: &str, n: u32) -> String {
    match split_extension(name) {
        (stem, Some(ext)) => format!("{}_{}.{}", stem, n, ext),
        (stem, None) => format!("{}_{}", stem, n),
    }
}

/// Whether something (file, directory or dangling symlink) already occupies `path`
fn is_occupied(path: &Path) -> Result<bool, NameResolutionError> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(NameResolutionError::Inspect {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Pick the first free name among `name`, `name_1`, `name_2`, ...
///
/// A candidate is taken if it, or its `.part` temporary, exists in `directory` or
/// `is_reserved` says so.
///
/// # Examples
///
/// ```
/// use bulk_dl::naming::unique_name;
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("paper.pdf"), b"old").unwrap();
///
/// let name = unique_name(dir.path(), "paper.pdf", |_| false).unwrap();
/// assert_eq!(name, "paper_1.pdf");
/// ```
pub fn unique_name(
    directory: &Path,
    name: &str,
    is_reserved: impl Fn(&Path) -> bool,
) -> Result<String, NameResolutionError> {
    let taken = |candidate: &str| -> Result<bool, NameResolutionError> {
        let path = directory.join(candidate);
        let part = directory.join(format!("{candidate}{PART_SUFFIX}"));
        Ok(is_reserved(&path)
            || is_reserved(&part)
            || is_occupied(&path)?
            || is_occupied(&part)?)
    };

    if !taken(name)? {
        return Ok(name.to_string());
    }

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = numbered_name(name, i);
        if !taken(&candidate)? {
            return Ok(candidate);
        }
    }

    Err(NameResolutionError::Exhausted {
        path: directory.join(name),
        attempts: MAX_RENAME_ATTEMPTS,
    })
}

/// Hands out collision-free destinations inside one directory
///
/// Every destination returned by [`resolve`](Self::resolve), together with its `.part`
/// path, stays reserved for the lifetime of the resolver, whether or not a file is ever
/// written there.
#[derive(Debug)]
pub struct NameResolver {
    directory: PathBuf,
    reserved: Mutex<HashSet<PathBuf>>,
}

impl NameResolver {
    /// Create a resolver for `directory`; the directory must already exist
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Directory destinations are resolved in
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Resolve and reserve a destination for `url`
    pub fn resolve(&self, url: &str) -> Result<Destination, NameResolutionError> {
        let name = filename_from_url(url);

        // Check and reserve under one lock so concurrent callers never share a name
        let mut reserved = self
            .reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let filename = unique_name(&self.directory, &name, |p| reserved.contains(p))?;
        let destination = Destination {
            directory: self.directory.clone(),
            filename,
        };
        reserved.insert(destination.path());
        reserved.insert(destination.part_path());

        tracing::debug!(url = %url, filename = %destination.filename, "Resolved destination");

        Ok(destination)
    }
}
