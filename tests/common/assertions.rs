//! Custom test assertions for E2E tests

use bulk_dl::BatchReport;
use std::path::Path;

/// Sorted names of every entry in `dir`
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("download dir readable")
        .map(|e| {
            e.expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

/// Assert no `.part` file is left in `dir`
pub fn assert_no_part_files(dir: &Path) {
    let leftovers: Vec<String> = dir_entries(dir)
        .into_iter()
        .filter(|name| name.ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty(), "partial files left behind: {leftovers:?}");
}

/// Assert every successful outcome points at a file holding `expected_len` bytes
pub fn assert_success_files(report: &BatchReport, expected_len: u64) {
    for outcome in report.succeeded() {
        let meta = std::fs::metadata(&outcome.detail)
            .unwrap_or_else(|e| panic!("missing file for {}: {e}", outcome.url));
        assert_eq!(meta.len(), expected_len, "wrong length for {}", outcome.url);
    }
}

/// Detail of the outcome for `url`
pub fn detail_for<'a>(report: &'a BatchReport, url: &str) -> &'a str {
    report
        .outcomes
        .iter()
        .find(|o| o.url == url)
        .map(|o| o.detail.as_str())
        .unwrap_or_else(|| panic!("no outcome for {url}"))
}
