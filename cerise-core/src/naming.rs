//! Remote file names for staged inputs

use regex::Regex;
use std::sync::LazyLock;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_.-]+").expect("valid regex"));

const MAX_LEN: usize = 39;
const KEEP: usize = 18;
const ELLIPSIS: &str = "___";

/// Creates a remote file name that resembles `orig_path`.
///
/// Every run of characters outside `[A-Za-z0-9_.-]` becomes a single `_`
/// (this covers path and query delimiters). Long names keep their first and
/// last 18 characters. Uniqueness comes from `unique_prefix` alone, so
/// callers must never reuse one within a job.
pub fn create_input_filename(unique_prefix: &str, orig_path: &str) -> String {
    let sanitized = DISALLOWED.replace_all(orig_path, "_");

    // sanitized names are pure ASCII, so byte offsets are char offsets
    let shortened = if sanitized.len() > MAX_LEN {
        format!(
            "{}{}{}",
            &sanitized[..KEEP],
            ELLIPSIS,
            &sanitized[sanitized.len() - KEEP..]
        )
    } else {
        sanitized.into_owned()
    };

    format!("{}_{}", unique_prefix, shortened)
}

/// Zero-padded counter used as the unique prefix of staged files
pub fn staging_prefix(count: usize) -> String {
    format!("{:02}", count)
}
