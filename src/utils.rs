//! Small helpers shared by the extractor, normalizer and output writer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

static CONTROL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\n\r\t]+").unwrap());
static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Strip `\n`, `\r` and `\t` from a JSON payload before decoding.
///
/// Raw control characters inside string literals are invalid JSON, and some
/// sites emit them inside `articleBody`.
pub fn strip_control_whitespace(s: &str) -> String {
    CONTROL_WS.replace_all(s, "").into_owned()
}

/// Collapse runs of whitespace (including control whitespace) into a single space.
pub fn normalize_whitespace(s: &str) -> String {
    let s = CONTROL_WS.replace_all(s, " ");
    SPACE_RUNS.replace_all(s.trim(), " ").into_owned()
}

/// View a JSON value as a list: arrays as-is, `null` as empty, anything else
/// as a one-element list.
pub fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Resolve `link` against `base`, returning `link` unchanged when either fails to parse.
pub fn resolve_url(base: &str, link: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(link)) {
        Ok(u) => u.to_string(),
        Err(_) => link.to_string(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes (on a char boundary) with an
/// ellipsis and byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a scratch file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let scratch = format!("{}/.__write_check__", path.trim_end_matches('/'));
    stdfs::File::create(&scratch)?;
    let _ = stdfs::remove_file(&scratch);
    info!("Output directory is writable");
    Ok(())
}
