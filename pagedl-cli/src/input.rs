//! Turns whatever the user typed into a canonical item id.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{AppError, Result};

static BVID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(BV[0-9A-Za-z]{10})").expect("valid regex"));
static PREFIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(av|ep|ss)(\d+)").expect("valid regex"));
static QUERY_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[?&](aid|ep_id|season_id)=(\d+)").expect("valid regex")
});

/// Resolve a URL or bare id into `BV…`, `av…`, `ep…` or `ss…`.
pub fn resolve_item_id(input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AppError::InvalidInput("empty input".to_string()));
    }

    if input.chars().all(|c| c.is_ascii_digit()) {
        return Ok(format!("av{input}"));
    }
    if let Some(caps) = BVID.captures(input) {
        let id = &caps[1];
        // Canonical ids start with an uppercase `BV`.
        return Ok(format!("BV{}", &id[2..]));
    }
    if let Some(caps) = PREFIXED.captures(input) {
        return Ok(format!("{}{}", caps[1].to_lowercase(), &caps[2]));
    }
    if let Some(caps) = QUERY_ID.captures(input) {
        let prefix = match caps[1].to_lowercase().as_str() {
            "aid" => "av",
            "ep_id" => "ep",
            _ => "ss",
        };
        return Ok(format!("{prefix}{}", &caps[2]));
    }

    debug!(input, "No known id pattern in input");
    Err(AppError::InvalidInput(format!(
        "cannot find an item id in `{input}`"
    )))
}
