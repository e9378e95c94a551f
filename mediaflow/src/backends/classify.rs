//! Classification of unclassified backend failures by message.

use crate::errors::ErrorKind;
use regex::Regex;
use std::sync::LazyLock;

static RULES: LazyLock<Vec<(ErrorKind, Regex)>> = LazyLock::new(|| {
    [
        (ErrorKind::RateLimited, r"(?i)\b429\b|rate[ _-]?limit|too many requests|quota exceeded"),
        (ErrorKind::Timeout, r"(?i)timed? ?out|timeout|deadline exceeded"),
        (
            ErrorKind::NetworkError,
            r"(?i)network|connection (refused|reset|closed|aborted)|econn\w*|socket|dns|getaddrinfo|enotfound|\b50[234]\b",
        ),
        (
            ErrorKind::ConfigInvalid,
            r"(?i)api[ _-]?key|unauthori[sz]ed|\b401\b|\b403\b|invalid config|missing config",
        ),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| match Regex::new(pattern) {
        Ok(regex) => Some((kind, regex)),
        Err(err) => {
            tracing::error!(%kind, error = %err, "Invalid classification pattern");
            None
        }
    })
    .collect()
});

/// Classifies a failure from its message. Unrecognised messages are
/// [`ErrorKind::Unknown`], which is never retried.
#[must_use]
pub fn classify_message(message: &str) -> ErrorKind {
    RULES
        .iter()
        .find(|(_, regex)| regex.is_match(message))
        .map_or(ErrorKind::Unknown, |(kind, _)| *kind)
}
