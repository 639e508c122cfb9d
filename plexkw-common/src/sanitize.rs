//! Free-text sanitisation for values echoed into logs and HTTP responses
//!
//! Not a security boundary for the write path; the Plex write only ever
//! receives validated ids and keywords.

use serde_json::Value;

/// Maximum length (in characters) of a sanitised string
pub const MAX_SANITISED_LEN: usize = 1000;

/// Trim, strip `< > ' " ;` and cap at [`MAX_SANITISED_LEN`] characters.
pub fn sanitise_string(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '\'' | '"' | ';'))
        .take(MAX_SANITISED_LEN)
        .collect()
}

/// Sanitise an arbitrary JSON value; missing and null become an empty string.
pub fn sanitise_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => sanitise_string(s),
        Some(other) => sanitise_string(&other.to_string()),
    }
}
