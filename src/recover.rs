//! Tolerant JSON recovery for messy model output.
//!
//! Every stage parser funnels raw model text through [`recover_json`]:
//! locate the outermost brace span and parse it; on failure, strip markdown
//! fences and common decorative prefixes and try again. When both passes
//! fail the caller applies its stage-specific degradation (raw-text opinion,
//! sentence-split claims, uncertain reviews, chairman fallback).

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CouncilError, Result};

/// Recover a JSON object from model output.
pub fn recover_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();

    if let Some(value) = brace_span(trimmed) {
        return Ok(value);
    }

    let cleaned = strip_decorations(trimmed);
    if let Some(value) = brace_span(cleaned.trim()) {
        return Ok(value);
    }

    Err(CouncilError::Parse {
        text: truncate_chars(trimmed, 200),
    })
}

/// Recover and deserialize into a typed value.
pub fn recover_as<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_value(recover_json(text)?)?)
}

/// Parse the span from the first `{` to the last `}`, if valid JSON.
fn brace_span(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Remove markdown code fences and decorative prefixes models like to add.
fn strip_decorations(text: &str) -> String {
    text.replace("```json", "")
        .replace("```", "")
        .replace("Output:", "")
        .replace("Result:", "")
}

/// Truncate to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn direct_object() {
        let v = recover_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn object_embedded_in_prose() {
        let v = recover_json(r#"Sure, here you go: {"answer": "yes"} hope it helps"#).unwrap();
        assert_eq!(v["answer"], "yes");
    }

    #[test]
    fn fenced_object() {
        let input = "```json\n{\"claims\": [\"a\", \"b\"]}\n```";
        let v = recover_json(input).unwrap();
        assert_eq!(v["claims"][1], "b");
    }

    #[test]
    fn decorated_prefix() {
        let input = "Output:\n{\"x\": 2}";
        let v = recover_json(input).unwrap();
        assert_eq!(v["x"], 2);
    }

    #[test]
    fn fence_inside_span_is_stripped() {
        // The brace span itself is corrupted by a fence, so only the cleanup
        // pass can rescue it.
        let input = "{\"claims\": [\"a\"]```\n}";
        let v = recover_json(input).unwrap();
        assert_eq!(v["claims"][0], "a");
    }

    #[test]
    fn nested_braces_use_outermost_span() {
        let v = recover_json(r#"{"outer": {"inner": 1}}"#).unwrap();
        assert_eq!(v["outer"]["inner"], 1);
    }

    #[test]
    fn no_json_at_all() {
        let err = recover_json("the sky is blue").unwrap_err();
        assert!(matches!(err, CouncilError::Parse { .. }));
    }

    #[test]
    fn unbalanced_braces_fail() {
        assert!(recover_json("{\"a\": ").is_err());
    }

    #[test]
    fn typed_recovery() {
        #[derive(Debug, Deserialize)]
        struct Claims {
            claims: Vec<String>,
        }
        let parsed: Claims = recover_as("noise {\"claims\": [\"one\"]} noise").unwrap();
        assert_eq!(parsed.claims, vec!["one"]);
    }

    #[test]
    fn typed_recovery_shape_mismatch_is_error() {
        #[derive(Debug, Deserialize)]
        struct Claims {
            _claims: Vec<String>,
        }
        assert!(recover_as::<Claims>(r#"{"other": 1}"#).is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
