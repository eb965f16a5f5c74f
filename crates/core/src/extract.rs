//! Pulling structured payloads out of free-form model replies.
//!
//! Models wrap JSON in prose or code fences, so extraction takes the greedy
//! span from the first opening bracket to the last closing one. Every call
//! site gets an explicit [`LlmOutput`] and picks its own fallback.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

#[derive(Clone, Debug, PartialEq)]
pub enum LlmOutput<T> {
    Parsed(T),
    Unparseable { raw: String, reason: String },
}

impl<T> LlmOutput<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }

    pub fn parsed(self) -> Option<T> {
        match self {
            Self::Parsed(value) => Some(value),
            Self::Unparseable { .. } => None,
        }
    }

    pub fn unwrap_or_else(self, fallback: impl FnOnce(&str) -> T) -> T {
        match self {
            Self::Parsed(value) => value,
            Self::Unparseable { raw, .. } => fallback(&raw),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LlmOutput<U> {
        match self {
            Self::Parsed(value) => LlmOutput::Parsed(f(value)),
            Self::Unparseable { raw, reason } => LlmOutput::Unparseable { raw, reason },
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Parsed(value) => Ok(value),
            Self::Unparseable { reason, .. } => Err(reason),
        }
    }
}

fn object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{[\s\S]*\}").expect("valid object pattern"))
}

fn array_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[[\s\S]*\]").expect("valid array pattern"))
}

pub fn extract_object<T: DeserializeOwned>(raw: &str) -> LlmOutput<T> {
    extract_with(raw, object_pattern(), "object")
}

pub fn extract_array<T: DeserializeOwned>(raw: &str) -> LlmOutput<T> {
    extract_with(raw, array_pattern(), "array")
}

fn extract_with<T: DeserializeOwned>(raw: &str, pattern: &Regex, shape: &str) -> LlmOutput<T> {
    let Some(span) = pattern.find(raw) else {
        return LlmOutput::Unparseable {
            raw: raw.to_owned(),
            reason: format!("no JSON {shape} found in model output"),
        };
    };
    match serde_json::from_str(span.as_str()) {
        Ok(value) => LlmOutput::Parsed(value),
        Err(error) => LlmOutput::Unparseable {
            raw: raw.to_owned(),
            reason: format!("malformed JSON {shape}: {error}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::{extract_array, extract_object, LlmOutput};

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Check {
        has_solution: bool,
    }

    #[test]
    fn finds_object_wrapped_in_prose_and_fences() {
        let raw = "Sure, here it is:\n```json\n{\"hasSolution\": true}\n```\nAnything else?";

        assert_eq!(extract_object::<Check>(raw), LlmOutput::Parsed(Check { has_solution: true }));
    }

    #[test]
    fn greedy_span_covers_nested_objects() {
        let raw = r#"{"outer": {"inner": 1}, "tail": [1, 2]}"#;
        let value: serde_json::Value = extract_object(raw).parsed().expect("parsed");

        assert_eq!(value["outer"]["inner"], 1);
    }

    #[test]
    fn text_without_json_is_unparseable() {
        let output = extract_object::<Check>("I could not decide.");

        assert!(!output.is_parsed());
        assert!(!output.unwrap_or_else(|_| Check { has_solution: false }).has_solution);
    }

    #[test]
    fn malformed_json_keeps_raw_text() {
        match extract_array::<Vec<u32>>("[1, 2,") {
            LlmOutput::Unparseable { raw, reason } => {
                assert_eq!(raw, "[1, 2,");
                assert!(reason.contains("no JSON array"));
            }
            LlmOutput::Parsed(_) => panic!("must not parse"),
        }
        assert!(extract_array::<Vec<u32>>("values: [1, 2]").into_result().is_ok());
    }
}
