//! Pulling structured data out of free-form model output.

use crate::error::TransformError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Iterator over the JSON objects and arrays embedded in a text.
///
/// Created by [`extract_json`].
#[derive(Debug, Clone)]
pub struct JsonValues<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Iterator for JsonValues<'a> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        loop {
            let rest = self.text.get(self.pos..)?;
            let offset = rest.find(|c: char| c == '{' || c == '[')?;
            let start = self.pos + offset;

            let mut stream =
                serde_json::Deserializer::from_str(&self.text[start..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) => {
                    self.pos = start + stream.byte_offset();
                    return Some(value);
                }
                _ => self.pos = start + 1,
            }
        }
    }
}

/// Yields every JSON object or array found in `text`, in order.
///
/// Scanning resumes right after each parsed value; an opening bracket that
/// does not start valid JSON is skipped.
///
/// ```
/// use gears::json::extract_json;
/// use serde_json::json;
///
/// let found: Vec<_> = extract_json(r#"Sure! {"a": 1} and also [2, 3]."#).collect();
/// assert_eq!(found, vec![json!({"a": 1}), json!([2, 3])]);
/// ```
pub fn extract_json(text: &str) -> JsonValues<'_> {
    JsonValues { text, pos: 0 }
}

/// The first JSON object or array in `text`.
pub fn extract_first_json(text: &str) -> Result<Value, TransformError> {
    extract_json(text)
        .next()
        .ok_or_else(|| TransformError::new(format!("no JSON found in text: {text}")))
}

/// Deserializes the first embedded JSON value into `T`.
pub fn parse_first_json<T: DeserializeOwned>(text: &str) -> Result<T, TransformError> {
    Ok(serde_json::from_value(extract_first_json(text)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_extract_json_valid() {
        let text = r#"{"key1": "value1"}[{"key2": "value2"}]{"key3": "value3"}"#;
        let results: Vec<Value> = extract_json(text).collect();
        assert_eq!(
            results,
            vec![
                json!({"key1": "value1"}),
                json!([{"key2": "value2"}]),
                json!({"key3": "value3"}),
            ]
        );
    }

    #[test]
    fn test_extract_json_partial_invalid() {
        let text = r#"{"key1": "value1"}invalid[{"key2": "value2"}]{"key3": "value3"}"#;
        let results: Vec<Value> = extract_json(text).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1], json!([{"key2": "value2"}]));
    }

    #[test]
    fn test_skips_broken_fragments() {
        let text = r#"{"hello: oops} then {"ok": true}"#;
        let results: Vec<Value> = extract_json(text).collect();
        assert_eq!(results, vec![json!({"ok": true})]);
    }

    #[test]
    fn test_non_ascii_text() {
        let text = "résumé → {\"naïve\": \"café\"} ✓";
        assert_eq!(
            extract_first_json(text).unwrap(),
            json!({"naïve": "café"})
        );
    }

    #[test]
    fn test_extract_first_json_empty() {
        let err = extract_first_json("").unwrap_err();
        assert!(err.0.starts_with("no JSON found"));
    }

    #[test]
    fn test_parse_first_json() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Verdict {
            approved: bool,
        }

        let verdict: Verdict = parse_first_json("Result: {\"approved\": true}").unwrap();
        assert_eq!(verdict, Verdict { approved: true });

        let wrong_shape = parse_first_json::<Verdict>("{\"approved\": \"yes\"}");
        assert!(wrong_shape.is_err());
    }
}
