//! Line parsers
//!
//! Both parsers turn one log line into a raw `map<string,string>`. The
//! plain parser matches a regex anywhere in the line and keeps only named
//! captures; the JSON parser flattens one object per line, stringifying
//! scalars. "No record" (a non-matching plain line) is not an error; a
//! malformed JSON line is.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

use crate::error::InputError;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON line: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JSON line is not an object")]
    NotObject,

    #[error("empty JSON record")]
    EmptyRecord,
}

/// One log line in, one raw record out. `Ok(None)` means the line carries
/// no record and is silently skipped.
pub trait LineParser: Send + Sync {
    fn parse(&self, line: &str) -> Result<Option<HashMap<String, String>>, ParseError>;
}

/// Regex parser with named capture groups.
pub struct PlainParser {
    re: Regex,
}

impl PlainParser {
    pub fn new(pattern: &str) -> Result<Self, InputError> {
        let re = Regex::new(pattern).map_err(InputError::LineRegex)?;
        Ok(Self { re })
    }
}

impl LineParser for PlainParser {
    fn parse(&self, line: &str) -> Result<Option<HashMap<String, String>>, ParseError> {
        let Some(caps) = self.re.captures(line) else {
            return Ok(None);
        };

        let mut result = HashMap::new();
        for name in self.re.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                result.insert(name.to_string(), m.as_str().to_string());
            }
        }

        // A match without named groups carries nothing.
        if result.is_empty() {
            return Ok(None);
        }

        Ok(Some(result))
    }
}

/// JSON-object-per-line parser.
#[derive(Debug, Default)]
pub struct JsonParser;

impl LineParser for JsonParser {
    fn parse(&self, line: &str) -> Result<Option<HashMap<String, String>>, ParseError> {
        let value: serde_json::Value = serde_json::from_str(line)?;

        let object = value.as_object().ok_or(ParseError::NotObject)?;
        if object.is_empty() {
            return Err(ParseError::EmptyRecord);
        }

        let mut result = HashMap::with_capacity(object.len());
        for (key, value) in object {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            result.insert(key.clone(), text);
        }

        Ok(Some(result))
    }
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod parser_test;
