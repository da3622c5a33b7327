//! `{{.field}}` micro-template
//!
//! Renders a string from a string-keyed map with dotted field access, e.g.
//! `{{.level}}: {{.message}}`. The template is compiled once into literal
//! and field segments; rendering a missing field is an error, which the
//! field layer turns into an absent value.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed '{{{{' in template")]
    Unclosed,

    #[error("invalid placeholder '{0}': expected '{{{{.field}}}}'")]
    InvalidPlaceholder(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Compile a template string, validating every placeholder.
    pub fn compile(input: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = input;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }

            let tail = &rest[open + 2..];
            let close = tail.find("}}").ok_or(TemplateError::Unclosed)?;
            let inner = tail[..close].trim();

            let name = inner
                .strip_prefix('.')
                .filter(|name| !name.is_empty() && !name.contains(['{', '}', '.']))
                .ok_or_else(|| TemplateError::InvalidPlaceholder(inner.to_string()))?;

            segments.push(Segment::Field(name.to_string()));
            rest = &tail[close + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Render the template against a raw record.
    pub fn render(&self, data: &HashMap<String, String>) -> Result<String, TemplateError> {
        let mut out = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = data
                        .get(name)
                        .ok_or_else(|| TemplateError::UnknownField(name.clone()))?;
                    out.push_str(value);
                }
            }
        }

        Ok(out)
    }
}
