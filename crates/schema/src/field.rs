//! Field definitions
//!
//! A [`Field`] is the declarative schema element as it appears in an agent's
//! configuration. Compiling it produces a [`CompiledField`] holding a typed
//! converter; the spec itself is never mutated, so agent initialization is
//! idempotent.
//!
//! Exactly one conversion mode is active per field: plain projection (by
//! `source`, defaulting to the field name), a template, or a timestamp
//! layout. A timestamp forces the `time` type; a template forces `string`.
//!
//! Conversion is soft: a missing source or an unconvertible value yields
//! `None`, and the writer substitutes the per-type default.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::template::{Template, TemplateError};
use crate::timestamp::{TimestampError, TimestampFormat, TimestampParser};
use crate::value::Value;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("field name is required")]
    MissingName,

    #[error("field '{0}': template and timestamp are mutually exclusive")]
    ConflictingModes(String),

    #[error("field '{name}': invalid template: {source}")]
    Template {
        name: String,
        #[source]
        source: TemplateError,
    },

    #[error("field '{name}': invalid timestamp format: {source}")]
    Timestamp {
        name: String,
        #[source]
        source: TimestampError,
    },
}

/// Logical field type. The storage layer maps these onto physical column
/// types; `time` values are epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Time,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Time => "time",
        }
    }
}

/// Declarative field spec.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Field {
    /// Name of the field in the stored record.
    pub name: String,

    /// Source key in the raw record. Defaults to `name`.
    #[serde(default)]
    pub source: Option<String>,

    /// Field type: "string" (default), "int", "float", or "time".
    #[serde(default, rename = "type")]
    pub kind: Option<FieldType>,

    /// Template producing the value from other raw fields. Implies `string`.
    #[serde(default)]
    pub template: Option<String>,

    /// Timestamp layout for parsing the source. Implies `time`.
    #[serde(default)]
    pub timestamp: Option<TimestampFormat>,

    /// Human-readable description, surfaced by schema introspection.
    #[serde(default)]
    pub description: Option<String>,
}

impl Field {
    /// Shorthand for a plain projected field of the given type.
    pub fn new(name: &str, kind: FieldType) -> Self {
        Self {
            name: name.to_string(),
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Shorthand with a description attached.
    pub fn described(name: &str, kind: FieldType, description: &str) -> Self {
        Self {
            description: Some(description.to_string()),
            ..Self::new(name, kind)
        }
    }

    /// Validate the spec and build its typed converter.
    pub fn compile(&self) -> Result<CompiledField, FieldError> {
        if self.name.is_empty() {
            return Err(FieldError::MissingName);
        }

        if self.template.is_some() && self.timestamp.is_some() {
            return Err(FieldError::ConflictingModes(self.name.clone()));
        }

        let source = self
            .source
            .clone()
            .unwrap_or_else(|| self.name.clone());

        if let Some(format) = &self.timestamp {
            let parser = format.compile().map_err(|source| FieldError::Timestamp {
                name: self.name.clone(),
                source,
            })?;
            return Ok(self.compiled(FieldType::Time, Converter::Time { source, parser }));
        }

        if let Some(template) = &self.template {
            let template =
                Template::compile(template).map_err(|source| FieldError::Template {
                    name: self.name.clone(),
                    source,
                })?;
            return Ok(self.compiled(FieldType::String, Converter::Template(template)));
        }

        match self.kind.unwrap_or(FieldType::String) {
            FieldType::String => Ok(self.compiled(FieldType::String, Converter::Str { source })),
            FieldType::Int => Ok(self.compiled(FieldType::Int, Converter::Int { source })),
            FieldType::Float => Ok(self.compiled(FieldType::Float, Converter::Float { source })),
            FieldType::Time => {
                // `type: time` without an explicit layout reads rfc3339.
                let parser = TimestampFormat::default()
                    .compile()
                    .map_err(|source| FieldError::Timestamp {
                        name: self.name.clone(),
                        source,
                    })?;
                Ok(self.compiled(FieldType::Time, Converter::Time { source, parser }))
            }
        }
    }

    fn compiled(&self, kind: FieldType, converter: Converter) -> CompiledField {
        CompiledField {
            name: self.name.clone(),
            kind,
            description: self.description.clone(),
            converter,
        }
    }
}

#[derive(Debug, Clone)]
enum Converter {
    Str { source: String },
    Int { source: String },
    Float { source: String },
    Time { source: String, parser: TimestampParser },
    Template(Template),
}

/// A field with its converter resolved; immutable once built.
#[derive(Debug, Clone)]
pub struct CompiledField {
    name: String,
    kind: FieldType,
    description: Option<String>,
    converter: Converter,
}

impl CompiledField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldType {
        self.kind
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The zero value for this field's type.
    pub fn default_value(&self) -> Value {
        match self.kind {
            FieldType::String => Value::Str(String::new()),
            FieldType::Int | FieldType::Time => Value::Int(0),
            FieldType::Float => Value::Float(0.0),
        }
    }

    /// Project a typed value out of a raw record. Missing sources and
    /// conversion failures are absent, not errors.
    pub fn convert(&self, data: &HashMap<String, String>) -> Option<Value> {
        match &self.converter {
            Converter::Str { source } => data.get(source).map(|v| Value::Str(v.clone())),
            Converter::Int { source } => {
                data.get(source).and_then(|v| v.parse::<i64>().ok()).map(Value::Int)
            }
            Converter::Float { source } => data
                .get(source)
                .and_then(|v| v.parse::<f64>().ok())
                .map(Value::Float),
            Converter::Time { source, parser } => data
                .get(source)
                .and_then(|v| parser.convert(v).ok())
                .map(Value::Int),
            Converter::Template(template) => template.render(data).ok().map(Value::Str),
        }
    }
}

#[cfg(test)]
#[path = "field_test.rs"]
mod field_test;
