//! Lodge - Record schema
//!
//! The typed record model shared by inputs, storage, and the HTTP surface:
//!
//! - [`value`] - the runtime value types a record cell can hold.
//! - [`field`] - declarative field specs compiled into typed converters.
//! - [`timestamp`] - text timestamp layouts producing epoch milliseconds.
//! - [`template`] - the `{{.field}}` micro-template for derived string fields.
//!
//! A schema is an ordered list of fields. Raw input is a `map<string,string>`;
//! each field projects one typed cell out of it, substituting a per-type
//! default when the source is missing or unconvertible.

pub mod field;
pub mod template;
pub mod timestamp;
pub mod value;

pub use field::{CompiledField, Field, FieldError, FieldType};
pub use template::{Template, TemplateError};
pub use timestamp::{TimestampError, TimestampFormat, TimestampParser};
pub use value::{Record, Value};
