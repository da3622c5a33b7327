//! Agent initialization errors

use thiserror::Error;

use lodge_inputs::InputError;
use lodge_schema::FieldError;
use lodge_storage::StorageError;
use lodge_timing::DurationError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent name '{0}' is invalid: letters, digits, and underscores only")]
    InvalidName(String),

    #[error("agent has no fields and no system input to derive them from")]
    NoFields,

    #[error("duplicate field name '{0}'")]
    DuplicateField(String),

    #[error("schema needs at least one time field for retention")]
    NoTimeField,

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("invalid retention: {0}")]
    Retention(#[from] DurationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
