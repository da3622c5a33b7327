//! Input configuration errors
//!
//! All of these surface at startup and are fatal; steady-state failures in
//! the inputs are soft and logged instead.

use thiserror::Error;

use lodge_timing::duration::DurationError;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("file input path is required")]
    MissingPath,

    #[error("file input path must be absolute: {0}")]
    RelativePath(String),

    #[error("invalid filename pattern: {0}")]
    Pattern(#[source] regex::Error),

    #[error("regex is required for the plain format")]
    MissingRegex,

    #[error("invalid line regex: {0}")]
    LineRegex(#[source] regex::Error),

    #[error("unsupported format '{0}'")]
    UnknownFormat(String),

    #[error("invalid rotation size '{0}'")]
    RotationSize(String),

    #[error("rotation method is required")]
    MissingRotationMethod,

    #[error("unsupported rotation method '{0}'")]
    UnknownRotationMethod(String),

    #[error("run command is required for the rename rotation method")]
    RenameRequiresRun,

    #[error("offsets file '{path}': {source}")]
    OffsetsIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("offsets file '{path}': {source}")]
    OffsetsParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid interval: {0}")]
    Interval(#[from] DurationError),

    #[error("resolve network interface: {0}")]
    NetworkInterface(String),
}
