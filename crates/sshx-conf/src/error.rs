//! Configuration errors.

use std::path::PathBuf;

/// Errors raised while loading, editing or persisting node settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfError {
    /// Reading or writing a file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON for [`crate::Settings`]
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// `set` was called with a field name that does not exist or cannot be set from a string
    #[error("unknown or unsupported settings field: {0}")]
    UnknownField(String),

    /// `set` was called with a value that does not parse for the field
    #[error("invalid value {value:?} for field {field}")]
    InvalidValue { field: String, value: String },

    /// Serializing the settings record failed
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ConfError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for configuration operations
pub type ConfResult<T> = Result<T, ConfError>;
