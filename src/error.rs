use std::path::PathBuf;

use thiserror::Error;

/// An imported or pasted schema could not be understood.
///
/// The previously active document is never touched when this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed schema at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

/// Submission was blocked by fields that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid fields: {}", .fields.join(", "))]
pub struct ValidationError {
    /// Offending field names, in document order.
    pub fields: Vec<String>,
}

/// Export, import or clipboard I/O failed.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
}

/// The external "send verification code" action failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to send verification code: {0}")]
pub struct SendActionError(pub String);

/// Unified error type for schemaform operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    SendAction(#[from] SendActionError),

    #[error("no field named `{0}` in the active form")]
    UnknownField(String),

    #[error("no template with id `{0}`")]
    UnknownTemplate(String),
}

pub type Result<T> = std::result::Result<T, Error>;
