use std::path::PathBuf;

/// Stable error taxonomy surfaced by every layer of the registry.
///
/// The facade never swallows an error from the core; it forwards these
/// kinds unchanged so RPC/CLI collaborators can map them to exit codes or
/// wire error codes without inspecting message text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("missing metadata: {0}")]
    MissingMetadata(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("schema mismatch for table {table}: {detail}")]
    SchemaMismatch { table: String, detail: String },

    #[error("transaction aborted: {message}")]
    TransactionAborted {
        message: String,
        #[source]
        source: Box<Error>,
    },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn missing_metadata(what: impl Into<String>) -> Self {
        Error::MissingMetadata(what.into())
    }

    pub fn invalid_input(what: impl Into<String>) -> Self {
        Error::InvalidInput(what.into())
    }

    pub fn transaction_aborted(message: impl Into<String>, source: Error) -> Self {
        Error::TransactionAborted {
            message: message.into(),
            source: Box::new(source),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
