//! Error types shared by the capability prober and the providers.

use thiserror::Error;

/// Why a capability could not be acquired at startup.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("not supported on {0}")]
    Unsupported(&'static str),

    #[error("`{0}` not found on PATH")]
    ToolMissing(String),

    #[error("no GPU detected")]
    NoDevice,

    #[error("initialization failed: {0}")]
    Init(String),
}

/// Failure of a single provider query. Rendered as an `unavailable` field,
/// never propagated past the section that issued the query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("not supported on this platform")]
    Unsupported,

    #[error("`{program}` failed: {reason}")]
    Command { program: String, reason: String },

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {0}")]
    Parse(String),

    #[error("{0} not reported")]
    Missing(&'static str),

    #[error("process {0} exited during sampling")]
    Vanished(u32),
}

pub type QueryResult<T> = Result<T, QueryError>;

impl QueryError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        QueryError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(what: impl Into<String>) -> Self {
        QueryError::Parse(what.into())
    }
}
