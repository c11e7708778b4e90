//! UCI protocol errors.

/// Errors raised while parsing UCI input.
///
/// Per protocol convention these are never fatal: the engine logs the line
/// and carries on.
#[derive(Debug, thiserror::Error)]
pub enum UciError {
    /// The `position` command lacks the `startpos` or `fen` keyword.
    #[error("malformed position command: expected startpos or fen")]
    MalformedPosition,

    /// The FEN string did not parse.
    #[error("invalid FEN: {fen}")]
    InvalidFen {
        /// The FEN that failed.
        fen: String,
    },

    /// A `go` parameter is missing its value.
    #[error("missing value for go parameter {param}")]
    MissingGoValue {
        /// The parameter name.
        param: String,
    },

    /// A `go` parameter value did not parse.
    #[error("invalid value for go parameter {param}: {value}")]
    InvalidGoValue {
        /// The parameter name.
        param: String,
        /// The offending value.
        value: String,
    },

    /// A `setoption` command without a name.
    #[error("setoption without a name")]
    MissingOptionName,

    /// An I/O error on stdin.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying error.
        #[from]
        source: std::io::Error,
    },
}
