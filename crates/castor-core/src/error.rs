//! Core error types.

/// Errors produced while parsing a FEN string.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FenError {
    /// The FEN has fewer than the four mandatory fields.
    #[error("FEN has too few fields: {fen}")]
    TooFewFields {
        /// The offending FEN string.
        fen: String,
    },

    /// The piece placement field is malformed.
    #[error("invalid piece placement: {placement}")]
    InvalidPlacement {
        /// The placement field that failed to parse.
        placement: String,
    },

    /// The side-to-move field is not "w" or "b".
    #[error("invalid side to move: {field}")]
    InvalidSideToMove {
        /// The offending field.
        field: String,
    },

    /// The castling field contains characters outside "KQkq-".
    #[error("invalid castling rights: {field}")]
    InvalidCastling {
        /// The offending field.
        field: String,
    },

    /// The en passant field is neither "-" nor a valid square.
    #[error("invalid en passant square: {field}")]
    InvalidEnPassant {
        /// The offending field.
        field: String,
    },

    /// A move counter field is not a number.
    #[error("invalid move counter: {field}")]
    InvalidCounter {
        /// The offending field.
        field: String,
    },

    /// The placement lacks exactly one king per side.
    #[error("position must have exactly one king per side")]
    MissingKing,
}
