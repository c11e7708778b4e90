//! Core chess types: board representation, move generation, and game rules.

mod attacks;
mod bitboard;
mod board;
mod castle_rights;
mod chess_move;
mod color;
mod error;
mod fen;
mod make_move;
mod move_list;
mod movegen;
mod perft;
mod piece;
mod square;
mod zobrist;

pub use bitboard::Bitboard;
pub use board::Board;
pub use castle_rights::CastleRights;
pub use chess_move::{Move, MoveKind};
pub use color::Color;
pub use error::FenError;
pub use fen::STARTING_FEN;
pub use move_list::{MAX_MOVES, MoveList};
pub use movegen::{
    generate_captures, generate_legal, generate_pseudo_legal, generate_qsearch, generate_quiets,
    has_legal_move, is_legal, is_pseudo_legal, left_in_check,
};
pub use perft::{PerftReport, perft, perft_divide, perft_report};
pub use piece::{Piece, PieceKind};
pub use square::Square;
