//! FEN parsing and formatting.

use std::str::FromStr;

use crate::board::Board;
use crate::castle_rights::CastleRights;
use crate::color::Color;
use crate::error::FenError;
use crate::piece::{Piece, PieceKind};
use crate::square::Square;

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl FromStr for Board {
    type Err = FenError;

    /// Parse a FEN string.
    ///
    /// The halfmove clock and fullmove number are optional and default to
    /// `0` and `1`. A fullmove number of `0` (seen in some GUIs) is clamped
    /// to `1`.
    fn from_str(fen: &str) -> Result<Board, FenError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(FenError::TooFewFields { fen: fen.to_string() });
        }

        let mut board = Board::empty();

        // Field 1: piece placement, ranks 8 down to 1.
        let placement_err = || FenError::InvalidPlacement {
            placement: fields[0].to_string(),
        };
        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(placement_err());
        }
        for (i, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - i as u8;
            let mut file = 0u8;
            for c in rank_str.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as u8;
                    if file > 8 {
                        return Err(placement_err());
                    }
                } else {
                    let piece = Piece::from_fen_char(c).ok_or_else(|| placement_err())?;
                    if file >= 8 {
                        return Err(placement_err());
                    }
                    board.put_piece(Square::at(file, rank), piece);
                    file += 1;
                }
            }
            if file != 8 {
                return Err(placement_err());
            }
        }

        for color in [Color::White, Color::Black] {
            if (board.pieces(PieceKind::King) & board.side(color)).count() != 1 {
                return Err(FenError::MissingKing);
            }
        }

        // Field 2: side to move.
        board.side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => {
                return Err(FenError::InvalidSideToMove { field: other.to_string() });
            }
        };

        // Field 3: castling rights.
        board.castling = CastleRights::from_fen(fields[2]).ok_or_else(|| {
            FenError::InvalidCastling { field: fields[2].to_string() }
        })?;

        // Field 4: en passant target.
        board.en_passant = match fields[3] {
            "-" => None,
            s => Some(Square::from_algebraic(s).ok_or_else(|| {
                FenError::InvalidEnPassant { field: s.to_string() }
            })?),
        };

        // Fields 5 and 6: counters, optional.
        board.halfmove_clock = match fields.get(4) {
            Some(s) => s.parse().map_err(|_| FenError::InvalidCounter { field: s.to_string() })?,
            None => 0,
        };
        board.fullmove_number = match fields.get(5) {
            Some(s) => {
                let n: u16 =
                    s.parse().map_err(|_| FenError::InvalidCounter { field: s.to_string() })?;
                n.max(1)
            }
            None => 1,
        };

        board.rehash();
        Ok(board)
    }
}

impl Board {
    /// Render the position as a FEN string.
    pub fn to_fen(&self) -> String {
        let mut fen = String::with_capacity(80);

        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                let sq = Square::at(file, rank);
                match (self.piece_on(sq), self.color_on(sq)) {
                    (Some(kind), Some(color)) => {
                        if empty > 0 {
                            fen.push((b'0' + empty) as char);
                            empty = 0;
                        }
                        fen.push(Piece::new(kind, color).fen_char());
                    }
                    _ => empty += 1,
                }
            }
            if empty > 0 {
                fen.push((b'0' + empty) as char);
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(if self.side_to_move() == Color::White { 'w' } else { 'b' });
        fen.push(' ');
        fen.push_str(&self.castling().to_string());
        fen.push(' ');
        match self.en_passant() {
            Some(sq) => fen.push_str(&sq.to_string()),
            None => fen.push('-'),
        }
        fen.push_str(&format!(" {} {}", self.halfmove_clock(), self.fullmove_number()));

        fen
    }
}
