//! Static evaluation: material, piece-square tables, and game phase.

use castor_core::{Board, Color, PieceKind};

/// Upper bound on any score the search can produce.
pub const MAX: i32 = 30_000;
/// Lower bound on any score the search can produce.
pub const MIN: i32 = -MAX;
/// Base mate score; actual mate values are `CHECKMATE - ply`.
pub const CHECKMATE: i32 = 29_000;
/// Scores at or above this magnitude encode a forced mate.
pub const CHECKMATE_THRESHOLD: i32 = CHECKMATE - 512;
/// Score of a drawn position.
pub const DRAW: i32 = 0;

/// Contempt in centipawns at full middlegame, scaled down by game phase.
pub const CONTEMPT_FACTOR: i32 = 20;

/// Game phase with every officer on the board.
pub const GAME_PHASE_MAX: i32 = 24;

/// Side-to-move bonus.
const TEMPO: i32 = 10;

/// Return `true` if `value` encodes a forced mate for either side.
#[inline]
pub fn is_checkmate_value(value: i32) -> bool {
    value.abs() >= CHECKMATE_THRESHOLD && value.abs() <= CHECKMATE
}

/// Phase contribution per piece kind (pawns and kings carry none).
#[inline]
fn phase_weight(kind: PieceKind) -> i32 {
    match kind {
        PieceKind::Knight | PieceKind::Bishop => 1,
        PieceKind::Rook => 2,
        PieceKind::Queen => 4,
        _ => 0,
    }
}

/// Game phase in `0..=GAME_PHASE_MAX`; 0 is a bare endgame.
pub fn game_phase(board: &Board) -> i32 {
    let mut phase = 0;
    for kind in [PieceKind::Knight, PieceKind::Bishop, PieceKind::Rook, PieceKind::Queen] {
        phase += phase_weight(kind) * board.pieces(kind).count() as i32;
    }
    phase.min(GAME_PHASE_MAX)
}

/// Score a repetition from the side to move's viewpoint.
///
/// Slightly negative while pieces remain on the board, so the engine avoids
/// drawing by repetition out of positions it might still win.
pub fn contempt(board: &Board) -> i32 {
    -(game_phase(board) * CONTEMPT_FACTOR) / GAME_PHASE_MAX
}

// Piece-square tables from White's perspective, a1 at index 0.
#[rustfmt::skip]
const PAWN_PST: [i32; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
      5,  10,  10, -20, -20,  10,  10,   5,
      5,  -5, -10,   0,   0, -10,  -5,   5,
      0,   0,   0,  20,  20,   0,   0,   0,
      5,   5,  10,  25,  25,  10,   5,   5,
     10,  10,  20,  30,  30,  20,  10,  10,
     50,  50,  50,  50,  50,  50,  50,  50,
      0,   0,   0,   0,   0,   0,   0,   0,
];

#[rustfmt::skip]
const KNIGHT_PST: [i32; 64] = [
    -50, -40, -30, -30, -30, -30, -40, -50,
    -40, -20,   0,   5,   5,   0, -20, -40,
    -30,   5,  10,  15,  15,  10,   5, -30,
    -30,   0,  15,  20,  20,  15,   0, -30,
    -30,   5,  15,  20,  20,  15,   5, -30,
    -30,   0,  10,  15,  15,  10,   0, -30,
    -40, -20,   0,   0,   0,   0, -20, -40,
    -50, -40, -30, -30, -30, -30, -40, -50,
];

#[rustfmt::skip]
const BISHOP_PST: [i32; 64] = [
    -20, -10, -10, -10, -10, -10, -10, -20,
    -10,   5,   0,   0,   0,   0,   5, -10,
    -10,  10,  10,  10,  10,  10,  10, -10,
    -10,   0,  10,  10,  10,  10,   0, -10,
    -10,   5,   5,  10,  10,   5,   5, -10,
    -10,   0,   5,  10,  10,   5,   0, -10,
    -10,   0,   0,   0,   0,   0,   0, -10,
    -20, -10, -10, -10, -10, -10, -10, -20,
];

#[rustfmt::skip]
const ROOK_PST: [i32; 64] = [
      0,   0,   0,   5,   5,   0,   0,   0,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
      5,  10,  10,  10,  10,  10,  10,   5,
      0,   0,   0,   0,   0,   0,   0,   0,
];

#[rustfmt::skip]
const QUEEN_PST: [i32; 64] = [
    -20, -10, -10,  -5,  -5, -10, -10, -20,
    -10,   0,   5,   0,   0,   0,   0, -10,
    -10,   5,   5,   5,   5,   5,   0, -10,
      0,   0,   5,   5,   5,   5,   0,  -5,
     -5,   0,   5,   5,   5,   5,   0,  -5,
    -10,   0,   5,   5,   5,   5,   0, -10,
    -10,   0,   0,   0,   0,   0,   0, -10,
    -20, -10, -10,  -5,  -5, -10, -10, -20,
];

#[rustfmt::skip]
const KING_MID_PST: [i32; 64] = [
     20,  30,  10,   0,   0,  10,  30,  20,
     20,  20,   0,   0,   0,   0,  20,  20,
    -10, -20, -20, -20, -20, -20, -20, -10,
    -20, -30, -30, -40, -40, -30, -30, -20,
    -30, -40, -40, -50, -50, -40, -40, -30,
    -30, -40, -40, -50, -50, -40, -40, -30,
    -30, -40, -40, -50, -50, -40, -40, -30,
    -30, -40, -40, -50, -50, -40, -40, -30,
];

#[rustfmt::skip]
const KING_END_PST: [i32; 64] = [
    -50, -30, -30, -30, -30, -30, -30, -50,
    -30, -30,   0,   0,   0,   0, -30, -30,
    -30, -10,  20,  30,  30,  20, -10, -30,
    -30, -10,  30,  40,  40,  30, -10, -30,
    -30, -10,  30,  40,  40,  30, -10, -30,
    -30, -10,  20,  30,  30,  20, -10, -30,
    -30, -20, -10,   0,   0, -10, -20, -30,
    -50, -40, -30, -20, -20, -30, -40, -50,
];

fn pst(kind: PieceKind, index: usize, phase: i32) -> i32 {
    match kind {
        PieceKind::Pawn => PAWN_PST[index],
        PieceKind::Knight => KNIGHT_PST[index],
        PieceKind::Bishop => BISHOP_PST[index],
        PieceKind::Rook => ROOK_PST[index],
        PieceKind::Queen => QUEEN_PST[index],
        PieceKind::King => {
            // Blend the king tables by phase.
            (KING_MID_PST[index] * phase + KING_END_PST[index] * (GAME_PHASE_MAX - phase))
                / GAME_PHASE_MAX
        }
    }
}

/// Evaluate the position in centipawns from the side to move's perspective.
pub fn evaluate(board: &Board) -> i32 {
    let phase = game_phase(board);
    let mut score = board.material(Color::White) - board.material(Color::Black);

    for kind in PieceKind::ALL {
        for sq in board.pieces(kind) & board.side(Color::White) {
            score += pst(kind, sq.index(), phase);
        }
        for sq in board.pieces(kind) & board.side(Color::Black) {
            score -= pst(kind, sq.flip().index(), phase);
        }
    }

    let score = if board.side_to_move() == Color::White { score } else { -score };
    score + TEMPO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startpos_is_near_balanced() {
        let board = Board::starting_position();
        let score = evaluate(&board);
        assert!(score.abs() <= 2 * TEMPO, "start eval {score} should be near zero");
    }

    #[test]
    fn evaluation_is_symmetric() {
        let board = Board::starting_position();
        let white_view = evaluate(&board);
        let black_view = evaluate(&board.make_null_move());
        assert_eq!(white_view, black_view, "mirrored views must agree at start");
    }

    #[test]
    fn extra_queen_dominates() {
        let board: Board = "3qk3/8/8/8/8/8/8/4K3 b - - 0 1".parse().unwrap();
        assert!(evaluate(&board) > 800, "side to move with extra queen should be winning");
    }

    #[test]
    fn phase_bounds() {
        assert_eq!(game_phase(&Board::starting_position()), GAME_PHASE_MAX);
        let bare: Board = "4k3/8/8/8/8/8/8/4K3 w - - 0 1".parse().unwrap();
        assert_eq!(game_phase(&bare), 0);
    }

    #[test]
    fn contempt_scales_with_phase() {
        assert_eq!(contempt(&Board::starting_position()), -CONTEMPT_FACTOR);
        let bare: Board = "4k3/8/8/8/8/8/8/4K3 w - - 0 1".parse().unwrap();
        assert_eq!(contempt(&bare), 0);
    }

    #[test]
    fn mate_value_detection() {
        assert!(is_checkmate_value(CHECKMATE - 5));
        assert!(is_checkmate_value(-(CHECKMATE - 12)));
        assert!(!is_checkmate_value(2_000));
        assert!(!is_checkmate_value(0));
    }
}
