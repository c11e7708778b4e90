//! Pseudo-legal move generation, split into noisy and quiet stages.
//!
//! Generation is pseudo-legal: moves may leave the own king in check, and the
//! search filters them by making the move and testing the king square.
//! Castling is the exception - it is generated fully legal because the
//! through-check conditions are cheap to test at generation time.

use crate::attacks::{
    bishop_attacks, king_attacks, knight_attacks, pawn_attacks, queen_attacks, rook_attacks,
};
use crate::bitboard::Bitboard;
use crate::board::Board;
use crate::castle_rights::CastleRights;
use crate::chess_move::{Move, MoveKind};
use crate::color::Color;
use crate::move_list::MoveList;
use crate::piece::PieceKind;
use crate::square::Square;

const PROMOTION_KINDS: [PieceKind; 4] =
    [PieceKind::Queen, PieceKind::Knight, PieceKind::Rook, PieceKind::Bishop];

/// Generate noisy moves: captures, en passant, and all promotions.
pub fn generate_captures(board: &Board, list: &mut MoveList) {
    let us = board.side_to_move();
    let them_bb = board.side(!us);
    let occupied = board.occupied();

    // Pawn captures and capturing promotions.
    for from in board.pieces(PieceKind::Pawn) & board.side(us) {
        for to in pawn_attacks(us, from) & them_bb {
            let victim = board.piece_on(to);
            if to.rank() == us.promotion_rank() {
                for promo in PROMOTION_KINDS {
                    list.push(Move::new_promotion(from, to, victim, promo));
                }
            } else {
                list.push(Move::new(from, to, PieceKind::Pawn, victim));
            }
        }

        // Non-capturing promotions count as noisy moves too.
        if let Some(to) = from.offset(us.forward())
            && to.rank() == us.promotion_rank()
            && !occupied.contains(to)
        {
            for promo in PROMOTION_KINDS {
                list.push(Move::new_promotion(from, to, None, promo));
            }
        }
    }

    // En passant.
    if let Some(ep) = board.en_passant() {
        for from in pawn_attacks(!us, ep) & board.pieces(PieceKind::Pawn) & board.side(us) {
            list.push(Move::new_en_passant(from, ep));
        }
    }

    // Piece captures.
    for (kind, from, targets) in piece_targets(board, us, occupied) {
        for to in targets & them_bb {
            list.push(Move::new(from, to, kind, board.piece_on(to)));
        }
    }
}

/// Generate quiet moves: non-capturing, non-promoting moves plus castling.
pub fn generate_quiets(board: &Board, list: &mut MoveList) {
    let us = board.side_to_move();
    let occupied = board.occupied();
    let empty = !occupied;

    // Pawn pushes (promotions are generated with the captures).
    for from in board.pieces(PieceKind::Pawn) & board.side(us) {
        let Some(one) = from.offset(us.forward()) else { continue };
        if occupied.contains(one) || one.rank() == us.promotion_rank() {
            continue;
        }
        list.push(Move::new(from, one, PieceKind::Pawn, None));
        if from.rank() == us.pawn_rank()
            && let Some(two) = one.offset(us.forward())
            && !occupied.contains(two)
        {
            list.push(Move::new(from, two, PieceKind::Pawn, None));
        }
    }

    // Quiet piece moves.
    for (kind, from, targets) in piece_targets(board, us, occupied) {
        for to in targets & empty {
            list.push(Move::new(from, to, kind, None));
        }
    }

    generate_castles(board, list);
}

/// Generate all pseudo-legal moves, noisy first.
pub fn generate_pseudo_legal(board: &Board, list: &mut MoveList) {
    generate_captures(board, list);
    generate_quiets(board, list);
}

/// Generate the quiescence move set.
///
/// In check every reply is generated so that quiescence can detect mates;
/// otherwise only noisy moves are searched.
pub fn generate_qsearch(board: &Board, list: &mut MoveList) {
    if board.in_check() {
        generate_pseudo_legal(board, list);
    } else {
        generate_captures(board, list);
    }
}

/// Iterator over (kind, from, attack set) for the non-pawn pieces of `us`.
fn piece_targets(
    board: &Board,
    us: Color,
    occupied: Bitboard,
) -> impl Iterator<Item = (PieceKind, Square, Bitboard)> + '_ {
    let own = board.side(us);
    [PieceKind::Knight, PieceKind::Bishop, PieceKind::Rook, PieceKind::Queen, PieceKind::King]
        .into_iter()
        .flat_map(move |kind| {
            (board.pieces(kind) & own).map(move |from| {
                let targets = match kind {
                    PieceKind::Knight => knight_attacks(from),
                    PieceKind::Bishop => bishop_attacks(from, occupied),
                    PieceKind::Rook => rook_attacks(from, occupied),
                    PieceKind::Queen => queen_attacks(from, occupied),
                    _ => king_attacks(from),
                };
                (kind, from, targets)
            })
        })
}

/// Generate legal castling moves for the side to move.
fn generate_castles(board: &Board, list: &mut MoveList) {
    let us = board.side_to_move();
    let them = !us;
    let occupied = board.occupied();

    let (king_from, kingside_path, queenside_path, kingside_to, queenside_to, queenside_b_file) =
        match us {
            Color::White => (
                Square::E1,
                [Square::F1, Square::G1],
                [Square::D1, Square::C1],
                Square::G1,
                Square::C1,
                Square::B1,
            ),
            Color::Black => (
                Square::E8,
                [Square::F8, Square::G8],
                [Square::D8, Square::C8],
                Square::G8,
                Square::C8,
                Square::B8,
            ),
        };

    if board.king_square(us) != king_from || board.is_attacked(king_from, them) {
        return;
    }

    if board.castling().allows(CastleRights::kingside(us))
        && !kingside_path.iter().any(|&sq| occupied.contains(sq))
        && !kingside_path.iter().any(|&sq| board.is_attacked(sq, them))
    {
        list.push(Move::new_castle(king_from, kingside_to));
    }

    if board.castling().allows(CastleRights::queenside(us))
        && !occupied.contains(queenside_b_file)
        && !queenside_path.iter().any(|&sq| occupied.contains(sq))
        && !queenside_path.iter().any(|&sq| board.is_attacked(sq, them))
    {
        list.push(Move::new_castle(king_from, queenside_to));
    }
}

/// Return `true` if the mover's king is attacked in the successor position.
#[inline]
pub fn left_in_check(parent: &Board, child: &Board) -> bool {
    let mover = parent.side_to_move();
    child.is_attacked(child.king_square(mover), !mover)
}

/// Return `true` if `mv` is pseudo-legal AND does not leave the king in check.
pub fn is_legal(board: &Board, mv: Move) -> bool {
    is_pseudo_legal(board, mv) && !left_in_check(board, &board.make_move(mv))
}

/// Generate all strictly legal moves.
pub fn generate_legal(board: &Board) -> MoveList {
    let mut pseudo = MoveList::new();
    generate_pseudo_legal(board, &mut pseudo);

    let mut legal = MoveList::new();
    for mv in pseudo.iter() {
        if !left_in_check(board, &board.make_move(mv)) {
            legal.push(mv);
        }
    }
    legal
}

/// Return `true` if the side to move has at least one legal move.
pub fn has_legal_move(board: &Board) -> bool {
    let mut pseudo = MoveList::new();
    generate_pseudo_legal(board, &mut pseudo);
    pseudo
        .iter()
        .any(|mv| !left_in_check(board, &board.make_move(mv)))
}

/// Validate a move from an external source (TT, killers, PV) against the
/// current position.
///
/// Hash collisions and stale killers can yield moves that no longer fit the
/// board; those must be rejected before they are made.
pub fn is_pseudo_legal(board: &Board, mv: Move) -> bool {
    if mv.is_none() {
        return false;
    }
    let us = board.side_to_move();
    let from = mv.from();
    let to = mv.to();

    if board.piece_on(from) != Some(mv.piece()) || board.color_on(from) != Some(us) {
        return false;
    }

    match mv.kind() {
        MoveKind::Castling => {
            let mut castles = MoveList::new();
            generate_castles(board, &mut castles);
            castles.contains(mv)
        }
        MoveKind::EnPassant => {
            board.en_passant() == Some(to) && pawn_attacks(us, from).contains(to)
        }
        MoveKind::Normal | MoveKind::Promotion => {
            match mv.captured() {
                Some(victim) => {
                    if board.piece_on(to) != Some(victim) || board.color_on(to) != Some(!us) {
                        return false;
                    }
                }
                None => {
                    if board.occupied().contains(to) {
                        return false;
                    }
                }
            }

            if mv.piece() == PieceKind::Pawn {
                // Promotions and only promotions land on the last rank.
                if (to.rank() == us.promotion_rank()) != (mv.kind() == MoveKind::Promotion) {
                    return false;
                }
                if mv.is_capture() {
                    return pawn_attacks(us, from).contains(to);
                }
                if from.offset(us.forward()) == Some(to) {
                    return true;
                }
                if from.rank() == us.pawn_rank() {
                    let one = from.offset(us.forward()).expect("pawn rank push stays on board");
                    return one.offset(us.forward()) == Some(to) && !board.occupied().contains(one);
                }
                return false;
            }

            if mv.kind() == MoveKind::Promotion {
                return false;
            }

            let occupied = board.occupied();
            let targets = match mv.piece() {
                PieceKind::Knight => knight_attacks(from),
                PieceKind::Bishop => bishop_attacks(from, occupied),
                PieceKind::Rook => rook_attacks(from, occupied),
                PieceKind::Queen => queen_attacks(from, occupied),
                PieceKind::King => king_attacks(from),
                PieceKind::Pawn => unreachable!("handled above"),
            };
            targets.contains(to)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_legal_moves_at_start() {
        let board = Board::starting_position();
        assert_eq!(generate_legal(&board).len(), 20);
    }

    #[test]
    fn no_captures_at_start() {
        let board = Board::starting_position();
        let mut captures = MoveList::new();
        generate_captures(&board, &mut captures);
        assert!(captures.is_empty());
    }

    #[test]
    fn qsearch_moves_are_noisy_when_not_in_check() {
        let board: Board = "4k3/8/8/4p3/3Q4/8/8/4K3 w - - 0 1".parse().unwrap();
        let mut list = MoveList::new();
        generate_qsearch(&board, &mut list);
        assert!(list.iter().all(|m| m.is_capture() || m.is_promotion()));
        assert!(list.iter().any(|m| m.captured() == Some(PieceKind::Pawn)));
    }

    #[test]
    fn qsearch_in_check_generates_evasions() {
        // White king checked by a rook; quiet king steps must be included.
        let board: Board = "4k3/8/8/8/8/8/4r3/4K3 w - - 0 1".parse().unwrap();
        let mut list = MoveList::new();
        generate_qsearch(&board, &mut list);
        assert!(list.iter().any(|m| m.is_quiet()));
    }

    #[test]
    fn castling_generated_when_clear() {
        let board: Board = "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1".parse().unwrap();
        let legal = generate_legal(&board);
        assert!(legal.contains(Move::new_castle(Square::E1, Square::G1)));
        assert!(legal.contains(Move::new_castle(Square::E1, Square::C1)));
    }

    #[test]
    fn castling_blocked_through_check() {
        // Black rook on f8 covers f1 through the open file.
        let board: Board = "r3kr2/pppppp1p/8/8/8/8/PPPPPP1P/R3K2R w KQkq - 0 1".parse().unwrap();
        let legal = generate_legal(&board);
        assert!(!legal.contains(Move::new_castle(Square::E1, Square::G1)));
        assert!(legal.contains(Move::new_castle(Square::E1, Square::C1)));
    }

    #[test]
    fn castling_not_generated_in_check() {
        // Black queen on e6 checks the white king down the open e-file.
        let board: Board = "r3k2r/pppp1ppp/4q3/8/8/8/PPPP1PPP/R3K2R w KQkq - 0 1"
            .parse()
            .unwrap();
        assert!(board.in_check());
        let legal = generate_legal(&board);
        assert!(!legal.iter().any(|m| m.kind() == MoveKind::Castling && m.from() == Square::E1));
    }

    #[test]
    fn en_passant_is_generated() {
        let board: Board = "rnbqkbnr/ppp1pppp/8/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3"
            .parse()
            .unwrap();
        let legal = generate_legal(&board);
        assert!(legal.iter().any(|m| m.kind() == MoveKind::EnPassant));
    }

    #[test]
    fn promotions_cover_four_pieces() {
        let board: Board = "8/3P4/6K1/8/8/1k6/8/8 w - - 0 1".parse().unwrap();
        let mut noisy = MoveList::new();
        generate_captures(&board, &mut noisy);
        let promos: Vec<Move> = noisy.iter().filter(|m| m.is_promotion()).collect();
        assert_eq!(promos.len(), 4);
    }

    #[test]
    fn legal_filter_respects_pins() {
        // White bishop on d2 is pinned to the king by a rook on d8; every
        // bishop move leaves the d-file and is illegal.
        let board: Board = "3r2k1/8/8/8/8/8/3B4/3K4 w - - 0 1".parse().unwrap();
        let d2 = Square::from_algebraic("d2").unwrap();
        let legal = generate_legal(&board);
        assert!(!legal.iter().any(|m| m.from() == d2));
    }

    #[test]
    fn stalemate_has_no_legal_moves() {
        let board: Board = "k7/2K5/1Q6/8/8/8/8/8 b - - 0 1".parse().unwrap();
        assert!(!has_legal_move(&board));
        assert!(!board.in_check());
    }

    #[test]
    fn checkmate_has_no_legal_moves() {
        let board: Board = "7k/6Q1/5K2/8/8/8/8/8 b - - 0 1".parse().unwrap();
        assert!(!has_legal_move(&board));
        assert!(board.in_check());
    }

    #[test]
    fn pseudo_legal_validation_accepts_generated_moves() {
        let positions = [
            crate::fen::STARTING_FEN,
            "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1",
            "rnbqkbnr/ppp1pppp/8/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3",
            "8/3P4/6K1/8/8/1k6/8/8 w - - 0 1",
        ];
        for fen in positions {
            let board: Board = fen.parse().unwrap();
            let mut all = MoveList::new();
            generate_pseudo_legal(&board, &mut all);
            for mv in all.iter() {
                assert!(is_pseudo_legal(&board, mv), "{mv} rejected in {fen}");
            }
        }
    }

    #[test]
    fn pseudo_legal_validation_rejects_foreign_moves() {
        let board = Board::starting_position();
        // Knight jump that does not exist.
        assert!(!is_pseudo_legal(
            &board,
            Move::new(Square::B1, Square::at(3, 1).offset(16).unwrap(), PieceKind::Knight, None)
        ));
        // Queen cannot move through her own pawns.
        assert!(!is_pseudo_legal(
            &board,
            Move::new(Square::D1, Square::D8, PieceKind::Queen, Some(PieceKind::Queen))
        ));
        // Sentinel.
        assert!(!is_pseudo_legal(&board, Move::NONE));
    }
}
