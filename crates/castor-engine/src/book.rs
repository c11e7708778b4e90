//! Opening book - plain format, one game's opening moves per line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use castor_core::{Board, Move};
use tracing::{debug, info, warn};

/// Book entry: candidate moves for a position with occurrence counts.
#[derive(Debug, Default)]
struct BookEntry {
    moves: Vec<(u32, u32)>, // (raw move, count)
}

impl BookEntry {
    fn record(&mut self, mv: Move) {
        let raw = mv.raw();
        if let Some(slot) = self.moves.iter_mut().find(|(m, _)| *m == raw) {
            slot.1 += 1;
        } else {
            self.moves.push((raw, 1));
        }
    }

    fn most_common(&self) -> Option<Move> {
        self.moves
            .iter()
            .max_by_key(|(_, count)| *count)
            .map(|(raw, _)| Move::from_raw(*raw))
    }
}

/// Opening book backed by a plain text file.
///
/// Each line is a space-separated sequence of UCI moves from the starting
/// position. Loading is lazy - the first probe parses the file - and failures
/// degrade to an empty book.
pub struct OpeningBook {
    path: PathBuf,
    entries: Mutex<Option<HashMap<u64, BookEntry>>>,
}

impl OpeningBook {
    /// Create a book for the given file; nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> OpeningBook {
        OpeningBook { path: path.into(), entries: Mutex::new(None) }
    }

    /// Parse the backing file on first use.
    pub fn initialize(&self) {
        let mut guard = self.entries.lock().expect("book mutex poisoned");
        if guard.is_some() {
            return;
        }
        *guard = Some(match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let entries = parse_book(&text);
                info!(path = %self.path.display(), positions = entries.len(), "opening book loaded");
                entries
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "opening book unavailable");
                HashMap::new()
            }
        });
    }

    /// Look up a book move for the position, if the book knows it.
    pub fn probe(&self, board: &Board) -> Option<Move> {
        self.initialize();
        let guard = self.entries.lock().expect("book mutex poisoned");
        let entries = guard.as_ref()?;
        let mv = entries.get(&board.hash())?.most_common()?;
        // The move was recorded from this exact position, but re-validate
        // in case of a hash collision.
        if castor_core::is_legal(board, mv) {
            debug!(%mv, "book move found");
            Some(mv)
        } else {
            None
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse the plain book format into position entries.
fn parse_book(text: &str) -> HashMap<u64, BookEntry> {
    let mut entries: HashMap<u64, BookEntry> = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut board = Board::starting_position();
        for token in line.split_whitespace() {
            let Some(mv) = Move::from_uci(token, &board) else {
                // Lines stop being useful at the first unparsable move.
                break;
            };
            if !castor_core::is_legal(&board, mv) {
                break;
            }
            entries.entry(board.hash()).or_default().record(mv);
            board = board.make_move(mv);
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_records_first_moves() {
        let entries = parse_book("e2e4 e7e5 g1f3\ne2e4 c7c5\nd2d4 d7d5\n");
        let start = Board::starting_position();
        let entry = entries.get(&start.hash()).expect("start position in book");
        // e2e4 appears twice, d2d4 once.
        let best = entry.most_common().unwrap();
        assert_eq!(best.to_uci(), "e2e4");
    }

    #[test]
    fn parse_skips_comments_and_garbage() {
        let entries = parse_book("# comment line\n\nzzzz e7e5\n");
        assert!(entries.is_empty());
    }

    #[test]
    fn parse_follows_lines_deep() {
        let entries = parse_book("e2e4 e7e5 g1f3 b8c6\n");
        let mut board = Board::starting_position();
        for expected in ["e2e4", "e7e5", "g1f3", "b8c6"] {
            let entry = entries.get(&board.hash()).expect("position known");
            let mv = entry.most_common().unwrap();
            assert_eq!(mv.to_uci(), expected);
            board = board.make_move(mv);
        }
        assert!(!entries.contains_key(&board.hash()));
    }

    #[test]
    fn missing_file_degrades_to_empty() {
        let book = OpeningBook::new("/nonexistent/book.txt");
        assert!(book.probe(&Board::starting_position()).is_none());
    }
}
