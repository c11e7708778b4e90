//! Transposition table with aged, depth-preferred replacement.

use castor_core::Move;

use crate::eval::CHECKMATE_THRESHOLD;

/// Bound type carried by a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    /// Empty slot.
    None = 0,
    /// Exact score (PV node).
    Exact = 1,
    /// Lower bound - the search failed high here (beta cutoff).
    Lower = 2,
    /// Upper bound - the search never raised alpha here.
    Upper = 3,
}

impl Bound {
    const fn from_bits(bits: u8) -> Bound {
        match bits & 0x03 {
            1 => Bound::Exact,
            2 => Bound::Lower,
            3 => Bound::Upper,
            _ => Bound::None,
        }
    }
}

/// One table slot - exactly 16 bytes.
///
/// Layout:
/// - `key`: upper 32 bits of the Zobrist hash, for collision detection
/// - `mv`: raw 32-bit move encoding
/// - `score`: mate-normalized search score
/// - `depth`: remaining depth the score was computed with
/// - `info`: bound (2 bits) | mate threat (1 bit) | generation (5 bits)
#[derive(Clone, Copy)]
#[repr(C)]
struct TtEntry {
    key: u32,
    mv: u32,
    score: i16,
    depth: u8,
    info: u8,
    _padding: u32,
}

impl TtEntry {
    const EMPTY: TtEntry = TtEntry { key: 0, mv: 0, score: 0, depth: 0, info: 0, _padding: 0 };

    fn pack_info(bound: Bound, mate_threat: bool, generation: u8) -> u8 {
        (bound as u8) | ((mate_threat as u8) << 2) | ((generation & 0x1F) << 3)
    }

    fn bound(&self) -> Bound {
        Bound::from_bits(self.info)
    }

    fn mate_threat(&self) -> bool {
        self.info & 0x04 != 0
    }

    fn generation(&self) -> u8 {
        self.info >> 3
    }
}

/// Data returned by a successful probe.
#[derive(Debug, Clone, Copy)]
pub struct TtProbe {
    /// Best move recorded for this position (may be [`Move::NONE`]).
    pub best_move: Move,
    /// Remaining depth the entry was computed with.
    pub depth: u8,
    /// Bound type of the stored score.
    pub bound: Bound,
    /// Score translated back to be relative to the probing ply.
    pub score: i32,
    /// A null-move search detected a mate threat at this position.
    pub mate_threat: bool,
}

/// Normalize a score for storage.
///
/// Mate scores encode distance from the root; the same position reached at a
/// different ply would get a different value. Storing them as distance from
/// the current node makes the entry reusable anywhere in the tree.
pub fn score_to_tt(score: i32, ply: usize) -> i16 {
    let adjusted = if score >= CHECKMATE_THRESHOLD {
        score + ply as i32
    } else if score <= -CHECKMATE_THRESHOLD {
        score - ply as i32
    } else {
        score
    };
    adjusted as i16
}

/// Undo the normalization applied by [`score_to_tt`] at the probing ply.
pub fn score_from_tt(score: i16, ply: usize) -> i32 {
    let score = score as i32;
    if score >= CHECKMATE_THRESHOLD {
        score - ply as i32
    } else if score <= -CHECKMATE_THRESHOLD {
        score + ply as i32
    } else {
        score
    }
}

/// Fixed-size open-addressed transposition table.
pub struct TranspositionTable {
    entries: Box<[TtEntry]>,
    mask: u64,
    generation: u8,
}

impl TranspositionTable {
    /// Create a table fitting `mb` megabytes, rounded down to a power of two
    /// of entries.
    pub fn new(mb: usize) -> TranspositionTable {
        let bytes = mb.max(1) * 1024 * 1024;
        let entry_size = std::mem::size_of::<TtEntry>();
        let mut num_entries = (bytes / entry_size).next_power_of_two();
        if num_entries * entry_size > bytes {
            num_entries >>= 1;
        }
        let num_entries = num_entries.max(1);

        TranspositionTable {
            entries: vec![TtEntry::EMPTY; num_entries].into_boxed_slice(),
            mask: (num_entries - 1) as u64,
            generation: 0,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Wipe all entries and restart the generation counter.
    pub fn clear(&mut self) {
        self.entries.fill(TtEntry::EMPTY);
        self.generation = 0;
    }

    /// Advance the generation counter; called once per search so stale
    /// entries lose their replacement protection.
    pub fn age_entries(&mut self) {
        self.generation = self.generation.wrapping_add(1) & 0x1F;
    }

    /// Look up a position. The score comes back relative to `ply`.
    pub fn probe(&self, hash: u64, ply: usize) -> Option<TtProbe> {
        let entry = &self.entries[(hash & self.mask) as usize];
        if entry.bound() == Bound::None || entry.key != (hash >> 32) as u32 {
            return None;
        }
        Some(TtProbe {
            best_move: Move::from_raw(entry.mv),
            depth: entry.depth,
            bound: entry.bound(),
            score: score_from_tt(entry.score, ply),
            mate_threat: entry.mate_threat(),
        })
    }

    /// Store a search result.
    ///
    /// Replacement policy, in priority order:
    /// 1. empty slot - store
    /// 2. same position - replace unless the stored entry is exact at
    ///    strictly greater depth
    /// 3. different position - replace entries from older generations, else
    ///    only when the new depth is at least the stored depth
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &mut self,
        hash: u64,
        score: i32,
        bound: Bound,
        depth: u8,
        best_move: Move,
        mate_threat: bool,
        ply: usize,
    ) {
        let index = (hash & self.mask) as usize;
        let key = (hash >> 32) as u32;
        let existing = &self.entries[index];

        let replace = if existing.bound() == Bound::None {
            true
        } else if existing.key == key {
            !(existing.bound() == Bound::Exact && existing.depth > depth)
        } else {
            existing.generation() != self.generation || depth >= existing.depth
        };
        if !replace {
            return;
        }

        self.entries[index] = TtEntry {
            key,
            mv: best_move.raw(),
            score: score_to_tt(score, ply),
            depth,
            info: TtEntry::pack_info(bound, mate_threat, self.generation),
            _padding: 0,
        };
    }

    /// Occupied fraction in permille, sampled over the first slots
    /// (UCI `hashfull`).
    pub fn hashfull(&self) -> u32 {
        let sample = self.entries.len().min(1000);
        let used = self.entries[..sample]
            .iter()
            .filter(|e| e.bound() != Bound::None)
            .count();
        (used * 1000 / sample) as u32
    }
}

impl std::fmt::Debug for TranspositionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranspositionTable")
            .field("entries", &self.entries.len())
            .field("generation", &self.generation)
            .finish()
    }
}
