//! Search mode - the configuration of one `go` command.

use std::time::Duration;

use castor_core::Color;

/// Maximum nominal search depth.
pub const MAX_DEPTH: u8 = 127;

/// Everything a `go` command can ask for.
///
/// UCI allows the parameters to combine (`go ponder wtime ... btime ...`), so
/// this is a field bag with constructors for the common shapes rather than an
/// exclusive enum.
#[derive(Debug, Clone, Default)]
pub struct SearchMode {
    /// White's remaining clock time.
    pub white_time: Option<Duration>,
    /// Black's remaining clock time.
    pub black_time: Option<Duration>,
    /// White's increment per move.
    pub white_inc: Option<Duration>,
    /// Black's increment per move.
    pub black_inc: Option<Duration>,
    /// Moves until the next time control.
    pub moves_to_go: Option<u32>,
    /// Fixed search duration.
    pub move_time: Option<Duration>,
    /// Depth limit.
    pub depth: Option<u8>,
    /// Node budget.
    pub nodes: Option<u64>,
    /// Search for a mate in this many moves.
    pub mate: Option<u8>,
    /// Search until `stop`.
    pub infinite: bool,
    /// Start in pondering mode.
    pub ponder: bool,
    /// Run perft to this depth instead of searching.
    pub perft: Option<u8>,
    /// Restrict the root to these moves (UCI strings).
    pub search_moves: Vec<String>,
}

impl SearchMode {
    /// `go infinite`.
    pub fn infinite() -> SearchMode {
        SearchMode { infinite: true, ..Default::default() }
    }

    /// `go depth D`.
    pub fn fixed_depth(depth: u8) -> SearchMode {
        SearchMode { depth: Some(depth), ..Default::default() }
    }

    /// `go nodes N`.
    pub fn fixed_nodes(nodes: u64) -> SearchMode {
        SearchMode { nodes: Some(nodes), ..Default::default() }
    }

    /// `go movetime T`.
    pub fn fixed_time(move_time: Duration) -> SearchMode {
        SearchMode { move_time: Some(move_time), ..Default::default() }
    }

    /// `go perft D`.
    pub fn perft(depth: u8) -> SearchMode {
        SearchMode { perft: Some(depth), ..Default::default() }
    }

    /// `go mate M`.
    pub fn mate(mate: u8) -> SearchMode {
        SearchMode { mate: Some(mate), ..Default::default() }
    }

    /// Remaining time for the given side, if the mode carries clocks.
    pub fn remaining_time(&self, side: Color) -> Option<Duration> {
        match side {
            Color::White => self.white_time,
            Color::Black => self.black_time,
        }
    }

    /// Increment for the given side.
    pub fn increment(&self, side: Color) -> Duration {
        let inc = match side {
            Color::White => self.white_inc,
            Color::Black => self.black_inc,
        };
        inc.unwrap_or(Duration::ZERO)
    }

    /// Return `true` when the search must watch a clock.
    pub fn is_time_control(&self) -> bool {
        !self.infinite
            && (self.move_time.is_some()
                || self.white_time.is_some()
                || self.black_time.is_some())
    }

    /// Maximum iteration depth for this mode.
    pub fn max_depth(&self) -> u8 {
        self.depth.unwrap_or(MAX_DEPTH).clamp(1, MAX_DEPTH)
    }

    /// Return `true` for a perft run.
    pub fn is_perft(&self) -> bool {
        self.perft.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_single_fields() {
        assert!(SearchMode::infinite().infinite);
        assert_eq!(SearchMode::fixed_depth(6).depth, Some(6));
        assert_eq!(SearchMode::fixed_nodes(5_000).nodes, Some(5_000));
        assert_eq!(SearchMode::perft(4).perft, Some(4));
        assert_eq!(SearchMode::mate(3).mate, Some(3));
    }

    #[test]
    fn time_control_detection() {
        assert!(!SearchMode::infinite().is_time_control());
        assert!(!SearchMode::fixed_depth(6).is_time_control());
        assert!(SearchMode::fixed_time(Duration::from_millis(500)).is_time_control());

        let clock = SearchMode {
            white_time: Some(Duration::from_secs(60)),
            black_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        assert!(clock.is_time_control());
    }

    #[test]
    fn max_depth_clamps() {
        assert_eq!(SearchMode::fixed_depth(0).max_depth(), 1);
        assert_eq!(SearchMode::infinite().max_depth(), MAX_DEPTH);
        assert_eq!(SearchMode::fixed_depth(200).max_depth(), MAX_DEPTH);
    }

    #[test]
    fn side_dependent_clock() {
        let mode = SearchMode {
            white_time: Some(Duration::from_secs(100)),
            black_time: Some(Duration::from_secs(50)),
            white_inc: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        assert_eq!(mode.remaining_time(Color::White), Some(Duration::from_secs(100)));
        assert_eq!(mode.remaining_time(Color::Black), Some(Duration::from_secs(50)));
        assert_eq!(mode.increment(Color::White), Duration::from_secs(2));
        assert_eq!(mode.increment(Color::Black), Duration::ZERO);
    }
}
