//! Search driver: worker thread lifecycle and iterative deepening.

pub mod counters;
pub mod negamax;
pub mod ordering;
pub mod tt;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

use castor_core::{Board, Move, generate_legal, perft_report};
use tracing::{debug, info, warn};

use crate::book::OpeningBook;
use crate::eval::{CHECKMATE, DRAW, MAX, MIN, is_checkmate_value};
use crate::mode::SearchMode;
use crate::search::negamax::SearchRunner;
use crate::search::tt::{Bound, TranspositionTable};
use crate::time::{SearchControl, configure_control};

/// First iteration depth that searches with an aspiration window.
const ASPIRATION_START_DEPTH: u8 = 4;
/// First iteration depth that may use MTD(f).
const MTDF_START_DEPTH: u8 = 2;
/// Aspiration half-width of the first window.
const ASPIRATION_WINDOW: i32 = 30;
/// Aspiration half-width after the first window failed.
const ASPIRATION_WIDE_WINDOW: i32 = 200;

/// Search feature toggles and sizes, applied at the start of each search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Transposition table size in MiB.
    pub hash_size_mb: usize,
    /// Use the transposition table.
    pub use_tt: bool,
    /// Principal-variation search (null-window siblings).
    pub use_pvs: bool,
    /// Killer move ordering.
    pub use_killers: bool,
    /// Reverse futility pruning.
    pub use_rfp: bool,
    /// Null-move pruning.
    pub use_nmp: bool,
    /// Verify null-move cutoffs with a reduced re-search.
    pub use_verify_nmp: bool,
    /// Razoring into quiescence.
    pub use_razoring: bool,
    /// Limited razoring at the pre-pre-frontier.
    pub use_limited_razoring: bool,
    /// Extended futility pruning.
    pub use_efp: bool,
    /// Futility pruning.
    pub use_fp: bool,
    /// Late-move pruning.
    pub use_lmp: bool,
    /// Late-move reductions.
    pub use_lmr: bool,
    /// Quiescence search.
    pub use_quiescence: bool,
    /// Aspiration windows in iterative deepening.
    pub use_aspiration: bool,
    /// MTD(f) driver instead of aspiration.
    pub use_mtdf: bool,
    /// Consult the opening book for time-controlled searches.
    pub use_book: bool,
    /// Emit `info currline` updates.
    pub show_curr_line: bool,
}

impl Default for SearchConfig {
    fn default() -> SearchConfig {
        SearchConfig {
            hash_size_mb: 64,
            use_tt: true,
            use_pvs: true,
            use_killers: true,
            use_rfp: true,
            use_nmp: true,
            use_verify_nmp: true,
            use_razoring: true,
            use_limited_razoring: true,
            use_efp: true,
            use_fp: true,
            use_lmp: true,
            use_lmr: true,
            use_quiescence: true,
            use_aspiration: true,
            use_mtdf: false,
            use_book: false,
            show_curr_line: false,
        }
    }
}

/// Receiver of search output, implemented by the protocol layer.
///
/// The search holds a non-owning handle and never knows what is behind it;
/// the engine owns the search and the sink.
pub trait SearchSink: Send + Sync {
    /// One `info` payload (without the `info ` prefix).
    fn send_info(&self, info: &str);
    /// The final result of a search; emitted exactly once per search.
    fn send_result(&self, result: &SearchResult);
}

/// Result of a completed (or aborted) search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Best move found; [`Move::NONE`] when the position has no legal move.
    pub best_move: Move,
    /// Expected reply, for pondering.
    pub ponder_move: Option<Move>,
    /// Score in centipawns, or a mate-distance encoding.
    pub value: i32,
    /// Deepest regular ply reached.
    pub depth: u8,
    /// Deepest ply including quiescence.
    pub extra_depth: u8,
    /// Wall time spent.
    pub time: Duration,
    /// Nodes visited.
    pub nodes: u64,
}

/// A root move with the value of its last full search.
#[derive(Debug, Clone, Copy)]
pub struct RootMove {
    /// The move.
    pub mv: Move,
    /// Value from the most recent iteration that searched it.
    pub value: i32,
}

/// Format a score for UCI output (`score cp ...` or `score mate ...`).
pub(crate) fn score_string(value: i32) -> String {
    if is_checkmate_value(value) {
        let moves_to_mate = (CHECKMATE - value.abs() + 1) / 2;
        let sign = if value < 0 { "-" } else { "" };
        format!("score mate {sign}{moves_to_mate}")
    } else {
        format!("score cp {value}")
    }
}

/// The search facade owned by the engine.
///
/// `start_search` launches a worker thread and returns once the worker is
/// up; `stop_search` requests termination and joins. All search state
/// (transposition table included) lives in the [`SearchRunner`], which
/// shuttles between the facade and the worker thread so nothing is locked on
/// the hot path.
pub struct Search {
    config: SearchConfig,
    sink: Arc<dyn SearchSink>,
    book: Arc<OpeningBook>,
    runner: Option<Box<SearchRunner>>,
    handle: Option<JoinHandle<Box<SearchRunner>>>,
    control: Option<Arc<SearchControl>>,
    last_result: Arc<Mutex<Option<SearchResult>>>,
    held_result: Arc<Mutex<Option<SearchResult>>>,
}

impl Search {
    /// Create a search with the default configuration.
    pub fn new(sink: Arc<dyn SearchSink>) -> Search {
        Search::with_config(SearchConfig::default(), sink)
    }

    /// Create a search with an explicit configuration.
    pub fn with_config(config: SearchConfig, sink: Arc<dyn SearchSink>) -> Search {
        let runner = Box::new(SearchRunner::new(config.clone(), Arc::clone(&sink)));
        Search {
            config,
            sink,
            book: Arc::new(OpeningBook::new("book.txt")),
            runner: Some(runner),
            handle: None,
            control: None,
            last_result: Arc::new(Mutex::new(None)),
            held_result: Arc::new(Mutex::new(None)),
        }
    }

    /// Mutable access to the configuration; applied on the next search.
    pub fn config_mut(&mut self) -> &mut SearchConfig {
        &mut self.config
    }

    /// Launch a search asynchronously.
    ///
    /// `game_history` holds the Zobrist hashes of every position of the game
    /// before `board`, for repetition detection across the root.
    ///
    /// Calling this while a search runs is an illegal state: the call is
    /// logged and rejected, the running search continues.
    pub fn start_search(&mut self, board: &Board, game_history: Vec<u64>, mode: SearchMode) {
        if self.is_searching() {
            warn!("start_search while a search is running - rejected");
            return;
        }
        self.join_worker(false);

        let mut runner = self.runner.take().expect("runner is home when idle");
        runner.config = self.config.clone();

        let stopped = Arc::new(AtomicBool::new(false));
        let control = Arc::new(configure_control(&mode, board.side_to_move(), stopped));
        debug!(?mode, "starting search");
        runner.prepare(mode, Arc::clone(&control), game_history);
        self.control = Some(control);

        let board = *board;
        let book = Arc::clone(&self.book);
        let sink = Arc::clone(&self.sink);
        let last_result = Arc::clone(&self.last_result);
        let held_result = Arc::clone(&self.held_result);
        let (latch_tx, latch_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(format!("search-{}", board.side_to_move()))
            .spawn(move || {
                let mut runner = runner;
                let _ = latch_tx.send(());

                let result = run_worker(&mut runner, &board, &book);
                *last_result.lock().expect("result mutex poisoned") = Some(result.clone());

                // An unresolved ponder search holds its result until the
                // controller sees a ponderhit or a stop.
                if runner.control.is_pondering() {
                    debug!("ponder search finished early - holding result");
                    *held_result.lock().expect("held mutex poisoned") = Some(result);
                } else {
                    sink.send_result(&result);
                }
                runner
            })
            .expect("spawn search worker");
        self.handle = Some(handle);

        // Wait until the worker has published its initial state.
        let _ = latch_rx.recv();
    }

    /// Request a graceful stop and wait for the worker to exit.
    ///
    /// Idempotent: stopping an idle or already-stopped search does nothing
    /// and leaves the last result untouched.
    pub fn stop_search(&mut self) {
        let Some(control) = self.control.clone() else {
            return;
        };
        control.request_stop();
        self.join_worker(true);
    }

    /// Convert an in-flight ponder search into a normal timed search.
    pub fn ponder_hit(&mut self) {
        let Some(control) = self.control.clone() else {
            warn!("ponderhit while no search is running");
            return;
        };
        if !control.is_pondering() {
            warn!("ponderhit while not pondering");
            return;
        }
        control.activate();
        info!("ponderhit - clock started");
        if !self.is_searching() {
            // The ponder search already finished; release the held result.
            self.join_worker(true);
        }
    }

    /// Return `true` while the worker thread is alive.
    pub fn is_searching(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Block until the current search (if any) has finished.
    pub fn wait_while_searching(&mut self) {
        self.join_worker(true);
    }

    /// Reset for a new game: clears the transposition table.
    pub fn new_game(&mut self) {
        if self.is_searching() {
            warn!("new_game while searching - rejected");
            return;
        }
        self.join_worker(false);
        if let Some(runner) = &mut self.runner {
            runner.tt.clear();
        }
    }

    /// Clear the transposition table (the `Clear_Hash` button).
    pub fn clear_hash(&mut self) {
        self.new_game();
    }

    /// Resize the transposition table; takes effect immediately when idle.
    pub fn resize_tt(&mut self, mb: usize) {
        if self.is_searching() {
            warn!("hash resize while searching - rejected");
            return;
        }
        self.join_worker(false);
        let mb = mb.clamp(1, 1024);
        self.config.hash_size_mb = mb;
        if let Some(runner) = &mut self.runner {
            runner.tt = TranspositionTable::new(mb);
        }
        info!(hash_mb = mb, "transposition table resized");
    }

    /// The most recent search result, if any search has completed.
    pub fn last_search_result(&self) -> Option<SearchResult> {
        self.last_result.lock().expect("result mutex poisoned").clone()
    }

    /// Join a finished (or stopping) worker and reclaim the runner.
    ///
    /// When `emit_held` is set, a result held by an early-finished ponder
    /// search is sent to the sink; otherwise it is discarded.
    fn join_worker(&mut self, emit_held: bool) {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(runner) => self.runner = Some(runner),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        self.control = None;

        let held = self.held_result.lock().expect("held mutex poisoned").take();
        if let Some(result) = held {
            if emit_held {
                self.sink.send_result(&result);
            } else {
                debug!("discarding unclaimed ponder result");
            }
        }
    }
}

/// Worker entry: book, perft, or iterative deepening.
fn run_worker(runner: &mut SearchRunner, board: &Board, book: &OpeningBook) -> SearchResult {
    if let Some(depth) = runner.mode.perft {
        return runner.run_perft(board, depth);
    }

    if runner.config.use_book
        && runner.mode.is_time_control()
        && let Some(mv) = book.probe(board)
    {
        info!(%mv, "playing book move");
        runner.had_book_move = true;
        return SearchResult {
            best_move: mv,
            ponder_move: None,
            value: 0,
            depth: 0,
            extra_depth: 0,
            time: runner.control.elapsed(),
            nodes: 0,
        };
    }

    runner.iterative_deepening(board)
}

/// Move the entry for `mv` to the head of the root list, keeping order.
fn move_to_head(moves: &mut Vec<RootMove>, mv: Move) {
    if let Some(pos) = moves.iter().position(|rm| rm.mv == mv) {
        let rm = moves.remove(pos);
        moves.insert(0, rm);
    }
}

impl SearchRunner {
    /// Iterative-deepening driver (spec terms: the outer search loop).
    pub(crate) fn iterative_deepening(&mut self, board: &Board) -> SearchResult {
        let mut best_value: Option<i32> = None;

        // Game over at the root: report and bail.
        let legal = generate_legal(board);
        if legal.is_empty() {
            let value = if board.in_check() { -CHECKMATE } else { DRAW };
            return SearchResult {
                best_move: Move::NONE,
                ponder_move: None,
                value,
                depth: 0,
                extra_depth: 0,
                time: self.control.elapsed(),
                nodes: 0,
            };
        }

        // The move right after leaving the book deserves a longer think.
        if self.had_book_move {
            self.had_book_move = false;
            self.control.add_extra_time(2.0);
        }

        // Seed the PV (and possibly skip iterations) from the TT.
        let mut start_depth: u8 = 1;
        if self.config.use_tt
            && let Some(hit) = self.tt.probe(board.hash(), 0)
            && !hit.best_move.is_none()
        {
            let pv = self.pv_from_tt(board, hit.depth.max(1));
            if !pv.is_empty() {
                self.pv[0] = pv;
                self.counters.current_best_root_move =
                    self.pv[0].first().expect("seeded PV is non-empty");
                if hit.bound == Bound::Exact {
                    best_value = Some(hit.score);
                    self.counters.current_best_root_value = hit.score;
                    if hit.depth >= start_depth {
                        start_depth = hit.depth.saturating_add(1).min(self.mode.max_depth());
                        debug!(tt_depth = hit.depth, start_depth, "root TT hit, skipping depths");
                        self.counters.current_iteration_depth = hit.depth;
                        self.send_iteration_info("");
                    }
                }
            }
        }

        // Root move list, restricted by `searchmoves` when given.
        self.root_moves = legal
            .iter()
            .filter(|mv| {
                self.mode.search_moves.is_empty()
                    || self.mode.search_moves.iter().any(|s| s == &mv.to_string())
            })
            .map(|mv| RootMove { mv, value: MIN })
            .collect();
        if self.root_moves.is_empty() {
            warn!("searchmoves matched no legal move - ignoring the restriction");
            self.root_moves = legal.iter().map(|mv| RootMove { mv, value: MIN }).collect();
        }
        if let Some(first) = self.pv[0].first() {
            move_to_head(&mut self.root_moves, first);
        }
        if self.pv[0].is_empty() {
            self.pv[0].push(self.root_moves[0].mv);
        }

        // A forced move needs no deep search; shrink the budget.
        self.single_reply[0] = self.root_moves.len() == 1;
        if self.single_reply[0] && self.mode.is_time_control() {
            self.control.add_extra_time(1.5);
        }

        let max_depth = self.mode.max_depth();
        let mut depth = start_depth;
        loop {
            self.counters.current_iteration_depth = depth;
            self.counters.best_move_changes = 0;

            let value = if self.config.use_mtdf
                && depth >= MTDF_START_DEPTH
                && let Some(guess) = best_value
            {
                self.mtdf(board, guess, depth as i32)
            } else if self.config.use_aspiration
                && depth >= ASPIRATION_START_DEPTH
                && let Some(prior) = best_value
            {
                self.aspiration(board, depth as i32, prior)
            } else {
                self.search(board, depth as i32, 0, MIN, MAX, true, true)
            };

            // A stopped iteration's value is unreliable; keep the last one.
            if !self.control.is_stopped() {
                best_value = Some(value);
            }

            if let Some(first) = self.pv[0].first() {
                self.counters.current_best_root_move = first;
            }
            if let Some(v) = best_value {
                self.counters.current_best_root_value = v;
            }
            self.send_iteration_info("");

            // An unstable iteration (many best-move changes) earns more time.
            if depth > 4 && self.counters.best_move_changes > (depth as u32) / 2 + 1 {
                self.control.add_extra_time(1.4);
            }

            // Mate search: stop once a mate within the requested distance is
            // proven.
            if let Some(mate) = self.mode.mate
                && let Some(v) = best_value
                && v >= CHECKMATE - 2 * mate as i32
            {
                debug!(value = v, "requested mate proven");
                break;
            }

            if self.control.is_stopped()
                || self.control.soft_limit_reached()
                || self.control.hard_limit_reached()
                || depth >= max_depth
            {
                break;
            }

            // Reorder the root for the next iteration: by value, PV first.
            self.root_moves.sort_by(|a, b| b.value.cmp(&a.value));
            if let Some(first) = self.pv[0].first() {
                move_to_head(&mut self.root_moves, first);
            }

            depth += 1;
        }

        SearchResult {
            best_move: self.pv[0].first().unwrap_or(Move::NONE),
            ponder_move: self.pv[0].get(1),
            value: best_value.unwrap_or(DRAW),
            depth: self.counters.current_search_depth,
            extra_depth: self.counters.current_extra_search_depth,
            time: self.control.elapsed(),
            nodes: self.counters.nodes_visited,
        }
    }

    /// Aspiration-window search around the previous iteration's value.
    ///
    /// Window ladder: ±30, then ±200 on the failed side, then the full
    /// window. A stop during a failed window returns the prior best value.
    fn aspiration(&mut self, board: &Board, depth: i32, prior: i32) -> i32 {
        let mut alpha = MIN.max(prior - ASPIRATION_WINDOW);
        let mut beta = MAX.min(prior + ASPIRATION_WINDOW);
        let mut value = self.search(board, depth, 0, alpha, beta, true, true);

        if self.control.is_stopped() && (value <= alpha || value >= beta) {
            return prior;
        }

        if value <= alpha {
            // Fail low: the opponent found something; widen down, think longer.
            self.counters.aspiration_researches += 1;
            self.send_iteration_info(" upperbound");
            self.control.add_extra_time(1.3);
            alpha = MIN.max(prior - ASPIRATION_WIDE_WINDOW);
            value = self.search(board, depth, 0, alpha, beta, true, true);
        } else if value >= beta {
            self.counters.aspiration_researches += 1;
            self.send_iteration_info(" lowerbound");
            beta = MAX.min(prior + ASPIRATION_WIDE_WINDOW);
            value = self.search(board, depth, 0, alpha, beta, true, true);
        }

        if self.control.is_stopped() && (value <= alpha || value >= beta) {
            return prior;
        }

        if value <= alpha || value >= beta {
            self.counters.aspiration_researches += 1;
            self.send_iteration_info(if value <= alpha { " upperbound" } else { " lowerbound" });
            if value <= alpha {
                self.control.add_extra_time(1.3);
            }
            value = self.search(board, depth, 0, MIN, MAX, true, true);
        }

        if self.control.is_stopped() { prior } else { value }
    }

    /// MTD(f): zero-window probes converging on the minimax value.
    fn mtdf(&mut self, board: &Board, first_guess: i32, depth: i32) -> i32 {
        let mut g = first_guess;
        let mut upper = MAX;
        let mut lower = MIN;
        let mut probes = 0u32;
        while lower < upper {
            let beta = if g == lower { g + 1 } else { g };
            g = self.search(board, depth, 0, beta - 1, beta, true, true);
            if g < beta {
                upper = g;
            } else {
                lower = g;
            }
            probes += 1;
            if self.control.is_stopped() {
                break;
            }
        }
        debug!(value = g, probes, "mtdf converged");
        g
    }

    /// Run a perft count and report it over the info channel.
    pub(crate) fn run_perft(&mut self, board: &Board, depth: u8) -> SearchResult {
        info!(depth, "perft search");
        let report = perft_report(board, depth as u32);
        self.counters.nodes_visited = report.nodes;

        let elapsed = self.control.elapsed();
        let elapsed_ms = elapsed.as_millis().max(1) as u64;
        self.sink.send_info(&format!(
            "string perft {} nodes {} captures {} enpassant {} checks {} mates {} time {} nps {}",
            depth,
            report.nodes,
            report.captures,
            report.en_passant,
            report.checks,
            report.checkmates,
            elapsed_ms,
            report.nodes * 1000 / elapsed_ms,
        ));

        SearchResult {
            best_move: Move::NONE,
            ponder_move: None,
            value: 0,
            depth,
            extra_depth: depth,
            time: elapsed,
            nodes: report.nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::CHECKMATE_THRESHOLD;
    use std::sync::atomic::Ordering;

    /// Sink that records everything for assertions.
    #[derive(Default)]
    struct CollectingSink {
        infos: Mutex<Vec<String>>,
        results: Mutex<Vec<SearchResult>>,
    }

    impl SearchSink for CollectingSink {
        fn send_info(&self, info: &str) {
            self.infos.lock().unwrap().push(info.to_string());
        }
        fn send_result(&self, result: &SearchResult) {
            self.results.lock().unwrap().push(result.clone());
        }
    }

    fn make_search() -> (Search, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let mut config = SearchConfig::default();
        config.hash_size_mb = 8;
        (Search::with_config(config, sink.clone()), sink)
    }

    fn search_to_depth(board: &Board, depth: u8) -> (SearchResult, Arc<CollectingSink>) {
        let (mut search, sink) = make_search();
        search.start_search(board, Vec::new(), SearchMode::fixed_depth(depth));
        search.wait_while_searching();
        (search.last_search_result().expect("search produced a result"), sink)
    }

    #[test]
    fn depth_1_returns_legal_move() {
        let board = Board::starting_position();
        let (result, _) = search_to_depth(&board, 1);
        assert!(!result.best_move.is_none());
        assert!(generate_legal(&board).contains(result.best_move));
    }

    #[test]
    fn finds_mate_in_one() {
        // Scholar's mate: Qxf7# is available.
        let board: Board = "r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4"
            .parse()
            .unwrap();
        let (result, _) = search_to_depth(&board, 2);
        assert_eq!(result.best_move.to_uci(), "h5f7");
        assert!(result.value > CHECKMATE_THRESHOLD, "score {} should be mate", result.value);
    }

    #[test]
    fn mate_in_one_survives_deep_search() {
        // Deeper searches pull in NMP, LMR and aspiration; the mate must hold.
        let board: Board = "r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4"
            .parse()
            .unwrap();
        let (result, _) = search_to_depth(&board, 6);
        assert_eq!(result.best_move.to_uci(), "h5f7");
        assert!(result.value > CHECKMATE_THRESHOLD);
    }

    #[test]
    fn stalemate_scores_zero_and_no_move() {
        let board: Board = "k7/2K5/1Q6/8/8/8/8/8 b - - 0 1".parse().unwrap();
        let (result, _) = search_to_depth(&board, 3);
        assert!(result.best_move.is_none());
        assert_eq!(result.value, DRAW);
    }

    #[test]
    fn mated_position_reports_mate_against() {
        let board: Board = "7k/6Q1/5K2/8/8/8/8/8 b - - 0 1".parse().unwrap();
        let (result, _) = search_to_depth(&board, 2);
        assert!(result.best_move.is_none());
        assert_eq!(result.value, -CHECKMATE);
    }

    #[test]
    fn exactly_one_result_per_search() {
        let board = Board::starting_position();
        let (mut search, sink) = make_search();
        search.start_search(&board, Vec::new(), SearchMode::fixed_depth(3));
        search.wait_while_searching();
        assert_eq!(sink.results.lock().unwrap().len(), 1);

        search.start_search(&board, Vec::new(), SearchMode::fixed_depth(2));
        search.wait_while_searching();
        assert_eq!(sink.results.lock().unwrap().len(), 2);
    }

    #[test]
    fn iteration_info_covers_every_depth() {
        let board = Board::starting_position();
        let (result, sink) = search_to_depth(&board, 6);
        assert!(!result.best_move.is_none());

        let infos = sink.infos.lock().unwrap();
        let mut depths_seen = Vec::new();
        for line in infos.iter() {
            if let Some(rest) = line.strip_prefix("depth ")
                && line.contains(" pv ")
                && let Some(depth_str) = rest.split_whitespace().next()
                && let Ok(d) = depth_str.parse::<u8>()
                && !depths_seen.contains(&d)
            {
                depths_seen.push(d);
            }
        }
        for d in 1..=6u8 {
            assert!(depths_seen.contains(&d), "missing iteration info for depth {d}: {depths_seen:?}");
        }
    }

    #[test]
    fn pv_first_move_is_best_move() {
        let board = Board::starting_position();
        let (result, sink) = search_to_depth(&board, 4);
        assert!(result.ponder_move.is_some(), "depth-4 PV should carry a reply");

        let infos = sink.infos.lock().unwrap();
        let last_pv_line = infos
            .iter()
            .rev()
            .find(|l| l.contains(" pv "))
            .expect("at least one pv info line");
        let pv_part = last_pv_line.split(" pv ").nth(1).unwrap();
        assert!(pv_part.starts_with(&result.best_move.to_uci()));
    }

    #[test]
    fn stop_aborts_infinite_search() {
        let board = Board::starting_position();
        let (mut search, sink) = make_search();
        search.start_search(&board, Vec::new(), SearchMode::infinite());
        assert!(search.is_searching());

        std::thread::sleep(Duration::from_millis(50));
        search.stop_search();
        assert!(!search.is_searching());
        assert_eq!(sink.results.lock().unwrap().len(), 1);
        let result = search.last_search_result().unwrap();
        assert!(!result.best_move.is_none());
    }

    #[test]
    fn stop_is_idempotent() {
        let board = Board::starting_position();
        let (mut search, _sink) = make_search();
        search.start_search(&board, Vec::new(), SearchMode::fixed_depth(2));
        search.wait_while_searching();
        let first = search.last_search_result().unwrap();

        search.stop_search();
        search.stop_search();
        let second = search.last_search_result().unwrap();
        assert_eq!(first.best_move, second.best_move);
        assert_eq!(first.value, second.value);
    }

    #[test]
    fn second_go_while_running_is_rejected() {
        let board = Board::starting_position();
        let (mut search, sink) = make_search();
        search.start_search(&board, Vec::new(), SearchMode::infinite());
        // Must be ignored, not panic or restart.
        search.start_search(&board, Vec::new(), SearchMode::fixed_depth(1));
        assert!(search.is_searching());
        search.stop_search();
        assert_eq!(sink.results.lock().unwrap().len(), 1);
    }

    #[test]
    fn node_budget_limits_search() {
        let board = Board::starting_position();
        let (mut search, _sink) = make_search();
        search.start_search(&board, Vec::new(), SearchMode::fixed_nodes(2_000));
        search.wait_while_searching();
        let result = search.last_search_result().unwrap();
        assert!(!result.best_move.is_none());
        assert!(result.nodes < 100_000, "node budget ignored: {}", result.nodes);
    }

    #[test]
    fn searchmoves_restricts_root() {
        let board = Board::starting_position();
        let (mut search, _sink) = make_search();
        let mut mode = SearchMode::fixed_depth(3);
        mode.search_moves = vec!["a2a3".to_string()];
        search.start_search(&board, Vec::new(), mode);
        search.wait_while_searching();
        assert_eq!(search.last_search_result().unwrap().best_move.to_uci(), "a2a3");
    }

    #[test]
    fn mate_mode_stops_on_found_mate() {
        let board: Board = "r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4"
            .parse()
            .unwrap();
        let (mut search, _sink) = make_search();
        search.start_search(&board, Vec::new(), SearchMode::mate(1));
        search.wait_while_searching();
        let result = search.last_search_result().unwrap();
        assert_eq!(result.best_move.to_uci(), "h5f7");
        assert!(result.value >= CHECKMATE - 2);
    }

    #[test]
    fn perft_mode_reports_counts() {
        let board = Board::starting_position();
        let (mut search, sink) = make_search();
        search.start_search(&board, Vec::new(), SearchMode::perft(3));
        search.wait_while_searching();

        let result = search.last_search_result().unwrap();
        assert!(result.best_move.is_none());
        assert_eq!(result.nodes, 8_902);

        let infos = sink.infos.lock().unwrap();
        let perft_line = infos.iter().find(|l| l.contains("perft")).expect("perft info line");
        assert!(perft_line.contains("nodes 8902"), "{perft_line}");
        assert!(perft_line.contains("captures 34"), "{perft_line}");
        assert!(perft_line.contains("checks 12"), "{perft_line}");
    }

    #[test]
    fn ponder_holds_result_until_stop() {
        // Mate-in-one, depth 2: the ponder search finishes long before any
        // ponderhit. The result must be held, then released by stop.
        let board: Board = "r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4"
            .parse()
            .unwrap();
        let (mut search, sink) = make_search();
        let mut mode = SearchMode::fixed_depth(2);
        mode.ponder = true;
        search.start_search(&board, Vec::new(), mode);

        // Wait for the worker to finish its (short) ponder search.
        while search.is_searching() {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(sink.results.lock().unwrap().len(), 0, "result must be held while pondering");

        search.stop_search();
        assert_eq!(sink.results.lock().unwrap().len(), 1);
        assert_eq!(sink.results.lock().unwrap()[0].best_move.to_uci(), "h5f7");
    }

    #[test]
    fn ponderhit_converts_to_timed_search() {
        let board = Board::starting_position();
        let (mut search, sink) = make_search();
        let mut mode = SearchMode::fixed_time(Duration::from_millis(200));
        mode.ponder = true;
        search.start_search(&board, Vec::new(), mode);
        assert!(search.is_searching());

        std::thread::sleep(Duration::from_millis(30));
        search.ponder_hit();

        // After the clock starts the movetime limit applies; the search must
        // end by itself and emit exactly one result.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while search.is_searching() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!search.is_searching(), "search should stop after movetime");
        search.wait_while_searching();
        assert_eq!(sink.results.lock().unwrap().len(), 1);
    }

    #[test]
    fn repetition_draw_detected_from_history() {
        // Shuffle kings back and forth: the fourth occurrence of the start
        // position makes the root a draw by repetition.
        let board: Board = "4k3/8/8/8/8/8/R7/4K3 w - - 0 1".parse().unwrap();
        let moves = ["e1d1", "e8d8", "d1e1", "d8e8", "e1d1", "e8d8", "d1e1", "d8e8"];
        let mut history = Vec::new();
        let mut current = board;
        for uci in moves {
            history.push(current.hash());
            let mv = castor_core::Move::from_uci(uci, &current).unwrap();
            current = current.make_move(mv);
        }

        let (mut search, _sink) = make_search();
        search.start_search(&current, history, SearchMode::fixed_depth(2));
        search.wait_while_searching();
        let result = search.last_search_result().unwrap();
        assert_eq!(result.value, DRAW, "root two-fold repetition is a draw");
    }

    #[test]
    fn aborted_iteration_keeps_previous_best() {
        let board = Board::starting_position();
        let (mut search, _sink) = make_search();

        // Baseline from a clean fixed-depth search.
        search.start_search(&board, Vec::new(), SearchMode::fixed_depth(3));
        search.wait_while_searching();
        let baseline = search.last_search_result().unwrap();
        assert!(!baseline.best_move.is_none());

        // Infinite search stopped very early must still produce a move.
        search.start_search(&board, Vec::new(), SearchMode::infinite());
        std::thread::sleep(Duration::from_millis(20));
        search.stop_search();
        let stopped = search.last_search_result().unwrap();
        assert!(!stopped.best_move.is_none());
    }

    #[test]
    fn stop_flag_is_reset_between_searches() {
        let board = Board::starting_position();
        let (mut search, _sink) = make_search();
        search.start_search(&board, Vec::new(), SearchMode::infinite());
        search.stop_search();

        // The stop of the first search must not leak into the second.
        search.start_search(&board, Vec::new(), SearchMode::fixed_depth(3));
        assert!(
            search.control.as_ref().is_some_and(|c| !c.stop_flag().load(Ordering::Relaxed))
        );
        search.wait_while_searching();
        assert!(search.last_search_result().unwrap().depth > 0);
    }

    #[test]
    fn score_strings() {
        assert_eq!(score_string(123), "score cp 123");
        assert_eq!(score_string(-45), "score cp -45");
        assert_eq!(score_string(CHECKMATE - 1), "score mate 1");
        assert_eq!(score_string(CHECKMATE - 3), "score mate 2");
        assert_eq!(score_string(-(CHECKMATE - 2)), "score mate -1");
    }

    #[test]
    fn tt_root_hit_can_skip_iterations() {
        let board = Board::starting_position();
        let (mut search, sink) = make_search();
        search.start_search(&board, Vec::new(), SearchMode::fixed_depth(5));
        search.wait_while_searching();
        let first_nodes = search.last_search_result().unwrap().nodes;

        // Re-searching the same position with a warm TT is much cheaper.
        sink.infos.lock().unwrap().clear();
        search.start_search(&board, Vec::new(), SearchMode::fixed_depth(5));
        search.wait_while_searching();
        let second_nodes = search.last_search_result().unwrap().nodes;
        assert!(
            second_nodes < first_nodes,
            "warm TT should shrink the tree: {second_nodes} vs {first_nodes}"
        );
    }

    #[test]
    fn mtdf_agrees_with_aspiration_on_tactics() {
        let board: Board = "r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4"
            .parse()
            .unwrap();
        let sink = Arc::new(CollectingSink::default());
        let mut config = SearchConfig::default();
        config.hash_size_mb = 8;
        config.use_aspiration = false;
        config.use_mtdf = true;
        config.use_pvs = false;
        let mut search = Search::with_config(config, sink);
        search.start_search(&board, Vec::new(), SearchMode::fixed_depth(4));
        search.wait_while_searching();
        let result = search.last_search_result().unwrap();
        assert_eq!(result.best_move.to_uci(), "h5f7");
    }
}
