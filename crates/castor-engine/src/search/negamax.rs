//! Principal-variation negamax with alpha-beta pruning and quiescence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use castor_core::{Board, Move, MoveList, PieceKind, left_in_check};

use crate::eval::{self, CHECKMATE, DRAW, MIN, is_checkmate_value};
use crate::mode::SearchMode;
use crate::search::counters::SearchCounters;
use crate::search::ordering::{KillerTable, MovePicker};
use crate::search::tt::{Bound, TranspositionTable, TtProbe};
use crate::search::{RootMove, SearchConfig, SearchSink, score_string};
use crate::time::SearchControl;

/// Hard ceiling on search plies; per-ply arrays carry this many slots.
pub const MAX_PLY: usize = 127;

/// Interval between periodic UCI info updates.
const UPDATE_INTERVAL: Duration = Duration::from_millis(500);

// Depth names for the pruning ladder near the horizon.
const FRONTIER: i32 = 1;
const PRE_FRONTIER: i32 = 2;
const PRE_PRE_FRONTIER: i32 = 3;

// Pruning and reduction parameters. Tunable, not contracts.
const RFP_MARGIN: i32 = 300;
const NMP_DEPTH: i32 = 3;
const NMP_VERIFICATION_DEPTH: i32 = 3;
const RAZOR_DEPTH: i32 = 3;
const RAZOR_MARGIN: i32 = 600;
const LMP_MIN_DEPTH: i32 = 3;
const LMP_MIN_MOVES: usize = 6;
const LMR_MIN_DEPTH: i32 = 3;
const LMR_MIN_MOVES: usize = 3;
const LMR_REDUCTION: i32 = 1;

/// Outcome of a transposition table probe, after bound filtering.
struct TtHit {
    /// Score usable at this node, with the bound that justified it.
    usable: Option<(i32, Bound)>,
    best_move: Move,
    mate_threat: bool,
}

/// All mutable state of one search worker.
///
/// Owned by [`Search`](crate::search::Search) between searches and moved onto
/// the worker thread while one runs. Per-ply buffers are reused across
/// searches so the hot path never allocates.
pub(crate) struct SearchRunner {
    pub(crate) config: SearchConfig,
    pub(crate) tt: TranspositionTable,
    pub(crate) counters: SearchCounters,
    /// Principal variation per ply; `pv[ply]` starts with the move chosen there.
    pub(crate) pv: Box<[MoveList]>,
    pub(crate) killers: KillerTable,
    pickers: Box<[MovePicker]>,
    pub(crate) mate_threat: Box<[bool]>,
    pub(crate) single_reply: Box<[bool]>,
    /// Move sequence from the root to the current node (UCI `currline`).
    current_variation: MoveList,
    /// Hashes of every position before the current one: game prefix plus the
    /// search path. Pushed before each recursion, popped after.
    pub(crate) history: Vec<u64>,
    pub(crate) root_moves: Vec<RootMove>,

    // Per-search wiring, installed by `prepare`.
    pub(crate) mode: SearchMode,
    pub(crate) control: Arc<SearchControl>,
    pub(crate) sink: Arc<dyn SearchSink>,
    update_ticker: Instant,
    pub(crate) had_book_move: bool,
}

impl SearchRunner {
    pub(crate) fn new(config: SearchConfig, sink: Arc<dyn SearchSink>) -> SearchRunner {
        let hash_mb = config.hash_size_mb;
        SearchRunner {
            config,
            tt: TranspositionTable::new(hash_mb),
            counters: SearchCounters::new(),
            pv: vec![MoveList::new(); MAX_PLY].into_boxed_slice(),
            killers: KillerTable::new(),
            pickers: (0..MAX_PLY).map(|_| MovePicker::new()).collect(),
            mate_threat: vec![false; MAX_PLY].into_boxed_slice(),
            single_reply: vec![false; MAX_PLY].into_boxed_slice(),
            current_variation: MoveList::new(),
            history: Vec::with_capacity(512),
            root_moves: Vec::new(),
            mode: SearchMode::default(),
            control: Arc::new(SearchControl::new_infinite(Arc::new(
                std::sync::atomic::AtomicBool::new(true),
            ))),
            sink,
            update_ticker: Instant::now(),
            had_book_move: false,
        }
    }

    /// Install the per-search state and reset everything ply-indexed.
    pub(crate) fn prepare(
        &mut self,
        mode: SearchMode,
        control: Arc<SearchControl>,
        game_history: Vec<u64>,
    ) {
        self.mode = mode;
        self.control = control;
        self.counters.reset();
        self.killers.clear();
        for pv in self.pv.iter_mut() {
            pv.clear();
        }
        self.mate_threat.fill(false);
        self.single_reply.fill(false);
        self.current_variation.clear();
        self.history = game_history;
        self.root_moves.clear();
        self.tt.age_entries();
        self.update_ticker = Instant::now();
    }

    /// Main search. Root is `ply == 0`; non-PV callers must pass a null
    /// window (`beta == alpha + 1`).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn search(
        &mut self,
        board: &Board,
        depth: i32,
        ply: usize,
        mut alpha: i32,
        mut beta: i32,
        pv_node: bool,
        do_null: bool,
    ) -> i32 {
        debug_assert!(pv_node || alpha == beta - 1);
        let root = ply == 0;

        self.counters.current_search_depth = self.counters.current_search_depth.max(ply as u8);
        self.counters.current_extra_search_depth =
            self.counters.current_extra_search_depth.max(ply as u8);

        // Horizon: resolve tactics in quiescence.
        if depth <= 0 || ply >= MAX_PLY - 1 {
            return self.qsearch(board, ply, alpha, beta, pv_node);
        }

        // Clear this ply's PV up front so early returns leave no stale tail
        // for the parent to concatenate. The root PV carries over between
        // iterations and is only rewritten on an alpha improvement.
        if !root {
            self.pv[ply].clear();
        }

        self.counters.nodes_visited += 1;
        if self.check_abort() {
            return MIN; // value irrelevant once the stop flag is set
        }

        // Draw detection. Within the tree a single repetition already scores
        // as a draw (with contempt) so the search sees repetitions early; the
        // root requires the real two-fold.
        if board.halfmove_clock() >= 100 || self.is_repetition(board.hash(), if root { 2 } else { 1 })
        {
            if root {
                return DRAW;
            }
            return eval::contempt(board);
        }

        // Mate-distance pruning: a mate further away than one already proven
        // cannot change the result.
        if !root {
            alpha = alpha.max(-CHECKMATE + ply as i32);
            beta = beta.min(CHECKMATE - ply as i32);
            if alpha >= beta {
                self.counters.mate_distance_prunings += 1;
                return alpha;
            }
        }

        // Transposition table.
        let mut tt_move = Move::NONE;
        if self.config.use_tt && !root {
            if let Some(hit) = self.probe_tt(board, depth, alpha, beta, ply) {
                self.mate_threat[ply] = hit.mate_threat;
                tt_move = hit.best_move;
                if let Some((value, bound)) = hit.usable
                    && (!pv_node || bound == Bound::Exact)
                {
                    return value;
                }
            }
        }

        let mut searched = 0usize;
        let mut tt_bound = Bound::Upper;
        let mut best_value = MIN;
        let mut best_move =
            if root { self.pv[0].first().unwrap_or(Move::NONE) } else { tt_move };

        let in_check = board.in_check();
        let static_eval = self.evaluate(board);

        // Forward prunings that can settle the node without a move loop.
        if !pv_node && !in_check {
            // Reverse futility: the static eval beats beta by a full margin
            // at the frontier, so the move to come will not bring it back.
            if self.config.use_rfp && !root && depth == FRONTIER && do_null {
                let margin = RFP_MARGIN * depth;
                if static_eval - margin >= beta {
                    self.counters.rfp_prunings += 1;
                    self.store_tt(board, static_eval, Bound::Lower, depth, best_move, ply);
                    return static_eval - margin;
                }
            }

            // Null move: hand the opponent a free move; if the reduced search
            // still clears beta the position is good enough to cut. Gated on
            // real material to sidestep zugzwang.
            if self.config.use_nmp
                && !root
                && depth >= NMP_DEPTH
                && do_null
                && board.has_non_pawn_material(board.side_to_move())
                && !self.mate_threat[ply]
                && static_eval >= beta
            {
                let mut r = if depth > 6 { 3 } else { 2 };
                if self.config.use_verify_nmp {
                    r += 1;
                }

                let null_board = board.make_null_move();
                let mut null_value =
                    -self.search(&null_board, depth - r, ply + 1, -beta, -beta + 1, false, false);

                if is_checkmate_value(null_value) {
                    self.mate_threat[ply] = true;
                }

                if self.config.use_verify_nmp
                    && depth > NMP_VERIFICATION_DEPTH
                    && null_value >= beta
                {
                    self.counters.null_move_verifications += 1;
                    null_value = self.search(
                        board,
                        depth - NMP_VERIFICATION_DEPTH,
                        ply,
                        alpha,
                        beta,
                        true,
                        false,
                    );
                }

                if null_value >= beta {
                    self.counters.null_move_prunings += 1;
                    self.store_tt(board, null_value, Bound::Lower, depth, best_move, ply);
                    return null_value;
                }
            }

            // Razoring: hopeless positions drop straight into quiescence.
            if self.config.use_razoring
                && !root
                && depth <= RAZOR_DEPTH
                && !self.mate_threat[ply]
                && !is_checkmate_value(beta)
                && static_eval + RAZOR_MARGIN <= alpha
            {
                self.counters.razor_reductions += 1;
                return self.qsearch(board, ply, alpha, beta, false);
            }
        }

        // Arm the per-ply generator (root moves were prepared by the driver).
        if !root {
            let killers = self.killers.get(ply);
            let picker = &mut self.pickers[ply];
            picker.set_position(board);
            picker.set_killers(killers);
            if !best_move.is_none() {
                picker.set_pv_move(best_move);
            }
        }

        let mut move_index = 0usize;
        loop {
            let mv = if root {
                self.root_moves.get(move_index).map(|rm| rm.mv)
            } else {
                self.pickers[ply].next_move()
            };
            let Some(mv) = mv else { break };
            move_index += 1;
            self.counters.moves_generated += 1;

            if root {
                self.counters.current_root_move = mv;
                self.counters.current_root_move_number = move_index;
            }

            // Minor-promotion pruning: under-promotions to rook or bishop are
            // dominated by the queen except in stalemate tricks.
            if mv.is_promotion()
                && !matches!(mv.promotion(), PieceKind::Queen | PieceKind::Knight)
            {
                self.counters.minor_promotion_prunings += 1;
                continue;
            }

            let mut child_depth = depth - 1;

            // Moves out of check, under a mate threat, or tactical moves are
            // exempt from the reduction ladder below.
            let exempt =
                in_check || self.mate_threat[ply] || mv.is_capture() || mv.is_promotion();

            if searched >= 1 && !exempt {
                let material = board.material(board.side_to_move())
                    - board.material(!board.side_to_move());
                let move_gain = mv.captured().map_or(0, |k| k.value());

                // Limited razoring at the pre-pre-frontier.
                if self.config.use_limited_razoring
                    && depth == PRE_PRE_FRONTIER
                    && material + move_gain + PieceKind::Queen.value() <= alpha
                {
                    self.counters.lr_reductions += 1;
                    child_depth = PRE_FRONTIER - 1;
                }

                // Extended futility at the pre-frontier.
                if self.config.use_efp
                    && depth == PRE_FRONTIER
                    && material + move_gain + PieceKind::Rook.value() <= alpha
                {
                    self.counters.efp_prunings += 1;
                    continue;
                }

                // Futility at the frontier; the stand-pat estimate still
                // feeds the best value.
                if self.config.use_fp && depth == FRONTIER {
                    let estimate = material + move_gain;
                    if estimate + 2 * PieceKind::Pawn.value() <= alpha {
                        best_value = best_value.max(estimate);
                        self.counters.fp_prunings += 1;
                        continue;
                    }
                }

                // Late-move pruning by move count.
                if self.config.use_lmp
                    && !root
                    && depth < LMP_MIN_DEPTH
                    && searched >= LMP_MIN_MOVES
                {
                    self.counters.lmp_prunings += 1;
                    continue;
                }

                // Late-move reduction.
                if self.config.use_lmr && depth >= LMR_MIN_DEPTH && searched >= LMR_MIN_MOVES {
                    self.counters.lmr_reductions += 1;
                    child_depth -= LMR_REDUCTION;
                }
            }

            let child = board.make_move(mv);
            if !root && left_in_check(board, &child) {
                continue;
            }

            self.history.push(board.hash());
            self.current_variation.push(mv);
            self.send_periodic_update();

            // PVS: the first move gets the full window; siblings must refute
            // a null window before a full re-search is paid for.
            let value = if !self.config.use_pvs || searched == 0 {
                -self.search(&child, child_depth, ply + 1, -beta, -alpha, pv_node, true)
            } else {
                let probe =
                    -self.search(&child, child_depth, ply + 1, -alpha - 1, -alpha, false, true);
                if probe > alpha && probe < beta && !self.control.is_stopped() {
                    if root {
                        self.counters.pvs_root_researches += 1;
                    } else {
                        self.counters.pvs_researches += 1;
                    }
                    -self.search(&child, child_depth, ply + 1, -beta, -alpha, true, true)
                } else {
                    if root {
                        self.counters.pvs_root_cutoffs += 1;
                    } else {
                        self.counters.pvs_cutoffs += 1;
                    }
                    probe
                }
            };

            searched += 1;
            self.current_variation.pop();
            self.history.pop();

            // A stopped search produced an unreliable value; keep what the
            // finished moves established.
            if self.control.is_stopped() {
                break;
            }

            if root {
                self.root_moves[move_index - 1].value = value;
            }

            if value > best_value {
                best_value = value;
                best_move = mv;

                if value >= beta {
                    if self.config.use_killers && mv.is_quiet() {
                        self.killers.store(ply, mv);
                    }
                    self.counters.prunings += 1;
                    self.store_tt(board, value, Bound::Lower, depth, best_move, ply);
                    return value;
                }

                if value > alpha {
                    alpha = value;
                    tt_bound = Bound::Exact;
                    let tail = self.pv[ply + 1];
                    self.pv[ply].load_pv(mv, &tail);
                    if root {
                        self.counters.best_move_changes += 1;
                        self.counters.current_best_root_move = mv;
                        self.counters.current_best_root_value = value;
                    }
                }
            }

            if root
                && (self.control.soft_limit_reached() || self.control.hard_limit_reached())
            {
                self.control.request_stop();
                break;
            }
        }

        // No legal move at all: mate or stalemate.
        if !root && searched == 0 && !self.control.is_stopped() {
            self.counters.non_leaf_positions_evaluated += 1;
            best_value = if in_check { -CHECKMATE + ply as i32 } else { DRAW };
        }

        // Keep the PV move at the head so window re-searches at this depth
        // start with it.
        if root
            && let Some(first) = self.pv[0].first()
            && let Some(pos) = self.root_moves.iter().position(|rm| rm.mv == first)
            && pos > 0
        {
            let rm = self.root_moves.remove(pos);
            self.root_moves.insert(0, rm);
        }

        self.store_tt(board, best_value, tt_bound, depth, best_move, ply);
        best_value
    }

    /// Quiescence search: extend along captures (and all evasions while in
    /// check) until the position is quiet enough to evaluate.
    pub(crate) fn qsearch(
        &mut self,
        board: &Board,
        ply: usize,
        mut alpha: i32,
        mut beta: i32,
        pv_node: bool,
    ) -> i32 {
        debug_assert!(pv_node || alpha == beta - 1);
        debug_assert!(ply >= 1, "quiescence never runs at the root");
        self.counters.current_extra_search_depth =
            self.counters.current_extra_search_depth.max(ply as u8);
        self.pv[ply].clear();

        if board.halfmove_clock() >= 100 || self.is_repetition(board.hash(), 1) {
            return eval::contempt(board);
        }

        if !self.config.use_quiescence || ply >= MAX_PLY - 1 {
            return self.evaluate(board);
        }

        self.counters.nodes_visited += 1;
        if self.check_abort() {
            return MIN;
        }

        // Mate-distance pruning, as in the main search.
        alpha = alpha.max(-CHECKMATE + ply as i32);
        beta = beta.min(CHECKMATE - ply as i32);
        if alpha >= beta {
            self.counters.mate_distance_prunings += 1;
            return alpha;
        }

        let mut tt_move = Move::NONE;
        if self.config.use_tt {
            if let Some(hit) = self.probe_tt(board, 0, alpha, beta, ply) {
                self.mate_threat[ply] = hit.mate_threat;
                tt_move = hit.best_move;
                if let Some((value, bound)) = hit.usable
                    && (!pv_node || bound == Bound::Exact)
                {
                    return value;
                }
            }
        }

        let mut tt_bound = Bound::Upper;
        let mut best_value = MIN;
        let mut best_move = Move::NONE;
        let in_check = board.in_check();

        // Stand pat: doing nothing is an option unless in check.
        if !in_check {
            let stand_pat = self.evaluate(board);
            best_value = stand_pat;
            if stand_pat >= beta {
                self.store_tt(board, stand_pat, Bound::Lower, 0, Move::NONE, ply);
                return stand_pat;
            }
            if stand_pat > alpha {
                alpha = stand_pat;
            }
        }

        {
            let picker = &mut self.pickers[ply];
            picker.set_position_qsearch(board);
            if !tt_move.is_none() {
                picker.set_pv_move(tt_move);
            }
        }

        let mut searched = 0usize;
        while let Some(mv) = self.pickers[ply].next_move() {
            self.counters.moves_generated += 1;

            if mv.is_promotion()
                && !matches!(mv.promotion(), PieceKind::Queen | PieceKind::Knight)
            {
                self.counters.minor_promotion_prunings += 1;
                continue;
            }

            let child = board.make_move(mv);
            if left_in_check(board, &child) {
                continue;
            }

            self.history.push(board.hash());
            self.current_variation.push(mv);
            let value = -self.qsearch(&child, ply + 1, -beta, -alpha, pv_node);
            searched += 1;
            self.current_variation.pop();
            self.history.pop();

            if self.control.is_stopped() {
                break;
            }

            if value > best_value {
                best_value = value;
                best_move = mv;

                if value >= beta {
                    self.counters.prunings += 1;
                    self.store_tt(board, value, Bound::Lower, 0, best_move, ply);
                    return value;
                }

                if value > alpha {
                    alpha = value;
                    tt_bound = Bound::Exact;
                    let tail = self.pv[ply + 1];
                    self.pv[ply].load_pv(mv, &tail);
                }
            }
        }

        // In check with no legal reply: mate. (The in-check generator yields
        // every evasion, so this is exact, unlike the quiet case.)
        if searched == 0 && in_check && !self.control.is_stopped() {
            self.counters.non_leaf_positions_evaluated += 1;
            best_value = -CHECKMATE + ply as i32;
        }

        self.store_tt(board, best_value, tt_bound, 0, best_move, ply);
        best_value
    }

    /// Static evaluation plus telemetry.
    fn evaluate(&mut self, board: &Board) -> i32 {
        self.counters.leaf_positions_evaluated += 1;
        eval::evaluate(board)
    }

    /// Count stop conditions at node entry: external stop, hard time limit,
    /// node budget.
    fn check_abort(&mut self) -> bool {
        if self.control.should_stop(self.counters.nodes_visited) {
            return true;
        }
        if let Some(limit) = self.mode.nodes
            && self.counters.nodes_visited >= limit
        {
            self.control.request_stop();
            return true;
        }
        false
    }

    /// Return `true` if the position occurred at least `folds` times before.
    fn is_repetition(&self, hash: u64, folds: usize) -> bool {
        let mut count = 0;
        for &past in self.history.iter().rev() {
            if past == hash {
                count += 1;
                if count >= folds {
                    return true;
                }
            }
        }
        false
    }

    /// Probe the TT and filter the stored bound against the current window.
    fn probe_tt(
        &mut self,
        board: &Board,
        depth: i32,
        alpha: i32,
        beta: i32,
        ply: usize,
    ) -> Option<TtHit> {
        let Some(TtProbe { best_move, depth: tt_depth, bound, score, mate_threat }) =
            self.tt.probe(board.hash(), ply)
        else {
            self.counters.tt_misses += 1;
            return None;
        };
        self.counters.tt_hits += 1;

        let mut usable = None;
        if tt_depth as i32 >= depth {
            usable = match bound {
                Bound::Exact => Some((score, bound)),
                Bound::Lower if score >= beta => Some((score, bound)),
                Bound::Upper if score <= alpha => Some((score, bound)),
                _ => None,
            };
        }

        Some(TtHit { usable, best_move, mate_threat })
    }

    /// Store a node result unless the search is unwinding.
    fn store_tt(
        &mut self,
        board: &Board,
        value: i32,
        bound: Bound,
        depth: i32,
        best_move: Move,
        ply: usize,
    ) {
        if self.config.use_tt && !self.control.is_stopped() {
            self.tt
                .store(board.hash(), value, bound, depth.max(0) as u8, best_move, self.mate_threat[ply], ply);
        }
    }

    /// Periodic `info` emission, rate-limited to [`UPDATE_INTERVAL`].
    fn send_periodic_update(&mut self) {
        if self.update_ticker.elapsed() < UPDATE_INTERVAL {
            return;
        }
        self.update_ticker = Instant::now();

        let elapsed_ms = self.control.elapsed().as_millis().max(1) as u64;
        let nodes = self.counters.nodes_visited;
        self.sink.send_info(&format!(
            "depth {} seldepth {} nodes {} nps {} time {} hashfull {}",
            self.counters.current_search_depth,
            self.counters.current_extra_search_depth,
            nodes,
            nodes * 1000 / elapsed_ms,
            elapsed_ms,
            self.tt.hashfull(),
        ));
        if !self.counters.current_root_move.is_none() {
            self.sink.send_info(&format!(
                "currmove {} currmovenumber {}",
                self.counters.current_root_move, self.counters.current_root_move_number,
            ));
        }
        if self.config.show_curr_line && !self.current_variation.is_empty() {
            self.sink
                .send_info(&format!("currline {}", self.current_variation.to_uci_string()));
        }
    }

    /// Walk the TT best-move chain to rebuild a PV of at most `depth` moves.
    pub(crate) fn pv_from_tt(&self, board: &Board, depth: u8) -> MoveList {
        let mut pv = MoveList::new();
        let mut current = *board;
        for _ in 0..depth {
            let Some(hit) = self.tt.probe(current.hash(), 0) else { break };
            if hit.best_move.is_none() || !castor_core::is_legal(&current, hit.best_move) {
                break;
            }
            pv.push(hit.best_move);
            current = current.make_move(hit.best_move);
        }
        pv
    }

    /// Emit the end-of-iteration info line.
    pub(crate) fn send_iteration_info(&self, bound_suffix: &str) {
        let elapsed_ms = self.control.elapsed().as_millis().max(1) as u64;
        let nodes = self.counters.nodes_visited;
        self.sink.send_info(&format!(
            "depth {} seldepth {} multipv 1 {}{} nodes {} nps {} time {} pv {}",
            self.counters.current_iteration_depth,
            self.counters.current_extra_search_depth,
            score_string(self.counters.current_best_root_value),
            bound_suffix,
            nodes,
            nodes * 1000 / elapsed_ms,
            elapsed_ms,
            self.pv[0].to_uci_string(),
        ));
    }
}
