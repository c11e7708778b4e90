//! Time control - stop flag, soft/hard limits, and extra-time accounting.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

use castor_core::Color;
use tracing::debug;

use crate::mode::SearchMode;

/// Safety margin subtracted from the remaining clock time.
const CLOCK_OVERHEAD_MS: i64 = 1_000;
/// Assumed moves to go when the GUI does not say.
const DEFAULT_MOVES_TO_GO: i64 = 40;
/// Soft limit as a fraction of the hard limit, in percent.
const SOFT_LIMIT_PCT: i64 = 80;

/// Controls when a search must stop.
///
/// The worker polls [`should_stop`](SearchControl::should_stop) at node entry
/// (the wall clock only every 2048 nodes) and
/// [`soft_limit_reached`](SearchControl::soft_limit_reached) between
/// iterations. The controller thread flips the shared stop flag or, on
/// `ponderhit`, activates the clock.
pub struct SearchControl {
    stopped: Arc<AtomicBool>,
    clock_active: AtomicBool,
    pondering: AtomicBool,
    start: Mutex<Instant>,
    soft_limit_ms: i64,
    hard_limit_ms: i64,
    /// Accumulated extension budget; negative when time was shrunk.
    extra_time_ms: AtomicI64,
    /// Extra time only applies to budgeted searches, not `movetime`.
    extendable: bool,
}

impl SearchControl {
    /// Control without time limits (`go infinite`, `go depth`, perft).
    pub fn new_infinite(stopped: Arc<AtomicBool>) -> SearchControl {
        SearchControl {
            stopped,
            clock_active: AtomicBool::new(false),
            pondering: AtomicBool::new(false),
            start: Mutex::new(Instant::now()),
            soft_limit_ms: 0,
            hard_limit_ms: 0,
            extra_time_ms: AtomicI64::new(0),
            extendable: false,
        }
    }

    /// Control with limits; the clock runs from construction.
    pub fn new_timed(
        stopped: Arc<AtomicBool>,
        soft: Duration,
        hard: Duration,
        extendable: bool,
    ) -> SearchControl {
        SearchControl {
            stopped,
            clock_active: AtomicBool::new(true),
            pondering: AtomicBool::new(false),
            start: Mutex::new(Instant::now()),
            soft_limit_ms: soft.as_millis() as i64,
            hard_limit_ms: hard.as_millis() as i64,
            extra_time_ms: AtomicI64::new(0),
            extendable,
        }
    }

    /// Control for pondering: limits configured but the clock sleeps until
    /// [`activate`](Self::activate) is called on `ponderhit`.
    pub fn new_ponder(
        stopped: Arc<AtomicBool>,
        soft: Duration,
        hard: Duration,
        extendable: bool,
    ) -> SearchControl {
        let control = SearchControl::new_timed(stopped, soft, hard, extendable);
        control.clock_active.store(false, Ordering::Release);
        control.pondering.store(true, Ordering::Release);
        control
    }

    /// Ponder control without clocks (`go ponder infinite`).
    pub fn new_ponder_infinite(stopped: Arc<AtomicBool>) -> SearchControl {
        let control = SearchControl::new_infinite(stopped);
        control.pondering.store(true, Ordering::Release);
        control
    }

    /// Start the clock, rebasing the start time (called on `ponderhit`).
    pub fn activate(&self) {
        *self.start.lock().expect("start mutex poisoned") = Instant::now();
        self.pondering.store(false, Ordering::Release);
        if self.hard_limit_ms > 0 {
            self.clock_active.store(true, Ordering::Release);
        }
    }

    /// Return `true` while an unresolved ponder search is running.
    pub fn is_pondering(&self) -> bool {
        self.pondering.load(Ordering::Acquire)
    }

    /// Elapsed time since the search (or the ponderhit) started.
    pub fn elapsed(&self) -> Duration {
        self.start.lock().expect("start mutex poisoned").elapsed()
    }

    /// Request a stop. One-way for the duration of a search.
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Return `true` once a stop was requested or forced by the clock.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Reference to the shared stop flag.
    pub fn stop_flag(&self) -> &Arc<AtomicBool> {
        &self.stopped
    }

    /// Grow (factor > 1) or shrink (factor < 1) the time budget.
    ///
    /// Adds `hard * (factor - 1)` to the extension account, like the original
    /// time manager; repeated triggers accumulate.
    pub fn add_extra_time(&self, factor: f64) {
        if !self.extendable || self.hard_limit_ms == 0 {
            return;
        }
        let delta = (self.hard_limit_ms as f64 * (factor - 1.0)) as i64;
        let total = self.extra_time_ms.fetch_add(delta, Ordering::Relaxed) + delta;
        debug!(delta_ms = delta, total_extra_ms = total, "time budget adjusted");
    }

    /// Current extension account in milliseconds.
    pub fn extra_time_ms(&self) -> i64 {
        self.extra_time_ms.load(Ordering::Relaxed)
    }

    /// Soft limit: do not start another iteration past this point.
    ///
    /// Only 80% of the extension account applies, so extensions widen the
    /// hard deadline faster than the iteration gate.
    pub fn soft_limit_reached(&self) -> bool {
        if !self.clock_active.load(Ordering::Acquire) || self.soft_limit_ms == 0 {
            return false;
        }
        let budget = self.soft_limit_ms + self.extra_time_ms() * 8 / 10;
        self.elapsed().as_millis() as i64 >= budget
    }

    /// Hard limit: the search must unwind now.
    pub fn hard_limit_reached(&self) -> bool {
        if !self.clock_active.load(Ordering::Acquire) || self.hard_limit_ms == 0 {
            return false;
        }
        let budget = self.hard_limit_ms + self.extra_time_ms();
        self.elapsed().as_millis() as i64 >= budget
    }

    /// Per-node stop check; consults the wall clock every 2048 nodes only.
    pub fn should_stop(&self, nodes: u64) -> bool {
        if self.is_stopped() {
            return true;
        }
        if nodes & 2047 != 0 {
            return false;
        }
        if self.hard_limit_reached() {
            self.request_stop();
            return true;
        }
        false
    }
}

/// Derive soft and hard limits from a search mode and build the control.
///
/// - `movetime T`: hard = soft = T, no extensions.
/// - Clock: `left = remaining - overhead + 40 * increment`,
///   `hard = left / moves_to_go` (40 when unknown), `soft = 0.8 * hard`.
/// - A hard budget under 100 ms is shrunk by 10% up front.
pub fn configure_control(
    mode: &SearchMode,
    side: Color,
    stopped: Arc<AtomicBool>,
) -> SearchControl {
    if !mode.is_time_control() {
        return if mode.ponder {
            SearchControl::new_ponder_infinite(stopped)
        } else {
            SearchControl::new_infinite(stopped)
        };
    }

    let (soft, hard, extendable) = if let Some(move_time) = mode.move_time {
        (move_time, move_time, false)
    } else {
        let remaining = mode
            .remaining_time(side)
            .unwrap_or(Duration::ZERO)
            .as_millis() as i64;
        let mut left = remaining - CLOCK_OVERHEAD_MS;
        left += DEFAULT_MOVES_TO_GO * mode.increment(side).as_millis() as i64;
        let moves_left = match mode.moves_to_go {
            Some(n) if n > 0 => n as i64,
            _ => DEFAULT_MOVES_TO_GO,
        };
        let hard = (left / moves_left).max(1);
        let soft = (hard * SOFT_LIMIT_PCT / 100).max(1);
        (
            Duration::from_millis(soft as u64),
            Duration::from_millis(hard as u64),
            true,
        )
    };

    let control = if mode.ponder {
        SearchControl::new_ponder(stopped, soft, hard, extendable)
    } else {
        SearchControl::new_timed(stopped, soft, hard, extendable)
    };

    if hard < Duration::from_millis(100) {
        control.add_extra_time(0.9);
    }

    control
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn infinite_never_stops_on_its_own() {
        let control = SearchControl::new_infinite(flag());
        assert!(!control.should_stop(2048));
        assert!(!control.soft_limit_reached());
        assert!(!control.hard_limit_reached());
    }

    #[test]
    fn stop_flag_wins_immediately() {
        let control = SearchControl::new_infinite(flag());
        control.request_stop();
        assert!(control.should_stop(1));
        assert!(control.is_stopped());
    }

    #[test]
    fn expired_hard_limit_sets_stop() {
        let control = SearchControl::new_timed(
            flag(),
            Duration::ZERO,
            Duration::from_millis(1),
            true,
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(control.should_stop(2048));
        assert!(control.is_stopped());
    }

    #[test]
    fn clock_only_checked_on_node_boundary() {
        let control = SearchControl::new_timed(
            flag(),
            Duration::ZERO,
            Duration::from_millis(1),
            true,
        );
        std::thread::sleep(Duration::from_millis(5));
        // Off-boundary node counts skip the clock entirely.
        assert!(!control.should_stop(2049));
    }

    #[test]
    fn extra_time_extends_hard_limit() {
        let control = SearchControl::new_timed(
            flag(),
            Duration::from_millis(80),
            Duration::from_millis(100),
            true,
        );
        control.add_extra_time(1.5);
        assert_eq!(control.extra_time_ms(), 50);
        assert!(!control.hard_limit_reached());
    }

    #[test]
    fn shrink_factor_reduces_budget() {
        let control = SearchControl::new_timed(
            flag(),
            Duration::from_millis(80),
            Duration::from_millis(100),
            true,
        );
        control.add_extra_time(0.9);
        assert_eq!(control.extra_time_ms(), -10);
    }

    #[test]
    fn movetime_is_not_extendable() {
        let mode = SearchMode::fixed_time(Duration::from_millis(500));
        let control = configure_control(&mode, Color::White, flag());
        control.add_extra_time(2.0);
        assert_eq!(control.extra_time_ms(), 0);
    }

    #[test]
    fn clock_mode_derives_soft_from_hard() {
        let mode = SearchMode {
            white_time: Some(Duration::from_secs(301)),
            black_time: Some(Duration::from_secs(301)),
            ..Default::default()
        };
        let control = configure_control(&mode, Color::White, flag());
        // left = 301000 - 1000 = 300000, hard = 300000/40 = 7500, soft = 6000.
        assert_eq!(control.hard_limit_ms, 7_500);
        assert_eq!(control.soft_limit_ms, 6_000);
    }

    #[test]
    fn increment_adds_future_time() {
        let mode = SearchMode {
            white_time: Some(Duration::from_secs(61)),
            black_time: Some(Duration::from_secs(61)),
            white_inc: Some(Duration::from_secs(1)),
            black_inc: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let control = configure_control(&mode, Color::Black, flag());
        // left = 61000 - 1000 + 40*1000 = 100000, hard = 2500.
        assert_eq!(control.hard_limit_ms, 2_500);
    }

    #[test]
    fn movestogo_splits_remaining() {
        let mode = SearchMode {
            white_time: Some(Duration::from_secs(11)),
            black_time: Some(Duration::from_secs(11)),
            moves_to_go: Some(10),
            ..Default::default()
        };
        let control = configure_control(&mode, Color::White, flag());
        assert_eq!(control.hard_limit_ms, 1_000);
        assert_eq!(control.soft_limit_ms, 800);
    }

    #[test]
    fn ponder_clock_sleeps_until_activate() {
        let control = SearchControl::new_ponder(
            flag(),
            Duration::from_millis(1),
            Duration::from_millis(1),
            true,
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(control.is_pondering());
        assert!(!control.should_stop(2048), "inactive clock must not stop the search");
        assert!(!control.soft_limit_reached());

        control.activate();
        assert!(!control.is_pondering());
        std::thread::sleep(Duration::from_millis(5));
        assert!(control.should_stop(2048), "clock runs after ponderhit");
    }

    #[test]
    fn tiny_budget_gets_shrunk() {
        let mode = SearchMode {
            white_time: Some(Duration::from_secs(3)),
            black_time: Some(Duration::from_secs(3)),
            ..Default::default()
        };
        // left = 2000, hard = 50 < 100 → shrink by 10%.
        let control = configure_control(&mode, Color::White, flag());
        assert_eq!(control.hard_limit_ms, 50);
        assert_eq!(control.extra_time_ms(), -5);
    }
}
