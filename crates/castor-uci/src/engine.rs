//! The UCI engine loop: reads commands, drives the search, prints replies.

use std::io::{self, BufRead};
use std::sync::Arc;

use tracing::{debug, info, warn};

use castor_core::Board;
use castor_engine::{Search, SearchResult, SearchSink};

use crate::command::{Command, parse_command};
use crate::error::UciError;

const ENGINE_NAME: &str = concat!("Castor ", env!("CARGO_PKG_VERSION"));
const ENGINE_AUTHOR: &str = "the Castor developers";

/// Sink that prints search output as UCI lines on stdout.
///
/// Runs on the worker thread; `println!` locks stdout per line, which is all
/// the synchronization the protocol needs.
pub struct UciSink;

impl SearchSink for UciSink {
    fn send_info(&self, info: &str) {
        println!("info {info}");
    }

    fn send_result(&self, result: &SearchResult) {
        if result.best_move.is_none() {
            // No move was ever evaluated; the protocol still wants a line.
            println!("bestmove 0000");
        } else {
            match result.ponder_move {
                Some(ponder) if !ponder.is_none() => {
                    println!("bestmove {} ponder {}", result.best_move, ponder);
                }
                _ => println!("bestmove {}", result.best_move),
            }
        }
    }
}

/// The engine: current position, game history, and the search.
pub struct UciEngine {
    board: Board,
    history: Vec<u64>,
    search: Search,
    ponder_enabled: bool,
}

impl UciEngine {
    /// Create an engine printing to stdout.
    pub fn new() -> UciEngine {
        UciEngine::with_sink(Arc::new(UciSink))
    }

    /// Create an engine with a custom output sink (used by tests).
    pub fn with_sink(sink: Arc<dyn SearchSink>) -> UciEngine {
        UciEngine {
            board: Board::starting_position(),
            history: Vec::new(),
            search: Search::new(sink),
            ponder_enabled: false,
        }
    }

    /// Read stdin line by line until `quit` or EOF. Returns cleanly so the
    /// process exits with status 0.
    pub fn run(&mut self) -> Result<(), UciError> {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            debug!(cmd = %line.trim(), "received");
            match parse_command(&line) {
                Ok(cmd) => {
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                Err(err) => warn!(%err, line = %line.trim(), "ignoring malformed command"),
            }
        }
        info!("shutting down");
        Ok(())
    }

    /// Dispatch one command; returns `false` on `quit`.
    pub fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Uci => self.handle_uci(),
            Command::IsReady => println!("readyok"),
            Command::Debug(on) => {
                debug!(on, "debug mode");
                self.search.config_mut().show_curr_line = on;
            }
            Command::SetOption { name, value } => self.handle_setoption(&name, value.as_deref()),
            Command::UciNewGame => {
                self.board = Board::starting_position();
                self.history.clear();
                self.search.new_game();
            }
            Command::Position { board, history } => {
                self.board = board;
                self.history = history;
            }
            Command::Go(mode) => {
                if mode.ponder && !self.ponder_enabled {
                    debug!("go ponder while the Ponder option is off - searching anyway");
                }
                self.search.start_search(&self.board, self.history.clone(), mode);
            }
            Command::Stop => self.search.stop_search(),
            Command::PonderHit => self.search.ponder_hit(),
            Command::Quit => {
                self.search.stop_search();
                return false;
            }
            Command::Unknown(cmd) => {
                if !cmd.is_empty() {
                    warn!(cmd, "unknown command ignored");
                }
            }
        }
        true
    }

    fn handle_uci(&self) {
        println!("id name {ENGINE_NAME}");
        println!("id author {ENGINE_AUTHOR}");
        println!("option name Hash type spin default 64 min 1 max 1024");
        println!("option name Ponder type check default false");
        println!("option name Clear_Hash type button");
        println!("option name OwnBook type check default false");
        println!("option name UCI_ShowCurrLine type check default false");
        println!("uciok");
    }

    fn handle_setoption(&mut self, name: &str, value: Option<&str>) {
        match name {
            "Hash" => match value.and_then(|v| v.parse::<usize>().ok()) {
                Some(mb) => self.search.resize_tt(mb),
                None => warn!(?value, "Hash needs an integer value"),
            },
            "Ponder" => {
                self.ponder_enabled = value == Some("true");
            }
            "Clear_Hash" => self.search.clear_hash(),
            "OwnBook" => {
                self.search.config_mut().use_book = value == Some("true");
            }
            "UCI_ShowCurrLine" => {
                self.search.config_mut().show_curr_line = value == Some("true");
            }
            other => warn!(option = other, "unknown option ignored"),
        }
    }

    /// Current position (exposed for tests).
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Access to the search (exposed for tests).
    pub fn search_mut(&mut self) -> &mut Search {
        &mut self.search
    }
}

impl Default for UciEngine {
    fn default() -> Self {
        Self::new()
    }
}
