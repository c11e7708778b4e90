//! UCI command parsing.

use std::time::Duration;

use castor_core::{Board, Move, is_legal};
use castor_engine::SearchMode;
use tracing::warn;

use crate::error::UciError;

/// A parsed UCI command.
#[derive(Debug)]
pub enum Command {
    /// `uci` - identify the engine.
    Uci,
    /// `isready` - synchronization ping.
    IsReady,
    /// `debug on|off`.
    Debug(bool),
    /// `setoption name X [value V]`.
    SetOption {
        /// Option name, verbatim.
        name: String,
        /// Option value, if given.
        value: Option<String>,
    },
    /// `ucinewgame` - reset game state.
    UciNewGame,
    /// `position ...` - board plus the hash history of the replayed moves.
    Position {
        /// The resulting position.
        board: Board,
        /// Zobrist hashes of every earlier position, for repetition checks.
        history: Vec<u64>,
    },
    /// `go ...` - start searching.
    Go(SearchMode),
    /// `stop` - halt the search.
    Stop,
    /// `ponderhit` - the pondered move was played.
    PonderHit,
    /// `quit` - exit.
    Quit,
    /// Anything unrecognized; ignored per protocol.
    Unknown(String),
}

/// Parse one line of UCI input.
pub fn parse_command(line: &str) -> Result<Command, UciError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&first) = tokens.first() else {
        return Ok(Command::Unknown(String::new()));
    };

    match first {
        "uci" => Ok(Command::Uci),
        "isready" => Ok(Command::IsReady),
        "ucinewgame" => Ok(Command::UciNewGame),
        "stop" => Ok(Command::Stop),
        "ponderhit" => Ok(Command::PonderHit),
        "quit" => Ok(Command::Quit),
        "debug" => Ok(Command::Debug(tokens.get(1) == Some(&"on"))),
        "setoption" => parse_setoption(&tokens[1..]),
        "position" => parse_position(&tokens[1..]),
        "go" => parse_go(&tokens[1..]),
        other => Ok(Command::Unknown(other.to_string())),
    }
}

/// Parse `setoption name <name...> [value <value...>]`.
fn parse_setoption(tokens: &[&str]) -> Result<Command, UciError> {
    if tokens.first() != Some(&"name") {
        return Err(UciError::MissingOptionName);
    }
    let value_pos = tokens.iter().position(|&t| t == "value");
    let name_end = value_pos.unwrap_or(tokens.len());
    let name = tokens[1..name_end].join(" ");
    if name.is_empty() {
        return Err(UciError::MissingOptionName);
    }
    let value = value_pos.map(|pos| tokens[pos + 1..].join(" "));
    Ok(Command::SetOption { name, value })
}

/// Parse `position [startpos | fen <fen>] [moves ...]`.
///
/// The move list is applied best effort: the first unparsable or illegal
/// move is logged and the rest of the list is dropped.
fn parse_position(tokens: &[&str]) -> Result<Command, UciError> {
    let (mut board, rest) = match tokens.first() {
        Some(&"startpos") => (Board::starting_position(), &tokens[1..]),
        Some(&"fen") => {
            // A FEN is up to six fields, ending before an optional "moves".
            let fen_end = tokens
                .iter()
                .position(|&t| t == "moves")
                .unwrap_or(tokens.len());
            let fen = tokens[1..fen_end].join(" ");
            let board: Board = fen
                .parse()
                .map_err(|_| UciError::InvalidFen { fen: fen.clone() })?;
            (board, &tokens[fen_end..])
        }
        _ => return Err(UciError::MalformedPosition),
    };

    let mut history = Vec::new();
    if rest.first() == Some(&"moves") {
        for token in &rest[1..] {
            let mv = Move::from_uci(token, &board).filter(|&mv| is_legal(&board, mv));
            let Some(mv) = mv else {
                warn!(mv = %token, "invalid move in position command, dropping the rest");
                break;
            };
            history.push(board.hash());
            board = board.make_move(mv);
        }
    }

    Ok(Command::Position { board, history })
}

/// Parse the `go` parameters into a [`SearchMode`].
fn parse_go(tokens: &[&str]) -> Result<Command, UciError> {
    let mut mode = SearchMode::default();

    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "wtime" => {
                mode.white_time = Some(parse_millis(tokens.get(i + 1), "wtime")?);
                i += 2;
            }
            "btime" => {
                mode.black_time = Some(parse_millis(tokens.get(i + 1), "btime")?);
                i += 2;
            }
            "winc" => {
                mode.white_inc = Some(parse_millis(tokens.get(i + 1), "winc")?);
                i += 2;
            }
            "binc" => {
                mode.black_inc = Some(parse_millis(tokens.get(i + 1), "binc")?);
                i += 2;
            }
            "movestogo" => {
                mode.moves_to_go = Some(parse_int(tokens.get(i + 1), "movestogo")?);
                i += 2;
            }
            "depth" => {
                // Depth 0 makes no sense; fall back to an unbounded search.
                let depth: u8 = parse_int(tokens.get(i + 1), "depth")?;
                if depth == 0 {
                    mode.infinite = true;
                } else {
                    mode.depth = Some(depth);
                }
                i += 2;
            }
            "nodes" => {
                mode.nodes = Some(parse_int(tokens.get(i + 1), "nodes")?);
                i += 2;
            }
            "movetime" => {
                let ms = parse_millis(tokens.get(i + 1), "movetime")?;
                if ms.is_zero() {
                    mode.infinite = true;
                } else {
                    mode.move_time = Some(ms);
                }
                i += 2;
            }
            "mate" => {
                mode.mate = Some(parse_int(tokens.get(i + 1), "mate")?);
                i += 2;
            }
            "perft" => {
                mode.perft = Some(parse_int(tokens.get(i + 1), "perft")?);
                i += 2;
            }
            "infinite" => {
                mode.infinite = true;
                i += 1;
            }
            "ponder" => {
                mode.ponder = true;
                i += 1;
            }
            "searchmoves" => {
                // Consume move-shaped tokens until the next keyword.
                i += 1;
                while i < tokens.len() && looks_like_move(tokens[i]) {
                    mode.search_moves.push(tokens[i].to_string());
                    i += 1;
                }
            }
            _ => {
                // Unknown token: skip, per UCI convention.
                i += 1;
            }
        }
    }

    Ok(Command::Go(mode))
}

/// Cheap shape test for UCI move strings ("e2e4", "e7e8q").
fn looks_like_move(token: &str) -> bool {
    let bytes = token.as_bytes();
    (bytes.len() == 4 || bytes.len() == 5)
        && bytes[0].is_ascii_lowercase()
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_lowercase()
        && bytes[3].is_ascii_digit()
}

fn parse_millis(token: Option<&&str>, param: &str) -> Result<Duration, UciError> {
    let value = token.ok_or_else(|| UciError::MissingGoValue { param: param.to_string() })?;
    // Some GUIs send negative clocks when flagging; clamp to zero.
    let ms: i64 = value.parse().map_err(|_| UciError::InvalidGoValue {
        param: param.to_string(),
        value: value.to_string(),
    })?;
    Ok(Duration::from_millis(ms.max(0) as u64))
}

fn parse_int<T: std::str::FromStr>(token: Option<&&str>, param: &str) -> Result<T, UciError> {
    let value = token.ok_or_else(|| UciError::MissingGoValue { param: param.to_string() })?;
    value.parse().map_err(|_| UciError::InvalidGoValue {
        param: param.to_string(),
        value: value.to_string(),
    })
}
