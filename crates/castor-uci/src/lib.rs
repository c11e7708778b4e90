//! UCI protocol front end.

mod command;
mod engine;
mod error;

pub use command::{Command, parse_command};
pub use engine::{UciEngine, UciSink};
pub use error::UciError;
