// Pipe DSL parser module

pub mod command;
pub mod lexer;
pub mod pipeline;

use crate::command::Command;
use anyhow::{anyhow, Result};

pub use pipeline::parse_pipeline;

/// Parse a whole DSL string into the command list the builder replays.
pub fn parse_commands(input: &str) -> Result<Vec<Command>> {
    match parse_pipeline(input) {
        Ok((_, commands)) => Ok(commands),
        Err(e) => Err(anyhow!("Parse error: {:?}", e)),
    }
}
