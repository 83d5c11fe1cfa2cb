// Pipeline parser: commands separated by `|`

use super::command::parse_command;
use super::lexer::{keyword, ws};
use crate::command::Command;
use nom::{
    bytes::complete::tag,
    combinator::{eof, opt},
    multi::separated_list1,
    sequence::pair,
    IResult,
};

/// Parse a complete pipeline
/// Format: command | command | ...
pub fn parse_pipeline(input: &str) -> IResult<&str, Vec<Command>> {
    // Optional: consume leading "df |", as in a dataframe chain
    let (input, _) = opt(pair(ws(keyword("df")), ws(tag("|"))))(input)?;

    let (input, commands) = separated_list1(ws(tag("|")), parse_command)(input)?;

    // Consume trailing whitespace and ensure end of input
    let (input, _) = ws(eof)(input)?;

    Ok((input, commands))
}
