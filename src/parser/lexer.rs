// Lexical helpers shared by the command parsers

use crate::data::Value;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, satisfy},
    combinator::{map, map_opt, map_res, not, peek, recognize},
    multi::many0_count,
    number::complete::recognize_float,
    sequence::{delimited, pair, terminated},
    IResult,
};

/// Wrap a parser so it skips surrounding whitespace
pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// A whole word: `keyword("in")` matches `in` but not the start of `index`
pub fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(
        tag(word),
        not(peek(satisfy(|c: char| c.is_alphanumeric() || c == '_'))),
    )
}

/// Parse an identifier (column or field name)
pub fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0_count(alt((alphanumeric1, tag("_")))),
        )),
        |s: &str| s.to_string(),
    )(input)
}

/// Parse a double-quoted string, without escapes
pub fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        |s: &str| s.to_string(),
    )(input)
}

/// Parse a non-negative integer
pub fn integer(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}

/// Integers stay integers; anything with a fraction or exponent is a float
pub fn number_literal(input: &str) -> IResult<&str, Value> {
    map_opt(recognize_float, |s: &str| {
        s.parse::<i64>()
            .ok()
            .map(Value::Int)
            .or_else(|| s.parse::<f64>().ok().map(Value::Float))
    })(input)
}

/// A filter operand: quoted string, number, or bare word
pub fn value_literal(input: &str) -> IResult<&str, Value> {
    alt((
        map(string_literal, Value::Str),
        number_literal,
        map(identifier, Value::Str),
    ))(input)
}
