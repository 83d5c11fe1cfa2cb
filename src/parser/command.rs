// Command parsers for the pipe DSL

use super::lexer::{identifier, integer, keyword, string_literal, value_literal, ws};
use crate::aggregation::Aggregation;
use crate::command::Command;
use crate::data::ColumnId;
use crate::field::Field;
use crate::filter::{FilterGroup, FilterValue, Operator};
use crate::ir::{AxisKind, PlotKind};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{map, map_res, opt, value},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair},
    IResult,
};

/// Parse a catalog field name
pub fn field(input: &str) -> IResult<&str, Field> {
    map_res(identifier, |s| s.parse::<Field>())(input)
}

/// Parse any column name: a field, `cumulative_<field>`, or an alias
fn column(input: &str) -> IResult<&str, ColumnId> {
    map(identifier, |s| ColumnId::parse(&s))(input)
}

fn aggregation(input: &str) -> IResult<&str, Aggregation> {
    alt((
        value(Aggregation::Sum, keyword("sum")),
        value(Aggregation::Mean, keyword("mean")),
        value(Aggregation::CountDistinct, keyword("nunique")),
    ))(input)
}

fn operator(input: &str) -> IResult<&str, Operator> {
    alt((
        value(Operator::Leq, tag("<=")),
        value(Operator::Geq, tag(">=")),
        value(Operator::Lt, tag("<")),
        value(Operator::Gt, tag(">")),
        value(Operator::Eq, tag("=")),
        value(Operator::NotIn, pair(keyword("not"), ws(keyword("in")))),
        value(Operator::In, keyword("in")),
        value(Operator::Before, keyword("before")),
        value(Operator::During, keyword("during")),
        value(Operator::After, keyword("after")),
    ))(input)
}

fn filter_value(input: &str) -> IResult<&str, FilterValue> {
    alt((
        map(
            delimited(
                ws(char('[')),
                separated_list0(ws(char(',')), ws(value_literal)),
                ws(char(']')),
            ),
            FilterValue::List,
        ),
        map(value_literal, FilterValue::Scalar),
    ))(input)
}

/// Wrap arguments in parentheses
fn parens<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(ws(char('(')), inner, ws(char(')')))
}

/// Parse a field selection
/// Format: author, word_count, hour, ...
pub fn parse_field(input: &str) -> IResult<&str, Command> {
    map(field, |field| Command::AddField { field })(input)
}

/// Parse a single-reaction count
/// Format: reaction("heart")
pub fn parse_reaction(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws(keyword("reaction"))(input)?;
    let (input, reaction) = parens(ws(string_literal))(input)?;
    Ok((
        input,
        Command::AddReactionField {
            field: Field::ReactionCount,
            reaction,
        },
    ))
}

/// Parse a one-aggregation group-by
/// Format: sum, mean, nunique, or sum(author) to name the grouping key
pub fn parse_group_by(input: &str) -> IResult<&str, Command> {
    let (input, aggregation) = ws(aggregation)(input)?;
    let (input, field) = opt(parens(ws(field)))(input)?;
    Ok((input, Command::GroupBy { aggregation, field }))
}

/// Parse a per-field group-by
/// Format: agg(word_count: mean, author: nunique)
pub fn parse_agg(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws(keyword("agg"))(input)?;
    let (input, pairs) = parens(separated_list1(
        ws(char(',')),
        separated_pair(ws(field), ws(char(':')), ws(aggregation)),
    ))(input)?;
    Ok((
        input,
        Command::GroupByMultiple {
            aggregations: pairs.into_iter().collect(),
        },
    ))
}

/// Format: value_counts
pub fn parse_value_counts(input: &str) -> IResult<&str, Command> {
    value(Command::ValueCounts, ws(keyword("value_counts")))(input)
}

/// Parse a row filter
/// Format: filter(hour >= 9), filter(author in [Alice, Bob]), filter(date before "2024-11-02")
pub fn parse_filter(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws(keyword("filter"))(input)?;
    let (input, (field, operator, value)) = parens(|i| {
        let (i, field) = ws(field)(i)?;
        let (i, operator) = ws(operator)(i)?;
        let (i, value) = ws(filter_value)(i)?;
        Ok((i, (field, operator, value)))
    })(input)?;
    Ok((input, Command::Filter(FilterGroup::new(field, operator, value))))
}

/// Parse a sort
/// Format: sort(count) or sort(count, desc)
pub fn parse_sort(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws(keyword("sort"))(input)?;
    let (input, (column, ascending)) = parens(pair(
        ws(column),
        opt(preceded(
            ws(char(',')),
            alt((value(true, ws(keyword("asc"))), value(false, ws(keyword("desc"))))),
        )),
    ))(input)?;
    Ok((
        input,
        Command::Sort {
            column,
            ascending: ascending.unwrap_or(true),
        },
    ))
}

/// Parse a running total
/// Format: cumulative(word_count) or cumulative(author, as: "messages")
pub fn parse_cumulative(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws(keyword("cumulative"))(input)?;
    let (input, (field, result)) = parens(pair(
        ws(field),
        opt(preceded(
            ws(char(',')),
            preceded(ws(tag("as:")), ws(string_literal)),
        )),
    ))(input)?;
    Ok((input, Command::Cumulative { field, result }))
}

/// Parse chart construction
/// Format: bar, line, scatter, or line(x: date, y: cumulative_count)
pub fn parse_chart(input: &str) -> IResult<&str, Command> {
    let (input, kind) = ws(alt((
        value(PlotKind::Bar, keyword("bar")),
        value(PlotKind::Line, keyword("line")),
        value(PlotKind::Scatter, keyword("scatter")),
    )))(input)?;

    let (input, args) = opt(parens(separated_list0(
        ws(char(',')),
        alt((
            map(preceded(ws(tag("x:")), ws(column)), |c| (AxisKind::X, c)),
            map(preceded(ws(tag("y:")), ws(column)), |c| (AxisKind::Y, c)),
        )),
    )))(input)?;

    let mut x = None;
    let mut y = None;
    for (axis, column) in args.unwrap_or_default() {
        match axis {
            AxisKind::X => x = Some(column),
            AxisKind::Y => y = Some(column),
        }
    }

    Ok((input, Command::Chart { kind, x, y }))
}

/// Format: xlog, ylog
pub fn parse_log_scale(input: &str) -> IResult<&str, Command> {
    ws(alt((
        value(Command::LogScale { axis: AxisKind::X }, keyword("xlog")),
        value(Command::LogScale { axis: AxisKind::Y }, keyword("ylog")),
    )))(input)
}

/// Parse a moving-average overlay
/// Format: mavg(7) or mavg(14, "Fortnightly")
pub fn parse_moving_average(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws(keyword("mavg"))(input)?;
    let (input, (window, label)) = parens(pair(
        ws(integer),
        opt(preceded(ws(char(',')), ws(string_literal))),
    ))(input)?;
    Ok((input, Command::MovingAverage { window, label }))
}

/// Format: ticks
pub fn parse_ticks(input: &str) -> IResult<&str, Command> {
    value(Command::FormatTicks, ws(keyword("ticks")))(input)
}

/// Parse a title override
/// Format: title("..."), xlabel("..."), ylabel("...")
pub fn parse_titles(input: &str) -> IResult<&str, Command> {
    alt((
        map(preceded(ws(keyword("title")), parens(ws(string_literal))), |title| {
            Command::SetTitle { title }
        }),
        map(preceded(ws(keyword("xlabel")), parens(ws(string_literal))), |title| {
            Command::SetAxisTitle {
                axis: AxisKind::X,
                title,
            }
        }),
        map(preceded(ws(keyword("ylabel")), parens(ws(string_literal))), |title| {
            Command::SetAxisTitle {
                axis: AxisKind::Y,
                title,
            }
        }),
    ))(input)
}

/// Parse any command
pub fn parse_command(input: &str) -> IResult<&str, Command> {
    alt((
        parse_reaction,
        parse_group_by,
        parse_agg,
        parse_value_counts,
        parse_filter,
        parse_sort,
        parse_cumulative,
        parse_chart,
        parse_log_scale,
        parse_moving_average,
        parse_ticks,
        parse_titles,
        ws(parse_field),
    ))(input)
}
