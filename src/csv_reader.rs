// CSV loading for the canonical event table

use crate::data::{EventRecord, Table};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{self, Read};

/// One CSV row before its flag and reaction cells are decoded.
#[derive(Debug, Deserialize)]
struct CsvEvent {
    datetime: DateTime<FixedOffset>,
    author: String,
    channel_name: String,
    word_count: i64,
    #[serde(default)]
    scene_end: Option<String>,
    #[serde(default)]
    reactions: Option<String>,
}

impl CsvEvent {
    fn into_record(self) -> Result<EventRecord> {
        let scene_end = match self.scene_end.as_deref().map(str::trim) {
            None | Some("") => false,
            Some(flag) => parse_flag(flag).ok_or_else(|| anyhow!("Invalid scene_end flag '{}'", flag))?,
        };

        let reactions: BTreeMap<String, i64> = match self.reactions.as_deref().map(str::trim) {
            None | Some("") => BTreeMap::new(),
            Some(cell) => serde_json::from_str(cell)
                .with_context(|| format!("Invalid reactions cell '{}'", cell))?,
        };

        Ok(EventRecord {
            datetime: self.datetime,
            author: self.author,
            channel_name: self.channel_name,
            word_count: self.word_count,
            scene_end,
            reactions,
        })
    }
}

fn parse_flag(flag: &str) -> Option<bool> {
    match flag.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Read events from any CSV source with the canonical header
/// (`datetime,author,channel_name,word_count,scene_end,reactions`).
pub fn read_events<R: Read>(reader: R) -> Result<Table> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (idx, row) in csv.deserialize::<CsvEvent>().enumerate() {
        // Line numbers are 1-based and the header takes line 1
        let line = idx + 2;
        let event = row.with_context(|| format!("Failed to parse CSV row at line {}", line))?;
        records.push(event.into_record().with_context(|| format!("Invalid event at line {}", line))?);
    }

    if records.is_empty() {
        anyhow::bail!("CSV input contains no event rows");
    }

    Ok(Table::from_records(&records))
}

/// Read events as CSV from stdin
pub fn read_events_from_stdin() -> Result<Table> {
    let stdin = io::stdin();
    read_events(stdin.lock()).context("Failed to read CSV from stdin")
}
