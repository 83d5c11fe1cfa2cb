use rpgraph::csv_reader;
use rpgraph::data::{ColumnId, Table, Value};
use rpgraph::runtime::{self, ChartSource};
use rpgraph::{Aggregation, AxisKind, Field, OutputFormat, PlotBuilder, RenderOptions};
use std::fs;
use std::path::Path;
use std::io::Write;
use std::process::{Command, Stdio};

/// Helper function to run the rpgraph binary with arguments and CSV on stdin
fn run_rpgraph(args: &[&str], csv_content: &str) -> Result<Vec<u8>, String> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_rpgraph"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to spawn process: {}", e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(csv_content.as_bytes())
            .map_err(|e| format!("Failed to write to stdin: {}", e))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("Failed to wait for process: {}", e))?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(String::from_utf8_lossy(&output.stderr).to_string())
    }
}

/// Check if bytes are a valid PNG
fn is_valid_png(bytes: &[u8]) -> bool {
    bytes.len() > 8 && bytes[0..8] == [137, 80, 78, 71, 13, 10, 26, 10]
}

fn events_csv() -> String {
    fs::read_to_string("test/events.csv").expect("Failed to read test CSV")
}

fn events() -> Table {
    csv_reader::read_events(events_csv().as_bytes()).unwrap()
}

fn json_payload(args: &[&str]) -> serde_json::Value {
    let mut full = args.to_vec();
    full.extend(["--format", "json"]);
    let bytes = run_rpgraph(&full, &events_csv()).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// Library end-to-end

#[test]
fn test_messages_per_user() {
    let mut builder = PlotBuilder::new(events());
    builder.author().count().sum().bar().build().unwrap();
    let chart = builder.chart().unwrap();

    assert_eq!(chart.title, "Messages by Users");
    assert_eq!(
        chart.traces[0].x,
        vec![Value::from("Alice"), Value::from("Bob"), Value::from("Carol")]
    );
    assert_eq!(chart.traces[0].y, vec![Some(4.0), Some(3.0), Some(3.0)]);
    assert_eq!(chart.x_axis.title, "Users");
}

#[test]
fn test_filtered_title_carries_clause() {
    let mut builder = PlotBuilder::new(events());
    builder
        .filter_min(Field::Hour, 10i64)
        .author()
        .count()
        .sum()
        .bar()
        .build()
        .unwrap();
    let chart = builder.chart().unwrap();

    assert_eq!(chart.title, "Messages by Users (Hour of Day ≥ 10)");
    assert_eq!(chart.traces[0].y, vec![Some(3.0), Some(2.0), Some(2.0)]);
}

#[test]
fn test_words_per_channel_mean() {
    let mut builder = PlotBuilder::new(events());
    builder
        .channel_name()
        .word_count()
        .mean()
        .sort(Field::WordCount, false)
        .bar()
        .build()
        .unwrap();
    let chart = builder.chart().unwrap();

    // docks (31 + 52) / 2, market (25 + 8 + 29) / 3, tavern (12 + 40 + 17 + 6 + 14) / 5
    assert_eq!(
        chart.traces[0].x,
        vec![Value::from("docks"), Value::from("market"), Value::from("tavern")]
    );
    assert_eq!(chart.traces[0].y[0], Some(41.5));
    assert!(chart.title.starts_with("Average Word Count"));
}

#[test]
fn test_daily_activity_with_moving_average_and_log_scale() {
    let mut builder = PlotBuilder::new(events());
    builder
        .date()
        .count()
        .sum()
        .line()
        .ylog()
        .moving_average(3, None)
        .build()
        .unwrap();
    let chart = builder.chart().unwrap();

    assert_eq!(chart.traces.len(), 2);
    assert_eq!(chart.traces[0].name, "Daily");
    assert!(chart.log_y());
    assert!(chart.y_axis.title.ends_with(" (log scale)"));
    // Six days of data, no value before the third
    assert_eq!(chart.traces[1].y.len(), 6);
    assert_eq!(chart.traces[1].y[1], None);
    assert!(chart.traces[1].y[2].is_some());
}

#[test]
fn test_cumulative_messages_over_days() {
    let mut builder = PlotBuilder::new(events());
    builder
        .date()
        .count()
        .sum()
        .cumulative(Field::Count, None)
        .plot(
            rpgraph::PlotKind::Line,
            Some(Field::Date.into()),
            Some(ColumnId::Cumulative(Field::Count)),
        )
        .build()
        .unwrap();
    let chart = builder.chart().unwrap();

    assert_eq!(
        chart.traces[0].y,
        vec![Some(3.0), Some(5.0), Some(7.0), Some(8.0), Some(9.0), Some(10.0)]
    );
}

#[test]
fn test_group_by_multiple_keeps_text_channel() {
    let mut builder = PlotBuilder::new(events());
    builder
        .count()
        .word_count()
        .author()
        .agg([(Field::Count, Aggregation::Sum), (Field::WordCount, Aggregation::Sum)].into_iter().collect())
        .scatter()
        .build()
        .unwrap();
    let chart = builder.chart().unwrap();

    assert_eq!(chart.text_field, Some(ColumnId::Field(Field::Author)));
    assert_eq!(chart.traces[0].y, vec![Some(83.0), Some(77.0), Some(74.0)]);
}

#[test]
fn test_request_from_fixture() {
    let request = runtime::load_request(Path::new("test/request.json")).unwrap();
    let chart = runtime::build_chart(events(), ChartSource::Request(request).commands().unwrap()).unwrap();

    assert_eq!(chart.title, "Messages per player");
    assert_eq!(chart.x_field, ColumnId::Field(Field::Author));
    assert_eq!(
        chart.traces[0].x,
        vec![Value::from("Alice"), Value::from("Bob"), Value::from("Carol")]
    );
    assert_eq!(chart.traces[0].y, vec![Some(4.0), Some(2.0), Some(2.0)]);
}

#[test]
fn test_render_png_and_svg() {
    let mut builder = PlotBuilder::new(events());
    builder.hour().value_counts().scatter().format_ticks().build().unwrap();
    let chart = builder.chart().unwrap();
    assert_eq!(chart.x_axis.tick_step, Some(1.0));

    let png = runtime::render_chart(chart, &RenderOptions::default()).unwrap();
    assert!(is_valid_png(&png));

    let svg_options = RenderOptions {
        format: OutputFormat::Svg,
        ..RenderOptions::default()
    };
    let svg = runtime::render_chart(chart, &svg_options).unwrap();
    assert!(String::from_utf8(svg).unwrap().contains("<svg"));
}

// Binary end-to-end

#[test]
fn test_end_to_end_bar_chart_png() {
    let result = run_rpgraph(&["author | count | sum | bar"], &events_csv());
    assert!(result.is_ok(), "Failed: {:?}", result.err());
    assert!(is_valid_png(&result.unwrap()), "Output is not a valid PNG");
}

#[test]
fn test_end_to_end_value_counts_json() {
    let payload = json_payload(&["df | hour | value_counts | scatter | ticks"]);
    assert_eq!(payload["kind"], "scatter");
    assert_eq!(payload["rows"][0], serde_json::json!([9, 3]));
    assert_eq!(payload["rows"][1], serde_json::json!([10, 2]));
    assert_eq!(payload["x_axis"]["tick_step"], 1.0);
}

#[test]
fn test_end_to_end_reaction_counts() {
    let payload = json_payload(&["author | reaction(\"heart\") | sum | bar"]);
    assert_eq!(payload["title"], "Number of heart Reactions by Users");
    // Alice 2 + 1 + 1, Bob 4, Carol none
    assert_eq!(payload["traces"][0]["y"], serde_json::json!([4.0, 4.0, 0.0]));
}

#[test]
fn test_end_to_end_request_file() {
    let payload = json_payload(&["--request", "test/request.json"]);
    assert_eq!(payload["title"], "Messages per player");
}

#[test]
fn test_end_to_end_json_input() {
    let dir = std::env::temp_dir().join(format!("rpgraph-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("events.json");
    fs::write(
        &path,
        r#"[
            {"datetime": "2024-11-01T09:30:00+00:00", "author": "Alice", "channel_name": "tavern",
             "word_count": 12, "scene_end": false, "reactions": {}},
            {"datetime": "2024-11-01T10:00:00+00:00", "author": "Bob", "channel_name": "tavern",
             "word_count": 20, "scene_end": false, "reactions": {}}
        ]"#,
    )
    .unwrap();

    let bytes = run_rpgraph(
        &["channel_name | word_count | sum | bar", "--input", path.to_str().unwrap(), "-f", "json"],
        "",
    )
    .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(payload["rows"], serde_json::json!([["tavern", 32]]));
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_end_to_end_parse_error() {
    let result = run_rpgraph(&["author | explode"], &events_csv());
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("Parse error"));
}

#[test]
fn test_end_to_end_chart_before_fields_fails() {
    let result = run_rpgraph(&["bar"], &events_csv());
    assert!(result.is_err());
}

#[test]
fn test_end_to_end_empty_input() {
    let result = run_rpgraph(
        &["author | count | sum | bar"],
        "datetime,author,channel_name,word_count,scene_end,reactions\n",
    );
    assert!(result.is_err());
}

#[test]
fn test_log_axis_title_overridden() {
    let mut builder = PlotBuilder::new(events());
    builder
        .author()
        .count()
        .sum()
        .bar()
        .ylog()
        .y_label("Posts")
        .build()
        .unwrap();
    let chart = builder.chart().unwrap();
    assert_eq!(chart.axis(AxisKind::Y).title, "Posts");
    assert!(chart.log_y());
}
