// Reference renderer: plotters drawing of a chart payload

use crate::data::Value;
use crate::ir::{ChartPayload, PlotKind, Trace};
use anyhow::{Context, Result};
use image::ImageEncoder;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::ops::Range;
use tracing::debug;

const BAR_WIDTH: f64 = 0.8;
const OVERLAY_COLORS: [RGBColor; 4] = [RED, GREEN, MAGENTA, CYAN];

/// Reference renderer: draws a chart payload with plotters
pub struct Canvas {
    width: u32,
    height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Draw into an RGB buffer and encode it as PNG
    pub fn render_png(&self, chart: &ChartPayload) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; (self.width * self.height * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (self.width, self.height))
                .into_drawing_area();
            draw(&root, chart)?;
            root.present().context("Failed to present drawing")?;
        }

        let mut png_bytes = Vec::new();
        {
            let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
            encoder
                .write_image(&buffer, self.width, self.height, image::ColorType::Rgb8)
                .context("Failed to encode PNG")?;
        }

        Ok(png_bytes)
    }

    /// Draw as an SVG document
    pub fn render_svg(&self, chart: &ChartPayload) -> Result<String> {
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (self.width, self.height))
                .into_drawing_area();
            draw(&root, chart)?;
            root.present().context("Failed to present drawing")?;
        }
        Ok(svg)
    }
}

/// Screen-space view of a payload: every value mapped onto plain f64
/// coordinates, log axes already in log10 units.
struct Layout {
    x: Vec<Option<f64>>,
    categories: Option<Vec<String>>,
    series: Vec<Vec<Option<f64>>>,
    x_range: Range<f64>,
    y_range: Range<f64>,
    log_x: bool,
    log_y: bool,
}

impl Layout {
    fn new(chart: &ChartPayload) -> Result<Self> {
        let main = chart
            .traces
            .first()
            .context("Chart has no data series")?;

        let numeric_x = chart.kind != PlotKind::Bar
            && main.x.iter().all(|v| v.is_null() || v.as_f64().is_some());
        let log_x = chart.log_x() && numeric_x;

        let (x, categories): (Vec<Option<f64>>, Option<Vec<String>>) = if numeric_x {
            let x = main
                .x
                .iter()
                .map(|v| v.as_f64().and_then(|f| scale(f, log_x)))
                .collect();
            (x, None)
        } else {
            let x = (0..main.x.len()).map(|i| Some(i as f64)).collect();
            let labels = main.x.iter().map(Value::to_string).collect();
            (x, Some(labels))
        };

        let log_y = chart.log_y();
        let series: Vec<Vec<Option<f64>>> = chart
            .traces
            .iter()
            .map(|t| t.y.iter().map(|v| v.and_then(|f| scale(f, log_y))).collect())
            .collect();

        let all_x: Vec<f64> = present(&x);
        let mut all_y: Vec<f64> = series.iter().flat_map(|s| present(s)).collect();
        if all_x.is_empty() || all_y.is_empty() {
            anyhow::bail!("Cannot create canvas with no data points");
        }
        // Bars grow from zero
        if chart.kind == PlotKind::Bar && !log_y {
            all_y.push(0.0);
        }

        let x_range = if categories.is_some() {
            -0.5..(main.x.len() as f64 - 0.5)
        } else {
            padded_range(&all_x)
        };

        Ok(Layout {
            x,
            categories,
            series,
            x_range,
            y_range: padded_range(&all_y),
            log_x,
            log_y,
        })
    }

    fn x_label(&self, v: f64) -> String {
        match &self.categories {
            Some(labels) => {
                let idx = v.round();
                if (v - idx).abs() > 1e-6 || idx < 0.0 {
                    return String::new();
                }
                labels.get(idx as usize).cloned().unwrap_or_default()
            }
            None => format_number(unscale(v, self.log_x)),
        }
    }

    fn y_label(&self, v: f64) -> String {
        format_number(unscale(v, self.log_y))
    }

    fn points(&self, series: usize) -> Vec<(f64, f64)> {
        self.x
            .iter()
            .zip(&self.series[series])
            .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
            .collect()
    }
}

fn scale(v: f64, log: bool) -> Option<f64> {
    match log {
        false => Some(v),
        true if v > 0.0 => Some(v.log10()),
        true => None,
    }
}

fn unscale(v: f64, log: bool) -> f64 {
    if log {
        10f64.powf(v)
    } else {
        v
    }
}

fn present(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().flatten().copied().collect()
}

fn padded_range(values: &[f64]) -> Range<f64> {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        (min - 1.0)..(max + 1.0)
    } else {
        let padding = (max - min) * 0.05;
        (min - padding)..(max + padding)
    }
}

fn format_number(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        format!("{:.2}", v)
    }
}

fn draw<DB>(root: &DrawingArea<DB, Shift>, chart: &ChartPayload) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let layout = Layout::new(chart)?;
    root.fill(&WHITE).context("Failed to fill background")?;

    let mut cc = ChartBuilder::on(root)
        .margin(10)
        .caption(&chart.title, ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(layout.x_range.clone(), layout.y_range.clone())
        .context("Failed to build chart")?;

    let x_formatter = |v: &f64| layout.x_label(*v);
    let y_formatter = |v: &f64| layout.y_label(*v);
    let x_ticks = match (&layout.categories, chart.x_axis.tick_step) {
        (Some(labels), _) => Some(labels.len()),
        (None, Some(step)) if step > 0.0 => {
            Some(((layout.x_range.end - layout.x_range.start) / step).floor() as usize + 1)
        }
        _ => None,
    };

    let mut mesh = cc.configure_mesh();
    mesh.x_desc(chart.x_axis.title.as_str())
        .y_desc(chart.y_axis.title.as_str())
        .x_label_formatter(&x_formatter)
        .y_label_formatter(&y_formatter);
    if let Some(n) = x_ticks {
        mesh.x_labels(n);
    }
    mesh.draw().context("Failed to draw mesh")?;

    for (idx, trace) in chart.traces.iter().enumerate() {
        let color = if idx == 0 {
            BLUE
        } else {
            OVERLAY_COLORS[(idx - 1) % OVERLAY_COLORS.len()]
        };
        let points = layout.points(idx);
        debug!(trace = %trace.name, points = points.len(), "drawing trace");

        let anno = if idx == 0 {
            match chart.kind {
                PlotKind::Bar => {
                    let base = if layout.log_y { layout.y_range.start } else { 0.0 };
                    cc.draw_series(points.iter().map(|&(x, y)| {
                        Rectangle::new(
                            [(x - BAR_WIDTH / 2.0, base), (x + BAR_WIDTH / 2.0, y)],
                            color.filled(),
                        )
                    }))
                    .context("Failed to draw bar series")?
                }
                PlotKind::Line => cc
                    .draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))
                    .context("Failed to draw line series")?,
                PlotKind::Scatter => cc
                    .draw_series(points.iter().map(|&(x, y)| Circle::new((x, y), 4, color.filled())))
                    .context("Failed to draw point series")?,
            }
        } else {
            cc.draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))
                .context("Failed to draw overlay series")?
        };

        if trace.show_legend {
            anno.label(trace.name.as_str()).legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });
        }

        if let Some(text) = &trace.text {
            draw_annotations(&mut cc, &layout, trace, text)?;
        }
    }

    if chart.traces.iter().any(|t| t.show_legend) {
        cc.configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .context("Failed to draw legend")?;
    }

    Ok(())
}

fn draw_annotations<DB>(
    cc: &mut ChartContext<'_, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    layout: &Layout,
    trace: &Trace,
    text: &[Value],
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let labels: Vec<(String, (f64, f64))> = layout
        .x
        .iter()
        .zip(&layout.series[0])
        .zip(text)
        .filter_map(|((x, y), label)| Some((label.to_string(), ((*x)?, (*y)?))))
        .collect();
    debug!(trace = %trace.name, labels = labels.len(), "drawing annotations");

    cc.draw_series(
        labels
            .into_iter()
            .map(|(label, pos)| Text::new(label, pos, ("sans-serif", 12).into_font())),
    )
    .context("Failed to draw annotations")?;
    Ok(())
}
