//! PNG/SVG rendering for the statistics parts of the pipeline: a two-group
//! bar chart with individual points and a multi-group boxplot, both with the
//! test's p-value annotated.
#![deny(missing_docs)]

use anyhow::{bail, Context, Result};
use group_stats::{describe, significance_stars};
use plotters::coord::Shift;
use plotters::prelude::{
    BitMapBackend, Boxplot, ChartBuilder, Circle, Color, DrawingArea, DrawingBackend, ErrorBar,
    IntoDrawingArea, IntoFont, Quartiles, Rectangle, SVGBackend, Text, BLACK, WHITE,
};
pub use plotters::style::RGBColor;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::TextStyle;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

const PLOT_WIDTH: u32 = 1200;
const PLOT_HEIGHT: u32 = 1000;
const BOX_PLOT_WIDTH: u32 = 1400;
const BOX_PLOT_HEIGHT: u32 = 900;
const JITTER: f64 = 0.08;
const POINT_SIZE: u32 = 5;

/// Bar colors for the two-group comparison (blue vs red).
pub const TWO_GROUP_COLORS: [RGBColor; 2] = [RGBColor(52, 152, 219), RGBColor(231, 76, 60)];

/// Parse a `#rrggbb` hex color, as carried in the group-color configuration.
pub fn parse_hex_color(s: &str) -> Result<RGBColor> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 {
        bail!("expected 6 hex digits in color {s:?}");
    }
    let channel = |range| {
        u8::from_str_radix(&hex[range], 16).with_context(|| format!("bad hex color {s:?}"))
    };
    Ok(RGBColor(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn metric_label(metric: &str) -> String {
    metric.replace('_', " ")
}

fn centered(font_size: u32) -> TextStyle<'static> {
    TextStyle::from(("sans-serif", font_size).into_font())
        .pos(Pos::new(HPos::Center, VPos::Top))
}

fn deterministic_jitter(n: usize) -> Vec<f64> {
    // Fixed seed: rerunning the pipeline reproduces the same figure.
    let mut rng = SmallRng::seed_from_u64(42);
    (0..n).map(|_| rng.random_range(-JITTER..=JITTER)).collect()
}

fn draw_two_group<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    tissue: &str,
    metric: &str,
    groups: [(&str, &[f64]); 2],
    p_value: f64,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let summaries = [
        describe(groups[0].1).context("empty first group")?,
        describe(groups[1].1).context("empty second group")?,
    ];

    let data_max = groups
        .iter()
        .flat_map(|(_, values)| values.iter().copied())
        .chain(
            summaries
                .iter()
                .map(|s| s.mean + s.sem.unwrap_or(0.0)),
        )
        .fold(0.0f64, f64::max);
    let y_max = if data_max > 0.0 { data_max * 1.2 } else { 1.0 };
    let y_min = -0.12 * y_max;

    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(root)
        .caption(
            format!("{tissue}: {}", metric_label(metric)),
            ("sans-serif", 30),
        )
        .margin(20)
        .x_label_area_size(10)
        .y_label_area_size(70)
        .build_cartesian_2d(-0.6f64..1.6f64, y_min..y_max)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|_| String::new())
        .y_desc(metric_label(metric))
        .draw()?;

    for (i, ((group, values), summary)) in groups.iter().zip(&summaries).enumerate() {
        let x = i as f64;
        let color = TWO_GROUP_COLORS[i];
        chart.draw_series([Rectangle::new(
            [(x - 0.3, 0.0), (x + 0.3, summary.mean)],
            color.mix(0.7).filled(),
        )])?;
        chart.draw_series([Rectangle::new(
            [(x - 0.3, 0.0), (x + 0.3, summary.mean)],
            BLACK.stroke_width(1),
        )])?;
        if let Some(sem) = summary.sem {
            chart.draw_series([ErrorBar::new_vertical(
                x,
                summary.mean - sem,
                summary.mean,
                summary.mean + sem,
                BLACK.stroke_width(2),
                12,
            )])?;
        }
        let jitter = deterministic_jitter(values.len());
        chart.draw_series(values.iter().zip(jitter).map(|(&v, dx)| {
            Circle::new((x + dx, v), POINT_SIZE, BLACK.mix(0.6).filled())
        }))?;
        chart.draw_series([Text::new(
            (*group).to_string(),
            (x, -0.03 * y_max),
            centered(22),
        )])?;
    }

    let annotation = format!("p={p_value:.4} {}", significance_stars(p_value));
    let style = TextStyle::from(("sans-serif", 24).into_font())
        .pos(Pos::new(HPos::Right, VPos::Top));
    chart.draw_series([Text::new(annotation, (1.55, y_max * 0.98), style)])?;
    Ok(())
}

/// Render the two-group comparison (bars at group means with SEM error bars,
/// jittered individual points, rank-sum p-value) as both PNG and SVG.
pub fn two_group_bar(
    png_path: &Path,
    svg_path: &Path,
    tissue: &str,
    metric: &str,
    group_a: (&str, &[f64]),
    group_b: (&str, &[f64]),
    p_value: f64,
) -> Result<()> {
    {
        let root = BitMapBackend::new(png_path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
        draw_two_group(&root, tissue, metric, [group_a, group_b], p_value)?;
        root.present()
            .with_context(|| format!("writing {}", png_path.display()))?;
    }
    let root = SVGBackend::new(svg_path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
    draw_two_group(&root, tissue, metric, [group_a, group_b], p_value)?;
    root.present()
        .with_context(|| format!("writing {}", svg_path.display()))?;
    Ok(())
}

/// Render the multi-group comparison (per-group boxplot without fliers,
/// overlaid points in group colors, Kruskal-Wallis p-value) as PNG.
pub fn multi_group_box(
    png_path: &Path,
    tissue: &str,
    metric: &str,
    groups: &[(String, RGBColor, Vec<f64>)],
    p_value: f64,
) -> Result<()> {
    if groups.len() < 2 {
        bail!("boxplot needs at least two groups");
    }
    let all: Vec<f32> = groups
        .iter()
        .flat_map(|(_, _, values)| values.iter().map(|&v| v as f32))
        .collect();
    let Some(data_min) = all.iter().copied().reduce(f32::min) else {
        bail!("boxplot needs observations");
    };
    let data_max = all.iter().copied().fold(data_min, f32::max);
    let span = if data_max > data_min { data_max - data_min } else { 1.0 };
    let y_max = data_max + 0.15 * span;
    let y_min = data_min - 0.20 * span;

    let root = BitMapBackend::new(png_path, (BOX_PLOT_WIDTH, BOX_PLOT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;
    let n = groups.len() as f32;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("{tissue}: {}", metric_label(metric)),
            ("sans-serif", 30),
        )
        .margin(20)
        .x_label_area_size(10)
        .y_label_area_size(70)
        .build_cartesian_2d(0.4f32..(n + 0.6), y_min..y_max)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|_| String::new())
        .y_desc(metric_label(metric))
        .draw()?;

    for (i, (name, color, values)) in groups.iter().enumerate() {
        let pos = i as f32 + 1.0;
        let quartiles = Quartiles::new(values);
        chart.draw_series([Boxplot::new_vertical(pos, &quartiles)
            .width(50)
            .style(color)])?;
        let jitter = deterministic_jitter(values.len());
        chart.draw_series(values.iter().zip(jitter).map(|(&v, dx)| {
            Circle::new(
                (pos + dx as f32, v as f32),
                POINT_SIZE,
                color.mix(0.6).filled(),
            )
        }))?;
        chart.draw_series([Text::new(
            name.clone(),
            (pos, data_min - 0.10 * span),
            centered(22),
        )])?;
    }

    let annotation = format!(
        "Kruskal-Wallis p={p_value:.4} {}",
        significance_stars(p_value)
    );
    chart.draw_series([Text::new(
        annotation,
        ((n + 1.0) / 2.0, y_max - 0.02 * span),
        centered(24),
    )])?;
    root.present()
        .with_context(|| format!("writing {}", png_path.display()))?;
    Ok(())
}
