//! Sparkline panels over a metric stream (network rates and friends).

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Borders, Sparkline},
};

use iosmon::history::{last_value, spark_data, stats, Series};

/// Bordered sparkline titled `"{title}  now: .. | avg: .. | peak: .."`.
/// `scale` maps stream values to bar heights (e.g. 10.0 keeps one decimal of a percentage).
pub fn draw_series_spark(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    title: &str,
    unit: &str,
    series: &Series,
    scale: f64,
    color: Color,
) {
    let (avg, _, peak) = stats(series);
    let now = last_value(series).unwrap_or(0.0);
    let max_points = area.width.saturating_sub(2) as usize;
    let data = spark_data(series, max_points, scale);

    let spark = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title(format!(
            "{title}  now: {now:.1}{unit} | avg: {avg:.1}{unit} | peak: {peak:.1}{unit}"
        )))
        .data(&data)
        .style(Style::default().fg(color));
    f.render_widget(spark, area);
}

pub fn draw_net_spark(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    title: &str,
    series: &Series,
    color: Color,
) {
    draw_series_spark(f, area, title, " KB/s", series, 1.0, color);
}
