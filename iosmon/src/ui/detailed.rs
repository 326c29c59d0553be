//! Detailed view: FPS/jank statistics, the flame graph and the thread list.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use iosmon::flame::{thread_list, FlameView};
use iosmon::history::stats;
use iosmon::state::PerfState;

use crate::ui::flame::draw_flame;
use crate::ui::net::draw_series_spark;
use crate::ui::theme::Palette;

pub fn draw_detailed(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    st: &PerfState,
    view: &FlameView,
    pal: &Palette,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(6)])
        .split(area);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(34), Constraint::Min(10)])
        .split(rows[0]);
    draw_fps_stats(f, top[0], st, pal);
    draw_series_spark(f, top[1], "FPS", "", &st.fps, 1.0, pal.fps);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(36)])
        .split(rows[1]);
    draw_flame(f, bottom[0], st, view, pal);
    draw_threads(f, bottom[1], st, view, pal);
}

fn draw_fps_stats(f: &mut ratatui::Frame<'_>, area: Rect, st: &PerfState, pal: &Palette) {
    let (avg, min, max) = stats(&st.fps);
    let jank_total: f64 = st.jank.iter().map(|p| p.value).sum();
    let lines = vec![
        Line::from(vec![
            Span::styled("FPS ", Style::default().fg(pal.fps)),
            Span::raw(format!("avg {avg:.1}  min {min:.1}  max {max:.1}")),
        ]),
        Line::from(vec![
            Span::styled("Jank ", Style::default().fg(pal.warn)),
            Span::raw(format!("{jank_total:.0} over {} samples", st.jank.len())),
        ]),
    ];
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Rendering")),
        area,
    );
}

fn draw_threads(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    st: &PerfState,
    view: &FlameView,
    pal: &Palette,
) {
    let (root, thread_stats, summary) = match st.flame.as_ref() {
        Some(d) => (Some(&d.root), Some(&d.thread_stats), Some(&d.summary)),
        None => (None, None, None),
    };
    let empty = Default::default();
    let threads = thread_list(root, thread_stats.unwrap_or(&empty));

    let mut lines = Vec::with_capacity(threads.len() + 2);
    if let Some(s) = summary {
        lines.push(Line::from(Span::styled(
            format!(
                "{} samples, {} threads, {:.1}s",
                s.total_samples, s.unique_threads, s.analysis_duration_s
            ),
            Style::default().fg(pal.dim),
        )));
    }
    let all_style = if view.selected_thread.is_none() {
        Style::default().fg(pal.accent).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    lines.push(Line::from(Span::styled("all threads", all_style)));
    for t in &threads {
        let style = if view.selected_thread.as_deref() == Some(t.name.as_str()) {
            Style::default().fg(pal.accent).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(
            format!(
                "{:<18} {:>6} {:>5.1}%",
                t.short_name,
                t.sample_count,
                t.cpu_ratio * 100.0
            ),
            style,
        )));
    }

    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Threads (t)")),
        area,
    );
}
