//! Flame graph panel: one terminal row per stack depth, frames as colored cells.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use iosmon::flame::{
    color_for_name, layout, simplify_name, Display, FlameFrame, FlameView, MIN_WIDTH_PERCENT,
};
use iosmon::state::PerfState;
use iosmon::types::FlameGraphNode;

use crate::ui::theme::Palette;

/// Frames currently laid out for the view, with the root they were laid out from.
pub fn visible_frames(
    st: &PerfState,
    view: &FlameView,
) -> Option<(FlameGraphNode, Vec<FlameFrame>)> {
    match view.display(st.flame.as_ref()) {
        Display::Tree(root) => {
            let frames = layout(&root, view.zoom, MIN_WIDTH_PERCENT);
            Some((root, frames))
        }
        Display::Waiting | Display::NoData => None,
    }
}

/// Column span `[start, end)` of a frame on a canvas `cols` wide, before clipping.
fn frame_columns(fr: &FlameFrame, cols: f64) -> (usize, usize) {
    let start = (fr.start * cols).round() as usize;
    let end = ((fr.start + fr.width) * cols).round() as usize;
    (start, end.max(start + 1))
}

fn row_line(
    frames: &[&FlameFrame],
    cursor: Option<&FlameFrame>,
    width: usize,
    zoom: f64,
) -> Line<'static> {
    let cols = width as f64 * zoom;
    let mut spans = Vec::new();
    let mut col = 0usize;
    for fr in frames {
        let (start, end) = frame_columns(fr, cols);
        if start >= width || start < col {
            continue;
        }
        let end = end.min(width);
        if start > col {
            spans.push(Span::raw(" ".repeat(start - col)));
        }
        let w = end - start;
        let label = simplify_name(&fr.name, w);
        let text: String = format!("{label:<w$}").chars().take(w).collect();
        let mut style = Style::default().bg(color_for_name(&fr.name)).fg(Color::Black);
        if cursor.is_some_and(|c| c.path == fr.path) {
            style = style.add_modifier(Modifier::REVERSED | Modifier::BOLD);
        }
        spans.push(Span::styled(text, style));
        col = end;
    }
    Line::from(spans)
}

pub fn draw_flame(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    st: &PerfState,
    view: &FlameView,
    pal: &Palette,
) {
    let thread = view
        .selected_thread
        .as_deref()
        .map(|t| t.split(" (").next().unwrap_or(t))
        .unwrap_or("all threads");
    let mut title = format!("Flame graph ({thread}, zoom {:.1}x", view.zoom);
    if let Some(node) = &view.focused {
        title.push_str(&format!(", focus: {}", simplify_name(&node.name, 30)));
    }
    title.push(')');

    let block = Block::default().borders(Borders::ALL).title(title);
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height < 2 || inner.width < 4 {
        return;
    }

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);

    let message = match view.display(st.flame.as_ref()) {
        Display::Waiting => Some(if st.enable_stackshot {
            "Waiting for call-stack data (x triggers a stackshot)"
        } else {
            "Call-stack capture is off (c enables it for the next start)"
        }),
        Display::NoData => Some("No samples for the selected thread"),
        Display::Tree(_) => None,
    };
    if let Some(msg) = message {
        f.render_widget(Paragraph::new(msg).style(Style::default().fg(pal.dim)), parts[0]);
        return;
    }

    let Some((root, frames)) = visible_frames(st, view) else {
        return;
    };
    let cursor = frames.get(view.cursor.min(frames.len().saturating_sub(1)));
    let max_depth = frames.iter().map(|fr| fr.depth).max().unwrap_or(0);
    let visible_rows = parts[0].height as usize;
    let first_depth = cursor
        .map(|c| (c.depth + 1).saturating_sub(visible_rows))
        .unwrap_or(0);

    let width = parts[0].width as usize;
    let lines: Vec<Line> = (first_depth..=max_depth)
        .take(visible_rows)
        .map(|depth| {
            let row: Vec<&FlameFrame> = frames.iter().filter(|fr| fr.depth == depth).collect();
            row_line(&row, cursor, width, view.zoom)
        })
        .collect();
    f.render_widget(Paragraph::new(lines), parts[0]);

    let status = match cursor {
        Some(c) => format!(
            "{}  {} samples ({:.1}% of {})",
            c.name,
            c.value,
            c.value as f64 / root.value.max(1) as f64 * 100.0,
            root.value
        ),
        None => "Nothing wide enough to show at this zoom".to_string(),
    };
    f.render_widget(
        Paragraph::new(status).style(Style::default().fg(pal.accent)),
        parts[1],
    );
}
