//! Top header: connection status, session, device and the last notice.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use iosmon::state::{ConnectionStatus, PerfState};

use crate::ui::theme::Palette;

pub fn draw_header(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    st: &PerfState,
    notice: Option<&str>,
    pal: &Palette,
) {
    let status_color = match st.connection_status {
        ConnectionStatus::Connected => pal.ok,
        ConnectionStatus::Connecting => pal.warn,
        ConnectionStatus::Disconnected => pal.dim,
        ConnectionStatus::Error => pal.bad,
    };

    let mut spans = vec![
        Span::styled("iosmon", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(" {} ", st.ws_url)),
        Span::styled(
            format!("[{}]", st.connection_status.label()),
            Style::default().fg(status_color),
        ),
        Span::raw(" | "),
    ];

    let session = match (&st.session_id, st.is_monitoring) {
        (Some(id), true) => format!("monitoring {id}"),
        _ => "idle".to_string(),
    };
    spans.push(Span::raw(session));

    if let Some(dev) = st.device_id.as_deref() {
        spans.push(Span::raw(format!(" | device: {dev}")));
    }
    if let Some(target) = st.target_process_name.as_deref() {
        spans.push(Span::raw(format!(" | target: {target}")));
    }
    if st.enable_stackshot {
        spans.push(Span::styled(" | callstack", Style::default().fg(pal.accent)));
    }
    spans.push(Span::raw(format!(" | view: {}", st.monitor_mode.label())));

    if let Some(msg) = notice.or(st.last_server_error.as_deref()) {
        spans.push(Span::styled(format!(" | {msg}"), Style::default().fg(pal.warn)));
    }

    f.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::BOTTOM)),
        area,
    );
}

pub fn draw_footer(f: &mut ratatui::Frame<'_>, area: Rect, hints: &str, pal: &Palette) {
    f.render_widget(
        Paragraph::new(hints.to_string()).style(Style::default().fg(pal.dim)),
        area,
    );
}
