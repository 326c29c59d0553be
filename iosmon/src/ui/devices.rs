//! Devices panel: configured devices, what the server reports per device, and
//! server-wide connection counters.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use iosmon::state::PerfState;

use crate::ui::theme::Palette;

/// Configured devices first (server order), then any extra udid from the stats.
pub fn known_devices(st: &PerfState) -> Vec<String> {
    let mut out: Vec<String> = st
        .configured_devices
        .iter()
        .map(|d| d.udid.clone())
        .filter(|u| !u.is_empty())
        .collect();
    if let Some(stats) = st.server_stats.as_ref() {
        for udid in stats.devices.keys() {
            if !out.contains(udid) {
                out.push(udid.clone());
            }
        }
    }
    out
}

fn format_uptime(secs: f64) -> String {
    let s = secs.max(0.0) as u64;
    let (d, h, m) = (s / 86_400, (s % 86_400) / 3600, (s % 3600) / 60);
    if d > 0 {
        format!("{d}d {h}h {m:02}m")
    } else if h > 0 {
        format!("{h}h {m:02}m")
    } else {
        format!("{m}m {:02}s", s % 60)
    }
}

pub fn draw_devices(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    st: &PerfState,
    selected: Option<&str>,
    pal: &Palette,
) {
    let mut lines = Vec::new();

    if let Some(stats) = st.server_stats.as_ref() {
        lines.push(Line::from(Span::styled(
            format!(
                "server up {}  connections {}/{}  sessions {}  devices {}",
                format_uptime(stats.uptime),
                stats.active_connections,
                stats.total_connections,
                stats.active_sessions,
                stats.device_count
            ),
            Style::default().fg(pal.dim),
        )));
    }

    for udid in known_devices(st) {
        let cfg = st.configured_devices.iter().find(|d| d.udid == udid);
        let stat = st
            .server_stats
            .as_ref()
            .and_then(|s| s.devices.get(&udid));

        let name = cfg
            .map(|d| d.device_name.as_str())
            .or(stat.map(|d| d.device_name.as_str()))
            .filter(|n| !n.is_empty())
            .unwrap_or("?");
        let version = cfg
            .map(|d| d.product_version.as_str())
            .or(stat.map(|d| d.product_version.as_str()))
            .unwrap_or("");
        let mode = match (cfg, stat) {
            (Some(d), _) if d.connection_mode == "tunnel" => match (&d.tunnel_host, d.tunnel_port) {
                (Some(host), Some(port)) => format!("tunnel {host}:{port}"),
                _ => "tunnel".to_string(),
            },
            (Some(d), _) if !d.connection_mode.is_empty() => d.connection_mode.clone(),
            (_, Some(s)) => s.connection_type.clone(),
            _ => String::new(),
        };

        let picked = selected == Some(udid.as_str());
        let monitoring = st.is_monitoring && st.device_id.as_deref() == Some(udid.as_str());
        let marker = if picked { "> " } else { "  " };
        let mut style = Style::default();
        if picked {
            style = style.add_modifier(Modifier::BOLD);
        }
        let mut spans = vec![
            Span::styled(format!("{marker}{name:<18}"), style.fg(pal.accent)),
            Span::styled(format!(" {version:<8} {mode:<14} "), style),
            Span::styled(udid.clone(), Style::default().fg(pal.dim)),
        ];
        if cfg.is_some_and(|d| d.is_active) {
            spans.push(Span::styled(" active", Style::default().fg(pal.ok)));
        }
        if monitoring {
            spans.push(Span::styled(" monitoring", Style::default().fg(pal.warn)));
        }
        lines.push(Line::from(spans));
    }

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "no devices reported (press g to refresh)",
            Style::default().fg(pal.dim),
        )));
    }

    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Devices")),
        area,
    );
}
