//! Overview: system CPU/memory, GPU, FPS, network and devices at a glance.

use ratatui::layout::{Constraint, Direction, Layout, Rect};

use iosmon::history::last_value;
use iosmon::state::PerfState;

use crate::ui::devices::{draw_devices, known_devices};
use crate::ui::net::{draw_net_spark, draw_series_spark};
use crate::ui::theme::Palette;

pub fn draw_overview(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    st: &PerfState,
    selected_device: Option<&str>,
    pal: &Palette,
) {
    // one line per device plus the server line and borders
    let device_rows = (known_devices(st).len() as u16 + 3).clamp(4, 8);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Length(device_rows),
        ])
        .split(area);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[0]);
    draw_series_spark(f, top[0], "CPU", "%", &st.system_cpu, 10.0, pal.cpu);
    draw_series_spark(
        f,
        top[1],
        "Memory",
        "",
        &st.system_memory,
        10.0,
        pal.mem,
    );

    let mid = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(34),
            Constraint::Percentage(33),
            Constraint::Percentage(33),
        ])
        .split(rows[1]);
    draw_series_spark(f, mid[0], "GPU", "%", &st.gpu_utilization, 10.0, pal.gpu);
    draw_series_spark(f, mid[1], "GPU mem", " MB", &st.gpu_memory, 1.0, pal.gpu);
    draw_series_spark(f, mid[2], "FPS", "", &st.fps, 1.0, pal.fps);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[2]);
    let rx_total = last_value(&st.network_rx_total).unwrap_or(0.0);
    let tx_total = last_value(&st.network_tx_total).unwrap_or(0.0);
    draw_net_spark(
        f,
        bottom[0],
        &format!("Download ({rx_total:.1} MB total)"),
        &st.network_rx_rate,
        pal.rx,
    );
    draw_net_spark(
        f,
        bottom[1],
        &format!("Upload ({tx_total:.1} MB total)"),
        &st.network_tx_rate,
        pal.tx,
    );

    draw_devices(f, rows[3], st, selected_device, pal);
}
