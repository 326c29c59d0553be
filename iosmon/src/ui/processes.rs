//! Process table with per-cell coloring, zebra striping and sorting, plus the
//! selected process's histories and the focused-process matches.

use std::cmp::Ordering;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap},
};

use iosmon::state::{PerfState, ProcessRecord};

use crate::ui::net::{draw_net_spark, draw_series_spark};
use crate::ui::theme::Palette;
use crate::ui::util::{human, human_mb, human_rate, truncate_middle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcSortBy {
    #[default]
    Cpu,
    Memory,
    Power,
    Disk,
    Network,
}

impl ProcSortBy {
    pub fn next(self) -> Self {
        match self {
            ProcSortBy::Cpu => ProcSortBy::Memory,
            ProcSortBy::Memory => ProcSortBy::Power,
            ProcSortBy::Power => ProcSortBy::Disk,
            ProcSortBy::Disk => ProcSortBy::Network,
            ProcSortBy::Network => ProcSortBy::Cpu,
        }
    }

    fn key(self, p: &ProcessRecord) -> f64 {
        match self {
            ProcSortBy::Cpu => p.cpu,
            ProcSortBy::Memory => p.memory_mb,
            ProcSortBy::Power => p.power_score,
            ProcSortBy::Disk => p.disk_read_rate_bps + p.disk_write_rate_bps,
            ProcSortBy::Network => (p.network_rx_rate + p.network_tx_rate) as f64,
        }
    }
}

/// Pids ordered by the sort column, descending; ties by pid.
pub fn sorted_pids(st: &PerfState, sort: ProcSortBy) -> Vec<u32> {
    let mut procs: Vec<&ProcessRecord> = st.processes.values().collect();
    procs.sort_by(|a, b| {
        sort.key(b)
            .partial_cmp(&sort.key(a))
            .unwrap_or(Ordering::Equal)
            .then(a.pid.cmp(&b.pid))
    });
    procs.iter().map(|p| p.pid).collect()
}

const COLS: [Constraint; 7] = [
    Constraint::Length(7),  // PID
    Constraint::Min(12),    // Name
    Constraint::Length(7),  // CPU %
    Constraint::Length(10), // Mem
    Constraint::Length(7),  // Power
    Constraint::Length(11), // Disk
    Constraint::Length(11), // Net
];

pub fn draw_processes(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    st: &PerfState,
    pids: &[u32],
    selected: usize,
    sort_by: ProcSortBy,
    pal: &Palette,
) {
    let lr = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    draw_table(f, lr[0], st, pids, selected, sort_by, pal);
    draw_detail(f, lr[1], st, pal);
}

fn draw_table(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    st: &PerfState,
    pids: &[u32],
    selected: usize,
    sort_by: ProcSortBy,
    pal: &Palette,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Processes ({} tracked)", pids.len()));
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height < 2 || inner.width < 10 {
        return;
    }

    let viewport = inner.height.saturating_sub(1) as usize;
    let offset = (selected + 1).saturating_sub(viewport);
    let peak_cpu = st.processes.values().map(|p| p.cpu).fold(0.0_f64, f64::max);

    let rows = pids
        .iter()
        .enumerate()
        .skip(offset)
        .take(viewport)
        .filter_map(|(i, pid)| st.processes.get(pid).map(|p| (i, p)))
        .map(|(i, p)| {
            let cpu_fg = match p.cpu {
                x if x < 25.0 => pal.ok,
                x if x < 60.0 => pal.warn,
                _ => pal.bad,
            };
            let mut style = if i % 2 == 1 {
                Style::default().bg(pal.zebra)
            } else {
                Style::default()
            };
            if p.cpu > 0.0 && (p.cpu - peak_cpu).abs() < f64::EPSILON {
                style = style.add_modifier(Modifier::BOLD);
            }
            if i == selected {
                style = style.add_modifier(Modifier::REVERSED);
            }
            let net = (p.network_rx_rate + p.network_tx_rate) as f64;
            Row::new(vec![
                Cell::from(p.pid.to_string()).style(Style::default().fg(pal.dim)),
                Cell::from(truncate_middle(&p.name, 28)),
                Cell::from(format!("{:>5.1}", p.cpu)).style(Style::default().fg(cpu_fg)),
                Cell::from(human_mb(p.memory_mb)),
                Cell::from(format!("{:.1}", p.power_score)),
                Cell::from(human_rate(p.disk_read_rate_bps + p.disk_write_rate_bps)),
                Cell::from(human_rate(net)),
            ])
            .style(style)
        });

    let mark = |col: ProcSortBy, label: &'static str, marked: &'static str| {
        if col == sort_by {
            marked
        } else {
            label
        }
    };
    let header = Row::new(vec![
        "PID",
        "Name",
        mark(ProcSortBy::Cpu, "CPU %", "CPU % •"),
        mark(ProcSortBy::Memory, "Mem", "Mem •"),
        mark(ProcSortBy::Power, "Power", "Power •"),
        mark(ProcSortBy::Disk, "Disk", "Disk •"),
        mark(ProcSortBy::Network, "Net", "Net •"),
    ])
    .style(
        Style::default()
            .fg(pal.header)
            .add_modifier(Modifier::BOLD),
    );

    let table = Table::new(rows, COLS.to_vec())
        .header(header)
        .column_spacing(1);
    f.render_widget(table, inner);
}

/// The per-process memory breakdown, one label per figure the server reports.
pub fn memory_breakdown(rec: &ProcessRecord) -> String {
    format!(
        "mem: resident {}  virtual {}  private {}  shared {}  compressed {}",
        human_mb(rec.mem_resident_mb),
        human_mb(rec.mem_virtual_mb),
        human_mb(rec.mem_private_mb),
        human_mb(rec.mem_shared_mb),
        human_mb(rec.mem_compressed_mb),
    )
}

fn columns(area: Rect, n: u32) -> std::rc::Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints((0..n).map(|_| Constraint::Ratio(1, n)))
        .split(area)
}

fn draw_detail(f: &mut ratatui::Frame<'_>, area: Rect, st: &PerfState, pal: &Palette) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // info
            Constraint::Length(3), // cpu | power
            Constraint::Length(3), // memory | resident | virtual
            Constraint::Length(3), // private | compressed
            Constraint::Length(3), // disk read | write
            Constraint::Length(3), // net in | out
            Constraint::Min(3),    // focused
        ])
        .split(area);

    let selected = st
        .selected_process_pid
        .and_then(|pid| st.processes.get(&pid).zip(st.process_history.get(&pid)));

    match selected {
        Some((rec, hist)) => {
            let info = vec![
                Line::from(format!(
                    "{} ({})  threads: {}  power: {:.1}",
                    rec.name, rec.pid, rec.threads, rec.power_score
                )),
                Line::from(memory_breakdown(rec)),
                Line::from(format!(
                    "disk: {} read ({}) / {} written ({})  net: {} in / {} out",
                    human_mb(rec.disk_read_mb),
                    human_rate(rec.disk_read_rate_bps),
                    human_mb(rec.disk_write_mb),
                    human_rate(rec.disk_write_rate_bps),
                    human(rec.network_rx_bytes),
                    human(rec.network_tx_bytes),
                )),
            ];
            f.render_widget(
                Paragraph::new(info)
                    .wrap(Wrap { trim: true })
                    .block(Block::default().borders(Borders::ALL).title("Selected")),
                parts[0],
            );

            let row = columns(parts[1], 2);
            draw_series_spark(f, row[0], "CPU", "%", &hist.cpu, 10.0, pal.cpu);
            draw_series_spark(f, row[1], "Power", "", &hist.power, 10.0, pal.warn);

            let row = columns(parts[2], 3);
            draw_series_spark(f, row[0], "Memory", " MB", &hist.memory, 1.0, pal.mem);
            draw_series_spark(f, row[1], "Resident", " MB", &hist.mem_resident, 1.0, pal.mem);
            draw_series_spark(f, row[2], "Virtual", " GB", &hist.mem_virtual, 100.0, pal.mem);

            let row = columns(parts[3], 2);
            draw_series_spark(f, row[0], "Private", " MB", &hist.mem_private, 1.0, pal.mem);
            draw_series_spark(
                f,
                row[1],
                "Compressed",
                " MB",
                &hist.mem_compressed,
                1.0,
                pal.mem,
            );

            let row = columns(parts[4], 2);
            draw_series_spark(f, row[0], "Disk read", " KB/s", &hist.disk_read, 1.0, pal.accent);
            draw_series_spark(f, row[1], "Disk write", " KB/s", &hist.disk_write, 1.0, pal.accent);

            let row = columns(parts[5], 2);
            draw_net_spark(f, row[0], "Net in", &hist.network_rx, pal.rx);
            draw_net_spark(f, row[1], "Net out", &hist.network_tx, pal.tx);
        }
        None => {
            f.render_widget(
                Paragraph::new("Select a process with Up/Down")
                    .style(Style::default().fg(pal.dim))
                    .block(Block::default().borders(Borders::ALL).title("Selected")),
                parts[0],
            );
        }
    }

    let lines: Vec<Line> = st
        .matched_focused()
        .into_iter()
        .map(|(cfg, proc)| match proc {
            Some(p) => Line::from(vec![
                Span::styled(format!("{:<16}", cfg.name), Style::default().fg(pal.accent)),
                Span::raw(format!(
                    " {} ({})  cpu {:.1}%  mem {}",
                    p.name,
                    p.pid,
                    p.cpu,
                    human_mb(p.memory_mb)
                )),
            ]),
            None => Line::from(vec![
                Span::styled(format!("{:<16}", cfg.name), Style::default().fg(pal.accent)),
                Span::styled(" not running", Style::default().fg(pal.dim)),
            ]),
        })
        .collect();
    f.render_widget(
        Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Focused processes")),
        parts[6],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(procs: &[(u32, f64, f64, u64)]) -> PerfState {
        let mut st = PerfState::default();
        for &(pid, cpu, mem, net) in procs {
            st.processes.insert(
                pid,
                ProcessRecord {
                    pid,
                    cpu,
                    memory_mb: mem,
                    network_rx_rate: net,
                    ..Default::default()
                },
            );
        }
        st
    }

    #[test]
    fn sorts_descending_by_column_with_pid_tiebreak() {
        let st = state_with(&[(1, 5.0, 300.0, 0), (2, 50.0, 10.0, 7), (3, 5.0, 20.0, 9)]);
        assert_eq!(sorted_pids(&st, ProcSortBy::Cpu), vec![2, 1, 3]);
        assert_eq!(sorted_pids(&st, ProcSortBy::Memory), vec![1, 3, 2]);
        assert_eq!(sorted_pids(&st, ProcSortBy::Network), vec![3, 2, 1]);
    }

    #[test]
    fn memory_breakdown_lists_every_figure() {
        let rec = ProcessRecord {
            mem_resident_mb: 120.0,
            mem_virtual_mb: 4096.0,
            mem_private_mb: 80.5,
            mem_shared_mb: 12.0,
            mem_compressed_mb: 3.5,
            ..Default::default()
        };
        assert_eq!(
            memory_breakdown(&rec),
            "mem: resident 120.0MB  virtual 4.00GB  private 80.5MB  shared 12.0MB  \
             compressed 3.5MB"
        );
    }

    #[test]
    fn sort_column_cycles() {
        let mut s = ProcSortBy::default();
        for _ in 0..5 {
            s = s.next();
        }
        assert_eq!(s, ProcSortBy::Cpu);
    }
}
