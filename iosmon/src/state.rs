//! Application state: rolling metric streams, per-process records and histories,
//! the latest flame graph, and the control-plane mirrors of server configuration.
//!
//! `PerfState` is built once at startup and owned by the app. Every inbound message
//! goes through [`PerfState::apply`], one at a time, so no locking is involved.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, error, info};

use crate::history::{append_to, Series, TimeSeriesPoint};
use crate::types::{
    CallstackData, CallstackSummary, ConfiguredDevice, FlameGraphNode, FocusedProcessConfig,
    FpsData, GraphicsData, Inbound, NetworkData, Outbound, ProcessInfo, ProcessNetworkStats,
    ServerStats, StartOptions, SysmontapData, ThreadStat,
};
use crate::units::{bytes_to_mb, parse_memory_gb, parse_memory_mb};

pub const DEFAULT_WS_URL: &str = "ws://localhost:8766";

/// Upper bound on pids with a retained record + history.
pub const MAX_TRACKED_PROCESSES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorMode {
    #[default]
    Overview,
    Detailed,
    Process,
}

impl MonitorMode {
    pub fn next(self) -> Self {
        match self {
            MonitorMode::Overview => MonitorMode::Detailed,
            MonitorMode::Detailed => MonitorMode::Process,
            MonitorMode::Process => MonitorMode::Overview,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MonitorMode::Overview => "overview",
            MonitorMode::Detailed => "detailed",
            MonitorMode::Process => "process",
        }
    }
}

/// Latest known values for one process. Memory in MB, rates in bytes/s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub cpu: f64,
    pub threads: u32,

    pub memory_mb: f64,
    pub mem_resident_mb: f64,
    pub mem_virtual_mb: f64,
    pub mem_private_mb: f64,
    pub mem_shared_mb: f64,
    pub mem_compressed_mb: f64,

    pub disk_read_mb: f64,
    pub disk_write_mb: f64,
    pub disk_read_rate_bps: f64,
    pub disk_write_rate_bps: f64,

    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub network_rx_rate: u64,
    pub network_tx_rate: u64,

    pub power_score: f64,
    pub total_energy_score: f64,
    pub avg_power_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessHistory {
    pub cpu: Series,
    /// MB
    pub memory: Series,
    pub power: Series,
    /// KB/s
    pub disk_read: Series,
    pub disk_write: Series,
    pub network_rx: Series,
    pub network_tx: Series,
    /// MB
    pub mem_resident: Series,
    /// GB
    pub mem_virtual: Series,
    pub mem_private: Series,
    pub mem_compressed: Series,
    last_seen: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlameData {
    pub root: FlameGraphNode,
    pub summary: CallstackSummary,
    pub thread_stats: BTreeMap<String, ThreadStat>,
}

#[derive(Debug, Default)]
pub struct PerfState {
    pub connection_status: ConnectionStatus,
    pub ws_url: String,

    pub is_monitoring: bool,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
    pub target_process_name: Option<String>,
    pub enable_stackshot: bool,
    pub monitor_mode: MonitorMode,

    pub system_cpu: Series,
    pub system_memory: Series,
    pub gpu_utilization: Series,
    pub gpu_memory: Series,
    pub fps: Series,
    pub jank: Series,

    /// KB/s
    pub network_rx_rate: Series,
    pub network_tx_rate: Series,
    /// MB
    pub network_rx_total: Series,
    pub network_tx_total: Series,

    pub processes: BTreeMap<u32, ProcessRecord>,
    pub process_history: HashMap<u32, ProcessHistory>,

    pub flame: Option<FlameData>,

    pub server_stats: Option<ServerStats>,
    pub configured_devices: Vec<ConfiguredDevice>,
    pub focused_process_configs: Vec<FocusedProcessConfig>,
    pub selected_process_pid: Option<u32>,
    pub last_server_error: Option<String>,
}

fn ts(t: f64) -> i64 {
    t as i64
}

impl PerfState {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Default::default()
        }
    }

    pub fn set_connection_status(&mut self, status: ConnectionStatus) {
        self.connection_status = status;
    }

    /// Route one decoded message to its transition.
    pub fn apply(&mut self, msg: &Inbound) {
        match msg {
            Inbound::Welcome { message } => {
                info!("server welcome: {}", message.as_deref().unwrap_or(""));
            }
            Inbound::MonitoringStarted(m) => {
                info!("monitoring started: session={} protocols={:?}", m.session_id, m.protocols);
                self.is_monitoring = true;
                self.session_id = Some(m.session_id.clone());
            }
            Inbound::MonitoringStopped(m) => {
                info!(
                    "monitoring stopped: session={} duration={:.1}s counts={:?}",
                    m.session_id, m.duration, m.data_counts
                );
                self.is_monitoring = false;
                self.session_id = None;
            }
            Inbound::ServerStats(s) => self.server_stats = Some(s.clone()),
            Inbound::DeviceList(d) => {
                info!("device list: {} devices", d.count);
                self.configured_devices = d.devices.clone();
            }
            Inbound::FocusedProcessesList(f) => {
                info!("focused process list: {} entries", f.count);
                self.focused_process_configs = f.focused_processes.clone();
            }
            Inbound::HeartbeatAck | Inbound::Pong => {}
            Inbound::Error { message } => {
                error!("server error: {message}");
                self.last_server_error = Some(message.clone());
            }
            Inbound::Sysmontap(d) => self.apply_system(d),
            Inbound::Graphics(d) => self.apply_graphics(d),
            Inbound::Fps(d) => self.apply_fps(d),
            Inbound::Callstack(d) => self.apply_callstack(d),
            Inbound::Network(d) => self.apply_network(d),
            Inbound::Unknown(action) => debug!("ignoring message: {action}"),
        }
    }

    pub fn apply_system(&mut self, d: &SysmontapData) {
        let t = ts(d.timestamp);

        if let Some(sys) = d.system.as_ref() {
            if let Some(cpu) = sys.cpu_usage.or(sys.cpu) {
                append_to(&mut self.system_cpu, TimeSeriesPoint::new(t, cpu));
            }

            match (sys.used_memory, sys.total_memory) {
                (Some(used), Some(total)) if total > 0.0 => {
                    append_to(
                        &mut self.system_memory,
                        TimeSeriesPoint::new(t, used / total * 100.0),
                    );
                }
                _ => {
                    let used_gb = sys
                        .memory
                        .as_ref()
                        .and_then(|m| m.get("Memory Used"))
                        .and_then(|v| v.as_str())
                        .map(parse_memory_gb)
                        .unwrap_or(0.0);
                    if used_gb > 0.0 {
                        append_to(&mut self.system_memory, TimeSeriesPoint::new(t, used_gb));
                    }
                }
            }
        }

        for proc in &d.processes {
            self.upsert_process(t, proc);
        }
    }

    fn upsert_process(&mut self, t: i64, proc: &ProcessInfo) {
        let pid = proc.pid();
        if !self.process_history.contains_key(&pid) {
            self.make_room();
        }

        let mut memory_mb = bytes_to_mb(proc.raw_phys_footprint);
        if memory_mb == 0.0 && proc.raw_mem_resident_size.is_some_and(|v| v > 0.0) {
            memory_mb = bytes_to_mb(proc.raw_mem_resident_size);
        } else if memory_mb == 0.0 {
            if let Some(label) = proc.memory_label() {
                memory_mb = parse_memory_mb(label);
            }
        }

        let prev = self.processes.get(&pid);
        let record = ProcessRecord {
            pid,
            name: proc.name().to_string(),
            cpu: proc.cpu(),
            threads: proc.threads(),
            memory_mb,
            mem_resident_mb: bytes_to_mb(proc.raw_mem_resident_size),
            mem_virtual_mb: bytes_to_mb(
                proc.validated_mem_virtual_size.or(proc.raw_mem_virtual_size),
            ),
            mem_private_mb: bytes_to_mb(proc.raw_mem_rprvt),
            mem_shared_mb: bytes_to_mb(proc.raw_mem_rshrd),
            mem_compressed_mb: bytes_to_mb(proc.raw_mem_compressed),
            disk_read_mb: bytes_to_mb(proc.raw_disk_read_bytes),
            disk_write_mb: bytes_to_mb(proc.raw_disk_write_bytes),
            disk_read_rate_bps: proc.disk_read_rate_bps.unwrap_or(0.0),
            disk_write_rate_bps: proc.disk_write_rate_bps.unwrap_or(0.0),
            // Owned by network.stats; keep whatever it last reported.
            network_rx_bytes: prev.map_or(0, |p| p.network_rx_bytes),
            network_tx_bytes: prev.map_or(0, |p| p.network_tx_bytes),
            network_rx_rate: prev.map_or(0, |p| p.network_rx_rate),
            network_tx_rate: prev.map_or(0, |p| p.network_tx_rate),
            power_score: proc.power_score.unwrap_or(0.0),
            total_energy_score: proc.total_energy_score.unwrap_or(0.0),
            avg_power_score: proc.avg_power_score.unwrap_or(0.0),
        };

        let h = self.process_history.entry(pid).or_default();
        let point = |v: f64| TimeSeriesPoint::new(t, v);
        append_to(&mut h.cpu, point(record.cpu));
        append_to(&mut h.memory, point(record.memory_mb));
        append_to(&mut h.power, point(record.power_score));
        append_to(&mut h.disk_read, point(record.disk_read_rate_bps / 1024.0));
        append_to(&mut h.disk_write, point(record.disk_write_rate_bps / 1024.0));
        append_to(&mut h.mem_resident, point(record.mem_resident_mb));
        append_to(&mut h.mem_virtual, point(record.mem_virtual_mb / 1024.0));
        append_to(&mut h.mem_private, point(record.mem_private_mb));
        append_to(&mut h.mem_compressed, point(record.mem_compressed_mb));
        h.last_seen = t;

        self.processes.insert(pid, record);
    }

    /// Evict the least recently observed pid once the tracking cap is reached.
    fn make_room(&mut self) {
        if self.process_history.len() < MAX_TRACKED_PROCESSES {
            return;
        }
        let oldest = self
            .process_history
            .iter()
            .min_by_key(|(pid, h)| (h.last_seen, **pid))
            .map(|(pid, _)| *pid);
        if let Some(pid) = oldest {
            debug!("evicting stale process history for pid {pid}");
            self.process_history.remove(&pid);
            self.processes.remove(&pid);
            if self.selected_process_pid == Some(pid) {
                self.selected_process_pid = None;
            }
        }
    }

    pub fn apply_graphics(&mut self, d: &GraphicsData) {
        let t = ts(d.timestamp);
        let Some(sys) = d.system() else { return };

        if let Some(util) = sys.device_utilization {
            append_to(&mut self.gpu_utilization, TimeSeriesPoint::new(t, util));
        }
        if let Some(mem) = sys.in_use_system_memory_mb {
            append_to(&mut self.gpu_memory, TimeSeriesPoint::new(t, mem));
        }
        if let Some(fps) = sys.fps_upper.or(sys.fps).filter(|v| *v > 0.0) {
            append_to(&mut self.fps, TimeSeriesPoint::new(t, fps));
            // graphics.opengl carries no jank counter
            append_to(&mut self.jank, TimeSeriesPoint::new(t, 0.0));
        }
    }

    pub fn apply_fps(&mut self, d: &FpsData) {
        let t = ts(d.timestamp);
        let Some(sys) = d.system.as_ref() else { return };
        append_to(&mut self.fps, TimeSeriesPoint::new(t, sys.fps.unwrap_or(0.0)));
        append_to(
            &mut self.jank,
            TimeSeriesPoint::new(t, sys.jank_count.unwrap_or(0.0)),
        );
    }

    pub fn apply_callstack(&mut self, d: &CallstackData) {
        let Some(analysis) = d.callstack_analysis.as_ref() else { return };
        let Some(root) = analysis.flamegraph.clone() else { return };
        self.flame = Some(FlameData {
            root,
            summary: analysis.summary.clone(),
            thread_stats: analysis.thread_stats.clone(),
        });
    }

    pub fn apply_network(&mut self, d: &NetworkData) {
        let t = ts(d.timestamp);

        if let Some(net) = d.network.as_ref() {
            let kb = |b: u64| b as f64 / 1024.0;
            let mb = |b: u64| b as f64 / (1024.0 * 1024.0);
            append_to(&mut self.network_rx_rate, TimeSeriesPoint::new(t, kb(net.delta_rx_bytes)));
            append_to(&mut self.network_tx_rate, TimeSeriesPoint::new(t, kb(net.delta_tx_bytes)));
            append_to(&mut self.network_rx_total, TimeSeriesPoint::new(t, mb(net.total_rx_bytes)));
            append_to(&mut self.network_tx_total, TimeSeriesPoint::new(t, mb(net.total_tx_bytes)));
        }

        let extra = d
            .target_process_network
            .iter()
            .filter(|tp| !d.targets.iter().any(|x| x.pid == tp.pid));
        for stats in d.targets.iter().chain(extra) {
            self.apply_process_network(t, stats);
        }
    }

    /// Only touches processes already known from a sysmontap snapshot.
    fn apply_process_network(&mut self, t: i64, stats: &ProcessNetworkStats) {
        if let Some(rec) = self.processes.get_mut(&stats.pid) {
            rec.network_rx_bytes = stats.rx_bytes;
            rec.network_tx_bytes = stats.tx_bytes;
            rec.network_rx_rate = stats.delta_rx_bytes;
            rec.network_tx_rate = stats.delta_tx_bytes;
        }
        if let Some(h) = self.process_history.get_mut(&stats.pid) {
            append_to(
                &mut h.network_rx,
                TimeSeriesPoint::new(t, stats.delta_rx_bytes as f64 / 1024.0),
            );
            append_to(
                &mut h.network_tx,
                TimeSeriesPoint::new(t, stats.delta_tx_bytes as f64 / 1024.0),
            );
        }
    }

    pub fn clear_data(&mut self) {
        self.system_cpu.clear();
        self.system_memory.clear();
        self.gpu_utilization.clear();
        self.gpu_memory.clear();
        self.fps.clear();
        self.jank.clear();
        self.network_rx_rate.clear();
        self.network_tx_rate.clear();
        self.network_rx_total.clear();
        self.network_tx_total.clear();
        self.processes.clear();
        self.process_history.clear();
        self.flame = None;
    }

    /// Reset buffers and build the `start_monitoring` request for the current settings.
    pub fn begin_monitoring(&mut self, udid: &str, target_process_name: Option<&str>) -> Outbound {
        self.clear_data();
        self.device_id = Some(udid.to_string());
        self.target_process_name = target_process_name
            .filter(|n| !n.is_empty())
            .map(String::from);
        StartOptions {
            udid: udid.to_string(),
            target_process_name: self.target_process_name.clone(),
            need_stackshot: self.enable_stackshot,
            ..Default::default()
        }
        .into_message()
    }

    /// Local bookkeeping for a user-initiated disconnect.
    pub fn mark_disconnected(&mut self) {
        self.is_monitoring = false;
        self.session_id = None;
    }

    /// Enabled focused-process configs paired with the first process whose name matches.
    pub fn matched_focused(&self) -> Vec<(&FocusedProcessConfig, Option<&ProcessRecord>)> {
        self.focused_process_configs
            .iter()
            .filter(|c| c.enabled)
            .map(|c| (c, self.processes.values().find(|p| c.matches(&p.name))))
            .collect()
    }
}
