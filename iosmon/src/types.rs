//! Types that mirror the monitoring server's JSON schema.
//!
//! Inbound payload structs are deliberately lenient (`#[serde(default)]`, optional
//! fields): the backend has shipped two field spellings for several metrics and the
//! store picks whichever one is present.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const PROTO_SYSMONTAP: &str = "sysmontap";
pub const PROTO_GRAPHICS: &str = "graphics.opengl";
pub const PROTO_CORE_PROFILE: &str = "coreprofilesessiontap";
pub const PROTO_NETWORK: &str = "network.stats";

/// Every message the client knows how to consume, decoded once at the transport boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Welcome { message: Option<String> },
    MonitoringStarted(MonitoringStarted),
    MonitoringStopped(MonitoringStopped),
    ServerStats(ServerStats),
    DeviceList(DeviceList),
    FocusedProcessesList(FocusedProcessesList),
    HeartbeatAck,
    Pong,
    Error { message: String },
    Sysmontap(SysmontapData),
    Graphics(GraphicsData),
    Fps(FpsData),
    Callstack(CallstackData),
    Network(NetworkData),
    /// Well-formed envelope with an action (or metrics subtype) we do not handle.
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct MonitoringStarted {
    pub session_id: String,
    pub device_id: Option<String>,
    pub protocols: Vec<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct MonitoringStopped {
    pub session_id: String,
    pub duration: f64,
    pub data_counts: BTreeMap<String, u64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct DeviceList {
    pub devices: Vec<ConfiguredDevice>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct FocusedProcessesList {
    pub focused_processes: Vec<FocusedProcessConfig>,
    pub count: usize,
}

// ---------- metrics payloads ----------

/// System counters. Carries the union of the sysmontap, graphics and FPS shapes.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct SystemInfo {
    #[serde(rename = "CPUCount")]
    pub cpu_count: Option<u32>,
    #[serde(rename = "CPUUsage")]
    pub cpu_usage: Option<f64>,
    #[serde(rename = "CPU")]
    pub cpu: Option<f64>,
    #[serde(rename = "TotalMemory")]
    pub total_memory: Option<f64>,
    #[serde(rename = "UsedMemory")]
    pub used_memory: Option<f64>,
    #[serde(rename = "Memory")]
    pub memory: Option<BTreeMap<String, serde_json::Value>>,

    // graphics.opengl
    #[serde(rename = "FPS")]
    pub fps_upper: Option<f64>,
    pub device_utilization: Option<f64>,
    pub tiler_utilization: Option<f64>,
    pub renderer_utilization: Option<f64>,
    pub alloc_system_memory_mb: Option<f64>,
    pub in_use_system_memory_mb: Option<f64>,

    // coreprofilesessiontap
    pub fps: Option<f64>,
    pub jank_count: Option<f64>,
    pub big_jank_count: Option<f64>,
    pub stutter_ratio: Option<f64>,
    pub frame_count: Option<f64>,
    pub time_elapsed: Option<f64>,
}

/// One process row of a sysmontap snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct ProcessInfo {
    #[serde(rename = "Pid")]
    pub pid_upper: Option<u32>,
    pub pid: Option<u32>,
    #[serde(rename = "Name")]
    pub name_upper: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "CPU")]
    pub cpu_upper: Option<f64>,
    #[serde(rename = "cpuUsage")]
    pub cpu_usage: Option<f64>,
    #[serde(rename = "Memory", deserialize_with = "lenient")]
    pub memory_upper: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub memory: Option<String>,
    #[serde(rename = "Threads")]
    pub threads: Option<u32>,
    #[serde(rename = "ThreadCount")]
    pub thread_count: Option<u32>,
    #[serde(rename = "powerScore")]
    pub power_score: Option<f64>,
    #[serde(rename = "totalEnergyScore")]
    pub total_energy_score: Option<f64>,
    #[serde(rename = "avgPowerScore")]
    pub avg_power_score: Option<f64>,

    #[serde(rename = "_raw_physFootprint")]
    pub raw_phys_footprint: Option<f64>,
    #[serde(rename = "_raw_memResidentSize")]
    pub raw_mem_resident_size: Option<f64>,
    #[serde(rename = "_raw_memVirtualSize")]
    pub raw_mem_virtual_size: Option<f64>,
    #[serde(rename = "_validated_memVirtualSize")]
    pub validated_mem_virtual_size: Option<f64>,
    #[serde(rename = "_raw_memRPrvt")]
    pub raw_mem_rprvt: Option<f64>,
    #[serde(rename = "_raw_memRShrd")]
    pub raw_mem_rshrd: Option<f64>,
    #[serde(rename = "_raw_memCompressed")]
    pub raw_mem_compressed: Option<f64>,

    #[serde(rename = "_raw_disk_read_bytes")]
    pub raw_disk_read_bytes: Option<f64>,
    #[serde(rename = "_raw_disk_write_bytes")]
    pub raw_disk_write_bytes: Option<f64>,
    pub disk_read_rate_bps: Option<f64>,
    pub disk_write_rate_bps: Option<f64>,

    pub is_focused: Option<bool>,
}

impl ProcessInfo {
    pub fn pid(&self) -> u32 {
        self.pid_upper.or(self.pid).unwrap_or(0)
    }

    pub fn name(&self) -> &str {
        self.name_upper
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("Unknown")
    }

    pub fn cpu(&self) -> f64 {
        self.cpu_upper.or(self.cpu_usage).unwrap_or(0.0)
    }

    pub fn threads(&self) -> u32 {
        self.threads.or(self.thread_count).unwrap_or(0)
    }

    pub fn memory_label(&self) -> Option<&str> {
        self.memory_upper.as_deref().or(self.memory.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct TargetProcess {
    pub pid: u32,
    pub name: String,
    pub matched_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct SysmontapData {
    #[serde(deserialize_with = "lenient")]
    pub udid: String,
    #[serde(deserialize_with = "lenient")]
    pub timestamp: f64,
    #[serde(deserialize_with = "lenient")]
    pub system: Option<SystemInfo>,
    #[serde(deserialize_with = "lenient_vec")]
    pub processes: Vec<ProcessInfo>,
    #[serde(deserialize_with = "lenient")]
    pub target_process: Option<TargetProcess>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct GraphicsInner {
    pub system: Option<SystemInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct GraphicsData {
    pub udid: String,
    pub timestamp: f64,
    pub system: Option<SystemInfo>,
    pub data: Option<GraphicsInner>,
}

impl GraphicsData {
    /// Top-level `system` wins; older servers nest it under `data`.
    pub fn system(&self) -> Option<&SystemInfo> {
        self.system
            .as_ref()
            .or_else(|| self.data.as_ref().and_then(|d| d.system.as_ref()))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct FpsData {
    pub udid: String,
    pub timestamp: f64,
    pub system: Option<SystemInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct NetworkStats {
    #[serde(deserialize_with = "counter")]
    pub total_rx_bytes: u64,
    #[serde(deserialize_with = "counter")]
    pub total_tx_bytes: u64,
    #[serde(deserialize_with = "counter")]
    pub total_rx_packets: u64,
    #[serde(deserialize_with = "counter")]
    pub total_tx_packets: u64,
    #[serde(deserialize_with = "counter")]
    pub delta_rx_bytes: u64,
    #[serde(deserialize_with = "counter")]
    pub delta_tx_bytes: u64,
    #[serde(deserialize_with = "counter")]
    pub delta_rx_packets: u64,
    #[serde(deserialize_with = "counter")]
    pub delta_tx_packets: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct ProcessNetworkStats {
    #[serde(deserialize_with = "lenient")]
    pub pid: u32,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "counter")]
    pub rx_bytes: u64,
    #[serde(deserialize_with = "counter")]
    pub tx_bytes: u64,
    #[serde(deserialize_with = "counter")]
    pub rx_packets: u64,
    #[serde(deserialize_with = "counter")]
    pub tx_packets: u64,
    #[serde(deserialize_with = "counter")]
    pub delta_rx_bytes: u64,
    #[serde(deserialize_with = "counter")]
    pub delta_tx_bytes: u64,
    #[serde(deserialize_with = "counter")]
    pub delta_rx_packets: u64,
    #[serde(deserialize_with = "counter")]
    pub delta_tx_packets: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct NetworkData {
    #[serde(deserialize_with = "lenient")]
    pub udid: String,
    #[serde(deserialize_with = "lenient")]
    pub timestamp: f64,
    #[serde(deserialize_with = "lenient")]
    pub network: Option<NetworkStats>,
    #[serde(deserialize_with = "lenient_vec")]
    pub targets: Vec<ProcessNetworkStats>,
    #[serde(deserialize_with = "lenient")]
    pub target_process_network: Option<ProcessNetworkStats>,
    #[serde(deserialize_with = "lenient")]
    pub target_process: Option<TargetProcess>,
}

/// Accept any JSON for a field and fall back to its default when the shape is wrong,
/// so one odd field (`null`, a number where a label was expected) never costs the
/// whole snapshot.
fn lenient<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let v = Value::deserialize(d)?;
    Ok(serde_json::from_value(v).unwrap_or_default())
}

/// Like [`lenient`] for lists: `null` is empty and malformed elements are skipped.
fn lenient_vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = Value::deserialize(d)?;
    let Value::Array(items) = v else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Byte and packet counters: negative or fractional values clamp into `u64`, junk is 0.
fn counter<'de, D>(d: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    Ok(v.as_f64().map_or(0, |n| n.max(0.0) as u64))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FlameGraphNode {
    pub name: String,
    #[serde(default)]
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FlameGraphNode>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct CallstackSummary {
    pub total_samples: u64,
    pub unique_threads: u64,
    pub analysis_duration_s: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct ThreadStat {
    pub process_id: u32,
    pub thread_id: String,
    pub sample_count: u64,
    pub cpu_time_ratio: f64,
    pub top_functions: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct CallstackAnalysis {
    pub summary: CallstackSummary,
    pub thread_stats: BTreeMap<String, ThreadStat>,
    pub flamegraph: Option<FlameGraphNode>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct CallstackData {
    pub udid: String,
    pub session_id: Option<String>,
    pub timestamp: f64,
    pub is_accumulated: bool,
    pub callstack_analysis: Option<CallstackAnalysis>,
}

// ---------- server configuration mirrors ----------

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct DeviceStat {
    pub connection_type: String,
    pub userspace_enabled: bool,
    pub decision_reason: String,
    pub device_name: String,
    pub product_version: String,
    pub uptime: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub active_sessions: u64,
    pub start_time: f64,
    pub uptime: f64,
    pub current_time: f64,
    pub device_count: u64,
    pub devices: BTreeMap<String, DeviceStat>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct ConfiguredDevice {
    pub udid: String,
    pub device_name: String,
    pub product_version: String,
    pub product_type: String,
    pub is_active: bool,
    pub connection_mode: String,
    pub tunnel_host: Option<String>,
    pub tunnel_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct FocusedProcessConfig {
    pub name: String,
    pub patterns: Vec<String>,
    pub enabled: bool,
    pub detailed_memory: bool,
    pub network_monitoring: bool,
    pub disk_monitoring: bool,
}

impl FocusedProcessConfig {
    /// Case-insensitive substring match; `*` in a pattern is ignored.
    pub fn matches(&self, process_name: &str) -> bool {
        let name = process_name.to_lowercase();
        self.patterns
            .iter()
            .any(|p| name.contains(&p.to_lowercase().replace('*', "")))
    }
}

// ---------- outbound ----------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Outbound {
    Heartbeat,
    StartMonitoring {
        udid: String,
        protocols: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        target_process_name: Option<String>,
        need_stackshot: bool,
        session_id: String,
    },
    StopMonitoring,
    GetStats,
    TriggerCoreprofileStackshot {
        udid: String,
    },
    ListDevices,
    ListFocusedProcesses,
}

impl Outbound {
    pub fn action(&self) -> &'static str {
        match self {
            Outbound::Heartbeat => "heartbeat",
            Outbound::StartMonitoring { .. } => "start_monitoring",
            Outbound::StopMonitoring => "stop_monitoring",
            Outbound::GetStats => "get_stats",
            Outbound::TriggerCoreprofileStackshot { .. } => "trigger_coreprofile_stackshot",
            Outbound::ListDevices => "list_devices",
            Outbound::ListFocusedProcesses => "list_focused_processes",
        }
    }
}

/// Caller-side options for a `start_monitoring` request.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub udid: String,
    pub target_process_name: Option<String>,
    pub need_stackshot: bool,
    pub protocols: Option<Vec<String>>,
    pub session_id: Option<String>,
}

pub fn default_protocols(need_stackshot: bool) -> Vec<String> {
    let mut protos = vec![PROTO_SYSMONTAP, PROTO_GRAPHICS];
    if need_stackshot {
        protos.push(PROTO_CORE_PROFILE);
    }
    protos.push(PROTO_NETWORK);
    protos.into_iter().map(String::from).collect()
}

impl StartOptions {
    pub fn into_message(self) -> Outbound {
        let protocols = self
            .protocols
            .unwrap_or_else(|| default_protocols(self.need_stackshot));
        let session_id = self
            .session_id
            .unwrap_or_else(|| format!("session_{}", chrono::Utc::now().timestamp_millis()));
        Outbound::StartMonitoring {
            udid: self.udid,
            protocols,
            target_process_name: self.target_process_name.filter(|n| !n.is_empty()),
            need_stackshot: self.need_stackshot,
            session_id,
        }
    }
}
