//! Library surface for iosmon: wire types, decoding, the metric store, flame-graph
//! aggregation, persisted settings and the WebSocket client. The TUI lives in the binary.

pub mod classify;
pub mod error;
pub mod flame;
pub mod history;
pub mod persist;
pub mod state;
pub mod types;
pub mod units;
pub mod ws;
