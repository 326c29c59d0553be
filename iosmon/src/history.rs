//! Bounded time series for charts.

use std::collections::VecDeque;

/// ~30s of samples at 10Hz.
pub const MAX_POINTS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSeriesPoint {
    pub timestamp: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

pub type Series = VecDeque<TimeSeriesPoint>;

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    while dq.len() >= cap.max(1) {
        dq.pop_front();
    }
    dq.push_back(v);
}

/// Append `point` and keep only the most recent [`MAX_POINTS`] entries.
///
/// Takes the stream by value and hands back the new one; there is no reordering
/// and no dedup by timestamp.
pub fn append(mut stream: Series, point: TimeSeriesPoint) -> Series {
    push_capped(&mut stream, point, MAX_POINTS);
    stream
}

/// In-place form of [`append`] for fields owned by the state store.
pub fn append_to(stream: &mut Series, point: TimeSeriesPoint) {
    push_capped(stream, point, MAX_POINTS);
}

pub fn last_value(stream: &Series) -> Option<f64> {
    stream.back().map(|p| p.value)
}

/// (avg, min, max) over the stream, or zeros when empty.
pub fn stats(stream: &Series) -> (f64, f64, f64) {
    if stream.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for p in stream {
        min = min.min(p.value);
        max = max.max(p.value);
        sum += p.value;
    }
    (sum / stream.len() as f64, min, max)
}

/// Scale the tail of a stream into sparkline bars (`u64`) that fit `width` columns.
pub fn spark_data(stream: &Series, width: usize, scale: f64) -> Vec<u64> {
    let start = stream.len().saturating_sub(width);
    stream
        .iter()
        .skip(start)
        .map(|p| (p.value.max(0.0) * scale).round() as u64)
        .collect()
}
