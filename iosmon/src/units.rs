//! Unit conversions for the two memory-string shapes the server emits.

const K: f64 = 1024.0;

/// Split `"<float><space?><rest>"` into the number and whatever follows it.
fn split_quantity(s: &str) -> Option<(f64, &str)> {
    let end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let value: f64 = s[..end].parse().ok()?;
    Some((value, s[end..].trim_start()))
}

/// First entry of `units` that `rest` starts with, ignoring case.
fn match_unit<'a>(rest: &str, units: &[&'a str]) -> Option<&'a str> {
    units.iter().copied().find(|u| {
        rest.get(..u.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(u))
    })
}

/// Parse strings like `"7.35 GiB"` or `"500 MB"` into GB.
///
/// Binary and decimal prefixes are both powers of 1024, matching the backend's
/// labelling. The unit is matched as a prefix, so `"500 MBps"` reads as MB. A
/// missing or unrecognised unit means bytes. Anything unparseable yields 0.
pub fn parse_memory_gb(s: &str) -> f64 {
    let Some((value, rest)) = split_quantity(s) else {
        return 0.0;
    };
    match match_unit(rest, &["GiB", "GB", "MiB", "MB", "KiB", "KB", "B"]) {
        Some("GiB" | "GB") => value,
        Some("MiB" | "MB") => value / K,
        Some("KiB" | "KB") => value / (K * K),
        _ => value / (K * K * K),
    }
}

/// Per-process `Memory` label (`"<float> MB|GB|KB"`) to MB. Any other unit means MB.
pub fn parse_memory_mb(s: &str) -> f64 {
    let Some((value, rest)) = split_quantity(s) else {
        return 0.0;
    };
    match match_unit(rest, &["GB", "MB", "KB"]) {
        Some("GB") => value * K,
        Some("KB") => value / K,
        _ => value,
    }
}

pub fn bytes_to_mb(b: Option<f64>) -> f64 {
    b.unwrap_or(0.0) / (K * K)
}
