//! Envelope classification and the single validating decode step.
//!
//! Every frame carries a string `action`. Control actions map one-to-one onto
//! [`Inbound`] variants; `sysmontap_metrics` frames are split into five shapes by
//! `subtype`, and the two `coreprofilesessiontap` shapes by `is_accumulated`.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DecodeError;
use crate::types::{
    Inbound, PROTO_CORE_PROFILE, PROTO_GRAPHICS, PROTO_NETWORK, PROTO_SYSMONTAP,
};

pub const ACTION_METRICS: &str = "sysmontap_metrics";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsKind {
    System,
    Graphics,
    Fps,
    Callstack,
    Network,
}

/// Tag a raw envelope with its metrics category, or `None` for anything that is
/// not a recognised `sysmontap_metrics` frame.
pub fn classify(envelope: &Value) -> Option<MetricsKind> {
    if envelope.get("action").and_then(Value::as_str) != Some(ACTION_METRICS) {
        return None;
    }
    match envelope.get("subtype").and_then(Value::as_str)? {
        PROTO_SYSMONTAP => Some(MetricsKind::System),
        PROTO_GRAPHICS => Some(MetricsKind::Graphics),
        PROTO_NETWORK => Some(MetricsKind::Network),
        PROTO_CORE_PROFILE => {
            // Only a literal `true` marks the accumulated call-stack summary.
            let accumulated = envelope
                .get("is_accumulated")
                .and_then(Value::as_bool)
                == Some(true);
            Some(if accumulated {
                MetricsKind::Callstack
            } else {
                MetricsKind::Fps
            })
        }
        _ => None,
    }
}

fn payload<T: DeserializeOwned>(action: &str, v: Value) -> Result<T, DecodeError> {
    serde_json::from_value(v).map_err(|source| DecodeError::Payload {
        action: action.to_string(),
        source,
    })
}

impl Inbound {
    /// Parse one text frame.
    pub fn decode(text: &str) -> Result<Inbound, DecodeError> {
        let v: Value = serde_json::from_str(text)?;
        Inbound::from_value(v)
    }

    pub fn from_value(v: Value) -> Result<Inbound, DecodeError> {
        let action = v
            .get("action")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingAction)?
            .to_string();

        if action == ACTION_METRICS {
            return match classify(&v) {
                Some(MetricsKind::System) => Ok(Inbound::Sysmontap(payload(&action, v)?)),
                Some(MetricsKind::Graphics) => Ok(Inbound::Graphics(payload(&action, v)?)),
                Some(MetricsKind::Fps) => Ok(Inbound::Fps(payload(&action, v)?)),
                Some(MetricsKind::Callstack) => Ok(Inbound::Callstack(payload(&action, v)?)),
                Some(MetricsKind::Network) => Ok(Inbound::Network(payload(&action, v)?)),
                None => {
                    let subtype = v.get("subtype").and_then(Value::as_str).unwrap_or("?");
                    Ok(Inbound::Unknown(format!("{action}/{subtype}")))
                }
            };
        }

        let msg = match action.as_str() {
            "welcome" => Inbound::Welcome {
                message: v.get("message").and_then(Value::as_str).map(String::from),
            },
            "monitoring_started" => Inbound::MonitoringStarted(payload(&action, v)?),
            "monitoring_stopped" => Inbound::MonitoringStopped(payload(&action, v)?),
            "server_stats" => {
                let stats = v.get("stats").cloned().unwrap_or(Value::Null);
                Inbound::ServerStats(payload(&action, stats)?)
            }
            "device_list" => Inbound::DeviceList(payload(&action, v)?),
            "focused_processes_list" => Inbound::FocusedProcessesList(payload(&action, v)?),
            "heartbeat_ack" => Inbound::HeartbeatAck,
            "pong" => Inbound::Pong,
            "error" => Inbound::Error {
                message: v
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown server error")
                    .to_string(),
            },
            _ => Inbound::Unknown(action),
        };
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn core_profile(extra: Value) -> Value {
        let mut v = json!({
            "action": "sysmontap_metrics",
            "subtype": "coreprofilesessiontap",
            "timestamp": 1000
        });
        if let (Some(obj), Some(add)) = (v.as_object_mut(), extra.as_object()) {
            for (k, val) in add {
                obj.insert(k.clone(), val.clone());
            }
        }
        v
    }

    #[test]
    fn accumulated_flag_splits_fps_and_callstack() {
        assert_eq!(
            classify(&core_profile(json!({"is_accumulated": true}))),
            Some(MetricsKind::Callstack)
        );
        assert_eq!(
            classify(&core_profile(json!({"is_accumulated": false}))),
            Some(MetricsKind::Fps)
        );
        assert_eq!(classify(&core_profile(json!({}))), Some(MetricsKind::Fps));
    }

    #[test]
    fn subtypes_map_to_categories() {
        let kind = |s: &str| classify(&json!({"action": "sysmontap_metrics", "subtype": s}));
        assert_eq!(kind("sysmontap"), Some(MetricsKind::System));
        assert_eq!(kind("graphics.opengl"), Some(MetricsKind::Graphics));
        assert_eq!(kind("network.stats"), Some(MetricsKind::Network));
        assert_eq!(kind("something.else"), None);
        assert_eq!(classify(&json!({"action": "welcome"})), None);
    }

    #[test]
    fn decode_callstack_payload() {
        let text = json!({
            "action": "sysmontap_metrics",
            "subtype": "coreprofilesessiontap",
            "is_accumulated": true,
            "timestamp": 5,
            "callstack_analysis": {
                "summary": {"total_samples": 40, "unique_threads": 2, "analysis_duration_s": 10.0},
                "flamegraph": {"name": "root", "value": 40, "children": [
                    {"name": "main", "value": 40}
                ]}
            }
        })
        .to_string();
        match Inbound::decode(&text).unwrap() {
            Inbound::Callstack(cs) => {
                let analysis = cs.callstack_analysis.unwrap();
                assert_eq!(analysis.summary.total_samples, 40);
                assert_eq!(analysis.flamegraph.unwrap().children[0].name, "main");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_control_messages() {
        let m = Inbound::decode(
            r#"{"action":"monitoring_started","session_id":"s1","protocols":["sysmontap"]}"#,
        )
        .unwrap();
        match m {
            Inbound::MonitoringStarted(s) => {
                assert_eq!(s.session_id, "s1");
                assert_eq!(s.protocols, vec!["sysmontap"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            Inbound::decode(r#"{"action":"pong"}"#).unwrap(),
            Inbound::Pong
        );
        assert_eq!(
            Inbound::decode(r#"{"action":"error","message":"boom"}"#).unwrap(),
            Inbound::Error {
                message: "boom".into()
            }
        );
        assert_eq!(
            Inbound::decode(r#"{"action":"brand_new"}"#).unwrap(),
            Inbound::Unknown("brand_new".into())
        );
    }

    #[test]
    fn server_stats_are_read_from_nested_field() {
        let m = Inbound::decode(
            r#"{"action":"server_stats","stats":{"active_connections":3,"device_count":1}}"#,
        )
        .unwrap();
        match m {
            Inbound::ServerStats(s) => {
                assert_eq!(s.active_connections, 3);
                assert_eq!(s.device_count, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            Inbound::decode("{not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            Inbound::decode(r#"{"subtype":"sysmontap"}"#),
            Err(DecodeError::MissingAction)
        ));
        assert!(matches!(
            Inbound::decode(r#"{"action":"device_list","devices":"nope"}"#),
            Err(DecodeError::Payload { .. })
        ));
    }
}
