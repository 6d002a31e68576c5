//! Wire types exchanged over the streaming connection.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Timestamp;

/// Envelope written for every [`ConnectionManager::send`](crate::stream::ConnectionManager::send).
///
/// ```json
/// { "type": "ping", "data": {}, "timestamp": 1700000000 }
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub data: Value,
    /// Seconds since the Unix epoch at construction time
    pub timestamp: Timestamp,
}

impl OutboundMessage {
    #[must_use]
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Events the Tavo streaming endpoints are known to emit.
///
/// The connection manager never decodes inbound payloads; handlers that want typed access
/// can parse the raw text with [`str::parse`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    ScanProgress {
        scan_id: String,
        progress: f64,
        status: String,
        #[serde(default)]
        current_step: Option<String>,
        #[serde(default)]
        estimated_completion: Option<String>,
    },
    ScanCompleted {
        scan_id: String,
        total_issues: u32,
        high_severity: u32,
        medium_severity: u32,
        low_severity: u32,
        /// Duration of the scan in seconds
        scan_duration: u64,
    },
    ScanError {
        scan_id: String,
        error_message: String,
        #[serde(default)]
        error_code: Option<String>,
    },
    SystemUpdate {
        message: String,
        level: String,
        timestamp: u64,
    },
    Heartbeat {
        server_time: u64,
    },
}

impl StreamEvent {
    /// The scan this event refers to, if any.
    #[must_use]
    pub fn scan_id(&self) -> Option<&str> {
        match self {
            Self::ScanProgress { scan_id, .. }
            | Self::ScanCompleted { scan_id, .. }
            | Self::ScanError { scan_id, .. } => Some(scan_id),
            Self::SystemUpdate { .. } | Self::Heartbeat { .. } => None,
        }
    }

    /// `true` once no further progress events will follow for the scan.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::ScanCompleted { .. } | Self::ScanError { .. })
    }
}

impl FromStr for StreamEvent {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn outbound_envelope_shape() {
        let message = OutboundMessage::new("subscribe", json!({ "scan_id": "s-1" }));
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["data"]["scan_id"], "s-1");
        let now = chrono::Utc::now().timestamp();
        let timestamp = value["timestamp"].as_i64().unwrap();
        assert!((now - timestamp).abs() <= 1);
    }

    #[test]
    fn scan_progress_decodes_without_optional_fields() {
        let raw = json!({
            "type": "scan_progress",
            "data": { "scan_id": "abc", "progress": 42.5, "status": "running" }
        })
        .to_string();

        let event: StreamEvent = raw.parse().unwrap();

        assert_eq!(
            event,
            StreamEvent::ScanProgress {
                scan_id: "abc".to_owned(),
                progress: 42.5,
                status: "running".to_owned(),
                current_step: None,
                estimated_completion: None,
            }
        );
        assert_eq!(event.scan_id(), Some("abc"));
        assert!(!event.is_terminal());
    }

    #[test]
    fn scan_completed_is_terminal() {
        let raw = r#"{"type":"scan_completed","data":{"scan_id":"abc","total_issues":3,
            "high_severity":1,"medium_severity":1,"low_severity":1,"scan_duration":90}}"#;

        let event: StreamEvent = raw.parse().unwrap();

        assert!(event.is_terminal());
    }

    #[test]
    fn heartbeat_has_no_scan() {
        let event: StreamEvent = r#"{"type":"heartbeat","data":{"server_time":1}}"#
            .parse()
            .unwrap();

        assert_eq!(event, StreamEvent::Heartbeat { server_time: 1 });
        assert_eq!(event.scan_id(), None);
    }

    #[test]
    fn unknown_event_type_fails_to_decode() {
        let result = r#"{"type":"mystery","data":{}}"#.parse::<StreamEvent>();

        assert!(result.is_err());
    }
}
