//! Wire shapes of the control server's HTTP/SSE contract.
//!
//! The control server is externally owned; this module only defines the
//! payloads the console consumes and produces. Two decode quirks live here:
//!
//! - The init endpoint sometimes double-encodes its document (a JSON string
//!   whose content is the JSON document). [`decode_snapshot`] accepts both.
//! - Each SSE event's data is a positional 3-tuple
//!   `[voltage_array, current_array, is_progress]`, decoded into the named
//!   [`StreamDelta`].

use crate::error::Result;
use serde::{Deserialize, Deserializer};

/// One per-channel record of the init document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnapshotRecord {
    pub bus: i64,
    pub dev: i64,
    pub ch: i64,
    /// Last hardware voltage readback, tenths of a volt.
    pub current: i64,
    pub is_on: bool,
    pub is_positive: bool,
}

/// The full initial-state document from `GET <init>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Snapshot {
    pub is_rc: bool,
    pub is_progress: bool,
    pub mhv4_data_array: Vec<SnapshotRecord>,
}

/// One SSE message: readings for every channel plus the busy flag, indexed
/// identically to the snapshot's channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDelta {
    pub voltage: Vec<i64>,
    pub current: Vec<i64>,
    pub is_progress: bool,
}

impl<'de> Deserialize<'de> for StreamDelta {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (voltage, current, is_progress) =
            <(Vec<i64>, Vec<i64>, bool)>::deserialize(deserializer)?;
        Ok(Self {
            voltage,
            current,
            is_progress,
        })
    }
}

/// Decode the init document, unwrapping one level of double encoding when
/// the server hands back a JSON string containing JSON.
pub fn decode_snapshot(body: &str) -> Result<Snapshot> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let snapshot = match value {
        serde_json::Value::String(inner) => serde_json::from_str(&inner)?,
        other => serde_json::from_value(other)?,
    };
    Ok(snapshot)
}

/// Decode one SSE event's data payload.
pub fn decode_delta(data: &str) -> Result<StreamDelta> {
    Ok(serde_json::from_str(data)?)
}
