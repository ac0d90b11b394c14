//! User-facing representations of raw channel state.
//!
//! Raw readings are integers in hardware units (tenths of a volt,
//! thousandths of a microampere). Formatting scales them and renders a fixed
//! number of fractional digits — except when the reading is the read-failure
//! sentinel, which always renders as `"read error!"` and is never scaled.
//!
//! Rounding is round-half-to-even, the behavior of Rust's fixed-precision
//! `format!`; the tests pin this down at exact halves.

use crate::error::Result;
use crate::module::{group_by_module, MODULE_SIZE};
use crate::state::{is_read_failure, Channel, DeviceState};

/// Text shown wherever a reading is unavailable.
pub const READ_ERROR_TEXT: &str = "read error!";

/// Scale factor and fractional digits for voltage readings (tenths → volts).
pub const VOLTAGE_FORMAT: (f64, usize) = (0.1, 1);

/// Scale factor and fractional digits for current readings (thousandths → µA).
pub const CURRENT_FORMAT: (f64, usize) = (0.001, 3);

/// Render a raw reading with the given scale and fractional digit count, or
/// `"read error!"` when the reading is below the sentinel threshold.
pub fn format_reading(raw: i64, scale: f64, decimals: usize) -> String {
    if is_read_failure(raw) {
        return READ_ERROR_TEXT.to_string();
    }
    format!("{:.*}", decimals, raw as f64 * scale)
}

/// Voltage in volts with one fractional digit.
pub fn format_voltage(raw: i64) -> String {
    format_reading(raw, VOLTAGE_FORMAT.0, VOLTAGE_FORMAT.1)
}

/// Leak current in microamperes with three fractional digits.
pub fn format_current(raw: i64) -> String {
    format_reading(raw, CURRENT_FORMAT.0, CURRENT_FORMAT.1)
}

/// Polarity sign for a channel.
pub fn polarity_label(is_positive: bool) -> &'static str {
    if is_positive {
        "+"
    } else {
        "-"
    }
}

/// Output-enabled label for a channel.
pub fn onoff_label(is_on: bool) -> &'static str {
    if is_on {
        "ON"
    } else {
        "OFF"
    }
}

/// Console border/alert state derived from the device state. The legacy UI
/// drew the table border green in normal operation, yellow while an
/// operation was in progress, and red once the stream had died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderState {
    Normal,
    Busy,
    Alert,
}

/// Derive the border state: `Alert` once every reading is poisoned (the
/// post-disconnect condition), `Busy` while an operation is in progress.
pub fn border_state(state: &DeviceState) -> BorderState {
    if state.all_readings_poisoned() {
        BorderState::Alert
    } else if state.busy {
        BorderState::Busy
    } else {
        BorderState::Normal
    }
}

/// One displayable table row for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReadout {
    pub bus: i64,
    pub device: i64,
    pub channel: i64,
    pub polarity: &'static str,
    pub onoff: &'static str,
    pub voltage: String,
    pub current: String,
}

impl ChannelReadout {
    pub fn from_channel(channel: &Channel) -> Self {
        Self {
            bus: channel.bus,
            device: channel.device,
            channel: channel.channel,
            polarity: polarity_label(channel.is_positive),
            onoff: onoff_label(channel.is_on),
            voltage: format_voltage(channel.voltage_raw),
            current: format_current(channel.current_raw),
        }
    }
}

/// Readouts for every channel, grouped per module for presentation.
pub fn module_readouts(state: &DeviceState) -> Result<Vec<[ChannelReadout; MODULE_SIZE]>> {
    let rows: Vec<ChannelReadout> = state.channels.iter().map(ChannelReadout::from_channel).collect();
    group_by_module(&rows)
}
