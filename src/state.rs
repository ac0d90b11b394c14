//! Device state model and the process-wide state store.
//!
//! `DeviceState` is the single merged view of the MHV4 stack: the RC/local
//! mode flag, the busy flag, and one `Channel` per physical output in the
//! order the control server reports them. Channel identity is that position;
//! it is established once by the snapshot and stays fixed for the session.
//!
//! `DeviceStateStore` is the only authority over that state. It wraps a
//! `tokio::sync::watch` channel, so every mutation is published atomically:
//! readers always observe either the pre- or post-mutation state, never an
//! interleave, and subscribers are woken without polling. Mutation happens
//! only through the named mutators below — the snapshot loader calls
//! [`DeviceStateStore::apply_snapshot`] once, the streaming consumer calls
//! [`DeviceStateStore::apply_stream_delta`] and
//! [`DeviceStateStore::poison_readings`], and command submitters call
//! [`DeviceStateStore::set_outputs`] / [`DeviceStateStore::set_mode`]
//! after a confirmed round trip.

use crate::error::{Error, Result};
use crate::module::MODULE_SIZE;
use crate::protocol::{Snapshot, StreamDelta};
use serde::Serialize;
use tokio::sync::watch;

/// Reserved reading value meaning "no measurement available".
///
/// The control server emits `-100_000` when a hardware read fails; anything
/// below [`READ_ERROR_THRESHOLD`] is treated the same way and must never be
/// scaled into a displayable number.
pub const READ_ERROR_SENTINEL: i64 = -100_000;

/// Readings strictly below this value denote a read failure.
pub const READ_ERROR_THRESHOLD: i64 = -99_999;

/// True when a raw reading denotes a read failure rather than a measurement.
pub fn is_read_failure(raw: i64) -> bool {
    raw < READ_ERROR_THRESHOLD
}

/// One physical high-voltage output, addressed by (bus, device, channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub bus: i64,
    pub device: i64,
    pub channel: i64,
    pub is_on: bool,
    pub is_positive: bool,
    /// Voltage readback in tenths of a volt.
    pub voltage_raw: i64,
    /// Leak current readback in thousandths of a microampere.
    pub current_raw: i64,
}

/// The merged device state: snapshot identity plus streaming readback.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceState {
    /// Remote-control (true) vs. local mode.
    pub mode: bool,
    /// An operation (e.g. a voltage ramp) is in progress.
    pub busy: bool,
    pub channels: Vec<Channel>,
}

impl DeviceState {
    /// True when every channel reading is the read-failure sentinel. This is
    /// the post-disconnect condition: nothing on screen may look live.
    pub fn all_readings_poisoned(&self) -> bool {
        !self.channels.is_empty()
            && self
                .channels
                .iter()
                .all(|c| is_read_failure(c.voltage_raw) && is_read_failure(c.current_raw))
    }
}

/// Session-scoped handle to the device state.
///
/// Cloning is cheap and every clone shares the same underlying watch
/// channel.
#[derive(Debug, Clone)]
pub struct DeviceStateStore {
    sender: watch::Sender<DeviceState>,
}

impl DeviceStateStore {
    /// Create an empty store. The state stays empty until the first snapshot.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(DeviceState::default());
        Self { sender }
    }

    /// Clone of the current state.
    pub fn current(&self) -> DeviceState {
        self.sender.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.sender.subscribe()
    }

    /// Replace the whole state from an initial snapshot. This is the only
    /// point where channel identity and count are established.
    ///
    /// The snapshot's `current` field is the last hardware voltage readback
    /// and seeds `voltage_raw`; no current reading exists until the first
    /// stream message, so `current_raw` starts at the sentinel.
    pub fn apply_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        if snapshot.mhv4_data_array.len() % MODULE_SIZE != 0 {
            return Err(Error::Protocol(format!(
                "snapshot reports {} channels, not a multiple of {}",
                snapshot.mhv4_data_array.len(),
                MODULE_SIZE
            )));
        }

        let channels = snapshot
            .mhv4_data_array
            .into_iter()
            .map(|rec| Channel {
                bus: rec.bus,
                device: rec.dev,
                channel: rec.ch,
                is_on: rec.is_on,
                is_positive: rec.is_positive,
                voltage_raw: rec.current,
                current_raw: READ_ERROR_SENTINEL,
            })
            .collect();

        self.sender.send_replace(DeviceState {
            mode: snapshot.is_rc,
            busy: snapshot.is_progress,
            channels,
        });
        Ok(())
    }

    /// Fold one stream message into the state: overwrite every channel's
    /// readings and the busy flag. Later messages supersede earlier ones;
    /// applying the same message twice is a no-op.
    ///
    /// Array lengths must match the channel count exactly — a mismatch is a
    /// contract violation and nothing is applied.
    pub fn apply_stream_delta(&self, delta: &StreamDelta) -> Result<()> {
        let n = self.sender.borrow().channels.len();
        if delta.voltage.len() != n || delta.current.len() != n {
            return Err(Error::Protocol(format!(
                "stream delta carries {}/{} readings for {} channels",
                delta.voltage.len(),
                delta.current.len(),
                n
            )));
        }

        self.sender.send_modify(|state| {
            for (i, channel) in state.channels.iter_mut().enumerate() {
                channel.voltage_raw = delta.voltage[i];
                channel.current_raw = delta.current[i];
            }
            state.busy = delta.is_progress;
        });
        Ok(())
    }

    /// Replace every channel's `is_on` with the desired pattern in a single
    /// publication, so subscribers observe either the old pattern or the new
    /// one, never a mix. The pattern length must match the channel count
    /// exactly; a mismatch mutates nothing.
    pub fn set_outputs(&self, desired: &[bool]) -> Result<()> {
        let n = self.sender.borrow().channels.len();
        if desired.len() != n {
            return Err(Error::Validation(format!(
                "{} on/off values for {} channels",
                desired.len(),
                n
            )));
        }

        self.sender.send_modify(|state| {
            for (channel, &on) in state.channels.iter_mut().zip(desired) {
                channel.is_on = on;
            }
        });
        Ok(())
    }

    /// Set the RC/local mode flag.
    pub fn set_mode(&self, mode: bool) {
        self.sender.send_modify(|state| state.mode = mode);
    }

    /// Overwrite every channel reading with the read-failure sentinel so
    /// stale values are never mistaken for live ones. Mode and busy are left
    /// untouched.
    pub fn poison_readings(&self) {
        self.sender.send_modify(|state| {
            for channel in &mut state.channels {
                channel.voltage_raw = READ_ERROR_SENTINEL;
                channel.current_raw = READ_ERROR_SENTINEL;
            }
        });
    }
}

impl Default for DeviceStateStore {
    fn default() -> Self {
        Self::new()
    }
}
