//! Command submitters: pushing user intent to the control server.
//!
//! All three commands follow the same protocol: serialize the intent, POST
//! it, decode the acknowledgement, and fold the intent into the device state
//! store only when the acknowledgement is affirmative. A falsy
//! acknowledgement, a non-success status, or a transport failure leaves the
//! store exactly as it was. Nothing is ever committed optimistically and
//! nothing retries.
//!
//! Set-points are validated client-side before any request goes out; an
//! empty, non-numeric, negative, or over-limit value aborts the submission
//! with a `Validation` error.
//!
//! Flipping RC/local mode while channels are energized is operationally
//! unsafe, so [`Commander::flip_mode`] demands a [`ModeChangeConfirmation`]
//! token that only an explicit confirm step can produce.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::state::DeviceStateStore;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

/// Proof that the operator explicitly confirmed a mode change. There is no
/// other way to call [`Commander::flip_mode`].
#[derive(Debug)]
pub struct ModeChangeConfirmation(());

impl ModeChangeConfirmation {
    /// Record that the destructive-style confirm step was answered yes.
    pub fn granted() -> Self {
        Self(())
    }
}

/// Parse an operator-entered set-point (volts) into tenths of a volt.
pub fn parse_setpoint(input: &str, max_voltage: f64) -> Result<i64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("set-point is empty".into()));
    }
    let volts: f64 = trimmed
        .parse()
        .map_err(|_| Error::Validation(format!("set-point '{trimmed}' is not a number")))?;
    if !volts.is_finite() || volts < 0.0 {
        return Err(Error::Validation(format!(
            "set-point {volts} must be a non-negative voltage"
        )));
    }
    if volts > max_voltage {
        return Err(Error::Validation(format!(
            "set-point {volts} V exceeds the {max_voltage} V limit"
        )));
    }
    Ok((volts * 10.0).round() as i64)
}

/// True when the server's acknowledgement is affirmative.
fn ack_is_affirmative(ack: &serde_json::Value) -> bool {
    match ack {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Null => false,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Submits commands for one session and folds confirmed results into the
/// store. Clonable; every clone shares the session's teardown flag.
#[derive(Clone)]
pub struct Commander {
    http: reqwest::Client,
    settings: Settings,
    store: DeviceStateStore,
    closed: watch::Receiver<bool>,
}

impl Commander {
    pub fn new(
        http: reqwest::Client,
        settings: Settings,
        store: DeviceStateStore,
        closed: watch::Receiver<bool>,
    ) -> Self {
        Self {
            http,
            settings,
            store,
            closed,
        }
    }

    fn session_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// POST the intent and require an affirmative acknowledgement.
    async fn submit<T: Serialize + ?Sized>(&self, url: &str, intent: &T) -> Result<()> {
        let response = self
            .http
            .post(url)
            .timeout(self.settings.request_timeout())
            .json(intent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }

        let ack: serde_json::Value = response.json().await?;
        if !ack_is_affirmative(&ack) {
            return Err(Error::Protocol(
                "control server did not acknowledge the command".into(),
            ));
        }
        Ok(())
    }

    /// Apply desired voltages, one per channel in server order, in tenths of
    /// a volt. On acceptance the readback is NOT updated here — the stream
    /// reflects the new voltage once the hardware ramps.
    pub async fn apply_setpoints(&self, setpoints: &[i64]) -> Result<()> {
        let n = self.store.current().channels.len();
        if setpoints.len() != n {
            return Err(Error::Validation(format!(
                "{} set-points for {} channels",
                setpoints.len(),
                n
            )));
        }
        if let Some(bad) = setpoints.iter().find(|&&v| v < 0) {
            return Err(Error::Validation(format!(
                "set-point {bad} is negative"
            )));
        }

        self.submit(&self.settings.apply_url(), setpoints).await?;
        info!(channels = n, "set-points accepted, hardware ramping");
        Ok(())
    }

    /// Apply desired output states, one per channel in server order. On
    /// acceptance the intent is folded into `is_on`.
    pub async fn apply_on_off(&self, desired: &[bool]) -> Result<()> {
        let n = self.store.current().channels.len();
        if desired.len() != n {
            return Err(Error::Validation(format!(
                "{} on/off values for {} channels",
                desired.len(),
                n
            )));
        }

        self.submit(&self.settings.onoff_url(), desired).await?;

        if self.session_closed() {
            debug!("session closed, discarding late on/off acknowledgement");
            return Ok(());
        }

        // single publication: subscribers see the old or the new pattern
        self.store.set_outputs(desired)?;
        let on = desired.iter().filter(|&&v| v).count();
        info!(on, off = n - on, "output states committed");
        Ok(())
    }

    /// Flip RC/local mode. Requires the explicit confirmation token; without
    /// it the request cannot even be constructed. On acceptance the mode is
    /// folded into the store.
    pub async fn flip_mode(
        &self,
        desired: bool,
        _confirmation: ModeChangeConfirmation,
    ) -> Result<()> {
        self.submit(&self.settings.status_url(), &desired).await?;

        if self.session_closed() {
            debug!("session closed, discarding late mode acknowledgement");
            return Ok(());
        }

        self.store.set_mode(desired);
        info!(rc = desired, "mode change committed");
        Ok(())
    }
}
