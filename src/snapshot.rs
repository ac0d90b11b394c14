//! Snapshot loader: one-shot fetch of the initial full-device state.
//!
//! Runs exactly once per session, right after connect. On success the device
//! state is replaced wholesale — this is the only point where channel
//! identity and count are established. On any failure (transport, HTTP
//! status, decode, channel count) the error is surfaced to the caller and
//! the store is left untouched. There is no automatic retry; the caller
//! decides whether starting the session without a snapshot makes sense.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::protocol::decode_snapshot;
use crate::state::DeviceStateStore;
use tracing::{debug, info};

/// Fetch the init document and populate the store.
pub async fn load_snapshot(
    http: &reqwest::Client,
    settings: &Settings,
    store: &DeviceStateStore,
) -> Result<()> {
    let url = settings.init_url();
    debug!(%url, "fetching initial device state");

    let response = http
        .get(&url)
        .timeout(settings.request_timeout())
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Status(status.as_u16()));
    }

    let body = response.text().await?;
    let snapshot = decode_snapshot(&body)?;
    let channel_count = snapshot.mhv4_data_array.len();

    store.apply_snapshot(snapshot)?;
    info!(
        channels = channel_count,
        modules = channel_count / crate::module::MODULE_SIZE,
        "initial device state loaded"
    );
    Ok(())
}
