//! Streaming delta consumer.
//!
//! A long-lived SSE subscription patches voltage, current, and the busy flag
//! into the device state store. The consumer is an explicit state machine —
//! `Connecting → Open → (message* | error)* → Closed` — rather than a pile of
//! transport callbacks:
//!
//! - `Connecting`: the subscription request is in flight.
//! - `Open`: messages arrive; each one overwrites every channel's readings
//!   and the busy flag. Message order is the only ordering guarantee.
//! - on transport error or end of stream, every reading is poisoned with the
//!   read-failure sentinel (stale values must never look live; mode and busy
//!   are left alone), the consumer sleeps for the configured reconnect delay
//!   and re-enters `Connecting`. Readings stay poisoned until the first
//!   post-reconnect message.
//! - `Closed`: terminal; entered when the owning session signals shutdown.
//!   Dropping the response stream releases the connection on every exit path.

use crate::config::Settings;
use crate::error::Result;
use crate::protocol::decode_delta;
use crate::state::DeviceStateStore;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Named states of the consumer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Open,
    Closed,
}

/// Owns the SSE subscription for one session.
pub struct StreamConsumer {
    http: reqwest::Client,
    stream_url: String,
    reconnect_delay: std::time::Duration,
    store: DeviceStateStore,
    shutdown: watch::Receiver<bool>,
    state: StreamState,
}

impl StreamConsumer {
    pub fn new(
        http: reqwest::Client,
        settings: &Settings,
        store: DeviceStateStore,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            http,
            stream_url: settings.stream_url(),
            reconnect_delay: settings.reconnect_delay(),
            store,
            shutdown,
            state: StreamState::Connecting,
        }
    }

    fn transition(&mut self, next: StreamState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "stream state transition");
            self.state = next;
        }
    }

    /// Drive the subscription until shutdown is signalled. Every abnormal
    /// exit from the open stream poisons the readings before reconnecting.
    pub async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            self.transition(StreamState::Connecting);
            let request = self.http.get(&self.stream_url).send();

            let response = tokio::select! {
                _ = self.shutdown.changed() => break,
                result = request => result,
            };

            match response {
                Ok(resp) if resp.status().is_success() => {
                    self.transition(StreamState::Open);
                    info!(url = %self.stream_url, "stream connection opened");
                    self.consume(resp).await;
                    if *self.shutdown.borrow() {
                        break;
                    }
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "stream endpoint refused subscription");
                    self.store.poison_readings();
                }
                Err(err) => {
                    warn!(%err, "stream connection failed");
                    self.store.poison_readings();
                }
            }

            // back off before re-entering Connecting
            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.transition(StreamState::Closed);
        info!("stream consumer closed");
    }

    /// Read the open byte stream until it errors, ends, or shutdown.
    async fn consume(&mut self, response: reqwest::Response) {
        let mut body = response.bytes_stream();
        let mut decoder = SseFrameDecoder::default();

        loop {
            let chunk = tokio::select! {
                _ = self.shutdown.changed() => return,
                chunk = body.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    for data in decoder.push(&bytes) {
                        if let Err(err) = self.apply_message(&data) {
                            warn!(%err, "discarding malformed stream message");
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(%err, "stream transport error, poisoning readings");
                    self.store.poison_readings();
                    return;
                }
                None => {
                    warn!("stream ended by server, poisoning readings");
                    self.store.poison_readings();
                    return;
                }
            }
        }
    }

    fn apply_message(&self, data: &str) -> Result<()> {
        let delta = decode_delta(data)?;
        self.store.apply_stream_delta(&delta)
    }
}

/// Incremental SSE frame decoder.
///
/// Accumulates raw bytes and yields the `data` payload of each complete
/// event (events end at a blank line). Multiple `data:` lines within one
/// event are joined with `\n`; comment lines and other fields (`event:`,
/// `id:`, `retry:`) are ignored.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    buffer: String,
}

impl SseFrameDecoder {
    /// Feed a chunk of bytes; returns the data payloads of every event that
    /// became complete.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        // normalize on the whole buffer: a CRLF may arrive split across
        // chunks, and a stranded `\r` would hide the blank-line terminator
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..pos + 2).collect();
            if let Some(data) = Self::frame_data(&frame) {
                payloads.push(data);
            }
        }
        payloads
    }

    fn frame_data(frame: &str) -> Option<String> {
        let mut lines = Vec::new();
        for line in frame.lines() {
            if let Some(rest) = line.strip_prefix("data:") {
                lines.push(rest.strip_prefix(' ').unwrap_or(rest));
            }
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}
