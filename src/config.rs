//! Configuration management.
//!
//! Settings are loaded from `config/<name>.toml` via the `config` crate and
//! describe where the control server lives and how patient the console is:
//! route paths, connect/request timeouts, the stream reconnect delay, and the
//! maximum set-point accepted client-side. The control server specifies no
//! timeout or retry policy of its own, so the bounds here are explicit and
//! conservative; snapshot and command requests are never retried.

use crate::error::Error;
use config::Config;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub limits: LimitSettings,
}

/// Location of the control server and the HTTP/SSE contract routes.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    /// Base URL, e.g. `http://192.168.1.10:8080`.
    pub base_url: String,
    #[serde(default = "default_init_route")]
    pub init_route: String,
    #[serde(default = "default_stream_route")]
    pub stream_route: String,
    #[serde(default = "default_apply_route")]
    pub apply_route: String,
    #[serde(default = "default_onoff_route")]
    pub onoff_route: String,
    #[serde(default = "default_status_route")]
    pub status_route: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitSettings {
    /// TCP connect timeout for every request, milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// End-to-end timeout for snapshot and command round trips, milliseconds.
    /// The SSE subscription is exempt; it is a long-lived connection.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Delay before the stream consumer re-subscribes after a transport
    /// error, milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Largest set-point accepted client-side, volts.
    #[serde(default = "default_max_voltage")]
    pub max_voltage: f64,
}

fn default_init_route() -> String {
    "/mhv4_data".to_string()
}
fn default_stream_route() -> String {
    "/sse".to_string()
}
fn default_apply_route() -> String {
    "/apply".to_string()
}
fn default_onoff_route() -> String {
    "/onoff".to_string()
}
fn default_status_route() -> String {
    "/status".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    3_000
}
fn default_request_timeout_ms() -> u64 {
    5_000
}
fn default_reconnect_delay_ms() -> u64 {
    1_000
}
fn default_max_voltage() -> f64 {
    300.0
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_voltage: default_max_voltage(),
        }
    }
}

impl Settings {
    /// Load settings from `config/<name>.toml` (default: `config/default.toml`).
    pub fn new(config_name: Option<&str>) -> Result<Self, Error> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .build()
            .map_err(Error::Config)?;

        s.try_deserialize().map_err(Error::Config)
    }

    /// Settings pointing at `base_url` with default routes and limits.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            server: ServerSettings {
                base_url: base_url.into(),
                init_route: default_init_route(),
                stream_route: default_stream_route(),
                apply_route: default_apply_route(),
                onoff_route: default_onoff_route(),
                status_route: default_status_route(),
            },
            limits: LimitSettings::default(),
        }
    }

    pub fn init_url(&self) -> String {
        self.join(&self.server.init_route)
    }

    pub fn stream_url(&self) -> String {
        self.join(&self.server.stream_route)
    }

    pub fn apply_url(&self) -> String {
        self.join(&self.server.apply_route)
    }

    pub fn onoff_url(&self) -> String {
        self.join(&self.server.onoff_route)
    }

    pub fn status_url(&self) -> String {
        self.join(&self.server.status_route)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.limits.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.limits.request_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.limits.reconnect_delay_ms)
    }

    fn join(&self, route: &str) -> String {
        format!("{}{}", self.server.base_url.trim_end_matches('/'), route)
    }
}
