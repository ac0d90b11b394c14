//! Custom error types for the console.
//!
//! This module defines the primary error type, `Error`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way
//! to classify the failure modes of the reconciliation pipeline:
//!
//! - **`Transport`**: network/connection failures talking to the control
//!   server (wraps `reqwest::Error`).
//! - **`Status`**: the control server answered with a non-success HTTP status.
//! - **`Decode`**: a payload did not have the expected shape (wraps
//!   `serde_json::Error`).
//! - **`Protocol`**: the payload decoded but violated the data contract — a
//!   falsy command acknowledgement, or a channel count that is not a multiple
//!   of the module size.
//! - **`Validation`**: user input rejected client-side before any request is
//!   sent (empty, non-numeric, negative, or over-limit set-point).
//! - **`Config`**: configuration file problems (wraps the `config` crate).
//!
//! Snapshot loading and command submission surface these to their caller and
//! leave the device state untouched; the streaming consumer treats transport
//! failures as recoverable and never returns them.

use thiserror::Error;

/// Convenience alias for results using the console error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Control server returned HTTP status {0}")]
    Status(u16),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
