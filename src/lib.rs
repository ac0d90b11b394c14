//! # MHV4 Console Core Library
//!
//! Client-side reconciliation pipeline for the MHV4 multi-channel
//! high-voltage power supply. The crate merges a one-shot REST snapshot with
//! a continuous SSE delta stream into a single coherent device state, applies
//! sentinel-based error detection to the readings, and derives the
//! user-facing representations. The control server that talks to the actual
//! hardware is an external collaborator, reached only through its HTTP/SSE
//! contract.
//!
//! ## Crate Structure
//!
//! - **`config`**: `Settings` loaded from TOML — server location, routes,
//!   timeouts, the set-point voltage limit.
//! - **`error`**: the central `Error` enum (`thiserror`).
//! - **`protocol`**: wire shapes of the control server contract, including
//!   the double-encoded init document and the positional SSE tuple.
//! - **`module`**: generic grouping of flat channel sequences into 4-channel
//!   modules.
//! - **`state`**: `DeviceState` and the watch-based `DeviceStateStore`, the
//!   single authority over merged state.
//! - **`format`**: sentinel-aware numeric formatting, polarity/on-off
//!   labels, border-state and readout derivation.
//! - **`snapshot`**: one-shot loader of the initial device state.
//! - **`stream`**: the long-lived SSE consumer state machine with
//!   poison-on-error recovery.
//! - **`command`**: set-point / on-off / mode submitters with
//!   confirm-then-commit semantics.
//! - **`session`**: connect-to-teardown lifecycle owning all of the above.

pub mod command;
pub mod config;
pub mod error;
pub mod format;
pub mod module;
pub mod protocol;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod stream;

pub use command::{Commander, ModeChangeConfirmation};
pub use config::Settings;
pub use error::{Error, Result};
pub use session::ConsoleSession;
pub use state::{DeviceState, DeviceStateStore};
