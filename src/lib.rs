//! # linelog
//!
//! Core library for the `linelogd` server: a line-oriented append-and-replay
//! service. Clients send newline-delimited records over TCP; the server
//! retains the most recent records in a fixed-capacity ring and streams the
//! retained log back on every request. An in-band directive can reposition
//! the replay to the start of a chosen record plus an intra-record offset.
//!
//! ## Crate Structure
//!
//! - **`ring_buffer`**: fixed ten-slot circular buffer of owned byte
//!   records with overwrite-oldest semantics and byte-offset lookup.
//! - **`device`**: the shared `LogDevice` (ring plus working index behind
//!   one lock); append with partial-record carryover, offset reads, seeks.
//! - **`backend`**: the `LogBackend` seam between the server and whichever
//!   log is canonical (the in-process device or a character-device node).
//! - **`network`**: wire protocol (framing and the seek directive), the
//!   per-connection handler state machine, and the accept loop.
//! - **`timestamp`**: the periodic timestamp record writer.
//! - **`config`**: settings loaded from defaults, an optional TOML file,
//!   and the environment, validated at startup.
//! - **`error`**: the `DeviceError` type shared across the crate.

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod network;
pub mod ring_buffer;
pub mod timestamp;
