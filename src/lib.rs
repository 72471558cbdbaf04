#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Syncplay Server
//!
//! A room synchronization server speaking Syncplay's line-delimited JSON
//! protocol: clients join named rooms, report local playback position and
//! file, and the server reconciles them against a single authoritative
//! cursor per room while measuring per-connection latency so corrections
//! account for network delay.
//!
//! The crate is organized the way a small stateful network service grows:
//! a layered [`config`] module resolves settings from defaults, files, env
//! vars and CLI flags; [`protocol`] owns the wire envelope and validation
//! rules; [`room`] is the synchronization engine itself (watchers, rooms,
//! position reconciliation), running as a single actor task so that no
//! locks are needed on shared state; [`server`] wires the per-connection
//! session state machine on top of it; [`connection`] does line framing
//! and drives the in-band TLS upgrade; [`security`] holds the
//! controlled-room hash scheme, server-password comparison and the TLS
//! context lifecycle.

/// Line framing, accept loop and per-connection I/O tasks.
pub mod connection;

/// Server configuration and environment variables.
pub mod config;

/// Structured logging configuration.
pub mod logging;

/// Wire protocol: envelope parsing, message shapes, validation.
pub mod protocol;

/// Optional pass-through proxy front-end (TCP and WebSocket).
#[cfg(feature = "proxy-ws")]
pub mod proxy;

/// Watcher/Room data model, position reconciliation, the room-owning actor.
pub mod room;

/// Controlled-room hashing, server-password comparison, TLS context lifecycle.
pub mod security;

/// Session state machine and message dispatch on top of the room actor.
pub mod server;

/// Optional SQLite snapshot writer driven by `exportRooms()`.
#[cfg(feature = "stats")]
pub mod stats;

/// The version string this build advertises to clients in the Hello reply.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
