//! extdb core: the in-process extension behind a game server's text call
//! boundary.
//!
//! The host hands over a C-string command and a small output buffer; this
//! crate parses the command, runs protocol handlers synchronously or on a
//! worker pool, and pages results that outgrow the buffer through a
//! ticket-and-poll scheme:
//!
//! ```text
//! host ──call──> dispatcher ──┬── direct response
//!                             └── enqueue ──> worker ──> handler ──> store
//! host ──5:<id>──> dispatcher ──> store ──> chunk (or [3], or "")
//! ```
//!
//! The embedding shim (`extdb-ext`) owns the C ABI; everything observable
//! through it lives here. See [`ext::Extension`] for the entry point and
//! [`wire`] for the response envelopes.

pub mod config;
pub mod db;
pub mod error;
pub mod ext;
pub mod ids;
pub mod logging;
pub mod protocols;
pub mod results;
pub mod wire;
pub mod workers;

pub use config::Settings;
pub use error::{ExtError, Result};
pub use ext::{Extension, WIRE_VERSION};
pub use logging::WorkerGuard;
