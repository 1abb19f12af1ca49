//! Infrastructure layer for the console.
//!
//! # Sub-modules
//!
//! - **`connection`** – `ConsoleConnection`, a single TCP connection that
//!   performs one request/response exchange at a time.
//!
//! - **`reconnect`** – `Backoff` and `ReconnectingConsole`, which replaces a
//!   lost connection on the next request, waiting longer after each failure.

pub mod connection;
pub mod reconnect;
