//! Infrastructure layer for the warehouse server.
//!
//! Contains the OS-facing adapters: TCP listeners and per-connection
//! sessions, and the TOML settings file.
//!
//! **Dependency rule**: this layer may depend on `application` and `wms_core`,
//! but MUST NOT be imported by the `application` or domain layers.

pub mod network;
pub mod storage;
