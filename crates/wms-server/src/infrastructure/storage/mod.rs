//! Storage infrastructure: the server settings file.
//!
//! The `config` sub-module reads `wms-server.toml`, fills in defaults for
//! anything missing, validates the result and turns it into the shared
//! `Warehouse` the dispatcher runs against.

pub mod config;
