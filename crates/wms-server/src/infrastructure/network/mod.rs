//! Network infrastructure for the warehouse server.
//!
//! # Sub-modules
//!
//! - **`connection_manager`** – Binds one TCP listener per frame variant,
//!   accepts consoles up to the configured limit, and keeps a registry of
//!   live connections so shutdown and diagnostics can see them.
//!
//! - **`session`** – The per-connection read loop: read exactly one frame,
//!   decode it, hand it to the `FrameHandler`, write the response, repeat
//!   until the peer closes or goes idle.

pub mod connection_manager;
pub mod session;
