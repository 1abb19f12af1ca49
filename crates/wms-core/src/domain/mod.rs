//! Domain module: warehouse state machines with no I/O.

pub mod robot;
pub mod sector;
pub mod sector_store;
pub mod sensor;
