//! # wms-core
//!
//! Shared library for the warehouse command server containing the binary
//! frame codec, the sector/inventory state machine, and the robot position
//! state machine.
//!
//! This crate is used by both the server and the console client.
//! It has zero dependencies on sockets or an async runtime.
//!
//! # Architecture overview
//!
//! The warehouse has five sectors: a receiving area, three color storage
//! areas (red, green, yellow) with a small shelf capacity, and a shipping
//! area.  Items arrive in receiving, are classified by color into storage,
//! and are later moved to shipping.  A single robot travels between the
//! receiving area and the storage shelves.
//!
//! - **`protocol`** – How bytes travel over the network.  Requests are
//!   fixed-length frames (7 bytes for the control layout, 17 bytes for the
//!   data layout) and responses carry a one-byte status code.
//!
//! - **`domain`** – Pure state machines with no I/O.  The `SectorStore`
//!   owns every stock counter behind one lock; the `Robot` owns the robot's
//!   location and busy state behind another.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `wms_core::SectorStore` instead of `wms_core::domain::sector_store::SectorStore`.
pub use domain::robot::{MoveOutcome, MovePlan, Robot, RobotStatus, RobotTimings};
pub use domain::sector::{ItemColor, Sector, SectorId, SectorStatus, StockError};
pub use domain::sector_store::{
    ClearScope, ColorCounters, CumulativeCounters, ReceiveReport, SectorStore, SectorView,
    WarehouseSnapshot,
};
pub use domain::sensor::{ColorSensor, CyclingColorSensor, FixedColorSensor};
pub use protocol::codec::{decode_request, encode_request, encode_response, FrameError};
pub use protocol::frame::{FrameVariant, RequestFrame, ResponseFrame, StatusCode};
