//! Application layer of the warehouse server.
//!
//! # What lives here? (for beginners)
//!
//! The application layer sits between the pure state machines in `wms-core`
//! and the sockets in `infrastructure`.  It owns no sockets and reads no
//! files; it only decides what a decoded request *means* and which domain
//! operation carries it out.
//!
//! # Sub-modules
//!
//! - **`dispatch`** – Turns a decoded request frame into a typed `Request`,
//!   runs it against the shared `Warehouse`, and builds the response frame.
//!   Every error is converted into a status byte here; nothing escapes to
//!   the connection layer.
//!
//! - **`robot_control`** – Drives the robot through a full move (travel,
//!   arrive, stow/retrieve) with async sleeps, and guarantees the robot is
//!   released even if the move is interrupted.

pub mod dispatch;
pub mod robot_control;
