//! Application layer for the console.
//!
//! - **`poll_stock`** – Periodically asks the server for the stock of every
//!   sector and hands each decoded snapshot to a callback.  The server's
//!   answer always replaces whatever the console showed before.

pub mod poll_stock;
