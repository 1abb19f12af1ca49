//! wms-console library entry point.
//!
//! The console is the other end of the warehouse protocol: it opens a TCP
//! connection to one of the server's ports, writes one request frame, and
//! reads exactly one response frame back.
//!
//! - **`infrastructure`** – the socket: connect, send, read a response of the
//!   right length, reconnect with back-off when the server goes away.
//! - **`application`** – what the console does with the socket; today that
//!   is polling the all-stock query and reporting the snapshot.

pub mod application;
pub mod infrastructure;
