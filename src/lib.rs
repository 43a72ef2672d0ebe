//! SetuNet - Network control layer for the controller
//!
//! Drives the SPI-attached TCP/IP offload chip and multiplexes a bounded
//! pool of logical TCP client sessions onto the chip's hardware sockets.
//!
//! Layering, bottom up: [`transport`] executes chip-select-bracketed
//! register transactions, [`registers`] resolves semantic register names to
//! absolute addresses, [`socket`] manages the hardware socket lifecycle
//! through command-completion polling, [`server`] owns the client session
//! pool. [`link`] watches the PHY for the main loop.

pub mod config;
pub mod diag;
pub mod error;
pub mod link;
pub mod registers;
pub mod server;
pub mod socket;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
pub use server::{TcpServer, MAX_CLIENTS};
pub use socket::SocketManager;
