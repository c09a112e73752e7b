//! Admin protocol client.
//!
//! The client is layered as:
//! - `reader`: splits the socket byte stream into lines
//! - `session`: sends a command and collects/decodes its response
//! - `connect`: opens the TCP connection to the admin port

pub mod connect;
pub mod reader;
pub mod session;

pub use connect::{Connector, TcpConnector};
pub use session::{AdminClient, Limits, Listing};
