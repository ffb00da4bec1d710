//! soloserve: a single-connection TCP server engine.
//!
//! The engine binds a listening endpoint, accepts exactly one client, and
//! drives the bidirectional byte stream through a pluggable [`Protocol`]
//! strategy until either peer closes or the server is stopped.
//!
//! Two independent loops poll one non-blocking socket: the receive loop
//! feeds bytes to the strategy and enqueues any produced responses, the
//! transmit loop drains the outbound queue (finishing pending sends even
//! during shutdown). Failures from the background contexts are captured
//! per context and returned by [`Server::stop`], never raised mid-cycle.
//!
//! ```no_run
//! use soloserve::{protocols::Ping, Server};
//!
//! let mut server = Server::new(7878, Ping::new());
//! server.start()?;
//! // ... client connects, exchanges ping/pong ...
//! let failures = server.stop()?;
//! assert!(failures.is_empty());
//! # Ok::<(), soloserve::ServerError>(())
//! ```

pub mod config;
mod conn;
mod error;
mod protocol;
pub mod protocols;
mod server;

pub use error::ServerError;
pub use protocol::Protocol;
pub use server::{Server, Status};
