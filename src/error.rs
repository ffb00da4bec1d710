//! Error taxonomy for the server engine.
//!
//! Two families:
//! - Lifecycle misuse (`AlreadyRunning`, `NotRunning`): raised synchronously
//!   at the call site, no state change.
//! - Captured failures (everything else): a background context records the
//!   error and ends; the list is surfaced to the caller of `Server::stop`.
//!
//! A `WouldBlock` result on the non-blocking socket is never an error here.
//! It is handled entirely inside the I/O loops as a retry trigger.

use std::io;

/// Errors produced by the server lifecycle and its background contexts.
#[derive(Debug)]
pub enum ServerError {
    /// `start()` called while the server is not stopped.
    AlreadyRunning,
    /// `stop()` or `send()` called while the server is stopped.
    NotRunning,
    /// Creating or binding the listening socket failed during `start()`.
    Bind(io::Error),
    /// Marking the listening socket passive failed.
    Listen(io::Error),
    /// Accepting the client or switching it to non-blocking mode failed.
    Accept(io::Error),
    /// Spawning a background thread failed.
    Spawn(io::Error),
    /// The receive loop hit a fatal read error.
    Recv(io::Error),
    /// The transmit loop hit a fatal write error.
    Send(io::Error),
    /// Half-closing the client connection failed.
    Shutdown(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::AlreadyRunning => write!(f, "server is already running"),
            ServerError::NotRunning => write!(f, "server is not running"),
            ServerError::Bind(e) => write!(f, "bind failed: {e}"),
            ServerError::Listen(e) => write!(f, "listen failed: {e}"),
            ServerError::Accept(e) => write!(f, "accept failed: {e}"),
            ServerError::Spawn(e) => write!(f, "thread spawn failed: {e}"),
            ServerError::Recv(e) => write!(f, "recv failed: {e}"),
            ServerError::Send(e) => write!(f, "send failed: {e}"),
            ServerError::Shutdown(e) => write!(f, "shutdown failed: {e}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::AlreadyRunning | ServerError::NotRunning => None,
            ServerError::Bind(e)
            | ServerError::Listen(e)
            | ServerError::Accept(e)
            | ServerError::Spawn(e)
            | ServerError::Recv(e)
            | ServerError::Send(e)
            | ServerError::Shutdown(e) => Some(e),
        }
    }
}
