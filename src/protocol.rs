//! Protocol strategy contract.
//!
//! The server core imposes no framing on the byte stream; all application
//! behavior lives behind this trait. The engine drives it with a fixed
//! sequence per connection cycle:
//!
//! 1. `on_connect`: once, before the first read, with the transmit loop
//!    already running.
//! 2. `on_recv`: once per successful non-blocking read, with exactly the
//!    bytes read. Returns whether the accumulated input forms a complete,
//!    handle-ready unit.
//! 3. `on_handle`: only if `on_recv` returned true. Returns whether a
//!    response is ready to send.
//! 4. `on_send`: only if `on_handle` returned true. Returns the response
//!    payload, which the engine enqueues for transmission.
//! 5. `on_close`: once, after the receive loop ends and before the transmit
//!    loop is awaited, so a final response queued here still goes out.

use bytes::Bytes;

/// A stateful protocol strategy driven by the server engine.
///
/// Implementations own whatever accumulation buffers and parser state they
/// need; the engine only moves bytes.
pub trait Protocol {
    /// Called once when the client connection is established.
    fn on_connect(&mut self) {}

    /// Called with each chunk of bytes read from the socket.
    ///
    /// Returns true when the accumulated input is a complete unit ready for
    /// `on_handle`.
    fn on_recv(&mut self, data: &[u8]) -> bool;

    /// Called after `on_recv` reported a complete unit.
    ///
    /// Returns true when a response is ready for `on_send`.
    fn on_handle(&mut self) -> bool;

    /// Called after `on_handle` reported a ready response.
    ///
    /// Returns the payload to enqueue for transmission.
    fn on_send(&mut self) -> Bytes;

    /// Called once after the receive loop ends, before the transmit loop is
    /// awaited.
    fn on_close(&mut self) {}
}
