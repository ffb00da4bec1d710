//! Connection orchestration and the duplex I/O loops.
//!
//! One orchestration run per `start()` cycle: mark the listening socket
//! passive, accept exactly one client (the one deliberately blocking call),
//! close the listener, switch the client to non-blocking mode, then run the
//! receive and transmit loops on their own threads around the protocol
//! callbacks.
//!
//! Callback ordering per cycle:
//! - `on_connect` runs on the orchestrator thread, before the receive loop
//!   starts and with the transmit loop already running.
//! - `on_close` runs after the receive loop ends (peer closed or the
//!   continuation signal dropped), before the transmit loop is joined. A
//!   final response queued in `on_close` is therefore still drained.
//!
//! Both loops poll cooperatively: a would-block result sleeps a fixed
//! interval and retries. Serving a single connection per cycle keeps this
//! simple model adequate; no readiness notification is needed.

use crate::error::ServerError;
use crate::protocol::Protocol;
use crate::server::Shared;
use bytes::Buf;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Sleep between retries when a non-blocking call would block or the
/// outbound queue is empty.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Receive buffer size. Reads are delivered to the protocol in chunks of at
/// most this size.
const RECV_BUFFER_SIZE: usize = 1024;

/// Serve one connection cycle on the orchestrator thread.
///
/// Returns the failures captured by the orchestrator itself and the two I/O
/// loops, in that order. Failures end their own context; sibling contexts
/// still run their normal sequence.
pub(crate) fn serve(
    socket: socket2::Socket,
    shared: Arc<Shared>,
    protocol: Arc<Mutex<dyn Protocol + Send>>,
) -> Vec<ServerError> {
    let mut failures = Vec::new();

    let stream = match accept_client(socket) {
        Ok(stream) => Arc::new(stream),
        Err(e) => {
            failures.push(e);
            return failures;
        }
    };

    let t_send = {
        let stream = Arc::clone(&stream);
        let shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("server-send".to_string())
            .spawn(move || send_loop(&mut &*stream, &shared))
    };
    let t_send = match t_send {
        Ok(handle) => handle,
        Err(e) => {
            failures.push(ServerError::Spawn(e));
            return failures;
        }
    };

    protocol.lock().unwrap().on_connect();

    let t_recv = {
        let stream = Arc::clone(&stream);
        let shared = Arc::clone(&shared);
        let protocol = Arc::clone(&protocol);
        thread::Builder::new()
            .name("server-recv".to_string())
            .spawn(move || recv_loop(&mut &*stream, &shared, &protocol))
    };
    match t_recv {
        Ok(handle) => match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => failures.push(e),
            Err(_) => warn!("receive thread panicked"),
        },
        Err(e) => failures.push(ServerError::Spawn(e)),
    }

    protocol.lock().unwrap().on_close();

    // The transmit loop drains already-queued data before honoring the
    // continuation signal, so this join completes once the queue is empty
    // and the signal has dropped.
    match t_send.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => failures.push(e),
        Err(_) => warn!("transmit thread panicked"),
    }

    if let Err(e) = stream.shutdown(Shutdown::Write) {
        failures.push(ServerError::Shutdown(e));
    }
    debug!(failures = failures.len(), "connection cycle finished");
    failures
}

/// Mark the bound socket passive, accept one client, and close the listener.
///
/// No further clients are accepted in this cycle. The accepted stream is
/// switched to non-blocking mode for the I/O loops.
fn accept_client(socket: socket2::Socket) -> Result<TcpStream, ServerError> {
    socket.listen(libc::SOMAXCONN).map_err(ServerError::Listen)?;
    let (client, peer) = socket.accept().map_err(ServerError::Accept)?;
    drop(socket);

    client.set_nonblocking(true).map_err(ServerError::Accept)?;
    debug!(peer = ?peer.as_socket(), "accepted client");
    Ok(client.into())
}

/// Receive loop: read chunks while the continuation signal holds and feed
/// them to the protocol.
///
/// A zero-byte read means the peer closed its write side and ends the loop
/// normally. Would-block sleeps one poll interval and retries. When the
/// protocol reports a complete unit with a ready response, the response is
/// enqueued for the transmit loop.
fn recv_loop<R: Read>(
    stream: &mut R,
    shared: &Shared,
    protocol: &Mutex<dyn Protocol + Send>,
) -> Result<(), ServerError> {
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    while shared.keep_running() {
        match stream.read(&mut buf) {
            Ok(0) => {
                trace!("peer closed read side");
                break;
            }
            Ok(n) => {
                let mut protocol = protocol.lock().unwrap();
                if protocol.on_recv(&buf[..n]) && protocol.on_handle() {
                    let response = protocol.on_send();
                    trace!(len = response.len(), "response enqueued");
                    shared.enqueue(response);
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(ServerError::Recv(e)),
        }
    }
    Ok(())
}

/// Transmit loop: drain the outbound queue to the socket.
///
/// Normal exit only once the continuation signal has dropped and the queue
/// is empty, so data queued during shutdown is still sent. A short write
/// truncates the head buffer in place and retries immediately; would-block
/// and an empty-but-live queue sleep one poll interval. The queue lock is
/// never held across a sleep.
fn send_loop<W: Write>(stream: &mut W, shared: &Shared) -> Result<(), ServerError> {
    loop {
        let mut queue = shared.queue.lock().unwrap();
        let head = match queue.front_mut() {
            Some(head) => head,
            None => {
                if !shared.keep_running() {
                    return Ok(());
                }
                drop(queue);
                thread::sleep(POLL_INTERVAL);
                continue;
            }
        };

        let head_len = head.len();
        match stream.write(&head[..]) {
            Ok(0) if head_len > 0 => {
                return Err(ServerError::Send(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write returned 0",
                )));
            }
            Ok(n) if n == head_len => {
                queue.pop_front();
            }
            Ok(n) => {
                // Short write: keep the unwritten remainder at the head and
                // retry without sleeping.
                head.advance(n);
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                drop(queue);
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(ServerError::Send(e)),
        }
    }
}
