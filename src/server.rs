//! Server lifecycle controller.
//!
//! Owns the tri-state start/stop state machine, the shared outbound queue,
//! and the background orchestrator thread. Exactly one client connection is
//! served per start/stop cycle; after `stop()` completes the cycle can be
//! repeated with fresh queue and failure state.
//!
//! The original design folded lifecycle state and the loops' continuation
//! flag into one shared integer. Here they are two explicit atomics: a
//! `Status` value for `status()` and misuse checks, and a separate boolean
//! "keep running" signal read by the I/O loops.

use crate::conn;
use crate::error::ServerError;
use crate::protocol::Protocol;
use bytes::Bytes;
use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Lifecycle state of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No background work running; `send()` and `stop()` fail.
    Stopped,
    /// Briefly observed while `start()` or `stop()` is in progress.
    Transitioning,
    /// Orchestrator and I/O loops active.
    Running,
}

impl Status {
    fn from_u8(value: u8) -> Status {
        match value {
            0 => Status::Stopped,
            1 => Status::Transitioning,
            _ => Status::Running,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Status::Stopped => 0,
            Status::Transitioning => 1,
            Status::Running => 2,
        }
    }
}

/// State shared between the lifecycle controller and the background contexts.
pub(crate) struct Shared {
    status: AtomicU8,
    /// Continuation signal observed by the receive and transmit loops.
    keep_running: AtomicBool,
    /// Outbound byte buffers awaiting transmission, FIFO. A partially
    /// transmitted buffer at the head is truncated in place, never requeued.
    pub(crate) queue: Mutex<VecDeque<Bytes>>,
}

impl Shared {
    fn new() -> Self {
        Shared {
            status: AtomicU8::new(Status::Stopped.as_u8()),
            keep_running: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: Status) {
        self.status.store(status.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn keep_running(&self) -> bool {
        self.keep_running.load(Ordering::SeqCst)
    }

    pub(crate) fn enqueue(&self, data: Bytes) {
        self.queue.lock().unwrap().push_back(data);
    }

    /// Build shared state with a preset continuation signal, for loop tests.
    #[cfg(test)]
    pub(crate) fn with_signal(keep_running: bool) -> Self {
        let shared = Shared::new();
        shared.keep_running.store(keep_running, Ordering::SeqCst);
        shared
    }
}

/// A single-connection TCP server.
///
/// Construct it with a port and a protocol strategy, then drive it through
/// `start()` / `stop()` cycles. Each cycle accepts exactly one client and
/// runs it to completion; failures from the background contexts are
/// collected and returned by `stop()`.
pub struct Server {
    port: u16,
    protocol: Arc<Mutex<dyn Protocol + Send>>,
    shared: Arc<Shared>,
    orchestrator: Option<JoinHandle<Vec<ServerError>>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    /// Create a stopped server that will bind the given port on `start()`.
    ///
    /// Port 0 binds an ephemeral port; use [`Server::local_addr`] after
    /// `start()` to discover it.
    pub fn new<P>(port: u16, protocol: P) -> Self
    where
        P: Protocol + Send + 'static,
    {
        Server {
            port,
            protocol: Arc::new(Mutex::new(protocol)),
            shared: Arc::new(Shared::new()),
            orchestrator: None,
            local_addr: None,
        }
    }

    /// Current lifecycle state. Non-blocking, safe to call concurrently with
    /// any other operation.
    pub fn status(&self) -> Status {
        self.shared.status()
    }

    /// Address actually bound for the current cycle, if running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listening endpoint and launch the connection orchestrator.
    ///
    /// Fails with [`ServerError::AlreadyRunning`] unless the server is
    /// stopped, and with [`ServerError::Bind`] if any step of endpoint setup
    /// fails (the state reverts to stopped).
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.shared.status() != Status::Stopped {
            return Err(ServerError::AlreadyRunning);
        }
        self.shared.set_status(Status::Transitioning);

        // Fresh cycle: discard anything left over from a failed transmit.
        self.shared.queue.lock().unwrap().clear();
        self.shared.keep_running.store(true, Ordering::SeqCst);

        let socket = match bind_socket(self.port) {
            Ok(socket) => socket,
            Err(e) => {
                self.shared.keep_running.store(false, Ordering::SeqCst);
                self.shared.set_status(Status::Stopped);
                return Err(ServerError::Bind(e));
            }
        };
        self.local_addr = socket.local_addr().ok().and_then(|addr| addr.as_socket());

        let shared = Arc::clone(&self.shared);
        let protocol = Arc::clone(&self.protocol);
        let handle = thread::Builder::new()
            .name("server-conn".to_string())
            .spawn(move || conn::serve(socket, shared, protocol));

        match handle {
            Ok(handle) => {
                self.orchestrator = Some(handle);
                self.shared.set_status(Status::Running);
                info!(addr = ?self.local_addr, "server started");
                Ok(())
            }
            Err(e) => {
                self.local_addr = None;
                self.shared.keep_running.store(false, Ordering::SeqCst);
                self.shared.set_status(Status::Stopped);
                Err(ServerError::Spawn(e))
            }
        }
    }

    /// Signal the I/O loops to exit, join all background work, and return
    /// the failures captured during this cycle (0 to 3 entries, one per
    /// background context).
    ///
    /// Fails with [`ServerError::NotRunning`] unless the server is running.
    /// Captured failures are returned, never raised.
    pub fn stop(&mut self) -> Result<Vec<ServerError>, ServerError> {
        if self.shared.status() != Status::Running {
            return Err(ServerError::NotRunning);
        }
        self.shared.set_status(Status::Transitioning);
        self.shared.keep_running.store(false, Ordering::SeqCst);

        let failures = match self.orchestrator.take() {
            Some(handle) => match handle.join() {
                Ok(failures) => failures,
                Err(_) => {
                    warn!("orchestrator thread panicked");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        self.local_addr = None;
        self.shared.set_status(Status::Stopped);
        debug!(failures = failures.len(), "server stopped");
        Ok(failures)
    }

    /// Enqueue bytes for transmission to the connected client.
    ///
    /// Accepted while the server is running or still stopping (the transmit
    /// loop drains the queue before exiting); fails with
    /// [`ServerError::NotRunning`] once fully stopped.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<(), ServerError> {
        if self.shared.status() == Status::Stopped {
            return Err(ServerError::NotRunning);
        }
        self.shared.enqueue(data.into());
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.shared.status() == Status::Running {
            let _ = self.stop();
        }
    }
}

/// Create an IPv4 stream socket bound to the given port on all interfaces.
///
/// The socket is bound but not yet listening; the orchestrator marks it
/// passive right before accepting. Blocking mode is kept for the accept
/// call; only the accepted client is switched to non-blocking.
fn bind_socket(port: u16) -> io::Result<socket2::Socket> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    /// Line-based strategy used by the lifecycle tests: replies to
    /// `PING\r\n` with `PONG\r\n`.
    struct PingPong {
        buf: Vec<u8>,
        response: Option<Bytes>,
    }

    impl PingPong {
        fn new() -> Self {
            PingPong {
                buf: Vec::new(),
                response: None,
            }
        }
    }

    impl Protocol for PingPong {
        fn on_recv(&mut self, data: &[u8]) -> bool {
            self.buf.extend_from_slice(data);
            self.buf.windows(2).any(|w| w == b"\r\n")
        }

        fn on_handle(&mut self) -> bool {
            if self.buf.starts_with(b"PING\r\n") {
                self.buf.drain(..6);
                self.response = Some(Bytes::from_static(b"PONG\r\n"));
                true
            } else {
                self.buf.clear();
                false
            }
        }

        fn on_send(&mut self) -> Bytes {
            self.response.take().unwrap_or_default()
        }
    }

    fn connect(server: &Server) -> TcpStream {
        let addr = server.local_addr().expect("server not bound");
        let stream = TcpStream::connect(addr).expect("connect failed");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    fn read_exact_bytes(stream: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        stream.read_exact(&mut out).expect("read failed");
        out
    }

    #[test]
    fn test_ping_pong_roundtrip() {
        let mut server = Server::new(0, PingPong::new());
        server.start().unwrap();

        let mut client = connect(&server);
        client.write_all(b"PING\r\n").unwrap();
        assert_eq!(read_exact_bytes(&mut client, 6), b"PONG\r\n");

        drop(client);
        let failures = server.stop().unwrap();
        assert!(failures.is_empty(), "unexpected failures: {failures:?}");
        assert_eq!(server.status(), Status::Stopped);
    }

    #[test]
    fn test_start_twice_fails() {
        let mut server = Server::new(0, PingPong::new());
        server.start().unwrap();
        assert_eq!(server.status(), Status::Running);

        match server.start() {
            Err(ServerError::AlreadyRunning) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(server.status(), Status::Running);

        // Unblock the pending accept so stop() can join the orchestrator.
        let client = connect(&server);
        drop(client);
        server.stop().unwrap();
    }

    #[test]
    fn test_stop_when_stopped_fails() {
        let mut server = Server::new(0, PingPong::new());
        match server.stop() {
            Err(ServerError::NotRunning) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(server.status(), Status::Stopped);
    }

    #[test]
    fn test_send_when_stopped_fails() {
        let server = Server::new(0, PingPong::new());
        match server.send(&b"data"[..]) {
            Err(ServerError::NotRunning) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_bind_error_reverts_state() {
        // Occupy a port, then ask the server to bind it.
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut server = Server::new(port, PingPong::new());
        match server.start() {
            Err(ServerError::Bind(_)) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(server.status(), Status::Stopped);
        assert!(server.local_addr().is_none());
    }

    #[test]
    fn test_repeatable_cycles() {
        let mut server = Server::new(0, PingPong::new());

        for _ in 0..2 {
            server.start().unwrap();
            let mut client = connect(&server);
            client.write_all(b"PING\r\n").unwrap();
            assert_eq!(read_exact_bytes(&mut client, 6), b"PONG\r\n");
            drop(client);

            let failures = server.stop().unwrap();
            assert!(failures.is_empty(), "unexpected failures: {failures:?}");
            assert_eq!(server.status(), Status::Stopped);
        }
    }

    #[test]
    fn test_abortive_close_captures_recv_error() {
        let mut server = Server::new(0, PingPong::new());
        server.start().unwrap();

        let client = connect(&server);
        // Let the orchestrator accept before aborting the connection.
        std::thread::sleep(Duration::from_millis(100));
        // Linger 0 turns the close into an RST, which the receive loop sees
        // as a fatal read error rather than a clean zero-byte read.
        socket2::SockRef::from(&client)
            .set_linger(Some(Duration::from_secs(0)))
            .unwrap();
        drop(client);

        // Give the receive loop a poll interval to observe the reset.
        std::thread::sleep(Duration::from_millis(500));
        let failures = server.stop().unwrap();
        assert!(
            failures
                .iter()
                .any(|f| matches!(f, ServerError::Recv(_))),
            "expected a captured recv failure, got: {failures:?}"
        );
    }

    #[test]
    fn test_peer_close_drains_queued_data() {
        let mut server = Server::new(0, PingPong::new());
        server.start().unwrap();

        let mut client = connect(&server);
        server.send(&b"farewell"[..]).unwrap();
        assert_eq!(read_exact_bytes(&mut client, 8), b"farewell");

        drop(client);
        let failures = server.stop().unwrap();
        assert!(failures.is_empty(), "unexpected failures: {failures:?}");
    }
}
