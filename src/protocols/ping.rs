//! Ping protocol strategy.
//!
//! A minimal line protocol for health checks and latency measurement:
//! - Client sends: `PING\r\n` or `PING <message>\r\n`
//! - Server responds: `PONG\r\n` or `PONG <message>\r\n`
//! - Any other line gets `ERROR unknown command\r\n`
//!
//! Lines are terminated by `\r\n`. Input may arrive in arbitrary chunks;
//! the strategy accumulates until at least one full line is buffered.

use crate::protocol::Protocol;
use bytes::Bytes;

/// CRLF-line ping/pong strategy.
#[derive(Debug, Default)]
pub struct Ping {
    buf: Vec<u8>,
    response: Vec<u8>,
}

impl Ping {
    pub fn new() -> Self {
        Ping::default()
    }

    /// Pop the first complete line (without its CRLF) off the buffer.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = find_crlf(&self.buf)?;
        let line = self.buf[..pos].to_vec();
        self.buf.drain(..pos + 2);
        Some(line)
    }
}

impl Protocol for Ping {
    fn on_recv(&mut self, data: &[u8]) -> bool {
        self.buf.extend_from_slice(data);
        find_crlf(&self.buf).is_some()
    }

    fn on_handle(&mut self) -> bool {
        // Answer every complete line buffered so far in one response.
        while let Some(line) = self.take_line() {
            if line.eq_ignore_ascii_case(b"PING") {
                self.response.extend_from_slice(b"PONG\r\n");
            } else if line.len() > 5 && line[..5].eq_ignore_ascii_case(b"PING ") {
                self.response.extend_from_slice(b"PONG ");
                self.response.extend_from_slice(&line[5..]);
                self.response.extend_from_slice(b"\r\n");
            } else {
                self.response.extend_from_slice(b"ERROR unknown command\r\n");
            }
        }
        !self.response.is_empty()
    }

    fn on_send(&mut self) -> Bytes {
        Bytes::from(std::mem::take(&mut self.response))
    }
}

/// Find \r\n in the buffer, returning the position of \r.
fn find_crlf(buffer: &[u8]) -> Option<usize> {
    (0..buffer.len().saturating_sub(1)).find(|&i| buffer[i] == b'\r' && buffer[i + 1] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_pong() {
        let mut ping = Ping::new();
        assert!(ping.on_recv(b"PING\r\n"));
        assert!(ping.on_handle());
        assert_eq!(&ping.on_send()[..], b"PONG\r\n");
    }

    #[test]
    fn test_ping_case_insensitive() {
        let mut ping = Ping::new();
        assert!(ping.on_recv(b"ping\r\n"));
        assert!(ping.on_handle());
        assert_eq!(&ping.on_send()[..], b"PONG\r\n");
    }

    #[test]
    fn test_ping_with_message() {
        let mut ping = Ping::new();
        assert!(ping.on_recv(b"PING hello\r\n"));
        assert!(ping.on_handle());
        assert_eq!(&ping.on_send()[..], b"PONG hello\r\n");
    }

    #[test]
    fn test_partial_line_is_incomplete() {
        let mut ping = Ping::new();
        assert!(!ping.on_recv(b"PIN"));
        assert!(!ping.on_recv(b"G"));
        assert!(ping.on_recv(b"\r\n"));
        assert!(ping.on_handle());
        assert_eq!(&ping.on_send()[..], b"PONG\r\n");
    }

    #[test]
    fn test_unknown_command() {
        let mut ping = Ping::new();
        assert!(ping.on_recv(b"FOO\r\n"));
        assert!(ping.on_handle());
        assert_eq!(&ping.on_send()[..], b"ERROR unknown command\r\n");
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut ping = Ping::new();
        assert!(ping.on_recv(b"PING\r\nPING x\r\n"));
        assert!(ping.on_handle());
        assert_eq!(&ping.on_send()[..], b"PONG\r\nPONG x\r\n");
    }
}
