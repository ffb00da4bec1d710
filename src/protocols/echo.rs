//! Echo protocol strategy.
//!
//! Echoes every received chunk back verbatim. No framing, no storage
//! interaction; useful for I/O throughput testing.

use crate::protocol::Protocol;
use bytes::Bytes;

/// Chunk echo strategy: every read is a complete unit and its own response.
#[derive(Debug, Default)]
pub struct Echo {
    pending: Vec<u8>,
}

impl Echo {
    pub fn new() -> Self {
        Echo::default()
    }
}

impl Protocol for Echo {
    fn on_recv(&mut self, data: &[u8]) -> bool {
        self.pending.extend_from_slice(data);
        true
    }

    fn on_handle(&mut self) -> bool {
        !self.pending.is_empty()
    }

    fn on_send(&mut self) -> Bytes {
        Bytes::from(std::mem::take(&mut self.pending))
    }
}
