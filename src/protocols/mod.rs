//! Bundled protocol strategies.
//!
//! The engine itself imposes no framing; these are small, self-contained
//! strategies useful for demos, health checks, and throughput testing:
//! - `ping`: CRLF-line ping/pong
//! - `echo`: echoes every received chunk verbatim

pub mod echo;
pub mod ping;

pub use echo::Echo;
pub use ping::Ping;
