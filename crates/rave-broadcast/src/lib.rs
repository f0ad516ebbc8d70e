//! Rave Broadcast - beat fan-out to light fixtures
//!
//! Fixtures connect over TCP and receive one JSON line per beat. The server
//! never waits on a fixture for longer than the configured send timeout, and
//! a fixture that fails or stalls is simply dropped; the others keep
//! receiving.
//!
//! # Architecture
//!
//! - **Registry**: [`ClientRegistry`], the set of live connections
//! - **Server**: [`BroadcastServer`], accept loop, read loops, tick fan-out
//! - **Wire**: newline-delimited JSON framing

pub mod error;
pub mod registry;
pub mod server;
pub mod wire;

pub use error::{Error, Result};
pub use registry::{BoxedWriter, BroadcastReport, ClientConnection, ClientId, ClientRegistry};
pub use server::{
    BroadcastServer, ServeReport, ServerConfig, DEFAULT_MAX_LINE_LEN, DEFAULT_PORT,
    DEFAULT_SEND_TIMEOUT,
};
pub use wire::{decode_line, encode_line, InboundLine};
