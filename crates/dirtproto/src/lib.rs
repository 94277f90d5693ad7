//! dirtproto - Protocol types for the DirtSim WebSocket services
//!
//! This crate defines every message exchanged between the DirtSim
//! processes (server, UI, audio, OS manager) plus the transport plumbing:
//! the length-delimited binary envelope, the structural wire codec, the
//! JSON bridge, and the WebSocket service façade with correlation-id
//! request/response.
//!
//! Service binaries depend on this crate with the default `net` feature;
//! pure consumers of the message types can disable it.

pub mod api;
pub mod envelope;
pub mod error;
pub mod render;
pub mod scenario;
pub mod wire;
pub mod world;

#[cfg(feature = "net")]
pub mod service;

pub use api::{ApiCommand, ApiEvent};
pub use envelope::{Envelope, MessageKind, PUSH_CORRELATION_ID};
pub use error::{ApiError, TransportError};
pub use wire::{Wire, WireError};

#[cfg(feature = "net")]
pub use service::{ConnectionId, Protocol, Reply, RequestContext, WebSocketService};

/// Default ports per service.
pub mod ports {
    pub const SERVER: u16 = 8080;
    pub const UI: u16 = 7070;
    pub const AUDIO: u16 = 6060;
}
