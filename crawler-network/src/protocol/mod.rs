//! The Bitcoin wire protocol: envelope framing and message payloads.

pub mod envelope;
pub mod message;

pub use envelope::{EnvelopeError, RawEnvelope};
pub use message::{AddrEntry, AddrV2Entry, Message, ProtocolError, VersionMessage};
