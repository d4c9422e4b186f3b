//! Wire types for the Chrome DevTools Protocol as used by hrserve.
//!
//! This crate contains the serde-serializable shapes that travel over the
//! debugging WebSocket: the JSON-RPC style envelopes ([`Request`],
//! [`Response`], [`Event`]), typed command parameters and results, and typed
//! event payloads.
//!
//! Types in this crate are:
//! - **Pure data**: no behavior beyond serialization/deserialization
//! - **1:1 with the protocol**: field names follow the CDP schema
//! - **Partial**: only the commands and events the dev server issues or
//!   consumes are modeled
//!
//! Correlation, transport and session handling live in `hr-runtime`.

pub mod command;
pub mod events;
pub mod message;

pub use command::*;
pub use events::*;
pub use message::*;
