//! hrserve runtime - browser launch, DevTools connection and sessions
//!
//! This crate provides the low-level plumbing for talking to a Chromium-family
//! browser over the Chrome DevTools Protocol:
//!
//! - **Browser management**: Locating, launching and tearing down the browser
//! - **Transport**: JSON messages over the DevTools WebSocket
//! - **Connection**: Request/response correlation and event broadcast
//! - **Sessions**: Flattened per-target sessions and the [`SessionLike`] seam
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │    hr-rs    │  Dev server, dispatcher, patch executors
//! └──────┬──────┘
//!        │ talks through Channel / SessionLike
//! ┌──────▼──────┐
//! │ hr-runtime  │  This crate
//! │  ┌────────┐ │
//! │  │Session │ │  sessionId routing, event filtering
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │ Conn   │ │  id correlation
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │ Trans  │ │  WebSocket
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │Browser │ │  Process management
//! │  └────────┘ │
//! └─────────────┘
//! ```

pub mod browser;
pub mod channel;
pub mod connection;
pub mod error;
pub mod session;
pub mod transport;

pub use browser::{Browser, LaunchOptions, find_browser_executable};
pub use channel::Channel;
pub use connection::Connection;
pub use error::{Error, Result};
pub use session::{CdpSession, EventStream, SessionLike};
pub use transport::{
	BoxFuture, Transport, TransportParts, TransportReceiver, WebSocketTransport, WebSocketTransportReceiver,
	WebSocketTransportSender,
};
