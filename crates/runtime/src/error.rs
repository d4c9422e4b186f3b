//! Error types for the DevTools runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while launching, connecting to, or talking with the browser.
#[derive(Debug, Error)]
pub enum Error {
	/// No Chromium-family executable could be located.
	#[error("Browser executable not found. Install Chrome/Chromium or pass --chrome <path>")]
	BrowserNotFound,

	/// Failed to launch the browser process.
	#[error("Failed to launch browser: {0}")]
	LaunchFailed(String),

	/// Failed to establish the DevTools WebSocket connection.
	#[error("Failed to connect to DevTools endpoint: {0}")]
	ConnectionFailed(String),

	/// Transport-level error (WebSocket I/O or framing).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Malformed or unexpected protocol traffic.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// The browser answered a command with an error response.
	#[error("{method} failed ({code}): {message}")]
	Remote {
		/// Method of the rejected command
		method: String,
		/// JSON-RPC error code
		code: i64,
		/// Human-readable error message
		message: String,
	},

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// Timeout waiting for operation.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The connection to the browser is gone.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// An event subscriber fell behind and events were discarded.
	#[error("Event subscriber lagged; {0} events dropped")]
	EventsLagged(u64),
}

impl Error {
	/// Returns true if the session can no longer be used after this error.
	///
	/// Remote rejections and decode failures concern a single command; everything
	/// touching the socket means the session is lost. So does a lost event: a
	/// dropped `Fetch.requestPaused` leaves its request hanging for good.
	pub fn is_transport(&self) -> bool {
		matches!(
			self,
			Error::ChannelClosed
				| Error::TransportError(_)
				| Error::ConnectionFailed(_)
				| Error::Io(_)
				| Error::EventsLagged(_)
		)
	}

	/// Returns true if the browser rejected the command.
	pub fn is_remote(&self) -> bool {
		matches!(self, Error::Remote { .. })
	}
}
