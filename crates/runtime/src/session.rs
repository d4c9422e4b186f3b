//! Target sessions multiplexed over one browser connection.
//!
//! With flattened attachment every page gets a `sessionId`; commands carry it
//! so the browser routes them to the page, and events arriving with it belong
//! to that page. [`SessionLike`] is the seam the dev server talks through, so
//! tests can substitute a scripted session.

use std::sync::Arc;

use hr_protocol::{Command, Event};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::transport::BoxFuture;

/// A single debugging session: a request/response call plus an event stream.
pub trait SessionLike: Send + Sync {
	/// Sends a raw command and returns the raw `result` object.
	fn send_raw<'a>(&'a self, method: &'a str, params: Value) -> BoxFuture<'a, Result<Value>>;

	/// Subscribes to the events of this session.
	fn events(&self) -> EventStream;
}

/// Events for one session, in arrival order.
pub struct EventStream {
	rx: broadcast::Receiver<Event>,
	session_id: Option<Arc<str>>,
}

impl EventStream {
	/// Wraps a broadcast receiver; with a session id, other sessions' events are skipped.
	pub fn new(rx: broadcast::Receiver<Event>, session_id: Option<Arc<str>>) -> Self {
		Self { rx, session_id }
	}

	/// Next event for this session.
	///
	/// Fails with [`Error::ChannelClosed`] once the connection is gone and with
	/// [`Error::EventsLagged`] if events were lost; both end the session.
	pub async fn recv(&mut self) -> Result<Event> {
		loop {
			match self.rx.recv().await {
				Ok(event) => {
					if self.accepts(&event) {
						return Ok(event);
					}
				}
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					tracing::error!(target = "hr", skipped, "Event subscriber lagged; events dropped");
					return Err(Error::EventsLagged(skipped));
				}
				Err(broadcast::error::RecvError::Closed) => return Err(Error::ChannelClosed),
			}
		}
	}

	fn accepts(&self, event: &Event) -> bool {
		match &self.session_id {
			Some(id) => event.session_id.as_deref() == Some(id.as_ref()),
			None => true,
		}
	}
}

/// Session backed by a live [`Connection`].
#[derive(Clone)]
pub struct CdpSession {
	connection: Arc<Connection>,
	session_id: Option<Arc<str>>,
}

impl CdpSession {
	/// Session addressing the browser target itself.
	pub fn browser(connection: Arc<Connection>) -> Self {
		Self {
			connection,
			session_id: None,
		}
	}

	/// Session addressing an attached target.
	pub fn new(connection: Arc<Connection>, session_id: impl Into<Arc<str>>) -> Self {
		Self {
			connection,
			session_id: Some(session_id.into()),
		}
	}

	pub fn session_id(&self) -> Option<&str> {
		self.session_id.as_deref()
	}

	/// Sends a typed command.
	pub async fn execute<C: Command>(&self, command: &C) -> Result<C::Response> {
		let params = serde_json::to_value(command)?;
		let result = self
			.connection
			.send_message(self.session_id.as_deref(), C::METHOD, params)
			.await?;
		Ok(serde_json::from_value(result)?)
	}
}

impl SessionLike for CdpSession {
	fn send_raw<'a>(&'a self, method: &'a str, params: Value) -> BoxFuture<'a, Result<Value>> {
		Box::pin(
			self.connection
				.send_message(self.session_id.as_deref(), method, params),
		)
	}

	fn events(&self) -> EventStream {
		EventStream::new(self.connection.subscribe(), self.session_id.clone())
	}
}
