//! Channel - typed command proxy for a debugging session.
//!
//! Wraps a [`SessionLike`] so callers can send serde-typed params and decode
//! typed results without touching raw JSON.

use std::sync::Arc;

use hr_protocol::Command;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::session::{EventStream, SessionLike};

/// Typed view over one session.
#[derive(Clone)]
pub struct Channel {
	session: Arc<dyn SessionLike>,
}

impl Channel {
	pub fn new(session: Arc<dyn SessionLike>) -> Self {
		Self { session }
	}

	/// Sends a method call and decodes the result.
	pub async fn send<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> Result<R> {
		let params_value = serde_json::to_value(params)?;
		let response = self.session.send_raw(method, params_value).await?;
		serde_json::from_value(response).map_err(Into::into)
	}

	/// Sends a typed protocol command.
	pub async fn execute<C: Command>(&self, command: &C) -> Result<C::Response> {
		self.send(C::METHOD, command).await
	}

	/// Subscribes to the session's events.
	pub fn events(&self) -> EventStream {
		self.session.events()
	}
}
