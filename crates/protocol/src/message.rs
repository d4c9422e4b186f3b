//! Message envelopes exchanged with the browser.
//!
//! CDP messages are JSON objects. Requests carry an `id`, a `method` and
//! `params`; responses echo the `id` with either `result` or `error`; events
//! carry a `method` and `params` but no `id`. With flattened target sessions
//! every message may also carry a `sessionId`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command sent to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
	/// Unique request ID for correlating responses
	pub id: u64,
	/// Domain-qualified method name, e.g. `CSS.setStyleSheetText`
	pub method: String,
	/// Method parameters as JSON object
	pub params: Value,
	/// Target session the command is routed to (`None` for the browser target)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
	/// Request ID this response correlates to
	pub id: u64,
	/// Success result (mutually exclusive with error)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Error result (mutually exclusive with result)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Protocol error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	/// JSON-RPC error code (e.g. `-32000` for generic server errors)
	pub code: i64,
	/// Human-readable error message
	pub message: String,
	/// Extra detail some domains attach
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
}

/// Notification pushed by the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
	/// Domain-qualified event name, e.g. `Debugger.scriptParsed`
	pub method: String,
	/// Event parameters as JSON object
	#[serde(default)]
	pub params: Value,
	/// Session that emitted the event (`None` for browser-level events)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

impl Event {
	/// Deserializes the params into a typed payload if `method` matches.
	pub fn parse<E: crate::events::EventPayload>(&self) -> Option<serde_json::Result<E>> {
		(self.method == E::METHOD).then(|| serde_json::from_value(self.params.clone()))
	}
}

/// Discriminated union of inbound messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Response message (has `id` field)
	Response(Response),
	/// Event message (has `method`, no `id`)
	Event(Event),
	/// Unknown message type (forward-compatible catch-all)
	Unknown(Value),
}
