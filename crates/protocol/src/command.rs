//! Typed command parameters and results.
//!
//! Every command struct implements [`Command`], tying it to its method name and
//! result type so callers can write `channel.execute(&GetDocument::default())`
//! and receive a [`GetDocumentResult`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::events::Frame;

/// A protocol command with a fixed method name and typed result.
pub trait Command: Serialize + Send + Sync {
	/// Domain-qualified method name.
	const METHOD: &'static str;
	/// Shape of the `result` object.
	type Response: DeserializeOwned;
}

/// Result of commands that return nothing of interest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

macro_rules! enable_command {
	($name:ident, $method:literal) => {
		#[doc = concat!("`", $method, "`")]
		#[derive(Debug, Clone, Default, Serialize)]
		pub struct $name {}

		impl Command for $name {
			const METHOD: &'static str = $method;
			type Response = Empty;
		}
	};
}

enable_command!(DebuggerEnable, "Debugger.enable");
enable_command!(DomEnable, "DOM.enable");
enable_command!(CssEnable, "CSS.enable");
enable_command!(PageEnable, "Page.enable");
enable_command!(RuntimeEnable, "Runtime.enable");

/// `Target.createTarget`: opens a new page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTarget {
	pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetResult {
	pub target_id: String,
}

impl Command for CreateTarget {
	const METHOD: &'static str = "Target.createTarget";
	type Response = CreateTargetResult;
}

/// `Target.attachToTarget`. With `flatten` the returned session id is used as
/// the `sessionId` of subsequent messages on the same connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTarget {
	pub target_id: String,
	pub flatten: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetResult {
	pub session_id: String,
}

impl Command for AttachToTarget {
	const METHOD: &'static str = "Target.attachToTarget";
	type Response = AttachToTargetResult;
}

/// `Page.navigate`.
#[derive(Debug, Clone, Serialize)]
pub struct Navigate {
	pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
	pub frame_id: String,
	/// Set when the navigation failed (e.g. `net::ERR_NAME_NOT_RESOLVED`)
	#[serde(default)]
	pub error_text: Option<String>,
}

impl Command for Navigate {
	const METHOD: &'static str = "Page.navigate";
	type Response = NavigateResult;
}

/// `Page.getFrameTree`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetFrameTree {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFrameTreeResult {
	pub frame_tree: FrameTree,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameTree {
	pub frame: Frame,
}

impl Command for GetFrameTree {
	const METHOD: &'static str = "Page.getFrameTree";
	type Response = GetFrameTreeResult;
}

/// `DOM.getDocument`. Invalidates every node id handed out before it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetDocument {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub depth: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetDocumentResult {
	pub root: Node,
}

/// Subset of `DOM.Node`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
	pub node_id: i64,
}

impl Command for GetDocument {
	const METHOD: &'static str = "DOM.getDocument";
	type Response = GetDocumentResult;
}

/// `DOM.setOuterHTML`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetOuterHtml {
	pub node_id: i64,
	#[serde(rename = "outerHTML")]
	pub outer_html: String,
}

impl Command for SetOuterHtml {
	const METHOD: &'static str = "DOM.setOuterHTML";
	type Response = Empty;
}

/// `CSS.setStyleSheetText`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStyleSheetText {
	pub style_sheet_id: String,
	pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetStyleSheetTextResult {
	#[serde(rename = "sourceMapURL", default)]
	pub source_map_url: Option<String>,
}

impl Command for SetStyleSheetText {
	const METHOD: &'static str = "CSS.setStyleSheetText";
	type Response = SetStyleSheetTextResult;
}

/// `Debugger.setScriptSource`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetScriptSource {
	pub script_id: String,
	pub script_source: String,
	/// Permit edits of the function currently on top of the stack.
	pub allow_top_frame_editing: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetScriptSourceResult {
	/// `Ok`, `CompileError`, `BlockedByActiveGenerator`, ... (newer browsers)
	#[serde(default)]
	pub status: Option<String>,
	/// Compile error details (older browsers and `CompileError`)
	#[serde(default)]
	pub exception_details: Option<ExceptionDetails>,
}

impl SetScriptSourceResult {
	/// Whether the runtime accepted the new source.
	pub fn is_ok(&self) -> bool {
		self.exception_details.is_none() && self.status.as_deref().is_none_or(|s| s == "Ok")
	}
}

impl Command for SetScriptSource {
	const METHOD: &'static str = "Debugger.setScriptSource";
	type Response = SetScriptSourceResult;
}

/// `Runtime.evaluate`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluate {
	pub expression: String,
	/// Execution context to evaluate in; the main world when absent
	#[serde(skip_serializing_if = "Option::is_none")]
	pub context_id: Option<i64>,
	pub return_by_value: bool,
}

impl Evaluate {
	pub fn new(expression: impl Into<String>) -> Self {
		Self {
			expression: expression.into(),
			context_id: None,
			return_by_value: true,
		}
	}

	pub fn in_context(mut self, context_id: i64) -> Self {
		self.context_id = Some(context_id);
		self
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
	pub result: RemoteObject,
	#[serde(default)]
	pub exception_details: Option<ExceptionDetails>,
}

impl Command for Evaluate {
	const METHOD: &'static str = "Runtime.evaluate";
	type Response = EvaluateResult;
}

/// Subset of `Runtime.RemoteObject`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteObject {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub value: Option<serde_json::Value>,
	#[serde(default)]
	pub description: Option<String>,
}

/// Subset of `Runtime.ExceptionDetails`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
	pub text: String,
	#[serde(default)]
	pub line_number: i64,
	#[serde(default)]
	pub column_number: i64,
}

impl std::fmt::Display for ExceptionDetails {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} ({}:{})", self.text, self.line_number + 1, self.column_number + 1)
	}
}

/// `Fetch.enable`.
#[derive(Debug, Clone, Serialize)]
pub struct FetchEnable {
	pub patterns: Vec<RequestPattern>,
}

/// Request interception pattern. `*` matches any run of characters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPattern {
	pub url_pattern: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub request_stage: Option<String>,
}

impl Command for FetchEnable {
	const METHOD: &'static str = "Fetch.enable";
	type Response = Empty;
}

/// `Fetch.fulfillRequest`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillRequest {
	pub request_id: String,
	pub response_code: u16,
	pub response_headers: Vec<HeaderEntry>,
	/// Base64-encoded response body
	#[serde(skip_serializing_if = "Option::is_none")]
	pub body: Option<String>,
}

impl FulfillRequest {
	/// Builds a response with the body base64-encoded as the protocol requires.
	pub fn new(request_id: impl Into<String>, response_code: u16, body: &[u8]) -> Self {
		Self {
			request_id: request_id.into(),
			response_code,
			response_headers: Vec::new(),
			body: (!body.is_empty()).then(|| BASE64.encode(body)),
		}
	}

	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.response_headers.push(HeaderEntry {
			name: name.into(),
			value: value.into(),
		});
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
	pub name: String,
	pub value: String,
}

impl Command for FulfillRequest {
	const METHOD: &'static str = "Fetch.fulfillRequest";
	type Response = Empty;
}

/// `Fetch.continueRequest`: let a paused request proceed untouched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequest {
	pub request_id: String,
}

impl Command for ContinueRequest {
	const METHOD: &'static str = "Fetch.continueRequest";
	type Response = Empty;
}
