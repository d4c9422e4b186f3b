//! Typed payloads for the events the dev server consumes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Event payload bound to its protocol method name.
pub trait EventPayload: DeserializeOwned {
	/// Domain-qualified event name.
	const METHOD: &'static str;
}

/// `Debugger.scriptParsed`: the VM parsed a script.
///
/// Also fired for every already-loaded script when the debugger is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsed {
	pub script_id: String,
	/// Script URL, empty for `eval` and other anonymous scripts
	pub url: String,
	pub execution_context_id: i64,
}

impl EventPayload for ScriptParsed {
	const METHOD: &'static str = "Debugger.scriptParsed";
}

/// `CSS.styleSheetAdded`: a style sheet became available to the CSS agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleSheetAdded {
	pub header: StyleSheetHeader,
}

impl EventPayload for StyleSheetAdded {
	const METHOD: &'static str = "CSS.styleSheetAdded";
}

/// Subset of `CSS.CSSStyleSheetHeader`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSheetHeader {
	pub style_sheet_id: String,
	/// Owner URL; empty for constructed and inline sheets without a URL
	#[serde(rename = "sourceURL", default)]
	pub source_url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frame_id: Option<String>,
}

/// `Fetch.requestPaused`: a request matching a `Fetch.enable` pattern is held
/// until it is fulfilled, continued or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPaused {
	pub request_id: String,
	pub request: PausedRequest,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resource_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frame_id: Option<String>,
}

impl EventPayload for RequestPaused {
	const METHOD: &'static str = "Fetch.requestPaused";
}

/// Subset of `Network.Request`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedRequest {
	/// Request URL without the fragment
	pub url: String,
	pub method: String,
}

/// `Page.frameStartedLoading`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStartedLoading {
	pub frame_id: String,
}

impl EventPayload for FrameStartedLoading {
	const METHOD: &'static str = "Page.frameStartedLoading";
}

/// `Page.frameNavigated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameNavigated {
	pub frame: Frame,
}

impl EventPayload for FrameNavigated {
	const METHOD: &'static str = "Page.frameNavigated";
}

/// Subset of `Page.Frame`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
	pub id: String,
	/// Absent for the main frame
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent_id: Option<String>,
	#[serde(default)]
	pub url: String,
}

/// `Page.loadEventFired`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadEventFired {
	pub timestamp: f64,
}

impl EventPayload for LoadEventFired {
	const METHOD: &'static str = "Page.loadEventFired";
}

/// `Inspector.detached`: the session is about to be torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectorDetached {
	pub reason: String,
}

impl EventPayload for InspectorDetached {
	const METHOD: &'static str = "Inspector.detached";
}

/// Method name of `Inspector.targetCrashed` (the event has no params).
pub const TARGET_CRASHED: &str = "Inspector.targetCrashed";

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stylesheet_header_uses_source_url_casing() {
		let added: StyleSheetAdded = serde_json::from_value(serde_json::json!({
			"header": {
				"styleSheetId": "style-sheet-1-3",
				"frameId": "F1",
				"sourceURL": "http://localhost:8080/app.css",
				"origin": "regular",
				"title": "",
				"disabled": false
			}
		}))
		.unwrap();
		assert_eq!(added.header.style_sheet_id, "style-sheet-1-3");
		assert_eq!(added.header.source_url, "http://localhost:8080/app.css");
		assert_eq!(added.header.frame_id.as_deref(), Some("F1"));
	}

	#[test]
	fn constructed_sheet_has_empty_source_url() {
		let added: StyleSheetAdded = serde_json::from_value(serde_json::json!({
			"header": { "styleSheetId": "9" }
		}))
		.unwrap();
		assert!(added.header.source_url.is_empty());
	}

	#[test]
	fn request_paused_ignores_unmodeled_fields() {
		let paused: RequestPaused = serde_json::from_value(serde_json::json!({
			"requestId": "interception-job-1.0",
			"request": {
				"url": "http://localhost:8080/index.html",
				"method": "GET",
				"headers": {},
				"initialPriority": "VeryHigh",
				"referrerPolicy": "strict-origin-when-cross-origin"
			},
			"frameId": "F1",
			"resourceType": "Document"
		}))
		.unwrap();
		assert_eq!(paused.request_id, "interception-job-1.0");
		assert_eq!(paused.request.method, "GET");
		assert_eq!(paused.resource_type.as_deref(), Some("Document"));
	}

	#[test]
	fn main_frame_has_no_parent() {
		let navigated: FrameNavigated = serde_json::from_value(serde_json::json!({
			"frame": { "id": "F1", "loaderId": "L", "url": "http://localhost:8080/", "securityOrigin": "", "mimeType": "text/html" },
			"type": "Navigation"
		}))
		.unwrap();
		assert!(navigated.frame.parent_id.is_none());
	}
}
