//! Patch executors and the strategy selector.
//!
//! An executor turns new file content into protocol commands against the live
//! page. Expected outcomes (invalid input, nothing to patch yet, the browser
//! refusing the edit) come back inside a [`PatchReport`]; only a broken
//! connection is returned as `Err`.

mod document;
mod script;
mod stylesheet;

use std::fmt;

use async_trait::async_trait;
use hr_runtime::Channel;

use crate::content_type::ContentType;
use crate::error::{Error, Result};
use crate::registry::IdentityRegistry;

pub use document::DocumentPatcher;
pub use script::{SCRIPT_PATCH_EVENT, ScriptPatcher, notification_expression};
pub use stylesheet::{StylesheetPatcher, validate_stylesheet};

/// What an executor needs from the running session.
pub struct PatchContext<'a> {
	pub channel: &'a Channel,
	pub registry: &'a IdentityRegistry,
}

/// Applies new content for one content type.
#[async_trait]
pub trait PatchExecutor: Send + Sync {
	/// Short name for logs.
	fn name(&self) -> &'static str;

	/// Pushes `content` for `url` into the page.
	///
	/// # Errors
	///
	/// Returns [`Error::Transport`] when the session connection fails.
	async fn apply(&self, ctx: &PatchContext<'_>, url: &str, content: &str) -> Result<PatchReport>;
}

static STYLESHEET: StylesheetPatcher = StylesheetPatcher;
static SCRIPT: ScriptPatcher = ScriptPatcher;
static DOCUMENT: DocumentPatcher = DocumentPatcher;

/// Picks the executor for a MIME type, or `None` if it cannot be live-patched.
pub fn select(mime: &str) -> Option<&'static dyn PatchExecutor> {
	executor_for(ContentType::from_mime(mime))
}

pub fn executor_for(content_type: ContentType) -> Option<&'static dyn PatchExecutor> {
	match content_type {
		ContentType::Stylesheet => Some(&STYLESHEET),
		ContentType::Script => Some(&SCRIPT),
		ContentType::Document => Some(&DOCUMENT),
		ContentType::Other => None,
	}
}

/// Why a change was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
	InvalidSyntax(String),
	IdentityUnknown,
	ContentUnchanged,
	NotUtf8,
}

impl fmt::Display for SkipReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SkipReason::InvalidSyntax(detail) => write!(f, "invalid syntax: {detail}"),
			SkipReason::IdentityUnknown => f.write_str("identity unknown"),
			SkipReason::ContentUnchanged => f.write_str("content unchanged"),
			SkipReason::NotUtf8 => f.write_str("content is not valid UTF-8"),
		}
	}
}

#[derive(Debug)]
pub enum PatchResult {
	Applied,
	Skipped(SkipReason),
	Failed(Error),
}

impl PatchResult {
	pub fn is_applied(&self) -> bool {
		matches!(self, PatchResult::Applied)
	}
}

impl fmt::Display for PatchResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PatchResult::Applied => f.write_str("applied"),
			PatchResult::Skipped(reason) => write!(f, "skipped ({reason})"),
			PatchResult::Failed(err) => write!(f, "failed ({err})"),
		}
	}
}

/// Outcome of the in-page notification sent after a successful script patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
	Delivered,
	Failed(String),
}

#[derive(Debug)]
pub struct PatchReport {
	pub result: PatchResult,
	pub notification: Option<NotificationOutcome>,
}

impl PatchReport {
	pub fn applied() -> Self {
		Self {
			result: PatchResult::Applied,
			notification: None,
		}
	}

	pub fn skipped(reason: SkipReason) -> Self {
		Self {
			result: PatchResult::Skipped(reason),
			notification: None,
		}
	}

	pub fn failed(error: Error) -> Self {
		Self {
			result: PatchResult::Failed(error),
			notification: None,
		}
	}

	pub fn with_notification(mut self, outcome: NotificationOutcome) -> Self {
		self.notification = Some(outcome);
		self
	}
}

/// Splits a command failure: connection loss propagates, anything else is a failed patch.
pub(crate) fn command_failed(err: hr_runtime::Error) -> Result<PatchReport> {
	match Error::from(err) {
		err if err.is_transport() => Err(err),
		err => Ok(PatchReport::failed(err)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_selector_table() {
		assert_eq!(select("text/css").map(|e| e.name()), Some("stylesheet"));
		assert_eq!(select("application/javascript").map(|e| e.name()), Some("script"));
		assert_eq!(select("text/html").map(|e| e.name()), Some("document"));
		assert!(select("image/png").is_none());
		assert!(select("application/json").is_none());
		assert!(select("font/woff2").is_none());
	}

	#[test]
	fn test_selector_ignores_parameters() {
		assert_eq!(select("text/css; charset=utf-8").map(|e| e.name()), Some("stylesheet"));
		assert_eq!(select("TEXT/HTML").map(|e| e.name()), Some("document"));
	}

	#[test]
	fn test_command_failed_split() {
		let report = command_failed(hr_runtime::Error::Remote {
			method: "DOM.setOuterHTML".into(),
			code: -32000,
			message: "Could not find node with given id".into(),
		})
		.unwrap();
		assert!(matches!(report.result, PatchResult::Failed(Error::ProtocolRejected { .. })));

		let err = command_failed(hr_runtime::Error::ChannelClosed).unwrap_err();
		assert!(err.is_transport());
	}

	#[test]
	fn test_result_display() {
		assert_eq!(PatchResult::Applied.to_string(), "applied");
		assert_eq!(
			PatchResult::Skipped(SkipReason::IdentityUnknown).to_string(),
			"skipped (identity unknown)"
		);
	}
}
