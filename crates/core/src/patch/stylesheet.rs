use async_trait::async_trait;
use hr_protocol::SetStyleSheetText;
use lightningcss::stylesheet::{ParserOptions, StyleSheet};
use tracing::debug;

use super::{PatchContext, PatchExecutor, PatchReport, SkipReason, command_failed};
use crate::error::Result;

/// Replaces a stylesheet's text via `CSS.setStyleSheetText`.
pub struct StylesheetPatcher;

#[async_trait]
impl PatchExecutor for StylesheetPatcher {
	fn name(&self) -> &'static str {
		"stylesheet"
	}

	async fn apply(&self, ctx: &PatchContext<'_>, url: &str, content: &str) -> Result<PatchReport> {
		// Half-typed rules would blank the page's styling; keep the old sheet.
		if let Err(detail) = validate_stylesheet(content) {
			debug!(target = "hr", url, %detail, "Stylesheet failed validation");
			return Ok(PatchReport::skipped(SkipReason::InvalidSyntax(detail)));
		}

		let Ok(identity) = ctx.registry.lookup_stylesheet(url) else {
			return Ok(PatchReport::skipped(SkipReason::IdentityUnknown));
		};

		let command = SetStyleSheetText {
			style_sheet_id: identity.style_sheet_id,
			text: content.to_string(),
		};
		match ctx.channel.execute(&command).await {
			Ok(_) => Ok(PatchReport::applied()),
			Err(e) => command_failed(e),
		}
	}
}

/// Checks that `css` is a complete stylesheet.
///
/// The CSS parser recovers from unterminated blocks at end of input, so block,
/// string and comment termination is checked first.
pub fn validate_stylesheet(css: &str) -> std::result::Result<(), String> {
	check_balance(css)?;
	StyleSheet::parse(css, ParserOptions::default())
		.map(|_| ())
		.map_err(|e| e.to_string())
}

fn check_balance(css: &str) -> std::result::Result<(), String> {
	let mut open: Vec<(char, usize)> = Vec::new();
	let mut line = 1;
	let mut chars = css.chars().peekable();

	while let Some(c) = chars.next() {
		match c {
			'\n' => line += 1,
			'\\' => {
				if chars.next() == Some('\n') {
					line += 1;
				}
			}
			'/' if chars.peek() == Some(&'*') => {
				chars.next();
				let start = line;
				let mut closed = false;
				while let Some(c) = chars.next() {
					match c {
						'\n' => line += 1,
						'*' if chars.peek() == Some(&'/') => {
							chars.next();
							closed = true;
							break;
						}
						_ => {}
					}
				}
				if !closed {
					return Err(format!("unterminated comment starting on line {start}"));
				}
			}
			'"' | '\'' => {
				let quote = c;
				let start = line;
				let mut closed = false;
				while let Some(c) = chars.next() {
					match c {
						'\\' => {
							if chars.next() == Some('\n') {
								line += 1;
							}
						}
						'\n' => break,
						c if c == quote => {
							closed = true;
							break;
						}
						_ => {}
					}
				}
				if !closed {
					return Err(format!("unterminated string on line {start}"));
				}
			}
			'{' | '(' | '[' => open.push((c, line)),
			'}' | ')' | ']' => {
				let expected = match c {
					'}' => '{',
					')' => '(',
					_ => '[',
				};
				match open.pop() {
					Some((opener, _)) if opener == expected => {}
					Some((opener, opened)) => {
						return Err(format!("'{c}' on line {line} does not close '{opener}' from line {opened}"));
					}
					None => return Err(format!("unexpected '{c}' on line {line}")),
				}
			}
			_ => {}
		}
	}

	match open.pop() {
		Some((opener, opened)) => Err(format!("'{opener}' opened on line {opened} is never closed")),
		None => Ok(()),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::error::Error;
	use crate::patch::PatchResult;
	use crate::registry::{IdentityRegistry, RuntimeIdentity, StylesheetIdentity};
	use crate::testing::FakeSession;

	const URL: &str = "http://localhost:8080/app.css";

	fn registry_with_sheet() -> IdentityRegistry {
		let registry = IdentityRegistry::new();
		registry.record(
			URL,
			RuntimeIdentity::Stylesheet(StylesheetIdentity {
				style_sheet_id: "S1".into(),
			}),
		);
		registry
	}

	#[test]
	fn test_validate_accepts_complete_sheets() {
		assert!(validate_stylesheet("body { color: red; }").is_ok());
		assert!(validate_stylesheet("").is_ok());
		assert!(validate_stylesheet("/* } */ a::after { content: \"{\"; }").is_ok());
		assert!(validate_stylesheet("@media (min-width: 600px) { .a { margin: calc(1px + (2px)); } }").is_ok());
		assert!(validate_stylesheet(".a[data-x=\"]\"] { background: url(img.png); }").is_ok());
	}

	#[test]
	fn test_validate_rejects_unbalanced_input() {
		let err = validate_stylesheet("body { color: red;").unwrap_err();
		assert!(err.contains("never closed"), "{err}");
		assert!(validate_stylesheet("body { color: red; }}").is_err());
		assert!(validate_stylesheet("a { width: calc(1px + 2px; }").is_err());
		assert!(validate_stylesheet("a { content: \"open; }").is_err());
		assert!(validate_stylesheet("a { color: red; } /* dangling").is_err());
	}

	#[tokio::test]
	async fn test_valid_css_sends_one_command() {
		let session = FakeSession::new();
		let channel = session.channel();
		let registry = registry_with_sheet();
		let ctx = PatchContext {
			channel: &channel,
			registry: &registry,
		};

		let report = StylesheetPatcher
			.apply(&ctx, URL, "body { color: red; }")
			.await
			.unwrap();

		assert!(report.result.is_applied());
		assert!(report.notification.is_none());
		let calls = session.calls();
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].method, "CSS.setStyleSheetText");
		assert_eq!(calls[0].params, json!({"styleSheetId": "S1", "text": "body { color: red; }"}));
	}

	#[tokio::test]
	async fn test_unclosed_block_makes_no_calls() {
		let session = FakeSession::new();
		let channel = session.channel();
		let registry = registry_with_sheet();
		let ctx = PatchContext {
			channel: &channel,
			registry: &registry,
		};

		let report = StylesheetPatcher
			.apply(&ctx, URL, "body { color: red;")
			.await
			.unwrap();

		assert!(matches!(report.result, PatchResult::Skipped(SkipReason::InvalidSyntax(_))));
		assert!(session.calls().is_empty());
	}

	#[tokio::test]
	async fn test_unknown_stylesheet_is_skipped() {
		let session = FakeSession::new();
		let channel = session.channel();
		let registry = IdentityRegistry::new();
		let ctx = PatchContext {
			channel: &channel,
			registry: &registry,
		};

		let report = StylesheetPatcher
			.apply(&ctx, URL, "body { color: blue; }")
			.await
			.unwrap();

		assert!(matches!(report.result, PatchResult::Skipped(SkipReason::IdentityUnknown)));
		assert!(session.calls().is_empty());
	}

	#[tokio::test]
	async fn test_rejection_is_failed_not_err() {
		let session = FakeSession::new();
		session.reject("CSS.setStyleSheetText", -32000, "No style sheet with given id found");
		let channel = session.channel();
		let registry = registry_with_sheet();
		let ctx = PatchContext {
			channel: &channel,
			registry: &registry,
		};

		let report = StylesheetPatcher
			.apply(&ctx, URL, "body { color: red; }")
			.await
			.unwrap();

		assert!(matches!(report.result, PatchResult::Failed(Error::ProtocolRejected { .. })));
	}

	#[tokio::test]
	async fn test_disconnect_is_err() {
		let session = FakeSession::new();
		session.disconnect();
		let channel = session.channel();
		let registry = registry_with_sheet();
		let ctx = PatchContext {
			channel: &channel,
			registry: &registry,
		};

		let err = StylesheetPatcher
			.apply(&ctx, URL, "body { color: red; }")
			.await
			.unwrap_err();
		assert!(err.is_transport());
	}
}
