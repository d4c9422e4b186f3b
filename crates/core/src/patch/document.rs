use async_trait::async_trait;
use hr_protocol::{GetDocument, SetOuterHtml};

use super::{PatchContext, PatchExecutor, PatchReport, command_failed};
use crate::error::Result;

/// Replaces the whole document via `DOM.setOuterHTML` on the root node.
///
/// Node ids do not survive a document swap, so the root is fetched fresh on
/// every apply.
pub struct DocumentPatcher;

#[async_trait]
impl PatchExecutor for DocumentPatcher {
	fn name(&self) -> &'static str {
		"document"
	}

	async fn apply(&self, ctx: &PatchContext<'_>, _url: &str, content: &str) -> Result<PatchReport> {
		let document = match ctx.channel.execute(&GetDocument::default()).await {
			Ok(document) => document,
			Err(e) => return command_failed(e),
		};

		let command = SetOuterHtml {
			node_id: document.root.node_id,
			outer_html: content.to_string(),
		};
		match ctx.channel.execute(&command).await {
			Ok(_) => Ok(PatchReport::applied()),
			Err(e) => command_failed(e),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicI64, Ordering};

	use serde_json::json;

	use super::*;
	use crate::error::Error;
	use crate::patch::PatchResult;
	use crate::registry::IdentityRegistry;
	use crate::testing::FakeSession;

	const URL: &str = "http://localhost:8080/index.html";

	#[tokio::test]
	async fn test_fetches_root_once_per_apply() {
		let session = FakeSession::new();
		let next_root = Arc::new(AtomicI64::new(1));
		let counter = Arc::clone(&next_root);
		session.respond_with("DOM.getDocument", move |_| {
			Ok(json!({"root": {"nodeId": counter.fetch_add(10, Ordering::SeqCst)}}))
		});
		let channel = session.channel();
		let registry = IdentityRegistry::new();
		let ctx = PatchContext {
			channel: &channel,
			registry: &registry,
		};

		for html in ["<html><body>one</body></html>", "<html><body>two</body></html>"] {
			let report = DocumentPatcher.apply(&ctx, URL, html).await.unwrap();
			assert!(report.result.is_applied());
		}

		let methods: Vec<String> = session.calls().into_iter().map(|c| c.method).collect();
		assert_eq!(
			methods,
			["DOM.getDocument", "DOM.setOuterHTML", "DOM.getDocument", "DOM.setOuterHTML"]
		);

		let sets = session.calls_to("DOM.setOuterHTML");
		assert_eq!(sets[0], json!({"nodeId": 1, "outerHTML": "<html><body>one</body></html>"}));
		assert_eq!(sets[1], json!({"nodeId": 11, "outerHTML": "<html><body>two</body></html>"}));
	}

	#[tokio::test]
	async fn test_rejected_set_is_failed() {
		let session = FakeSession::new();
		session.respond("DOM.getDocument", json!({"root": {"nodeId": 1}}));
		session.reject("DOM.setOuterHTML", -32000, "Could not find node with given id");
		let channel = session.channel();
		let registry = IdentityRegistry::new();
		let ctx = PatchContext {
			channel: &channel,
			registry: &registry,
		};

		let report = DocumentPatcher.apply(&ctx, URL, "<p>x</p>").await.unwrap();
		assert!(matches!(report.result, PatchResult::Failed(Error::ProtocolRejected { .. })));
	}

	#[tokio::test]
	async fn test_no_identity_needed() {
		let session = FakeSession::new();
		session.respond("DOM.getDocument", json!({"root": {"nodeId": 5}}));
		let channel = session.channel();
		let registry = IdentityRegistry::new();
		let ctx = PatchContext {
			channel: &channel,
			registry: &registry,
		};

		let report = DocumentPatcher.apply(&ctx, URL, "<p>y</p>").await.unwrap();
		assert!(report.result.is_applied());
		assert_eq!(session.calls_to("DOM.setOuterHTML")[0]["nodeId"], 5);
	}
}
