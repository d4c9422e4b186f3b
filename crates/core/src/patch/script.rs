use async_trait::async_trait;
use hr_protocol::{Evaluate, SetScriptSource};
use tracing::{debug, warn};

use super::{NotificationOutcome, PatchContext, PatchExecutor, PatchReport, SkipReason, command_failed};
use crate::error::{Error, Result};

/// Name of the `CustomEvent` dispatched on `window` after a script is swapped.
pub const SCRIPT_PATCH_EVENT: &str = "script-patch";

/// Hot-swaps script source via `Debugger.setScriptSource`.
///
/// Only function bodies change in place; top-level statements are not re-run.
/// Pages that need to react listen for [`SCRIPT_PATCH_EVENT`], whose
/// `detail.scriptUrl` names the patched script.
pub struct ScriptPatcher;

#[async_trait]
impl PatchExecutor for ScriptPatcher {
	fn name(&self) -> &'static str {
		"script"
	}

	async fn apply(&self, ctx: &PatchContext<'_>, url: &str, content: &str) -> Result<PatchReport> {
		let Ok(identity) = ctx.registry.lookup_script(url) else {
			return Ok(PatchReport::skipped(SkipReason::IdentityUnknown));
		};

		let command = SetScriptSource {
			script_id: identity.script_id.clone(),
			script_source: content.to_string(),
			allow_top_frame_editing: true,
		};
		let outcome = match ctx.channel.execute(&command).await {
			Ok(outcome) => outcome,
			Err(e) => return command_failed(e),
		};

		if !outcome.is_ok() {
			let detail = match (&outcome.exception_details, &outcome.status) {
				(Some(details), _) => details.to_string(),
				(None, Some(status)) => status.clone(),
				(None, None) => "unknown".to_string(),
			};
			return Ok(PatchReport::failed(Error::ScriptRejected(detail)));
		}

		let notification = Evaluate::new(notification_expression(url)).in_context(identity.execution_context_id);
		let delivered = match ctx.channel.execute(&notification).await {
			Ok(reply) => match reply.exception_details {
				None => NotificationOutcome::Delivered,
				Some(details) => NotificationOutcome::Failed(details.to_string()),
			},
			Err(e) => NotificationOutcome::Failed(e.to_string()),
		};

		match &delivered {
			NotificationOutcome::Delivered => debug!(target = "hr", url, "Dispatched {SCRIPT_PATCH_EVENT}"),
			NotificationOutcome::Failed(reason) => {
				warn!(target = "hr", url, %reason, "Script patched but {SCRIPT_PATCH_EVENT} notification failed")
			}
		}

		Ok(PatchReport::applied().with_notification(delivered))
	}
}

/// Expression dispatching the patch event for `script_url`.
pub fn notification_expression(script_url: &str) -> String {
	let detail = serde_json::json!({ "scriptUrl": script_url });
	format!("window.dispatchEvent(new CustomEvent('{SCRIPT_PATCH_EVENT}', {{ detail: {detail} }}))")
}
