//! Change dispatch: served file → watch → per-URL worker → patch executor.
//!
//! Every bound URL gets a worker task fed by a one-slot signal channel. A
//! change arriving while a patch is in flight fills the slot; further changes
//! find it full and are dropped. The worker re-reads the file for every run,
//! so the coalesced run still sees the latest content and changes to one URL
//! are applied strictly in order.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use hr_runtime::Channel;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::content_type::ContentType;
use crate::error::{Error, Result};
use crate::handlers::{self, HandlerMap, Subscription};
use crate::patch::{PatchContext, PatchExecutor, PatchReport, PatchResult, SkipReason, executor_for};
use crate::state::{Resource, SessionState};
use crate::watch::WatchService;

/// Result of [`Dispatcher::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
	/// A watch and worker now exist for the URL.
	Bound,
	/// The URL was already bound; nothing changed.
	AlreadyBound,
	/// No executor handles this content type; nothing is watched.
	Unpatchable,
}

/// Raised to the session owner when the session can no longer be used.
#[derive(Debug)]
pub enum SessionSignal {
	TransportLost(Error),
}

/// Published after every processed change.
#[derive(Debug)]
pub struct PatchEvent {
	pub url: String,
	pub content_type: ContentType,
	pub report: PatchReport,
}

struct Binding {
	content_type: ContentType,
	changes: mpsc::Sender<()>,
	_watch: Subscription,
	worker: JoinHandle<()>,
}

impl Drop for Binding {
	fn drop(&mut self) {
		self.worker.abort();
	}
}

/// Owns the watch bindings for one session.
pub struct Dispatcher {
	channel: Channel,
	state: Arc<SessionState>,
	watcher: Arc<dyn WatchService>,
	bindings: Mutex<HashMap<String, Binding>>,
	handlers: HandlerMap<Arc<PatchEvent>>,
	signals: mpsc::UnboundedSender<SessionSignal>,
}

impl Dispatcher {
	pub fn new(
		channel: Channel,
		state: Arc<SessionState>,
		watcher: Arc<dyn WatchService>,
	) -> (Self, mpsc::UnboundedReceiver<SessionSignal>) {
		let (signals, signals_rx) = mpsc::unbounded_channel();
		let dispatcher = Self {
			channel,
			state,
			watcher,
			bindings: Mutex::new(HashMap::new()),
			handlers: Arc::new(Mutex::new(IndexMap::new())),
			signals,
		};
		(dispatcher, signals_rx)
	}

	/// Starts watching a served resource.
	///
	/// Must be called inside a tokio runtime.
	pub fn bind(&self, resource: &Resource) -> Result<BindOutcome> {
		let Some(executor) = executor_for(resource.content_type) else {
			trace!(target = "hr", url = %resource.url, mime = resource.mime, "Not patchable; not watching");
			return Ok(BindOutcome::Unpatchable);
		};

		let mut bindings = self.bindings.lock();
		if bindings.contains_key(&resource.url) {
			return Ok(BindOutcome::AlreadyBound);
		}

		let (changes, changes_rx) = mpsc::channel(1);
		let signal = changes.clone();
		let watch = self.watcher.watch(
			&resource.path,
			Arc::new(move || {
				// Full means a run is already pending; it will read the latest content.
				let _ = signal.try_send(());
			}),
		)?;

		let worker = Worker {
			url: resource.url.clone(),
			path: resource.path.clone(),
			content_type: resource.content_type,
			executor,
			channel: self.channel.clone(),
			state: Arc::clone(&self.state),
			handlers: Arc::clone(&self.handlers),
			signals: self.signals.clone(),
		};
		let worker = tokio::spawn(worker.run(changes_rx));

		bindings.insert(
			resource.url.clone(),
			Binding {
				content_type: resource.content_type,
				changes,
				_watch: watch,
				worker,
			},
		);
		info!(target = "hr", url = %resource.url, path = %resource.path.display(), kind = %resource.content_type, "Watching");
		Ok(BindOutcome::Bound)
	}

	/// Queues a change for `url`. Returns false if the URL is not bound.
	pub fn notify_changed(&self, url: &str) -> bool {
		match self.bindings.lock().get(url) {
			Some(binding) => {
				let _ = binding.changes.try_send(());
				true
			}
			None => false,
		}
	}

	/// Drops every binding, stopping its watch and worker.
	pub fn clear(&self) {
		let drained: Vec<Binding> = self.bindings.lock().drain().map(|(_, b)| b).collect();
		if !drained.is_empty() {
			debug!(target = "hr", count = drained.len(), "Cleared watch bindings");
		}
	}

	pub fn is_bound(&self, url: &str) -> bool {
		self.bindings.lock().contains_key(url)
	}

	pub fn bound_count(&self) -> usize {
		self.bindings.lock().len()
	}

	pub fn content_type(&self, url: &str) -> Option<ContentType> {
		self.bindings.lock().get(url).map(|b| b.content_type)
	}

	/// Registers a handler called with every [`PatchEvent`].
	pub fn on_patch<F, Fut>(&self, handler: F) -> Subscription
	where
		F: Fn(Arc<PatchEvent>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		handlers::register(&self.handlers, handler)
	}
}

struct Worker {
	url: String,
	path: PathBuf,
	content_type: ContentType,
	executor: &'static dyn PatchExecutor,
	channel: Channel,
	state: Arc<SessionState>,
	handlers: HandlerMap<Arc<PatchEvent>>,
	signals: mpsc::UnboundedSender<SessionSignal>,
}

impl Worker {
	async fn run(self, mut changes: mpsc::Receiver<()>) {
		while changes.recv().await.is_some() {
			match self.process().await {
				Ok(report) => {
					self.log(&report);
					let event = Arc::new(PatchEvent {
						url: self.url.clone(),
						content_type: self.content_type,
						report,
					});
					handlers::emit(&self.handlers, event).await;
				}
				Err(e) => {
					error!(target = "hr", url = %self.url, error = %e, "Session lost while patching");
					let _ = self.signals.send(SessionSignal::TransportLost(e));
					return;
				}
			}
		}
	}

	async fn process(&self) -> Result<PatchReport> {
		let bytes = match tokio::fs::read(&self.path).await {
			Ok(bytes) => bytes,
			Err(e) => return Ok(PatchReport::failed(Error::Io(e))),
		};

		let hash = blake3::hash(&bytes);
		if !self.state.is_changed(&self.url, &hash) {
			return Ok(PatchReport::skipped(SkipReason::ContentUnchanged));
		}

		let Ok(content) = String::from_utf8(bytes) else {
			return Ok(PatchReport::skipped(SkipReason::NotUtf8));
		};

		let ctx = PatchContext {
			channel: &self.channel,
			registry: self.state.registry(),
		};
		let report = self.executor.apply(&ctx, &self.url, &content).await?;
		if report.result.is_applied() {
			self.state.set_hash(&self.url, hash);
		}
		Ok(report)
	}

	fn log(&self, report: &PatchReport) {
		let executor = self.executor.name();
		match &report.result {
			PatchResult::Applied => info!(target = "hr", url = %self.url, executor, "Patched"),
			PatchResult::Skipped(SkipReason::ContentUnchanged) => {
				debug!(target = "hr", url = %self.url, "Content unchanged; skipped")
			}
			PatchResult::Skipped(SkipReason::NotUtf8) => {
				warn!(target = "hr", url = %self.url, "Content is not UTF-8; skipped")
			}
			PatchResult::Skipped(reason) => info!(target = "hr", url = %self.url, executor, %reason, "Not patched"),
			PatchResult::Failed(e) => warn!(target = "hr", url = %self.url, executor, error = %e, "Patch failed"),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use serde_json::json;
	use tempfile::TempDir;

	use super::*;
	use crate::content_type::mime_from_path;
	use crate::registry::{RuntimeIdentity, ScriptIdentity, StylesheetIdentity};
	use crate::testing::{FakeSession, ManualWatch};

	const BASE: &str = "http://localhost:8080/";

	struct Fixture {
		temp: TempDir,
		session: Arc<FakeSession>,
		watch: Arc<ManualWatch>,
		state: Arc<SessionState>,
		dispatcher: Dispatcher,
		signals: mpsc::UnboundedReceiver<SessionSignal>,
		events: mpsc::UnboundedReceiver<Arc<PatchEvent>>,
		_patches: Subscription,
	}

	impl Fixture {
		fn new() -> Self {
			let session = FakeSession::new();
			let watch = ManualWatch::new();
			let state = Arc::new(SessionState::new());
			let (dispatcher, signals) =
				Dispatcher::new(session.channel(), Arc::clone(&state), Arc::clone(&watch) as Arc<dyn WatchService>);

			let (tx, events) = mpsc::unbounded_channel();
			let patches = dispatcher.on_patch(move |event| {
				let tx = tx.clone();
				async move {
					let _ = tx.send(event);
					Ok(())
				}
			});

			Self {
				temp: TempDir::new().unwrap(),
				session,
				watch,
				state,
				dispatcher,
				signals,
				events,
				_patches: patches,
			}
		}

		/// Writes a file and records it as served.
		fn serve(&self, name: &str, content: &str) -> Resource {
			let path = self.temp.path().join(name);
			std::fs::write(&path, content).unwrap();
			let resource = Resource::new(format!("{BASE}{name}"), &path, mime_from_path(&path), content.as_bytes());
			self.state.track(resource.clone());
			resource
		}

		fn edit(&self, resource: &Resource, content: &str) {
			std::fs::write(&resource.path, content).unwrap();
			self.watch.touch(&resource.path);
		}

		async fn next_event(&mut self) -> Arc<PatchEvent> {
			tokio::time::timeout(Duration::from_secs(5), self.events.recv())
				.await
				.expect("timed out waiting for patch event")
				.unwrap()
		}

		async fn assert_quiet(&mut self) {
			let extra = tokio::time::timeout(Duration::from_millis(100), self.events.recv()).await;
			assert!(extra.is_err(), "unexpected patch event: {extra:?}");
		}
	}

	async fn wait_for_calls(session: &FakeSession, method: &str, count: usize) {
		for _ in 0..500 {
			if session.calls_to(method).len() >= count {
				return;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		panic!("timed out waiting for {count} call(s) to {method}");
	}

	#[tokio::test]
	async fn test_unpatchable_types_are_not_watched() {
		let fx = Fixture::new();
		let image = fx.serve("logo.png", "not really a png");
		let data = fx.serve("data.json", "{}");

		assert_eq!(fx.dispatcher.bind(&image).unwrap(), BindOutcome::Unpatchable);
		assert_eq!(fx.dispatcher.bind(&data).unwrap(), BindOutcome::Unpatchable);
		assert_eq!(fx.watch.active(), 0);
		assert_eq!(fx.dispatcher.bound_count(), 0);
	}

	#[tokio::test]
	async fn test_bind_is_idempotent() {
		let fx = Fixture::new();
		let css = fx.serve("app.css", "a {}");

		assert_eq!(fx.dispatcher.bind(&css).unwrap(), BindOutcome::Bound);
		assert_eq!(fx.dispatcher.bind(&css).unwrap(), BindOutcome::AlreadyBound);
		assert_eq!(fx.watch.active(), 1);
		assert_eq!(fx.dispatcher.content_type(&css.url), Some(ContentType::Stylesheet));
	}

	#[tokio::test]
	async fn test_invalid_css_then_fix() {
		let mut fx = Fixture::new();
		let css = fx.serve("app.css", "body { color: black; }");
		fx.state.registry().record(
			&css.url,
			RuntimeIdentity::Stylesheet(StylesheetIdentity {
				style_sheet_id: "S1".into(),
			}),
		);
		fx.dispatcher.bind(&css).unwrap();

		fx.edit(&css, "body { color: red;");
		let event = fx.next_event().await;
		assert_eq!(event.url, css.url);
		assert!(matches!(event.report.result, PatchResult::Skipped(SkipReason::InvalidSyntax(_))));
		assert!(fx.session.calls().is_empty());

		fx.edit(&css, "body { color: red; }");
		let event = fx.next_event().await;
		assert!(event.report.result.is_applied());
		assert_eq!(
			fx.session.calls_to("CSS.setStyleSheetText"),
			vec![json!({"styleSheetId": "S1", "text": "body { color: red; }"})]
		);
	}

	#[tokio::test]
	async fn test_script_patch_notifies_in_its_context() {
		let mut fx = Fixture::new();
		fx.session.respond("Debugger.setScriptSource", json!({"status": "Ok"}));
		fx.session
			.respond("Runtime.evaluate", json!({"result": {"type": "boolean", "value": true}}));
		let js = fx.serve("main.js", "function tick() { return 1; }");
		fx.state.registry().record(
			&js.url,
			RuntimeIdentity::Script(ScriptIdentity {
				script_id: "42".into(),
				execution_context_id: 7,
			}),
		);
		fx.dispatcher.bind(&js).unwrap();

		fx.edit(&js, "function tick() { return 2; }");
		let event = fx.next_event().await;

		assert!(event.report.result.is_applied());
		let calls = fx.session.calls();
		assert_eq!(calls[0].method, "Debugger.setScriptSource");
		assert_eq!(calls[0].params["scriptId"], "42");
		assert_eq!(calls[1].method, "Runtime.evaluate");
		assert_eq!(calls[1].params["contextId"], 7);
	}

	#[tokio::test]
	async fn test_identity_arriving_after_change() {
		let mut fx = Fixture::new();
		let css = fx.serve("app.css", "a { color: black; }");
		fx.dispatcher.bind(&css).unwrap();

		fx.edit(&css, "a { color: green; }");
		let event = fx.next_event().await;
		assert!(matches!(event.report.result, PatchResult::Skipped(SkipReason::IdentityUnknown)));
		assert!(fx.session.calls().is_empty());

		fx.state.registry().record(
			&css.url,
			RuntimeIdentity::Stylesheet(StylesheetIdentity {
				style_sheet_id: "S7".into(),
			}),
		);
		fx.watch.touch(&css.path);
		let event = fx.next_event().await;
		assert!(event.report.result.is_applied());
		assert_eq!(fx.session.calls_to("CSS.setStyleSheetText")[0]["styleSheetId"], "S7");
	}

	#[tokio::test]
	async fn test_unchanged_content_is_skipped() {
		let mut fx = Fixture::new();
		let css = fx.serve("app.css", "a { color: black; }");
		fx.state.registry().record(
			&css.url,
			RuntimeIdentity::Stylesheet(StylesheetIdentity {
				style_sheet_id: "S1".into(),
			}),
		);
		fx.dispatcher.bind(&css).unwrap();

		fx.watch.touch(&css.path);
		let event = fx.next_event().await;
		assert!(matches!(event.report.result, PatchResult::Skipped(SkipReason::ContentUnchanged)));

		fx.edit(&css, "a { color: white; }");
		assert!(fx.next_event().await.report.result.is_applied());

		fx.watch.touch(&css.path);
		let event = fx.next_event().await;
		assert!(matches!(event.report.result, PatchResult::Skipped(SkipReason::ContentUnchanged)));
		assert_eq!(fx.session.calls().len(), 1);
	}

	#[tokio::test]
	async fn test_changes_are_serialized_and_coalesced() {
		let mut fx = Fixture::new();
		fx.session.delay("CSS.setStyleSheetText", Duration::from_millis(100));
		let css = fx.serve("app.css", "a { color: black; }");
		fx.state.registry().record(
			&css.url,
			RuntimeIdentity::Stylesheet(StylesheetIdentity {
				style_sheet_id: "S1".into(),
			}),
		);
		fx.dispatcher.bind(&css).unwrap();

		fx.edit(&css, "a { color: red; }");
		wait_for_calls(&fx.session, "CSS.setStyleSheetText", 1).await;

		// First patch is in flight; these collapse into one follow-up run.
		fx.edit(&css, "a { color: orange; }");
		fx.edit(&css, "a { color: blue; }");
		fx.watch.touch(&css.path);

		assert!(fx.next_event().await.report.result.is_applied());
		assert!(fx.next_event().await.report.result.is_applied());
		fx.assert_quiet().await;

		let texts: Vec<String> = fx
			.session
			.calls_to("CSS.setStyleSheetText")
			.iter()
			.map(|p| p["text"].as_str().unwrap().to_string())
			.collect();
		assert_eq!(texts, ["a { color: red; }", "a { color: blue; }"]);
	}

	#[tokio::test]
	async fn test_notify_changed_by_url() {
		let mut fx = Fixture::new();
		let html = fx.serve("index.html", "<p>old</p>");
		fx.session.respond("DOM.getDocument", json!({"root": {"nodeId": 1}}));
		fx.dispatcher.bind(&html).unwrap();

		std::fs::write(&html.path, "<p>new</p>").unwrap();
		assert!(fx.dispatcher.notify_changed(&html.url));
		assert!(fx.next_event().await.report.result.is_applied());

		assert!(!fx.dispatcher.notify_changed("http://localhost:8080/nope.css"));
	}

	#[tokio::test]
	async fn test_transport_loss_is_signalled() {
		let mut fx = Fixture::new();
		let css = fx.serve("app.css", "a {}");
		fx.state.registry().record(
			&css.url,
			RuntimeIdentity::Stylesheet(StylesheetIdentity {
				style_sheet_id: "S1".into(),
			}),
		);
		fx.dispatcher.bind(&css).unwrap();
		fx.session.disconnect();

		fx.edit(&css, "a { color: red; }");
		let signal = tokio::time::timeout(Duration::from_secs(5), fx.signals.recv())
			.await
			.unwrap()
			.unwrap();
		let SessionSignal::TransportLost(err) = signal;
		assert!(err.is_transport());
		fx.assert_quiet().await;
	}

	#[tokio::test]
	async fn test_clear_drops_watches_and_workers() {
		let mut fx = Fixture::new();
		let css = fx.serve("app.css", "a {}");
		let js = fx.serve("main.js", "1");
		fx.dispatcher.bind(&css).unwrap();
		fx.dispatcher.bind(&js).unwrap();
		assert_eq!(fx.watch.active(), 2);

		fx.dispatcher.clear();
		assert_eq!(fx.dispatcher.bound_count(), 0);
		assert_eq!(fx.watch.active(), 0);
		assert!(!fx.watch.is_watching(&css.path));
		assert!(!fx.dispatcher.notify_changed(&css.url));

		fx.edit(&css, "a { color: red; }");
		fx.assert_quiet().await;

		assert_eq!(fx.dispatcher.bind(&css).unwrap(), BindOutcome::Bound);
	}
}
