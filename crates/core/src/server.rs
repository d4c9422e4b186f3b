//! Session lifecycle: domain setup, the event pump and teardown.

use std::future::Future;
use std::sync::Arc;

use hr_protocol::{
	CssEnable, DebuggerEnable, DomEnable, Event, EventPayload, FetchEnable, FrameNavigated, FrameStartedLoading,
	GetFrameTree, InspectorDetached, LoadEventFired, Navigate, PageEnable, RequestPaused, RuntimeEnable, ScriptParsed,
	StyleSheetAdded, TARGET_CRASHED,
};
use hr_runtime::{Channel, SessionLike};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::dispatcher::{Dispatcher, PatchEvent, SessionSignal};
use crate::error::{Error, Result};
use crate::handlers::Subscription;
use crate::serve::{ResourceServer, ServeConfig, is_main_document};
use crate::state::SessionState;
use crate::watch::WatchService;

/// Where the main frame is in a navigation.
///
/// A navigation is announced twice, by `Page.frameStartedLoading` and by the
/// paused document request, in either order. The first one starts the new
/// generation; the second must not, or it would unbind the fresh document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Navigation {
	Settled,
	FrameLoading,
	DocumentRequested,
}

/// Serves a directory to one page and keeps it live-patched.
pub struct DevServer {
	channel: Channel,
	config: Arc<ServeConfig>,
	state: Arc<SessionState>,
	dispatcher: Arc<Dispatcher>,
	resources: Arc<ResourceServer>,
	signals: mpsc::UnboundedReceiver<SessionSignal>,
}

impl DevServer {
	pub fn new(session: Arc<dyn SessionLike>, config: ServeConfig, watcher: Arc<dyn WatchService>) -> Self {
		let channel = Channel::new(session);
		let config = Arc::new(config);
		let state = Arc::new(SessionState::new());
		let (dispatcher, signals) = Dispatcher::new(channel.clone(), Arc::clone(&state), watcher);
		let dispatcher = Arc::new(dispatcher);
		let resources = Arc::new(ResourceServer::new(
			Arc::clone(&config),
			channel.clone(),
			Arc::clone(&state),
			Arc::clone(&dispatcher),
		));
		Self {
			channel,
			config,
			state,
			dispatcher,
			resources,
			signals,
		}
	}

	pub fn config(&self) -> &ServeConfig {
		&self.config
	}

	pub fn state(&self) -> &Arc<SessionState> {
		&self.state
	}

	pub fn dispatcher(&self) -> &Arc<Dispatcher> {
		&self.dispatcher
	}

	/// Registers a handler for every processed change.
	pub fn on_patch<F, Fut>(&self, handler: F) -> Subscription
	where
		F: Fn(Arc<PatchEvent>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		self.dispatcher.on_patch(handler)
	}

	/// Opens the start URL and pumps events until the session ends.
	///
	/// Only returns on session loss (inspector detached, target crashed,
	/// connection closed); state is reset before it does.
	pub async fn run(mut self) -> Result<()> {
		// Subscribe before enabling so replayed scriptParsed events are not missed.
		let mut events = self.channel.events();

		if let Err(e) = self.enable_domains().await {
			return Err(self.teardown(e));
		}
		let mut frame = match self.channel.execute(&GetFrameTree {}).await {
			Ok(tree) => MainFrame::new(tree.frame_tree.frame.id),
			Err(e) => return Err(self.teardown(e.into())),
		};

		info!(
			target = "hr",
			root = %self.config.root().display(),
			url = %self.config.start_url(),
			"Serving"
		);

		// Navigation completes only once the document request is fulfilled, so
		// it has to progress alongside the pump.
		let navigate = navigate(self.channel.clone(), self.config.start_url().to_string());
		tokio::pin!(navigate);
		let mut navigating = true;

		loop {
			tokio::select! {
				result = &mut navigate, if navigating => {
					navigating = false;
					if let Err(e) = result {
						return Err(self.teardown(e));
					}
				}
				event = events.recv() => {
					let event = match event {
						Ok(event) => event,
						Err(e) => return Err(self.teardown(Error::SessionLost(e.to_string()))),
					};
					if let Err(e) = self.on_event(&event, &mut frame) {
						return Err(self.teardown(e));
					}
				}
				Some(signal) = self.signals.recv() => {
					let SessionSignal::TransportLost(e) = signal;
					return Err(self.teardown(e));
				}
			}
		}
	}

	async fn enable_domains(&self) -> Result<()> {
		self.channel.execute(&DebuggerEnable::default()).await?;
		self.channel.execute(&DomEnable::default()).await?;
		self.channel.execute(&PageEnable::default()).await?;
		self.channel.execute(&CssEnable::default()).await?;
		self.channel.execute(&RuntimeEnable::default()).await?;
		self.channel
			.execute(&FetchEnable {
				patterns: self.config.fetch_patterns(),
			})
			.await?;
		debug!(target = "hr", base = %self.config.base_url(), "Domains enabled");
		Ok(())
	}

	fn on_event(&self, event: &Event, frame: &mut MainFrame) -> Result<()> {
		if let Some(parsed) = payload::<ScriptParsed>(event) {
			self.state.registry().on_script_parsed(&parsed);
		} else if let Some(added) = payload::<StyleSheetAdded>(event) {
			self.state.registry().on_stylesheet_added(&added);
		} else if let Some(paused) = payload::<RequestPaused>(event) {
			let main_document = is_main_document(&paused, frame.id.as_deref());
			if main_document && frame.advance(Navigation::DocumentRequested) {
				self.begin_generation();
			}
			let resources = Arc::clone(&self.resources);
			tokio::spawn(async move {
				if let Err(e) = resources.handle(&paused, main_document).await {
					if e.is_transport() {
						debug!(target = "hr", url = %paused.request.url, error = %e, "Request dropped");
					} else {
						warn!(target = "hr", url = %paused.request.url, error = %e, "Failed to answer request");
					}
				}
			});
		} else if let Some(loading) = payload::<FrameStartedLoading>(event) {
			if frame.id.as_deref() == Some(loading.frame_id.as_str()) && frame.advance(Navigation::FrameLoading) {
				self.begin_generation();
			}
		} else if let Some(navigated) = payload::<FrameNavigated>(event) {
			if navigated.frame.parent_id.is_none() {
				debug!(target = "hr", frame = %navigated.frame.id, url = %navigated.frame.url, "Main frame navigated");
				frame.id = Some(navigated.frame.id);
			}
		} else if payload::<LoadEventFired>(event).is_some() {
			frame.navigation = Navigation::Settled;
			debug!(target = "hr", "Page loaded");
		} else if let Some(detached) = payload::<InspectorDetached>(event) {
			return Err(Error::SessionLost(format!("inspector detached: {}", detached.reason)));
		} else if event.method == TARGET_CRASHED {
			return Err(Error::SessionLost("page crashed".into()));
		} else {
			trace!(target = "hr", method = %event.method, "Ignored event");
		}
		Ok(())
	}

	fn begin_generation(&self) {
		let generation = self.state.begin_generation();
		self.dispatcher.clear();
		info!(target = "hr", generation, "Page navigating; runtime identities reset");
	}

	fn teardown(&self, err: Error) -> Error {
		warn!(target = "hr", error = %err, "Session ended");
		self.dispatcher.clear();
		self.state.reset();
		err
	}
}

struct MainFrame {
	id: Option<String>,
	navigation: Navigation,
}

impl MainFrame {
	fn new(id: String) -> Self {
		Self {
			id: Some(id),
			navigation: Navigation::Settled,
		}
	}

	/// Records one navigation announcement; returns true if it is the first
	/// of its navigation.
	fn advance(&mut self, step: Navigation) -> bool {
		let first = !matches!(
			(self.navigation, step),
			(Navigation::FrameLoading, Navigation::DocumentRequested)
				| (Navigation::DocumentRequested, Navigation::FrameLoading)
		);
		self.navigation = if first { step } else { Navigation::Settled };
		first
	}
}

async fn navigate(channel: Channel, url: String) -> Result<()> {
	let result = channel.execute(&Navigate { url: url.clone() }).await?;
	match result.error_text.filter(|t| !t.is_empty()) {
		Some(error_text) => warn!(target = "hr", %url, %error_text, "Navigation failed"),
		None => debug!(target = "hr", %url, frame = %result.frame_id, "Navigated"),
	}
	Ok(())
}

fn payload<E: EventPayload>(event: &Event) -> Option<E> {
	match event.parse::<E>()? {
		Ok(payload) => Some(payload),
		Err(e) => {
			warn!(target = "hr", method = %event.method, error = %e, "Malformed event");
			None
		}
	}
}
