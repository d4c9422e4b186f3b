//! Scripted in-memory session and watch service for unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hr_protocol::Event;
use hr_runtime::{BoxFuture, Channel, EventStream, SessionLike};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::handlers::{HandlerId, Subscription, next_handler_id};
use crate::watch::{ChangeCallback, WatchService};

type Responder = Arc<dyn Fn(&Value) -> hr_runtime::Result<Value> + Send + Sync>;

/// One recorded protocol call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
	pub method: String,
	pub params: Value,
}

/// Session double: records every call, answers from per-method responders
/// (`{}` by default), and broadcasts events pushed with [`FakeSession::emit`].
pub struct FakeSession {
	calls: Mutex<Vec<Call>>,
	responders: Mutex<HashMap<String, Responder>>,
	delays: Mutex<HashMap<String, Duration>>,
	events_tx: Mutex<Option<broadcast::Sender<Event>>>,
	disconnected: AtomicBool,
}

impl FakeSession {
	pub fn new() -> Arc<Self> {
		let (events_tx, _) = broadcast::channel(256);
		Arc::new(Self {
			calls: Mutex::new(Vec::new()),
			responders: Mutex::new(HashMap::new()),
			delays: Mutex::new(HashMap::new()),
			events_tx: Mutex::new(Some(events_tx)),
			disconnected: AtomicBool::new(false),
		})
	}

	pub fn channel(self: &Arc<Self>) -> Channel {
		Channel::new(Arc::clone(self) as Arc<dyn SessionLike>)
	}

	pub fn respond(&self, method: &str, result: Value) {
		self.respond_with(method, move |_| Ok(result.clone()));
	}

	pub fn respond_with<F>(&self, method: &str, responder: F)
	where
		F: Fn(&Value) -> hr_runtime::Result<Value> + Send + Sync + 'static,
	{
		self.responders.lock().insert(method.to_string(), Arc::new(responder));
	}

	pub fn reject(&self, method: &str, code: i64, message: &str) {
		let method_name = method.to_string();
		let message = message.to_string();
		self.respond_with(method, move |_| {
			Err(hr_runtime::Error::Remote {
				method: method_name.clone(),
				code,
				message: message.clone(),
			})
		});
	}

	/// Holds every call to `method` for `delay` before answering.
	pub fn delay(&self, method: &str, delay: Duration) {
		self.delays.lock().insert(method.to_string(), delay);
	}

	/// Fails all further calls with a transport error and closes event streams.
	pub fn disconnect(&self) {
		self.disconnected.store(true, Ordering::SeqCst);
		self.events_tx.lock().take();
	}

	pub fn emit(&self, method: &str, params: Value) {
		if let Some(tx) = self.events_tx.lock().as_ref() {
			let _ = tx.send(Event {
				method: method.to_string(),
				params,
				session_id: None,
			});
		}
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().clone()
	}

	/// Params of every call to `method`, in order.
	pub fn calls_to(&self, method: &str) -> Vec<Value> {
		self.calls
			.lock()
			.iter()
			.filter(|c| c.method == method)
			.map(|c| c.params.clone())
			.collect()
	}
}

impl SessionLike for FakeSession {
	fn send_raw<'a>(&'a self, method: &'a str, params: Value) -> BoxFuture<'a, hr_runtime::Result<Value>> {
		Box::pin(async move {
			if self.disconnected.load(Ordering::SeqCst) {
				return Err(hr_runtime::Error::ChannelClosed);
			}
			self.calls.lock().push(Call {
				method: method.to_string(),
				params: params.clone(),
			});

			let delay = self.delays.lock().get(method).copied();
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			let responder = self.responders.lock().get(method).cloned();
			match responder {
				Some(responder) => responder(&params),
				None => Ok(json!({})),
			}
		})
	}

	fn events(&self) -> EventStream {
		let rx = match self.events_tx.lock().as_ref() {
			Some(tx) => tx.subscribe(),
			None => broadcast::channel(1).1,
		};
		EventStream::new(rx, None)
	}
}

type ManualRoutes = Vec<(HandlerId, PathBuf, ChangeCallback)>;

/// Watch service driven by hand: [`ManualWatch::touch`] fires the callbacks for a path.
#[derive(Default)]
pub struct ManualWatch {
	routes: Arc<Mutex<ManualRoutes>>,
}

impl ManualWatch {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn touch(&self, path: &Path) {
		let callbacks: Vec<ChangeCallback> = self
			.routes
			.lock()
			.iter()
			.filter(|(_, p, _)| p == path)
			.map(|(_, _, cb)| Arc::clone(cb))
			.collect();
		for callback in callbacks {
			callback();
		}
	}

	pub fn active(&self) -> usize {
		self.routes.lock().len()
	}

	pub fn is_watching(&self, path: &Path) -> bool {
		self.routes.lock().iter().any(|(_, p, _)| p == path)
	}
}

impl WatchService for ManualWatch {
	fn watch(&self, path: &Path, on_change: ChangeCallback) -> crate::Result<Subscription> {
		let id = next_handler_id();
		self.routes.lock().push((id, path.to_path_buf(), on_change));
		let routes = Arc::downgrade(&self.routes);
		Ok(Subscription::new(
			id,
			Arc::new(move |id: HandlerId| {
				if let Some(routes) = routes.upgrade() {
					routes.lock().retain(|(entry, _, _)| *entry != id);
				}
			}),
		))
	}
}
