//! File watching.
//!
//! Editors often save by writing a temporary file and renaming it over the
//! original, which silently drops an inotify watch on the file itself. Watches
//! are therefore placed on the parent directory and events are routed to
//! callbacks by exact (canonical) file path. One OS watcher is shared by all
//! files; directories are reference counted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::handlers::{HandlerId, Subscription, next_handler_id};

/// Invoked (from the watcher thread) whenever the watched file changes.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Source of file change notifications.
pub trait WatchService: Send + Sync {
	/// Calls `on_change` on every content change of `path` until the
	/// returned subscription is dropped.
	fn watch(&self, path: &Path, on_change: ChangeCallback) -> Result<Subscription>;
}

type Routes = HashMap<PathBuf, IndexMap<HandlerId, ChangeCallback>>;

struct Shared {
	watcher: Mutex<RecommendedWatcher>,
	routes: Arc<Mutex<Routes>>,
	/// Watched directory → number of files routed under it
	dirs: Mutex<HashMap<PathBuf, usize>>,
}

/// [`WatchService`] backed by the platform's recommended `notify` watcher.
pub struct NotifyWatchService {
	shared: Arc<Shared>,
}

impl NotifyWatchService {
	pub fn new() -> Result<Self> {
		let routes: Arc<Mutex<Routes>> = Arc::new(Mutex::new(HashMap::new()));
		let event_routes = Arc::clone(&routes);

		let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
			Ok(event) => dispatch_event(&event_routes, &event),
			Err(e) => warn!(target = "hr", error = %e, "File watcher error"),
		})
		.map_err(|source| Error::Watch {
			path: PathBuf::new(),
			source,
		})?;

		Ok(Self {
			shared: Arc::new(Shared {
				watcher: Mutex::new(watcher),
				routes,
				dirs: Mutex::new(HashMap::new()),
			}),
		})
	}
}

impl WatchService for NotifyWatchService {
	fn watch(&self, path: &Path, on_change: ChangeCallback) -> Result<Subscription> {
		let file = std::fs::canonicalize(path)?;
		let dir = file.parent().map(Path::to_path_buf).ok_or_else(|| Error::Watch {
			path: file.clone(),
			source: notify::Error::generic("path has no parent directory"),
		})?;

		{
			let mut dirs = self.shared.dirs.lock();
			if !dirs.contains_key(&dir) {
				self.shared
					.watcher
					.lock()
					.watch(&dir, RecursiveMode::NonRecursive)
					.map_err(|source| Error::Watch {
						path: dir.clone(),
						source,
					})?;
				debug!(target = "hr", dir = %dir.display(), "Watching directory");
			}
			*dirs.entry(dir.clone()).or_insert(0) += 1;
		}

		let id = next_handler_id();
		self.shared
			.routes
			.lock()
			.entry(file.clone())
			.or_default()
			.insert(id, on_change);
		trace!(target = "hr", file = %file.display(), id, "Watch registered");

		let shared: Weak<Shared> = Arc::downgrade(&self.shared);
		Ok(Subscription::new(
			id,
			Arc::new(move |id: HandlerId| {
				if let Some(shared) = shared.upgrade() {
					shared.unroute(&file, &dir, id);
				}
			}),
		))
	}
}

impl Shared {
	fn unroute(&self, file: &Path, dir: &Path, id: HandlerId) {
		{
			let mut routes = self.routes.lock();
			if let Some(callbacks) = routes.get_mut(file) {
				callbacks.shift_remove(&id);
				if callbacks.is_empty() {
					routes.remove(file);
				}
			}
		}

		let mut dirs = self.dirs.lock();
		let Some(count) = dirs.get_mut(dir) else {
			return;
		};
		*count -= 1;
		if *count == 0 {
			dirs.remove(dir);
			if let Err(e) = self.watcher.lock().unwatch(dir) {
				debug!(target = "hr", dir = %dir.display(), error = %e, "Failed to unwatch directory");
			}
		}
	}
}

/// Data writes, creations and renames count; metadata and access do not.
fn is_content_change(kind: &EventKind) -> bool {
	matches!(
		kind,
		EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Name(_))
	)
}

fn dispatch_event(routes: &Mutex<Routes>, event: &notify::Event) {
	if !is_content_change(&event.kind) {
		return;
	}

	let callbacks: Vec<ChangeCallback> = {
		let routes = routes.lock();
		event
			.paths
			.iter()
			.filter_map(|p| routes.get(p))
			.flat_map(|callbacks| callbacks.values().cloned())
			.collect()
	};

	for callback in callbacks {
		callback();
	}
}
