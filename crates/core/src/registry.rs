//! URL → runtime identity tables.
//!
//! The browser tells us what it parsed through `Debugger.scriptParsed` and
//! `CSS.styleSheetAdded`; executors look identities up by URL when a file
//! changes. Every entry is stamped with the generation current when it was
//! recorded, and [`IdentityRegistry::begin_generation`] invalidates everything
//! recorded before it, so a reloaded page never gets patched through the ids
//! of its predecessor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use hr_protocol::{ScriptParsed, StyleSheetAdded};
use tracing::trace;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
	Script,
	Stylesheet,
}

impl fmt::Display for IdentityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			IdentityKind::Script => "script",
			IdentityKind::Stylesheet => "stylesheet",
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptIdentity {
	pub script_id: String,
	/// Context the script was compiled in; notifications are evaluated there
	pub execution_context_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetIdentity {
	pub style_sheet_id: String,
}

/// What the page knows a resource as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeIdentity {
	Script(ScriptIdentity),
	Stylesheet(StylesheetIdentity),
}

#[derive(Debug, Clone)]
struct Stamped<T> {
	identity: T,
	generation: u64,
}

/// Concurrent registry of runtime identities.
///
/// Scripts and stylesheets live in separate tables: inline `<script>` and
/// `<style>` elements both report the document URL.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
	generation: AtomicU64,
	scripts: DashMap<String, Stamped<ScriptIdentity>>,
	stylesheets: DashMap<String, Stamped<StylesheetIdentity>>,
}

impl IdentityRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Current session generation.
	pub fn generation(&self) -> u64 {
		self.generation.load(Ordering::SeqCst)
	}

	/// Starts a new generation and drops every recorded identity.
	pub fn begin_generation(&self) -> u64 {
		let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
		self.scripts.clear();
		self.stylesheets.clear();
		trace!(target = "hr", generation, "Identity registry reset");
		generation
	}

	/// Stores `identity` for `url`, replacing whatever was there.
	pub fn record(&self, url: &str, identity: RuntimeIdentity) {
		let generation = self.generation();
		match identity {
			RuntimeIdentity::Script(identity) => {
				self.scripts
					.insert(url.to_string(), Stamped { identity, generation });
			}
			RuntimeIdentity::Stylesheet(identity) => {
				self.stylesheets
					.insert(url.to_string(), Stamped { identity, generation });
			}
		}
	}

	pub fn lookup(&self, url: &str, kind: IdentityKind) -> Result<RuntimeIdentity> {
		match kind {
			IdentityKind::Script => self.lookup_script(url).map(RuntimeIdentity::Script),
			IdentityKind::Stylesheet => self.lookup_stylesheet(url).map(RuntimeIdentity::Stylesheet),
		}
	}

	pub fn lookup_script(&self, url: &str) -> Result<ScriptIdentity> {
		let generation = self.generation();
		self.scripts
			.get(url)
			.filter(|entry| entry.generation == generation)
			.map(|entry| entry.identity.clone())
			.ok_or_else(|| not_found(url, IdentityKind::Script))
	}

	pub fn lookup_stylesheet(&self, url: &str) -> Result<StylesheetIdentity> {
		let generation = self.generation();
		self.stylesheets
			.get(url)
			.filter(|entry| entry.generation == generation)
			.map(|entry| entry.identity.clone())
			.ok_or_else(|| not_found(url, IdentityKind::Stylesheet))
	}

	/// Records a parsed script. Scripts without a URL (eval, inline handlers) are ignored.
	pub fn on_script_parsed(&self, event: &ScriptParsed) {
		if event.url.is_empty() {
			return;
		}
		trace!(target = "hr", url = %event.url, script_id = %event.script_id, context = event.execution_context_id, "Script parsed");
		self.record(
			&event.url,
			RuntimeIdentity::Script(ScriptIdentity {
				script_id: event.script_id.clone(),
				execution_context_id: event.execution_context_id,
			}),
		);
	}

	/// Records an added stylesheet. Constructed sheets have no source URL and are ignored.
	pub fn on_stylesheet_added(&self, event: &StyleSheetAdded) {
		let header = &event.header;
		if header.source_url.is_empty() {
			return;
		}
		trace!(target = "hr", url = %header.source_url, style_sheet_id = %header.style_sheet_id, "Stylesheet added");
		self.record(
			&header.source_url,
			RuntimeIdentity::Stylesheet(StylesheetIdentity {
				style_sheet_id: header.style_sheet_id.clone(),
			}),
		);
	}

	/// Live entries in the current generation.
	pub fn len(&self) -> usize {
		let generation = self.generation();
		self.scripts.iter().filter(|e| e.generation == generation).count()
			+ self.stylesheets.iter().filter(|e| e.generation == generation).count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

fn not_found(url: &str, kind: IdentityKind) -> Error {
	Error::IdentityNotFound {
		url: url.to_string(),
		kind,
	}
}
