//! Per-session state owned by the dev server.

use std::path::PathBuf;

use dashmap::DashMap;

use crate::content_type::ContentType;
use crate::registry::IdentityRegistry;

/// A file served to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
	/// Request URL as the page sees it (registry key)
	pub url: String,
	pub path: PathBuf,
	pub mime: &'static str,
	pub content_type: ContentType,
	/// Hash of the content the page currently has
	pub hash: blake3::Hash,
}

impl Resource {
	pub fn new(url: impl Into<String>, path: impl Into<PathBuf>, mime: &'static str, content: &[u8]) -> Self {
		Self {
			url: url.into(),
			path: path.into(),
			mime,
			content_type: ContentType::from_mime(mime),
			hash: blake3::hash(content),
		}
	}
}

/// Registry, generation and resource table for one page session.
#[derive(Debug, Default)]
pub struct SessionState {
	registry: IdentityRegistry,
	resources: DashMap<String, Resource>,
}

impl SessionState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn registry(&self) -> &IdentityRegistry {
		&self.registry
	}

	pub fn generation(&self) -> u64 {
		self.registry.generation()
	}

	/// Records (or refreshes) a resource after it was served.
	pub fn track(&self, resource: Resource) {
		self.resources.insert(resource.url.clone(), resource);
	}

	pub fn resource(&self, url: &str) -> Option<Resource> {
		self.resources.get(url).map(|r| r.value().clone())
	}

	/// Whether `hash` differs from what the page last received for `url`.
	pub fn is_changed(&self, url: &str, hash: &blake3::Hash) -> bool {
		self.resources.get(url).is_none_or(|r| r.hash != *hash)
	}

	/// Notes that the page now has content with `hash` for `url`.
	pub fn set_hash(&self, url: &str, hash: blake3::Hash) {
		if let Some(mut r) = self.resources.get_mut(url) {
			r.hash = hash;
		}
	}

	pub fn resource_count(&self) -> usize {
		self.resources.len()
	}

	/// Starts a new generation after the main frame navigated.
	pub fn begin_generation(&self) -> u64 {
		self.registry.begin_generation()
	}

	/// Drops everything at session teardown.
	pub fn reset(&self) {
		self.registry.begin_generation();
		self.resources.clear();
	}
}
