//! Serving local files to the page through request interception.
//!
//! `Fetch.enable` pauses every request under the base URL. Paused `GET`s are
//! answered from disk with `Fetch.fulfillRequest`; anything else continues to
//! the network. A served, patchable file is then tracked and bound for
//! watching. HTML is only bound when it is the main frame's document, since
//! markup patches always replace the top-level document.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use hr_protocol::{ContinueRequest, FulfillRequest, RequestPattern, RequestPaused};
use hr_runtime::Channel;
use tracing::{debug, trace, warn};
use url::Url;

use crate::content_type::{ContentType, mime_from_path};
use crate::dispatcher::{BindOutcome, Dispatcher};
use crate::error::Result;
use crate::state::{Resource, SessionState};

const INDEX_FILE: &str = "index.html";

/// Where files come from and which URLs they answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
	/// Canonical root directory
	root: PathBuf,
	/// URL the page is opened at
	start_url: Url,
	/// Directory URL every served path is relative to
	base_url: Url,
}

/// How a paused request is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
	/// Serve this file (or its `index.html` if it is a directory).
	File(PathBuf),
	/// Under the base URL but not servable.
	NotFound,
	/// Not ours; let it hit the network.
	Passthrough,
}

impl ServeConfig {
	/// `root` must exist. The base URL is the directory part of `start_url`.
	pub fn new(root: impl AsRef<Path>, start_url: Url) -> Result<Self> {
		let root = std::fs::canonicalize(root.as_ref())?;
		let base_url = start_url.join("./").unwrap_or_else(|_| start_url.clone());
		Ok(Self {
			root,
			start_url,
			base_url,
		})
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn start_url(&self) -> &Url {
		&self.start_url
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Interception patterns for `Fetch.enable`.
	pub fn fetch_patterns(&self) -> Vec<RequestPattern> {
		vec![RequestPattern {
			url_pattern: format!("{}*", self.base_url),
			request_stage: Some("Request".into()),
		}]
	}

	/// Maps a request to a file under the root without touching the disk.
	pub fn map_request(&self, method: &str, raw_url: &str) -> Resolution {
		if !method.eq_ignore_ascii_case("GET") {
			return Resolution::Passthrough;
		}
		let Ok(mut url) = Url::parse(raw_url) else {
			return Resolution::Passthrough;
		};
		url.set_query(None);
		url.set_fragment(None);

		let Some(relative) = url.as_str().strip_prefix(self.base_url.as_str()) else {
			return Resolution::Passthrough;
		};
		let relative = if relative.is_empty() || relative.ends_with('/') {
			format!("{relative}{INDEX_FILE}")
		} else {
			relative.to_string()
		};

		match self.file_for(&relative) {
			Some(path) => Resolution::File(path),
			None => Resolution::NotFound,
		}
	}

	/// Percent-decodes `relative` and joins it under the root, refusing
	/// anything that would leave it.
	fn file_for(&self, relative: &str) -> Option<PathBuf> {
		let root_url = Url::from_directory_path(&self.root).ok()?;
		let path = root_url.join(relative).ok()?.to_file_path().ok()?;
		let inside = path.strip_prefix(&self.root).ok()?;
		inside
			.components()
			.all(|c| matches!(c, Component::Normal(_)))
			.then_some(path)
	}
}

/// Answers paused requests and hands served files to the dispatcher.
pub struct ResourceServer {
	config: Arc<ServeConfig>,
	channel: Channel,
	state: Arc<SessionState>,
	dispatcher: Arc<Dispatcher>,
}

impl ResourceServer {
	pub fn new(config: Arc<ServeConfig>, channel: Channel, state: Arc<SessionState>, dispatcher: Arc<Dispatcher>) -> Self {
		Self {
			config,
			channel,
			state,
			dispatcher,
		}
	}

	pub fn config(&self) -> &ServeConfig {
		&self.config
	}

	/// Answers one `Fetch.requestPaused` event.
	///
	/// `main_document` marks the top-level document request of the page; see
	/// [`is_main_document`].
	pub async fn handle(&self, event: &RequestPaused, main_document: bool) -> Result<()> {
		let generation = self.state.generation();
		let url = &event.request.url;

		let path = match self.config.map_request(&event.request.method, url) {
			Resolution::Passthrough => {
				trace!(target = "hr", %url, method = %event.request.method, "Continuing request");
				self.channel
					.execute(&ContinueRequest {
						request_id: event.request_id.clone(),
					})
					.await?;
				return Ok(());
			}
			Resolution::NotFound => return self.respond_status(event, 404, "Not Found").await,
			Resolution::File(path) => path,
		};

		let path = match tokio::fs::metadata(&path).await {
			Ok(meta) if meta.is_dir() => path.join(INDEX_FILE),
			_ => path,
		};

		let body = match tokio::fs::read(&path).await {
			Ok(body) => body,
			Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
				debug!(target = "hr", %url, path = %path.display(), "File not found");
				return self.respond_status(event, 404, "Not Found").await;
			}
			Err(e) => {
				warn!(target = "hr", %url, path = %path.display(), error = %e, "Failed to read file");
				return self.respond_status(event, 500, "Internal Server Error").await;
			}
		};

		let mime = mime_from_path(&path);
		self.channel
			.execute(
				&FulfillRequest::new(event.request_id.clone(), 200, &body)
					.header("Content-Type", mime)
					.header("Cache-Control", "no-store"),
			)
			.await?;
		debug!(target = "hr", %url, path = %path.display(), mime, bytes = body.len(), "Served");

		// A navigation since the request paused means this response belongs to
		// a page that is already gone.
		if self.state.generation() != generation {
			trace!(target = "hr", %url, "Stale response; not binding");
			return Ok(());
		}

		let resource = Resource::new(url.clone(), path, mime, &body);
		self.state.track(resource.clone());
		if resource.content_type == ContentType::Document && !main_document {
			debug!(target = "hr", %url, "Markup outside the main document; not binding");
			return Ok(());
		}
		match self.dispatcher.bind(&resource) {
			Ok(BindOutcome::Bound | BindOutcome::AlreadyBound | BindOutcome::Unpatchable) => {}
			Err(e) => warn!(target = "hr", %url, error = %e, "Failed to watch served file"),
		}
		Ok(())
	}

	async fn respond_status(&self, event: &RequestPaused, code: u16, reason: &str) -> Result<()> {
		debug!(target = "hr", url = %event.request.url, code, "Responding with status");
		self.channel
			.execute(
				&FulfillRequest::new(event.request_id.clone(), code, reason.as_bytes())
					.header("Content-Type", "text/plain; charset=utf-8"),
			)
			.await?;
		Ok(())
	}
}

/// True if the paused request loads the main frame's document.
pub fn is_main_document(event: &RequestPaused, main_frame: Option<&str>) -> bool {
	event.resource_type.as_deref() == Some("Document")
		&& main_frame.is_some()
		&& event.frame_id.as_deref() == main_frame
}
