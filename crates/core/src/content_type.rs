//! Content classification for served resources.

use std::fmt;
use std::path::Path;

/// Kind of resource as far as live patching is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
	Stylesheet,
	Script,
	Document,
	Other,
}

impl ContentType {
	/// Classifies a MIME type.
	///
	/// Only `text/css`, `application/javascript` and `text/html` are
	/// patchable; parameters and letter case are ignored.
	pub fn from_mime(mime: &str) -> Self {
		match essence(mime).as_str() {
			"text/css" => ContentType::Stylesheet,
			"application/javascript" => ContentType::Script,
			"text/html" => ContentType::Document,
			_ => ContentType::Other,
		}
	}
}

impl fmt::Display for ContentType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ContentType::Stylesheet => "stylesheet",
			ContentType::Script => "script",
			ContentType::Document => "document",
			ContentType::Other => "other",
		})
	}
}

/// MIME type without parameters, lowercased.
pub fn essence(mime: &str) -> String {
	mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// MIME type served for a file, by extension.
pub fn mime_from_path(path: &Path) -> &'static str {
	let ext = path
		.extension()
		.and_then(|e| e.to_str())
		.map(str::to_ascii_lowercase);
	match ext.as_deref() {
		Some("html") | Some("htm") => "text/html; charset=utf-8",
		Some("css") => "text/css; charset=utf-8",
		Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
		Some("json") | Some("map") => "application/json; charset=utf-8",
		Some("png") => "image/png",
		Some("jpg") | Some("jpeg") => "image/jpeg",
		Some("gif") => "image/gif",
		Some("svg") => "image/svg+xml",
		Some("webp") => "image/webp",
		Some("ico") => "image/x-icon",
		Some("woff") => "font/woff",
		Some("woff2") => "font/woff2",
		Some("ttf") => "font/ttf",
		Some("otf") => "font/otf",
		Some("xml") => "application/xml",
		Some("txt") => "text/plain; charset=utf-8",
		Some("md") => "text/markdown; charset=utf-8",
		Some("wasm") => "application/wasm",
		_ => "application/octet-stream",
	}
}
