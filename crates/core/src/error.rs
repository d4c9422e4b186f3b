//! Error types for the dev server engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::registry::IdentityKind;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the registry, executors, dispatcher and server.
///
/// Only [`Error::Transport`] and [`Error::SessionLost`] end a session; the
/// rest concern a single resource or change.
#[derive(Debug, Error)]
pub enum Error {
	/// No runtime identity is recorded for the URL in the current generation.
	#[error("no {kind} identity recorded for {url}")]
	IdentityNotFound { url: String, kind: IdentityKind },

	/// Content failed syntax validation before any protocol call.
	#[error("validation failed: {0}")]
	ValidationFailed(String),

	/// The browser answered a patch command with an error.
	#[error("{method} rejected ({code}): {message}")]
	ProtocolRejected { method: String, code: i64, message: String },

	/// The VM refused the new script source (compile error, active generator, ...).
	#[error("script source rejected: {0}")]
	ScriptRejected(String),

	/// The browser replied with something that could not be understood.
	#[error("unexpected protocol reply: {0}")]
	Protocol(String),

	/// The debugging connection failed; the session is unusable.
	#[error("transport failure: {0}")]
	Transport(#[source] hr_runtime::Error),

	/// The page's debugging session ended.
	#[error("session lost: {0}")]
	SessionLost(String),

	/// File watching could not be set up.
	#[error("failed to watch {path}: {source}")]
	Watch {
		path: PathBuf,
		#[source]
		source: notify::Error,
	},

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl Error {
	/// Returns true if the session can no longer be used after this error.
	pub fn is_transport(&self) -> bool {
		matches!(self, Error::Transport(_) | Error::SessionLost(_))
	}
}

impl From<hr_runtime::Error> for Error {
	fn from(err: hr_runtime::Error) -> Self {
		if err.is_transport() {
			return Error::Transport(err);
		}
		match err {
			hr_runtime::Error::Remote { method, code, message } => Error::ProtocolRejected { method, code, message },
			other => Error::Protocol(other.to_string()),
		}
	}
}
