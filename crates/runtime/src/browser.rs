//! Browser process management
//!
//! Locates a Chromium-family executable, launches it with remote debugging on an
//! ephemeral port, and connects to the DevTools endpoint it announces on stderr.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use hr_protocol::{AttachToTarget, CreateTarget};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::session::CdpSession;
use crate::transport::WebSocketTransport;

/// How long to wait for the browser to announce its DevTools endpoint.
pub const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variables consulted for an explicit browser path, in order.
pub const BROWSER_ENV_VARS: [&str; 2] = ["HRSERVE_CHROME", "CHROME_PATH"];

static DEVTOOLS_LINE_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"DevTools listening on (ws://\S+)").unwrap());

/// Options for launching the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
	/// Explicit executable; searched for when `None`
	pub executable: Option<PathBuf>,
	pub headless: bool,
	/// Open DevTools for every tab
	pub devtools: bool,
	/// Window size in CSS pixels (width, height)
	pub window_size: Option<(u32, u32)>,
	/// Profile directory; defaults to [`default_user_data_dir`]
	pub user_data_dir: Option<PathBuf>,
	pub extra_args: Vec<String>,
}

impl Default for LaunchOptions {
	fn default() -> Self {
		Self {
			executable: None,
			headless: false,
			devtools: false,
			window_size: None,
			user_data_dir: None,
			extra_args: Vec::new(),
		}
	}
}

impl LaunchOptions {
	/// Command-line flags passed to the browser.
	pub fn args(&self, user_data_dir: &Path) -> Vec<String> {
		let mut args = vec![
			"--remote-debugging-port=0".to_string(),
			format!("--user-data-dir={}", user_data_dir.display()),
			"--no-first-run".to_string(),
			"--no-default-browser-check".to_string(),
		];

		if let Some((width, height)) = self.window_size {
			args.push(format!("--window-size={width},{height}"));
		}
		if self.devtools {
			args.push("--auto-open-devtools-for-tabs".to_string());
		}
		if self.headless {
			args.push("--headless=new".to_string());
		}
		args.extend(self.extra_args.iter().cloned());
		args.push("about:blank".to_string());
		args
	}
}

/// Profile directory used when none is configured.
pub fn default_user_data_dir() -> PathBuf {
	dirs::cache_dir()
		.unwrap_or_else(std::env::temp_dir)
		.join("hrserve")
		.join("profile")
}

/// Locates the browser executable.
///
/// Checked in order:
/// 1. The explicit path, which must exist
/// 2. `HRSERVE_CHROME`, then `CHROME_PATH`
/// 3. Well-known executable names on `PATH`
/// 4. Well-known install locations
///
/// # Errors
///
/// Returns [`Error::BrowserNotFound`] if no candidate exists.
pub fn find_browser_executable(explicit: Option<&Path>) -> Result<PathBuf> {
	if let Some(path) = explicit {
		if path.exists() {
			return Ok(path.to_path_buf());
		}
		if let Ok(found) = which::which(path) {
			return Ok(found);
		}
		return Err(Error::LaunchFailed(format!(
			"browser executable {} does not exist",
			path.display()
		)));
	}

	for var in BROWSER_ENV_VARS {
		if let Some(value) = std::env::var_os(var).filter(|v| !v.is_empty()) {
			let path = PathBuf::from(value);
			if path.exists() {
				debug!(target = "hr", var, path = %path.display(), "Using browser from environment");
				return Ok(path);
			}
			warn!(target = "hr", var, path = %path.display(), "Browser path from environment does not exist");
		}
	}

	platform_candidates()
		.iter()
		.find_map(|candidate| resolve_candidate(candidate))
		.ok_or(Error::BrowserNotFound)
}

fn platform_candidates() -> &'static [&'static str] {
	if cfg!(target_os = "macos") {
		&[
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
			"/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
			"/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
			"/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
		]
	} else if cfg!(target_os = "windows") {
		&[
			r"C:\Program Files\Google\Chrome\Application\chrome.exe",
			r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
			r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
			r"C:\Program Files\Chromium\Application\chrome.exe",
		]
	} else {
		&[
			"google-chrome-stable",
			"google-chrome",
			"chromium",
			"chromium-browser",
			"brave-browser",
			"microsoft-edge",
			"/usr/bin/google-chrome-stable",
			"/usr/bin/google-chrome",
			"/usr/bin/chromium",
			"/usr/bin/chromium-browser",
			"/snap/bin/chromium",
		]
	}
}

/// Absolute candidates must exist; bare names are looked up on `PATH`.
fn resolve_candidate(candidate: &str) -> Option<PathBuf> {
	let path = Path::new(candidate);
	if path.is_absolute() {
		path.exists().then(|| path.to_path_buf())
	} else {
		which::which(candidate).ok()
	}
}

/// Extracts the browser WebSocket URL from a stderr line.
pub fn parse_devtools_endpoint(line: &str) -> Option<&str> {
	DEVTOOLS_LINE_RE
		.captures(line)
		.and_then(|caps| caps.get(1))
		.map(|m| m.as_str())
}

/// A launched browser and its DevTools connection.
///
/// The browser process is killed when this value is dropped.
pub struct Browser {
	child: Child,
	connection: Arc<Connection>,
	run_handle: JoinHandle<Result<()>>,
}

impl Browser {
	/// Launches the browser and connects to its DevTools endpoint.
	pub async fn launch(options: &LaunchOptions) -> Result<Self> {
		let executable = find_browser_executable(options.executable.as_deref())?;
		let user_data_dir = options.user_data_dir.clone().unwrap_or_else(default_user_data_dir);
		std::fs::create_dir_all(&user_data_dir)?;

		let args = options.args(&user_data_dir);
		info!(target = "hr", executable = %executable.display(), profile = %user_data_dir.display(), "Launching browser");
		debug!(target = "hr", ?args, "Browser arguments");

		let mut child = Command::new(&executable)
			.args(&args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("{}: {e}", executable.display())))?;

		let stderr = child
			.stderr
			.take()
			.ok_or_else(|| Error::LaunchFailed("browser stderr was not captured".to_string()))?;

		let endpoint = match tokio::time::timeout(LAUNCH_TIMEOUT, wait_for_endpoint(stderr)).await {
			Ok(result) => result?,
			Err(_) => {
				return Err(Error::Timeout(format!(
					"browser did not announce a DevTools endpoint within {}s",
					LAUNCH_TIMEOUT.as_secs()
				)));
			}
		};

		let connection = Self::connect(&endpoint).await?;
		let runner = Arc::clone(&connection);
		let run_handle = tokio::spawn(async move { runner.run().await });

		Ok(Self {
			child,
			connection,
			run_handle,
		})
	}

	async fn connect(endpoint: &str) -> Result<Arc<Connection>> {
		let (transport, message_rx) = WebSocketTransport::connect(endpoint).await?;
		Ok(Arc::new(Connection::new(transport.into_transport_parts(message_rx))))
	}

	/// The browser-level connection.
	pub fn connection(&self) -> &Arc<Connection> {
		&self.connection
	}

	/// Opens a blank tab and attaches a flattened session to it.
	pub async fn new_page(&self) -> Result<CdpSession> {
		let browser = CdpSession::browser(Arc::clone(&self.connection));
		let target = browser
			.execute(&CreateTarget {
				url: "about:blank".to_string(),
			})
			.await?;
		let attached = browser
			.execute(&AttachToTarget {
				target_id: target.target_id.clone(),
				flatten: true,
			})
			.await?;
		debug!(target = "hr", target_id = %target.target_id, session_id = %attached.session_id, "Attached to page");
		Ok(CdpSession::new(Arc::clone(&self.connection), attached.session_id))
	}

	/// Kills the browser process and waits for the connection to wind down.
	pub async fn close(mut self) -> Result<()> {
		if let Err(e) = self.child.kill().await {
			warn!(target = "hr", error = %e, "Failed to kill browser process");
		}
		match tokio::time::timeout(Duration::from_secs(5), &mut self.run_handle).await {
			Ok(Ok(result)) => result.or_else(|e| if e.is_transport() { Ok(()) } else { Err(e) }),
			Ok(Err(e)) => Err(Error::TransportError(format!("connection task failed: {e}"))),
			Err(_) => {
				self.run_handle.abort();
				Ok(())
			}
		}
	}
}

/// Reads stderr until the DevTools line appears, then keeps draining it.
async fn wait_for_endpoint(stderr: ChildStderr) -> Result<String> {
	let mut lines = BufReader::new(stderr).lines();
	let mut tail: Vec<String> = Vec::new();

	while let Some(line) = lines.next_line().await? {
		if let Some(endpoint) = parse_devtools_endpoint(&line) {
			let endpoint = endpoint.to_string();
			debug!(target = "hr", %endpoint, "DevTools endpoint announced");
			tokio::spawn(async move {
				while let Ok(Some(line)) = lines.next_line().await {
					trace!(target = "hr", browser = %line);
				}
			});
			return Ok(endpoint);
		}
		trace!(target = "hr", browser = %line);
		if tail.len() == 8 {
			tail.remove(0);
		}
		tail.push(line);
	}

	Err(Error::LaunchFailed(format!(
		"browser exited before announcing a DevTools endpoint: {}",
		tail.join(" | ")
	)))
}

#[cfg(test)]
mod tests {
	use std::fs;

	use tempfile::TempDir;

	use super::*;

	#[test]
	fn test_parse_devtools_endpoint() {
		let line = "DevTools listening on ws://127.0.0.1:38241/devtools/browser/4b1c-90ab";
		assert_eq!(
			parse_devtools_endpoint(line),
			Some("ws://127.0.0.1:38241/devtools/browser/4b1c-90ab")
		);
	}

	#[test]
	fn test_parse_devtools_endpoint_ignores_noise() {
		assert_eq!(
			parse_devtools_endpoint("[1017/101010.123:ERROR:gpu_init.cc(523)] Passthrough is not supported"),
			None
		);
		assert_eq!(parse_devtools_endpoint("DevTools listening on "), None);
	}

	#[test]
	fn test_args_defaults() {
		let args = LaunchOptions::default().args(Path::new("/tmp/profile"));
		assert_eq!(args[0], "--remote-debugging-port=0");
		assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
		assert!(!args.iter().any(|a| a.starts_with("--headless")));
		assert!(!args.iter().any(|a| a.starts_with("--window-size")));
		assert_eq!(args.last().map(String::as_str), Some("about:blank"));
	}

	#[test]
	fn test_args_with_options() {
		let options = LaunchOptions {
			headless: true,
			devtools: true,
			window_size: Some((1280, 800)),
			extra_args: vec!["--mute-audio".to_string()],
			..Default::default()
		};
		let args = options.args(Path::new("/tmp/profile"));
		assert!(args.contains(&"--window-size=1280,800".to_string()));
		assert!(args.contains(&"--auto-open-devtools-for-tabs".to_string()));
		assert!(args.contains(&"--headless=new".to_string()));
		assert!(args.contains(&"--mute-audio".to_string()));
	}

	#[test]
	fn test_explicit_executable_must_exist() {
		let temp = TempDir::new().unwrap();
		let missing = temp.path().join("no-such-chrome");
		assert!(matches!(
			find_browser_executable(Some(&missing)),
			Err(Error::LaunchFailed(_))
		));

		let present = temp.path().join("chrome");
		fs::write(&present, "").unwrap();
		assert_eq!(find_browser_executable(Some(&present)).unwrap(), present);
	}

	#[test]
	fn test_resolve_candidate_absolute_path() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("chromium");
		assert_eq!(resolve_candidate(path.to_str().unwrap()), None);
		fs::write(&path, "").unwrap();
		assert_eq!(resolve_candidate(path.to_str().unwrap()), Some(path));
	}

	#[test]
	fn test_default_user_data_dir() {
		let dir = default_user_data_dir();
		assert!(dir.ends_with("hrserve/profile"));
	}
}
