use std::path::PathBuf;

use clap::Parser;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use hr_runtime::LaunchOptions;
use url::Url;

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 800;

#[derive(Parser, Debug)]
#[command(name = "hrserve")]
#[command(about = "Serve a directory to a browser and live-patch CSS, JS and HTML on save")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Directory to serve
	#[arg(default_value = ".")]
	pub dir: PathBuf,

	/// URL the page is opened at; requests under its directory are served from DIR
	#[arg(long, value_name = "URL", default_value = "http://localhost:8080/")]
	pub url: Url,

	/// Open DevTools for the page
	#[arg(short, long)]
	pub devtools: bool,

	/// Increase verbosity (-v debug, -vv trace)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Browser window width
	#[arg(short, long, value_name = "PX")]
	pub width: Option<u32>,

	/// Browser window height
	#[arg(short = 'H', long, value_name = "PX")]
	pub height: Option<u32>,

	/// Run the browser without a window
	#[arg(long)]
	pub headless: bool,

	/// Browser executable (Chrome, Chromium, Edge, Brave)
	#[arg(long, value_name = "PATH", env = "HRSERVE_CHROME")]
	pub chrome: Option<PathBuf>,
}

fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default().bold())
		.placeholder(AnsiColor::Cyan.on_default())
		.error(AnsiColor::Red.on_default().bold())
}

impl Cli {
	/// Window size, filling in whichever dimension was left out.
	pub fn window_size(&self) -> Option<(u32, u32)> {
		match (self.width, self.height) {
			(None, None) => None,
			(w, h) => Some((w.unwrap_or(DEFAULT_WIDTH), h.unwrap_or(DEFAULT_HEIGHT))),
		}
	}

	pub fn launch_options(&self) -> LaunchOptions {
		LaunchOptions {
			executable: self.chrome.clone(),
			headless: self.headless,
			devtools: self.devtools,
			window_size: self.window_size(),
			..LaunchOptions::default()
		}
	}
}
