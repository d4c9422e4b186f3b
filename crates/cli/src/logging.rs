use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Filter used when `RUST_LOG` is unset.
fn default_filter(verbosity: u8) -> &'static str {
	// 0 = patch results and warnings only
	// 1 (-v) = serving, watching, protocol setup
	// 2+ (-vv) = every protocol message
	match verbosity {
		0 => "warn,hr=info,hrserve=info",
		1 => "info,hr=debug,hrserve=debug",
		_ => "debug,hr=trace,hrserve=trace",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(false)
		.with_level(true)
		.compact()
		.init();
}
