mod cli;
mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hr::{DevServer, NotifyWatchService, ServeConfig};
use hr_runtime::Browser;
use tracing::{info, warn};

use crate::cli::Cli;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = run(cli).await {
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> Result<()> {
	let config = ServeConfig::new(&cli.dir, cli.url.clone())
		.with_context(|| format!("cannot serve directory {}", cli.dir.display()))?;
	let watcher = NotifyWatchService::new().context("failed to start file watcher")?;

	let browser = Browser::launch(&cli.launch_options())
		.await
		.context("failed to launch browser")?;
	let page = match browser.new_page().await {
		Ok(page) => page,
		Err(e) => {
			let _ = browser.close().await;
			return Err(e).context("failed to open page");
		}
	};

	let server = DevServer::new(Arc::new(page), config, Arc::new(watcher));
	let outcome = tokio::select! {
		result = server.run() => match result {
			Err(hr::Error::SessionLost(reason)) => {
				info!(target = "hrserve", %reason, "Page closed");
				Ok(())
			}
			other => other.context("page session failed"),
		},
		signal = tokio::signal::ctrl_c() => signal.context("failed to listen for Ctrl-C").map(|()| {
			info!(target = "hrserve", "Shutting down");
		}),
	};

	if let Err(e) = browser.close().await {
		warn!(target = "hrserve", error = %e, "Browser did not shut down cleanly");
	}
	outcome
}
