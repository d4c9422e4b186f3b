//! hr: live-patching engine behind `hrserve`
//!
//! Serves a directory to a browser page over the DevTools protocol and, when a
//! served file changes, pushes the new content into the running page instead
//! of reloading it: stylesheets are replaced, scripts are hot-swapped in the
//! VM, documents have their DOM rewritten.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use hr::{DevServer, NotifyWatchService, ServeConfig};
//! use hr_runtime::{Browser, LaunchOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let browser = Browser::launch(&LaunchOptions::default()).await?;
//!     let page = browser.new_page().await?;
//!
//!     let config = ServeConfig::new("./site", "http://localhost:8080/".parse()?)?;
//!     let server = DevServer::new(Arc::new(page), config, Arc::new(NotifyWatchService::new()?));
//!     let _log = server.on_patch(|event| async move {
//!         println!("{}: {}", event.url, event.report.result);
//!         Ok(())
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod content_type;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod patch;
pub mod registry;
pub mod serve;
pub mod server;
pub mod state;
pub mod watch;

#[cfg(test)]
mod testing;

pub use content_type::{ContentType, mime_from_path};
pub use dispatcher::{BindOutcome, Dispatcher, PatchEvent, SessionSignal};
pub use error::{Error, Result};
pub use handlers::Subscription;
pub use patch::{NotificationOutcome, PatchExecutor, PatchReport, PatchResult, SkipReason};
pub use registry::{IdentityKind, IdentityRegistry, RuntimeIdentity, ScriptIdentity, StylesheetIdentity};
pub use serve::{ResourceServer, Resolution, ServeConfig, is_main_document};
pub use server::DevServer;
pub use state::{Resource, SessionState};
pub use watch::{NotifyWatchService, WatchService};
