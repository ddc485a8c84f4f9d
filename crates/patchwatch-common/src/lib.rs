//! Patchwatch Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared infrastructure for the patchwatch workspace members.
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` environment
//!   variables (console/file output, text/JSON format, daily rotation).
//!
//! # Example
//!
//! ```no_run
//! use patchwatch_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LoggingGuard};
