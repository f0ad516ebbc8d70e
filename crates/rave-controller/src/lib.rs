//! Rave Controller
//!
//! Runs a beat clock and a fixture broadcast server in one process, driven
//! by operator keys on stdin.
//!
//! # Example
//!
//! ```no_run
//! use rave_controller::{Controller, ControllerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = Controller::new(ControllerConfig::default()).await?;
//!     controller.control_handle().start();
//!     controller.run().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod control;
pub mod controller;
pub mod error;

pub use cli::Args;
pub use config::{ColorSpec, ControllerConfig, ShowConfig, ShowFile};
pub use controller::{Controller, RunSummary};
pub use error::{Error, Result};
