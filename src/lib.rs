//! fmtbox - ephemeral containerized formatting pipeline
//!
//! fmtbox provisions a short-lived container from a pinned base image,
//! installs a pinned formatter into it, stages a filtered subset of a host
//! tree, runs the formatter there and writes the results back onto the host.
//!
//! # Example Usage
//!
//! ```no_run
//! use fmtbox::{DockerEnvironmentFactory, FormatConfig, FormatPipeline};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let factory = Arc::new(DockerEnvironmentFactory::connect()?);
//! let config = FormatConfig::with_root("/path/to/repo");
//!
//! let report = FormatPipeline::new(factory, config).run().await?;
//! println!("{} files changed", report.export.changed().count());
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`selection`]: include/exclude globs and the host file walk
//! - [`environment`]: sandbox backends and the persistent step chain
//! - [`pipeline`]: the stage orchestrator and its state machine
//! - [`profile`]: pinned formatter profiles

pub mod cli;
pub mod config;
pub mod environment;
pub mod error;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod selection;
pub mod util;

pub use config::{ConfigError, FormatConfig};
pub use environment::{
    CommandStep, DockerEnvironmentFactory, EnvironmentFactory, ExecOutput, ExecutionEnvironment,
    MockEnvironmentFactory, Sandbox, StepChain,
};
pub use error::{PipelineError, Stage};
pub use pipeline::{
    ExportResult, ExportStatus, ExportedFile, FormatPipeline, PipelineReport, PipelineState,
};
pub use profile::FormatterProfile;
pub use progress::{LoggingHandler, NoOpHandler, ProgressEvent, ProgressHandler};
pub use selection::{select_files, FileSelection, DEFAULT_EXCLUDES};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
