pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, ConfigArgs, FixArgs, HealthArgs, ListArgs, SelectionArgs};
pub use output::{HealthStatus, OutputFormat, OutputFormatter};
