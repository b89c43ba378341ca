use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Ephemeral containerized formatter
#[derive(Parser, Debug)]
#[command(
    name = "fmtbox",
    about = "Format files inside a throwaway container and write the results back",
    version,
    author,
    long_about = "fmtbox provisions a short-lived container with pinned tool versions, \
                  stages the selected files into it, runs the formatter there and copies \
                  the formatted files back onto the host."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Format files in a container and write them back",
        long_about = "Runs the full pipeline: select files, provision the container, stage, \
                      run the formatter and export the results onto the host.\n\n\
                      Examples:\n  \
                      fmtbox fix\n  \
                      fmtbox fix /path/to/repo\n  \
                      fmtbox fix --exclude 'fixtures' --format json"
    )]
    Fix(FixArgs),

    #[command(
        about = "List the files a run would format",
        long_about = "Runs only file selection and prints the result. No container is created."
    )]
    List(ListArgs),

    #[command(about = "Show the effective configuration")]
    Config(ConfigArgs),

    #[command(about = "Check that the Docker daemon is reachable")]
    Health(HealthArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    #[arg(
        value_name = "PATH",
        help = "Root directory to format (defaults to current directory)"
    )]
    pub path: Option<PathBuf>,

    #[arg(
        long = "include",
        value_name = "GLOB",
        help = "Include glob; replaces the built-in includes (repeatable)"
    )]
    pub include: Vec<String>,

    #[arg(
        long = "exclude",
        value_name = "GLOB",
        help = "Additional exclude glob (repeatable)"
    )]
    pub exclude: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FixArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    #[arg(long, value_name = "IMAGE", help = "Base image to provision from")]
    pub image: Option<String>,

    #[arg(long, value_name = "VERSION", help = "npm version to install")]
    pub npm_version: Option<String>,

    #[arg(long, value_name = "VERSION", help = "prettier version to install")]
    pub prettier_version: Option<String>,

    #[arg(long, help = "Commit the container after every step")]
    pub snapshot_steps: bool,

    #[arg(
        long,
        help = "Keep step snapshot images after the run instead of removing them"
    )]
    pub keep_snapshots: bool,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Args, Debug, Clone)]
pub struct HealthArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
