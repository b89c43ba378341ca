use fmtbox::cli::commands::{CliArgs, Commands};
use fmtbox::cli::handlers::{handle_config, handle_fix, handle_health, handle_list};
use fmtbox::util::logging::{init_logging, parse_level, LoggingConfig};
use fmtbox::VERSION;

use clap::Parser;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("fmtbox v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Fix(fix_args) => handle_fix(fix_args, args.quiet).await,
        Commands::List(list_args) => handle_list(list_args),
        Commands::Config(config_args) => handle_config(config_args),
        Commands::Health(health_args) => handle_health(health_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let mut config = LoggingConfig::from_env();
    if let Some(level_str) = &args.log_level {
        config.level = parse_level(level_str);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }
    init_logging(config);
}
