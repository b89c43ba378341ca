//! Subcommand handlers. Each returns the process exit code.

use super::commands::{ConfigArgs, FixArgs, HealthArgs, ListArgs, OutputFormatArg, SelectionArgs};
use super::output::{HealthStatus, OutputFormat, OutputFormatter};
use crate::config::FormatConfig;
use crate::environment::{check_docker, DockerEnvironmentFactory};
use crate::error::PipelineError;
use crate::pipeline::FormatPipeline;
use crate::selection::select_files;
use std::sync::Arc;
use tracing::{debug, error};

/// Effective configuration: `FMTBOX_*` defaults with the selection flags on
/// top.
pub fn build_config(selection: &SelectionArgs) -> FormatConfig {
    let mut config = FormatConfig::default();
    if let Some(path) = &selection.path {
        config.root = path.clone();
    }
    if !selection.include.is_empty() {
        config.include = Some(selection.include.clone());
    }
    config.exclude = selection.exclude.clone();
    config
}

pub async fn handle_fix(args: &FixArgs, quiet: bool) -> i32 {
    let formatter = OutputFormatter::new(args.format.into());

    let mut config = build_config(&args.selection);
    if let Some(image) = &args.image {
        config.image = image.clone();
    }
    if let Some(version) = &args.npm_version {
        config.npm_version = version.clone();
    }
    if let Some(version) = &args.prettier_version {
        config.prettier_version = version.clone();
    }
    if args.snapshot_steps {
        config.snapshot_steps = true;
    }
    debug!(?config, "Effective configuration");

    if let Err(e) = config.validate() {
        return report_failure(&formatter, &PipelineError::from(e));
    }

    let factory = match DockerEnvironmentFactory::connect() {
        Ok(factory) => factory.with_keep_snapshots(args.keep_snapshots),
        Err(e) => {
            let failure = PipelineError::Provisioning {
                image: config.image.clone(),
                message: format!("{:#}", e),
            };
            return report_failure(&formatter, &failure);
        }
    };

    match FormatPipeline::new(Arc::new(factory), config).run().await {
        Ok(report) => {
            if quiet && args.format == OutputFormatArg::Human {
                return 0;
            }
            match formatter.format_report(&report) {
                Ok(output) => {
                    print!("{}", ensure_newline(output));
                    0
                }
                Err(e) => {
                    error!("Failed to format report: {:#}", e);
                    1
                }
            }
        }
        Err(e) => report_failure(&formatter, &e),
    }
}

pub fn handle_list(args: &ListArgs) -> i32 {
    let formatter = OutputFormatter::new(args.format.into());
    let config = build_config(&args.selection);

    let selected = config
        .file_selection()
        .map_err(PipelineError::from)
        .and_then(|selection| select_files(&selection));

    match selected {
        Ok(files) => match formatter.format_selection(&files) {
            Ok(output) => {
                print!("{}", ensure_newline(output));
                0
            }
            Err(e) => {
                error!("Failed to format selection: {:#}", e);
                1
            }
        },
        Err(e) => report_failure(&formatter, &e),
    }
}

pub fn handle_config(args: &ConfigArgs) -> i32 {
    let formatter = OutputFormatter::new(args.format.into());
    let config = FormatConfig::default();

    match formatter.format_config(&config) {
        Ok(output) => {
            print!("{}", ensure_newline(output));
            if let Err(e) = config.validate() {
                eprintln!("Warning: {}", e);
                return 1;
            }
            0
        }
        Err(e) => {
            error!("Failed to format configuration: {:#}", e);
            1
        }
    }
}

pub async fn handle_health(args: &HealthArgs) -> i32 {
    let formatter = OutputFormatter::new(args.format.into());

    let status = match check_docker().await {
        Ok(Some(api_version)) => HealthStatus {
            backend: "docker".to_string(),
            available: true,
            api_version: Some(api_version),
            error: None,
        },
        Ok(None) => HealthStatus {
            backend: "docker".to_string(),
            available: false,
            api_version: None,
            error: Some("Docker daemon is not reachable".to_string()),
        },
        Err(e) => HealthStatus {
            backend: "docker".to_string(),
            available: false,
            api_version: None,
            error: Some(format!("{:#}", e)),
        },
    };

    match formatter.format_health(&status) {
        Ok(output) => print!("{}", ensure_newline(output)),
        Err(e) => {
            error!("Failed to format health status: {:#}", e);
            return 1;
        }
    }

    if status.available {
        0
    } else {
        1
    }
}

fn report_failure(formatter: &OutputFormatter, failure: &PipelineError) -> i32 {
    match formatter.format_failure(failure) {
        Ok(output) => eprint!("{}", ensure_newline(output)),
        Err(e) => error!("Failed to format error: {:#}", e),
    }
    failure.exit_code()
}

fn ensure_newline(mut output: String) -> String {
    if !output.ends_with('\n') {
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::PathBuf;

    #[test]
    #[serial]
    fn test_build_config_applies_selection_flags() {
        let selection = SelectionArgs {
            path: Some(PathBuf::from("/tmp/repo")),
            include: vec!["**/*.yaml".to_string()],
            exclude: vec!["fixtures".to_string()],
        };

        let config = build_config(&selection);
        assert_eq!(config.root, PathBuf::from("/tmp/repo"));
        assert_eq!(config.include, Some(vec!["**/*.yaml".to_string()]));
        assert_eq!(config.exclude, vec!["fixtures".to_string()]);
    }

    #[test]
    #[serial]
    fn test_build_config_keeps_profile_includes_by_default() {
        let selection = SelectionArgs {
            path: None,
            include: Vec::new(),
            exclude: Vec::new(),
        };
        let config = build_config(&selection);
        assert!(config.include.is_none());
    }

    #[test]
    fn test_ensure_newline() {
        assert_eq!(ensure_newline("a".to_string()), "a\n");
        assert_eq!(ensure_newline("a\n".to_string()), "a\n");
    }

    #[test]
    fn test_json_format_conversion() {
        let format: OutputFormat = OutputFormatArg::Json.into();
        assert_eq!(format, OutputFormat::Json);
    }
}
