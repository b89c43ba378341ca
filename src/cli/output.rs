//! Output formatting for reports, selections, configuration and health checks
//!
//! Every formatter has a JSON form for scripts and a human form for terminals.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::FormatConfig;
use crate::error::PipelineError;
use crate::pipeline::{ExportStatus, PipelineReport};

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// Human-readable formatted text
    Human,
}

/// Container runtime availability, as reported by `fmtbox health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub backend: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_report(&self, report: &PipelineReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")
            }
            OutputFormat::Human => Ok(self.format_report_human(report)),
        }
    }

    pub fn format_failure(&self, error: &PipelineError) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let mut output = serde_json::json!({
                    "error": error.to_string(),
                    "stage": error.stage(),
                    "exit_code": error.exit_code(),
                });
                if let Some(captured) = error.output() {
                    output["output"] = serde_json::to_value(captured)
                        .context("Failed to serialize captured output")?;
                }
                if let PipelineError::Export { result } = error {
                    output["export"] =
                        serde_json::to_value(result).context("Failed to serialize export result")?;
                }
                serde_json::to_string_pretty(&output).context("Failed to serialize error to JSON")
            }
            OutputFormat::Human => Ok(self.format_failure_human(error)),
        }
    }

    pub fn format_selection(&self, files: &[PathBuf]) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(files)
                .context("Failed to serialize selection to JSON"),
            OutputFormat::Human => {
                let mut output = String::new();
                for file in files {
                    output.push_str(&format!("{}\n", file.display()));
                }
                output.push_str(&format!("{} file(s) selected\n", files.len()));
                Ok(output)
            }
        }
    }

    pub fn format_config(&self, config: &FormatConfig) -> Result<String> {
        let map: BTreeMap<String, String> = config.to_display_map().into_iter().collect();
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&map).context("Failed to serialize config to JSON")
            }
            OutputFormat::Human => {
                let mut output = String::from("fmtbox configuration\n\n");
                for (key, value) in &map {
                    output.push_str(&format!("  {:<18} {}\n", key, value));
                }
                Ok(output)
            }
        }
    }

    pub fn format_health(&self, status: &HealthStatus) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(status).context("Failed to serialize health to JSON")
            }
            OutputFormat::Human => {
                let mut output = String::new();
                if status.available {
                    output.push_str(&format!("\u{2713} {} is available", status.backend));
                    if let Some(version) = &status.api_version {
                        output.push_str(&format!(" (API {})", version));
                    }
                    output.push('\n');
                } else {
                    output.push_str(&format!("\u{2717} {} is not available\n", status.backend));
                    if let Some(error) = &status.error {
                        output.push_str(&format!("  {}\n", error));
                    }
                }
                Ok(output)
            }
        }
    }

    fn format_report_human(&self, report: &PipelineReport) -> String {
        let mut output = String::new();

        if report.selected.is_empty() {
            output.push_str(&format!(
                "No files to format under {}\n",
                report.root.display()
            ));
            return output;
        }

        for file in &report.export.files {
            let marker = match &file.status {
                ExportStatus::Written { changed: true } => "formatted",
                ExportStatus::Written { changed: false } => "unchanged",
                ExportStatus::Failed { .. } => "failed",
            };
            output.push_str(&format!("{:<10} {}\n", marker, file.path.display()));
        }

        output.push_str(&format!(
            "\n{} file(s) exported, {} changed in {} ms\n",
            report.export.succeeded().count(),
            report.export.changed().count(),
            report.duration_ms
        ));
        output
    }

    fn format_failure_human(&self, error: &PipelineError) -> String {
        let mut output = match error.stage() {
            Some(stage) => format!("\u{2717} {} failed: {}\n", stage, error),
            None => format!("\u{2717} {}\n", error),
        };

        if let Some(captured) = error.output() {
            if !captured.stdout.trim().is_empty() {
                output.push_str("\nstdout:\n");
                output.push_str(captured.stdout.trim_end());
                output.push('\n');
            }
            if !captured.stderr.trim().is_empty() {
                output.push_str("\nstderr:\n");
                output.push_str(captured.stderr.trim_end());
                output.push('\n');
            }
        }

        if let PipelineError::Export { result } = error {
            for file in result.failed() {
                if let ExportStatus::Failed { error } = &file.status {
                    output.push_str(&format!("  {}: {}\n", file.path.display(), error));
                }
            }
        }
        output
    }
}
