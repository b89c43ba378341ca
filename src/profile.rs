//! Formatter profiles
//!
//! A profile pins everything the pipeline needs to know about one formatter:
//! the base image, the setup steps that install the toolchain, the files the
//! tool cares about, where they are staged, and how the tool is invoked.

use crate::environment::CommandStep;
use serde::Serialize;

pub const DEFAULT_NODE_IMAGE: &str = "node:18.18.0-slim";
pub const DEFAULT_NPM_VERSION: &str = "10.1.0";
pub const DEFAULT_PRETTIER_VERSION: &str = "2.8.1";
pub const DEFAULT_WORKING_PATH: &str = "/src";

/// Files prettier formats in this pipeline: YAML and JSON documents plus the
/// npm manifests.
pub const PRETTIER_INCLUDES: &[&str] = &[
    "**/*.yaml",
    "**/*.yml",
    "**/*.json",
    "package.json",
    "package-lock.json",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatterProfile {
    pub name: String,
    pub image: String,
    pub setup: Vec<CommandStep>,
    pub include: Vec<String>,
    pub working_path: String,
    pub command: CommandStep,
}

impl FormatterProfile {
    /// Prettier on a slim Node image, with npm and prettier pinned.
    pub fn prettier(image: &str, npm_version: &str, prettier_version: &str) -> Self {
        Self {
            name: "prettier".to_string(),
            image: image.to_string(),
            setup: vec![
                CommandStep::shell(["apt-get update", "apt-get install -y bash"])
                    .with_name("Install bash"),
                CommandStep::exec(["npm", "install", "-g"])
                    .append(format!("npm@{}", npm_version))
                    .with_name(format!("Install npm@{}", npm_version)),
                CommandStep::exec(["npm", "install", "-g"])
                    .append(format!("prettier@{}", prettier_version))
                    .with_name(format!("Install prettier@{}", prettier_version)),
            ],
            include: PRETTIER_INCLUDES.iter().map(|s| s.to_string()).collect(),
            working_path: DEFAULT_WORKING_PATH.to_string(),
            command: CommandStep::exec(["prettier", "--write", "."])
                .with_workdir(DEFAULT_WORKING_PATH)
                .with_name("Run prettier"),
        }
    }
}

impl Default for FormatterProfile {
    fn default() -> Self {
        Self::prettier(
            DEFAULT_NODE_IMAGE,
            DEFAULT_NPM_VERSION,
            DEFAULT_PRETTIER_VERSION,
        )
    }
}
