// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for agent test discovery and runs.
//!
//! The main structure in this module is [`AgentTestConfig`].

use crate::errors::{ConfigParseError, ConfigParseErrorKind};
use camino::Utf8Path;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeSet, time::Duration};
use tracing::warn;

/// Overall configuration for agent tests.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AgentTestConfig {
    discovery: DiscoveryConfig,
    run: RunConfig,
}

impl AgentTestConfig {
    /// The location of the config within a workspace: `.config/agent-tests.toml`.
    pub const CONFIG_PATH: &'static str = ".config/agent-tests.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from the given file, or if not specified from `.config/agent-tests.toml`
    /// in the workspace root.
    ///
    /// If the file isn't specified and the workspace doesn't have `.config/agent-tests.toml`, uses
    /// the default config options. Unknown keys are logged as warnings.
    pub fn from_sources(
        workspace_root: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (config, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        if !unknown.is_empty() {
            let keys = unknown.into_iter().collect::<Vec<_>>().join(", ");
            warn!("in config file {config_file}, ignoring unknown configuration keys: {keys}");
        }

        Ok(config)
    }

    /// Returns the discovery configuration.
    pub fn discovery(&self) -> &DiscoveryConfig {
        &self.discovery
    }

    /// Returns the run configuration.
    pub fn run(&self) -> &RunConfig {
        &self.run
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(Self, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: AgentTestConfig =
            serde_path_to_error::deserialize(ignored_de).map_err(|error| {
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

impl Default for AgentTestConfig {
    fn default() -> Self {
        let builder = Self::make_default_config();
        let (config, _) = Self::build_and_deserialize_config(&builder)
            .expect("default config should be valid");
        config
    }
}

/// Settings for finding test definition and test-set files.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscoveryConfig {
    /// A glob, relative to the workspace root, matching test definition files.
    pub definition_pattern: String,

    /// Appended to a definition's test set name to find its test-set file.
    pub test_set_suffix: String,

    /// Directory names that are never searched.
    #[serde(default)]
    pub ignore_dirs: Vec<String>,
}

impl DiscoveryConfig {
    /// Returns the file name of the test-set file for the given test set name.
    pub fn test_set_file_name(&self, test_set_name: &str) -> String {
        format!("{test_set_name}{}", self.test_set_suffix)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        AgentTestConfig::default().discovery
    }
}

/// Settings for remote runs.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// The overall time to wait for a run to reach a terminal status.
    #[serde(with = "humantime_serde")]
    pub poll_timeout: Duration,

    /// Whether to bring the log sink to the front when a run starts.
    #[serde(default)]
    pub show_log_on_run: bool,
}
