// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by agent-test-runner.

use crate::tree::NodeId;
use agent_test_metadata::{RunId, RunStatus};
use camino::{Utf8Path, Utf8PathBuf};
use config::ConfigError;
use semver::Version;
use std::{error, fmt, path::PathBuf, time::Duration};
use thiserror::Error;

/// A boxed error returned by an external collaborator.
pub type BoxedError = Box<dyn error::Error + Send + Sync>;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse agent test config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing the config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error that occurred while discovering or reading test definitions.
///
/// Errors for individual files are collected and reported without aborting the scan. Only
/// [`DiscoveryError::WalkWorkspace`] for the workspace root, an invalid file pattern, or a failed
/// discovery task fail a refresh as a whole.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// An error occurred while walking the workspace.
    #[error("failed to walk workspace at `{root}`")]
    WalkWorkspace {
        /// The workspace root.
        root: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A configured file pattern is not a valid glob.
    #[error("invalid file pattern `{pattern}`")]
    InvalidPattern {
        /// The pattern that failed to compile.
        pattern: String,

        /// The underlying error.
        #[source]
        error: globset::Error,
    },

    /// A file could not be read.
    #[error("failed to read `{path}`")]
    ReadFile {
        /// The file that could not be read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A discovered path is not valid UTF-8.
    #[error("path `{}` is not valid UTF-8", .path.display())]
    NonUtf8Path {
        /// The path.
        path: PathBuf,
    },

    /// A file could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseDefinitionError),

    /// The background discovery task failed.
    #[error("test discovery task failed")]
    TaskFailed(#[source] tokio::task::JoinError),
}

/// An error that occurred while parsing a definition or test-set file.
#[derive(Debug, Error)]
#[error("failed to parse `{path}`")]
pub struct ParseDefinitionError {
    path: Utf8PathBuf,
    #[source]
    kind: ParseDefinitionErrorKind,
}

impl ParseDefinitionError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, kind: ParseDefinitionErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Returns the path of the file that failed to parse.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ParseDefinitionErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a definition or test-set file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseDefinitionErrorKind {
    /// The XML was malformed.
    #[error("malformed XML at byte {position}")]
    Xml {
        /// The byte position at which the error was detected.
        position: u64,

        /// The underlying error.
        #[source]
        error: quick_xml::Error,
    },

    /// The document did not contain any elements.
    #[error("document has no root element")]
    MissingRoot,

    /// The document ended while an element was still open.
    #[error("document ended inside element `{name}`")]
    UnclosedElement {
        /// The name of the innermost open element.
        name: String,
    },

    /// The root element wasn't the expected one.
    #[error("unexpected root element `{actual}` (expected `{expected}`)")]
    UnexpectedRoot {
        /// The expected root element.
        expected: &'static str,

        /// The actual root element.
        actual: String,
    },
}

/// An error that occurs when no target org connection can be resolved.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// No target org is configured.
    #[error("no target org is configured (set one with `sf config set target-org`)")]
    NoTargetOrg,

    /// A target org is configured, but a connection to it could not be established.
    #[error("failed to connect to target org `{target_org}`: {message}")]
    Connection {
        /// The configured target org.
        target_org: String,

        /// A description of the failure.
        message: String,
    },
}

/// An error that occurs while starting a remote run.
#[derive(Debug, Error)]
#[error("failed to start agent test run for `{group_name}`")]
pub struct RemoteStartError {
    group_name: String,
    #[source]
    error: BoxedError,
}

impl RemoteStartError {
    /// Creates a new `RemoteStartError`.
    pub fn new(group_name: impl Into<String>, error: impl Into<BoxedError>) -> Self {
        Self {
            group_name: group_name.into(),
            error: error.into(),
        }
    }

    /// Returns the name of the group that failed to start.
    pub fn group_name(&self) -> &str {
        &self.group_name
    }
}

/// An error that occurs while polling a remote run to completion.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteJobError {
    /// The run reached a terminal status other than `COMPLETED`.
    #[error("run `{run_id}` finished with status {status}")]
    Unsuccessful {
        /// The run.
        run_id: RunId,

        /// The terminal status.
        status: RunStatus,

        /// The service's message, if any.
        message: Option<String>,

        /// The number of cases that passed before the run ended.
        passed: usize,

        /// The number of cases that failed before the run ended.
        failed: usize,
    },

    /// The run did not reach a terminal status in time.
    #[error("run `{run_id}` did not finish within {}", humantime::format_duration(*.timeout))]
    TimedOut {
        /// The run.
        run_id: RunId,

        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The stream of updates ended without a terminal status.
    #[error("updates for run `{run_id}` ended before the run finished")]
    StreamEnded {
        /// The run.
        run_id: RunId,
    },

    /// Polling failed.
    #[error("failed to poll run `{run_id}`")]
    Transport {
        /// The run.
        run_id: RunId,

        /// The underlying error.
        #[source]
        error: BoxedError,
    },
}

impl RemoteJobError {
    /// Creates a [`RemoteJobError::Transport`] error.
    pub fn transport(run_id: RunId, error: impl Into<BoxedError>) -> Self {
        Self::Transport {
            run_id,
            error: error.into(),
        }
    }
}

/// An error that ends a single run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// The target org could not be resolved.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The run could not be started.
    #[error(transparent)]
    Start(#[from] RemoteStartError),

    /// The run failed while being polled.
    #[error(transparent)]
    Job(#[from] RemoteJobError),
}

/// An error that occurs while checking the host's core extension.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HostVersionError {
    /// The core extension isn't installed.
    #[error("core extension `{extension_id}` not found")]
    NotFound {
        /// The extension that was looked up.
        extension_id: &'static str,
    },

    /// The core extension reported a version that isn't valid semver.
    #[error("core extension version `{version}` is invalid")]
    Invalid {
        /// The reported version.
        version: String,

        /// The underlying error.
        #[source]
        error: semver::Error,
    },

    /// The core extension is too old.
    #[error(
        "core extension version {actual} is older than the minimum required version {required}; \
         update the extension pack and try again"
    )]
    TooOld {
        /// The installed version.
        actual: Version,

        /// The minimum supported version.
        required: Version,
    },
}

/// An error that occurs while activating the extension.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ActivationError {
    /// The host's core extension is missing or unsupported.
    #[error("failed to initialize")]
    HostVersion(#[from] HostVersionError),

    /// The configuration could not be read.
    #[error("failed to initialize")]
    Config(#[from] ConfigParseError),
}

/// An error that occurs while opening an agent in the org.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpenAgentError {
    /// The project file could not be read.
    #[error("failed to read project file `{path}`")]
    ReadProject {
        /// The project file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The project file could not be parsed.
    #[error("failed to parse project file `{path}`")]
    ParseProject {
        /// The project file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The project file lists no package directories.
    #[error("project file `{path}` has no package directories")]
    NoPackageDirectory {
        /// The project file.
        path: Utf8PathBuf,
    },

    /// The agents directory could not be listed.
    #[error("failed to list agents in `{dir}`")]
    ListAgents {
        /// The directory that was listed.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The user dismissed the agent prompt.
    #[error("agent must be selected")]
    NoAgentSelected,

    /// The org opener failed.
    #[error("failed to open agent `{agent_name}` in the org")]
    Open {
        /// The agent that was being opened.
        agent_name: String,

        /// The underlying error.
        #[source]
        error: BoxedError,
    },
}

/// An error that occurs while dispatching a command.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommandError {
    /// The command ID isn't registered by this extension.
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    /// The command needs a test node argument.
    #[error("command `{command}` requires a test node")]
    MissingNode {
        /// The command ID.
        command: &'static str,
    },

    /// The node passed to the command is not in the current tree.
    #[error("test node `{0}` not found")]
    NodeNotFound(NodeId),

    /// The extension has been disposed.
    #[error("extension has been disposed")]
    Disposed,

    /// Refreshing the tree failed.
    #[error("failed to refresh agent tests")]
    Refresh(#[source] DiscoveryError),

    /// Opening an agent failed.
    #[error(transparent)]
    OpenAgent(#[from] OpenAgentError),
}

/// Displays an error along with its chain of sources.
pub struct DisplayErrorChain<E> {
    error: E,
    initial_indent: usize,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self {
            error,
            initial_indent: 0,
        }
    }

    /// Creates a new `DisplayErrorChain` with the given indentation.
    pub fn new_with_initial_indent(initial_indent: usize, error: E) -> Self {
        Self {
            error,
            initial_indent,
        }
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = " ".repeat(self.initial_indent);
        write!(f, "{indent}{}", self.error)?;

        let Some(mut source) = self.error.source() else {
            return Ok(());
        };

        write!(f, "\n{indent}  caused by:")?;
        loop {
            write!(f, "\n{indent}  - {source}")?;
            match source.source() {
                Some(next) => source = next,
                None => break,
            }
        }

        Ok(())
    }
}
