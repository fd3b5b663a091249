// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The extension context.
//!
//! [`AgentTestExtension`] is created once per host session by [`AgentTestExtension::activate`]. It
//! owns the outline provider and the runner, and routes host commands to them.

use crate::{
    config::AgentTestConfig,
    errors::{ActivationError, CommandError, DisplayErrorChain, HostVersionError, OpenAgentError},
    host::{Disposable, LogSink, OrgOpener, UiHost},
    outline::{RefreshSummary, TestOutlineProvider},
    runner::{AgentTestRunner, AgentTestRunnerBuilder, AgentTestService, ConnectionResolver, RunOutcome},
    tree::NodeId,
};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use semver::Version;
use serde::Deserialize;
use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, info, warn};

/// The ID of the core extension this extension depends on.
pub const CORE_EXTENSION_ID: &str = "salesforce.salesforcedx-vscode-core";

/// The oldest supported version of the core extension.
pub const MINIMUM_CORE_VERSION: Version = Version::new(60, 13, 0);

/// The project file at the root of the workspace.
pub const PROJECT_FILE: &str = "sfdx-project.json";

/// A command contributed by this extension.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Command {
    /// Rescans the workspace.
    Refresh,

    /// Runs the group a node belongs to.
    RunTest,

    /// Runs every group.
    RunAll,

    /// Reveals a node's definition.
    GoToDefinition,

    /// Collapses every node in the view.
    CollapseAll,

    /// Opens an agent in the target org.
    OpenAgentInOrg,
}

impl Command {
    /// All commands, in registration order.
    pub const ALL: [Command; 6] = [
        Command::Refresh,
        Command::RunTest,
        Command::RunAll,
        Command::GoToDefinition,
        Command::CollapseAll,
        Command::OpenAgentInOrg,
    ];

    /// Returns the ID the host knows this command by.
    pub fn id(self) -> &'static str {
        match self {
            Command::Refresh => "sf.agent.test.view.refresh",
            Command::RunTest => "sf.agent.test.view.runTest",
            Command::RunAll => "sf.agent.test.view.runAll",
            Command::GoToDefinition => "sf.agent.test.view.goToDefinition",
            Command::CollapseAll => "sf.agent.test.view.collapseAll",
            Command::OpenAgentInOrg => "sf.agent.openAgentInOrg",
        }
    }

    /// Looks up a command by ID.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.id() == id)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// The collaborators the host provides on activation.
#[derive(Clone)]
pub struct ExtensionServices {
    /// Notifications, prompts and command registration.
    pub ui: Arc<dyn UiHost>,

    /// Where run output is written.
    pub log: Arc<dyn LogSink>,

    /// Resolves the target org.
    pub resolver: Arc<dyn ConnectionResolver>,

    /// Creates clients for the remote test service.
    pub service: Arc<dyn AgentTestService>,

    /// Opens agents in the target org.
    pub org_opener: Arc<dyn OrgOpener>,
}

/// What a dispatched command did.
#[derive(Debug)]
pub enum CommandOutput {
    /// The command finished and has nothing to report.
    Done,

    /// The tree was rebuilt.
    Refreshed(RefreshSummary),

    /// One or more groups were run.
    Ran(Vec<(String, RunOutcome)>),

    /// An agent was opened.
    OpenedAgent(String),
}

/// Registrations that are undone when the extension is disposed.
#[derive(Default)]
pub struct CommandRegistry {
    disposables: Vec<Box<dyn Disposable>>,
    disposed: bool,
}

impl CommandRegistry {
    /// Adds a registration. If the registry is already disposed, the registration is disposed
    /// immediately.
    pub fn push(&mut self, mut disposable: Box<dyn Disposable>) {
        if self.disposed {
            disposable.dispose();
        } else {
            self.disposables.push(disposable);
        }
    }

    /// Returns the number of live registrations.
    pub fn len(&self) -> usize {
        self.disposables.len()
    }

    /// Returns true if there are no live registrations.
    pub fn is_empty(&self) -> bool {
        self.disposables.is_empty()
    }

    /// Returns true if [`Self::dispose_all`] has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Disposes every registration, in reverse order. Later calls do nothing.
    pub fn dispose_all(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        while let Some(mut disposable) = self.disposables.pop() {
            disposable.dispose();
        }
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("len", &self.disposables.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}

/// Owns the agent test view and runner for a host session.
#[derive(Debug)]
pub struct AgentTestExtension {
    workspace_root: Utf8PathBuf,
    outline: Arc<TestOutlineProvider>,
    runner: AgentTestRunner,
    ui: DebugIgnore<Arc<dyn UiHost>>,
    log: DebugIgnore<Arc<dyn LogSink>>,
    org_opener: DebugIgnore<Arc<dyn OrgOpener>>,
    registry: Mutex<CommandRegistry>,
}

impl AgentTestExtension {
    /// Activates the extension.
    ///
    /// Checks the core extension's version, creates the outline provider and runner, and
    /// registers every [`Command`] with the host. The tree starts out empty: dispatch
    /// [`Command::Refresh`] to populate it.
    pub fn activate(
        services: ExtensionServices,
        workspace_root: impl Into<Utf8PathBuf>,
        config: &AgentTestConfig,
    ) -> Result<Self, ActivationError> {
        let core_version = check_core_extension_version(
            services.ui.extension_version(CORE_EXTENSION_ID).as_deref(),
        )?;
        debug!("core extension version {core_version}");

        let workspace_root = workspace_root.into();
        let outline = Arc::new(TestOutlineProvider::new(
            workspace_root.clone(),
            config.discovery().clone(),
        ));

        let mut builder = AgentTestRunnerBuilder::default();
        builder
            .set_poll_timeout(config.run().poll_timeout)
            .set_show_log_on_run(config.run().show_log_on_run);
        let runner = builder.build(
            outline.clone(),
            services.resolver,
            services.service,
            services.ui.clone(),
            services.log.clone(),
        );

        let mut registry = CommandRegistry::default();
        for command in Command::ALL {
            registry.push(services.ui.register_command(command.id()));
        }
        info!("activated agent tests for {workspace_root}");

        Ok(Self {
            workspace_root,
            outline,
            runner,
            ui: DebugIgnore(services.ui),
            log: DebugIgnore(services.log),
            org_opener: DebugIgnore(services.org_opener),
            registry: Mutex::new(registry),
        })
    }

    /// Returns the outline provider backing the view.
    pub fn outline(&self) -> &Arc<TestOutlineProvider> {
        &self.outline
    }

    /// Returns the runner.
    pub fn runner(&self) -> &AgentTestRunner {
        &self.runner
    }

    /// Routes a host command to the provider or runner.
    ///
    /// `node` is the tree node the command was invoked on, if any.
    pub async fn dispatch(
        &self,
        command_id: &str,
        node: Option<&NodeId>,
    ) -> Result<CommandOutput, CommandError> {
        if self.lock_registry().is_disposed() {
            return Err(CommandError::Disposed);
        }
        let command = Command::from_id(command_id)
            .ok_or_else(|| CommandError::UnknownCommand(command_id.to_owned()))?;
        debug!("dispatching {command}");

        match command {
            Command::Refresh => self.refresh().await.map(CommandOutput::Refreshed),
            Command::RunTest => {
                let node = node.ok_or(CommandError::MissingNode {
                    command: command.id(),
                })?;
                let group_name = self
                    .outline
                    .with_tree(|tree| {
                        let name = node.group_name()?;
                        tree.group(name).map(|group| group.name().to_owned())
                    })
                    .ok_or_else(|| CommandError::NodeNotFound(node.clone()))?;
                let outcome = self.runner.run_group(&group_name).await;
                Ok(CommandOutput::Ran(vec![(group_name, outcome)]))
            }
            Command::RunAll => Ok(CommandOutput::Ran(self.runner.run_all().await)),
            Command::GoToDefinition => {
                let node = node.ok_or(CommandError::MissingNode {
                    command: command.id(),
                })?;
                self.runner.go_to_test(node)?;
                Ok(CommandOutput::Done)
            }
            Command::CollapseAll => {
                self.outline.collapse_all(&**self.ui);
                Ok(CommandOutput::Done)
            }
            Command::OpenAgentInOrg => match self.open_agent_in_org().await {
                Ok(agent_name) => Ok(CommandOutput::OpenedAgent(agent_name)),
                Err(error) => {
                    self.ui.show_error_message(&error.to_string());
                    Err(error.into())
                }
            },
        }
    }

    /// Rescans the workspace, writing any per-file errors to the log sink.
    pub async fn refresh(&self) -> Result<RefreshSummary, CommandError> {
        let summary = self.outline.refresh().await.map_err(|error| {
            let message = DisplayErrorChain::new(&error).to_string();
            self.log.append_line(&message);
            self.ui.show_error_message(&error.to_string());
            CommandError::Refresh(error)
        })?;

        if summary.error_count > 0 {
            self.outline.with_errors(|errors| {
                for error in errors {
                    self.log.append_line(&DisplayErrorChain::new(error).to_string());
                }
            });
        }
        Ok(summary)
    }

    /// Prompts for one of the workspace's agents and opens it in the target org.
    ///
    /// Agents are the entries of `<default package>/main/default/bots`. Returns the name of the
    /// agent that was opened.
    pub async fn open_agent_in_org(&self) -> Result<String, OpenAgentError> {
        let agents = list_local_agents(&self.workspace_root)?;
        let agent_name = self
            .ui
            .show_quick_pick(agents, "Choose which Agent to open")
            .await
            .ok_or(OpenAgentError::NoAgentSelected)?;

        self.org_opener
            .open_agent(&agent_name)
            .await
            .map_err(|error| OpenAgentError::Open {
                agent_name: agent_name.clone(),
                error,
            })?;
        info!("opened agent {agent_name} in the org");
        Ok(agent_name)
    }

    /// Undoes every command registration. Commands dispatched afterwards fail with
    /// [`CommandError::Disposed`].
    ///
    /// Calling this more than once has no further effect.
    pub fn dispose(&self) {
        self.lock_registry().dispose_all();
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, CommandRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AgentTestExtension {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Checks the version reported for the core extension against [`MINIMUM_CORE_VERSION`].
///
/// `version` is `None` if the core extension isn't installed.
pub fn check_core_extension_version(version: Option<&str>) -> Result<Version, HostVersionError> {
    let version = version.ok_or(HostVersionError::NotFound {
        extension_id: CORE_EXTENSION_ID,
    })?;
    let actual = Version::parse(version).map_err(|error| {
        warn!("invalid version format found for the core extension: {version}");
        HostVersionError::Invalid {
            version: version.to_owned(),
            error,
        }
    })?;

    if actual < MINIMUM_CORE_VERSION {
        return Err(HostVersionError::TooOld {
            actual,
            required: MINIMUM_CORE_VERSION,
        });
    }
    Ok(actual)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectFile {
    #[serde(default)]
    package_directories: Vec<PackageDirectory>,
}

#[derive(Debug, Deserialize)]
struct PackageDirectory {
    path: Utf8PathBuf,
    #[serde(default)]
    default: bool,
}

impl ProjectFile {
    /// The package marked as default, or the first one if none is.
    fn default_package(&self) -> Option<&PackageDirectory> {
        self.package_directories
            .iter()
            .find(|package| package.default)
            .or_else(|| self.package_directories.first())
    }
}

/// Returns the names of the agents in the default package, sorted.
fn list_local_agents(workspace_root: &Utf8Path) -> Result<Vec<String>, OpenAgentError> {
    let project_path = workspace_root.join(PROJECT_FILE);
    let contents =
        std::fs::read_to_string(&project_path).map_err(|error| OpenAgentError::ReadProject {
            path: project_path.clone(),
            error,
        })?;
    let project: ProjectFile =
        serde_json::from_str(&contents).map_err(|error| OpenAgentError::ParseProject {
            path: project_path.clone(),
            error,
        })?;
    let package = project
        .default_package()
        .ok_or(OpenAgentError::NoPackageDirectory { path: project_path })?;

    let bots_dir = workspace_root
        .join(&package.path)
        .join("main")
        .join("default")
        .join("bots");
    let list_error = |error| OpenAgentError::ListAgents {
        dir: bots_dir.clone(),
        error,
    };

    let mut agents = Vec::new();
    for entry in bots_dir.read_dir_utf8().map_err(list_error)? {
        let entry = entry.map_err(list_error)?;
        agents.push(entry.file_name().to_owned());
    }
    agents.sort();
    Ok(agents)
}
