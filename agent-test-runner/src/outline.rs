// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exposes the test tree to the host's tree view.
//!
//! [`TestOutlineProvider`] owns the [`TestTree`] and its refresh lifecycle. Every change to the
//! tree is announced on a [`TreeChange`] channel; the host re-queries [`children`] and
//! [`tree_item`] in response.
//!
//! [`children`]: TestOutlineProvider::children
//! [`tree_item`]: TestOutlineProvider::tree_item

use crate::{
    config::DiscoveryConfig,
    errors::DiscoveryError,
    host::UiHost,
    list::{DefinitionList, parse_all_definitions},
    tree::{
        Generation, LookupMiss, NO_TESTS_DESCRIPTION, NodeId, Outcome, TestGroupNode, TestTree,
        TreeEntry,
    },
};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// The host command that collapses every node in the view.
pub const COLLAPSE_ALL_HOST_COMMAND: &str =
    "workbench.actions.treeView.sf.agent.test.view.collapseAll";

/// The command attached to every tree item, run when the item is selected.
pub const GO_TO_DEFINITION_COMMAND: &str = "sf.agent.test.view.goToDefinition";

/// The context value of group items, used by the host to pick menu entries.
pub const GROUP_CONTEXT_VALUE: &str = "agentTestGroup";

/// The context value of case items.
pub const CASE_CONTEXT_VALUE: &str = "agentTest";

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A notification that the view needs to be re-queried.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TreeChange {
    /// The tree was rebuilt from disk. All node handles from earlier generations are stale.
    Rebuilt {
        /// The generation of the new tree.
        generation: Generation,
    },

    /// Only outcomes changed.
    OutcomesChanged,
}

/// Whether an item can be expanded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Collapsible {
    /// The item has no children.
    None,

    /// The item has children and starts out expanded.
    Expanded,
}

/// A command attached to a tree item.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ItemCommand {
    /// The command ID.
    pub command: &'static str,

    /// The node passed to the command.
    pub argument: NodeId,
}

/// Everything the host needs to render a single node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TreeItem {
    /// The node this item renders.
    pub id: NodeId,

    /// The primary label.
    pub label: String,

    /// Secondary text shown next to the label.
    pub description: Option<String>,

    /// Whether the item can be expanded.
    pub collapsible: Collapsible,

    /// The context value, if the item supports any menu actions.
    pub context_value: Option<&'static str>,

    /// The icon name, derived from the node's outcome.
    pub icon: &'static str,

    /// The command to run when the item is selected.
    pub command: Option<ItemCommand>,
}

impl TreeItem {
    fn from_entry(entry: TreeEntry<'_>) -> Self {
        let id = entry.id();
        let (description, collapsible, context_value) = match entry {
            TreeEntry::Placeholder => (
                Some(NO_TESTS_DESCRIPTION.to_owned()),
                Collapsible::None,
                None,
            ),
            TreeEntry::Group(group) => (
                group.description().map(str::to_owned),
                Collapsible::Expanded,
                Some(GROUP_CONTEXT_VALUE),
            ),
            TreeEntry::Case(_, case) => (
                Some(case.utterance().to_owned()),
                Collapsible::None,
                Some(CASE_CONTEXT_VALUE),
            ),
        };
        let command = match entry {
            TreeEntry::Placeholder => None,
            TreeEntry::Group(_) | TreeEntry::Case(..) => Some(ItemCommand {
                command: GO_TO_DEFINITION_COMMAND,
                argument: id.clone(),
            }),
        };

        Self {
            label: entry.name().to_owned(),
            description,
            collapsible,
            context_value,
            icon: entry.outcome().icon_name(),
            command,
            id,
        }
    }
}

/// A summary of a completed refresh.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RefreshSummary {
    /// The generation of the rebuilt tree.
    pub generation: Generation,

    /// The number of groups in the tree.
    pub group_count: usize,

    /// The number of cases across all groups.
    pub case_count: usize,

    /// The number of files that were skipped or only partially read.
    pub error_count: usize,
}

#[derive(Debug, Default)]
struct OutlineState {
    tree: TestTree,
    errors: Vec<DiscoveryError>,
}

/// Owns the test tree and exposes it to the host's tree view.
///
/// The provider is shared as an `Arc` between the extension and the runner. Internal state is
/// guarded by a mutex that is never held across an await point.
#[derive(Debug)]
pub struct TestOutlineProvider {
    workspace_root: Utf8PathBuf,
    config: DiscoveryConfig,
    state: Mutex<OutlineState>,
    sender: broadcast::Sender<TreeChange>,
}

impl TestOutlineProvider {
    /// Creates a new provider with an empty tree. Call [`Self::refresh`] to populate it.
    pub fn new(workspace_root: impl Into<Utf8PathBuf>, config: DiscoveryConfig) -> Self {
        let (sender, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            workspace_root: workspace_root.into(),
            config,
            state: Mutex::new(OutlineState::default()),
            sender,
        }
    }

    /// Returns the workspace root that definitions are discovered under.
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeChange> {
        self.sender.subscribe()
    }

    /// Returns the children of `node`, or the top-level entries if `node` is `None`.
    ///
    /// Before the first refresh, and whenever no tests were found, the top level is a single
    /// placeholder.
    pub fn children(&self, node: Option<&NodeId>) -> Vec<NodeId> {
        let state = self.lock();
        state
            .tree
            .children(node)
            .into_iter()
            .map(|entry| entry.id())
            .collect()
    }

    /// Returns the rendering of `node`, or `None` if it's not in the current tree.
    pub fn tree_item(&self, node: &NodeId) -> Option<TreeItem> {
        let state = self.lock();
        state.tree.find(node).map(TreeItem::from_entry)
    }

    /// Rescans the workspace and rebuilds the tree.
    ///
    /// Parsing happens on a blocking task. Per-file errors don't fail the refresh: they're stored
    /// and available through [`Self::with_errors`].
    pub async fn refresh(&self) -> Result<RefreshSummary, DiscoveryError> {
        let root = self.workspace_root.clone();
        let config = self.config.clone();
        let list = tokio::task::spawn_blocking(move || parse_all_definitions(&root, &config))
            .await
            .map_err(DiscoveryError::TaskFailed)??;
        Ok(self.rebuild(list))
    }

    /// Rebuilds the tree from an already-parsed list and notifies subscribers.
    pub fn rebuild(&self, list: DefinitionList) -> RefreshSummary {
        let case_count = list.case_count();
        let (definitions, errors) = list.into_parts();

        let summary = {
            let mut state = self.lock();
            let generation = state.tree.rebuild(&definitions);
            let summary = RefreshSummary {
                generation,
                group_count: state.tree.groups().len(),
                case_count,
                error_count: errors.len(),
            };
            state.errors = errors;
            summary
        };

        debug!(
            "rebuilt test tree (generation {}, {} groups)",
            summary.generation, summary.group_count
        );
        self.notify(TreeChange::Rebuilt {
            generation: summary.generation,
        });
        summary
    }

    /// Notifies subscribers that outcomes changed, without rescanning.
    pub fn refresh_view(&self) {
        self.notify(TreeChange::OutcomesChanged);
    }

    /// Collapses every node in the host's view.
    pub fn collapse_all(&self, host: &dyn UiHost) {
        host.execute_command(COLLAPSE_ALL_HOST_COMMAND);
    }

    /// Returns the current generation of the tree.
    pub fn generation(&self) -> Generation {
        self.lock().tree.generation()
    }

    /// Calls `f` with a read-only view of the tree.
    ///
    /// The tree is locked while `f` runs, so `f` must not call back into this provider.
    pub fn with_tree<T>(&self, f: impl FnOnce(&TestTree) -> T) -> T {
        f(&self.lock().tree)
    }

    /// Calls `f` with the errors recorded by the last refresh.
    pub fn with_errors<T>(&self, f: impl FnOnce(&[DiscoveryError]) -> T) -> T {
        f(&self.lock().errors)
    }

    /// Sets the outcome of `node`, if it's in the tree.
    ///
    /// Setting a group's outcome also sets its children's. Returns false if the node wasn't found.
    pub fn set_outcome(&self, node: &NodeId, outcome: Outcome) -> bool {
        let found = {
            let mut state = self.lock();
            match node {
                NodeId::Placeholder => false,
                NodeId::Group { name } => match state.tree.group_mut(name) {
                    Some(group) => {
                        group.set_outcome(outcome, true);
                        true
                    }
                    None => false,
                },
                NodeId::Case { group, name } => match state.tree.group_mut(group) {
                    Some(group) => match group.child_mut(name) {
                        Some(case) => {
                            case.outcome = outcome;
                            group.refresh_aggregate();
                            true
                        }
                        None => false,
                    },
                    None => false,
                },
            }
        };
        if found {
            self.refresh_view();
        }
        found
    }

    /// Applies `f` to a group, but only if the tree is still at `generation`.
    pub(crate) fn update_group<T>(
        &self,
        generation: Generation,
        name: &str,
        f: impl FnOnce(&mut TestGroupNode) -> T,
    ) -> Result<T, LookupMiss> {
        let mut state = self.lock();
        state.tree.checked_group_mut(generation, name).map(f)
    }

    fn notify(&self, change: TreeChange) {
        // An error here only means nobody is listening.
        let _ = self.sender.send(change);
    }

    fn lock(&self) -> MutexGuard<'_, OutlineState> {
        // The state is plain data that is valid after every mutation, so a panic in another
        // thread doesn't leave it inconsistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
