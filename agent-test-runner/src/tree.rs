// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The in-memory tree of test groups and test cases.
//!
//! The main structure in this module is [`TestTree`]. Each [`TestDefinition`] becomes a
//! [`TestGroupNode`], and each of its cases a [`TestCaseNode`] named `#<number>`.
//!
//! Rebuilding the tree replaces every node and bumps its [`Generation`]. Code that updates outcomes
//! after an await point captures the generation first and goes through
//! [`TestTree::checked_group_mut`], so updates meant for an older tree are rejected instead of
//! being applied to whatever now has the same name.

use crate::{
    helpers::locale_cmp,
    list::{SourceLocation, TestDefinition},
};
use agent_test_metadata::RunStatus;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::{collections::HashMap, fmt};
use tracing::warn;

/// The label of the placeholder entry shown when no tests were found.
pub const NO_TESTS_MESSAGE: &str = "no tests found";

/// The description of the placeholder entry shown when no tests were found.
pub const NO_TESTS_DESCRIPTION: &str = "no test description";

/// The display and aggregation state of a node.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum Outcome {
    /// The node hasn't been run since the tree was built.
    #[default]
    NotRun,

    /// A run including this node was accepted but hasn't started.
    New,

    /// A run including this node is executing.
    InProgress,

    /// The node finished and passed.
    Completed,

    /// The node failed, or the run was terminated.
    Error,
}

impl Outcome {
    /// Returns true if this outcome won't change until the node is run again.
    pub fn is_terminal(self) -> bool {
        match self {
            Outcome::Completed | Outcome::Error => true,
            Outcome::NotRun | Outcome::New | Outcome::InProgress => false,
        }
    }

    /// Maps a remote run status to the outcome shown for the run's nodes.
    pub fn from_run_status(status: RunStatus) -> Self {
        match status {
            RunStatus::New => Outcome::New,
            RunStatus::InProgress => Outcome::InProgress,
            RunStatus::Completed => Outcome::Completed,
            RunStatus::Error | RunStatus::Terminated => Outcome::Error,
        }
    }

    /// Returns the name of the icon used for this outcome.
    pub fn icon_name(self) -> &'static str {
        match self {
            Outcome::NotRun => "testNotRun",
            Outcome::New | Outcome::InProgress => "testInProgress",
            Outcome::Completed => "testPass",
            Outcome::Error => "testFail",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::NotRun => write!(f, "Not Run"),
            Outcome::New => write!(f, "New"),
            Outcome::InProgress => write!(f, "In Progress"),
            Outcome::Completed => write!(f, "Completed"),
            Outcome::Error => write!(f, "Error"),
        }
    }
}

/// Identifies a tree built by a particular call to [`TestTree::rebuild`].
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a node by name, independently of any particular tree.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum NodeId {
    /// The placeholder shown when the tree is empty.
    Placeholder,

    /// A group.
    Group {
        /// The group name.
        name: String,
    },

    /// A case within a group.
    Case {
        /// The group name.
        group: String,

        /// The case name, for example `#1`.
        name: String,
    },
}

impl NodeId {
    /// Creates an ID for a group.
    pub fn group(name: impl Into<String>) -> Self {
        NodeId::Group { name: name.into() }
    }

    /// Creates an ID for a case.
    pub fn case(group: impl Into<String>, name: impl Into<String>) -> Self {
        NodeId::Case {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Returns the name of the group this node belongs to.
    pub fn group_name(&self) -> Option<&str> {
        match self {
            NodeId::Placeholder => None,
            NodeId::Group { name } => Some(name),
            NodeId::Case { group, .. } => Some(group),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Placeholder => write!(f, "{NO_TESTS_MESSAGE}"),
            NodeId::Group { name } => write!(f, "{name}"),
            NodeId::Case { group, name } => write!(f, "{group}.{name}"),
        }
    }
}

/// A leaf node for a single test case.
#[derive(Clone, Debug)]
pub struct TestCaseNode {
    name: String,
    full_name: String,
    number: u64,
    utterance: String,
    location: SourceLocation,
    /// The current outcome.
    pub outcome: Outcome,
}

impl TestCaseNode {
    /// Returns the display name, for example `#1`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fully qualified name, for example `Greeting.#1`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Returns the case number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Returns the utterance for this case.
    pub fn utterance(&self) -> &str {
        &self.utterance
    }

    /// Returns where this case is defined.
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }
}

/// Returns the display name of the case with the given number.
pub fn case_display_name(number: u64) -> String {
    format!("#{number}")
}

/// A node for one test definition, owning its cases.
#[derive(Clone, Debug)]
pub struct TestGroupNode {
    name: String,
    location: SourceLocation,
    description: Option<String>,
    subject_name: Option<String>,
    children: Vec<TestCaseNode>,
    /// The current outcome.
    pub outcome: Outcome,
    /// The number of cases that passed in the last completed run.
    pub passing: usize,
    /// The number of cases that failed in the last completed run.
    pub failing: usize,
    /// The number of cases without results in the last completed run.
    pub skipping: usize,
}

impl TestGroupNode {
    fn new(definition: &TestDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            location: definition.location.clone(),
            description: definition.description.clone(),
            subject_name: definition.subject_name.clone(),
            children: Vec::new(),
            outcome: Outcome::NotRun,
            passing: 0,
            failing: 0,
            skipping: 0,
        }
    }

    /// Returns the group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns where this group is defined.
    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Returns the definition's description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the definition's subject, if any.
    pub fn subject_name(&self) -> Option<&str> {
        self.subject_name.as_deref()
    }

    /// Returns the case nodes, in file order.
    pub fn children(&self) -> &[TestCaseNode] {
        &self.children
    }

    /// Returns the case with the given display name.
    pub fn child(&self, name: &str) -> Option<&TestCaseNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Returns the case with the given display name, mutably.
    pub fn child_mut(&mut self, name: &str) -> Option<&mut TestCaseNode> {
        self.children.iter_mut().find(|child| child.name == name)
    }

    /// Sets this group's outcome, and optionally that of every case.
    pub fn set_outcome(&mut self, outcome: Outcome, apply_to_children: bool) {
        self.outcome = outcome;
        if apply_to_children {
            for child in &mut self.children {
                child.outcome = outcome;
            }
        }
    }

    /// Computes the outcome implied by the cases.
    ///
    /// * `Error` if any case is `Error`.
    /// * Otherwise `Completed` if every case is terminal.
    /// * Otherwise `InProgress` if any case is `New` or `InProgress`.
    /// * Otherwise `NotRun`.
    ///
    /// A group without cases keeps its current outcome.
    pub fn aggregate_outcome(&self) -> Outcome {
        if self.children.is_empty() {
            return self.outcome;
        }
        if self.children.iter().any(|c| c.outcome == Outcome::Error) {
            Outcome::Error
        } else if self.children.iter().all(|c| c.outcome.is_terminal()) {
            Outcome::Completed
        } else if self
            .children
            .iter()
            .any(|c| matches!(c.outcome, Outcome::New | Outcome::InProgress))
        {
            Outcome::InProgress
        } else {
            Outcome::NotRun
        }
    }

    /// Settles the group after a run completed.
    ///
    /// Cases that are still pending had no result in the run and go back to `NotRun`. The group
    /// becomes `Error` if any case failed, and `Completed` otherwise.
    pub fn finish_completed_run(&mut self) {
        for child in &mut self.children {
            if !child.outcome.is_terminal() {
                child.outcome = Outcome::NotRun;
            }
        }
        self.refresh_aggregate();
        self.outcome = if self.failing > 0 {
            Outcome::Error
        } else {
            Outcome::Completed
        };
    }

    /// Sets this group's outcome and counts from its cases.
    pub fn refresh_aggregate(&mut self) {
        self.outcome = self.aggregate_outcome();
        self.passing = self.count(Outcome::Completed);
        self.failing = self.count(Outcome::Error);
        self.skipping = self.children.len() - self.passing - self.failing;
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.children
            .iter()
            .filter(|child| child.outcome == outcome)
            .count()
    }
}

/// A borrowed view of an entry in the tree.
#[derive(Copy, Clone, Debug)]
pub enum TreeEntry<'a> {
    /// The placeholder shown when the tree is empty.
    Placeholder,

    /// A group.
    Group(&'a TestGroupNode),

    /// A case, along with its group.
    Case(&'a TestGroupNode, &'a TestCaseNode),
}

impl<'a> TreeEntry<'a> {
    /// Returns the ID of this entry.
    pub fn id(&self) -> NodeId {
        match self {
            TreeEntry::Placeholder => NodeId::Placeholder,
            TreeEntry::Group(group) => NodeId::group(group.name()),
            TreeEntry::Case(group, case) => NodeId::case(group.name(), case.name()),
        }
    }

    /// Returns the display name of this entry.
    pub fn name(&self) -> &'a str {
        match self {
            TreeEntry::Placeholder => NO_TESTS_MESSAGE,
            TreeEntry::Group(group) => group.name(),
            TreeEntry::Case(_, case) => case.name(),
        }
    }

    /// Returns where this entry is defined.
    pub fn location(&self) -> Option<&'a SourceLocation> {
        match self {
            TreeEntry::Placeholder => None,
            TreeEntry::Group(group) => Some(group.location()),
            TreeEntry::Case(_, case) => Some(case.location()),
        }
    }

    /// Returns the outcome of this entry.
    pub fn outcome(&self) -> Outcome {
        match self {
            TreeEntry::Placeholder => Outcome::NotRun,
            TreeEntry::Group(group) => group.outcome,
            TreeEntry::Case(_, case) => case.outcome,
        }
    }
}

/// Why a checked lookup didn't return a group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LookupMiss {
    /// The tree was rebuilt after the caller captured its generation.
    Stale {
        /// The generation the caller captured.
        captured: Generation,

        /// The current generation.
        current: Generation,
    },

    /// No group has the requested name.
    GroupMissing,
}

/// The tree of test groups and cases.
#[derive(Clone, Debug, Default)]
pub struct TestTree {
    generation: Generation,
    // Group name -> group, in display order.
    groups: IndexMap<String, TestGroupNode>,
    // Definition file -> group name.
    by_file: HashMap<Utf8PathBuf, String>,
}

impl TestTree {
    /// Creates a new, empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents of this tree with groups built from `definitions`.
    ///
    /// Definitions with the same name are merged into one group, keeping the first definition's
    /// location. Groups are sorted by name; cases keep their file order. Returns the new
    /// generation.
    pub fn rebuild(&mut self, definitions: &[TestDefinition]) -> Generation {
        let mut groups: IndexMap<String, TestGroupNode> =
            IndexMap::with_capacity(definitions.len());
        let mut by_file = HashMap::new();

        for definition in definitions {
            let group = groups
                .entry(definition.name.clone())
                .or_insert_with(|| TestGroupNode::new(definition));
            by_file.insert(definition.location.path.clone(), definition.name.clone());
            if let Some(path) = &definition.test_set_path {
                by_file.insert(path.clone(), definition.name.clone());
            }

            for case in &definition.test_cases {
                let name = case_display_name(case.number);
                if let Some(existing) = group.child(&name) {
                    // Results are matched by number, so a second case with the same number
                    // could never receive one.
                    warn!(
                        "{}: duplicate test case {}.{name} (first defined at {}), skipping",
                        case.location,
                        definition.name,
                        existing.location(),
                    );
                    continue;
                }
                group.children.push(TestCaseNode {
                    full_name: format!("{}.{name}", definition.name),
                    name,
                    number: case.number,
                    utterance: case.utterance.clone(),
                    location: case.location.clone(),
                    outcome: Outcome::NotRun,
                });
            }
        }

        groups.sort_by(|a, _, b, _| locale_cmp(a, b));
        self.groups = groups;
        self.by_file = by_file;
        self.generation = self.generation.next();
        self.generation
    }

    /// Returns the current generation.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns true if the tree has no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns the groups, sorted by name.
    pub fn groups(&self) -> impl ExactSizeIterator<Item = &TestGroupNode> {
        self.groups.values()
    }

    /// Returns the group with the given name.
    pub fn group(&self, name: &str) -> Option<&TestGroupNode> {
        self.groups.get(name)
    }

    /// Returns the group with the given name, mutably.
    pub fn group_mut(&mut self, name: &str) -> Option<&mut TestGroupNode> {
        self.groups.get_mut(name)
    }

    /// Returns the group with the given name, but only if the tree is still at `generation`.
    pub fn checked_group_mut(
        &mut self,
        generation: Generation,
        name: &str,
    ) -> Result<&mut TestGroupNode, LookupMiss> {
        if generation != self.generation {
            return Err(LookupMiss::Stale {
                captured: generation,
                current: self.generation,
            });
        }
        self.group_mut(name).ok_or(LookupMiss::GroupMissing)
    }

    /// Returns the name of the group defined in `path`, if any.
    ///
    /// Both definition files and test-set files are indexed.
    pub fn group_for_file(&self, path: &Utf8Path) -> Option<&str> {
        self.by_file.get(path).map(String::as_str)
    }

    /// Looks up a node by ID.
    pub fn find(&self, id: &NodeId) -> Option<TreeEntry<'_>> {
        match id {
            NodeId::Placeholder => self.is_empty().then_some(TreeEntry::Placeholder),
            NodeId::Group { name } => self.group(name).map(TreeEntry::Group),
            NodeId::Case { group, name } => {
                let group = self.group(group)?;
                group.child(name).map(|case| TreeEntry::Case(group, case))
            }
        }
    }

    /// Returns the children of `node`, or the top-level entries if `node` is `None`.
    ///
    /// The top level of an empty tree is a single placeholder entry, never an empty list.
    pub fn children(&self, node: Option<&NodeId>) -> Vec<TreeEntry<'_>> {
        match node {
            None if self.is_empty() => vec![TreeEntry::Placeholder],
            None => self.groups.values().map(TreeEntry::Group).collect(),
            Some(NodeId::Group { name }) => match self.group(name) {
                Some(group) => group
                    .children
                    .iter()
                    .map(|case| TreeEntry::Case(group, case))
                    .collect(),
                None => Vec::new(),
            },
            Some(NodeId::Placeholder | NodeId::Case { .. }) => Vec::new(),
        }
    }
}
