// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::tree::{Generation, LookupMiss, Outcome, TestGroupNode, case_display_name};
use agent_test_metadata::{RunResults, RunStatus};

/// What happened when run results were applied to the tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReconcileOutcome {
    /// The results were applied.
    Applied {
        /// The number of case nodes whose outcome was set from a result.
        updated: usize,

        /// Names of results that had no matching case node, for example `#7`.
        missing_cases: Vec<String>,
    },

    /// The tree was rebuilt while the run was in flight, so nothing was applied.
    StaleTree {
        /// The generation captured when the run started.
        captured: Generation,

        /// The generation of the tree when the results arrived.
        current: Generation,
    },

    /// The group is no longer in the tree, so nothing was applied.
    GroupMissing,
}

impl ReconcileOutcome {
    pub(super) fn from_miss(miss: LookupMiss) -> Self {
        match miss {
            LookupMiss::Stale { captured, current } => Self::StaleTree { captured, current },
            LookupMiss::GroupMissing => Self::GroupMissing,
        }
    }

    /// Returns true if the results were applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Marks a group and all its cases with the status of an in-flight run.
///
/// A terminal status is shown as `InProgress`: terminal snapshots go through [`apply_results`].
pub(super) fn mark_running(group: &mut TestGroupNode, status: RunStatus) {
    let outcome = match Outcome::from_run_status(status) {
        outcome @ (Outcome::New | Outcome::InProgress) => outcome,
        Outcome::NotRun | Outcome::Completed | Outcome::Error => Outcome::InProgress,
    };
    group.set_outcome(outcome, true);
}

/// Marks a group as failed without touching its cases.
pub(super) fn mark_failed(group: &mut TestGroupNode) {
    group.set_outcome(Outcome::Error, false);
}

/// Applies a terminal snapshot to a group.
///
/// For `COMPLETED`, each case result is matched to a case node by `#<number>`. A case with any
/// failed expectation becomes `Error`, otherwise `Completed`, and a case without a result goes back
/// to `NotRun`. The group is then `Error` if any case failed and `Completed` otherwise. For `ERROR`
/// and `TERMINATED`, only the group is marked `Error`.
pub(super) fn apply_results(group: &mut TestGroupNode, results: &RunResults) -> ReconcileOutcome {
    match results.status {
        RunStatus::Completed => {}
        RunStatus::Error | RunStatus::Terminated => {
            mark_failed(group);
            return ReconcileOutcome::Applied {
                updated: 0,
                missing_cases: Vec::new(),
            };
        }
        RunStatus::New | RunStatus::InProgress => {
            return ReconcileOutcome::Applied {
                updated: 0,
                missing_cases: Vec::new(),
            };
        }
    }

    let mut updated = 0;
    let mut missing_cases = Vec::new();
    for result in &results.test_cases {
        let name = case_display_name(result.test_number);
        match group.child_mut(&name) {
            Some(case) => {
                case.outcome = if result.has_failures() {
                    Outcome::Error
                } else {
                    Outcome::Completed
                };
                updated += 1;
            }
            None => missing_cases.push(name),
        }
    }
    group.finish_completed_run();

    ReconcileOutcome::Applied {
        updated,
        missing_cases,
    }
}
