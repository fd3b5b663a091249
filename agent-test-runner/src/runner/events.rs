// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::ReconcileOutcome;
use crate::errors::DisplayErrorChain;
use agent_test_metadata::{RunId, RunStatus};
use chrono::{DateTime, FixedOffset};
use std::time::Duration;

/// A run event.
///
/// Events are produced by an [`AgentTestRunner`](super::AgentTestRunner) and sent to the sender
/// configured with [`AgentTestRunnerBuilder::set_event_sender`](super::AgentTestRunnerBuilder::set_event_sender).
#[derive(Clone, Debug)]
pub struct RunEvent {
    /// The time at which the event was generated, including the offset from UTC.
    pub timestamp: DateTime<FixedOffset>,

    /// The amount of time elapsed since the run started.
    pub elapsed: Duration,

    /// The group the run is for.
    pub group_name: String,

    /// The kind of run event this is.
    pub kind: RunEventKind,
}

/// The kind of run event this is.
///
/// Forms part of [`RunEvent`].
#[derive(Clone, Debug, PartialEq)]
pub enum RunEventKind {
    /// The runner is resolving the connection and starting the run.
    Starting,

    /// The remote service accepted the run.
    Started {
        /// The ID of the run.
        run_id: RunId,

        /// The status the service reported.
        status: RunStatus,
    },

    /// The run could not be started. No polling happens after this event.
    StartFailed {
        /// The error, along with its causes.
        message: String,
    },

    /// An intermediate status was received.
    Progress {
        /// The ID of the run.
        run_id: RunId,

        /// The reported status.
        status: RunStatus,

        /// The progress shown so far, from 0 to 100.
        percent: u8,
    },

    /// Results were applied to the tree.
    Reconciled {
        /// The ID of the run.
        run_id: RunId,

        /// What happened when the results were applied.
        outcome: ReconcileOutcome,
    },

    /// The run reached a terminal status.
    Finished {
        /// The ID of the run.
        run_id: RunId,

        /// The terminal status.
        status: RunStatus,

        /// The number of cases that passed.
        passed: usize,

        /// The number of cases that failed.
        failed: usize,
    },

    /// The run failed while being polled.
    Failed {
        /// The ID of the run.
        run_id: RunId,

        /// The error, along with its causes.
        message: String,
    },
}

impl RunEventKind {
    pub(super) fn start_failed(error: &(dyn std::error::Error + 'static)) -> Self {
        Self::StartFailed {
            message: DisplayErrorChain::new(error).to_string(),
        }
    }
}
