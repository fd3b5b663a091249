// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to the agent testing service's run status and results.
//!
//! The remote service is opaque to the runner: these types only describe the JSON it returns when a
//! run is started and when a run is polled. Field names follow the service (camelCase), and run
//! statuses are SCREAMING_SNAKE_CASE strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The identifier for a remote test run, as returned by the service when a run is started.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Creates a new `RunId`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the run ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The status of a remote test run.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// The run was accepted but has not started executing.
    New,

    /// The run is executing.
    InProgress,

    /// The run finished. Individual cases may still have failed expectations.
    Completed,

    /// The service reported an error for the run as a whole.
    Error,

    /// The run was terminated before it finished.
    Terminated,
}

impl RunStatus {
    /// Returns true if no further updates will be produced for a run in this status.
    pub fn is_terminal(self) -> bool {
        match self {
            RunStatus::Completed | RunStatus::Error | RunStatus::Terminated => true,
            RunStatus::New | RunStatus::InProgress => false,
        }
    }

    /// Returns the string used by the service for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::New => "NEW",
            RunStatus::InProgress => "IN_PROGRESS",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Error => "ERROR",
            RunStatus::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The response to a request to start a run.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    /// The identifier to poll for.
    pub run_id: RunId,

    /// The status of the run at the time it was accepted.
    pub status: RunStatus,
}

/// Results for a run, returned by the service on each poll.
///
/// Per-case results are only meaningful once `status` is [`RunStatus::Completed`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResults {
    /// The status of the run.
    pub status: RunStatus,

    /// A run-level error message, if the service produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Results for each test case, in the order the service returned them.
    #[serde(default)]
    pub test_cases: Vec<TestCaseResult>,
}

impl RunResults {
    /// Creates results with the given status and no test cases.
    pub fn new(status: RunStatus) -> Self {
        Self {
            status,
            error_message: None,
            test_cases: Vec::new(),
        }
    }

    /// Returns the number of test cases with no failed expectations.
    pub fn passed_count(&self) -> usize {
        self.test_cases.iter().filter(|case| !case.has_failures()).count()
    }

    /// Returns the number of test cases with at least one failed expectation.
    pub fn failed_count(&self) -> usize {
        self.test_cases.iter().filter(|case| case.has_failures()).count()
    }
}

/// The result for a single test case within a run.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    /// The number of the test case, matching `<number>` in the test set.
    #[serde(alias = "number")]
    pub test_number: u64,

    /// Inputs that were sent to the agent.
    #[serde(default)]
    pub inputs: TestCaseInputs,

    /// Results for each expectation checked for this case.
    #[serde(default)]
    pub test_results: Vec<ExpectationResult>,
}

impl TestCaseResult {
    /// Returns true if any expectation for this case failed.
    pub fn has_failures(&self) -> bool {
        self.test_results
            .iter()
            .any(|result| result.result == ExpectationVerdict::Failure)
    }
}

/// Inputs sent to the agent for a test case.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseInputs {
    /// The utterance that was sent.
    #[serde(default)]
    pub utterance: String,
}

/// The result of checking a single expectation.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectationResult {
    /// The name of the expectation, for example `topic_sequence_match`.
    pub name: String,

    /// Whether the expectation passed.
    pub result: ExpectationVerdict,

    /// The value the test expected.
    #[serde(default)]
    pub expected_value: String,

    /// The value the agent produced.
    #[serde(default)]
    pub actual_value: String,

    /// A score assigned by the service, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// An error message for this expectation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Whether an expectation passed or failed.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpectationVerdict {
    /// The expectation passed.
    Pass,

    /// The expectation failed.
    Failure,
}

impl fmt::Display for ExpectationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectationVerdict::Pass => f.write_str("PASS"),
            ExpectationVerdict::Failure => f.write_str("FAILURE"),
        }
    }
}
