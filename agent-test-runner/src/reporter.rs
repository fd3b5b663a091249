// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable output for agent test runs.
//!
//! Everything here is pure formatting. The runner decides where the output goes.

use crate::helpers::plural;
use agent_test_metadata::{
    ExpectationResult, ExpectationVerdict, RunId, RunResults, RunStatus, TestCaseResult,
};
use swrite::{SWrite, swrite};

const SEPARATOR: &str = "--------------------------------------------------------------------------------";

/// Returns the title of the progress indicator for a run.
pub fn progress_title(group_name: &str) -> String {
    format!("Running {group_name}")
}

/// Returns the log line written when a run is accepted.
pub fn started_line(group_name: &str, run_id: &RunId) -> String {
    format!("Started agent test run for {group_name} (run ID {run_id})")
}

/// Returns the progress message shown for an intermediate status.
pub fn progress_message(status: RunStatus) -> String {
    format!("Status: {status}")
}

/// Returns the summary shown once a run has completed, for example
/// `Greeting: 3 test cases, 2 passed, 1 failed`.
pub fn summary_line(group_name: &str, results: &RunResults) -> String {
    let total = results.test_cases.len();
    let mut out = String::new();
    swrite!(
        out,
        "{group_name}: {total} {}, {} passed, {} failed",
        plural::test_cases_str(total),
        results.passed_count(),
        results.failed_count(),
    );
    out
}

/// Returns the lines written when a run ends with `ERROR` or `TERMINATED`.
pub fn unsuccessful_lines(group_name: &str, results: &RunResults) -> Vec<String> {
    let mut first = String::new();
    swrite!(first, "Agent test run for {group_name} ended with status {}", results.status);
    if let Some(message) = &results.error_message {
        swrite!(first, ": {message}");
    }

    let mut lines = vec![first];
    if !results.test_cases.is_empty() {
        lines.push(format!(
            "{} passed, {} failed before the run ended",
            results.passed_count(),
            results.failed_count()
        ));
    }
    lines
}

/// Returns the full report for a completed run: one block per case, followed by the summary.
pub fn report_lines(group_name: &str, results: &RunResults) -> Vec<String> {
    let mut lines = Vec::new();
    for case in &results.test_cases {
        lines.push(SEPARATOR.to_owned());
        write_case(&mut lines, case);
    }
    lines.push(SEPARATOR.to_owned());
    lines.push(summary_line(group_name, results));
    lines
}

fn write_case(lines: &mut Vec<String>, case: &TestCaseResult) {
    let verdict = if case.has_failures() { "FAIL" } else { "PASS" };
    lines.push(format!("Test Case #{} {verdict}", case.test_number));
    lines.push(format!("Utterance: {}", case.inputs.utterance));
    for expectation in &case.test_results {
        write_expectation(lines, expectation);
    }
}

fn write_expectation(lines: &mut Vec<String>, expectation: &ExpectationResult) {
    let verdict = match expectation.result {
        ExpectationVerdict::Pass => "PASS",
        ExpectationVerdict::Failure => "FAIL",
    };
    lines.push(format!("  {verdict} {}", expectation.name));
    lines.push(format!("    Expected: {}", expectation.expected_value));
    lines.push(format!("    Actual: {}", expectation.actual_value));
    if let Some(score) = expectation.score {
        lines.push(format!("    Score: {score}"));
    }
    if let Some(message) = &expectation.error_message {
        lines.push(format!("    Error: {message}"));
    }
}
